// Copyright 2017 The Australian National University
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use zdata::data::*;
use zdata::host::*;
use zdata::typesystem::*;
use zdata::DataError;

use crate::common::*;

fn convert(dm: &DataManager, ty: TypeId, flags: Attributes, obj: &HostRef) -> DescriptorId {
    dm.convert_to_object_descriptor(ty, flags, None, &HostValue::Ref(obj.clone()), None)
        .unwrap()
        .as_descriptor()
        .unwrap()
}

#[test]
fn test_reference_descriptors_are_shared() {
    start_logging();

    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let a = new_node(&f, 1, HostValue::Null);
    let first = convert(&dm, f.node, Attributes::CONSTANT, &a);
    let registered = dm.registered().len();

    let second = convert(&dm, f.node, Attributes::CONSTANT, &a);
    assert_eq!(first, second);
    assert_eq!(dm.registered().len(), registered);
    assert_eq!(dm.get_object_descriptor(&HostValue::Ref(a)), Some(DataValue::Descriptor(first)));
    assert_eq!(dm.get(first, f.node_value), Some(DataValue::Scalar(ScalarValue::I32(1))));
}

#[test]
fn test_value_types_are_embedded() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let p = new_point(&f, 1, 2);
    let h1 = HostRef::new_object(f.holder, vec![("p", HostValue::Ref(p.clone()))]);
    let h2 = HostRef::new_object(f.holder, vec![("p", HostValue::Ref(p.clone()))]);

    let d1 = convert(&dm, f.holder, Attributes::CONSTANT, &h1);
    let d2 = convert(&dm, f.holder, Attributes::CONSTANT, &h2);
    assert!(d1 != d2);

    let n1 = dm.get(d1, f.holder_p).and_then(|v| v.as_descriptor()).unwrap();
    let n2 = dm.get(d2, f.holder_p).and_then(|v| v.as_descriptor()).unwrap();
    assert!(n1 != n2);

    let nested = dm.descriptor(n1).unwrap();
    assert_eq!(nested.nesting, Some(Nesting::in_field(d1, f.holder_p)));
    assert_eq!(dm.get(n1, f.point_x), Some(DataValue::Scalar(ScalarValue::I32(1))));
    assert_eq!(dm.get(n2, f.point_y), Some(DataValue::Scalar(ScalarValue::I32(2))));

    // only the holders are known by their source
    assert_eq!(dm.get_object_descriptor(&HostValue::Ref(p)), None);
}

#[test]
fn test_cycles_resolve() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let a = new_node(&f, 1, HostValue::Null);
    let b = new_node(&f, 2, HostValue::Ref(a.clone()));
    a.set_field("next", HostValue::Ref(b.clone()));

    let da = convert(&dm, f.node, Attributes::CONSTANT, &a);
    let db = dm.get(da, f.node_next).and_then(|v| v.as_descriptor()).unwrap();

    assert_eq!(dm.get(db, f.node_next), Some(DataValue::Descriptor(da)));
    assert_eq!(dm.get_object_descriptor(&HostValue::Ref(b)), Some(DataValue::Descriptor(db)));
}

#[test]
fn test_refresh_keeps_nested_identity() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let h = HostRef::new_object(f.holder, vec![("p", HostValue::Ref(new_point(&f, 1, 2)))]);
    let d = convert(&dm, f.holder, Attributes::MUTABLE, &h);
    let nested = dm.get(d, f.holder_p).and_then(|v| v.as_descriptor()).unwrap();

    h.set_field("p", HostValue::Ref(new_point(&f, 5, 6)));
    dm.refresh_values(None).unwrap();

    assert_eq!(dm.get(d, f.holder_p), Some(DataValue::Descriptor(nested)));
    assert_eq!(dm.get(nested, f.point_x), Some(DataValue::Scalar(ScalarValue::I32(5))));
    assert_eq!(dm.get(nested, f.point_y), Some(DataValue::Scalar(ScalarValue::I32(6))));
}

#[test]
fn test_incompatible_target() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let a = new_node(&f, 1, HostValue::Null);
    match dm.convert_to_object_descriptor(f.holder, Attributes::CONSTANT, None, &HostValue::Ref(a), None) {
        Err(DataError::TypeConsistency(_)) => {}
        other => panic!("unexpected {:?}", other)
    }
}

#[test]
fn test_deferred_fields_follow_phase() {
    let (mut ts, f) = fixture();
    let code_pointer = ts.well_known_types().code_pointer.unwrap();
    let wkf = ts.well_known_fields().clone();

    // the code pointer ids are only known once the data manager exists
    let entry = HostRef::new_object(code_pointer, vec![("Target", HostValue::Null)]);
    ts.set_method_pointers(f.node, vec![HostValue::Ref(entry.clone())]).unwrap();
    let vtable = ts.get_type(f.node).virtual_table.clone().unwrap();

    let dm = DataManager::new(Arc::new(ts));
    let id = dm.create_code_pointer(CodeTarget::Method(f.run));
    entry.set_field("Target", HostValue::Scalar(ScalarValue::IntPtr(id)));

    convert(&dm, f.node, Attributes::CONSTANT, &new_node(&f, 1, HostValue::Null));
    let vt = dm.get_object_descriptor(&HostValue::Ref(vtable)).and_then(|v| v.as_descriptor()).unwrap();
    let method_pointers = wkf.vtable_method_pointers.unwrap();
    let gc_info = wkf.vtable_gc_info.unwrap();

    assert!(dm.get(vt, method_pointers).and_then(|v| v.as_descriptor()).is_none());
    assert!(dm.get(vt, gc_info).and_then(|v| v.as_descriptor()).is_none());

    dm.refresh_values(Some(Phase::OrderStaticConstructors)).unwrap();
    let table = dm.get(vt, method_pointers).and_then(|v| v.as_descriptor()).unwrap();
    assert_eq!(dm.array_len(table), Some(1));
    assert!(dm.get(vt, gc_info).and_then(|v| v.as_descriptor()).is_none());

    dm.refresh_values(Some(Phase::LayoutTypes)).unwrap();
    assert!(dm.get(vt, gc_info).and_then(|v| v.as_descriptor()).is_some());
}

#[test]
fn test_built_descriptors() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let id = dm.build_object_descriptor(f.node, Attributes::MUTABLE, None).unwrap();
    dm.set(id, f.node_value, DataValue::Scalar(ScalarValue::I32(9))).unwrap();
    assert!(dm.has(id, f.node_value));
    assert!(!dm.has(id, f.node_next));

    let other = new_node(&f, 3, HostValue::Null);
    let next = dm.convert_and_set(id, f.node_next, &HostValue::Ref(other), None).unwrap();
    assert_eq!(dm.get(id, f.node_next), Some(next));

    let array = dm.build_array_descriptor(f.int_array, Attributes::MUTABLE, None, 2).unwrap();
    assert_eq!(dm.array_len(array), Some(2));
    dm.array_set(array, 1, DataValue::Scalar(ScalarValue::I32(4))).unwrap();
    assert_eq!(dm.array_get(array, 1), Some(DataValue::Scalar(ScalarValue::I32(4))));
    assert!(dm.array_set(array, 2, DataValue::Null).is_err());

    match dm.build_object_descriptor(f.int_array, Attributes::CONSTANT, None) {
        Err(DataError::TypeConsistency(_)) => {}
        other => panic!("unexpected {:?}", other)
    }
}

#[test]
fn test_data_at_offset() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));
    let flags = Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION;

    let h = HostRef::new_object(f.holder, vec![("p", HostValue::Ref(new_point(&f, 1, 2)))]);
    let d = convert(&dm, f.holder, flags, &h);
    assert_eq!(dm.get_data_at_offset(d, &[f.holder_p, f.point_y], 0, 4).unwrap(),
               Some(DataValue::Scalar(ScalarValue::I32(2))));

    let n = convert(&dm, f.node, flags, &new_node(&f, 7, HostValue::Null));
    assert_eq!(dm.get_data_at_offset(n, &[], 0, 4).unwrap(), Some(DataValue::Scalar(ScalarValue::I32(7))));

    // constants that are not propagatable do not answer
    let c = convert(&dm, f.node, Attributes::CONSTANT, &new_node(&f, 7, HostValue::Null));
    assert_eq!(dm.get_data_at_offset(c, &[], 0, 4).unwrap(), None);
}

#[test]
fn test_deferred_field_reuses_converted_source() {
    let (mut ts, f) = fixture();
    let wkf = ts.well_known_fields().clone();
    let table = ts.set_method_pointers(f.node, vec![HostValue::Null]).unwrap();
    let table_type = table.type_id();
    let vtable = ts.get_type(f.node).virtual_table.clone().unwrap();
    let dm = DataManager::new(Arc::new(ts));

    // converted on its own first, the vtable refers to it without a phase
    let dt = convert(&dm, table_type, Attributes::CONSTANT, &table);
    convert(&dm, f.node, Attributes::CONSTANT, &new_node(&f, 1, HostValue::Null));

    let vt = dm.get_object_descriptor(&HostValue::Ref(vtable)).and_then(|v| v.as_descriptor()).unwrap();
    assert_eq!(dm.get(vt, wkf.vtable_method_pointers.unwrap()), Some(DataValue::Descriptor(dt)));
    assert!(dm.get(vt, wkf.vtable_gc_info.unwrap()).and_then(|v| v.as_descriptor()).is_none());
}

#[test]
fn test_long_lists_convert() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));
    let nodes = new_list(&f, 20_000);

    let head = convert(&dm, f.node, Attributes::MUTABLE, &nodes[0]);

    let mut count = 0;
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        assert_eq!(dm.get(id, f.node_value), Some(DataValue::Scalar(ScalarValue::I32(count))));
        count += 1;
        cursor = dm.get(id, f.node_next).and_then(|v| v.as_descriptor());
    }
    assert_eq!(count, 20_000);

    let tail = nodes[nodes.len() - 1].clone();
    tail.set_field("value", HostValue::i32(-1));
    dm.refresh_values(None).unwrap();
    let dt = dm.get_object_descriptor(&HostValue::Ref(tail)).and_then(|v| v.as_descriptor()).unwrap();
    assert_eq!(dm.get(dt, f.node_value), Some(DataValue::Scalar(ScalarValue::I32(-1))));

    unlink(&nodes);
}
