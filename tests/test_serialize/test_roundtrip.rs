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
use zdata::image::*;
use zdata::options::DataOptions;
use zdata::serialize::*;
use zdata::typesystem::*;
use zdata::DataError;

use crate::common::*;

fn host_of(dm: &DataManager, id: DescriptorId) -> HostRef {
    dm.registered().into_iter()
        .filter(|&(_, d)| d == id)
        .filter_map(|(key, _)| match key {
            DataKey::Host(obj) => Some(obj),
            DataKey::Synthetic(_) => None,
        })
        .next()
        .unwrap()
}

fn image_of(dm: &DataManager, id: DescriptorId) -> ByteRegion {
    let mut region = ByteRegion::new(None);
    dm.write(id, &mut region).unwrap();
    region
}

#[test]
fn test_cyclic_graph_survives() {
    start_logging();

    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let a = new_node(&f, 1, HostValue::Null);
    let b = new_node(&f, 2, HostValue::Ref(a.clone()));
    a.set_field("next", HostValue::Ref(b.clone()));
    let da = dm.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(a), None)
        .unwrap()
        .as_descriptor()
        .unwrap();
    let db = dm.get(da, f.node_next).and_then(|v| v.as_descriptor()).unwrap();

    let h = HostRef::new_object(f.holder, vec![("p", HostValue::Ref(new_point(&f, 3, 4)))]);
    let dh = dm.convert_to_object_descriptor(f.holder, Attributes::MUTABLE, None, &HostValue::Ref(h), None)
        .unwrap()
        .as_descriptor()
        .unwrap();
    let cp = dm.create_code_pointer(CodeTarget::Method(f.run));

    let mut buf = vec![];
    serialize(&mut buf, &dm).unwrap();
    let restored = deserialize(&buf[..], &DataOptions::default()).unwrap();

    assert_eq!(restored.len(), dm.len());
    assert_eq!(restored.registered().len(), dm.registered().len());
    assert_eq!(restored.type_system().types_count(), dm.type_system().types_count());
    assert_eq!(restored.type_system().full_name(f.node), "Node");

    // the cycle is rebuilt on both sides
    assert_eq!(restored.get(da, f.node_next), Some(DataValue::Descriptor(db)));
    assert_eq!(restored.get(db, f.node_next), Some(DataValue::Descriptor(da)));
    let ha = host_of(&restored, da);
    let hb = host_of(&restored, db);
    assert_eq!(ha.field("next"), Some(HostValue::Ref(hb.clone())));
    assert_eq!(hb.field("next"), Some(HostValue::Ref(ha)));

    let nested = restored.get(dh, f.holder_p).and_then(|v| v.as_descriptor()).unwrap();
    assert_eq!(restored.descriptor(nested).unwrap().nesting, Some(Nesting::in_field(dh, f.holder_p)));
    assert_eq!(restored.get(nested, f.point_y), Some(DataValue::Scalar(ScalarValue::I32(4))));

    assert_eq!(restored.get_code_pointer_from_unique_id(cp), Some(CodeTarget::Method(f.run)));
    assert_eq!(restored.create_code_pointer(CodeTarget::Method(f.fail)), cp + 2);

    // the image does not depend on where the descriptors came from
    for &id in &[da, db, dh] {
        let before = image_of(&dm, id);
        let after = image_of(&restored, id);
        assert_eq!(before.bytes(), after.bytes());
        assert_eq!(before.relocations(), after.relocations());
    }
}

#[test]
fn test_restored_manager_keeps_working() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let a = new_node(&f, 1, HostValue::Null);
    dm.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(a), None).unwrap();

    let mut buf = vec![];
    serialize(&mut buf, &dm).unwrap();
    let restored = deserialize(&buf[..], &DataOptions::default()).unwrap();

    // new sources keep deduplicating against the restored registry
    let fresh = new_node(&f, 5, HostValue::Null);
    let first = restored.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(fresh.clone()), None).unwrap();
    let second = restored.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(fresh), None).unwrap();
    assert_eq!(first, second);
    assert_eq!(restored.len(), dm.len() + 1);
}

#[test]
fn test_unknown_version() {
    let (ts, _) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let mut buf = vec![];
    serialize(&mut buf, &dm).unwrap();
    assert_eq!(buf[0] as usize, VERSION.len());
    buf[1] = b'x';

    match deserialize(&buf[..], &DataOptions::default()) {
        Err(DataError::Format(_)) => {}
        Err(other) => panic!("unexpected {:?}", other),
        Ok(_) => panic!("a foreign version was accepted")
    }
}

#[test]
fn test_truncated_stream() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));
    dm.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(new_node(&f, 1, HostValue::Null)), None).unwrap();

    let mut buf = vec![];
    serialize(&mut buf, &dm).unwrap();
    let half = buf.len() / 2;
    assert!(deserialize(&buf[..half], &DataOptions::default()).is_err());
}

#[test]
fn test_external_data_is_not_restored() {
    let (ts, _) = fixture();
    let dm = DataManager::new(Arc::new(ts));
    let id = dm.build_external_descriptor(Arc::new(RawBlob::new(vec![1, 2, 3, 4])), Attributes::CONSTANT, None);

    let mut buf = vec![];
    serialize(&mut buf, &dm).unwrap();
    let restored = deserialize(&buf[..], &DataOptions::default()).unwrap();

    let mut region = ByteRegion::new(None);
    match restored.write(id, &mut region) {
        Err(DataError::Unsupported(_)) => {}
        other => panic!("unexpected {:?}", other)
    }
}

#[test]
fn test_long_list_survives() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));
    let nodes = new_list(&f, 20_000);
    let head = dm.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(nodes[0].clone()), None)
        .unwrap()
        .as_descriptor()
        .unwrap();

    let mut buf = vec![];
    serialize(&mut buf, &dm).unwrap();
    let restored = deserialize(&buf[..], &DataOptions::default()).unwrap();
    assert_eq!(restored.len(), dm.len());

    let mut count = 0;
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        assert_eq!(restored.get(id, f.node_value), Some(DataValue::Scalar(ScalarValue::I32(count))));
        count += 1;
        cursor = restored.get(id, f.node_next).and_then(|v| v.as_descriptor());
    }
    assert_eq!(count, 20_000);

    // the host graph is rebuilt as well
    let mut hosts = vec![host_of(&restored, head)];
    while let Some(next) = hosts[hosts.len() - 1].field("next").and_then(|v| v.as_ref().cloned()) {
        hosts.push(next);
    }
    assert_eq!(hosts.len(), 20_000);
    assert_eq!(hosts[19_999].field("value"), Some(HostValue::i32(19_999)));

    unlink(&hosts);
    unlink(&nodes);
}
