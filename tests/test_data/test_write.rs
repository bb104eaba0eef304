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
use zdata::typesystem::*;

use crate::common::*;

fn write(dm: &DataManager, value: &DataValue) -> ByteRegion {
    let mut region = ByteRegion::new(None);
    dm.write(value.as_descriptor().unwrap(), &mut region).unwrap();
    region
}

#[test]
fn test_code_pointers_resolve_to_blocks() {
    start_logging();

    let (ts, f) = fixture();
    let code_pointer = ts.well_known_types().code_pointer.unwrap();
    let table_type = ts.find_type("CodePointer[]").unwrap();
    let ts = Arc::new(ts);
    let dm = DataManager::new(ts.clone());

    let entry = ts.new_basic_block();
    let handler = ts.new_basic_block();
    ts.set_code_for_method(f.run, entry);

    let pointer = |target: i32| HostValue::Ref(HostRef::new_object(code_pointer, vec![
        ("Target", HostValue::Scalar(ScalarValue::IntPtr(target))),
    ]));
    let table = HostRef::new_array(table_type, HostArray::Values(vec![
        pointer(dm.create_code_pointer(CodeTarget::Method(f.run))),
        pointer(dm.create_code_pointer(CodeTarget::ExceptionHandler(handler))),
        // no code was generated for this one
        pointer(dm.create_code_pointer(CodeTarget::Method(f.fail))),
        // even ids are plain integers
        pointer(8),
    ]));

    let value = dm.convert_to_object_descriptor(table_type, Attributes::CONSTANT, None, &HostValue::Ref(table), None).unwrap();
    let region = write(&dm, &value);

    // header, length and four code pointers
    assert_eq!(region.bytes().len(), 8 + 4 + 16);
    assert_eq!(&region.bytes()[8..12], &[4, 0, 0, 0]);

    let blocks: Vec<RelocationEntry> = region.relocations().iter()
        .filter(|r| match r.target { Relocation::BasicBlock(_) => true, _ => false })
        .cloned()
        .collect();
    assert_eq!(blocks, vec![
        RelocationEntry { offset: 12, target: Relocation::BasicBlock(entry) },
        RelocationEntry { offset: 16, target: Relocation::BasicBlock(handler) },
    ]);
    assert_eq!(&region.bytes()[20..24], &[0, 0, 0, 0]);
    assert_eq!(&region.bytes()[24..28], &[8, 0, 0, 0]);
}

#[test]
fn test_primitive_array_fast_path() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let packed = HostRef::new_array(f.int_array, HostArray::Ints(vec![1, -2, 3]));
    let boxed = HostRef::new_array(f.int_array, HostArray::Values(vec![
        HostValue::i32(1), HostValue::i32(-2), HostValue::i32(3),
    ]));

    let a = dm.convert_to_object_descriptor(f.int_array, Attributes::CONSTANT, None, &HostValue::Ref(packed), None).unwrap();
    let b = dm.convert_to_object_descriptor(f.int_array, Attributes::CONSTANT, None, &HostValue::Ref(boxed), None).unwrap();
    assert!(a != b);

    let ra = write(&dm, &a);
    let rb = write(&dm, &b);
    assert_eq!(ra.bytes(), rb.bytes());
    assert_eq!(ra.relocations(), rb.relocations());
    assert_eq!(&ra.bytes()[16..20], &(-2i32).to_le_bytes());
}

#[test]
fn test_packed_arrays_match_elements() {
    let (mut ts, _) = fixture();
    let cases = vec![
        (ScalarKind::U8, HostArray::Bytes(vec![1, 0xff, 3]),
         vec![ScalarValue::U8(1), ScalarValue::U8(0xff), ScalarValue::U8(3)]),
        (ScalarKind::Char, HostArray::Chars(vec![0x61, 0x3b1, 0]),
         vec![ScalarValue::Char(0x61), ScalarValue::Char(0x3b1), ScalarValue::Char(0)]),
        (ScalarKind::U32, HostArray::UInts(vec![7, 0xdead_beef, 9]),
         vec![ScalarValue::U32(7), ScalarValue::U32(0xdead_beef), ScalarValue::U32(9)]),
    ];
    let types: Vec<TypeId> = cases.iter()
        .map(|&(kind, _, _)| {
            let elem = ts.scalar_type(kind).unwrap();
            ts.array_of(elem)
        })
        .collect();
    let dm = DataManager::new(Arc::new(ts));

    for ((kind, packed, elements), ty) in cases.into_iter().zip(types) {
        let boxed = HostArray::Values(elements.into_iter().map(HostValue::Scalar).collect());
        let a = dm.convert_to_object_descriptor(ty, Attributes::CONSTANT, None, &HostValue::Ref(HostRef::new_array(ty, packed)), None).unwrap();
        let b = dm.convert_to_object_descriptor(ty, Attributes::CONSTANT, None, &HostValue::Ref(HostRef::new_array(ty, boxed)), None).unwrap();

        let ra = write(&dm, &a);
        let rb = write(&dm, &b);
        assert_eq!(ra.bytes(), rb.bytes(), "{:?}", kind);
        assert_eq!(ra.relocations(), rb.relocations(), "{:?}", kind);
        assert_eq!(dm.array_len(a.as_descriptor().unwrap()), Some(3));
    }

    // the middle element is laid out right after the length
    let chars = dm.type_system().find_type("Char[]").unwrap();
    let packed = HostRef::new_array(chars, HostArray::Chars(vec![1, 0x3b1, 2]));
    let region = write(&dm, &dm.convert_to_object_descriptor(chars, Attributes::CONSTANT, None, &HostValue::Ref(packed), None).unwrap());
    assert_eq!(&region.bytes()[14..16], &0x3b1u16.to_le_bytes());
}

#[test]
fn test_object_layout() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let b = new_node(&f, 2, HostValue::Null);
    let a = new_node(&f, 0x01020304, HostValue::Ref(b.clone()));
    let da = dm.convert_to_object_descriptor(f.node, Attributes::MUTABLE, None, &HostValue::Ref(a), None).unwrap();
    let db = dm.get_object_descriptor(&HostValue::Ref(b)).and_then(|v| v.as_descriptor()).unwrap();

    let region = write(&dm, &da);
    assert_eq!(region.bytes().len(), 16);
    // mutable objects are never reclaimed, but they are not read only
    assert_eq!(&region.bytes()[0..4], &[UNRECLAIMABLE_OBJECT as u8, 0, 0, 0]);
    assert_eq!(&region.bytes()[12..16], &[4, 3, 2, 1]);
    assert_eq!(region.pointer_offset(), 8);

    assert!(region.relocations().contains(&RelocationEntry { offset: 8, target: Relocation::Descriptor(db) }));
    assert!(region.annotations().iter().any(|a| a.offset == 12 && a.field == f.node_value));
}

#[test]
fn test_embedded_struct_layout() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let h = HostRef::new_object(f.holder, vec![("p", HostValue::Ref(new_point(&f, 7, 9)))]);
    let d = dm.convert_to_object_descriptor(f.holder, Attributes::CONSTANT, None, &HostValue::Ref(h), None).unwrap();

    let region = write(&dm, &d);
    assert_eq!(&region.bytes()[0..4], &[READ_ONLY_OBJECT as u8, 0, 0, 0]);
    assert_eq!(&region.bytes()[8..12], &[7, 0, 0, 0]);
    assert_eq!(&region.bytes()[12..16], &[9, 0, 0, 0]);
    // the vtable is the only pointer
    assert_eq!(region.relocations().len(), 1);
}

#[test]
fn test_uninitialized_placement_cuts_payload() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let id = dm.build_array_descriptor(f.int_array, Attributes::MUTABLE, Some(PlacementRequirements::uninitialized(4)), 100).unwrap();
    let mut region = ByteRegion::new(Some(PlacementRequirements::uninitialized(4)));
    dm.write(id, &mut region).unwrap();

    assert_eq!(region.bytes().len(), 8 + 4 + 400);
    assert_eq!(region.payload_cutoff(), 12);
    assert_eq!(region.payload().len(), 12);
}

#[test]
fn test_external_data() {
    let (ts, _) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let id = dm.build_external_descriptor(Arc::new(RawBlob::new(vec![1, 2, 3])), Attributes::CONSTANT, None);
    let mut region = ByteRegion::new(None);
    dm.write(id, &mut region).unwrap();
    assert_eq!(&region.bytes()[0..3], &[1, 2, 3]);

    assert!(dm.get_data_at_offset(id, &[], 0, 0).is_err());
    assert!(dm.describe(id, false).starts_with("$External"));
}
