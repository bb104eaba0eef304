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

extern crate zdata;
extern crate log;
#[macro_use]
extern crate maplit;
extern crate simple_logger;

mod test_data;
mod test_serialize;

mod common {
    use std::fmt;

    use zdata::data::DataManager;
    use zdata::host::*;
    use zdata::typesystem::*;

    /// ids of the types the tests build their graphs from
    #[derive(Copy, Clone, Debug)]
    pub struct Fixture {
        pub node: TypeId,
        pub node_next: FieldId,
        pub node_value: FieldId,
        pub point: TypeId,
        pub point_x: FieldId,
        pub point_y: FieldId,
        pub holder: TypeId,
        pub holder_p: FieldId,
        pub int_array: TypeId,
        pub run: MethodId,
        pub fail: MethodId,
    }

    /// the runtime types plus
    ///
    /// ```text
    /// class Node   { next: Node @0, value: i32 @4 }
    /// struct Point { x: i32 @0, y: i32 @4 }
    /// class Holder { p: Point @0 }
    /// ```
    pub fn fixture() -> (TypeSystem, Fixture) {
        let mut ts = TypeSystem::with_runtime_types();
        let object = ts.well_known_types().object.unwrap();
        let i32_type = ts.scalar_type(ScalarKind::I32).unwrap();

        let node = ts.add_type("Node", TypeKind::Class, Some(object), 8);
        let node_next = ts.add_field(node, "next", node, 0);
        let node_value = ts.add_field(node, "value", i32_type, 4);

        let point = ts.add_type("Point", TypeKind::Value, None, 8);
        let point_x = ts.add_field(point, "x", i32_type, 0);
        let point_y = ts.add_field(point, "y", i32_type, 4);

        let holder = ts.add_type("Holder", TypeKind::Class, Some(object), 8);
        let holder_p = ts.add_field(holder, "p", point, 0);

        let int_array = ts.array_of(i32_type);
        let run = ts.add_method(node, "Run", None);
        let fail = ts.add_method(node, "Fail", None);

        let fixture = Fixture {
            node: node,
            node_next: node_next,
            node_value: node_value,
            point: point,
            point_x: point_x,
            point_y: point_y,
            holder: holder,
            holder_p: holder_p,
            int_array: int_array,
            run: run,
            fail: fail,
        };
        (ts, fixture)
    }

    pub fn new_node(f: &Fixture, value: i32, next: HostValue) -> HostRef {
        HostRef::new_object(f.node, vec![("next", next), ("value", HostValue::i32(value))])
    }

    pub fn new_point(f: &Fixture, x: i32, y: i32) -> HostRef {
        HostRef::new_object(f.point, vec![("x", HostValue::i32(x)), ("y", HostValue::i32(y))])
    }

    /// `len` nodes linked head first, each valued by its position
    pub fn new_list(f: &Fixture, len: usize) -> Vec<HostRef> {
        let mut nodes = Vec::with_capacity(len);
        let mut next = HostValue::Null;
        for value in (0..len).rev() {
            let node = new_node(f, value as i32, next);
            next = HostValue::Ref(node.clone());
            nodes.push(node);
        }
        nodes.reverse();
        nodes
    }

    /// breaks the links of a list, dropping a long chain would recurse
    pub fn unlink(nodes: &[HostRef]) {
        for node in nodes {
            node.set_field("next", HostValue::Null);
        }
    }

    /// includes every type, every field and every registered descriptor, except for
    /// the descriptors in `except`
    pub fn include_all(dm: &DataManager, reachability: &mut ReachabilitySet, except: &[zdata::data::DescriptorId]) {
        let ts = dm.type_system();
        for index in 0..ts.types_count() {
            let ty = TypeId(index as u32);
            reachability.include(Entity::Type(ty));
            for field in ts.instance_fields(ty) {
                reachability.include(Entity::Field(field));
            }
        }
        for (_, id) in dm.registered() {
            if !except.contains(&id) {
                reachability.include(Entity::Descriptor(id));
            }
        }
    }

    #[allow(dead_code)]
    pub fn start_logging() {
        simple_logger::init_with_level(log::Level::Trace).ok();
    }

    #[allow(dead_code)]
    pub fn assert_debug_str<T: fmt::Debug, U: fmt::Debug> (left: T, right: U) {
        assert_eq!(format!("{:?}", left), format!("{:?}", right))
    }
}
