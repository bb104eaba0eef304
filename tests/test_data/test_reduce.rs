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

use std::collections::HashSet;
use std::sync::Arc;

use zdata::data::*;
use zdata::host::*;
use zdata::image::*;
use zdata::typesystem::*;
use zdata::DataError;

use crate::common::*;

struct Graph {
    dm: DataManager,
    f: Fixture,
    a: DescriptorId,
    b: DescriptorId,
    c: DescriptorId,
    d: DescriptorId,
}

/// a -> b is kept, d -> c loses its target
fn graph() -> Graph {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));

    let convert = |obj: &HostRef| dm.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(obj.clone()), None)
        .unwrap()
        .as_descriptor()
        .unwrap();
    let lookup = |obj: &HostRef| dm.get_object_descriptor(&HostValue::Ref(obj.clone()))
        .and_then(|v| v.as_descriptor())
        .unwrap();

    let hb = new_node(&f, 2, HostValue::Null);
    let a = convert(&new_node(&f, 1, HostValue::Ref(hb.clone())));
    let b = lookup(&hb);
    let hc = new_node(&f, 3, HostValue::Null);
    let d = convert(&new_node(&f, 4, HostValue::Ref(hc.clone())));
    let c = lookup(&hc);

    Graph { dm: dm, f: f, a: a, b: b, c: c, d: d }
}

#[test]
fn test_estimate_then_commit() {
    start_logging();

    let g = graph();
    let mut reachability = ReachabilitySet::new();
    include_all(&g.dm, &mut reachability, &[g.c]);

    let before = g.dm.len();
    g.dm.reduce(&mut reachability, false).unwrap();
    reachability.check_consistency().unwrap();

    // the estimate only reports
    assert!(reachability.is_prohibited(Entity::Descriptor(g.c)));
    assert_eq!(g.dm.len(), before);
    assert_eq!(g.dm.get(g.d, g.f.node_next), Some(DataValue::Descriptor(g.c)));
    let prohibited = reachability.prohibited_count();

    g.dm.reduce(&mut reachability, true).unwrap();
    reachability.check_consistency().unwrap();
    assert_eq!(reachability.prohibited_count(), prohibited);

    let kept: HashSet<DescriptorId> = g.dm.registered().into_iter().map(|(_, id)| id).collect();
    assert!(kept.is_superset(&hashset!{g.a, g.b, g.d}));
    assert!(!kept.contains(&g.c));
    assert!(g.dm.descriptor(g.c).is_none());

    assert_eq!(g.dm.get(g.a, g.f.node_next), Some(DataValue::Descriptor(g.b)));
    assert!(!g.dm.has(g.d, g.f.node_next));
    assert!(g.dm.has(g.d, g.f.node_value));
}

#[test]
fn test_unreachable_fields_are_dropped() {
    let g = graph();
    let mut without_value = ReachabilitySet::new();
    let ts = g.dm.type_system().clone();
    for index in 0..ts.types_count() {
        let ty = TypeId(index as u32);
        without_value.include(Entity::Type(ty));
        for field in ts.instance_fields(ty) {
            if field != g.f.node_value {
                without_value.include(Entity::Field(field));
            }
        }
    }
    for (_, id) in g.dm.registered() {
        without_value.include(Entity::Descriptor(id));
    }

    g.dm.reduce(&mut without_value, false).unwrap();
    g.dm.reduce(&mut without_value, true).unwrap();

    assert!(g.dm.has(g.a, g.f.node_next));
    assert!(!g.dm.has(g.a, g.f.node_value));
    assert_eq!(without_value.prohibited_count(), 0);
}

#[test]
fn test_reachable_descriptor_needs_its_type() {
    let g = graph();
    let mut reachability = ReachabilitySet::new();
    for (_, id) in g.dm.registered() {
        reachability.include(Entity::Descriptor(id));
    }

    match g.dm.reduce(&mut reachability, false) {
        Err(DataError::TypeConsistency(_)) => {}
        other => panic!("unexpected {:?}", other)
    }
}

#[test]
fn test_included_types_are_reported() {
    let g = graph();
    let mut reachability = ReachabilitySet::new();
    reachability.include(Entity::Field(g.f.node_next));

    g.dm.include_extra_types(g.a, &mut reachability, None).unwrap();
    let mut pending = vec![];
    while let Some(entity) = reachability.pop_pending() {
        pending.push(entity);
    }

    assert!(pending.contains(&Entity::Type(g.f.node)));
    assert!(pending.contains(&Entity::Descriptor(g.b)));
    assert!(!pending.contains(&Entity::Descriptor(g.a)));
}

#[test]
fn test_commit_without_estimate() {
    let estimated = graph();
    let mut first = ReachabilitySet::new();
    include_all(&estimated.dm, &mut first, &[estimated.c]);
    estimated.dm.reduce(&mut first, false).unwrap();
    estimated.dm.reduce(&mut first, true).unwrap();

    let g = graph();
    let mut reachability = ReachabilitySet::new();
    include_all(&g.dm, &mut reachability, &[g.c]);
    g.dm.reduce(&mut reachability, true).unwrap();
    reachability.check_consistency().unwrap();

    // the referrer is registered before its target and still loses the reference
    assert!(reachability.is_prohibited(Entity::Descriptor(g.c)));
    assert!(g.dm.descriptor(g.c).is_none());
    assert!(!g.dm.has(g.d, g.f.node_next));
    assert_eq!(g.dm.get(g.a, g.f.node_next), Some(DataValue::Descriptor(g.b)));

    let ids = |dm: &DataManager| dm.registered().into_iter().map(|(_, id)| id).collect::<Vec<_>>();
    assert_eq!(ids(&g.dm), ids(&estimated.dm));
    assert_eq!(reachability.prohibited_count(), first.prohibited_count());
    assert_eq!(g.dm.len(), estimated.dm.len());
}

#[test]
fn test_freed_descriptor_is_reported() {
    let g = graph();
    let mut reachability = ReachabilitySet::new();
    include_all(&g.dm, &mut reachability, &[g.c]);
    g.dm.reduce(&mut reachability, true).unwrap();

    assert_eq!(g.dm.get(g.c, g.f.node_value), None);
    assert!(!g.dm.has(g.c, g.f.node_value));
    assert_eq!(g.dm.array_len(g.c), None);
    assert_eq!(g.dm.array_get(g.c, 0), None);
    assert!(g.dm.describe(g.c, false).starts_with("$Freed"));

    assert!(g.dm.set(g.c, g.f.node_value, DataValue::Scalar(ScalarValue::I32(1))).is_err());
    assert!(g.dm.write(g.c, &mut ByteRegion::new(None)).is_err());
    assert!(g.dm.get_data_at_offset(g.c, &[], 0, 4).is_err());
    assert!(g.dm.include_extra_types(g.c, &mut ReachabilitySet::new(), None).is_err());

    // the survivors are untouched
    assert_eq!(g.dm.get(g.d, g.f.node_value), Some(DataValue::Scalar(ScalarValue::I32(4))));
}

#[test]
fn test_long_list_is_cut() {
    let (ts, f) = fixture();
    let dm = DataManager::new(Arc::new(ts));
    let nodes = new_list(&f, 20_000);
    dm.convert_to_object_descriptor(f.node, Attributes::CONSTANT, None, &HostValue::Ref(nodes[0].clone()), None).unwrap();

    let ids: Vec<DescriptorId> = nodes.iter()
        .map(|node| dm.get_object_descriptor(&HostValue::Ref(node.clone())).and_then(|v| v.as_descriptor()).unwrap())
        .collect();

    let mut reachability = ReachabilitySet::new();
    include_all(&dm, &mut reachability, &[ids[10_000]]);
    dm.reduce(&mut reachability, true).unwrap();

    assert!(dm.descriptor(ids[10_000]).is_none());
    assert!(!dm.has(ids[9_999], f.node_next));
    assert_eq!(dm.get(ids[10_001], f.node_next), Some(DataValue::Descriptor(ids[10_002])));
    assert_eq!(dm.get(ids[0], f.node_next), Some(DataValue::Descriptor(ids[1])));

    unlink(&nodes);
}
