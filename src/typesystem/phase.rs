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

use std::collections::HashMap;

use crate::typesystem::{FieldId, WellKnownFields};

/// Compilation phases, in execution order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    LoadTypeSystem,
    ExpandAggregateTypes,
    PrepareExternalMethods,
    CompleteTypeSystem,
    ReduceTypeSystem,
    OrderStaticConstructors,
    LayoutTypes,
    PrepareForCodeGeneration,
    GenerateImage,
    Done,
}

const ALL_PHASES: [Phase; 10] = [
    Phase::LoadTypeSystem,
    Phase::ExpandAggregateTypes,
    Phase::PrepareExternalMethods,
    Phase::CompleteTypeSystem,
    Phase::ReduceTypeSystem,
    Phase::OrderStaticConstructors,
    Phase::LayoutTypes,
    Phase::PrepareForCodeGeneration,
    Phase::GenerateImage,
    Phase::Done,
];

impl Phase {
    pub fn from_name(name: &str) -> Option<Phase> {
        ALL_PHASES.iter().cloned().find(|p| format!("{:?}", p) == name)
    }
}

/// The first moment a value may be materialized for a field.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Availability {
    /// once the phase has completed
    After(Phase),
    /// as soon as the phase starts
    From(Phase),
}

impl Availability {
    /// `None` is the time before the first phase
    pub fn is_available(self, phase: Option<Phase>) -> bool {
        match phase {
            None => false,
            Some(phase) => match self {
                Availability::After(milestone) => phase > milestone,
                Availability::From(milestone) => phase >= milestone,
            }
        }
    }
}

/// Fields whose contents are only valid after some phase has run. Converting a value
/// for them earlier would create a descriptor that is discarded soon after.
#[derive(Clone, Debug, Default)]
pub struct DeferredFields {
    table: HashMap<FieldId, Availability>,
}

impl DeferredFields {
    pub fn new(wkf: &WellKnownFields) -> DeferredFields {
        let mut table = HashMap::new();

        // method tables are final once the type system is reduced
        let after_reduction = [
            wkf.type_representation_method_table,
            wkf.type_representation_interface_method_tables,
            wkf.vtable_method_pointers,
            wkf.vtable_interface_map,
        ];
        for fd in after_reduction.iter().filter_map(|fd| *fd) {
            table.insert(fd, Availability::After(Phase::ReduceTypeSystem));
        }

        // GC info is recomputed by the refresh that runs as part of LayoutTypes
        if let Some(fd) = wkf.vtable_gc_info {
            table.insert(fd, Availability::From(Phase::LayoutTypes));
        }

        DeferredFields { table: table }
    }

    pub fn availability(&self, field: FieldId) -> Option<Availability> {
        self.table.get(&field).cloned()
    }

    /// true if a value for `field` must not be materialized in `phase`
    pub fn should_skip(&self, field: FieldId, phase: Option<Phase>) -> bool {
        match self.table.get(&field) {
            Some(availability) => !availability.is_available(phase),
            None => false
        }
    }
}
