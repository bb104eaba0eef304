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

use zdata_utils::LinkedHashSet;

use crate::data::DescriptorId;
use crate::errors::Result;
use crate::host::HostId;
use crate::typesystem::{BlockId, FieldId, MethodId, TypeId};

/// Anything the reachability analysis can keep or prohibit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Type(TypeId),
    Field(FieldId),
    Method(MethodId),
    Block(BlockId),
    Host(HostId),
    Descriptor(DescriptorId),
}

/// The reachability analysis as seen by the data layer.
pub trait Reachability {
    fn contains(&self, entity: Entity) -> bool;
    fn is_prohibited(&self, entity: Entity) -> bool;
    /// queues an entity for inclusion
    fn expand_pending(&mut self, entity: Entity);
    /// marks an entity as unusable from now on
    fn expand_prohibition(&mut self, entity: Entity);
}

/// A reachability set with an explicit worklist: entities queued by `expand_pending`
/// become included when the driver pops them.
#[derive(Debug, Default)]
pub struct ReachabilitySet {
    included: HashSet<Entity>,
    prohibited: HashSet<Entity>,
    pending: LinkedHashSet<Entity>,
}

impl ReachabilitySet {
    pub fn new() -> ReachabilitySet {
        ReachabilitySet::default()
    }

    pub fn include(&mut self, entity: Entity) -> bool {
        self.pending.remove(&entity);
        self.included.insert(entity)
    }

    pub fn pop_pending(&mut self) -> Option<Entity> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn included_count(&self) -> usize {
        self.included.len()
    }

    pub fn prohibited_count(&self) -> usize {
        self.prohibited.len()
    }

    /// fails if an entity is both included and prohibited
    pub fn check_consistency(&self) -> Result<()> {
        match self.included.intersection(&self.prohibited).next() {
            Some(entity) => Err(type_error!("{:?} cannot belong both to the reachable set and the prohibited set", entity)),
            None => Ok(())
        }
    }
}

impl Reachability for ReachabilitySet {
    fn contains(&self, entity: Entity) -> bool {
        self.included.contains(&entity)
    }

    fn is_prohibited(&self, entity: Entity) -> bool {
        self.prohibited.contains(&entity)
    }

    fn expand_pending(&mut self, entity: Entity) {
        if !self.included.contains(&entity) && !self.prohibited.contains(&entity) {
            self.pending.insert(entity);
        }
    }

    fn expand_prohibition(&mut self, entity: Entity) {
        self.pending.remove(&entity);
        self.prohibited.insert(entity);
    }
}
