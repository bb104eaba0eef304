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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use zdata_utils::LinkedHashMap;

use crate::data::*;
use crate::errors::{DataError, Result};
use crate::host::{HostRef, HostValue};
use crate::image::{PlacementRequirements, SequentialRegion};
use crate::options::DataOptions;
use crate::serialize::*;
use crate::typesystem::*;

/// Multi-use word of objects the garbage collector must never reclaim.
pub const UNRECLAIMABLE_OBJECT: u32 = 0x4;
/// Multi-use word of constant objects, which are also never reclaimed.
pub const READ_ONLY_OBJECT: u32 = 0x6;

/// What a registered descriptor was created from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataKey {
    Host(HostRef),
    /// built by the manager, keyed by itself
    Synthetic(DescriptorId),
}

impl Default for DataKey {
    fn default() -> DataKey {
        DataKey::Synthetic(DescriptorId::default())
    }
}

impl DataKey {
    fn entity(&self) -> Entity {
        match *self {
            DataKey::Host(ref host) => Entity::Host(host.id()),
            DataKey::Synthetic(id) => Entity::Descriptor(id),
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        let (mut tag, mut host, mut id) = match *self {
            DataKey::Host(ref host) => (0u8, Some(host.clone()), DescriptorId::default()),
            DataKey::Synthetic(id) => (1, None, id),
        };
        context.transform_u8(&mut tag)?;

        *self = match tag {
            0 => {
                transform_host_object(context, &mut host)?;
                DataKey::Host(host.ok_or_else(|| DataError::Format("registry key without source".to_string()))?)
            }
            1 => {
                transform_id(context, &mut id)?;
                DataKey::Synthetic(id)
            }
            _ => return Err(DataError::Format(format!("unknown registry key tag {}", tag)))
        };
        Ok(())
    }
}

/// What a code pointer points to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodeTarget {
    Method(MethodId),
    ExceptionHandler(BlockId),
    /// any other host object, written as the raw id
    Other(HostRef),
}

impl Default for CodeTarget {
    fn default() -> CodeTarget {
        CodeTarget::Method(MethodId::default())
    }
}

impl CodeTarget {
    fn entity(&self) -> Entity {
        match *self {
            CodeTarget::Method(m) => Entity::Method(m),
            CodeTarget::ExceptionHandler(bb) => Entity::Block(bb),
            CodeTarget::Other(ref host) => Entity::Host(host.id()),
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        let (mut tag, mut raw, mut host) = match *self {
            CodeTarget::Method(m) => (0u8, m.0, None),
            CodeTarget::ExceptionHandler(bb) => (1, bb.0, None),
            CodeTarget::Other(ref host) => (2, 0, Some(host.clone())),
        };
        context.transform_u8(&mut tag)?;

        *self = match tag {
            0 => {
                context.transform_u32(&mut raw)?;
                CodeTarget::Method(MethodId(raw))
            }
            1 => {
                context.transform_u32(&mut raw)?;
                CodeTarget::ExceptionHandler(BlockId(raw))
            }
            2 => {
                transform_host_object(context, &mut host)?;
                CodeTarget::Other(host.ok_or_else(|| DataError::Format("code pointer without target".to_string()))?)
            }
            _ => return Err(DataError::Format(format!("unknown code target tag {}", tag)))
        };
        Ok(())
    }
}

/// Everything the manager lock protects.
#[derive(Default)]
pub struct DataState {
    /// the arena, freed slots are `None`
    descriptors: Vec<Option<DataDescriptor>>,
    /// source to descriptor, in creation order
    data: LinkedHashMap<DataKey, DescriptorId>,
    code_pointers: LinkedHashMap<CodeTarget, i32>,
    /// derived from `code_pointers` on first lookup
    code_pointers_reverse: Option<HashMap<i32, CodeTarget>>,
    next_code_pointer_id: i32,
}

fn transform_arena(context: &mut dyn TransformationContext, descriptors: &mut Vec<Option<DataDescriptor>>) -> Result<()> {
    let ty = SerialType::list_of(DataDescriptor::declared_type());
    match context.transform_signature(Presence::Fresh(&ty), Some(&ty))? {
        Signature::Fresh { .. } => {}
        other => return Err(DataError::Format(format!("expected the descriptor arena, found {:?}", other)))
    }

    let mut count = descriptors.len() as i32;
    context.transform_i32(&mut count)?;
    transform_items(context, descriptors, count, "arena", || None, |context, slot| transform_owned(context, slot))
}

/// visits the persisted state of a manager: its type system, the descriptor arena, the
/// registry and the code pointer table. The reverse code pointer map is derived and
/// not persisted.
pub fn transform_manager_fields(context: &mut dyn TransformationContext, ts: &mut Option<Arc<TypeSystem>>, state: &mut DataState) -> Result<()> {
    transform_type_system(context, ts)?;
    transform_arena(context, &mut state.descriptors)?;

    transform_map(context, &mut state.data,
        &SerialType::map_of(SerialType::class("DataKey"), DataDescriptor::declared_type()),
        |context, key| key.apply_transformation(context),
        |context, id| transform_id(context, id))?;

    transform_map(context, &mut state.code_pointers,
        &SerialType::map_of(SerialType::class("CodeTarget"), ScalarKind::I32.serial_type()),
        |context, target| target.apply_transformation(context),
        |context, id| context.transform_i32(id))?;

    context.transform_i32(&mut state.next_code_pointer_id)?;
    state.code_pointers_reverse = None;
    Ok(())
}

/// Owns every descriptor and deduplicates conversions of the same source.
///
/// All operations run under one lock: a conversion checks the registry and inserts
/// into it in a single critical section.
pub struct DataManager {
    ts: Arc<TypeSystem>,
    deferred: DeferredFields,
    verbose: bool,
    state: Mutex<DataState>,
}

impl DataManager {
    pub fn new(ts: Arc<TypeSystem>) -> DataManager {
        DataManager::from_parts(ts, DataState::default(), false)
    }

    pub fn with_options(ts: Arc<TypeSystem>, options: &DataOptions) -> DataManager {
        DataManager::from_parts(ts, DataState::default(), options.flag_emit_verbose_descriptors)
    }

    fn from_parts(ts: Arc<TypeSystem>, state: DataState, verbose: bool) -> DataManager {
        let deferred = DeferredFields::new(ts.well_known_fields());
        DataManager {
            ts: ts,
            deferred: deferred,
            verbose: verbose,
            state: Mutex::new(state),
        }
    }

    pub fn type_system(&self) -> &Arc<TypeSystem> {
        &self.ts
    }

    fn with_session<T, F>(&self, f: F) -> T
        where F: FnOnce(&mut Session) -> T
    {
        let mut state = self.state.lock().unwrap();
        let mut session = Session {
            ts: &self.ts,
            deferred: &self.deferred,
            verbose: self.verbose,
            state: &mut *state,
            pending: vec![],
        };
        f(&mut session)
    }

    /// runs `f`, then refreshes the reference descriptors its conversions created
    fn with_conversions<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut Session) -> Result<T>
    {
        self.with_session(|s| {
            let ret = f(s)?;
            s.refresh_pending()?;
            Ok(ret)
        })
    }

    // persistence

    pub(crate) fn transform_fields(&self, context: &mut dyn TransformationContext) -> Result<()> {
        let mut ts = Some(self.ts.clone());
        let mut state = self.state.lock().unwrap();
        transform_manager_fields(context, &mut ts, &mut *state)
    }

    pub(crate) fn read_fields(context: &mut dyn TransformationContext, options: &DataOptions) -> Result<DataManager> {
        let mut ts = None;
        let mut state = DataState::default();
        transform_manager_fields(context, &mut ts, &mut state)?;

        let ts = ts.ok_or_else(|| DataError::Format("data manager without type system".to_string()))?;
        Ok(DataManager::from_parts(ts, state, options.flag_emit_verbose_descriptors))
    }

    // lookup and conversion

    /// the descriptor already materialized for `value`, never creates one
    pub fn get_object_descriptor(&self, value: &HostValue) -> Option<DataValue> {
        self.with_session(|s| s.lookup(value))
    }

    /// materializes `value` as an instance of `target`
    pub fn convert_to_object_descriptor(&self, target: TypeId, flags: Attributes, placement: Option<PlacementRequirements>,
                                        value: &HostValue, phase: Option<Phase>) -> Result<DataValue> {
        self.with_conversions(|s| s.convert(target, flags, placement, value, None, phase))
    }

    /// materializes `value` as a propagatable constant of its own type
    pub fn convert_to_object_descriptor_inferred(&self, value: &HostValue, phase: Option<Phase>) -> Result<DataValue> {
        match self.ts.type_of_value(value) {
            Some(target) => self.convert_to_object_descriptor(target, Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION, None, value, phase),
            None => self.get_object_descriptor(value)
                .ok_or_else(|| type_error!("cannot infer the type of {:?}", value))
        }
    }

    pub fn build_object_descriptor(&self, ty: TypeId, flags: Attributes, placement: Option<PlacementRequirements>) -> Result<DescriptorId> {
        self.with_conversions(|s| s.build_object(ty, flags, placement, None))
    }

    pub fn build_array_descriptor(&self, ty: TypeId, flags: Attributes, placement: Option<PlacementRequirements>, length: u32) -> Result<DescriptorId> {
        self.with_conversions(|s| s.build_array(ty, flags, placement, length))
    }

    pub fn build_external_descriptor(&self, context: Arc<dyn ExternalDataContext>, flags: Attributes,
                                     placement: Option<PlacementRequirements>) -> DescriptorId {
        self.with_session(|s| s.build_external(context, flags, placement))
    }

    // code pointers

    /// the odd id standing for `target` in code pointer fields
    pub fn create_code_pointer(&self, target: CodeTarget) -> i32 {
        self.with_session(|s| s.create_code_pointer(target))
    }

    pub fn get_code_pointer_from_unique_id(&self, id: i32) -> Option<CodeTarget> {
        self.with_session(|s| s.code_pointer_target(id))
    }

    // whole graph passes

    /// drops what `reachability` does not keep. With `apply` unset only the
    /// prohibitions are propagated to `reachability`.
    pub fn reduce(&self, reachability: &mut dyn Reachability, apply: bool) -> Result<()> {
        self.with_session(|s| s.reduce_all(reachability, apply))
    }

    /// re-derives the values of every registered descriptor from its source, until no
    /// new descriptor shows up
    pub fn refresh_values(&self, phase: Option<Phase>) -> Result<()> {
        self.with_conversions(|s| s.refresh_all(phase))
    }

    // single descriptor operations

    pub fn include_extra_types(&self, id: DescriptorId, reachability: &mut dyn Reachability, phase: Option<Phase>) -> Result<()> {
        self.with_conversions(|s| s.include_extra_types(id, reachability, phase))
    }

    pub fn write(&self, id: DescriptorId, region: &mut dyn SequentialRegion) -> Result<()> {
        self.with_session(|s| s.write(id, region))
    }

    /// the value a load from `offset` bytes into the descriptor would see, for constant
    /// propagation. `None` when it cannot be known at compile time.
    pub fn get_data_at_offset(&self, id: DescriptorId, access_path: &[FieldId], index: usize, offset: i32) -> Result<Option<DataValue>> {
        self.with_session(|s| s.get_data_at_offset(id, access_path, index, offset))
    }

    // inspection

    /// a snapshot of a live descriptor
    pub fn descriptor(&self, id: DescriptorId) -> Option<DataDescriptor> {
        self.with_session(|s| s.try_get(id).cloned())
    }

    /// registered descriptors in creation order
    pub fn registered(&self) -> Vec<(DataKey, DescriptorId)> {
        self.with_session(|s| s.state.data.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    /// number of live descriptors
    pub fn len(&self) -> usize {
        self.with_session(|s| s.state.descriptors.iter().filter(|dd| dd.is_some()).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn describe(&self, id: DescriptorId, verbose: bool) -> String {
        self.with_session(|s| s.describe(id, verbose))
    }

    // field and element access

    pub fn get(&self, id: DescriptorId, field: FieldId) -> Option<DataValue> {
        self.with_session(|s| s.try_get(id).and_then(|dd| dd.as_object()).and_then(|od| od.values.get(&field).cloned()))
    }

    pub fn has(&self, id: DescriptorId, field: FieldId) -> bool {
        self.with_session(|s| s.try_get(id).and_then(|dd| dd.as_object()).map_or(false, |od| od.values.contains_key(&field)))
    }

    pub fn set(&self, id: DescriptorId, field: FieldId, value: DataValue) -> Result<()> {
        self.with_session(|s| s.set_field(id, field, value))
    }

    /// converts `value` for the type of `field` and stores the result
    pub fn convert_and_set(&self, id: DescriptorId, field: FieldId, value: &HostValue, phase: Option<Phase>) -> Result<DataValue> {
        self.with_conversions(|s| {
            let (field_type, flags) = (s.ts.get_field(field).field_type, s.live(id)?.flags);
            let converted = s.convert(field_type, flags, None, value, Some(Nesting::in_field(id, field)), phase)?;
            s.set_field(id, field, converted.clone())?;
            Ok(converted)
        })
    }

    pub fn array_len(&self, id: DescriptorId) -> Option<u32> {
        self.with_session(|s| s.try_get(id).and_then(|dd| dd.as_array()).map(|ad| ad.length))
    }

    pub fn array_get(&self, id: DescriptorId, index: usize) -> Option<DataValue> {
        self.with_session(|s| s.try_get(id).and_then(|dd| dd.as_array()).and_then(|ad| ad.element(index)))
    }

    pub fn array_set(&self, id: DescriptorId, index: usize, value: DataValue) -> Result<()> {
        self.with_session(|s| s.set_element(id, index, value))
    }
}

/// The manager state while its lock is held. Descriptor algorithms are methods of the
/// session so that they can create and look up other descriptors as they go.
pub struct Session<'a> {
    pub(crate) ts: &'a TypeSystem,
    pub(crate) deferred: &'a DeferredFields,
    pub(crate) verbose: bool,
    pub(crate) state: &'a mut DataState,
    /// reference descriptors converted but not refreshed yet
    pending: Vec<(DescriptorId, Option<Phase>)>,
}

impl<'a> Session<'a> {
    // arena

    fn alloc(&mut self, dd: DataDescriptor) -> DescriptorId {
        let id = DescriptorId(self.state.descriptors.len() as u32);
        self.state.descriptors.push(Some(dd));
        id
    }

    fn try_get(&self, id: DescriptorId) -> Option<&DataDescriptor> {
        self.state.descriptors.get(id.index()).and_then(|dd| dd.as_ref())
    }

    fn try_get_mut(&mut self, id: DescriptorId) -> Option<&mut DataDescriptor> {
        self.state.descriptors.get_mut(id.index()).and_then(|dd| dd.as_mut())
    }

    /// a descriptor named by a caller. A reduction may have freed it since.
    fn live(&self, id: DescriptorId) -> Result<&DataDescriptor> {
        self.try_get(id).ok_or_else(|| type_error!("descriptor {} does not exist", id))
    }

    /// a descriptor reached from the registry, which always exists
    pub(crate) fn get(&self, id: DescriptorId) -> &DataDescriptor {
        match self.try_get(id) {
            Some(dd) => dd,
            None => panic!("descriptor {} does not exist", id)
        }
    }

    pub(crate) fn get_mut(&mut self, id: DescriptorId) -> &mut DataDescriptor {
        match self.try_get_mut(id) {
            Some(dd) => dd,
            None => panic!("descriptor {} does not exist", id)
        }
    }

    fn register(&mut self, key: DataKey, id: DescriptorId) {
        trace_if!(self.verbose, "register {:?} as {}", key, id);
        self.state.data.insert(key, id);
    }

    /// the descriptor of the virtual table of `ty`, if it was materialized
    pub(crate) fn vtable_descriptor(&self, ty: TypeId) -> Option<DescriptorId> {
        let vtable = self.ts.get_type(ty).virtual_table.as_ref()?;
        self.state.data.get(&DataKey::Host(vtable.clone())).cloned()
    }

    // conversion

    pub(crate) fn lookup(&self, value: &HostValue) -> Option<DataValue> {
        match *value {
            HostValue::Null => Some(DataValue::Null),
            HostValue::Scalar(s) => Some(DataValue::Scalar(s)),
            HostValue::Enum(s) => Some(DataValue::Enum(s)),
            HostValue::Descriptor(id) => Some(DataValue::Descriptor(id)),
            HostValue::Ref(ref obj) => self.state.data.get(&DataKey::Host(obj.clone())).map(|id| DataValue::Descriptor(*id)),
            HostValue::Type(_) => None,
        }
    }

    /// `nesting` locates the slot the value goes to. Value types are embedded there,
    /// reference types ignore it.
    pub(crate) fn convert(&mut self, target: TypeId, flags: Attributes, placement: Option<PlacementRequirements>,
                          value: &HostValue, nesting: Option<Nesting>, phase: Option<Phase>) -> Result<DataValue> {
        let obj = match *value {
            HostValue::Null => return Ok(DataValue::Null),
            HostValue::Scalar(s) => return Ok(DataValue::Scalar(s)),
            HostValue::Enum(s) => return Ok(DataValue::Enum(s)),
            HostValue::Descriptor(id) => return Ok(DataValue::Descriptor(id)),
            HostValue::Type(ty) => return Err(type_error!("runtime type of {} cannot be stored in a {}",
                                                           self.ts.full_name(ty), self.ts.full_name(target))),
            HostValue::Ref(ref obj) => obj,
        };

        let source_type = obj.type_id();
        if !self.ts.can_be_assigned_from(target, source_type) {
            return Err(type_error!("cannot store a {} in a {}", self.ts.full_name(source_type), self.ts.full_name(target)));
        }

        let is_value_type = self.ts.is_value_type(source_type);
        if !is_value_type {
            if let Some(id) = self.state.data.get(&DataKey::Host(obj.clone())) {
                return Ok(DataValue::Descriptor(*id));
            }
        }

        // deferred fields only hold back new descriptors
        if let Some(Nesting { field: Some(field), .. }) = nesting {
            if self.deferred.should_skip(field, phase) {
                trace!("skip {} of {:?} until it is available", self.ts.get_field(field).name, obj);
                return Ok(DataValue::Null);
            }
        }

        let kind = match obj.array_len() {
            Some(length) => DescriptorKind::Array(ArrayDescriptor::new(Some(obj.clone()), length as u32)),
            None => DescriptorKind::Object(ObjectDescriptor::new(Some(obj.clone()))),
        };
        let id = self.alloc(DataDescriptor::new(Some(source_type), flags, placement, kind));
        trace!("new {} for {:?} as {}", id, obj, self.ts.full_name(source_type));

        if is_value_type {
            self.get_mut(id).nesting = nesting;
            self.refresh(id, phase)?;
        } else {
            // registered before its values exist, cycles through this object resolve to it
            self.register(DataKey::Host(obj.clone()), id);
            self.pending.push((id, phase));
            self.instantiate_vtable(source_type, phase)?;
        }
        Ok(DataValue::Descriptor(id))
    }

    /// materializes the virtual table of a reference type
    fn instantiate_vtable(&mut self, ty: TypeId, phase: Option<Phase>) -> Result<()> {
        if !self.ts.is_reference_type(ty) {
            return Ok(());
        }
        let vtable = match self.ts.get_type(ty).virtual_table {
            Some(ref vtable) => vtable.clone(),
            None => return Ok(())
        };
        let vtable_type = vtable.type_id();

        let flags = Attributes::CONSTANT | Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION;
        self.convert(vtable_type, flags, None, &HostValue::Ref(vtable), None, phase)?;
        Ok(())
    }

    pub(crate) fn build_object(&mut self, ty: TypeId, flags: Attributes, placement: Option<PlacementRequirements>,
                               nesting: Option<Nesting>) -> Result<DescriptorId> {
        if self.ts.is_abstract(ty) || self.ts.is_array(ty) {
            return Err(type_error!("cannot build an object of type {}", self.ts.full_name(ty)));
        }

        let mut dd = DataDescriptor::new(Some(ty), flags, placement, DescriptorKind::Object(ObjectDescriptor::new(None)));
        dd.nesting = nesting;
        let id = self.alloc(dd);
        trace!("new {} of {}", id, self.ts.full_name(ty));

        if nesting.is_none() {
            self.register(DataKey::Synthetic(id), id);
            self.instantiate_vtable(ty, None)?;
        }
        Ok(id)
    }

    pub(crate) fn build_array(&mut self, ty: TypeId, flags: Attributes, placement: Option<PlacementRequirements>,
                              length: u32) -> Result<DescriptorId> {
        let elem = match self.ts.element_type(ty) {
            Some(elem) => elem,
            None => return Err(type_error!("cannot build an array of non array type {}", self.ts.full_name(ty)))
        };

        let id = self.alloc(DataDescriptor::new(Some(ty), flags, placement, DescriptorKind::Array(ArrayDescriptor::new(None, length))));
        trace!("new {} of {} with {} elements", id, self.ts.full_name(ty), length);
        self.register(DataKey::Synthetic(id), id);

        // struct elements are embedded, they exist from the start
        if self.ts.is_value_type(elem) && !self.ts.is_scalar(elem) {
            for pos in 0..length as usize {
                let element = self.build_object(elem, flags, None, Some(Nesting::in_element(id, pos)))?;
                self.set_element(id, pos, DataValue::Descriptor(element))?;
            }
        }

        self.instantiate_vtable(ty, None)?;
        Ok(id)
    }

    pub(crate) fn build_external(&mut self, context: Arc<dyn ExternalDataContext>, flags: Attributes,
                                 placement: Option<PlacementRequirements>) -> DescriptorId {
        let kind = DescriptorKind::External(ExternalDataDescriptor::new(Some(context)));
        let id = self.alloc(DataDescriptor::new(None, flags, placement, kind));
        self.register(DataKey::Synthetic(id), id);
        id
    }

    fn set_field(&mut self, id: DescriptorId, field: FieldId, value: DataValue) -> Result<()> {
        match self.try_get_mut(id).and_then(|dd| dd.as_object_mut()) {
            Some(od) => {
                od.values.insert(field, value);
                Ok(())
            }
            None => Err(type_error!("{} is not a live object", id))
        }
    }

    fn set_element(&mut self, id: DescriptorId, index: usize, value: DataValue) -> Result<()> {
        match self.try_get_mut(id).and_then(|dd| dd.as_array_mut()) {
            Some(ad) => ad.set_element(index, value),
            None => Err(type_error!("{} is not a live array", id))
        }
    }

    // code pointers

    pub(crate) fn create_code_pointer(&mut self, target: CodeTarget) -> i32 {
        if let Some(id) = self.state.code_pointers.get(&target) {
            return *id;
        }

        // odd, so that they never collide with aligned addresses
        let id = self.state.next_code_pointer_id * 2 + 1;
        self.state.next_code_pointer_id += 1;

        trace!("code pointer {} for {:?}", id, target);
        if let Some(ref mut reverse) = self.state.code_pointers_reverse {
            reverse.insert(id, target.clone());
        }
        self.state.code_pointers.insert(target, id);
        id
    }

    pub(crate) fn code_pointer_target(&mut self, id: i32) -> Option<CodeTarget> {
        if id & 1 == 0 {
            return None;
        }

        if self.state.code_pointers_reverse.is_none() {
            let reverse = self.state.code_pointers.iter().map(|(k, v)| (*v, k.clone())).collect();
            self.state.code_pointers_reverse = Some(reverse);
        }
        self.state.code_pointers_reverse.as_ref().and_then(|reverse| reverse.get(&id).cloned())
    }

    // refresh

    pub(crate) fn refresh(&mut self, id: DescriptorId, phase: Option<Phase>) -> Result<()> {
        match self.get(id).kind {
            DescriptorKind::Object(_) => self.refresh_object(id, phase),
            DescriptorKind::Array(_) => self.refresh_array(id, phase),
            DescriptorKind::External(_) => Ok(()),
        }
    }

    /// refreshes what conversions left pending, and what those refreshes convert in turn
    fn refresh_pending(&mut self) -> Result<()> {
        while let Some((id, phase)) = self.pending.pop() {
            self.refresh(id, phase)?;
        }
        Ok(())
    }

    fn refresh_all(&mut self, phase: Option<Phase>) -> Result<()> {
        let mut confirmed: HashSet<DataKey> = HashSet::new();
        let mut rounds = 0;

        loop {
            let snapshot: Vec<(DataKey, DescriptorId)> = self.state.data.iter().map(|(k, v)| (k.clone(), *v)).collect();
            let mut done = true;

            for (key, id) in snapshot {
                if confirmed.insert(key) {
                    self.refresh(id, phase)?;
                    done = false;
                }
            }

            rounds += 1;
            if done {
                break;
            }
        }

        // every pending descriptor is registered, the rounds covered it
        self.pending.clear();
        debug!("refreshed {} descriptors in {} rounds", confirmed.len(), rounds);
        Ok(())
    }

    /// re-targets a nested value type at a new source and refreshes it
    pub(crate) fn update_source(&mut self, id: DescriptorId, source: HostRef, phase: Option<Phase>) -> Result<()> {
        match self.get_mut(id).as_object_mut() {
            Some(od) => od.source = Some(source),
            None => return Err(type_error!("{} is not an object", id))
        }
        self.refresh(id, phase)
    }

    // reduction

    fn reduce_all(&mut self, reachability: &mut dyn Reachability, apply: bool) -> Result<()> {
        let entries: Vec<(DataKey, DescriptorId)> = self.state.data.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let total = entries.len();

        // every prohibition is known before any descriptor drops its references
        let mut kept = LinkedHashMap::new();
        for (key, id) in entries {
            if !reachability.is_prohibited(key.entity()) && reachability.contains(Entity::Descriptor(id)) {
                kept.insert(key, id);
            } else {
                if cfg!(debug_assertions) && reachability.contains(Entity::Descriptor(id)) {
                    return Err(type_error!("{} is reachable but its source {:?} is prohibited", id, key));
                }
                reachability.expand_prohibition(Entity::Descriptor(id));
            }
        }

        let mut visited = HashSet::new();
        for id in kept.values() {
            self.reduce(*id, &mut visited, reachability, apply)?;
        }

        debug!("reduce{}: keeping {} of {} descriptors", if apply { "" } else { " (estimate)" }, kept.len(), total);
        if !apply {
            return Ok(());
        }

        self.state.data = kept;
        self.state.code_pointers = self.state.code_pointers.iter()
            .filter(|&(target, _)| !reachability.is_prohibited(target.entity()))
            .map(|(target, id)| (target.clone(), *id))
            .collect();
        self.state.code_pointers_reverse = None;

        self.free_unreferenced();
        Ok(())
    }

    /// frees arena slots no registered descriptor leads to
    fn free_unreferenced(&mut self) {
        let mut live = HashSet::new();
        let mut work: Vec<DescriptorId> = self.state.data.values().cloned().collect();
        while let Some(id) = work.pop() {
            if live.insert(id) {
                work.extend(self.get(id).references());
            }
        }

        let mut freed = 0;
        for (index, slot) in self.state.descriptors.iter_mut().enumerate() {
            if slot.is_some() && !live.contains(&DescriptorId(index as u32)) {
                *slot = None;
                freed += 1;
            }
        }
        trace!("freed {} descriptors", freed);
    }

    /// reduces `root` and the descriptors it keeps references to, each once
    pub(crate) fn reduce(&mut self, root: DescriptorId, visited: &mut HashSet<DescriptorId>,
                         reachability: &mut dyn Reachability, apply: bool) -> Result<()> {
        let mut work = vec![root];
        while let Some(id) = work.pop() {
            if !visited.insert(id) {
                continue;
            }

            let context = match self.get(id).kind {
                DescriptorKind::External(_) => continue,
                _ => self.get(id).context,
            };
            if let Some(ty) = context {
                if !reachability.contains(Entity::Type(ty)) {
                    return Err(type_error!("{} is kept but its type {} is not", id, self.ts.full_name(ty)));
                }
            }

            let next = match self.get(id).kind {
                DescriptorKind::Object(_) => self.reduce_object(id, reachability, apply),
                DescriptorKind::Array(_) => self.reduce_array(id, reachability, apply),
                DescriptorKind::External(_) => vec![],
            };
            work.extend(next);
        }
        Ok(())
    }

    // reachability

    pub(crate) fn include_extra_types(&mut self, id: DescriptorId, reachability: &mut dyn Reachability, phase: Option<Phase>) -> Result<()> {
        if let DescriptorKind::External(_) = self.live(id)?.kind {
            return Err(DataError::Unsupported(format!("{} is external data and has no types to include", id)));
        }

        self.refresh(id, phase)?;

        if let Some(ty) = self.get(id).context {
            reachability.expand_pending(Entity::Type(ty));
            if self.ts.is_reference_type(ty) {
                if let Some(vtable) = self.vtable_descriptor(ty) {
                    reachability.expand_pending(Entity::Descriptor(vtable));
                }
            }
        }

        match self.get(id).kind {
            DescriptorKind::Object(ref od) => od.include_extra_types(reachability),
            DescriptorKind::Array(ref ad) => self.include_array_elements(ad, reachability),
            DescriptorKind::External(_) => {}
        }
        Ok(())
    }

    // image

    pub(crate) fn write(&mut self, id: DescriptorId, region: &mut dyn SequentialRegion) -> Result<()> {
        self.live(id)?;
        trace_if!(self.verbose, "write {}", self.describe(id, true));
        match self.get(id).kind {
            DescriptorKind::Object(_) => self.write_object(id, region),
            DescriptorKind::Array(_) => self.write_array(id, region),
            DescriptorKind::External(ref ed) => ed.write(region),
        }
    }

    /// writes the object header of a reference type and points the region past it
    pub(crate) fn write_header(&mut self, id: DescriptorId, region: &mut dyn SequentialRegion) -> Result<()> {
        let dd = self.get(id);
        let ty = match dd.context {
            Some(ty) => ty,
            None => return Err(type_error!("{} has no type to write a header for", id))
        };
        if self.ts.is_value_type(ty) {
            return Ok(());
        }

        let wkt = self.ts.well_known_types();
        let wkf = self.ts.well_known_fields();
        let (header_type, multi_use_word, virtual_table) = match (wkt.object_header, wkf.object_header_multi_use_word, wkf.object_header_virtual_table) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Err(type_error!("the type system does not define the object header"))
        };
        let gc_flags = if dd.is_mutable() { UNRECLAIMABLE_OBJECT } else { READ_ONLY_OBJECT };
        let vtable = self.vtable_descriptor(ty);

        {
            let mut section = region.section_of_fixed_size(self.ts.get_type(header_type).size)?;

            let field = self.ts.get_field(multi_use_word);
            section.set_offset(field.offset as u32);
            section.add_image_annotation(self.ts.size_of_holding_variable(field.field_type), multi_use_word);
            section.write_u32(gc_flags)?;

            let field = self.ts.get_field(virtual_table);
            section.set_offset(field.offset as u32);
            section.add_image_annotation(self.ts.size_of_holding_variable(field.field_type), virtual_table);
            match vtable {
                Some(vtable) => section.write_pointer_to_descriptor(vtable)?,
                None => section.write_null_pointer()?,
            }
        }

        let position = region.position();
        region.set_pointer_offset(position);
        Ok(())
    }

    // constant propagation

    pub(crate) fn get_data_at_offset(&mut self, id: DescriptorId, access_path: &[FieldId], index: usize, offset: i32) -> Result<Option<DataValue>> {
        let dd = self.live(id)?;
        if let DescriptorKind::External(_) = dd.kind {
            return Err(DataError::Unsupported(format!("{} is external data and cannot be inspected", id)));
        }
        if !dd.is_suitable_for_constant_propagation() {
            return Ok(None);
        }

        match dd.kind {
            DescriptorKind::Object(_) => self.object_data_at_offset(id, access_path, index, offset),
            DescriptorKind::Array(_) => Ok(self.array_data_at_offset(id, offset)),
            DescriptorKind::External(_) => Ok(None),
        }
    }

    // description

    pub(crate) fn describe(&self, id: DescriptorId, verbose: bool) -> String {
        let dd = match self.try_get(id) {
            Some(dd) => dd,
            None => return format!("$Freed({})", id)
        };
        let type_name = dd.context.map_or("<external>", |ty| self.ts.full_name(ty));
        match dd.kind {
            DescriptorKind::Object(ref od) => od.describe(self, dd, type_name, verbose),
            DescriptorKind::Array(ref ad) => ad.describe(self, dd, type_name, verbose),
            DescriptorKind::External(_) => format!("$External({})", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DataManager {
        DataManager::new(Arc::new(TypeSystem::with_runtime_types()))
    }

    #[test]
    fn test_code_pointer_ids() {
        let dm = manager();
        let a = dm.create_code_pointer(CodeTarget::Method(MethodId(0)));
        let b = dm.create_code_pointer(CodeTarget::ExceptionHandler(BlockId(3)));
        assert_eq!(a, 1);
        assert_eq!(b, 3);
        assert_eq!(dm.create_code_pointer(CodeTarget::Method(MethodId(0))), a);

        assert_eq!(dm.get_code_pointer_from_unique_id(3), Some(CodeTarget::ExceptionHandler(BlockId(3))));
        assert_eq!(dm.get_code_pointer_from_unique_id(2), None);
        assert_eq!(dm.get_code_pointer_from_unique_id(5), None);

        // created after the reverse map was built
        let c = dm.create_code_pointer(CodeTarget::Method(MethodId(7)));
        assert_eq!(c, 5);
        assert_eq!(dm.get_code_pointer_from_unique_id(5), Some(CodeTarget::Method(MethodId(7))));
    }

    #[test]
    fn test_build_errors() {
        let dm = manager();
        let ts = dm.type_system().clone();
        let wkt = ts.well_known_types();

        assert!(dm.build_object_descriptor(wkt.array.unwrap(), Attributes::CONSTANT, None).is_err());
        assert!(dm.build_array_descriptor(wkt.string.unwrap(), Attributes::CONSTANT, None, 2).is_err());
        assert!(dm.build_object_descriptor(ts.find_type("Byte[]").unwrap(), Attributes::CONSTANT, None).is_err());
    }

    #[test]
    fn test_inferred_conversion() {
        let dm = manager();
        let string_type = dm.type_system().well_known_types().string.unwrap();
        let s = HostValue::Ref(HostRef::new_string(string_type, "abc"));

        let id = match dm.convert_to_object_descriptor_inferred(&s, None).unwrap() {
            DataValue::Descriptor(id) => id,
            other => panic!("unexpected {:?}", other)
        };
        let dd = dm.descriptor(id).unwrap();
        assert_eq!(dd.context, Some(string_type));
        assert_eq!(dd.flags, Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION);
        assert_eq!(dm.get_object_descriptor(&s), Some(DataValue::Descriptor(id)));

        assert_eq!(dm.convert_to_object_descriptor_inferred(&HostValue::i32(5), None).unwrap(),
                   DataValue::Scalar(ScalarValue::I32(5)));
        assert_eq!(dm.convert_to_object_descriptor_inferred(&HostValue::Null, None).unwrap(), DataValue::Null);
    }

    #[test]
    fn test_type_values_are_rejected() {
        let dm = manager();
        let object = dm.type_system().well_known_types().object.unwrap();
        let res = dm.convert_to_object_descriptor(object, Attributes::CONSTANT, None, &HostValue::Type(object), None);
        match res {
            Err(DataError::TypeConsistency(_)) => {}
            other => panic!("unexpected {:?}", other)
        }
    }
}
