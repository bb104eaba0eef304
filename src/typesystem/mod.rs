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

//! The type model the data layer materializes values against.
//!
//! Types, fields and methods live in arenas owned by the `TypeSystem` and are referred
//! to by plain ids everywhere else. The type system is read-mostly once built: after
//! construction it is shared as `Arc<TypeSystem>` and only the method to code map is
//! still updated (behind its own lock).

mod scalar;
mod types;
mod wellknown;
mod phase;
mod reachability;

pub use self::scalar::*;
pub use self::types::*;
pub use self::wellknown::*;
pub use self::phase::*;
pub use self::reachability::*;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::RwLock;

use zdata_utils::{ByteSize, LinkedHashMap, POINTER_SIZE};

use crate::data::BitFieldDefinition;
use crate::debug::DebugInfo;
use crate::errors::Result;
use crate::host::{HostArray, HostData, HostRef, HostValue};
use crate::serialize::*;

arena_id!(TypeId, "T");
arena_id!(FieldId, "F");
arena_id!(MethodId, "M");
arena_id!(BlockId, "BB");

pub struct TypeSystem {
    types: Vec<TypeRepresentation>,
    fields: Vec<FieldRepresentation>,
    methods: Vec<MethodRepresentation>,

    well_known_types: WellKnownTypes,
    well_known_fields: WellKnownFields,

    bit_fields: LinkedHashMap<FieldId, BitFieldDefinition>,

    /// entry basic block of the code generated for a method
    code: RwLock<LinkedHashMap<MethodId, BlockId>>,
    next_block: AtomicU32,
}

impl TypeSystem {
    pub fn new() -> TypeSystem {
        TypeSystem {
            types: vec![],
            fields: vec![],
            methods: vec![],
            well_known_types: WellKnownTypes::default(),
            well_known_fields: WellKnownFields::default(),
            bit_fields: LinkedHashMap::new(),
            code: RwLock::new(LinkedHashMap::new()),
            next_block: AtomicU32::new(0),
        }
    }

    // building

    /// adds a type. Reference types get a virtual table once the runtime `VTable` type is
    /// known.
    pub fn add_type(&mut self, name: &str, kind: TypeKind, extends: Option<TypeId>, size: ByteSize) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let layout = match kind {
            TypeKind::Array(elem) => VTableLayout {
                base_size: self.array_header_size(),
                element_size: self.size_of_holding_variable(elem)
            },
            _ => VTableLayout { base_size: size, element_size: 0 }
        };

        trace!("add type {} {} as {:?}", id, name, kind);
        self.types.push(TypeRepresentation {
            name: name.to_string(),
            kind: kind,
            extends: extends,
            size: size,
            fields: vec![],
            layout: layout,
            virtual_table: None,
        });

        if self.is_reference_type(id) && self.well_known_types.vtable.is_some() {
            self.create_virtual_table(id);
        }

        id
    }

    pub fn add_field(&mut self, owner: TypeId, name: &str, field_type: TypeId, offset: i32) -> FieldId {
        let id = FieldId(self.fields.len() as u32);

        trace!("add field {} {}::{} at +{}", id, self.types[owner.index()].name, name, offset);
        self.fields.push(FieldRepresentation {
            name: name.to_string(),
            owner: owner,
            field_type: field_type,
            offset: offset,
        });
        self.types[owner.index()].fields.push(id);

        id
    }

    pub fn add_method(&mut self, owner: TypeId, name: &str, debug_info: Option<Arc<DebugInfo>>) -> MethodId {
        let id = MethodId(self.methods.len() as u32);

        self.methods.push(MethodRepresentation {
            name: name.to_string(),
            owner: owner,
            debug_info: debug_info,
        });

        id
    }

    /// returns the array type of `elem`, creating it on first request
    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        let existing = self.types.iter().position(|t| t.kind == TypeKind::Array(elem));
        match existing {
            Some(index) => TypeId(index as u32),
            None => {
                let name = format!("{}[]", self.types[elem.index()].name);
                let extends = self.well_known_types.array;
                let size = self.array_header_size();
                self.add_type(&name, TypeKind::Array(elem), extends, size)
            }
        }
    }

    /// creates the host side virtual table of a reference type, an instance of the
    /// runtime `VTable` type
    pub fn create_virtual_table(&mut self, id: TypeId) -> Option<HostRef> {
        let vtable_type = self.well_known_types.vtable?;
        let gc_info_type = self.well_known_types.gc_info;

        let layout = self.types[id.index()].layout;
        let gc_info = gc_info_type.map(|ty| HostRef::new(ty, HostData::Fields(vec![
            ("Pointers".to_string(), HostValue::Null),
        ])));

        let vtable = HostRef::new(vtable_type, HostData::Fields(vec![
            ("BaseSize".to_string(), HostValue::u32(layout.base_size)),
            ("ElementSize".to_string(), HostValue::u32(layout.element_size)),
            ("Type".to_string(), HostValue::Type(id)),
            ("GCInfo".to_string(), gc_info.map_or(HostValue::Null, HostValue::Ref)),
            ("MethodPointers".to_string(), HostValue::Null),
            ("InterfaceMap".to_string(), HostValue::Null),
        ]));

        self.types[id.index()].virtual_table = Some(vtable.clone());
        Some(vtable)
    }

    /// gives every reference type that lacks one its virtual table
    pub fn create_virtual_tables(&mut self) {
        for index in 0..self.types.len() {
            let id = TypeId(index as u32);
            if self.is_reference_type(id) && self.types[index].virtual_table.is_none() {
                self.create_virtual_table(id);
            }
        }
    }

    /// sets the layout reported by the virtual table of `id`
    pub fn set_layout(&mut self, id: TypeId, layout: VTableLayout) {
        let ty = &mut self.types[id.index()];
        ty.layout = layout;

        if let Some(ref vtable) = ty.virtual_table {
            vtable.set_field("BaseSize", HostValue::u32(layout.base_size));
            vtable.set_field("ElementSize", HostValue::u32(layout.element_size));
        }
    }

    /// populates the method table of a virtual table with code pointers
    pub fn set_method_pointers(&mut self, id: TypeId, pointers: Vec<HostValue>) -> Option<HostRef> {
        let code_pointer = self.well_known_types.code_pointer?;
        let array_type = self.array_of(code_pointer);
        let vtable = self.types[id.index()].virtual_table.clone()?;

        let table = HostRef::new(array_type, HostData::Array(HostArray::Values(pointers)));
        vtable.set_field("MethodPointers", HostValue::Ref(table.clone()));
        Some(table)
    }

    pub fn well_known_types_mut(&mut self) -> &mut WellKnownTypes {
        &mut self.well_known_types
    }

    pub fn well_known_fields_mut(&mut self) -> &mut WellKnownFields {
        &mut self.well_known_fields
    }

    pub fn set_bit_field_definition(&mut self, field: FieldId, definition: BitFieldDefinition) {
        self.bit_fields.insert(field, definition);
    }

    // queries

    pub fn get_type(&self, id: TypeId) -> &TypeRepresentation {
        match self.types.get(id.index()) {
            Some(ty) => ty,
            None => panic!("cannot find type {}", id)
        }
    }

    pub fn get_field(&self, id: FieldId) -> &FieldRepresentation {
        match self.fields.get(id.index()) {
            Some(fd) => fd,
            None => panic!("cannot find field {}", id)
        }
    }

    pub fn get_method(&self, id: MethodId) -> &MethodRepresentation {
        match self.methods.get(id.index()) {
            Some(md) => md,
            None => panic!("cannot find method {}", id)
        }
    }

    pub fn types_count(&self) -> usize {
        self.types.len()
    }

    pub fn well_known_types(&self) -> &WellKnownTypes {
        &self.well_known_types
    }

    pub fn well_known_fields(&self) -> &WellKnownFields {
        &self.well_known_fields
    }

    pub fn bit_field_definition(&self, field: FieldId) -> Option<&BitFieldDefinition> {
        self.bit_fields.get(&field)
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types.iter().position(|t| t.name == name).map(|i| TypeId(i as u32))
    }

    /// looks a field up by name on `owner` and then on its base types
    pub fn find_field(&self, owner: TypeId, name: &str) -> Option<FieldId> {
        let mut cur = Some(owner);
        while let Some(ty) = cur {
            let ty = self.get_type(ty);
            if let Some(fd) = ty.fields.iter().find(|fd| self.get_field(**fd).name == name) {
                return Some(*fd);
            }
            cur = ty.extends;
        }
        None
    }

    /// the scalar type of the given kind, if the type system declares one
    pub fn scalar_type(&self, kind: ScalarKind) -> Option<TypeId> {
        self.types.iter().position(|t| t.kind == TypeKind::Scalar(kind)).map(|i| TypeId(i as u32))
    }

    /// the type a host value is an instance of
    pub fn type_of_value(&self, value: &HostValue) -> Option<TypeId> {
        match *value {
            HostValue::Null | HostValue::Descriptor(_) => None,
            HostValue::Scalar(ref s) | HostValue::Enum(ref s) => self.scalar_type(s.kind()),
            HostValue::Ref(ref obj) => Some(obj.type_id()),
            HostValue::Type(_) => self.well_known_types.runtime_type_impl,
        }
    }

    pub fn is_value_type(&self, id: TypeId) -> bool {
        match self.get_type(id).kind {
            TypeKind::Scalar(_) | TypeKind::Enum(_) | TypeKind::Value => true,
            _ => false
        }
    }

    pub fn is_reference_type(&self, id: TypeId) -> bool {
        !self.is_value_type(id)
    }

    /// scalars and enumerations
    pub fn is_scalar(&self, id: TypeId) -> bool {
        match self.get_type(id).kind {
            TypeKind::Scalar(_) | TypeKind::Enum(_) => true,
            _ => false
        }
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        self.element_type(id).is_some()
    }

    pub fn is_abstract(&self, id: TypeId) -> bool {
        self.get_type(id).kind == TypeKind::Abstract
    }

    pub fn element_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get_type(id).kind {
            TypeKind::Array(elem) => Some(elem),
            _ => None
        }
    }

    pub fn can_be_assigned_from(&self, target: TypeId, source: TypeId) -> bool {
        let mut cur = Some(source);
        while let Some(ty) = cur {
            if ty == target {
                return true;
            }
            cur = self.get_type(ty).extends;
        }

        // arrays of references are covariant
        match (self.element_type(target), self.element_type(source)) {
            (Some(elem_target), Some(elem_source)) => {
                elem_target == elem_source ||
                    (self.is_reference_type(elem_target) && self.is_reference_type(elem_source)
                        && self.can_be_assigned_from(elem_target, elem_source))
            }
            _ => false
        }
    }

    /// size of a field or array element holding a value of this type
    pub fn size_of_holding_variable(&self, id: TypeId) -> ByteSize {
        if self.is_value_type(id) {
            self.get_type(id).size
        } else {
            POINTER_SIZE
        }
    }

    /// instance fields of `id` followed by the fields of its base types
    pub fn instance_fields(&self, id: TypeId) -> Vec<FieldId> {
        let mut ret = vec![];
        let mut cur = Some(id);
        while let Some(ty) = cur {
            let ty = self.get_type(ty);
            ret.extend(ty.fields.iter().cloned());
            cur = ty.extends;
        }
        ret
    }

    pub fn full_name(&self, id: TypeId) -> &str {
        &self.get_type(id).name
    }

    fn array_header_size(&self) -> ByteSize {
        match self.well_known_types.array {
            Some(array) => self.get_type(array).size,
            None => POINTER_SIZE
        }
    }

    // code

    pub fn new_basic_block(&self) -> BlockId {
        BlockId(self.next_block.fetch_add(1, Ordering::SeqCst))
    }

    pub fn code_for_method(&self, method: MethodId) -> Option<BlockId> {
        self.code.read().unwrap().get(&method).cloned()
    }

    pub fn set_code_for_method(&self, method: MethodId, entry: BlockId) {
        self.code.write().unwrap().insert(method, entry);
    }
}

impl Clone for TypeSystem {
    fn clone(&self) -> TypeSystem {
        TypeSystem {
            types: self.types.clone(),
            fields: self.fields.clone(),
            methods: self.methods.clone(),
            well_known_types: self.well_known_types.clone(),
            well_known_fields: self.well_known_fields.clone(),
            bit_fields: self.bit_fields.clone(),
            code: RwLock::new(self.code.read().unwrap().clone()),
            next_block: AtomicU32::new(self.next_block.load(Ordering::SeqCst)),
        }
    }
}

impl Default for TypeSystem {
    fn default() -> TypeSystem {
        TypeSystem::new()
    }
}

impl Persistent for TypeSystem {
    fn declared_type() -> SerialType {
        SerialType::class("TypeSystem")
    }

    fn from_instance(instance: Instance) -> Result<TypeSystem> {
        match instance {
            Instance::TypeSystem(ts) => Ok(ts),
            other => Err(type_error!("expected a type system, got {:?}", other.serial_name()))
        }
    }

    /// visits the tables of the type system in declaration order
    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_list(context, &mut self.types)?;
        transform_list(context, &mut self.fields)?;
        transform_list(context, &mut self.methods)?;

        self.well_known_types.apply_transformation(context)?;
        self.well_known_fields.apply_transformation(context)?;

        transform_map(context, &mut self.bit_fields, &SerialType::map_of(FieldRepresentation::declared_type(), BitFieldDefinition::declared_type()),
            |context, key| transform_id(context, key),
            |context, val| transform_owned_in_place(context, val))?;

        {
            let mut code = self.code.write().unwrap();
            transform_map(context, &mut *code, &SerialType::map_of(MethodRepresentation::declared_type(), SerialType::class("BasicBlock")),
                |context, key| transform_id(context, key),
                |context, val| transform_id(context, val))?;
        }

        let mut next_block = self.next_block.load(Ordering::SeqCst);
        context.transform_u32(&mut next_block)?;
        self.next_block.store(next_block, Ordering::SeqCst);

        Ok(())
    }
}
