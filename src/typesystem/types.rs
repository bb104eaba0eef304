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

use zdata_utils::ByteSize;

use crate::debug::DebugInfo;
use crate::errors::{DataError, Result};
use crate::host::HostRef;
use crate::serialize::*;
use crate::typesystem::{FieldId, ScalarKind, TypeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Scalar(ScalarKind),
    /// an enumeration stored as its underlying scalar
    Enum(ScalarKind),
    /// a struct, always embedded in its container
    Value,
    Class,
    Abstract,
    Array(TypeId),
}

impl TypeKind {
    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        let (mut tag, mut payload) = match *self {
            TypeKind::Scalar(k) => (0u8, k.to_u8() as u32),
            TypeKind::Enum(k) => (1, k.to_u8() as u32),
            TypeKind::Value => (2, 0),
            TypeKind::Class => (3, 0),
            TypeKind::Abstract => (4, 0),
            TypeKind::Array(elem) => (5, elem.0),
        };
        context.transform_u8(&mut tag)?;
        context.transform_u32(&mut payload)?;

        let scalar = || ScalarKind::from_u8(payload as u8)
            .ok_or_else(|| DataError::Format(format!("unknown scalar kind {}", payload)));
        *self = match tag {
            0 => TypeKind::Scalar(scalar()?),
            1 => TypeKind::Enum(scalar()?),
            2 => TypeKind::Value,
            3 => TypeKind::Class,
            4 => TypeKind::Abstract,
            5 => TypeKind::Array(TypeId(payload)),
            _ => return Err(DataError::Format(format!("unknown type kind {}", tag)))
        };
        Ok(())
    }
}

/// Layout numbers published through the virtual table. Instances of the type occupy
/// `base_size + element_size * n` bytes after the object header.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct VTableLayout {
    pub base_size: ByteSize,
    pub element_size: ByteSize,
}

#[derive(Clone, Debug)]
pub struct TypeRepresentation {
    pub name: String,
    pub kind: TypeKind,
    pub extends: Option<TypeId>,
    /// instance size without object header
    pub size: ByteSize,
    /// declared instance fields
    pub fields: Vec<FieldId>,
    pub layout: VTableLayout,
    pub virtual_table: Option<HostRef>,
}

impl Default for TypeRepresentation {
    fn default() -> TypeRepresentation {
        TypeRepresentation {
            name: String::new(),
            kind: TypeKind::Class,
            extends: None,
            size: 0,
            fields: vec![],
            layout: VTableLayout::default(),
            virtual_table: None,
        }
    }
}

impl Persistent for TypeRepresentation {
    fn declared_type() -> SerialType {
        SerialType::class("TypeRepresentation")
    }

    fn from_instance(instance: Instance) -> Result<TypeRepresentation> {
        match instance {
            Instance::Type(ty) => Ok(ty),
            other => Err(type_error!("expected a type, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_required_string(context, &mut self.name)?;
        self.kind.apply_transformation(context)?;
        transform_option_id(context, &mut self.extends)?;
        context.transform_u32(&mut self.size)?;
        transform_id_list(context, &mut self.fields)?;
        context.transform_u32(&mut self.layout.base_size)?;
        context.transform_u32(&mut self.layout.element_size)?;
        transform_host_object(context, &mut self.virtual_table)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldRepresentation {
    pub name: String,
    pub owner: TypeId,
    pub field_type: TypeId,
    /// byte offset within the instance, after the object header
    pub offset: i32,
}

impl Persistent for FieldRepresentation {
    fn declared_type() -> SerialType {
        SerialType::class("FieldRepresentation")
    }

    fn from_instance(instance: Instance) -> Result<FieldRepresentation> {
        match instance {
            Instance::Field(fd) => Ok(fd),
            other => Err(type_error!("expected a field, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_required_string(context, &mut self.name)?;
        transform_id(context, &mut self.owner)?;
        transform_id(context, &mut self.field_type)?;
        context.transform_i32(&mut self.offset)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MethodRepresentation {
    pub name: String,
    pub owner: TypeId,
    pub debug_info: Option<Arc<DebugInfo>>,
}

impl Persistent for MethodRepresentation {
    fn declared_type() -> SerialType {
        SerialType::class("MethodRepresentation")
    }

    fn from_instance(instance: Instance) -> Result<MethodRepresentation> {
        match instance {
            Instance::Method(md) => Ok(md),
            other => Err(type_error!("expected a method, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_required_string(context, &mut self.name)?;
        transform_id(context, &mut self.owner)?;
        transform_debug_info(context, &mut self.debug_info)
    }
}
