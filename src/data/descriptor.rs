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

use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::*;
use crate::errors::{DataError, Result};
use crate::image::PlacementRequirements;
use crate::serialize::*;
use crate::typesystem::TypeId;

lazy_static! {
    static ref NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);
}

/// descriptors created from now on get identities above `identity`
fn advance_identity_past(identity: u64) {
    NEXT_IDENTITY.fetch_max(identity.saturating_add(1), Ordering::SeqCst);
}

/// One materialized value destined for the image.
#[derive(Clone, Debug)]
pub struct DataDescriptor {
    /// debug id, increasing in creation order
    pub identity: u64,
    /// the target type, `None` only for external data
    pub context: Option<TypeId>,
    pub flags: Attributes,
    pub placement: Option<PlacementRequirements>,
    /// set for value types embedded in another descriptor
    pub nesting: Option<Nesting>,
    pub kind: DescriptorKind,
}

#[derive(Clone, Debug)]
pub enum DescriptorKind {
    Object(ObjectDescriptor),
    Array(ArrayDescriptor),
    External(ExternalDataDescriptor),
}

impl DescriptorKind {
    pub fn serial_name(&self) -> &'static str {
        match *self {
            DescriptorKind::Object(_) => "ObjectDescriptor",
            DescriptorKind::Array(_) => "ArrayDescriptor",
            DescriptorKind::External(_) => "ExternalDataDescriptor",
        }
    }
}

impl DataDescriptor {
    pub fn new(context: Option<TypeId>, flags: Attributes, placement: Option<PlacementRequirements>, kind: DescriptorKind) -> DataDescriptor {
        DataDescriptor {
            identity: NEXT_IDENTITY.fetch_add(1, Ordering::SeqCst),
            context: context,
            flags: flags,
            placement: placement,
            nesting: None,
            kind: kind,
        }
    }

    pub fn empty_object() -> DataDescriptor {
        DataDescriptor::new(None, Attributes::CONSTANT, None, DescriptorKind::Object(ObjectDescriptor::new(None)))
    }

    pub fn empty_array() -> DataDescriptor {
        DataDescriptor::new(None, Attributes::CONSTANT, None, DescriptorKind::Array(ArrayDescriptor::new(None, 0)))
    }

    pub fn empty_external() -> DataDescriptor {
        DataDescriptor::new(None, Attributes::CONSTANT, None, DescriptorKind::External(ExternalDataDescriptor::new(None)))
    }

    pub fn is_mutable(&self) -> bool {
        self.flags.is_mutable()
    }

    pub fn is_suitable_for_constant_propagation(&self) -> bool {
        self.flags.is_suitable_for_constant_propagation()
    }

    pub fn as_object(&self) -> Option<&ObjectDescriptor> {
        match self.kind {
            DescriptorKind::Object(ref od) => Some(od),
            _ => None
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectDescriptor> {
        match self.kind {
            DescriptorKind::Object(ref mut od) => Some(od),
            _ => None
        }
    }

    pub fn as_array(&self) -> Option<&ArrayDescriptor> {
        match self.kind {
            DescriptorKind::Array(ref ad) => Some(ad),
            _ => None
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayDescriptor> {
        match self.kind {
            DescriptorKind::Array(ref mut ad) => Some(ad),
            _ => None
        }
    }

    /// descriptors directly referenced by this one
    pub fn references(&self) -> Vec<DescriptorId> {
        match self.kind {
            DescriptorKind::Object(ref od) => od.values.values().filter_map(|v| v.as_descriptor()).collect(),
            DescriptorKind::Array(ref ad) => match ad.values {
                Some(ref values) => values.iter().filter_map(|v| v.as_descriptor()).collect(),
                None => vec![]
            },
            DescriptorKind::External(_) => vec![]
        }
    }

    fn transform_nesting(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        let mut present = self.nesting.is_some();
        context.transform_bool(&mut present)?;

        let mut nesting = self.nesting.unwrap_or(Nesting { descriptor: DescriptorId::default(), field: None, index: -1 });
        if present {
            transform_id(context, &mut nesting.descriptor)?;
            transform_option_id(context, &mut nesting.field)?;
            context.transform_i32(&mut nesting.index)?;
        }
        self.nesting = if present { Some(nesting) } else { None };
        Ok(())
    }
}

impl Persistent for DataDescriptor {
    fn declared_type() -> SerialType {
        SerialType::class("DataDescriptor")
    }

    fn runtime_type(&self) -> SerialType {
        SerialType::class(self.kind.serial_name())
    }

    fn from_instance(instance: Instance) -> Result<DataDescriptor> {
        match instance {
            Instance::Descriptor(dd) => Ok(dd),
            other => Err(type_error!("expected a data descriptor, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        context.transform_u64(&mut self.identity)?;
        if context.is_reading() {
            advance_identity_past(self.identity);
        }
        transform_option_id(context, &mut self.context)?;

        let mut flags = self.flags.bits();
        context.transform_u8(&mut flags)?;
        self.flags = Attributes::from_bits(flags)
            .ok_or_else(|| DataError::Format(format!("unknown descriptor attributes {:#x}", flags)))?;

        transform_owned(context, &mut self.placement)?;
        self.transform_nesting(context)?;

        match self.kind {
            DescriptorKind::Object(ref mut od) => od.apply_transformation(context),
            DescriptorKind::Array(ref mut ad) => ad.apply_transformation(context),
            // the external context lives outside the compiler state
            DescriptorKind::External(_) => Ok(()),
        }
    }
}
