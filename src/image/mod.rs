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

//! Byte regions descriptors are written into.
//!
//! A region is a growing sequence of bytes the image builder places somewhere in the
//! final image. Writers carve fixed size sections out of it and fill them field by
//! field; pointers are recorded as relocations against the descriptor or basic block
//! they point to and resolved when the image is linked.

mod region;

pub use self::region::*;

use zdata_utils::ByteSize;

use crate::data::DescriptorId;
use crate::errors::Result;
use crate::serialize::*;
use crate::typesystem::{BlockId, FieldId};

/// Where and how a region must be placed in the image.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlacementRequirements {
    pub alignment: ByteSize,
    /// the payload is zero initialized at runtime, only the bytes before the payload
    /// cutoff are stored in the image
    pub contents_uninitialized: bool,
}

impl PlacementRequirements {
    pub fn new(alignment: ByteSize) -> PlacementRequirements {
        PlacementRequirements {
            alignment: alignment,
            contents_uninitialized: false,
        }
    }

    pub fn uninitialized(alignment: ByteSize) -> PlacementRequirements {
        PlacementRequirements {
            alignment: alignment,
            contents_uninitialized: true,
        }
    }
}

impl Default for PlacementRequirements {
    fn default() -> PlacementRequirements {
        PlacementRequirements::new(zdata_utils::WORD_SIZE)
    }
}

impl Persistent for PlacementRequirements {
    fn declared_type() -> SerialType {
        SerialType::class("PlacementRequirements")
    }

    fn from_instance(instance: Instance) -> Result<PlacementRequirements> {
        match instance {
            Instance::Placement(p) => Ok(p),
            other => Err(type_error!("expected placement requirements, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        context.transform_u32(&mut self.alignment)?;
        context.transform_bool(&mut self.contents_uninitialized)
    }
}

/// The target of a pointer stored in the image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Relocation {
    Descriptor(DescriptorId),
    BasicBlock(BlockId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RelocationEntry {
    /// offset of the pointer within the region
    pub offset: u32,
    pub target: Relocation,
}

/// Records which field a range of the region holds, for image dumps and debuggers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageAnnotation {
    pub offset: u32,
    pub size: ByteSize,
    pub field: FieldId,
}

/// A region the data layer can append sections to.
pub trait SequentialRegion {
    fn placement_requirements(&self) -> Option<PlacementRequirements>;

    /// the offset the next section starts at
    fn position(&self) -> u32;

    /// sets where pointers to this region point to, usually right after the object header
    fn set_pointer_offset(&mut self, offset: u32);

    /// bytes from `offset` on are not stored in the image
    fn set_payload_cutoff(&mut self, offset: u32);

    /// appends a section of `size` bytes and returns a writer for it
    fn section_of_fixed_size(&mut self, size: ByteSize) -> Result<Section<'_>>;
}
