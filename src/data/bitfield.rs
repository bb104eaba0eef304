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

//! Bit level layout of hardware register fields.

use zdata_utils::bit_utils;
use zdata_utils::BitSize;

use crate::errors::Result;
use crate::serialize::*;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct BitFieldModifiers: u32 {
        const READ_ONLY = 1;
        const WRITE_ONLY = 2;
        const IGNORE_SIGN_EXTENSION = 4;
    }
}

/// One sub-field of a register: `size` bits at bit `position` of the logical field,
/// stored in the physical register at byte `offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct BitFieldSection {
    pub name: String,
    pub position: u32,
    pub size: BitSize,
    pub offset: u32,
    pub modifiers: BitFieldModifiers,
    /// value reads return instead of the register contents
    pub reads_as: u32,
    /// value written to the sub-field whatever is assigned
    pub writes_as: u32,
}

impl Default for BitFieldSection {
    fn default() -> BitFieldSection {
        BitFieldSection {
            name: String::new(),
            position: 0,
            size: 0,
            offset: 0,
            modifiers: BitFieldModifiers::empty(),
            reads_as: 0,
            writes_as: 0,
        }
    }
}

impl BitFieldSection {
    pub fn new(name: &str, position: u32, size: BitSize, offset: u32) -> BitFieldSection {
        BitFieldSection {
            name: name.to_string(),
            position: position,
            size: size,
            offset: offset,
            ..BitFieldSection::default()
        }
    }

    /// mask of the sub-field within the logical field
    pub fn mask(&self) -> u32 {
        bit_utils::mask_u32(self.position, self.size)
    }
}

impl Persistent for BitFieldSection {
    fn declared_type() -> SerialType {
        SerialType::class("BitFieldSection")
    }

    fn from_instance(instance: Instance) -> Result<BitFieldSection> {
        match instance {
            Instance::BitFieldSection(sec) => Ok(sec),
            other => Err(type_error!("expected a bit field section, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_required_string(context, &mut self.name)?;
        context.transform_u32(&mut self.position)?;
        context.transform_u32(&mut self.size)?;
        context.transform_u32(&mut self.offset)?;

        let mut modifiers = self.modifiers.bits();
        context.transform_u32(&mut modifiers)?;
        self.modifiers = BitFieldModifiers::from_bits_truncate(modifiers);

        context.transform_u32(&mut self.reads_as)?;
        context.transform_u32(&mut self.writes_as)
    }
}

/// The sections of a register field, sorted by byte offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BitFieldDefinition {
    sections: Vec<BitFieldSection>,
}

impl BitFieldDefinition {
    pub fn new() -> BitFieldDefinition {
        BitFieldDefinition { sections: vec![] }
    }

    /// inserts after the last section with a smaller offset. Sections with equal
    /// offsets end up in no particular order.
    pub fn add_section(&mut self, section: BitFieldSection) {
        let mut pos = self.sections.len();
        while pos > 0 && self.sections[pos - 1].offset >= section.offset {
            pos -= 1;
        }
        self.sections.insert(pos, section);
    }

    pub fn sections(&self) -> &[BitFieldSection] {
        &self.sections
    }

    /// total size in bits, overlapping sections are counted twice
    pub fn total_size(&self) -> BitSize {
        self.sections.iter().map(|s| s.size).sum()
    }
}

impl Persistent for BitFieldDefinition {
    fn declared_type() -> SerialType {
        SerialType::class("BitFieldDefinition")
    }

    fn from_instance(instance: Instance) -> Result<BitFieldDefinition> {
        match instance {
            Instance::BitField(def) => Ok(def),
            other => Err(type_error!("expected a bit field definition, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_list(context, &mut self.sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_sorted_by_offset() {
        let mut def = BitFieldDefinition::new();
        def.add_section(BitFieldSection::new("c", 0, 4, 8));
        def.add_section(BitFieldSection::new("a", 0, 1, 0));
        def.add_section(BitFieldSection::new("b", 4, 3, 4));
        def.add_section(BitFieldSection::new("d", 0, 8, 12));

        let offsets: Vec<u32> = def.sections().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12]);
        assert_eq!(def.total_size(), 16);
    }

    #[test]
    fn test_equal_offsets() {
        let mut def = BitFieldDefinition::new();
        def.add_section(BitFieldSection::new("x", 0, 2, 4));
        def.add_section(BitFieldSection::new("y", 2, 2, 4));
        def.add_section(BitFieldSection::new("z", 0, 1, 0));

        assert_eq!(def.sections().len(), 3);
        assert_eq!(def.sections()[0].name, "z");
        assert!(def.sections().iter().skip(1).all(|s| s.offset == 4));
        assert_eq!(def.total_size(), 5);
    }

    #[test]
    fn test_mask() {
        let sec = BitFieldSection::new("mode", 4, 3, 0);
        assert_eq!(sec.mask(), 0b111_0000);
    }
}
