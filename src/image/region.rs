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

use byteorder::{ByteOrder, LittleEndian};

use zdata_utils::math::align_up;
use zdata_utils::{ByteSize, POINTER_SIZE, WORD_SIZE};

use crate::data::DescriptorId;
use crate::errors::{DataError, Result};
use crate::image::*;
use crate::typesystem::{BlockId, FieldId, ScalarValue};

/// Bytes written so far and the metadata collected while writing them.
#[derive(Clone, Debug, Default)]
pub struct RegionData {
    bytes: Vec<u8>,
    relocations: Vec<RelocationEntry>,
    annotations: Vec<ImageAnnotation>,
}

/// An in-memory sequential region. Sections are word aligned.
#[derive(Clone, Debug)]
pub struct ByteRegion {
    data: RegionData,
    placement: Option<PlacementRequirements>,
    pointer_offset: u32,
    payload_cutoff: u32,
}

impl ByteRegion {
    pub fn new(placement: Option<PlacementRequirements>) -> ByteRegion {
        ByteRegion {
            data: RegionData::default(),
            placement: placement,
            pointer_offset: 0,
            payload_cutoff: u32::max_value(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data.bytes
    }

    /// the bytes stored in the image, everything before the payload cutoff
    pub fn payload(&self) -> &[u8] {
        let end = ::std::cmp::min(self.payload_cutoff as usize, self.data.bytes.len());
        &self.data.bytes[..end]
    }

    pub fn relocations(&self) -> &[RelocationEntry] {
        &self.data.relocations
    }

    pub fn annotations(&self) -> &[ImageAnnotation] {
        &self.data.annotations
    }

    pub fn pointer_offset(&self) -> u32 {
        self.pointer_offset
    }

    pub fn payload_cutoff(&self) -> u32 {
        self.payload_cutoff
    }
}

impl SequentialRegion for ByteRegion {
    fn placement_requirements(&self) -> Option<PlacementRequirements> {
        self.placement
    }

    fn position(&self) -> u32 {
        self.data.bytes.len() as u32
    }

    fn set_pointer_offset(&mut self, offset: u32) {
        self.pointer_offset = offset;
    }

    fn set_payload_cutoff(&mut self, offset: u32) {
        self.payload_cutoff = offset;
    }

    fn section_of_fixed_size(&mut self, size: ByteSize) -> Result<Section<'_>> {
        let start = self.data.bytes.len() as u32;
        let aligned = align_up(size, WORD_SIZE);
        self.data.bytes.resize((start + aligned) as usize, 0);

        trace!("section [{}, {}) of region", start, start + size);
        Ok(Section::new(&mut self.data, start, size))
    }
}

/// A fixed size window of a region with a write cursor. Writes advance the cursor and
/// fail with `DataError::Overflow` past the end of the section.
pub struct Section<'a> {
    data: &'a mut RegionData,
    start: u32,
    size: ByteSize,
    offset: u32,
}

impl<'a> Section<'a> {
    pub fn new(data: &'a mut RegionData, start: u32, size: ByteSize) -> Section<'a> {
        Section {
            data: data,
            start: start,
            size: size,
            offset: 0,
        }
    }

    pub fn size(&self) -> ByteSize {
        self.size
    }

    /// cursor relative to the start of the section
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// cursor relative to the start of the region
    pub fn position(&self) -> u32 {
        self.start + self.offset
    }

    /// carves the next `size` bytes out as a section of their own
    pub fn sub_section(&mut self, size: ByteSize) -> Result<Section<'_>> {
        let start = self.reserve(size)?;
        Ok(Section::new(&mut *self.data, start, size))
    }

    fn reserve(&mut self, needed: u32) -> Result<u32> {
        if self.offset.checked_add(needed).map_or(true, |end| end > self.size) {
            return Err(DataError::Overflow { offset: self.offset, needed: needed, size: self.size });
        }
        let pos = self.start + self.offset;
        self.offset += needed;
        Ok(pos)
    }

    fn slot(&mut self, needed: u32) -> Result<&mut [u8]> {
        let pos = self.reserve(needed)? as usize;
        Ok(&mut self.data.bytes[pos..pos + needed as usize])
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(if v { 1 } else { 0 })
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.slot(1)?[0] = v;
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        LittleEndian::write_u16(self.slot(2)?, v);
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        LittleEndian::write_i16(self.slot(2)?, v);
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        LittleEndian::write_u32(self.slot(4)?, v);
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        LittleEndian::write_i32(self.slot(4)?, v);
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        LittleEndian::write_u64(self.slot(8)?, v);
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        LittleEndian::write_i64(self.slot(8)?, v);
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        LittleEndian::write_f32(self.slot(4)?, v);
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        LittleEndian::write_f64(self.slot(8)?, v);
        Ok(())
    }

    pub fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.slot(v.len() as u32)?.copy_from_slice(v);
        Ok(())
    }

    pub fn write_chars(&mut self, v: &[u16]) -> Result<()> {
        LittleEndian::write_u16_into(v, self.slot(2 * v.len() as u32)?);
        Ok(())
    }

    pub fn write_i32s(&mut self, v: &[i32]) -> Result<()> {
        LittleEndian::write_i32_into(v, self.slot(4 * v.len() as u32)?);
        Ok(())
    }

    pub fn write_u32s(&mut self, v: &[u32]) -> Result<()> {
        LittleEndian::write_u32_into(v, self.slot(4 * v.len() as u32)?);
        Ok(())
    }

    /// writes a scalar at its natural width
    pub fn write_scalar(&mut self, v: &ScalarValue) -> Result<()> {
        match *v {
            ScalarValue::Bool(v) => self.write_bool(v),
            ScalarValue::Char(v) => self.write_u16(v),
            ScalarValue::I8(v) => self.write_i8(v),
            ScalarValue::U8(v) => self.write_u8(v),
            ScalarValue::I16(v) => self.write_i16(v),
            ScalarValue::U16(v) => self.write_u16(v),
            ScalarValue::I32(v) => self.write_i32(v),
            ScalarValue::U32(v) => self.write_u32(v),
            ScalarValue::I64(v) => self.write_i64(v),
            ScalarValue::U64(v) => self.write_u64(v),
            ScalarValue::F32(v) => self.write_f32(v),
            ScalarValue::F64(v) => self.write_f64(v),
            ScalarValue::IntPtr(v) => self.write_i32(v),
            ScalarValue::UIntPtr(v) => self.write_u32(v),
        }
    }

    pub fn write_null_pointer(&mut self) -> Result<()> {
        self.write_u32(0)
    }

    pub fn write_pointer_to_descriptor(&mut self, target: DescriptorId) -> Result<()> {
        self.write_pointer(Relocation::Descriptor(target))
    }

    pub fn write_pointer_to_basic_block(&mut self, target: BlockId) -> Result<()> {
        self.write_pointer(Relocation::BasicBlock(target))
    }

    /// leaves a null placeholder and records the relocation that fills it in
    fn write_pointer(&mut self, target: Relocation) -> Result<()> {
        let offset = self.reserve(POINTER_SIZE)?;
        self.data.relocations.push(RelocationEntry { offset: offset, target: target });
        Ok(())
    }

    /// annotates the `size` bytes at the cursor as holding `field`
    pub fn add_image_annotation(&mut self, size: ByteSize, field: FieldId) {
        let offset = self.position();
        self.data.annotations.push(ImageAnnotation { offset: offset, size: size, field: field });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections() {
        let mut region = ByteRegion::new(None);
        {
            let mut section = region.section_of_fixed_size(6).unwrap();
            section.write_u16(0x1234).unwrap();
            section.write_u32(0xdeadbeef).unwrap();
            assert!(section.write_u8(0).is_err());
        }
        assert_eq!(region.position(), 8);
        assert_eq!(region.bytes(), &[0x34, 0x12, 0xef, 0xbe, 0xad, 0xde, 0, 0]);
    }

    #[test]
    fn test_sub_sections_and_relocations() {
        let mut region = ByteRegion::new(None);
        {
            let mut section = region.section_of_fixed_size(12).unwrap();
            section.set_offset(4);
            {
                let mut sub = section.sub_section(4).unwrap();
                assert_eq!(sub.position(), 4);
                sub.write_pointer_to_descriptor(DescriptorId(7)).unwrap();
                assert!(sub.write_u8(1).is_err());
            }
            assert_eq!(section.offset(), 8);
            section.add_image_annotation(4, FieldId(3));
            section.write_null_pointer().unwrap();
        }

        assert_eq!(region.relocations(), &[RelocationEntry { offset: 4, target: Relocation::Descriptor(DescriptorId(7)) }]);
        assert_eq!(region.annotations(), &[ImageAnnotation { offset: 8, size: 4, field: FieldId(3) }]);
    }

    #[test]
    fn test_payload_cutoff() {
        let mut region = ByteRegion::new(Some(PlacementRequirements::uninitialized(4)));
        {
            let mut section = region.section_of_fixed_size(8).unwrap();
            section.write_u32(2).unwrap();
        }
        region.set_payload_cutoff(4);
        assert_eq!(region.payload(), &[2, 0, 0, 0]);
        assert_eq!(region.bytes().len(), 8);
    }
}
