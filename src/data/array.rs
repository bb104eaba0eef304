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

use crate::data::*;
use crate::errors::Result;
use crate::host::{HostArray, HostRef, HostValue};
use crate::image::SequentialRegion;
use crate::serialize::*;
use crate::typesystem::*;

/// A fixed length array. Arrays of primitives read their elements from the source and
/// keep `values` unset.
#[derive(Clone, Debug, Default)]
pub struct ArrayDescriptor {
    pub source: Option<HostRef>,
    pub length: u32,
    pub values: Option<Vec<DataValue>>,
}

impl ArrayDescriptor {
    pub fn new(source: Option<HostRef>, length: u32) -> ArrayDescriptor {
        let values = match source.as_ref().and_then(|s| s.array()) {
            Some(HostArray::Values(_)) | None => Some(vec![DataValue::Null; length as usize]),
            Some(_) => None
        };

        ArrayDescriptor {
            source: source,
            length: length,
            values: values,
        }
    }

    pub fn element(&self, index: usize) -> Option<DataValue> {
        if index >= self.length as usize {
            return None;
        }

        match self.values {
            Some(ref values) => values.get(index).cloned(),
            None => match self.source.as_ref().and_then(|s| s.array_get(index)) {
                Some(HostValue::Scalar(s)) => Some(DataValue::Scalar(s)),
                Some(HostValue::Enum(s)) => Some(DataValue::Enum(s)),
                _ => Some(DataValue::Null)
            }
        }
    }

    /// stores an element. Elements read from the source are copied out first.
    pub fn set_element(&mut self, index: usize, value: DataValue) -> Result<()> {
        if index >= self.length as usize {
            return Err(type_error!("index {} out of range for an array of length {}", index, self.length));
        }

        if self.values.is_none() {
            let copied = (0..self.length as usize).map(|i| self.element(i).unwrap_or_default()).collect();
            self.values = Some(copied);
        }
        if let Some(ref mut values) = self.values {
            values[index] = value;
        }
        Ok(())
    }

    pub(crate) fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_host_object(context, &mut self.source)?;
        context.transform_u32(&mut self.length)?;
        transform_array(context, &mut self.values, SerialType::class("DataValue"),
            |context, value| transform_data_value(context, value))
    }

    pub(crate) fn describe(&self, session: &Session, dd: &DataDescriptor, type_name: &str, verbose: bool) -> String {
        let mut ret = format!("$Array({}", type_name);
        if let Some(ref source) = self.source {
            ret.push_str(&format!(" => {}", source));
        }

        if verbose {
            let shown: Vec<String> = (0..self.length as usize)
                .filter_map(|i| self.element(i).map(|v| (i, v)))
                .filter(|&(_, ref v)| !v.is_null())
                .map(|(i, v)| match v {
                    DataValue::Descriptor(id) => format!("{} = {}", i, session.get(id).context.map_or("<external>", |ty| session.ts.full_name(ty))),
                    other => format!("{} = {}", i, other)
                })
                .collect();
            ret.push_str(&format!(" -> [{}]", shown.join(", ")));
        }
        ret.push(')');

        if let Some(nesting) = dd.nesting {
            ret.push_str(&format!(" => {}", session.describe(nesting.descriptor, verbose)));
        }
        ret
    }
}

impl<'a> Session<'a> {
    pub(crate) fn refresh_array(&mut self, id: DescriptorId, phase: Option<Phase>) -> Result<()> {
        let (ty, flags, source, old) = {
            let dd = self.get(id);
            let ad = match dd.as_array() {
                Some(ad) => ad,
                None => return Ok(())
            };
            match (dd.context, &ad.source, &ad.values) {
                (Some(ty), &Some(ref source), &Some(ref values)) => (ty, dd.flags, source.clone(), values.clone()),
                _ => return Ok(())
            }
        };

        let ts = self.ts;
        let elem = match ts.element_type(ty) {
            Some(elem) => elem,
            None => return Err(type_error!("{} is an array of non array type {}", id, ts.full_name(ty)))
        };
        let embedded = ts.is_value_type(elem);

        let mut values = Vec::with_capacity(old.len());
        for (index, old_value) in old.iter().enumerate() {
            let host_value = source.array_get(index).unwrap_or_default();

            let nested = old_value.as_descriptor()
                .filter(|nested| self.get(*nested).nesting.is_some() && self.get(*nested).as_object().is_some());

            let value = match (nested, host_value) {
                (Some(nested), HostValue::Ref(ref obj)) if embedded => {
                    self.update_source(nested, obj.clone(), phase)?;
                    DataValue::Descriptor(nested)
                }
                (_, host_value) => self.convert(elem, flags, None, &host_value, Some(Nesting::in_element(id, index)), phase)?
            };
            values.push(value);
        }

        if let Some(ad) = self.get_mut(id).as_array_mut() {
            ad.values = Some(values);
        }
        Ok(())
    }

    /// nulls prohibited elements, returns the targets kept
    pub(crate) fn reduce_array(&mut self, id: DescriptorId, reachability: &mut dyn Reachability, apply: bool) -> Vec<DescriptorId> {
        let values = match self.get(id).as_array().and_then(|ad| ad.values.clone()) {
            Some(values) => values,
            None => return vec![]
        };

        let mut kept = Vec::with_capacity(values.len());
        let mut targets = vec![];
        for value in values {
            match value {
                DataValue::Descriptor(target) if reachability.is_prohibited(Entity::Descriptor(target)) => kept.push(DataValue::Null),
                DataValue::Descriptor(target) => {
                    targets.push(target);
                    kept.push(value);
                }
                other => kept.push(other)
            }
        }

        if apply {
            if let Some(ad) = self.get_mut(id).as_array_mut() {
                ad.values = Some(kept);
            }
        }
        targets
    }

    pub(crate) fn include_array_elements(&self, ad: &ArrayDescriptor, reachability: &mut dyn Reachability) {
        let values = match ad.values {
            Some(ref values) => values,
            None => return
        };

        for target in values.iter().filter_map(|v| v.as_descriptor()) {
            if let Some(ty) = self.get(target).context {
                if reachability.contains(Entity::Type(ty)) {
                    reachability.expand_pending(Entity::Descriptor(target));
                }
            }
        }
    }

    pub(crate) fn write_array(&mut self, id: DescriptorId, region: &mut dyn SequentialRegion) -> Result<()> {
        self.write_header(id, region)?;

        let ts = self.ts;
        let ad = match self.get(id).as_array() {
            Some(ad) => ad.clone(),
            None => return Err(type_error!("{} is not an array", id))
        };
        let ty = self.get(id).context.ok_or_else(|| type_error!("{} has no type", id))?;
        let elem = ts.element_type(ty).ok_or_else(|| type_error!("{} is an array of non array type {}", id, ts.full_name(ty)))?;
        let layout = ts.get_type(ty).layout;
        let uninitialized = region.placement_requirements().map_or(false, |p| p.contents_uninitialized);

        let mut cutoff = None;
        {
            let mut section = region.section_of_fixed_size(layout.base_size + layout.element_size * ad.length)?;

            if let Some(field) = ts.well_known_fields().array_num_elements {
                let fd = ts.get_field(field);
                section.set_offset(fd.offset as u32);
                section.add_image_annotation(ts.size_of_holding_variable(fd.field_type), field);
                section.write_u32(ad.length)?;
            }

            if uninitialized {
                cutoff = Some(section.position());
            } else if let (None, Some(array)) = (&ad.values, ad.source.as_ref().and_then(|s| s.array())) {
                section.set_offset(layout.base_size);
                match array {
                    HostArray::Bytes(ref v) => section.write_bytes(v)?,
                    HostArray::Chars(ref v) => section.write_chars(v)?,
                    HostArray::Ints(ref v) => section.write_i32s(v)?,
                    HostArray::UInts(ref v) => section.write_u32s(v)?,
                    HostArray::Scalars(ref v) => {
                        for (index, s) in v.iter().enumerate() {
                            section.set_offset(layout.base_size + layout.element_size * index as u32);
                            section.write_scalar(s)?;
                        }
                    }
                    HostArray::Values(_) => return Err(type_error!("{} lost the elements of its source", id)),
                }
            } else {
                for index in 0..ad.length {
                    section.set_offset(layout.base_size + layout.element_size * index);
                    match ad.element(index as usize).unwrap_or_default() {
                        DataValue::Null => {
                            if ts.is_reference_type(elem) {
                                section.write_null_pointer()?;
                            }
                        }
                        DataValue::Scalar(ref s) | DataValue::Enum(ref s) => section.write_scalar(s)?,
                        DataValue::Descriptor(target) => {
                            if self.get(target).nesting.is_some() {
                                let mut sub = section.sub_section(layout.element_size)?;
                                self.write_fields(target, &mut sub)?;
                            } else {
                                section.write_pointer_to_descriptor(target)?;
                            }
                        }
                        DataValue::Chars(_) => return Err(type_error!("{} holds characters as an element", id)),
                    }
                }
            }
        }

        if let Some(cutoff) = cutoff {
            region.set_payload_cutoff(cutoff);
        }
        Ok(())
    }

    /// offset 0 reads the length, any other offset the element it falls in
    pub(crate) fn array_data_at_offset(&self, id: DescriptorId, offset: i32) -> Option<DataValue> {
        let dd = self.get(id);
        let ad = dd.as_array()?;
        if offset == 0 {
            return Some(DataValue::u32(ad.length));
        }

        let layout = self.ts.get_type(dd.context?).layout;
        if layout.element_size == 0 {
            return None;
        }

        // truncating, an offset inside an element reads the whole element
        let index = (offset - layout.base_size as i32) / layout.element_size as i32;
        if index >= 0 && (index as u32) < ad.length {
            ad.element(index as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::image::{ByteRegion, PlacementRequirements};

    fn int_array() -> (Arc<TypeSystem>, TypeId) {
        let mut ts = TypeSystem::with_runtime_types();
        let i32_type = ts.scalar_type(ScalarKind::I32).unwrap();
        let ty = ts.array_of(i32_type);
        (Arc::new(ts), ty)
    }

    #[test]
    fn test_primitive_arrays_read_through() {
        let (_, ty) = int_array();
        let source = HostRef::new_array(ty, HostArray::Ints(vec![4, 5]));
        let ad = ArrayDescriptor::new(Some(source), 2);

        assert!(ad.values.is_none());
        assert_eq!(ad.element(1), Some(DataValue::Scalar(ScalarValue::I32(5))));
        assert_eq!(ad.element(2), None);
    }

    #[test]
    fn test_set_copies_out() {
        let (_, ty) = int_array();
        let source = HostRef::new_array(ty, HostArray::Ints(vec![4, 5]));
        let mut ad = ArrayDescriptor::new(Some(source), 2);

        ad.set_element(0, DataValue::Scalar(ScalarValue::I32(9))).unwrap();
        assert_eq!(ad.values, Some(vec![DataValue::Scalar(ScalarValue::I32(9)), DataValue::Scalar(ScalarValue::I32(5))]));
        assert!(ad.set_element(2, DataValue::Null).is_err());
    }

    #[test]
    fn test_write_int_array() {
        let (ts, ty) = int_array();
        let dm = DataManager::new(ts);
        let source = HostRef::new_array(ty, HostArray::Ints(vec![1, 2, 3]));
        let id = dm.convert_to_object_descriptor(ty, Attributes::CONSTANT, None, &HostValue::Ref(source), None)
            .unwrap().as_descriptor().unwrap();

        let mut region = ByteRegion::new(None);
        dm.write(id, &mut region).unwrap();

        let bytes = region.bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &[0x6, 0, 0, 0]);
        assert_eq!(&bytes[8..24], &[3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(region.relocations().len(), 1);
    }

    #[test]
    fn test_uninitialized_contents() {
        let (ts, ty) = int_array();
        let dm = DataManager::new(ts);
        let id = dm.build_array_descriptor(ty, Attributes::MUTABLE, None, 4).unwrap();

        let mut region = ByteRegion::new(Some(PlacementRequirements::uninitialized(4)));
        dm.write(id, &mut region).unwrap();

        assert_eq!(&region.bytes()[0..4], &[0x4, 0, 0, 0]);
        assert_eq!(region.payload_cutoff(), 12);
        assert_eq!(region.payload().len(), 12);
    }

    #[test]
    fn test_data_at_offset() {
        let (ts, ty) = int_array();
        let dm = DataManager::new(ts);
        let source = HostRef::new_array(ty, HostArray::Ints(vec![10, 20, 30]));
        let id = dm.convert_to_object_descriptor(ty, Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION, None, &HostValue::Ref(source), None)
            .unwrap().as_descriptor().unwrap();

        assert_eq!(dm.get_data_at_offset(id, &[], 0, 0).unwrap(), Some(DataValue::u32(3)));
        assert_eq!(dm.get_data_at_offset(id, &[], 0, 8).unwrap(), Some(DataValue::Scalar(ScalarValue::I32(20))));
        // inside the second element
        assert_eq!(dm.get_data_at_offset(id, &[], 0, 10).unwrap(), Some(DataValue::Scalar(ScalarValue::I32(20))));
        assert_eq!(dm.get_data_at_offset(id, &[], 0, 16).unwrap(), None);
    }
}
