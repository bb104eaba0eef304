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

use zdata_utils::LinkedHashMap;

use crate::data::*;
use crate::errors::Result;
use crate::host::{HostRef, HostValue};
use crate::image::{Section, SequentialRegion};
use crate::serialize::*;
use crate::typesystem::*;

/// An instance of a class or of a value type. `values` follows the declaration order of
/// the fields the source was read through.
#[derive(Clone, Debug, Default)]
pub struct ObjectDescriptor {
    /// `None` for synthetic instances
    pub source: Option<HostRef>,
    pub values: LinkedHashMap<FieldId, DataValue>,
}

impl ObjectDescriptor {
    pub fn new(source: Option<HostRef>) -> ObjectDescriptor {
        ObjectDescriptor {
            source: source,
            values: LinkedHashMap::new(),
        }
    }

    pub(crate) fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_host_object(context, &mut self.source)?;
        transform_map(context, &mut self.values,
            &SerialType::map_of(FieldRepresentation::declared_type(), SerialType::class("DataValue")),
            |context, field| transform_id(context, field),
            |context, value| transform_data_value(context, value))
    }

    pub(crate) fn include_extra_types(&self, reachability: &mut dyn Reachability) {
        if let Some(ref source) = self.source {
            reachability.expand_pending(Entity::Host(source.id()));
        }

        for (field, value) in self.values.iter() {
            if let DataValue::Descriptor(id) = *value {
                if reachability.contains(Entity::Field(*field)) {
                    reachability.expand_pending(Entity::Descriptor(id));
                }
            }
        }
    }

    pub(crate) fn describe(&self, session: &Session, dd: &DataDescriptor, type_name: &str, verbose: bool) -> String {
        let mut ret = format!("$Object({}", type_name);
        if let Some(ref source) = self.source {
            ret.push_str(&format!(" => {}", source));
        }

        if verbose {
            let mut first = true;
            for (field, value) in self.values.iter().filter(|&(_, v)| !v.is_null()) {
                ret.push_str(if first { " -> " } else { ", " });
                first = false;

                let fd = session.ts.get_field(*field);
                let shown = match *value {
                    DataValue::Descriptor(id) => session.get(id).context.map_or("<external>".to_string(), |ty| session.ts.full_name(ty).to_string()),
                    ref other => other.to_string()
                };
                ret.push_str(&format!("{}::{} = {}", session.ts.full_name(fd.owner), fd.name, shown));
            }
        }
        ret.push(')');

        if let Some(nesting) = dd.nesting {
            ret.push_str(&format!(" => {}", session.describe(nesting.descriptor, verbose)));
        }
        ret
    }
}

fn missing_source_type(id: DescriptorId) -> crate::errors::DataError {
    type_error!("{} has no type", id)
}

impl<'a> Session<'a> {
    pub(crate) fn refresh_object(&mut self, id: DescriptorId, phase: Option<Phase>) -> Result<()> {
        let (ty, flags, source) = {
            let dd = self.get(id);
            (dd.context.ok_or_else(|| missing_source_type(id))?, dd.flags, dd.as_object().and_then(|od| od.source.clone()))
        };
        let source = match source {
            Some(source) => source,
            None => return Ok(())
        };

        let ts = self.ts;
        let wkf = ts.well_known_fields();
        let text: Option<Vec<u16>> = source.string().map(|s| s.encode_utf16().collect());
        let old = self.get(id).as_object().map(|od| od.values.clone()).unwrap_or_default();

        let mut values = LinkedHashMap::new();
        for field in ts.instance_fields(ty) {
            let fd = ts.get_field(field);
            let special = Some(field);

            let value = if special == wkf.string_first_char {
                DataValue::Chars(string_contents(&text, id)?.clone())
            } else if special == wkf.string_array_length || special == wkf.string_string_length {
                DataValue::u32(string_contents(&text, id)?.len() as u32)
            } else if special == wkf.vtable_type {
                self.refresh_runtime_type(id, field, &source, old.get(&field), phase)?
            } else {
                let host_value = match source.field(&fd.name) {
                    Some(value) => value,
                    None => return Err(type_error!("field {} of {} is missing in source {:?}", fd.name, ts.full_name(ty), source))
                };

                let nested = old.get(&field).and_then(|v| v.as_descriptor())
                    .filter(|nested| self.get(*nested).nesting.is_some() && self.get(*nested).as_object().is_some());

                match (nested, host_value) {
                    (Some(nested), HostValue::Ref(ref obj)) if ts.is_value_type(fd.field_type) => {
                        self.update_source(nested, obj.clone(), phase)?;
                        DataValue::Descriptor(nested)
                    }
                    (_, host_value) => self.convert(fd.field_type, flags, None, &host_value, Some(Nesting::in_field(id, field)), phase)?
                }
            };
            values.insert(field, value);
        }

        if let Some(od) = self.get_mut(id).as_object_mut() {
            od.values = values;
        }
        Ok(())
    }

    /// the runtime type object a virtual table points to, built once and kept across
    /// refreshes
    fn refresh_runtime_type(&mut self, id: DescriptorId, field: FieldId, source: &HostRef,
                            old: Option<&DataValue>, phase: Option<Phase>) -> Result<DataValue> {
        if let Some(&DataValue::Descriptor(existing)) = old {
            return Ok(DataValue::Descriptor(existing));
        }

        let described = match source.field(&self.ts.get_field(field).name) {
            Some(HostValue::Type(ty)) => ty,
            Some(HostValue::Null) | None => return Ok(DataValue::Null),
            Some(other) => return Err(type_error!("virtual table {} describes {:?}, not a type", id, other))
        };

        let wkt = self.ts.well_known_types();
        let wkf = self.ts.well_known_fields();
        let (impl_type, handle_type, handle_field, value_field) =
            match (wkt.runtime_type_impl, wkt.runtime_type_handle, wkf.runtime_type_impl_handle, wkf.runtime_type_handle_value) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => return Ok(DataValue::Null)
            };

        let flags = Attributes::CONSTANT | Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION;
        let runtime_type = self.build_object(impl_type, flags, None, None)?;
        let handle = self.build_object(handle_type, flags, None, Some(Nesting::in_field(runtime_type, handle_field)))?;

        let vtable = match self.ts.get_type(described).virtual_table {
            Some(ref vtable) => HostValue::Ref(vtable.clone()),
            None => HostValue::Null
        };
        let value_type = self.ts.get_field(value_field).field_type;
        let value = self.convert(value_type, flags, None, &vtable, Some(Nesting::in_field(handle, value_field)), phase)?;

        if let Some(od) = self.get_mut(handle).as_object_mut() {
            od.values.insert(value_field, value);
        }
        if let Some(od) = self.get_mut(runtime_type).as_object_mut() {
            od.values.insert(handle_field, DataValue::Descriptor(handle));
        }

        trace!("runtime type {} for {}", runtime_type, self.ts.full_name(described));
        Ok(DataValue::Descriptor(runtime_type))
    }

    /// drops unreachable fields and prohibited targets, returns the targets kept
    pub(crate) fn reduce_object(&mut self, id: DescriptorId, reachability: &mut dyn Reachability, apply: bool) -> Vec<DescriptorId> {
        let values = match self.get(id).as_object() {
            Some(od) => od.values.clone(),
            None => return vec![]
        };

        let mut kept = LinkedHashMap::new();
        let mut targets = vec![];
        for (field, value) in values {
            if !reachability.contains(Entity::Field(field)) {
                continue;
            }
            if let DataValue::Descriptor(target) = value {
                if reachability.is_prohibited(Entity::Descriptor(target)) {
                    continue;
                }
                targets.push(target);
            }
            kept.insert(field, value);
        }

        if apply {
            if let Some(od) = self.get_mut(id).as_object_mut() {
                od.values = kept;
            }
        }
        targets
    }

    pub(crate) fn write_object(&mut self, id: DescriptorId, region: &mut dyn SequentialRegion) -> Result<()> {
        self.write_header(id, region)?;

        let dd = self.get(id);
        let ty = dd.context.ok_or_else(|| missing_source_type(id))?;
        let array_length = match dd.as_object().and_then(|od| od.source.as_ref()).and_then(|s| s.string()) {
            Some(text) => text.encode_utf16().count() as u32 + 1,
            None => 0
        };

        let layout = self.ts.get_type(ty).layout;
        let mut section = region.section_of_fixed_size(layout.base_size + layout.element_size * array_length)?;
        self.write_fields(id, &mut section)
    }

    /// writes the fields of an object at their declared offsets. Nested value types are
    /// written in place.
    pub(crate) fn write_fields(&mut self, id: DescriptorId, section: &mut Section) -> Result<()> {
        let ts = self.ts;
        let wkf = ts.well_known_fields();
        let values = match self.get(id).as_object() {
            Some(od) => od.values.clone(),
            None => return Err(type_error!("{} cannot be embedded, it is not an object", id))
        };

        for (field, value) in values {
            let fd = ts.get_field(field);
            section.set_offset(fd.offset as u32);
            section.add_image_annotation(ts.size_of_holding_variable(fd.field_type), field);

            if Some(field) == wkf.code_pointer_target {
                self.write_code_pointer(section, &value)?;
                continue;
            }

            match value {
                DataValue::Null => {
                    if ts.is_reference_type(fd.field_type) {
                        section.write_null_pointer()?;
                    }
                }
                DataValue::Chars(ref chars) => section.write_chars(chars)?,
                DataValue::Scalar(ref s) | DataValue::Enum(ref s) => section.write_scalar(s)?,
                DataValue::Descriptor(target) => {
                    let nested = self.get(target);
                    match (nested.nesting, nested.context) {
                        (Some(_), Some(nested_type)) => {
                            let mut sub = section.sub_section(ts.get_type(nested_type).size)?;
                            self.write_fields(target, &mut sub)?;
                        }
                        _ => section.write_pointer_to_descriptor(target)?
                    }
                }
            }
        }
        Ok(())
    }

    /// code pointer fields hold ids from the code pointer table until the image is built
    fn write_code_pointer(&mut self, section: &mut Section, value: &DataValue) -> Result<()> {
        let raw = match *value {
            DataValue::Scalar(ScalarValue::IntPtr(v)) | DataValue::Scalar(ScalarValue::I32(v)) => v,
            DataValue::Null => return section.write_null_pointer(),
            ref other => return Err(type_error!("code pointer holds {}", other))
        };

        match self.code_pointer_target(raw) {
            Some(CodeTarget::Method(method)) => match self.ts.code_for_method(method) {
                Some(entry) => section.write_pointer_to_basic_block(entry),
                None => section.write_null_pointer(),
            },
            Some(CodeTarget::ExceptionHandler(block)) => section.write_pointer_to_basic_block(block),
            Some(CodeTarget::Other(_)) | None => section.write_i32(raw),
        }
    }

    pub(crate) fn object_data_at_offset(&mut self, id: DescriptorId, access_path: &[FieldId], index: usize, offset: i32) -> Result<Option<DataValue>> {
        let values = match self.get(id).as_object() {
            Some(od) => od.values.clone(),
            None => return Ok(None)
        };

        if let Some(field) = access_path.get(index) {
            let value = match values.get(field) {
                Some(value) => value.clone(),
                None => return Ok(None)
            };

            if index + 1 == access_path.len() {
                return Ok(Some(value));
            }
            return match value {
                DataValue::Descriptor(target) => {
                    let offset = offset - self.ts.get_field(*field).offset;
                    self.get_data_at_offset(target, access_path, index + 1, offset)
                }
                _ => Ok(None)
            };
        }

        Ok(values.iter()
            .find(|&(field, _)| self.ts.get_field(*field).offset == offset)
            .map(|(_, value)| value.clone()))
    }
}

fn string_contents(text: &Option<Vec<u16>>, id: DescriptorId) -> Result<&Vec<u16>> {
    text.as_ref().ok_or_else(|| type_error!("{} has string fields but its source is not a string", id))
}
