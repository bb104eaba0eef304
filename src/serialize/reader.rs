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

use std::collections::{HashMap, VecDeque};
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::errors::{DataError, Result};
use crate::host::HostRef;
use crate::serialize::*;
use crate::typesystem::ScalarKind;

/// Supplies entities for record types before the built-in constructors are tried.
pub type InstanceFactory = Box<dyn FnMut(&SerialType) -> Option<Instance>>;

/// Notified with the number of objects read so far.
pub type ProgressFeedback = Box<dyn FnMut(usize)>;

/// Decodes an object graph written by `Writer`.
pub struct Reader<R: Read> {
    stream: R,

    objects: Vec<SharedObject>,
    types: Vec<SerialType>,
    deferred: VecDeque<HostRef>,

    factory: Option<InstanceFactory>,
    constructors: HashMap<SerialType, Constructor>,

    progress: Option<(usize, ProgressFeedback)>,
}

impl<R: Read> Reader<R> {
    /// creates a reader and checks the stream header
    pub fn new(stream: R) -> Result<Reader<R>> {
        let mut ret = Reader {
            stream: stream,
            objects: vec![],
            types: vec![],
            deferred: VecDeque::new(),
            factory: None,
            constructors: HashMap::new(),
            progress: None,
        };

        let version = ret.read_raw_string()?;
        if version != VERSION {
            return Err(DataError::Format(format!("unsupported version {:?}, expected {:?}", version, VERSION)));
        }
        Ok(ret)
    }

    pub fn with_factory(mut self, factory: InstanceFactory) -> Reader<R> {
        self.factory = Some(factory);
        self
    }

    /// `feedback` is called every `quantum` objects
    pub fn with_progress(mut self, quantum: usize, feedback: ProgressFeedback) -> Reader<R> {
        if quantum > 0 {
            self.progress = Some((quantum, feedback));
        }
        self
    }

    pub fn objects_read(&self) -> usize {
        self.objects.len()
    }

    fn allocate_index(&mut self) -> usize {
        let ret = self.objects.len();
        self.objects.push(SharedObject::Reserved);

        if let Some((quantum, ref mut feedback)) = self.progress {
            if self.objects.len() % quantum == 0 {
                feedback(self.objects.len());
            }
        }
        ret
    }

    fn read_tag(&mut self) -> Result<RecordType> {
        let tag = self.stream.read_u8()?;
        RecordType::from_u8(tag).ok_or_else(|| DataError::Format(format!("unknown record type {}", tag)))
    }

    fn read_index(&mut self, limit: usize, what: &str) -> Result<usize> {
        let index = self.stream.read_i32::<LittleEndian>()?;
        if index < 0 || index as usize >= limit {
            return Err(DataError::Format(format!("{} index {} out of range", what, index)));
        }
        Ok(index as usize)
    }

    fn read_varint(&mut self) -> Result<u32> {
        let mut ret = 0u32;
        let mut shift = 0;
        loop {
            let byte = self.stream.read_u8()?;
            if shift > 28 {
                return Err(DataError::Format("malformed string length".to_string()));
            }
            ret |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(ret);
            }
            shift += 7;
        }
    }

    /// reads `len` bytes, the buffer grows with what the stream delivers
    fn read_payload(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![];
        self.stream.by_ref().take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(DataError::Format(format!("stream ends {} bytes into a payload of {}", bytes.len(), len)));
        }
        Ok(bytes)
    }

    fn read_raw_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.read_payload(len)?;
        String::from_utf8(bytes).map_err(|e| DataError::Format(format!("malformed string: {}", e)))
    }

    /// reads the type of a record whose tag is already read
    fn read_type(&mut self, tag: RecordType, expected: Option<&SerialType>) -> Result<SerialType> {
        match tag {
            RecordType::ClassNoDef => expected.cloned()
                .ok_or_else(|| DataError::Format("record without type where no type is implied".to_string())),
            RecordType::TypeUse => {
                let index = self.read_index(self.types.len(), "type")?;
                Ok(self.types[index].clone())
            }
            RecordType::TypeDefinition => {
                let ty = match self.read_tag()? {
                    RecordType::Array => {
                        let tag = self.read_tag()?;
                        SerialType::array_of(self.read_type(tag, None)?)
                    }
                    RecordType::Class => {
                        let name = self.read_raw_string()?;
                        let count = self.stream.read_i32::<LittleEndian>()?;
                        if count < 0 {
                            return Err(DataError::Format(format!("negative argument count for {}", name)));
                        }
                        let mut args = vec![];
                        for _ in 0..count {
                            let tag = self.read_tag()?;
                            args.push(self.read_type(tag, None)?);
                        }
                        SerialType::generic(&name, args)
                    }
                    other => return Err(DataError::Format(format!("unexpected {:?} in type definition", other)))
                };

                trace!("define type {} as {}", ty, self.types.len());
                self.types.push(ty.clone());
                Ok(ty)
            }
            other => Err(DataError::Format(format!("expected a type, found {:?}", other)))
        }
    }

    fn back_reference(&mut self) -> Result<SharedObject> {
        let index = self.read_index(self.objects.len(), "object")?;
        match self.objects[index] {
            SharedObject::Reserved => Err(protocol_error!("back reference to object {} which is under construction", index)),
            ref object => Ok(object.clone())
        }
    }

    fn expect_type(&mut self, tag: RecordType, ty: &SerialType) -> Result<()> {
        let actual = self.read_type(tag, Some(ty))?;
        if actual != *ty {
            return Err(DataError::Format(format!("expected {}, found {}", ty, actual)));
        }
        Ok(())
    }
}

impl<R: Read> TransformationContext for Reader<R> {
    fn is_reading(&self) -> bool {
        true
    }

    fn transform_bool(&mut self, v: &mut bool) -> Result<()> {
        *v = self.stream.read_u8()? != 0;
        Ok(())
    }

    fn transform_u8(&mut self, v: &mut u8) -> Result<()> {
        *v = self.stream.read_u8()?;
        Ok(())
    }

    fn transform_i8(&mut self, v: &mut i8) -> Result<()> {
        *v = self.stream.read_i8()?;
        Ok(())
    }

    fn transform_u16(&mut self, v: &mut u16) -> Result<()> {
        *v = self.stream.read_u16::<LittleEndian>()?;
        Ok(())
    }

    fn transform_i16(&mut self, v: &mut i16) -> Result<()> {
        *v = self.stream.read_i16::<LittleEndian>()?;
        Ok(())
    }

    fn transform_u32(&mut self, v: &mut u32) -> Result<()> {
        *v = self.stream.read_u32::<LittleEndian>()?;
        Ok(())
    }

    fn transform_i32(&mut self, v: &mut i32) -> Result<()> {
        *v = self.stream.read_i32::<LittleEndian>()?;
        Ok(())
    }

    fn transform_u64(&mut self, v: &mut u64) -> Result<()> {
        *v = self.stream.read_u64::<LittleEndian>()?;
        Ok(())
    }

    fn transform_i64(&mut self, v: &mut i64) -> Result<()> {
        *v = self.stream.read_i64::<LittleEndian>()?;
        Ok(())
    }

    fn transform_f32(&mut self, v: &mut f32) -> Result<()> {
        *v = self.stream.read_f32::<LittleEndian>()?;
        Ok(())
    }

    fn transform_f64(&mut self, v: &mut f64) -> Result<()> {
        *v = self.stream.read_f64::<LittleEndian>()?;
        Ok(())
    }

    fn transform_string(&mut self, v: &mut Option<String>) -> Result<()> {
        *v = match self.read_tag()? {
            RecordType::Null => None,
            RecordType::Index => match self.back_reference()? {
                SharedObject::Str(s) => Some(s),
                other => return Err(protocol_error!("expected a string, found {:?}", other))
            },
            tag => {
                self.expect_type(tag, &SerialType::string())?;
                let index = self.allocate_index();
                let s = self.read_raw_string()?;
                self.objects[index] = SharedObject::Str(s.clone());
                Some(s)
            }
        };
        Ok(())
    }

    fn transform_bytes(&mut self, v: &mut Option<Vec<u8>>) -> Result<()> {
        *v = match self.read_tag()? {
            RecordType::Null => None,
            RecordType::Index => return Err(protocol_error!("byte arrays cannot be shared")),
            tag => {
                self.expect_type(tag, &SerialType::array_of(ScalarKind::U8.serial_type()))?;
                self.allocate_index();
                let len = self.stream.read_i32::<LittleEndian>()?;
                if len < 0 {
                    return Err(DataError::Format(format!("negative array length {}", len)));
                }
                Some(self.read_payload(len as usize)?)
            }
        };
        Ok(())
    }

    fn transform_signature(&mut self, _presence: Presence, expected: Option<&SerialType>) -> Result<Signature> {
        match self.read_tag()? {
            RecordType::Null => Ok(Signature::Null),
            RecordType::Index => Ok(Signature::BackRef(Some(self.back_reference()?))),
            tag => {
                let ty = self.read_type(tag, expected)?;
                let index = if ty.is_value() { None } else { Some(self.allocate_index()) };
                Ok(Signature::Fresh { ty: ty, index: index })
            }
        }
    }

    fn resolve_shared(&mut self, index: usize, object: SharedObject) -> Result<()> {
        match self.objects.get_mut(index) {
            Some(slot) => {
                *slot = object;
                Ok(())
            }
            None => Err(protocol_error!("object index {} was never taken", index))
        }
    }

    fn create_instance(&mut self, ty: &SerialType) -> Result<Instance> {
        if let Some(ref mut factory) = self.factory {
            if let Some(instance) = factory(ty) {
                return Ok(instance);
            }
        }

        if let Some(ctor) = self.constructors.get(ty) {
            return Ok(ctor());
        }

        let ctor = ty.name()
            .and_then(|name| CONSTRUCTORS.get(name).cloned())
            .ok_or_else(|| DataError::Format(format!("no constructor for records of type {}", ty)))?;
        self.constructors.insert(ty.clone(), ctor);
        Ok(ctor())
    }

    fn defer_contents(&mut self, host: HostRef) {
        self.deferred.push_back(host);
    }

    fn next_deferred(&mut self) -> Option<HostRef> {
        self.deferred.pop_front()
    }
}
