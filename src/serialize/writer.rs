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
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::errors::{DataError, Result};
use crate::host::HostRef;
use crate::serialize::*;

/// Encodes an object graph to a stream. The stream is flushed by `finish`, or when
/// the writer is dropped.
pub struct Writer<W: Write> {
    stream: W,

    objects: HashMap<Identity, usize>,
    strings: HashMap<String, usize>,
    types: HashMap<SerialType, usize>,
    next_index: usize,
    deferred: VecDeque<HostRef>,

    finished: bool,
}

impl<W: Write> Writer<W> {
    /// creates a writer and writes the stream header
    pub fn new(stream: W) -> Result<Writer<W>> {
        let mut ret = Writer {
            stream: stream,
            objects: HashMap::new(),
            strings: HashMap::new(),
            types: HashMap::new(),
            next_index: 0,
            deferred: VecDeque::new(),
            finished: false,
        };
        ret.write_raw_string(VERSION)?;
        Ok(ret)
    }

    pub fn finish(&mut self) -> Result<()> {
        self.stream.flush()?;
        self.finished = true;
        Ok(())
    }

    pub fn objects_written(&self) -> usize {
        self.next_index
    }

    fn allocate_index(&mut self) -> usize {
        let ret = self.next_index;
        self.next_index += 1;
        ret
    }

    fn write_tag(&mut self, tag: RecordType) -> Result<()> {
        self.stream.write_u8(tag as u8)?;
        Ok(())
    }

    fn write_index(&mut self, index: usize) -> Result<()> {
        self.stream.write_i32::<LittleEndian>(index as i32)?;
        Ok(())
    }

    /// 7 bits per byte, low bits first, high bit set on all but the last byte
    fn write_varint(&mut self, mut v: u32) -> Result<()> {
        while v >= 0x80 {
            self.stream.write_u8((v as u8) | 0x80)?;
            v >>= 7;
        }
        self.stream.write_u8(v as u8)?;
        Ok(())
    }

    fn write_raw_string(&mut self, s: &str) -> Result<()> {
        self.write_varint(s.len() as u32)?;
        self.stream.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_type(&mut self, ty: &SerialType, expected: Option<&SerialType>) -> Result<()> {
        if expected == Some(ty) {
            self.write_tag(RecordType::ClassNoDef)
        } else {
            self.define_type(ty)
        }
    }

    /// a known type is referred to by index, an unknown one is defined. Type arguments
    /// are defined before the type itself, so types get their index in post-order.
    fn define_type(&mut self, ty: &SerialType) -> Result<()> {
        if let Some(&index) = self.types.get(ty) {
            self.write_tag(RecordType::TypeUse)?;
            return self.write_index(index);
        }

        self.write_tag(RecordType::TypeDefinition)?;
        match *ty {
            SerialType::Array(ref elem) => {
                self.write_tag(RecordType::Array)?;
                self.define_type(elem)?;
            }
            SerialType::Class { ref name, ref args } => {
                self.write_tag(RecordType::Class)?;
                self.write_raw_string(name)?;
                self.stream.write_i32::<LittleEndian>(args.len() as i32)?;
                for arg in args.iter() {
                    self.define_type(arg)?;
                }
            }
        }

        let index = self.types.len();
        trace!("define type {} as {}", ty, index);
        self.types.insert(ty.clone(), index);
        Ok(())
    }

    /// writes the type of a fresh record and takes an object index unless it is a value
    fn begin_record(&mut self, ty: &SerialType, expected: Option<&SerialType>) -> Result<Option<usize>> {
        self.write_type(ty, expected)?;
        if ty.is_value() {
            Ok(None)
        } else {
            Ok(Some(self.allocate_index()))
        }
    }
}

impl<W: Write> TransformationContext for Writer<W> {
    fn is_reading(&self) -> bool {
        false
    }

    fn transform_bool(&mut self, v: &mut bool) -> Result<()> {
        self.stream.write_u8(if *v { 1 } else { 0 })?;
        Ok(())
    }

    fn transform_u8(&mut self, v: &mut u8) -> Result<()> {
        self.stream.write_u8(*v)?;
        Ok(())
    }

    fn transform_i8(&mut self, v: &mut i8) -> Result<()> {
        self.stream.write_i8(*v)?;
        Ok(())
    }

    fn transform_u16(&mut self, v: &mut u16) -> Result<()> {
        self.stream.write_u16::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_i16(&mut self, v: &mut i16) -> Result<()> {
        self.stream.write_i16::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_u32(&mut self, v: &mut u32) -> Result<()> {
        self.stream.write_u32::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_i32(&mut self, v: &mut i32) -> Result<()> {
        self.stream.write_i32::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_u64(&mut self, v: &mut u64) -> Result<()> {
        self.stream.write_u64::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_i64(&mut self, v: &mut i64) -> Result<()> {
        self.stream.write_i64::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_f32(&mut self, v: &mut f32) -> Result<()> {
        self.stream.write_f32::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_f64(&mut self, v: &mut f64) -> Result<()> {
        self.stream.write_f64::<LittleEndian>(*v)?;
        Ok(())
    }

    fn transform_string(&mut self, v: &mut Option<String>) -> Result<()> {
        let s = match *v {
            Some(ref s) => s,
            None => return self.write_tag(RecordType::Null)
        };

        if let Some(&index) = self.strings.get(s) {
            self.write_tag(RecordType::Index)?;
            return self.write_index(index);
        }

        let ty = SerialType::string();
        let index = self.begin_record(&ty, Some(&ty))?
            .ok_or_else(|| DataError::Protocol("strings take an object index".to_string()))?;
        self.strings.insert(s.clone(), index);
        self.write_raw_string(s)
    }

    fn transform_bytes(&mut self, v: &mut Option<Vec<u8>>) -> Result<()> {
        let bytes = match *v {
            Some(ref bytes) => bytes,
            None => return self.write_tag(RecordType::Null)
        };

        let ty = SerialType::array_of(crate::typesystem::ScalarKind::U8.serial_type());
        self.begin_record(&ty, Some(&ty))?;
        self.stream.write_i32::<LittleEndian>(bytes.len() as i32)?;
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn transform_signature(&mut self, presence: Presence, expected: Option<&SerialType>) -> Result<Signature> {
        match presence {
            Presence::Null => {
                self.write_tag(RecordType::Null)?;
                Ok(Signature::Null)
            }
            Presence::Shared(identity, ty) => {
                if let Some(&index) = self.objects.get(&identity) {
                    self.write_tag(RecordType::Index)?;
                    self.write_index(index)?;
                    return Ok(Signature::BackRef(None));
                }

                let index = self.begin_record(ty, expected)?;
                if let Some(index) = index {
                    self.objects.insert(identity, index);
                }
                Ok(Signature::Fresh { ty: ty.clone(), index: index })
            }
            Presence::Fresh(ty) | Presence::Value(ty) => {
                let index = self.begin_record(ty, expected)?;
                Ok(Signature::Fresh { ty: ty.clone(), index: index })
            }
        }
    }

    fn resolve_shared(&mut self, _index: usize, _object: SharedObject) -> Result<()> {
        Ok(())
    }

    fn create_instance(&mut self, ty: &SerialType) -> Result<Instance> {
        Err(protocol_error!("the writer cannot create an instance of {}", ty))
    }

    fn defer_contents(&mut self, host: HostRef) {
        self.deferred.push_back(host);
    }

    fn next_deferred(&mut self) -> Option<HostRef> {
        self.deferred.pop_front()
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.stream.flush() {
                warn!("failed to flush serialization stream: {}", e);
            }
        }
    }
}
