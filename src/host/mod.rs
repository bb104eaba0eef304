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

//! Host side object graphs.
//!
//! A host object is an instance living in the compiler process: a set of named fields,
//! an array or a string, tagged with the target type it is an instance of. Objects are
//! shared through `HostRef` handles and compared by identity, never by contents. Graphs
//! may be cyclic.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::data::DescriptorId;
use crate::errors::{DataError, Result};
use crate::serialize::*;
use crate::typesystem::{ScalarKind, ScalarValue, TypeId};

pub type HostId = u64;

lazy_static! {
    static ref NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);
}

fn new_host_id() -> HostId {
    NEXT_HOST_ID.fetch_add(1, Ordering::SeqCst)
}

/// A value stored in a host field or array slot.
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    Null,
    Scalar(ScalarValue),
    /// an enumeration, carried as its underlying scalar
    Enum(ScalarValue),
    Ref(HostRef),
    /// a runtime type object describing the given type
    Type(TypeId),
    /// an already materialized descriptor
    Descriptor(DescriptorId),
}

impl Default for HostValue {
    fn default() -> HostValue {
        HostValue::Null
    }
}

impl HostValue {
    pub fn u32(v: u32) -> HostValue {
        HostValue::Scalar(ScalarValue::U32(v))
    }

    pub fn i32(v: i32) -> HostValue {
        HostValue::Scalar(ScalarValue::I32(v))
    }

    pub fn is_null(&self) -> bool {
        match *self {
            HostValue::Null => true,
            _ => false
        }
    }

    pub fn as_ref(&self) -> Option<&HostRef> {
        match *self {
            HostValue::Ref(ref obj) => Some(obj),
            _ => None
        }
    }
}

/// Contents of a host array. Primitive arrays keep their natural representation.
#[derive(Clone, Debug, PartialEq)]
pub enum HostArray {
    Bytes(Vec<u8>),
    Chars(Vec<u16>),
    Ints(Vec<i32>),
    UInts(Vec<u32>),
    Scalars(Vec<ScalarValue>),
    Values(Vec<HostValue>),
}

impl HostArray {
    pub fn len(&self) -> usize {
        match *self {
            HostArray::Bytes(ref v) => v.len(),
            HostArray::Chars(ref v) => v.len(),
            HostArray::Ints(ref v) => v.len(),
            HostArray::UInts(ref v) => v.len(),
            HostArray::Scalars(ref v) => v.len(),
            HostArray::Values(ref v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<HostValue> {
        match *self {
            HostArray::Bytes(ref v) => v.get(index).map(|x| HostValue::Scalar(ScalarValue::U8(*x))),
            HostArray::Chars(ref v) => v.get(index).map(|x| HostValue::Scalar(ScalarValue::Char(*x))),
            HostArray::Ints(ref v) => v.get(index).map(|x| HostValue::Scalar(ScalarValue::I32(*x))),
            HostArray::UInts(ref v) => v.get(index).map(|x| HostValue::Scalar(ScalarValue::U32(*x))),
            HostArray::Scalars(ref v) => v.get(index).map(|x| HostValue::Scalar(*x)),
            HostArray::Values(ref v) => v.get(index).cloned(),
        }
    }

    /// true for the representations the image writer can copy without looking at
    /// individual elements
    pub fn is_primitive(&self) -> bool {
        match *self {
            HostArray::Bytes(_) | HostArray::Chars(_) | HostArray::Ints(_) | HostArray::UInts(_) => true,
            _ => false
        }
    }

    fn tag(&self) -> u8 {
        match *self {
            HostArray::Bytes(_) => 0,
            HostArray::Chars(_) => 1,
            HostArray::Ints(_) => 2,
            HostArray::UInts(_) => 3,
            HostArray::Scalars(_) => 4,
            HostArray::Values(_) => 5,
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        let mut tag = self.tag();
        context.transform_u8(&mut tag)?;

        if context.is_reading() {
            *self = match tag {
                0 => HostArray::Bytes(vec![]),
                1 => HostArray::Chars(vec![]),
                2 => HostArray::Ints(vec![]),
                3 => HostArray::UInts(vec![]),
                4 => HostArray::Scalars(vec![]),
                5 => HostArray::Values(vec![]),
                _ => return Err(DataError::Format(format!("unknown host array tag {}", tag)))
            };
        }

        match self {
            HostArray::Bytes(v) => transform_byte_array(context, v),
            HostArray::Chars(v) => transform_required_chars(context, v),
            HostArray::Ints(v) => transform_required_i32_array(context, v),
            HostArray::UInts(v) => transform_required_u32_array(context, v),
            HostArray::Scalars(v) => {
                let mut count = v.len() as i32;
                context.transform_i32(&mut count)?;
                transform_items(context, v, count, "scalar array", || ScalarValue::U8(0), |context, item| {
                    let mut kind = item.kind().to_u8();
                    context.transform_u8(&mut kind)?;
                    let kind = ScalarKind::from_u8(kind)
                        .ok_or_else(|| DataError::Format(format!("unknown scalar kind {}", kind)))?;
                    if item.kind() != kind {
                        *item = ScalarValue::zero(kind);
                    }
                    item.transform_payload(context)
                })
            }
            HostArray::Values(v) => {
                let mut count = v.len() as i32;
                context.transform_i32(&mut count)?;
                transform_items(context, v, count, "value array", HostValue::default, |context, item| transform_host_value(context, item))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostData {
    /// named instance fields, in declaration order
    Fields(Vec<(String, HostValue)>),
    Array(HostArray),
    Str(String),
}

impl HostData {
    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        let mut tag = match *self {
            HostData::Fields(_) => 0u8,
            HostData::Array(_) => 1,
            HostData::Str(_) => 2,
        };
        context.transform_u8(&mut tag)?;

        if context.is_reading() {
            *self = match tag {
                0 => HostData::Fields(vec![]),
                1 => HostData::Array(HostArray::Bytes(vec![])),
                2 => HostData::Str(String::new()),
                _ => return Err(DataError::Format(format!("unknown host data tag {}", tag)))
            };
        }

        match self {
            HostData::Fields(fields) => {
                let mut count = fields.len() as i32;
                context.transform_i32(&mut count)?;
                transform_items(context, fields, count, "field list", Default::default, |context, field| {
                    transform_required_string(context, &mut field.0)?;
                    transform_host_value(context, &mut field.1)
                })
            }
            HostData::Array(array) => array.apply_transformation(context),
            HostData::Str(s) => transform_required_string(context, s),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HostState {
    pub ty: TypeId,
    pub data: HostData,
}

pub struct HostObject {
    id: HostId,
    state: RwLock<HostState>,
}

impl HostObject {
    pub fn new(ty: TypeId, data: HostData) -> HostObject {
        HostObject {
            id: new_host_id(),
            state: RwLock::new(HostState { ty: ty, data: data }),
        }
    }
}

impl Default for HostObject {
    fn default() -> HostObject {
        HostObject::new(TypeId::default(), HostData::Fields(vec![]))
    }
}

impl Persistent for HostObject {
    fn declared_type() -> SerialType {
        SerialType::class("HostObject")
    }

    fn from_instance(instance: Instance) -> Result<HostObject> {
        match instance {
            Instance::Host(obj) => Ok(obj),
            other => Err(type_error!("expected a host object, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        self.transform_state(context)
    }
}

impl HostObject {
    /// visits a snapshot of the state, no lock is held while nested objects are visited
    fn transform_state(&self, context: &mut dyn TransformationContext) -> Result<()> {
        let mut state = self.state.read().unwrap().clone();
        transform_id(context, &mut state.ty)?;
        state.data.apply_transformation(context)?;
        *self.state.write().unwrap() = state;
        Ok(())
    }
}

/// Shared handle to a host object. Equality and hashing follow object identity.
#[derive(Clone)]
pub struct HostRef(Arc<HostObject>);

impl HostRef {
    pub fn new(ty: TypeId, data: HostData) -> HostRef {
        HostRef(Arc::new(HostObject::new(ty, data)))
    }

    pub fn from_object(obj: HostObject) -> HostRef {
        HostRef(Arc::new(obj))
    }

    pub fn new_string(ty: TypeId, s: &str) -> HostRef {
        HostRef::new(ty, HostData::Str(s.to_string()))
    }

    pub fn new_array(ty: TypeId, array: HostArray) -> HostRef {
        HostRef::new(ty, HostData::Array(array))
    }

    pub fn new_object(ty: TypeId, fields: Vec<(&str, HostValue)>) -> HostRef {
        HostRef::new(ty, HostData::Fields(fields.into_iter().map(|(n, v)| (n.to_string(), v)).collect()))
    }

    pub fn id(&self) -> HostId {
        self.0.id
    }

    pub fn type_id(&self) -> TypeId {
        self.0.state.read().unwrap().ty
    }

    /// a snapshot of the state
    pub fn state(&self) -> HostState {
        self.0.state.read().unwrap().clone()
    }

    pub fn set_state(&self, state: HostState) {
        *self.0.state.write().unwrap() = state;
    }

    /// visits the contents of a shared object in place. Readers resolve the handle
    /// before calling this so that cycles back to the object find it.
    pub fn transform_contents(&self, context: &mut dyn TransformationContext) -> Result<()> {
        self.0.transform_state(context)
    }

    /// the value of the named field, `None` if the object has no such field
    pub fn field(&self, name: &str) -> Option<HostValue> {
        match self.0.state.read().unwrap().data {
            HostData::Fields(ref fields) => fields.iter().find(|f| f.0 == name).map(|f| f.1.clone()),
            _ => None
        }
    }

    /// sets a field, adding it if the object does not have it yet
    pub fn set_field(&self, name: &str, value: HostValue) {
        let mut state = self.0.state.write().unwrap();
        if let HostData::Fields(ref mut fields) = state.data {
            match fields.iter_mut().find(|f| f.0 == name) {
                Some(f) => f.1 = value,
                None => fields.push((name.to_string(), value))
            }
        } else {
            panic!("{:?} has no fields", self)
        }
    }

    pub fn is_array(&self) -> bool {
        match self.0.state.read().unwrap().data {
            HostData::Array(_) => true,
            _ => false
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self.0.state.read().unwrap().data {
            HostData::Array(ref array) => Some(array.len()),
            _ => None
        }
    }

    pub fn array_get(&self, index: usize) -> Option<HostValue> {
        match self.0.state.read().unwrap().data {
            HostData::Array(ref array) => array.get(index),
            _ => None
        }
    }

    pub fn array_set(&self, index: usize, value: HostValue) {
        let mut state = self.0.state.write().unwrap();
        match state.data {
            HostData::Array(HostArray::Values(ref mut values)) => values[index] = value,
            _ => panic!("{:?} is not an array of values", self)
        }
    }

    /// a copy of the array contents
    pub fn array(&self) -> Option<HostArray> {
        match self.0.state.read().unwrap().data {
            HostData::Array(ref array) => Some(array.clone()),
            _ => None
        }
    }

    pub fn string(&self) -> Option<String> {
        match self.0.state.read().unwrap().data {
            HostData::Str(ref s) => Some(s.clone()),
            _ => None
        }
    }
}

impl PartialEq for HostRef {
    fn eq(&self, other: &HostRef) -> bool {
        self.id() == other.id()
    }
}

impl Eq for HostRef {}

impl Hash for HostRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

// graphs can be cyclic, never print the contents
impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.id())
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.state.read().unwrap().data {
            HostData::Str(ref s) => write!(f, "{:?}", s),
            HostData::Array(ref array) => write!(f, "#{}[{}]", self.id(), array.len()),
            HostData::Fields(_) => write!(f, "#{}", self.id()),
        }
    }
}
