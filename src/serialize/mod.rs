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

//! Binary object graph persistence.
//!
//! Entities describe their contents once, through `Persistent::apply_transformation`,
//! against a `TransformationContext`. The same visitation drives the `Writer`, which
//! encodes the values it is shown, and the `Reader`, which overwrites them with decoded
//! ones. Every slot is transformed in place.
//!
//! Stream layout:
//!
//! ```text
//! header     := string(VERSION)
//! record     := Null | Index i32 | type payload
//! type       := ClassNoDef                     (the type the slot expects)
//!             | TypeUse i32                    (a previously defined type)
//!             | TypeDefinition definition
//! definition := Array type | Class string i32 type*
//! string     := 7 bit varint length, UTF-8 bytes
//! ```
//!
//! Shared entities, owned entities, strings and arrays each take the next object index
//! when first written; later occurrences of a shared entity or an equal string are
//! written as `Index`. Boxed scalars and other value records take no index.
//!
//! The contents of host objects do not follow their record. They are queued and written
//! after the root, breadth first, by `transform_deferred_contents`.

mod instance;
mod transform;
mod writer;
mod reader;

pub use self::instance::*;
pub use self::transform::*;
pub use self::writer::Writer;
pub use self::reader::Reader;

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::data::DataManager;
use crate::debug::DebugInfo;
use crate::errors::{DataError, Result};
use crate::host::{HostId, HostRef};
use crate::options::DataOptions;
use crate::typesystem::{ScalarKind, TypeSystem};

/// Written first, a reader rejects any other version.
pub const VERSION: &'static str = "v1.0.0.0, 20081009";

/// Name of the type of the root record.
pub const ROOT_TYPE: &'static str = "DataManager";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordType {
    Null = 0,
    Index = 1,
    Class = 2,
    ClassNoDef = 3,
    Array = 4,
    TypeUse = 5,
    TypeDefinition = 6,
}

impl RecordType {
    pub fn from_u8(tag: u8) -> Option<RecordType> {
        match tag {
            0 => Some(RecordType::Null),
            1 => Some(RecordType::Index),
            2 => Some(RecordType::Class),
            3 => Some(RecordType::ClassNoDef),
            4 => Some(RecordType::Array),
            5 => Some(RecordType::TypeUse),
            6 => Some(RecordType::TypeDefinition),
            _ => None
        }
    }
}

/// The type of a record, as named in the stream.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum SerialType {
    Class { name: String, args: Vec<SerialType> },
    Array(Box<SerialType>),
}

impl SerialType {
    pub fn class(name: &str) -> SerialType {
        SerialType::Class { name: name.to_string(), args: vec![] }
    }

    pub fn generic(name: &str, args: Vec<SerialType>) -> SerialType {
        SerialType::Class { name: name.to_string(), args: args }
    }

    pub fn array_of(elem: SerialType) -> SerialType {
        SerialType::Array(Box::new(elem))
    }

    pub fn list_of(elem: SerialType) -> SerialType {
        SerialType::generic("List", vec![elem])
    }

    pub fn map_of(key: SerialType, val: SerialType) -> SerialType {
        SerialType::generic("Map", vec![key, val])
    }

    pub fn string() -> SerialType {
        SerialType::class("string")
    }

    pub fn name(&self) -> Option<&str> {
        match *self {
            SerialType::Class { ref name, .. } => Some(name),
            SerialType::Array(_) => None
        }
    }

    pub fn args(&self) -> &[SerialType] {
        match *self {
            SerialType::Class { ref args, .. } => args,
            SerialType::Array(_) => &[]
        }
    }

    /// the scalar kind of a scalar type
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match *self {
            SerialType::Class { ref name, ref args } if args.is_empty() => ScalarKind::from_serial_name(name),
            _ => None
        }
    }

    /// value records are stored inline and never take an object index
    pub fn is_value(&self) -> bool {
        match *self {
            SerialType::Class { ref name, .. } => {
                ScalarKind::from_serial_name(name).is_some()
                    || name == "Enum" || name == "TypeRef" || name == "DescriptorRef"
            }
            SerialType::Array(_) => false
        }
    }
}

impl fmt::Display for SerialType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SerialType::Array(ref elem) => write!(f, "{}[]", elem),
            SerialType::Class { ref name, ref args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i != 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for SerialType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Ids into the arenas of the crate, persisted as their raw index.
pub trait ArenaId: Copy {
    fn from_raw(raw: u32) -> Self;
    fn raw(self) -> u32;
}

/// What makes two slots refer to the same shared entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Host(HostId),
    DebugInfo(usize),
    TypeSystem(usize),
}

/// An entry of the object table.
#[derive(Clone)]
pub enum SharedObject {
    /// an index taken by an entity that cannot be referenced again (or not yet)
    Reserved,
    Str(String),
    Host(HostRef),
    DebugInfo(Arc<DebugInfo>),
    TypeSystem(Arc<TypeSystem>),
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SharedObject::Reserved => write!(f, "Reserved"),
            SharedObject::Str(ref s) => write!(f, "Str({:?})", s),
            SharedObject::Host(ref h) => write!(f, "Host({:?})", h),
            SharedObject::DebugInfo(ref d) => write!(f, "DebugInfo({:?})", d),
            SharedObject::TypeSystem(_) => write!(f, "TypeSystem"),
        }
    }
}

/// What the writer knows about the slot it is about to encode. Readers ignore it.
pub enum Presence<'a> {
    Null,
    /// an owned entity of the given runtime type
    Fresh(&'a SerialType),
    /// an entity that may be referenced from several slots
    Shared(Identity, &'a SerialType),
    /// a boxed value
    Value(&'a SerialType),
}

/// The outcome of transforming the head of a record.
#[derive(Debug)]
pub enum Signature {
    Null,
    /// the slot refers to an entity already in the object table. Readers get the
    /// entity, writers get `None`.
    BackRef(Option<SharedObject>),
    /// the payload of a record of type `ty` follows. `index` is the object index the
    /// record took, if any.
    Fresh { ty: SerialType, index: Option<usize> },
}

/// The visitor every persisted entity describes its contents to.
pub trait TransformationContext {
    /// true for the reader
    fn is_reading(&self) -> bool;

    fn transform_bool(&mut self, v: &mut bool) -> Result<()>;
    fn transform_u8(&mut self, v: &mut u8) -> Result<()>;
    fn transform_i8(&mut self, v: &mut i8) -> Result<()>;
    fn transform_u16(&mut self, v: &mut u16) -> Result<()>;
    fn transform_i16(&mut self, v: &mut i16) -> Result<()>;
    fn transform_u32(&mut self, v: &mut u32) -> Result<()>;
    fn transform_i32(&mut self, v: &mut i32) -> Result<()>;
    fn transform_u64(&mut self, v: &mut u64) -> Result<()>;
    fn transform_i64(&mut self, v: &mut i64) -> Result<()>;
    fn transform_f32(&mut self, v: &mut f32) -> Result<()>;
    fn transform_f64(&mut self, v: &mut f64) -> Result<()>;

    /// strings are shared by value
    fn transform_string(&mut self, v: &mut Option<String>) -> Result<()>;
    fn transform_bytes(&mut self, v: &mut Option<Vec<u8>>) -> Result<()>;

    /// transforms the head of a record: null, a back reference or a type followed by
    /// the payload the caller transforms next
    fn transform_signature(&mut self, presence: Presence, expected: Option<&SerialType>) -> Result<Signature>;

    /// fills the object table entry taken by a fresh record
    fn resolve_shared(&mut self, index: usize, object: SharedObject) -> Result<()>;

    /// creates an empty entity for a record of type `ty`
    fn create_instance(&mut self, ty: &SerialType) -> Result<Instance>;

    /// queues the contents of a host object whose record was just transformed
    fn defer_contents(&mut self, host: HostRef);

    /// the next queued host object, in queue order
    fn next_deferred(&mut self) -> Option<HostRef>;
}

/// An entity with a persisted form.
pub trait Persistent: Sized {
    /// the type slots holding this entity are declared with
    fn declared_type() -> SerialType;

    /// the type of this particular value, a refinement of the declared type
    fn runtime_type(&self) -> SerialType {
        Self::declared_type()
    }

    fn from_instance(instance: Instance) -> Result<Self>;

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()>;
}

/// writes the data manager and everything it references to `stream`
pub fn serialize<W: Write>(stream: W, manager: &DataManager) -> Result<()> {
    let mut writer = Writer::new(stream)?;

    let root = SerialType::class(ROOT_TYPE);
    writer.transform_signature(Presence::Fresh(&root), None)?;
    manager.transform_fields(&mut writer)?;
    transform_deferred_contents(&mut writer)?;

    info!("serialized {} objects", writer.objects_written());
    writer.finish()
}

/// reads back a data manager written by `serialize`
pub fn deserialize<R: Read>(stream: R, options: &DataOptions) -> Result<DataManager> {
    let mut reader = Reader::new(stream)?
        .with_progress(options.flag_serializer_progress_quantum, Box::new(|count| {
            debug!("deserialization progress: {} objects", count);
        }));

    let root = SerialType::class(ROOT_TYPE);
    match reader.transform_signature(Presence::Null, None)? {
        Signature::Fresh { ref ty, .. } if *ty == root => {}
        other => return Err(DataError::Format(format!("expected a {} root record, found {:?}", ROOT_TYPE, other)))
    }

    let manager = DataManager::read_fields(&mut reader, options)?;
    transform_deferred_contents(&mut reader)?;
    info!("deserialized {} objects", reader.objects_read());
    Ok(manager)
}
