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

use std::fmt;

use zdata_utils::ByteSize;

use crate::errors::Result;
use crate::serialize::{SerialType, TransformationContext};

/// The primitive representations a scalar slot of the target can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// native sized integer, 32 bits on the target
    IntPtr,
    UIntPtr,
}

pub const ALL_SCALAR_KINDS: [ScalarKind; 14] = [
    ScalarKind::Bool, ScalarKind::Char,
    ScalarKind::I8, ScalarKind::U8, ScalarKind::I16, ScalarKind::U16,
    ScalarKind::I32, ScalarKind::U32, ScalarKind::I64, ScalarKind::U64,
    ScalarKind::F32, ScalarKind::F64,
    ScalarKind::IntPtr, ScalarKind::UIntPtr,
];

impl ScalarKind {
    pub fn size(self) -> ByteSize {
        use self::ScalarKind::*;
        match self {
            Bool | I8 | U8 => 1,
            Char | I16 | U16 => 2,
            I32 | U32 | F32 | IntPtr | UIntPtr => 4,
            I64 | U64 | F64 => 8,
        }
    }

    /// name used in type definition records
    pub fn serial_name(self) -> &'static str {
        use self::ScalarKind::*;
        match self {
            Bool => "bool",
            Char => "char",
            I8 => "i8",
            U8 => "u8",
            I16 => "i16",
            U16 => "u16",
            I32 => "i32",
            U32 => "u32",
            I64 => "i64",
            U64 => "u64",
            F32 => "f32",
            F64 => "f64",
            IntPtr => "isize",
            UIntPtr => "usize",
        }
    }

    pub fn from_serial_name(name: &str) -> Option<ScalarKind> {
        ALL_SCALAR_KINDS.iter().cloned().find(|k| k.serial_name() == name)
    }

    pub fn serial_type(self) -> SerialType {
        SerialType::class(self.serial_name())
    }

    /// declared width tag used when a kind is persisted as a typed field
    pub fn to_u8(self) -> u8 {
        ALL_SCALAR_KINDS.iter().position(|k| *k == self).unwrap_or(0) as u8
    }

    pub fn from_u8(tag: u8) -> Option<ScalarKind> {
        ALL_SCALAR_KINDS.get(tag as usize).cloned()
    }
}

/// A scalar value, stored by value wherever it appears.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Char(u16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    IntPtr(i32),
    UIntPtr(u32),
}

impl ScalarValue {
    pub fn kind(&self) -> ScalarKind {
        match *self {
            ScalarValue::Bool(_) => ScalarKind::Bool,
            ScalarValue::Char(_) => ScalarKind::Char,
            ScalarValue::I8(_) => ScalarKind::I8,
            ScalarValue::U8(_) => ScalarKind::U8,
            ScalarValue::I16(_) => ScalarKind::I16,
            ScalarValue::U16(_) => ScalarKind::U16,
            ScalarValue::I32(_) => ScalarKind::I32,
            ScalarValue::U32(_) => ScalarKind::U32,
            ScalarValue::I64(_) => ScalarKind::I64,
            ScalarValue::U64(_) => ScalarKind::U64,
            ScalarValue::F32(_) => ScalarKind::F32,
            ScalarValue::F64(_) => ScalarKind::F64,
            ScalarValue::IntPtr(_) => ScalarKind::IntPtr,
            ScalarValue::UIntPtr(_) => ScalarKind::UIntPtr,
        }
    }

    pub fn zero(kind: ScalarKind) -> ScalarValue {
        match kind {
            ScalarKind::Bool => ScalarValue::Bool(false),
            ScalarKind::Char => ScalarValue::Char(0),
            ScalarKind::I8 => ScalarValue::I8(0),
            ScalarKind::U8 => ScalarValue::U8(0),
            ScalarKind::I16 => ScalarValue::I16(0),
            ScalarKind::U16 => ScalarValue::U16(0),
            ScalarKind::I32 => ScalarValue::I32(0),
            ScalarKind::U32 => ScalarValue::U32(0),
            ScalarKind::I64 => ScalarValue::I64(0),
            ScalarKind::U64 => ScalarValue::U64(0),
            ScalarKind::F32 => ScalarValue::F32(0.0),
            ScalarKind::F64 => ScalarValue::F64(0.0),
            ScalarKind::IntPtr => ScalarValue::IntPtr(0),
            ScalarKind::UIntPtr => ScalarValue::UIntPtr(0),
        }
    }

    /// visits the payload of the value at its declared width
    pub fn transform_payload(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        match self {
            ScalarValue::Bool(v) => context.transform_bool(v),
            ScalarValue::Char(v) => context.transform_u16(v),
            ScalarValue::I8(v) => context.transform_i8(v),
            ScalarValue::U8(v) => context.transform_u8(v),
            ScalarValue::I16(v) => context.transform_i16(v),
            ScalarValue::U16(v) => context.transform_u16(v),
            ScalarValue::I32(v) => context.transform_i32(v),
            ScalarValue::U32(v) => context.transform_u32(v),
            ScalarValue::I64(v) => context.transform_i64(v),
            ScalarValue::U64(v) => context.transform_u64(v),
            ScalarValue::F32(v) => context.transform_f32(v),
            ScalarValue::F64(v) => context.transform_f64(v),
            ScalarValue::IntPtr(v) => context.transform_i32(v),
            ScalarValue::UIntPtr(v) => context.transform_u32(v),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Char(v) => match ::std::char::from_u32(v as u32) {
                Some(c) => write!(f, "'{}'", c),
                None => write!(f, "'\\u{{{:x}}}'", v)
            },
            ScalarValue::I8(v) => write!(f, "{}", v),
            ScalarValue::U8(v) => write!(f, "{}", v),
            ScalarValue::I16(v) => write!(f, "{}", v),
            ScalarValue::U16(v) => write!(f, "{}", v),
            ScalarValue::I32(v) => write!(f, "{}", v),
            ScalarValue::U32(v) => write!(f, "{}", v),
            ScalarValue::I64(v) => write!(f, "{}", v),
            ScalarValue::U64(v) => write!(f, "{}", v),
            ScalarValue::F32(v) => write!(f, "{}", v),
            ScalarValue::F64(v) => write!(f, "{}", v),
            ScalarValue::IntPtr(v) => write!(f, "0x{:x}", v),
            ScalarValue::UIntPtr(v) => write!(f, "0x{:x}", v),
        }
    }
}
