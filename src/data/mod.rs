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

//! Data descriptors and the manager that owns them.
//!
//! A descriptor is one value destined for the image: an object, an array or a blob of
//! external data. Descriptors live in the arena of a `DataManager` and refer to each
//! other by `DescriptorId`. Converting the same host object twice yields the same
//! descriptor; value types are the exception, they are embedded in their container
//! (the nesting descriptor) and written as part of it.

mod bitfield;
mod descriptor;
mod object;
mod array;
mod external;
mod manager;

pub use self::bitfield::*;
pub use self::descriptor::*;
pub use self::object::*;
pub use self::array::*;
pub use self::external::*;
pub use self::manager::*;

use std::fmt;

use crate::typesystem::{FieldId, ScalarValue};

arena_id!(DescriptorId, "D");

bitflags! {
    /// Attributes of a descriptor. No flag set means a constant that is not used for
    /// constant propagation.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Attributes: u8 {
        const MUTABLE = 1;
        const SUITABLE_FOR_CONSTANT_PROPAGATION = 2;
    }
}

impl Attributes {
    pub const CONSTANT: Attributes = Attributes::empty();

    pub fn is_mutable(self) -> bool {
        self.contains(Attributes::MUTABLE)
    }

    pub fn is_suitable_for_constant_propagation(self) -> bool {
        self.contains(Attributes::SUITABLE_FOR_CONSTANT_PROPAGATION)
    }
}

/// A value held by a descriptor field or array element.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Null,
    Scalar(ScalarValue),
    Enum(ScalarValue),
    /// the full contents of a string, stored in its first character field
    Chars(Vec<u16>),
    Descriptor(DescriptorId),
}

impl Default for DataValue {
    fn default() -> DataValue {
        DataValue::Null
    }
}

impl DataValue {
    pub fn u32(v: u32) -> DataValue {
        DataValue::Scalar(ScalarValue::U32(v))
    }

    pub fn is_null(&self) -> bool {
        *self == DataValue::Null
    }

    pub fn as_descriptor(&self) -> Option<DescriptorId> {
        match *self {
            DataValue::Descriptor(id) => Some(id),
            _ => None
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DataValue::Null => write!(f, "null"),
            DataValue::Scalar(ref s) => write!(f, "{}", s),
            DataValue::Enum(ref s) => write!(f, "enum {}", s),
            DataValue::Chars(ref chars) => write!(f, "{:?}", String::from_utf16_lossy(chars)),
            DataValue::Descriptor(id) => write!(f, "{}", id),
        }
    }
}

/// Where a nested value type descriptor sits in its container.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Nesting {
    pub descriptor: DescriptorId,
    /// the field of the container holding the value, `None` for array elements
    pub field: Option<FieldId>,
    /// the array index holding the value, -1 for fields
    pub index: i32,
}

impl Nesting {
    pub fn in_field(descriptor: DescriptorId, field: FieldId) -> Nesting {
        Nesting { descriptor: descriptor, field: Some(field), index: -1 }
    }

    pub fn in_element(descriptor: DescriptorId, index: usize) -> Nesting {
        Nesting { descriptor: descriptor, field: None, index: index as i32 }
    }
}
