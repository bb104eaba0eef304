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

//! # Utility crate that serves zdata
//!
//! It includes:
//!
//! * data structures
//!   * linked hashmap/set (insertion ordered)
//! * utility functions for
//!   * mathematics
//!   * bit operations

extern crate linked_hash_map;

// these type aliases make source code easier to read

/// size in bits
pub type BitSize    = u32;
/// size in bytes
pub type ByteSize   = u32;

/// The image targets 32 bits embedded devices.
pub const LOG_POINTER_SIZE : u32 = 2;

/// pointer size in byte
pub const POINTER_SIZE     : ByteSize = 1 << LOG_POINTER_SIZE;
/// word size in byte
pub const WORD_SIZE        : ByteSize = 1 << LOG_POINTER_SIZE;

/// linked hashset implementation based on LinkedHashMap
mod linked_hashset;

// re-export these data structures

pub use linked_hash_map::LinkedHashMap;
pub use linked_hashset::LinkedHashSet;

/// mathematics utilities
pub mod math;
/// bit operations
pub mod bit_utils;

/// print trace!() log if condition is true (the condition should be a constant boolean)
#[macro_export]
macro_rules! trace_if {
    ($cond: expr, $($arg:tt)*) => {
        if $cond {
            trace!($($arg)*)
        }
    }
}
