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

//! # zdata
//!
//! Constant data materialization and persistence for an ahead-of-time image builder.
//!
//! * typesystem: the arena type model descriptors are laid out against
//! * host: host side object graphs that get converted
//! * data
//!   * DataManager
//!     * DataDescriptor (object, array, external)
//!   * BitFieldDefinition
//! * image: byte regions descriptors are written into
//! * serialize: binary object graph writer/reader for the compiler state
//! * debug: debug info and the source code tracker used by dumpers

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate zdata_utils;

/// declares a copyable id into one of the arenas, displayed as its prefix followed by
/// the index
macro_rules! arena_id {
    ($name: ident, $prefix: expr) => {
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u32);

        impl $name {
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl $crate::serialize::ArenaId for $name {
            fn from_raw(raw: u32) -> $name {
                $name(raw)
            }

            fn raw(self) -> u32 {
                self.0
            }
        }
    }
}

#[macro_use]
pub mod errors;
pub mod options;
pub mod typesystem;
pub mod host;
pub mod image;
pub mod data;
pub mod serialize;
pub mod debug;

pub use crate::errors::{DataError, Result};
