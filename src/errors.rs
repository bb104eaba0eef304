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

//! Error taxonomy of the data layer.
//!
//! Every failure is fatal to the current compilation attempt: operations either fully
//! succeed or return one of these, there is no partial application and no retry.

use std::io;

use thiserror::Error;

/// An error raised while materializing, writing or persisting data descriptors.
#[derive(Error, Debug)]
pub enum DataError {
    /// The declared type of a slot and the value stored in it disagree, a source object
    /// misses a field, or a reachability invariant does not hold.
    #[error("type consistency error: {0}")]
    TypeConsistency(String),

    /// The operation is not implemented by this kind of descriptor.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The persisted stream is of an unknown version or malformed.
    #[error("unsupported format: {0}")]
    Format(String),

    /// The writer and the reader disagree on the visitation protocol.
    #[error("serialization protocol violation: {0}")]
    Protocol(String),

    /// A write went past the end of its section.
    #[error("section overflow: {needed} bytes needed at offset {offset}, section size is {size}")]
    Overflow { offset: u32, needed: u32, size: u32 },

    /// The options string could not be parsed.
    #[error("invalid options: {0}")]
    Options(String),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

pub type Result<T> = ::std::result::Result<T, DataError>;

/// builds a `DataError::TypeConsistency` with a formatted message
#[macro_export]
macro_rules! type_error {
    ($($arg:tt)*) => {
        $crate::errors::DataError::TypeConsistency(format!($($arg)*))
    }
}

/// builds a `DataError::Protocol` with a formatted message
#[macro_export]
macro_rules! protocol_error {
    ($($arg:tt)*) => {
        $crate::errors::DataError::Protocol(format!($($arg)*))
    }
}
