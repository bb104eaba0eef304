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
use std::sync::Arc;

use crate::errors::{DataError, Result};
use crate::image::SequentialRegion;

/// Writes data the compiler did not produce itself, such as pre-built binary blobs.
pub trait ExternalDataContext: Send + Sync + fmt::Debug {
    fn write(&self, region: &mut dyn SequentialRegion) -> Result<()>;
}

/// A descriptor without a type. It is neither reduced nor refreshed, writing is left
/// to its context.
#[derive(Clone, Debug, Default)]
pub struct ExternalDataDescriptor {
    /// not persisted, a restored descriptor has none
    pub context: Option<Arc<dyn ExternalDataContext>>,
}

impl ExternalDataDescriptor {
    pub fn new(context: Option<Arc<dyn ExternalDataContext>>) -> ExternalDataDescriptor {
        ExternalDataDescriptor {
            context: context,
        }
    }

    pub fn write(&self, region: &mut dyn SequentialRegion) -> Result<()> {
        match self.context {
            Some(ref context) => context.write(region),
            None => Err(DataError::Unsupported("external data has no context to write it".to_string()))
        }
    }
}

/// Bytes copied verbatim into the image.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBlob {
    pub bytes: Vec<u8>,
}

impl RawBlob {
    pub fn new(bytes: Vec<u8>) -> RawBlob {
        RawBlob {
            bytes: bytes,
        }
    }
}

impl ExternalDataContext for RawBlob {
    fn write(&self, region: &mut dyn SequentialRegion) -> Result<()> {
        let mut section = region.section_of_fixed_size(self.bytes.len() as u32)?;
        section.write_bytes(&self.bytes)
    }
}
