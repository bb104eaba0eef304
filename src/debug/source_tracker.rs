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

use std::fs;

use zdata_utils::LinkedHashMap;

use crate::debug::{DebugInfo, SourceCode};
use crate::errors::Result;
use crate::serialize::*;

/// Prints the source lines debug info points to, without repeating lines it already
/// printed for the same file.
#[derive(Debug, Default)]
pub struct SourceCodeTracker {
    files: LinkedHashMap<String, SourceCode>,
    /// lines before the first span to print, spent once
    pub extra_lines_to_output: u32,
    last_file: Option<String>,
    last_line: u32,
}

impl SourceCodeTracker {
    pub fn new() -> SourceCodeTracker {
        SourceCodeTracker::default()
    }

    /// the cached lines of `file`, read from disk on first request
    pub fn get_source_code(&mut self, file: &str) -> Option<&SourceCode> {
        if !self.files.contains_key(file) {
            match fs::read_to_string(file) {
                Ok(text) => {
                    trace!("caching {} for source listings", file);
                    self.files.insert(file.to_string(), SourceCode::new(file, &text));
                }
                Err(e) => {
                    warn!("cannot read source file {}: {}", file, e);
                    return None;
                }
            }
        }
        self.files.get(file)
    }

    /// makes sources available without reading them from disk
    pub fn add_source_code(&mut self, source: SourceCode) {
        self.files.insert(source.file_name.clone(), source);
    }

    /// forgets what was printed, the next span is printed in full
    pub fn reset_context(&mut self) {
        self.last_file = None;
        self.last_line = 0;
    }

    pub fn print(&mut self, info: &DebugInfo, emit: &mut dyn FnMut(String)) {
        let file = info.src_file_name.clone();
        let source = match self.get_source_code(&file) {
            Some(source) => source.clone(),
            None => return
        };

        if self.last_file.as_ref() != Some(&file) {
            emit(format!("{}:", file));
            self.last_file = Some(file);
            self.last_line = 0;
        }

        let first = info.begin_line.saturating_sub(self.extra_lines_to_output);
        self.extra_lines_to_output = 0;

        let first = ::std::cmp::max(::std::cmp::max(first, 1), self.last_line.saturating_add(1));
        let last = ::std::cmp::min(info.end_line, source.lines.len() as u32);
        for line in first..=last {
            if let Some(text) = source.line(line) {
                emit(format!("{:>5}: {}", line, text));
            }
        }

        self.last_line = ::std::cmp::max(self.last_line, info.end_line);
    }

    /// visits the cached files
    pub fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_map(context, &mut self.files, &SerialType::map_of(SerialType::string(), SourceCode::declared_type()),
            |context, name| transform_required_string(context, name),
            |context, source| transform_owned_in_place(context, source))?;
        context.transform_u32(&mut self.extra_lines_to_output)
    }
}
