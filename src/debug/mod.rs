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

//! Debug information attached to methods, and the source code tracker dumpers use to
//! print the lines a piece of code came from.

mod source_tracker;

pub use self::source_tracker::*;

use std::fmt;

use crate::errors::Result;
use crate::serialize::*;

/// A source span.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugInfo {
    pub src_file_name: String,
    pub method_name: Option<String>,
    pub begin_line: u32,
    pub begin_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl DebugInfo {
    pub fn new(src_file_name: &str, begin_line: u32, begin_column: u32, end_line: u32, end_column: u32) -> DebugInfo {
        DebugInfo {
            src_file_name: src_file_name.to_string(),
            method_name: None,
            begin_line: begin_line,
            begin_column: begin_column,
            end_line: end_line,
            end_column: end_column,
        }
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({},{})-({},{})", self.src_file_name, self.begin_line, self.begin_column, self.end_line, self.end_column)
    }
}

impl Persistent for DebugInfo {
    fn declared_type() -> SerialType {
        SerialType::class("DebugInfo")
    }

    fn from_instance(instance: Instance) -> Result<DebugInfo> {
        match instance {
            Instance::DebugInfo(info) => Ok(info),
            other => Err(type_error!("expected debug info, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_required_string(context, &mut self.src_file_name)?;
        context.transform_string(&mut self.method_name)?;
        context.transform_u32(&mut self.begin_line)?;
        context.transform_u32(&mut self.begin_column)?;
        context.transform_u32(&mut self.end_line)?;
        context.transform_u32(&mut self.end_column)
    }
}

/// The lines of one source file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceCode {
    pub file_name: String,
    pub lines: Vec<String>,
}

impl SourceCode {
    pub fn new(file_name: &str, text: &str) -> SourceCode {
        SourceCode {
            file_name: file_name.to_string(),
            lines: text.lines().map(|l| l.to_string()).collect(),
        }
    }

    /// `line` is 1 based
    pub fn line(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.lines.get(line as usize - 1).map(|l| l.as_str())
    }
}

impl Persistent for SourceCode {
    fn declared_type() -> SerialType {
        SerialType::class("SourceCode")
    }

    fn from_instance(instance: Instance) -> Result<SourceCode> {
        match instance {
            Instance::SourceCode(sc) => Ok(sc),
            other => Err(type_error!("expected source code, got {}", other.serial_name()))
        }
    }

    fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
        transform_required_string(context, &mut self.file_name)?;

        let mut lines = Some(::std::mem::replace(&mut self.lines, vec![]));
        transform_string_list(context, &mut lines)?;
        self.lines = lines.unwrap_or_default();
        Ok(())
    }
}
