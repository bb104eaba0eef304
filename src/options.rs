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

use docopt::Docopt;
use serde::Deserialize;

use std::default::Default;

use crate::errors::{DataError, Result};
use crate::typesystem::Phase;

const USAGE: &'static str = "
zdata (constant data materialization for the image builder). Pass arguments as a string to init it.

Usage:
  zdata [options]

Logging:
  --log-level=<level>                      logging level: none, error, warn, info, debug, trace, env [default: env]

Data:
  --emit-verbose-descriptors               describe descriptors with their values when tracing
  --phase=<phase>                          phase the data manager starts in [default: none]

Persistence:
  --serializer-progress-quantum=<n>        objects read between two progress notifications [default: 4096]
";

#[derive(Debug, Deserialize)]
pub struct DataOptions {
    // Logging
    pub flag_log_level: LogLevel,

    // Data
    pub flag_emit_verbose_descriptors: bool,
    pub flag_phase: String,

    // Persistence
    pub flag_serializer_progress_quantum: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum LogLevel {
    None, Error, Warn, Info, Debug, Trace, Env
}

impl LogLevel {
    pub fn from_string(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "none" => Some(LogLevel::None),
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            "env" => Some(LogLevel::Env),
            _ => None
        }
    }
}

impl DataOptions {
    /// parses a whitespace separated option string
    pub fn parse(str: &str) -> Result<DataOptions> {
        let argv = ::std::iter::once("zdata").chain(str.split_whitespace());

        let ret: DataOptions = Docopt::new(USAGE)
            .and_then(|d| d.argv(argv).deserialize())
            .map_err(|e| DataError::Options(e.to_string()))?;

        if ret.flag_phase != "none" && Phase::from_name(&ret.flag_phase).is_none() {
            return Err(DataError::Options(format!("unknown phase {}", ret.flag_phase)));
        }

        Ok(ret)
    }

    pub fn init(str: &str) -> DataOptions {
        info!("init data options with: {:?}", str);

        let ret = match DataOptions::parse(str) {
            Ok(options) => options,
            Err(e) => panic!("{}", e)
        };

        info!("parsed as {:?}", ret);

        ret
    }

    /// the phase named by `--phase`, `None` before the first phase
    pub fn initial_phase(&self) -> Option<Phase> {
        Phase::from_name(&self.flag_phase)
    }
}

impl Default for DataOptions {
    fn default() -> DataOptions {
        DataOptions::init("")
    }
}

pub fn start_logging(level: LogLevel) {
    use std::env;
    match level {
        LogLevel::None  => {},
        LogLevel::Error => start_logging_internal(log::Level::Error),
        LogLevel::Warn  => start_logging_internal(log::Level::Warn),
        LogLevel::Info  => start_logging_internal(log::Level::Info),
        LogLevel::Debug => start_logging_internal(log::Level::Debug),
        LogLevel::Trace => start_logging_internal(log::Level::Trace),
        LogLevel::Env => {
            match env::var("ZDATA_LOG_LEVEL").ok().and_then(|s| LogLevel::from_string(&s)) {
                // an env level naming env again would loop
                Some(LogLevel::Env) | None => {} // Don't log
                Some(level) => start_logging(level)
            }
        },
    }
}

pub fn start_logging_trace() {
    start_logging_internal(log::Level::Trace)
}

fn start_logging_internal(level: log::Level) {
    let verbose = match level {
        log::Level::Error => 0,
        log::Level::Warn  => 1,
        log::Level::Info  => 2,
        log::Level::Debug => 3,
        log::Level::Trace => 4,
    };

    match stderrlog::new().verbosity(verbose).init() {
        Ok(()) => info!("logger initialized"),
        Err(e) => error!("failed to init logger, probably already initialized: {:?}", e)
    }
}
