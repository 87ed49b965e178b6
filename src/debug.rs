// Copyright 2024 FastLabs Developers
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

//! Best-effort side-channel output for failures within the logger itself.

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

/// Verbosity of the [`DebugSink`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DebugLevel {
    /// Internal errors are discarded.
    Silent,
    /// A single-line message per internal error.
    Message,
    /// The message plus the full error chain.
    Trace,
}

impl DebugLevel {
    /// Map a configured numeric level; anything above 2 clamps to `Trace`.
    pub fn from_config(level: u8) -> DebugLevel {
        match level {
            0 => DebugLevel::Silent,
            1 => DebugLevel::Message,
            _ => DebugLevel::Trace,
        }
    }
}

#[derive(Clone, Debug)]
enum Output {
    Stderr,
    Captured(Arc<Mutex<Vec<u8>>>),
}

/// Reports failures internal to the logger. Never raises; any failure while
/// formatting or writing is swallowed.
#[derive(Clone, Debug)]
pub struct DebugSink {
    level: DebugLevel,
    output: Output,
}

impl Default for DebugSink {
    fn default() -> Self {
        DebugSink::new(DebugLevel::Trace)
    }
}

impl DebugSink {
    /// Create a sink writing to stderr.
    pub fn new(level: DebugLevel) -> DebugSink {
        DebugSink {
            level,
            output: Output::Stderr,
        }
    }

    /// Create a sink writing into a shared buffer, for tests.
    pub fn captured(level: DebugLevel) -> (DebugSink, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(vec![]));
        let sink = DebugSink {
            level,
            output: Output::Captured(buffer.clone()),
        };
        (sink, buffer)
    }

    /// The current verbosity.
    pub fn level(&self) -> DebugLevel {
        self.level
    }

    /// Change the verbosity, typically after a settings invalidation.
    pub fn set_level(&mut self, level: DebugLevel) {
        self.level = level;
    }

    /// Report an internal failure according to the verbosity level.
    pub fn report(&self, error: &anyhow::Error) {
        if self.level < DebugLevel::Message {
            return;
        }
        let mut lines = format!("faultlog error: {error}\n");
        if self.level >= DebugLevel::Trace {
            for cause in error.chain().skip(1) {
                lines.push_str(&format!("  caused by: {cause}\n"));
            }
        }
        match &self.output {
            Output::Stderr => {
                let _ = std::io::stderr().write_all(lines.as_bytes());
            }
            Output::Captured(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.extend_from_slice(lines.as_bytes());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chained_error() -> anyhow::Error {
        anyhow::Error::from(std::io::Error::other("disk full")).context("saving record")
    }

    fn captured_text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn test_silent_discards() {
        let (sink, buffer) = DebugSink::captured(DebugLevel::Silent);
        sink.report(&chained_error());
        assert!(captured_text(&buffer).is_empty());
    }

    #[test]
    fn test_message_is_single_line() {
        let (sink, buffer) = DebugSink::captured(DebugLevel::Message);
        sink.report(&chained_error());
        let text = captured_text(&buffer);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("saving record"));
        assert!(!text.contains("disk full"));
    }

    #[test]
    fn test_trace_includes_cause_chain() {
        let (sink, buffer) = DebugSink::captured(DebugLevel::Trace);
        sink.report(&chained_error());
        let text = captured_text(&buffer);
        assert!(text.contains("saving record"));
        assert!(text.contains("caused by: disk full"));
    }

    #[test]
    fn test_level_mapping_clamps() {
        assert_eq!(DebugLevel::from_config(0), DebugLevel::Silent);
        assert_eq!(DebugLevel::from_config(1), DebugLevel::Message);
        assert_eq!(DebugLevel::from_config(2), DebugLevel::Trace);
        assert_eq!(DebugLevel::from_config(9), DebugLevel::Trace);
    }
}
