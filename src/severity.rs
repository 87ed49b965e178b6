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

//! Severity levels and the event-kind discriminator.

use std::fmt;
use std::str::FromStr;

/// The severity of a diagnostic record, ordered from lowest to highest.
///
/// The persisted form uses the upper-case level name, e.g. `WARNING`.
///
/// # Examples
///
/// ```
/// use faultlog::Severity;
///
/// assert!(Severity::Severe > Severity::Warning);
/// assert_eq!(Severity::Warning.name(), "WARNING");
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Finest,
    Finer,
    Fine,
    Config,
    Info,
    Warning,
    Severe,
}

impl Severity {
    /// The persisted name of this severity.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Finest => "FINEST",
            Severity::Finer => "FINER",
            Severity::Fine => "FINE",
            Severity::Config => "CONFIG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Severe => "SEVERE",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = crate::FaultLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FINEST" => Ok(Severity::Finest),
            "FINER" => Ok(Severity::Finer),
            "FINE" => Ok(Severity::Fine),
            "CONFIG" => Ok(Severity::Config),
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "SEVERE" => Ok(Severity::Severe),
            _ => Err(crate::FaultLogError::UnknownSeverity(s.to_string())),
        }
    }
}

/// Whether a record captures a raised fault or a notable application event.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Error,
    Event,
}

impl EventKind {
    /// The persisted value of this kind.
    pub fn value(&self) -> &'static str {
        match self {
            EventKind::Error => "Error",
            EventKind::Event => "Event",
        }
    }

    /// The default severity for records of this kind.
    pub fn default_severity(&self) -> Severity {
        match self {
            EventKind::Error => Severity::Warning,
            EventKind::Event => Severity::Info,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
