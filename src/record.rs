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

//! The diagnostic record: the unit of persistence.

use jiff::Zoned;

use crate::fault::Origin;
use crate::severity::EventKind;
use crate::severity::Severity;

/// The fixed form discriminator written on every persisted record.
pub const FORM_TAG: &str = "LogEvent";

/// Message text beyond this many characters moves to the overflow block.
pub const MESSAGE_LIMIT: usize = 32_000;

/// Characters of the original message kept in the display field when the
/// overflow block is used.
pub const MESSAGE_PREFIX_LEN: usize = 100;

/// The resolved location and identifiers of a linked business record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkedTarget {
    /// Server of the record's parent store.
    pub server: String,
    /// Path of the record's parent store.
    pub store_path: String,
    /// Stable cross-store identifier of the record.
    pub unique_id: String,
    /// Numeric id of the record within its store.
    pub note_id: u32,
}

/// A cross-reference to an associated business record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkedRef {
    /// The reference resolved to its parent store.
    Resolved(LinkedTarget),
    /// Resolution failed; the record still persists with a placeholder.
    Unavailable,
}

/// A complete diagnostic record, built fresh per logging call and discarded
/// after its persistence attempt.
#[derive(Clone, Debug)]
pub struct DiagnosticRecord {
    /// Whether this record captures an error or an event.
    pub event_kind: EventKind,
    /// The record severity.
    pub severity: Severity,
    /// The classified fault's own message, kept apart from the resolved
    /// message so the two stay distinguishable downstream. Empty for pure
    /// events.
    pub fault_message: String,
    /// The display copy of the resolved message, truncated when oversized.
    pub message: String,
    /// The full message text, present only when it exceeded [`MESSAGE_LIMIT`].
    pub overflow: Option<String>,
    /// The rendered stack trace, empty when suppressed.
    pub stack_lines: Vec<String>,
    /// Source location of the fault's innermost frame.
    pub origin: Option<Origin>,
    /// Store-native error code, for store faults only.
    pub native_code: Option<i32>,
    /// When this record was built.
    pub timestamp: Zoned,
    /// When the current logical run began. Set once per process context, so
    /// related records group under a shared start timestamp.
    pub run_start: Zoned,
    /// The acting identity.
    pub actor: String,
    /// The effective identity, when it differs from the actor.
    pub effective_actor: String,
    /// Human-readable access level of the actor on the origin store.
    pub access_level: String,
    /// Roles held by the actor.
    pub roles: Vec<String>,
    /// Client version: product/variant plus optional point version, parsed
    /// from the pipe-delimited source string.
    pub client_version: Vec<String>,
    /// Path of the store the fault originated in.
    pub origin_store_path: String,
    /// Server the fault originated on.
    pub origin_server: String,
    /// The page or agent path the fault originated from.
    pub origin_page: String,
    /// Optional cross-reference to an associated business record.
    pub linked: Option<LinkedRef>,
    /// Expiry stamp, when a valid expiry offset is configured.
    pub expiry: Option<Zoned>,
    /// Explanatory note written instead of an expiry stamp when the
    /// configured offset is invalid.
    pub expiry_note: Option<String>,
}

impl DiagnosticRecord {
    /// The full message as logged: the overflow text when present, else the
    /// display copy.
    pub fn logged_message(&self) -> &str {
        self.overflow.as_deref().unwrap_or(&self.message)
    }
}
