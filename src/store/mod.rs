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

//! The document-store boundary.
//!
//! A store holds persisted diagnostic records as documents with named,
//! typed fields. The field names written by the persistence writer are a
//! wire contract for downstream report consumers and must not change.

use std::fmt;

use jiff::Zoned;

use crate::context::Liveness;
use crate::host::AccessLevel;
use crate::record::LinkedTarget;

pub mod memory;

#[cfg(feature = "json-file")]
pub mod json_file;

/// The fixed path of the mail-routing store.
pub const MAIL_STORE_PATH: &str = "mail.box";

/// Persisted field names. These are the wire contract for any downstream
/// report or dashboard consumer.
pub mod fields {
    pub const FORM: &str = "Form";
    pub const ERROR_NUMBER: &str = "LogErrorNumber";
    pub const STACK_TRACE: &str = "LogStackTrace";
    pub const ERROR_LINE: &str = "LogErrorLine";
    pub const FROM_METHOD: &str = "LogFromMethod";
    pub const ERROR_MESSAGE: &str = "LogErrorMessage";
    pub const EVENT_TIME: &str = "LogEventTime";
    pub const EVENT_TYPE: &str = "LogEventType";
    pub const MESSAGE: &str = "LogMessage";
    pub const SEVERITY: &str = "LogSeverity";
    pub const FROM_DATABASE: &str = "LogFromDatabase";
    pub const FROM_SERVER: &str = "LogFromServer";
    pub const FROM_AGENT: &str = "LogFromAgent";
    pub const AGENT_LANGUAGE: &str = "LogAgentLanguage";
    pub const USER_NAME: &str = "LogUserName";
    pub const EFFECTIVE_NAME: &str = "LogEffectiveName";
    pub const ACCESS_LEVEL: &str = "LogAccessLevel";
    pub const USER_ROLES: &str = "LogUserRoles";
    pub const CLIENT_VERSION: &str = "LogClientVersion";
    pub const AGENT_START_TIME: &str = "LogAgentStartTime";
    pub const PUBLIC_ACCESS: &str = "$PublicAccess";
    pub const EXPIRE_DATE: &str = "ExpireDate";
    pub const ARCHIVE_FLAG: &str = "ArchiveFlag";
    pub const RECIPIENTS: &str = "Recipients";
    pub const SEND_TO: &str = "SendTo";
    pub const FROM: &str = "From";
    pub const PRINCIPAL: &str = "Principal";
}

/// A typed value of a persisted field.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json-file", derive(serde::Serialize))]
#[cfg_attr(feature = "json-file", serde(untagged))]
pub enum FieldValue {
    Text(String),
    Number(i64),
    TextList(Vec<String>),
    Timestamp(Zoned),
}

/// A document-oriented store holding persisted diagnostic records.
pub trait Store: Liveness + fmt::Debug {
    /// The server this store lives on.
    fn server(&self) -> String;

    /// The store path.
    fn path(&self) -> String;

    /// The acting identity's access level on this store.
    fn access_level(&self) -> anyhow::Result<AccessLevel>;

    /// Create a new, unsaved record in this store.
    fn create_record(&self) -> anyhow::Result<Box<dyn StoreRecord>>;
}

/// A single record under construction in a store.
///
/// Dropping an unsaved record discards it; nothing is persisted until
/// [`save`](StoreRecord::save) commits.
pub trait StoreRecord {
    fn set_text(&mut self, field: &str, value: &str);

    fn set_number(&mut self, field: &str, value: i64);

    fn set_text_list(&mut self, field: &str, values: &[String]);

    fn set_timestamp(&mut self, field: &str, value: &Zoned);

    /// Append free text to the record's rich free-text block, used for
    /// message overflow and the linked-record cross-reference.
    fn append_body(&mut self, text: &str);

    /// Commit the record to the store.
    fn save(&mut self) -> anyhow::Result<()>;
}

/// A reference to a business record that a diagnostic record may link to.
///
/// Resolution may fail (the backing record or its parent store may be gone);
/// the composer degrades to a placeholder rather than failing the whole
/// diagnostic record.
pub trait LinkedRecord {
    /// Resolve the parent-store location and identifiers of the record.
    fn resolve(&self) -> anyhow::Result<LinkedTarget>;
}

impl LinkedRecord for LinkedTarget {
    fn resolve(&self) -> anyhow::Result<LinkedTarget> {
        Ok(self.clone())
    }
}
