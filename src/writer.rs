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

//! The write-with-fallback persistence protocol.
//!
//! Target resolution order: the mail-routing store when a mail address is
//! configured, else the configured log store, auto-provisioned from the
//! template store when it does not exist yet. A failed write reports once
//! through the debug sink and returns `false`; nothing is raised to the
//! caller and no acquired handle outlives the attempt.

use std::sync::Arc;

use anyhow::Context;

use crate::config::ConfigResolver;
use crate::config::Settings;
use crate::context::ContextCache;
use crate::debug::DebugSink;
use crate::error::FaultLogError;
use crate::host::Environment;
use crate::record::DiagnosticRecord;
use crate::record::FORM_TAG;
use crate::record::LinkedRef;
use crate::store::MAIL_STORE_PATH;
use crate::store::Store;
use crate::store::StoreRecord;
use crate::store::fields;

pub(crate) struct Writer<'a> {
    pub env: &'a dyn Environment,
    pub config: &'a dyn ConfigResolver,
    pub settings: &'a mut Settings,
    pub cache: &'a mut ContextCache,
    pub debug: &'a DebugSink,
}

impl Writer<'_> {
    /// Persist the record. Returns whether the commit succeeded; every
    /// failure is reported through the debug sink exactly once.
    pub fn write(&mut self, record: &DiagnosticRecord) -> bool {
        match self.try_write(record) {
            Ok(()) => true,
            Err(err) => {
                self.debug.report(&err);
                false
            }
        }
    }

    fn try_write(&mut self, record: &DiagnosticRecord) -> anyhow::Result<()> {
        let mail_address = self.settings.mail_address(self.config);
        let store = if mail_address.is_empty() {
            self.resolve_log_store(record)?
        } else {
            self.env
                .open_store(&record.origin_server, MAIL_STORE_PATH)
                .context("opening mail-routing store")?
        };

        // the transient record is dropped on every exit path below
        let mut doc = store.create_record()?;
        populate(doc.as_mut(), record);
        if !mail_address.is_empty() {
            doc.set_text(fields::RECIPIENTS, &mail_address);
            doc.set_text(fields::SEND_TO, &mail_address);
            doc.set_text(fields::FROM, &record.actor);
            doc.set_text(fields::PRINCIPAL, &record.actor);
        }
        doc.save().context("committing diagnostic record")
    }

    /// Open the configured log store, provisioning it from the template
    /// store when it cannot be opened and a template is configured.
    fn resolve_log_store(
        &mut self,
        record: &DiagnosticRecord,
    ) -> anyhow::Result<Arc<dyn Store>> {
        let origin = self.settings.origin_path().unwrap_or_default().to_string();
        let path = self.settings.store_path(self.config, &origin);
        let server = record.origin_server.clone();

        match self.cache.log_store(self.env, &server, &path) {
            Ok(store) => Ok(store),
            Err(open_err) => {
                let template = self.settings.template_path(self.config);
                if template.is_empty() {
                    return Err(open_err.context(FaultLogError::StoreUnavailable(path)));
                }
                let store = self
                    .env
                    .provision_store(&template, &server, &path)
                    .with_context(|| {
                        format!("cannot provision log store at {path} from template {template}")
                    })?;
                self.cache.put_log_store(store.clone());
                Ok(store)
            }
        }
    }
}

/// Populate every record field as store-native fields. The field names are
/// the wire contract for downstream consumers.
fn populate(doc: &mut dyn StoreRecord, record: &DiagnosticRecord) {
    doc.set_text(fields::FORM, FORM_TAG);

    if let Some(code) = record.native_code {
        doc.set_number(fields::ERROR_NUMBER, i64::from(code));
    }
    if !record.stack_lines.is_empty() {
        doc.set_text_list(fields::STACK_TRACE, &record.stack_lines);
    }
    if let Some(origin) = &record.origin {
        doc.set_number(fields::ERROR_LINE, i64::from(origin.line));
        doc.set_text(fields::FROM_METHOD, &origin.location);
    }

    doc.set_text(fields::ERROR_MESSAGE, &record.fault_message);
    doc.set_timestamp(fields::EVENT_TIME, &record.timestamp);
    doc.set_text(fields::EVENT_TYPE, record.event_kind.value());
    doc.set_text(fields::MESSAGE, &record.message);
    if let Some(overflow) = &record.overflow {
        doc.append_body(overflow);
    }
    doc.set_text(fields::SEVERITY, record.severity.name());
    doc.set_text(fields::FROM_DATABASE, &record.origin_store_path);
    doc.set_text(fields::FROM_SERVER, &record.origin_server);
    doc.set_text(fields::FROM_AGENT, &record.origin_page);
    doc.set_text(fields::AGENT_LANGUAGE, "Rust");
    doc.set_text(fields::USER_NAME, &record.actor);
    doc.set_text(fields::EFFECTIVE_NAME, &record.effective_actor);
    doc.set_text(fields::ACCESS_LEVEL, &record.access_level);
    doc.set_text_list(fields::USER_ROLES, &record.roles);
    doc.set_text_list(fields::CLIENT_VERSION, &record.client_version);
    doc.set_timestamp(fields::AGENT_START_TIME, &record.run_start);

    match &record.linked {
        Some(LinkedRef::Resolved(target)) => {
            doc.append_body("The record associated with this event is:");
            doc.append_body(&format!("Server: {}", target.server));
            doc.append_body(&format!("Store: {}", target.store_path));
            doc.append_body(&format!("Unique ID: {}", target.unique_id));
            doc.append_body(&format!("Note ID: {}", target.note_id));
        }
        Some(LinkedRef::Unavailable) => {
            doc.append_body("The record associated with this event is: reference unavailable");
        }
        None => {}
    }

    // lower-privilege actors must still be able to write subsequent records
    doc.set_text(fields::PUBLIC_ACCESS, "1");

    if let Some(expiry) = &record.expiry {
        doc.set_timestamp(fields::EXPIRE_DATE, expiry);
    } else if let Some(note) = &record.expiry_note {
        doc.set_text(fields::ARCHIVE_FLAG, note);
    }
}
