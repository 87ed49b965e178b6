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

//! An in-memory store and host environment.
//!
//! Intended for tests, doctests, and embeddings that only need to inspect
//! records in process. Handles issued by [`MemoryEnvironment`] can be revoked
//! out from under the logger with [`MemoryEnvironment::revoke_handles`],
//! mimicking a host that released the backing resources; the store content
//! itself survives revocation, so re-resolution recovers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Context;
use jiff::Zoned;

use crate::context::Liveness;
use crate::host::AccessLevel;
use crate::host::Environment;
use crate::host::FixedSession;
use crate::host::Session;
use crate::store::FieldValue;
use crate::store::Store;
use crate::store::StoreRecord;

/// A committed record, as a map of named fields plus the free-text body.
#[derive(Clone, Debug, Default)]
pub struct SavedRecord {
    pub fields: BTreeMap<String, FieldValue>,
    pub body: String,
}

impl SavedRecord {
    /// The text value of a field, if present and textual.
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(FieldValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// The text-list value of a field, if present.
    pub fn text_list(&self, field: &str) -> Option<&[String]> {
        match self.fields.get(field) {
            Some(FieldValue::TextList(values)) => Some(values),
            _ => None,
        }
    }
}

/// The shared content of a memory store. Survives handle revocation.
#[derive(Debug)]
struct StoreContent {
    access: Mutex<AccessLevel>,
    fail_saves: AtomicBool,
    records: Mutex<Vec<SavedRecord>>,
}

impl StoreContent {
    fn new() -> Arc<StoreContent> {
        Arc::new(StoreContent {
            access: Mutex::new(AccessLevel::Manager),
            fail_saves: AtomicBool::new(false),
            records: Mutex::new(vec![]),
        })
    }
}

/// A handle to an in-memory store, revocable like any externally-owned one.
#[derive(Debug)]
pub struct MemoryStore {
    server: String,
    path: String,
    alive: AtomicBool,
    content: Arc<StoreContent>,
}

impl Liveness for MemoryStore {
    fn is_live(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn server(&self) -> String {
        self.server.clone()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn access_level(&self) -> anyhow::Result<AccessLevel> {
        anyhow::ensure!(self.is_live(), "store handle for {} was revoked", self.path);
        Ok(*self.content.access.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn create_record(&self) -> anyhow::Result<Box<dyn StoreRecord>> {
        anyhow::ensure!(self.is_live(), "store handle for {} was revoked", self.path);
        Ok(Box::new(MemoryRecord {
            content: self.content.clone(),
            record: SavedRecord::default(),
        }))
    }
}

#[derive(Debug)]
struct MemoryRecord {
    content: Arc<StoreContent>,
    record: SavedRecord,
}

impl StoreRecord for MemoryRecord {
    fn set_text(&mut self, field: &str, value: &str) {
        self.record
            .fields
            .insert(field.to_string(), FieldValue::Text(value.to_string()));
    }

    fn set_number(&mut self, field: &str, value: i64) {
        self.record
            .fields
            .insert(field.to_string(), FieldValue::Number(value));
    }

    fn set_text_list(&mut self, field: &str, values: &[String]) {
        self.record
            .fields
            .insert(field.to_string(), FieldValue::TextList(values.to_vec()));
    }

    fn set_timestamp(&mut self, field: &str, value: &Zoned) {
        self.record
            .fields
            .insert(field.to_string(), FieldValue::Timestamp(value.clone()));
    }

    fn append_body(&mut self, text: &str) {
        self.record.body.push_str(text);
        self.record.body.push('\n');
    }

    fn save(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.content.fail_saves.load(Ordering::SeqCst),
            "store rejected the write"
        );
        let mut records = self.content.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push(std::mem::take(&mut self.record));
        Ok(())
    }
}

/// A session handle issued by [`MemoryEnvironment`].
#[derive(Debug)]
pub struct MemorySession {
    profile: FixedSession,
    alive: AtomicBool,
}

impl Liveness for MemorySession {
    fn is_live(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Session for MemorySession {
    fn user_name(&self) -> anyhow::Result<String> {
        self.profile.user_name()
    }

    fn effective_user_name(&self) -> anyhow::Result<String> {
        self.profile.effective_user_name()
    }

    fn server_name(&self) -> anyhow::Result<String> {
        self.profile.server_name()
    }

    fn client_version(&self) -> anyhow::Result<String> {
        self.profile.client_version()
    }

    fn user_roles(&self) -> anyhow::Result<Vec<String>> {
        self.profile.user_roles()
    }
}

#[derive(Debug)]
struct EnvInner {
    profile: Mutex<FixedSession>,
    stores: Mutex<BTreeMap<String, Arc<StoreContent>>>,
    current_path: Mutex<Option<String>>,
    pages: Mutex<Vec<String>>,
    issued_sessions: Mutex<Vec<Weak<MemorySession>>>,
    issued_stores: Mutex<Vec<Weak<MemoryStore>>>,
}

/// An in-memory [`Environment`].
///
/// Clones share state, so a test can keep one clone for control and hand the
/// other to the logger.
///
/// # Examples
///
/// ```
/// use faultlog::store::memory::MemoryEnvironment;
///
/// let env = MemoryEnvironment::new();
/// env.add_store("faultlog.db");
/// env.add_store("crm.db");
/// env.set_current("crm.db");
/// ```
#[derive(Clone, Debug)]
pub struct MemoryEnvironment {
    inner: Arc<EnvInner>,
}

impl Default for MemoryEnvironment {
    fn default() -> Self {
        MemoryEnvironment::new()
    }
}

impl MemoryEnvironment {
    /// Create an environment with an anonymous session profile and no stores.
    pub fn new() -> MemoryEnvironment {
        MemoryEnvironment {
            inner: Arc::new(EnvInner {
                profile: Mutex::new(FixedSession::new("Anonymous")),
                stores: Mutex::new(BTreeMap::new()),
                current_path: Mutex::new(None),
                pages: Mutex::new(vec![]),
                issued_sessions: Mutex::new(vec![]),
                issued_stores: Mutex::new(vec![]),
            }),
        }
    }

    /// Replace the session identity profile.
    pub fn set_profile(&self, profile: FixedSession) {
        *self.inner.profile.lock().unwrap_or_else(PoisonError::into_inner) = profile;
    }

    /// Register an empty store at `path`.
    pub fn add_store(&self, path: impl Into<String>) {
        let mut stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.insert(path.into(), StoreContent::new());
    }

    /// Set the caller's own store. The store must have been registered.
    pub fn set_current(&self, path: impl Into<String>) {
        *self.inner.current_path.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.into());
    }

    /// Set the page history, most recent first.
    pub fn set_pages(&self, pages: Vec<String>) {
        *self.inner.pages.lock().unwrap_or_else(PoisonError::into_inner) = pages;
    }

    /// Set the acting identity's access level on the store at `path`.
    pub fn set_access(&self, path: &str, access: AccessLevel) {
        let stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(content) = stores.get(path) {
            *content.access.lock().unwrap_or_else(PoisonError::into_inner) = access;
        }
    }

    /// Make every subsequent save against the store at `path` fail.
    pub fn fail_saves(&self, path: &str, fail: bool) {
        let stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(content) = stores.get(path) {
            content.fail_saves.store(fail, Ordering::SeqCst);
        }
    }

    /// The records committed to the store at `path`, in commit order.
    pub fn records(&self, path: &str) -> Vec<SavedRecord> {
        let stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
        match stores.get(path) {
            Some(content) => content.records.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            None => vec![],
        }
    }

    /// Revoke every handle issued so far, as a host releasing the backing
    /// resources would. Store and session content survive; re-resolution
    /// yields fresh live handles.
    pub fn revoke_handles(&self) {
        let sessions = self.inner.issued_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.alive.store(false, Ordering::SeqCst);
        }
        let stores = self.inner.issued_stores.lock().unwrap_or_else(PoisonError::into_inner);
        for store in stores.iter().filter_map(Weak::upgrade) {
            store.alive.store(false, Ordering::SeqCst);
        }
    }

    fn issue_store(&self, server: &str, path: &str) -> anyhow::Result<Arc<dyn Store>> {
        let content = {
            let stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(path)
                .cloned()
                .with_context(|| format!("no store at path {path}"))?
        };
        let store = Arc::new(MemoryStore {
            server: server.to_string(),
            path: path.to_string(),
            alive: AtomicBool::new(true),
            content,
        });
        let mut issued = self.inner.issued_stores.lock().unwrap_or_else(PoisonError::into_inner);
        issued.push(Arc::downgrade(&store));
        Ok(store)
    }
}

impl Environment for MemoryEnvironment {
    fn session(&self) -> anyhow::Result<Arc<dyn Session>> {
        let profile = self.inner.profile.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let session = Arc::new(MemorySession {
            profile,
            alive: AtomicBool::new(true),
        });
        let mut issued = self.inner.issued_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        issued.push(Arc::downgrade(&session));
        Ok(session)
    }

    fn current_store(&self) -> anyhow::Result<Arc<dyn Store>> {
        let path = self
            .inner
            .current_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .context("no current store set")?;
        self.issue_store("", &path)
    }

    fn open_store(&self, server: &str, path: &str) -> anyhow::Result<Arc<dyn Store>> {
        self.issue_store(server, path)
    }

    fn provision_store(
        &self,
        template_path: &str,
        server: &str,
        path: &str,
    ) -> anyhow::Result<Arc<dyn Store>> {
        let access = {
            let stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
            let template = stores
                .get(template_path)
                .with_context(|| format!("no template store at path {template_path}"))?;
            *template.access.lock().unwrap_or_else(PoisonError::into_inner)
        };
        let content = StoreContent::new();
        *content.access.lock().unwrap_or_else(PoisonError::into_inner) = access;
        {
            let mut stores = self.inner.stores.lock().unwrap_or_else(PoisonError::into_inner);
            stores.insert(path.to_string(), content);
        }
        self.issue_store(server, path)
    }

    fn page_history(&self) -> Vec<String> {
        self.inner.pages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields;

    #[test]
    fn test_records_survive_handle_revocation() {
        let env = MemoryEnvironment::new();
        env.add_store("faultlog.db");

        let store = env.open_store("", "faultlog.db").unwrap();
        let mut record = store.create_record().unwrap();
        record.set_text(fields::MESSAGE, "first");
        record.save().unwrap();

        env.revoke_handles();
        assert!(!store.is_live());
        assert!(store.create_record().is_err());

        // a fresh handle sees the same content
        let reopened = env.open_store("", "faultlog.db").unwrap();
        assert!(reopened.is_live());
        assert_eq!(env.records("faultlog.db").len(), 1);
    }

    #[test]
    fn test_provision_copies_template_access() {
        let env = MemoryEnvironment::new();
        env.add_store("template.db");
        env.set_access("template.db", AccessLevel::Depositor);

        let provisioned = env.provision_store("template.db", "", "faultlog.db").unwrap();
        assert_eq!(provisioned.access_level().unwrap(), AccessLevel::Depositor);
        assert!(env.records("faultlog.db").is_empty());

        assert!(env.provision_store("missing.db", "", "other.db").is_err());
    }

    #[test]
    fn test_failed_save_keeps_store_clean() {
        let env = MemoryEnvironment::new();
        env.add_store("faultlog.db");
        env.fail_saves("faultlog.db", true);

        let store = env.open_store("", "faultlog.db").unwrap();
        let mut record = store.create_record().unwrap();
        record.set_text(fields::MESSAGE, "doomed");
        assert!(record.save().is_err());
        assert!(env.records("faultlog.db").is_empty());
    }
}
