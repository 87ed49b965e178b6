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

//! A file-backed store that persists each record as one JSON object per line.
//!
//! The simplest durable backend: a store is a single append-only file, and
//! template provisioning is a file copy. Field names are the wire contract
//! from [`crate::store::fields`]; the free-text body persists under the
//! `LogDocInfo` key.

use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

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

/// The JSON key holding the free-text body block.
pub const BODY_FIELD: &str = "LogDocInfo";

/// A store over a single JSON-lines file.
///
/// # Examples
///
/// ```no_run
/// use faultlog::store::Store;
/// use faultlog::store::json_file::JsonFileStore;
///
/// let store = JsonFileStore::create("/var/log/app/faultlog.db").unwrap();
/// let mut record = store.create_record().unwrap();
/// record.set_text("LogMessage", "startup complete");
/// record.save().unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Open an existing store file.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<JsonFileStore> {
        let path = path.into();
        anyhow::ensure!(path.is_file(), "no store file at {}", path.display());
        Ok(JsonFileStore { path })
    }

    /// Create an empty store file, or open it if it already exists.
    pub fn create(path: impl Into<PathBuf>) -> anyhow::Result<JsonFileStore> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("cannot create store file at {}", path.display()))?;
        Ok(JsonFileStore { path })
    }

    /// Provision a store at `path` by copying the template file.
    pub fn provision(
        template: impl AsRef<Path>,
        path: impl Into<PathBuf>,
    ) -> anyhow::Result<JsonFileStore> {
        let template = template.as_ref();
        let path = path.into();
        fs::copy(template, &path).with_context(|| {
            format!(
                "cannot provision store at {} from template {}",
                path.display(),
                template.display()
            )
        })?;
        JsonFileStore::open(path)
    }

    /// Read every persisted record back as a JSON object, in commit order.
    pub fn read_records(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read store file at {}", self.path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("malformed record line"))
            .collect()
    }
}

impl Liveness for JsonFileStore {
    fn is_live(&self) -> bool {
        self.path.is_file()
    }
}

impl Store for JsonFileStore {
    fn server(&self) -> String {
        String::new()
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }

    fn access_level(&self) -> anyhow::Result<AccessLevel> {
        // a writable file grants everything
        Ok(AccessLevel::Manager)
    }

    fn create_record(&self) -> anyhow::Result<Box<dyn StoreRecord>> {
        anyhow::ensure!(self.is_live(), "store file at {} is gone", self.path.display());
        Ok(Box::new(JsonFileRecord {
            path: self.path.clone(),
            fields: BTreeMap::new(),
            body: String::new(),
        }))
    }
}

#[derive(Debug)]
struct JsonFileRecord {
    path: PathBuf,
    fields: BTreeMap<String, FieldValue>,
    body: String,
}

impl StoreRecord for JsonFileRecord {
    fn set_text(&mut self, field: &str, value: &str) {
        self.fields
            .insert(field.to_string(), FieldValue::Text(value.to_string()));
    }

    fn set_number(&mut self, field: &str, value: i64) {
        self.fields.insert(field.to_string(), FieldValue::Number(value));
    }

    fn set_text_list(&mut self, field: &str, values: &[String]) {
        self.fields
            .insert(field.to_string(), FieldValue::TextList(values.to_vec()));
    }

    fn set_timestamp(&mut self, field: &str, value: &Zoned) {
        self.fields
            .insert(field.to_string(), FieldValue::Timestamp(value.clone()));
    }

    fn append_body(&mut self, text: &str) {
        self.body.push_str(text);
        self.body.push('\n');
    }

    fn save(&mut self) -> anyhow::Result<()> {
        let mut map = serde_json::Map::new();
        for (field, value) in &self.fields {
            map.insert(field.clone(), serde_json::to_value(value)?);
        }
        if !self.body.is_empty() {
            map.insert(BODY_FIELD.to_string(), self.body.clone().into());
        }
        let line = serde_json::to_string(&serde_json::Value::Object(map))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("cannot open store file at {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

/// A host environment rooted at a directory of JSON-lines store files.
///
/// Store paths resolve relative to the root; sessions come from a fixed
/// identity profile. Suits standalone embeddings that just want faults
/// captured to a file.
#[derive(Clone, Debug)]
pub struct JsonFileEnvironment {
    root: PathBuf,
    profile: FixedSession,
    current: Option<String>,
    pages: Vec<String>,
}

impl JsonFileEnvironment {
    /// Create an environment rooted at `root` with an anonymous profile.
    pub fn new(root: impl Into<PathBuf>) -> JsonFileEnvironment {
        JsonFileEnvironment {
            root: root.into(),
            profile: FixedSession::new("Anonymous"),
            current: None,
            pages: vec![],
        }
    }

    /// Set the session identity profile.
    pub fn profile(mut self, profile: FixedSession) -> JsonFileEnvironment {
        self.profile = profile;
        self
    }

    /// Set the caller's own store, as a path relative to the root.
    pub fn current_store_path(mut self, path: impl Into<String>) -> JsonFileEnvironment {
        self.current = Some(path.into());
        self
    }

    /// Set the page history, most recent first.
    pub fn pages(mut self, pages: Vec<String>) -> JsonFileEnvironment {
        self.pages = pages;
        self
    }
}

impl Environment for JsonFileEnvironment {
    fn session(&self) -> anyhow::Result<Arc<dyn Session>> {
        Ok(Arc::new(self.profile.clone()))
    }

    fn current_store(&self) -> anyhow::Result<Arc<dyn Store>> {
        let current = self.current.as_deref().context("no current store set")?;
        Ok(Arc::new(JsonFileStore::open(self.root.join(current))?))
    }

    fn open_store(&self, _server: &str, path: &str) -> anyhow::Result<Arc<dyn Store>> {
        Ok(Arc::new(JsonFileStore::open(self.root.join(path))?))
    }

    fn provision_store(
        &self,
        template_path: &str,
        _server: &str,
        path: &str,
    ) -> anyhow::Result<Arc<dyn Store>> {
        Ok(Arc::new(JsonFileStore::provision(
            self.root.join(template_path),
            self.root.join(path),
        )?))
    }

    fn page_history(&self) -> Vec<String> {
        self.pages.clone()
    }
}
