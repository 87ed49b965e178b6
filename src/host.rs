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

//! The host environment seam.
//!
//! Everything the logger needs from its surroundings comes through
//! [`Environment`]: the execution session, the caller's own store, opening
//! and provisioning stores, and the page history of the current request. Any
//! privilege split (for the mail store or template copies) is the host
//! implementation's concern.

use std::fmt;
use std::sync::Arc;

use crate::context::Liveness;
use crate::store::Store;

/// The actor's access level on a store, ordered lowest to highest.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AccessLevel {
    NoAccess,
    Depositor,
    Reader,
    Author,
    Editor,
    Designer,
    Manager,
}

impl AccessLevel {
    /// The persisted human-readable descriptor, e.g. `6: Manager`.
    pub fn descriptor(&self) -> &'static str {
        match self {
            AccessLevel::NoAccess => "0: No Access",
            AccessLevel::Depositor => "1: Depositor",
            AccessLevel::Reader => "2: Reader",
            AccessLevel::Author => "3: Author",
            AccessLevel::Editor => "4: Editor",
            AccessLevel::Designer => "5: Designer",
            AccessLevel::Manager => "6: Manager",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

/// A live execution session, subject to external invalidation.
pub trait Session: Liveness + fmt::Debug {
    /// The acting identity.
    fn user_name(&self) -> anyhow::Result<String>;

    /// The effective identity, when the host distinguishes it.
    fn effective_user_name(&self) -> anyhow::Result<String>;

    /// The server this session runs on.
    fn server_name(&self) -> anyhow::Result<String>;

    /// The raw client version string, pipe-delimited when it carries a point
    /// version, e.g. `Release 12.0.2|November 03, 2022`.
    fn client_version(&self) -> anyhow::Result<String>;

    /// Roles held by the acting identity.
    fn user_roles(&self) -> anyhow::Result<Vec<String>>;
}

/// The host environment the logger runs inside.
pub trait Environment: fmt::Debug {
    /// Resolve the current execution session.
    fn session(&self) -> anyhow::Result<Arc<dyn Session>>;

    /// Resolve the caller's own store.
    fn current_store(&self) -> anyhow::Result<Arc<dyn Store>>;

    /// Open a store by server and path.
    fn open_store(&self, server: &str, path: &str) -> anyhow::Result<Arc<dyn Store>>;

    /// Provision a store at `path` by copying the configured template.
    fn provision_store(
        &self,
        template_path: &str,
        server: &str,
        path: &str,
    ) -> anyhow::Result<Arc<dyn Store>>;

    /// The page paths of the current request chain, most recent first. Empty
    /// when the host has no page concept.
    fn page_history(&self) -> Vec<String>;
}

/// An always-live [`Session`] with a fixed identity, for hosts that have no
/// revocable session concept.
///
/// # Examples
///
/// ```
/// use faultlog::host::FixedSession;
/// use faultlog::host::Session;
///
/// let session = FixedSession::new("svc-batch")
///     .server("app01")
///     .version("Release 1.4.0|2024-06-01");
/// assert_eq!(session.user_name().unwrap(), "svc-batch");
/// ```
#[derive(Clone, Debug)]
pub struct FixedSession {
    user: String,
    effective_user: String,
    server: String,
    version: String,
    roles: Vec<String>,
}

impl FixedSession {
    /// Create a session for the given identity. The effective identity
    /// defaults to the same value.
    pub fn new(user: impl Into<String>) -> FixedSession {
        let user = user.into();
        FixedSession {
            effective_user: user.clone(),
            user,
            server: String::new(),
            version: String::new(),
            roles: vec![],
        }
    }

    /// Set the effective identity.
    pub fn effective_user(mut self, effective_user: impl Into<String>) -> FixedSession {
        self.effective_user = effective_user.into();
        self
    }

    /// Set the server name.
    pub fn server(mut self, server: impl Into<String>) -> FixedSession {
        self.server = server.into();
        self
    }

    /// Set the raw client version string.
    pub fn version(mut self, version: impl Into<String>) -> FixedSession {
        self.version = version.into();
        self
    }

    /// Set the roles held by the identity.
    pub fn roles(mut self, roles: Vec<String>) -> FixedSession {
        self.roles = roles;
        self
    }
}

impl Liveness for FixedSession {
    fn is_live(&self) -> bool {
        true
    }
}

impl Session for FixedSession {
    fn user_name(&self) -> anyhow::Result<String> {
        Ok(self.user.clone())
    }

    fn effective_user_name(&self) -> anyhow::Result<String> {
        Ok(self.effective_user.clone())
    }

    fn server_name(&self) -> anyhow::Result<String> {
        Ok(self.server.clone())
    }

    fn client_version(&self) -> anyhow::Result<String> {
        Ok(self.version.clone())
    }

    fn user_roles(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.roles.clone())
    }
}
