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

//! Composition of diagnostic records.
//!
//! The composer pulls actor and environment descriptors through the context
//! cache, resolves the effective message and severity, applies the size and
//! self-reference safeguards, and degrades every failed lookup to an empty
//! field rather than failing the record.

use jiff::Span;
use jiff::Zoned;

use crate::config::ConfigResolver;
use crate::config::Settings;
use crate::context::ContextCache;
use crate::debug::DebugSink;
use crate::error::FaultLogError;
use crate::fault::ClassifiedFault;
use crate::host::Environment;
use crate::record::DiagnosticRecord;
use crate::record::LinkedRef;
use crate::record::MESSAGE_LIMIT;
use crate::record::MESSAGE_PREFIX_LEN;
use crate::severity::EventKind;
use crate::severity::Severity;
use crate::store::LinkedRecord;

/// The explanatory note persisted when the configured expiry offset cannot
/// be applied.
pub(crate) const EXPIRY_NOTE: &str = "WARNING: configuration has a non-numeric value for \
     log.expireDays, so the record cannot be set to auto-expire";

/// Environment descriptors, memoized for the remainder of the process
/// context until the settings bag is invalidated.
#[derive(Clone, Debug, Default)]
pub(crate) struct Descriptors {
    pub actor: String,
    pub effective_actor: String,
    pub server: String,
    pub client_version: Vec<String>,
    pub roles: Vec<String>,
    pub access_level: String,
    pub origin_store_path: String,
}

pub(crate) struct Composer<'a> {
    pub env: &'a dyn Environment,
    pub config: &'a dyn ConfigResolver,
    pub settings: &'a mut Settings,
    pub cache: &'a mut ContextCache,
    pub debug: &'a DebugSink,
    pub descriptors: &'a mut Option<Descriptors>,
    pub run_start: &'a Zoned,
}

impl Composer<'_> {
    /// Build a complete record from the classified fault and call
    /// parameters. Never fails; unavailable context degrades to empty
    /// fields, reported through the debug sink.
    pub fn compose(
        &mut self,
        classified: &ClassifiedFault,
        explicit_message: &str,
        severity: Option<Severity>,
        kind: EventKind,
        linked: Option<&dyn LinkedRecord>,
    ) -> DiagnosticRecord {
        let descriptors = self.resolve_descriptors();
        let (message, overflow) = resolve_message(&classified.display_message, explicit_message);
        let (expiry, expiry_note) = self.resolve_expiry();

        DiagnosticRecord {
            event_kind: kind,
            severity: severity.unwrap_or_else(|| kind.default_severity()),
            fault_message: classified.display_message.clone(),
            message,
            overflow,
            stack_lines: classified.trace_lines.clone(),
            origin: classified.origin.clone(),
            native_code: classified.native_code,
            timestamp: Zoned::now(),
            run_start: self.run_start.clone(),
            actor: descriptors.actor,
            effective_actor: descriptors.effective_actor,
            access_level: descriptors.access_level,
            roles: descriptors.roles,
            client_version: descriptors.client_version,
            origin_store_path: descriptors.origin_store_path,
            origin_server: descriptors.server,
            origin_page: self.origin_page(kind),
            linked: linked.map(|linked| self.resolve_linked(linked)),
            expiry,
            expiry_note,
        }
    }

    fn resolve_descriptors(&mut self) -> Descriptors {
        if let Some(descriptors) = &self.descriptors {
            return descriptors.clone();
        }

        let mut resolved = Descriptors::default();
        match self.cache.session(self.env) {
            Ok(session) => {
                resolved.actor = session.user_name().unwrap_or_else(|err| {
                    self.debug.report(&err.context("resolving actor identity"));
                    String::new()
                });
                resolved.effective_actor = session.effective_user_name().unwrap_or_else(|err| {
                    self.debug.report(&err.context("resolving effective identity"));
                    String::new()
                });
                resolved.server = session.server_name().unwrap_or_else(|err| {
                    self.debug.report(&err.context("resolving server name"));
                    String::new()
                });
                resolved.roles = session.user_roles().unwrap_or_else(|err| {
                    self.debug.report(&err.context("resolving roles"));
                    vec![]
                });
                let raw_version = session.client_version().unwrap_or_else(|err| {
                    self.debug.report(&err.context("resolving client version"));
                    String::new()
                });
                resolved.client_version = parse_client_version(&raw_version);
            }
            Err(err) => self
                .debug
                .report(&err.context(FaultLogError::ContextUnavailable("session".to_string()))),
        }

        match self.cache.current_store(self.env) {
            Ok(store) => {
                resolved.origin_store_path = store.path();
                match store.access_level() {
                    Ok(access) => resolved.access_level = access.descriptor().to_string(),
                    Err(err) => self.debug.report(&err.context("resolving access level")),
                }
            }
            Err(err) => self.debug.report(
                &err.context(FaultLogError::ContextUnavailable("current store".to_string())),
            ),
        }

        *self.descriptors = Some(resolved.clone());
        resolved
    }

    /// The page path to log against. Errors raised on a redirect-to-error-page
    /// flow are logged against the previous page: the current one is the
    /// generic error page, which is not diagnostically useful.
    fn origin_page(&mut self, kind: EventKind) -> String {
        let history = self.env.page_history();
        let raw = match kind {
            EventKind::Error => history.get(1).or_else(|| history.first()),
            EventKind::Event => history.first(),
        };
        let Some(raw) = raw else {
            return String::new();
        };

        let mut page = raw.strip_prefix('/').unwrap_or(raw).to_string();
        if !self.settings.include_query_string(self.config) {
            if let Some(query) = page.find('?') {
                page.truncate(query);
            }
        }
        page
    }

    fn resolve_linked(&mut self, linked: &dyn LinkedRecord) -> LinkedRef {
        match linked.resolve() {
            Ok(target) => LinkedRef::Resolved(target),
            Err(err) => {
                self.debug.report(&err.context("resolving linked record"));
                LinkedRef::Unavailable
            }
        }
    }

    /// Compute the expiry stamp from the configured day offset. An invalid
    /// offset must not fail the write; it degrades to an explanatory note.
    fn resolve_expiry(&mut self) -> (Option<Zoned>, Option<String>) {
        let raw = self.settings.expire_days(self.config);
        if raw.trim().is_empty() {
            return (None, None);
        }
        let expiry = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|days| Span::new().try_days(days).ok())
            .and_then(|span| self.run_start.checked_add(span).ok());
        match expiry {
            Some(expiry) => (Some(expiry), None),
            None => (None, Some(EXPIRY_NOTE.to_string())),
        }
    }
}

/// Resolve the effective message from the classified fault and the caller's
/// explicit message, then apply the oversize safeguard.
fn resolve_message(fault_message: &str, explicit: &str) -> (String, Option<String>) {
    let message = if fault_message.is_empty() {
        explicit.to_string()
    } else if explicit.is_empty() {
        fault_message.to_string()
    } else {
        format!("{fault_message} - {explicit}")
    };

    if message.chars().count() > MESSAGE_LIMIT {
        let display: String = message.chars().take(MESSAGE_PREFIX_LEN).collect();
        (format!("{display}..."), Some(message))
    } else {
        (message, None)
    }
}

fn parse_client_version(raw: &str) -> Vec<String> {
    match raw.split_once('|') {
        Some((product, point)) => vec![product.to_string(), point.to_string()],
        None if raw.is_empty() => vec![],
        None => vec![raw.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::config::keys;
    use crate::debug::DebugLevel;
    use crate::host::FixedSession;
    use crate::record::LinkedTarget;
    use crate::store::memory::MemoryEnvironment;

    struct Fixture {
        env: MemoryEnvironment,
        config: MapConfig,
        settings: Settings,
        cache: ContextCache,
        debug: DebugSink,
        descriptors: Option<Descriptors>,
        run_start: Zoned,
    }

    impl Fixture {
        fn new() -> Fixture {
            let env = MemoryEnvironment::new();
            env.add_store("crm.db");
            env.set_current("crm.db");
            env.set_profile(
                FixedSession::new("CN=Ava Chen/O=Acme")
                    .server("app01")
                    .version("Release 1.4.0|2024-06-01")
                    .roles(vec!["[Admin]".to_string()]),
            );
            Fixture {
                env,
                config: MapConfig::new(),
                settings: Settings::new(),
                cache: ContextCache::new(),
                debug: DebugSink::new(DebugLevel::Silent),
                descriptors: None,
                run_start: Zoned::now(),
            }
        }

        fn composer(&mut self) -> Composer<'_> {
            Composer {
                env: &self.env,
                config: &self.config,
                settings: &mut self.settings,
                cache: &mut self.cache,
                debug: &self.debug,
                descriptors: &mut self.descriptors,
                run_start: &self.run_start,
            }
        }
    }

    #[test]
    fn test_message_resolution_order() {
        assert_eq!(resolve_message("", "explicit").0, "explicit");
        assert_eq!(resolve_message("boom", "").0, "boom");
        assert_eq!(resolve_message("boom", "explicit").0, "boom - explicit");
    }

    #[test]
    fn test_oversized_message_moves_to_overflow() {
        let long = "x".repeat(MESSAGE_LIMIT + 1);
        let (display, overflow) = resolve_message(&long, "");
        assert!(display.chars().count() <= MESSAGE_PREFIX_LEN + 3);
        assert!(display.ends_with("..."));
        assert_eq!(overflow.as_deref(), Some(long.as_str()));

        let (display, overflow) = resolve_message(&"x".repeat(MESSAGE_LIMIT), "");
        assert_eq!(display.chars().count(), MESSAGE_LIMIT);
        assert!(overflow.is_none());
    }

    #[test]
    fn test_descriptors_resolved_and_memoized() {
        let mut fixture = Fixture::new();
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "hello",
            None,
            EventKind::Event,
            None,
        );
        assert_eq!(record.actor, "CN=Ava Chen/O=Acme");
        assert_eq!(record.origin_server, "app01");
        assert_eq!(record.client_version, vec!["Release 1.4.0", "2024-06-01"]);
        assert_eq!(record.roles, vec!["[Admin]"]);
        assert_eq!(record.access_level, "6: Manager");
        assert_eq!(record.origin_store_path, "crm.db");

        // profile changes are not observed until the memo is dropped
        fixture.env.set_profile(FixedSession::new("CN=Someone Else"));
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "again",
            None,
            EventKind::Event,
            None,
        );
        assert_eq!(record.actor, "CN=Ava Chen/O=Acme");

        fixture.descriptors = None;
        fixture.cache.invalidate_all();
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "fresh",
            None,
            EventKind::Event,
            None,
        );
        assert_eq!(record.actor, "CN=Someone Else");
    }

    #[test]
    fn test_severity_defaults_per_kind() {
        let mut fixture = Fixture::new();
        let classified = ClassifiedFault::default();
        let error = fixture
            .composer()
            .compose(&classified, "m", None, EventKind::Error, None);
        assert_eq!(error.severity, Severity::Warning);
        let event = fixture
            .composer()
            .compose(&classified, "m", None, EventKind::Event, None);
        assert_eq!(event.severity, Severity::Info);
        let explicit =
            fixture
                .composer()
                .compose(&classified, "m", Some(Severity::Severe), EventKind::Event, None);
        assert_eq!(explicit.severity, Severity::Severe);
    }

    #[test]
    fn test_error_logs_against_previous_page() {
        let mut fixture = Fixture::new();
        fixture.env.set_pages(vec![
            "/error.xsp?code=500".to_string(),
            "/invoice.xsp?id=42".to_string(),
        ]);
        let classified = ClassifiedFault::default();

        let error = fixture
            .composer()
            .compose(&classified, "m", None, EventKind::Error, None);
        assert_eq!(error.origin_page, "invoice.xsp");

        let event = fixture
            .composer()
            .compose(&classified, "m", None, EventKind::Event, None);
        assert_eq!(event.origin_page, "error.xsp");

        // a one-deep history falls back to the current page
        fixture.env.set_pages(vec!["/invoice.xsp".to_string()]);
        let error = fixture
            .composer()
            .compose(&classified, "m", None, EventKind::Error, None);
        assert_eq!(error.origin_page, "invoice.xsp");
    }

    #[test]
    fn test_query_string_kept_when_configured() {
        let mut fixture = Fixture::new();
        fixture.env.set_pages(vec!["/invoice.xsp?id=42".to_string()]);
        fixture.config.set(keys::AGENT_INCLUDE_QUERY_STRING, "true");
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "m",
            None,
            EventKind::Event,
            None,
        );
        assert_eq!(record.origin_page, "invoice.xsp?id=42");
    }

    #[test]
    fn test_linked_record_degrades_when_unresolvable() {
        struct Broken;
        impl LinkedRecord for Broken {
            fn resolve(&self) -> anyhow::Result<LinkedTarget> {
                anyhow::bail!("parent store gone")
            }
        }

        let mut fixture = Fixture::new();
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "m",
            None,
            EventKind::Error,
            Some(&Broken),
        );
        assert_eq!(record.linked, Some(LinkedRef::Unavailable));

        let target = LinkedTarget {
            server: "app01".to_string(),
            store_path: "crm.db".to_string(),
            unique_id: "AA11".to_string(),
            note_id: 2050,
        };
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "m",
            None,
            EventKind::Error,
            Some(&target),
        );
        assert_eq!(record.linked, Some(LinkedRef::Resolved(target)));
    }

    #[test]
    fn test_expiry_from_valid_offset() {
        let mut fixture = Fixture::new();
        fixture.config.set(keys::LOG_EXPIRE_DAYS, "30");
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "m",
            None,
            EventKind::Event,
            None,
        );
        let expiry = record.expiry.unwrap();
        let expected = fixture.run_start.checked_add(Span::new().days(30)).unwrap();
        assert_eq!(expiry, expected);
        assert!(record.expiry_note.is_none());
    }

    #[test]
    fn test_non_numeric_expiry_degrades() {
        let mut fixture = Fixture::new();
        fixture.config.set(keys::LOG_EXPIRE_DAYS, "abc");
        let record = fixture.composer().compose(
            &ClassifiedFault::default(),
            "m",
            None,
            EventKind::Event,
            None,
        );
        assert!(record.expiry.is_none());
        assert_eq!(record.expiry_note.as_deref(), Some(EXPIRY_NOTE));
    }
}
