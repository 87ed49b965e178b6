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

//! The public entry points.
//!
//! A [`FaultLogger`] is the explicit context object holding everything the
//! pipeline shares across calls: the host environment, the configuration
//! resolver, the settings bag, the context handle cache, and the debug sink.
//! Entry points never raise; every internal failure is absorbed, reported
//! through the debug sink, and surfaced only as an empty returned message.

use jiff::Zoned;

use crate::compose::Composer;
use crate::compose::Descriptors;
use crate::config::ConfigResolver;
use crate::config::Settings;
use crate::context::ContextCache;
use crate::debug::DebugLevel;
use crate::debug::DebugSink;
use crate::fault::Fault;
use crate::fault::classify;
use crate::host::Environment;
use crate::severity::EventKind;
use crate::severity::Severity;
use crate::store::LinkedRecord;
use crate::writer::Writer;

/// The diagnostic-capture pipeline, one instance per execution context.
///
/// Invoked synchronously on the thread handling the triggering fault; it is
/// not meant to be shared across threads. Hosts that serve concurrent
/// requests keep one logger per request scope.
///
/// # Examples
///
/// ```
/// use faultlog::Fault;
/// use faultlog::FaultLogger;
/// use faultlog::config::MapConfig;
/// use faultlog::store::memory::MemoryEnvironment;
///
/// let env = MemoryEnvironment::new();
/// env.add_store("faultlog.db");
/// env.set_current("faultlog.db");
///
/// let mut logger = FaultLogger::new(env.clone(), MapConfig::new());
/// let fault = Fault::new("io::Error").message("disk full");
/// assert_eq!(logger.log_fault(&fault), "disk full");
/// assert_eq!(env.records("faultlog.db").len(), 1);
/// ```
#[derive(Debug)]
pub struct FaultLogger {
    env: Box<dyn Environment>,
    config: Box<dyn ConfigResolver>,
    debug: DebugSink,
    settings: Settings,
    cache: ContextCache,
    descriptors: Option<Descriptors>,
    run_start: Zoned,
    generic_emitted: bool,
    last_write_ok: bool,
}

impl FaultLogger {
    /// Create a logger over the given host environment and configuration
    /// source. The run-start timestamp is captured here, once, and stamped
    /// on every record this logger writes.
    pub fn new(
        env: impl Environment + 'static,
        config: impl ConfigResolver + 'static,
    ) -> FaultLogger {
        let mut logger = FaultLogger {
            env: Box::new(env),
            config: Box::new(config),
            debug: DebugSink::new(DebugLevel::Trace),
            settings: Settings::new(),
            cache: ContextCache::new(),
            descriptors: None,
            run_start: Zoned::now(),
            generic_emitted: false,
            last_write_ok: true,
        };
        let level = logger.settings.debug_level(logger.config.as_ref());
        logger.debug.set_level(DebugLevel::from_config(level));
        logger
    }

    /// Replace the debug sink. Useful for capturing internal failures in
    /// tests or routing them somewhere other than stderr.
    pub fn debug_sink(mut self, debug: DebugSink) -> FaultLogger {
        self.debug = debug;
        self
    }

    /// Log a raised fault as an error record.
    ///
    /// Returns the logged message, or an empty string when the record could
    /// not be written. Never raises.
    pub fn log_fault(&mut self, fault: &Fault) -> String {
        self.capture(Some(fault), "", None, EventKind::Error, None)
    }

    /// Log a raised fault as an error record, with an explicit message, a
    /// severity override, and an optional linked business record.
    pub fn log_fault_with(
        &mut self,
        fault: Option<&Fault>,
        message: &str,
        severity: Option<Severity>,
        linked: Option<&dyn LinkedRecord>,
    ) -> String {
        self.capture(fault, message, severity, EventKind::Error, linked)
    }

    /// Log a notable application event, with or without a causal fault.
    pub fn log_event(
        &mut self,
        fault: Option<&Fault>,
        message: &str,
        severity: Option<Severity>,
        linked: Option<&dyn LinkedRecord>,
    ) -> String {
        self.capture(fault, message, severity, EventKind::Event, linked)
    }

    fn capture(
        &mut self,
        fault: Option<&Fault>,
        message: &str,
        severity: Option<Severity>,
        kind: EventKind,
        linked: Option<&dyn LinkedRecord>,
    ) -> String {
        self.refresh_context();

        let want_trace = match kind {
            EventKind::Error => true,
            EventKind::Event => !self.settings.suppress_event_stack(self.config.as_ref()),
        };
        let classified = match classify(fault, 0, want_trace) {
            Ok(classified) => classified,
            Err(err) => {
                // a logging loop; terminate the attempt, do not write
                self.debug.report(&anyhow::Error::new(err));
                self.last_write_ok = false;
                return String::new();
            }
        };

        let record = Composer {
            env: self.env.as_ref(),
            config: self.config.as_ref(),
            settings: &mut self.settings,
            cache: &mut self.cache,
            debug: &self.debug,
            descriptors: &mut self.descriptors,
            run_start: &self.run_start,
        }
        .compose(&classified, message, severity, kind, linked);

        self.last_write_ok = Writer {
            env: self.env.as_ref(),
            config: self.config.as_ref(),
            settings: &mut self.settings,
            cache: &mut self.cache,
            debug: &self.debug,
        }
        .write(&record);

        if self.last_write_ok {
            record.logged_message().to_string()
        } else {
            String::new()
        }
    }

    /// Re-detect the originating store path. A change invalidates the
    /// settings bag, the handle cache, and the memoized descriptors as one
    /// unit; stale configuration must not leak across calling contexts.
    fn refresh_context(&mut self) {
        // a missing current store is reported once, during descriptor
        // resolution; here it only means an empty origin path
        let origin = match self.env.current_store() {
            Ok(store) => store.path(),
            Err(_) => String::new(),
        };
        if self.settings.refresh_for_origin(&origin) {
            self.cache.invalidate_all();
            self.descriptors = None;
            let level = self.settings.debug_level(self.config.as_ref());
            self.debug.set_level(DebugLevel::from_config(level));
        }
    }

    /// Whether the most recent logging call committed its record.
    pub fn last_write_ok(&self) -> bool {
        self.last_write_ok
    }

    /// Mark the start of a new host request, re-arming the once-per-request
    /// generic message substitution.
    pub fn begin_request(&mut self) {
        self.generic_emitted = false;
    }

    /// The text to surface to the end user for `message`, or `None` when
    /// user-facing display is disabled.
    ///
    /// When a generic substitute is configured it replaces the message, and
    /// is emitted at most once per request; repeated failures within one
    /// request stay quiet after the first.
    pub fn user_message(&mut self, message: &str) -> Option<String> {
        if !self.settings.display_error(self.config.as_ref()) {
            return None;
        }
        let generic = self.settings.generic_message(self.config.as_ref());
        if generic.is_empty() {
            return Some(message.to_string());
        }
        if self.generic_emitted {
            return None;
        }
        self.generic_emitted = true;
        Some(generic)
    }

    /// Whether host glue relaying event messages should strip control ids
    /// from them.
    pub fn suppress_control_ids(&mut self) -> bool {
        self.settings.suppress_event_control_id(self.config.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::config::keys;
    use crate::fault::Frame;
    use crate::store::fields;
    use crate::store::memory::MemoryEnvironment;

    fn quiet_logger(env: &MemoryEnvironment, config: &MapConfig) -> FaultLogger {
        FaultLogger::new(env.clone(), config.clone()).debug_sink(DebugSink::new(DebugLevel::Silent))
    }

    #[test]
    fn test_fault_round_trip() {
        let env = MemoryEnvironment::new();
        env.add_store("logs.db");
        env.set_current("crm.db");
        env.add_store("crm.db");
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "logs.db");
        let mut logger = quiet_logger(&env, &config);

        let fault = Fault::new("billing::PostingError")
            .message("ledger out of balance")
            .frame(Frame::new("billing::ledger", "post", 412));
        assert_eq!(logger.log_fault(&fault), "ledger out of balance");
        assert!(logger.last_write_ok());

        let records = env.records("logs.db");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text(fields::EVENT_TYPE), Some("Error"));
        assert_eq!(records[0].text(fields::SEVERITY), Some("WARNING"));
        assert_eq!(records[0].text(fields::FROM_DATABASE), Some("crm.db"));
    }

    #[test]
    fn test_self_referential_fault_short_circuits() {
        let env = MemoryEnvironment::new();
        env.add_store("logs.db");
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "logs.db");
        let (debug, buffer) = DebugSink::captured(DebugLevel::Message);
        let mut logger = FaultLogger::new(env.clone(), config).debug_sink(debug);

        let fault = Fault::new("io::Error")
            .message("boom")
            .frame(Frame::new("faultlog::writer", "write", 10));
        assert_eq!(logger.log_fault(&fault), "");
        assert!(!logger.last_write_ok());
        assert!(env.records("logs.db").is_empty());

        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("faultlog error:").count(), 1);
    }

    #[test]
    fn test_unreachable_store_returns_empty_with_one_report() {
        let env = MemoryEnvironment::new();
        env.add_store("crm.db");
        env.set_current("crm.db");
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "nowhere.db");
        let (debug, buffer) = DebugSink::captured(DebugLevel::Message);
        let mut logger = FaultLogger::new(env, config).debug_sink(debug);

        let fault = Fault::new("std::num::DivideByZero");
        assert_eq!(logger.log_fault(&fault), "");
        assert!(!logger.last_write_ok());

        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("faultlog error:").count(), 1);
        assert!(text.contains("no usable log store"));
    }

    #[test]
    fn test_missing_current_store_adds_a_context_report() {
        let env = MemoryEnvironment::new();
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "nowhere.db");
        let (debug, buffer) = DebugSink::captured(DebugLevel::Message);
        let mut logger = FaultLogger::new(env, config).debug_sink(debug);

        assert_eq!(logger.log_fault(&Fault::new("io::Error")), "");

        // one report for the degraded context, one for the failed write
        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("faultlog error:").count(), 2);
        assert!(text.contains("ambient context unavailable: current store"));
        assert!(text.contains("no usable log store"));
    }

    #[test]
    fn test_event_stack_suppression() {
        let env = MemoryEnvironment::new();
        env.add_store("logs.db");
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "logs.db");
        config.set(keys::EVENT_SUPPRESS_STACK, "true");
        let mut logger = quiet_logger(&env, &config);

        let fault = Fault::new("io::Error")
            .message("boom")
            .frame(Frame::new("billing::ledger", "post", 412));
        logger.log_event(Some(&fault), "posting retried", None, None);

        let records = env.records("logs.db");
        assert_eq!(records.len(), 1);
        assert!(records[0].text_list(fields::STACK_TRACE).is_none());
        // origin still captured; only the trace is suppressed
        assert_eq!(records[0].text(fields::FROM_METHOD), Some("billing::ledger::post"));
    }

    #[test]
    fn test_origin_change_invalidates_settings() {
        let env = MemoryEnvironment::new();
        env.add_store("crm.db");
        env.add_store("billing.db");
        env.set_current("crm.db");
        let config = MapConfig::new();
        // [CURRENT] makes the invalidation observable through the write target
        config.set(keys::STORE_PATH, "[CURRENT]");
        let mut logger = quiet_logger(&env, &config);

        logger.log_event(None, "first", None, None);
        assert_eq!(env.records("crm.db").len(), 1);

        env.set_current("billing.db");
        logger.log_event(None, "second", None, None);
        assert_eq!(env.records("billing.db").len(), 1);
        assert_eq!(env.records("crm.db").len(), 1);
    }

    #[test]
    fn test_revoked_handles_recover() {
        let env = MemoryEnvironment::new();
        env.add_store("logs.db");
        env.set_current("logs.db");
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "logs.db");
        let mut logger = quiet_logger(&env, &config);

        logger.log_event(None, "first", None, None);
        env.revoke_handles();
        logger.log_event(None, "second", None, None);
        assert!(logger.last_write_ok());
        assert_eq!(env.records("logs.db").len(), 2);
    }

    #[test]
    fn test_user_message_generic_substitution_once_per_request() {
        let env = MemoryEnvironment::new();
        let config = MapConfig::new();
        config.set(keys::DISPLAY_GENERIC_MESSAGE, "Something went wrong");
        let mut logger = quiet_logger(&env, &config);

        assert_eq!(
            logger.user_message("ledger out of balance").as_deref(),
            Some("Something went wrong")
        );
        assert_eq!(logger.user_message("still broken"), None);

        logger.begin_request();
        assert_eq!(
            logger.user_message("new request").as_deref(),
            Some("Something went wrong")
        );
    }

    #[test]
    fn test_user_message_display_disabled() {
        let env = MemoryEnvironment::new();
        let config = MapConfig::new();
        config.set(keys::DISPLAY_ERROR, "false");
        let mut logger = quiet_logger(&env, &config);
        assert_eq!(logger.user_message("ledger out of balance"), None);
    }

    #[test]
    fn test_event_without_fault() {
        let env = MemoryEnvironment::new();
        env.add_store("faultlog.db");
        let config = MapConfig::new();
        let mut logger = quiet_logger(&env, &config);

        assert_eq!(
            logger.log_event(None, "startup complete", Some(Severity::Info), None),
            "startup complete"
        );
        let records = env.records("faultlog.db");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text(fields::EVENT_TYPE), Some("Event"));
        assert_eq!(records[0].text(fields::SEVERITY), Some("INFO"));
        assert!(records[0].text_list(fields::STACK_TRACE).is_none());
        assert_eq!(records[0].text(fields::MESSAGE), Some("startup complete"));
    }
}
