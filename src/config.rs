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

//! Configuration resolution and the cached settings bag.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

/// Recognized configuration keys.
pub mod keys {
    /// Target store identity. The value `[CURRENT]` means the caller's own store.
    pub const STORE_PATH: &str = "store.path";
    /// Source store to auto-provision the log store from.
    pub const STORE_TEMPLATE_PATH: &str = "store.templatePath";
    /// Debug sink verbosity: 0 silent, 1 message, 2 full trace.
    pub const DEBUG_LEVEL: &str = "debug.level";
    /// Whether to surface a user-facing message.
    pub const DISPLAY_ERROR: &str = "display.error";
    /// When set, replaces all user-facing messages, at most once per request.
    pub const DISPLAY_GENERIC_MESSAGE: &str = "display.genericMessage";
    /// When set, routes records through the mail store instead.
    pub const MAIL_ADDRESS: &str = "mail.address";
    /// Day offset after which persisted records expire.
    pub const LOG_EXPIRE_DAYS: &str = "log.expireDays";
    /// Suppress stack traces on event records.
    pub const EVENT_SUPPRESS_STACK: &str = "event.suppressStack";
    /// Suppress control ids on event messages relayed by host glue.
    pub const EVENT_SUPPRESS_CONTROL_ID: &str = "event.suppressControlId";
    /// Keep the query string on the captured page path.
    pub const AGENT_INCLUDE_QUERY_STRING: &str = "agent.includeQueryString";
}

/// The store path used when none is configured.
pub const DEFAULT_STORE_PATH: &str = "faultlog.db";

/// The special store-path value meaning "use the caller's own store".
pub const CURRENT_STORE: &str = "[CURRENT]";

/// Supplies named string settings with a fallback default.
///
/// Hosts implement this over whatever configuration source they have;
/// [`MapConfig`] is an in-memory implementation for tests and simple
/// embeddings.
pub trait ConfigResolver: std::fmt::Debug {
    /// Get the value for `key`, or `default` if it is not set.
    fn get(&self, key: &str, default: &str) -> String;
}

/// An in-memory, shareable [`ConfigResolver`].
///
/// Clones share the same underlying map, so a host (or a test) can flip a
/// setting after handing the resolver to the logger.
///
/// # Examples
///
/// ```
/// use faultlog::config::ConfigResolver;
/// use faultlog::config::MapConfig;
/// use faultlog::config::keys;
///
/// let config = MapConfig::new();
/// config.set(keys::DEBUG_LEVEL, "0");
/// assert_eq!(config.get(keys::DEBUG_LEVEL, "2"), "0");
/// assert_eq!(config.get(keys::MAIL_ADDRESS, ""), "");
/// ```
#[derive(Clone, Debug, Default)]
pub struct MapConfig {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MapConfig {
    /// Create an empty resolver.
    pub fn new() -> MapConfig {
        MapConfig::default()
    }

    /// Set a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        // a poisoned map must not panic out of the logging path
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), value.into());
    }
}

impl ConfigResolver for MapConfig {
    fn get(&self, key: &str, default: &str) -> String {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned().unwrap_or_else(|| default.to_string())
    }
}

/// Process-context-wide cached copies of resolved configuration values.
///
/// Each value is resolved lazily on first use and memoized. The whole bag is
/// invalidated as a group when the originating store path changes between
/// calls; the logger is reused across requests for different callers within
/// one long-lived process, and stale configuration must not leak across them.
#[derive(Debug, Default)]
pub struct Settings {
    origin_path: Option<String>,

    store_path: Option<String>,
    template_path: Option<String>,
    mail_address: Option<String>,
    expire_days: Option<String>,
    debug_level: Option<u8>,
    display_error: Option<bool>,
    generic_message: Option<String>,
    suppress_event_stack: Option<bool>,
    suppress_event_control_id: Option<bool>,
    include_query_string: Option<bool>,
}

impl Settings {
    /// Create an empty, unresolved bag.
    pub fn new() -> Settings {
        Settings::default()
    }

    /// Record the originating store path for this call, invalidating the
    /// whole bag if it differs from the cached one. Returns whether cached
    /// values were discarded.
    pub fn refresh_for_origin(&mut self, origin_path: &str) -> bool {
        match &self.origin_path {
            Some(known) if known == origin_path => false,
            Some(_) => {
                self.invalidate();
                self.origin_path = Some(origin_path.to_string());
                true
            }
            None => {
                self.origin_path = Some(origin_path.to_string());
                false
            }
        }
    }

    /// The originating store path cached at resolution time.
    pub fn origin_path(&self) -> Option<&str> {
        self.origin_path.as_deref()
    }

    /// Discard every cached value, including the cached origin path.
    pub fn invalidate(&mut self) {
        *self = Settings::default();
    }

    /// The target store path. `[CURRENT]` resolves to `origin_path`.
    pub fn store_path(&mut self, config: &dyn ConfigResolver, origin_path: &str) -> String {
        self.store_path
            .get_or_insert_with(|| {
                let value = config.get(keys::STORE_PATH, DEFAULT_STORE_PATH);
                if value.eq_ignore_ascii_case(CURRENT_STORE) {
                    origin_path.to_string()
                } else {
                    value
                }
            })
            .clone()
    }

    /// The template store path, empty when auto-provisioning is disabled.
    pub fn template_path(&mut self, config: &dyn ConfigResolver) -> String {
        self.template_path
            .get_or_insert_with(|| config.get(keys::STORE_TEMPLATE_PATH, ""))
            .clone()
    }

    /// The mail-routing address, empty when mail routing is disabled.
    pub fn mail_address(&mut self, config: &dyn ConfigResolver) -> String {
        self.mail_address
            .get_or_insert_with(|| config.get(keys::MAIL_ADDRESS, ""))
            .clone()
    }

    /// The raw expiry offset value. Validation happens at composition time so
    /// a bad value degrades instead of failing the write.
    pub fn expire_days(&mut self, config: &dyn ConfigResolver) -> String {
        self.expire_days
            .get_or_insert_with(|| config.get(keys::LOG_EXPIRE_DAYS, ""))
            .clone()
    }

    /// The debug sink verbosity, clamped to 0..=2. Unparseable values fall
    /// back to full verbosity.
    pub fn debug_level(&mut self, config: &dyn ConfigResolver) -> u8 {
        *self.debug_level.get_or_insert_with(|| {
            config
                .get(keys::DEBUG_LEVEL, "2")
                .trim()
                .parse::<u8>()
                .map(|level| level.min(2))
                .unwrap_or(2)
        })
    }

    /// Whether a user-facing message should be surfaced at all.
    pub fn display_error(&mut self, config: &dyn ConfigResolver) -> bool {
        *self.display_error.get_or_insert_with(|| {
            !config
                .get(keys::DISPLAY_ERROR, "true")
                .eq_ignore_ascii_case("false")
        })
    }

    /// The generic substitute for user-facing messages, empty when unset.
    pub fn generic_message(&mut self, config: &dyn ConfigResolver) -> String {
        self.generic_message
            .get_or_insert_with(|| config.get(keys::DISPLAY_GENERIC_MESSAGE, ""))
            .clone()
    }

    /// Whether stack traces are suppressed on event records.
    pub fn suppress_event_stack(&mut self, config: &dyn ConfigResolver) -> bool {
        *self.suppress_event_stack.get_or_insert_with(|| {
            !config
                .get(keys::EVENT_SUPPRESS_STACK, "false")
                .eq_ignore_ascii_case("false")
        })
    }

    /// Whether control ids are suppressed on relayed event messages. Any
    /// non-empty value enables suppression.
    pub fn suppress_event_control_id(&mut self, config: &dyn ConfigResolver) -> bool {
        *self
            .suppress_event_control_id
            .get_or_insert_with(|| !config.get(keys::EVENT_SUPPRESS_CONTROL_ID, "").is_empty())
    }

    /// Whether the captured page path keeps its query string.
    pub fn include_query_string(&mut self, config: &dyn ConfigResolver) -> bool {
        *self.include_query_string.get_or_insert_with(|| {
            config
                .get(keys::AGENT_INCLUDE_QUERY_STRING, "false")
                .eq_ignore_ascii_case("true")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapConfig::new();
        let mut settings = Settings::new();
        assert_eq!(settings.store_path(&config, "crm.db"), DEFAULT_STORE_PATH);
        assert_eq!(settings.debug_level(&config), 2);
        assert!(settings.display_error(&config));
        assert!(!settings.suppress_event_stack(&config));
        assert!(!settings.suppress_event_control_id(&config));
        assert!(!settings.include_query_string(&config));
        assert_eq!(settings.mail_address(&config), "");
        assert_eq!(settings.expire_days(&config), "");
    }

    #[test]
    fn test_current_store_resolves_to_origin() {
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "[current]");
        let mut settings = Settings::new();
        assert_eq!(settings.store_path(&config, "crm.db"), "crm.db");
    }

    #[test]
    fn test_values_memoized_until_invalidated() {
        let config = MapConfig::new();
        config.set(keys::MAIL_ADDRESS, "ops@example.com");
        let mut settings = Settings::new();
        assert_eq!(settings.mail_address(&config), "ops@example.com");

        // changed underneath: the cached copy still wins
        config.set(keys::MAIL_ADDRESS, "later@example.com");
        assert_eq!(settings.mail_address(&config), "ops@example.com");

        settings.invalidate();
        assert_eq!(settings.mail_address(&config), "later@example.com");
    }

    #[test]
    fn test_origin_change_invalidates_wholesale() {
        let config = MapConfig::new();
        let mut settings = Settings::new();
        assert!(!settings.refresh_for_origin("crm.db"));
        settings.mail_address(&config);

        // same origin: nothing discarded
        assert!(!settings.refresh_for_origin("crm.db"));

        config.set(keys::MAIL_ADDRESS, "ops@example.com");
        assert!(settings.refresh_for_origin("billing.db"));
        assert_eq!(settings.origin_path(), Some("billing.db"));
        assert_eq!(settings.mail_address(&config), "ops@example.com");
    }

    #[test]
    fn test_poisoned_map_keeps_working() {
        let config = MapConfig::new();
        config.set(keys::STORE_PATH, "logs.db");

        let poisoner = config.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.values.lock().unwrap();
            panic!("poison the map");
        })
        .join();

        assert_eq!(config.get(keys::STORE_PATH, ""), "logs.db");
        config.set(keys::STORE_PATH, "other.db");
        assert_eq!(config.get(keys::STORE_PATH, ""), "other.db");
    }

    #[test]
    fn test_lenient_flag_parsing() {
        let config = MapConfig::new();
        config.set(keys::DISPLAY_ERROR, "FALSE");
        config.set(keys::EVENT_SUPPRESS_STACK, "yes");
        config.set(keys::EVENT_SUPPRESS_CONTROL_ID, "anything");
        config.set(keys::DEBUG_LEVEL, "abc");
        let mut settings = Settings::new();
        assert!(!settings.display_error(&config));
        assert!(settings.suppress_event_stack(&config));
        assert!(settings.suppress_event_control_id(&config));
        assert_eq!(settings.debug_level(&config), 2);
    }
}
