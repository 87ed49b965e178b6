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

//! Faultlog is a diagnostic-capture facility: given a raised fault or a
//! notable application event, it assembles a structured diagnostic record
//! (actor, location, severity, stack context, associated business record) and
//! durably persists it to a log store, degrading gracefully when the store or
//! the ambient execution context is unavailable.
//!
//! # Overview
//!
//! Faultlog is built for the low-frequency, must-not-fail logging path: the
//! entry points on [`FaultLogger`] never raise, internal failures are
//! absorbed and reported through a best-effort [`DebugSink`], and handles to
//! externally-owned resources (sessions, stores) are probed for liveness and
//! transparently reacquired when the host revokes them. The target store is
//! auto-provisioned from a configured template when it does not exist, and
//! records can be routed through a mail store instead.
//!
//! Hosts plug in by implementing [`host::Environment`] over their runtime and
//! [`config::ConfigResolver`] over their configuration source. Two store
//! backends ship with the crate: an in-memory one for tests and embeddings,
//! and a JSON-lines file store behind the `json-file` feature.
//!
//! # Examples
//!
//! Capture a fault into an in-memory store:
//!
//! ```
//! use faultlog::Fault;
//! use faultlog::FaultLogger;
//! use faultlog::Frame;
//! use faultlog::config::MapConfig;
//! use faultlog::store::memory::MemoryEnvironment;
//!
//! let env = MemoryEnvironment::new();
//! env.add_store("faultlog.db");
//!
//! let mut logger = FaultLogger::new(env.clone(), MapConfig::new());
//! let fault = Fault::new("billing::PostingError")
//!     .message("ledger out of balance")
//!     .frame(Frame::new("billing::ledger", "post", 412));
//!
//! assert_eq!(logger.log_fault(&fault), "ledger out of balance");
//! assert_eq!(env.records("faultlog.db").len(), 1);
//! ```
//!
//! Record an application event with an explicit severity:
//!
//! ```
//! use faultlog::FaultLogger;
//! use faultlog::Severity;
//! use faultlog::config::MapConfig;
//! use faultlog::store::memory::MemoryEnvironment;
//!
//! let env = MemoryEnvironment::new();
//! env.add_store("faultlog.db");
//!
//! let mut logger = FaultLogger::new(env.clone(), MapConfig::new());
//! logger.log_event(None, "startup complete", Some(Severity::Info), None);
//! assert!(logger.last_write_ok());
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod context;
pub mod debug;
pub mod error;
pub mod fault;
pub mod host;
pub mod record;
pub mod severity;
pub mod store;

mod compose;
mod writer;

mod logger;

pub use debug::DebugLevel;
pub use debug::DebugSink;
pub use error::FaultLogError;
pub use fault::ClassifiedFault;
pub use fault::Fault;
pub use fault::FaultKind;
pub use fault::Frame;
pub use fault::Origin;
pub use fault::classify;
pub use logger::FaultLogger;
pub use record::DiagnosticRecord;
pub use record::LinkedRef;
pub use record::LinkedTarget;
pub use severity::EventKind;
pub use severity::Severity;
