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

//! Fault capture and classification.
//!
//! A [`Fault`] is the normalized form of a raised error handed to the logger
//! by the host application: a type name, an optional message, a category, and
//! the captured call frames. [`classify`] turns a fault into the
//! [`ClassifiedFault`] view the record composer consumes.

use std::error::Error as StdError;
use std::fmt;

use crate::FaultLogError;

/// The module prefix that marks a frame as belonging to this crate.
const SELF_MODULE: &str = env!("CARGO_CRATE_NAME");

/// A single captured call frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    module: String,
    method: String,
    line: u32,
}

impl Frame {
    /// Create a frame from a module path, a method name, and a line number.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultlog::Frame;
    ///
    /// let frame = Frame::new("billing::invoice", "post_total", 88);
    /// assert_eq!(frame.to_string(), "at billing::invoice::post_total (line 88)");
    /// ```
    pub fn new(module: impl Into<String>, method: impl Into<String>, line: u32) -> Frame {
        Frame {
            module: module.into(),
            method: method.into(),
            line,
        }
    }

    /// The module path of the frame.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The method name of the frame.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The source line of the frame.
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}::{} (line {})", self.module, self.method, self.line)
    }
}

/// The closed set of fault categories resolved at classification time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FaultKind {
    /// A fault native to the document store, carrying the store's error code.
    Store { code: i32 },
    /// A wrapped interpretation fault from the host's scripting engine,
    /// carrying the offending expression text.
    ScriptInterpret { expression: String },
    /// Any other fault.
    Generic,
}

/// A raised fault as handed to the logger.
///
/// Hosts build faults explicitly, or capture them from a [`std::error::Error`]
/// with [`Fault::from_error`].
///
/// # Examples
///
/// ```
/// use faultlog::Fault;
/// use faultlog::Frame;
///
/// let fault = Fault::new("billing::PostingError")
///     .message("ledger out of balance")
///     .frame(Frame::new("billing::ledger", "post", 412));
/// ```
#[derive(Clone, Debug)]
pub struct Fault {
    type_name: String,
    message: Option<String>,
    kind: FaultKind,
    frames: Vec<Frame>,
    causes: Vec<String>,
}

impl Fault {
    /// Create a generic fault with the given type name.
    pub fn new(type_name: impl Into<String>) -> Fault {
        Fault {
            type_name: type_name.into(),
            message: None,
            kind: FaultKind::Generic,
            frames: vec![],
            causes: vec![],
        }
    }

    /// Capture a fault from any [`std::error::Error`], walking its cause
    /// chain. No call frames are available through this route; hosts that can
    /// capture them should add [`Fault::frame`]s afterwards.
    pub fn from_error<E>(err: &E) -> Fault
    where
        E: StdError + ?Sized,
    {
        let mut causes = vec![];
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Fault {
            type_name: std::any::type_name::<E>().to_string(),
            message: Some(err.to_string()),
            kind: FaultKind::Generic,
            frames: vec![],
            causes,
        }
    }

    /// Set the fault message.
    pub fn message(mut self, message: impl Into<String>) -> Fault {
        self.message = Some(message.into());
        self
    }

    /// Mark this fault as native to the document store, with its error code.
    pub fn store_native(mut self, code: i32) -> Fault {
        self.kind = FaultKind::Store { code };
        self
    }

    /// Mark this fault as a scripting-engine interpretation fault for the
    /// given expression text.
    pub fn script_interpret(mut self, expression: impl Into<String>) -> Fault {
        self.kind = FaultKind::ScriptInterpret {
            expression: expression.into(),
        };
        self
    }

    /// Append a captured call frame. Frames are ordered innermost first.
    pub fn frame(mut self, frame: Frame) -> Fault {
        self.frames.push(frame);
        self
    }

    /// Append a cause description to the fault's cause chain.
    pub fn cause(mut self, cause: impl Into<String>) -> Fault {
        self.causes.push(cause.into());
        self
    }

    /// The type name of the fault.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The captured call frames, innermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Whether any captured frame names this crate's own modules. Such a
    /// fault was raised by the logger itself while logging, and attempting to
    /// log it again would loop.
    pub fn is_self_referential(&self) -> bool {
        self.frames.iter().any(|frame| {
            frame.module == SELF_MODULE
                || frame
                    .module
                    .strip_prefix(SELF_MODULE)
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }

    /// Render the full captured trace to lines: the headline, then the
    /// frames, then the cause chain.
    fn rendered_trace(&self) -> Vec<String> {
        let headline = match &self.message {
            Some(message) => format!("{}: {}", self.type_name, message),
            None => self.type_name.clone(),
        };
        let mut lines = vec![headline];
        lines.extend(self.frames.iter().map(|frame| frame.to_string()));
        lines.extend(self.causes.iter().map(|cause| format!("Caused by: {cause}")));
        lines
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message),
            None => f.write_str(&self.type_name),
        }
    }
}

/// The innermost originating location of a fault.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Origin {
    /// Module and method of the innermost frame, e.g. `billing::ledger::post`.
    pub location: String,
    /// Source line of the innermost frame.
    pub line: u32,
}

/// The normalized view of a raised fault produced by [`classify`].
#[derive(Clone, Debug, Default)]
pub struct ClassifiedFault {
    /// The message to display and persist.
    pub display_message: String,
    /// The innermost originating location, when frames were captured.
    pub origin: Option<Origin>,
    /// The rendered trace, line by line. Empty when suppressed.
    pub trace_lines: Vec<String>,
    /// The store-native error code, present only for store faults.
    pub native_code: Option<i32>,
}

/// Classify a raised fault into its normalized view.
///
/// `None` produces an empty classification, used for pure events with no
/// causal fault. `skip` drops that many leading trace lines; `want_trace`
/// skips trace rendering entirely (event-stack suppression).
///
/// # Errors
///
/// Returns [`FaultLogError::SelfReferential`] when the fault's frames name
/// this crate itself; the caller must short-circuit to the debug sink instead
/// of logging.
pub fn classify(
    fault: Option<&Fault>,
    skip: usize,
    want_trace: bool,
) -> Result<ClassifiedFault, FaultLogError> {
    let Some(fault) = fault else {
        return Ok(ClassifiedFault::default());
    };

    if fault.is_self_referential() {
        return Err(FaultLogError::SelfReferential);
    }

    let (display_message, native_code) = match &fault.kind {
        FaultKind::Store { code } => (fault.message.clone().unwrap_or_default(), Some(*code)),
        FaultKind::ScriptInterpret { expression } => {
            (format!("Expression Interpretation Error: {expression}"), None)
        }
        FaultKind::Generic => {
            let message = match &fault.message {
                Some(message) if !message.is_empty() => message.clone(),
                _ => fault.type_name.clone(),
            };
            (message, None)
        }
    };

    let origin = fault.frames.first().map(|frame| Origin {
        location: format!("{}::{}", frame.module, frame.method),
        line: frame.line,
    });

    let trace_lines = if want_trace {
        fault
            .rendered_trace()
            .into_iter()
            .skip(skip)
            .map(|line| line.trim().to_string())
            .collect()
    } else {
        vec![]
    };

    Ok(ClassifiedFault {
        display_message,
        origin,
        trace_lines,
        native_code,
    })
}
