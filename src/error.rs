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

/// Failure categories internal to the fault-capture pipeline.
///
/// None of these ever propagate out of the public entry points; they are
/// consumed by the debug sink and folded into the success/failure signal.
#[derive(Debug, thiserror::Error)]
pub enum FaultLogError {
    #[error("fault trace contains a frame inside the logger itself; refusing to log it")]
    SelfReferential,
    #[error("no usable log store: {0}")]
    StoreUnavailable(String),
    #[error("ambient context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("unknown severity name: {0}")]
    UnknownSeverity(String),
}
