// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The logger sink is an external collaborator: the core emits progress and
//! diagnostics through it but never depends on sink ordering for
//! correctness, and never owns the sink's lifetime.

/// Severity levels a [`LogSink`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

/// An append-only structured logger sink.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Default sink that forwards to the `log` facade crate. `Critical` has no
/// direct analogue in `log::Level`, so it is emitted at `Error` level with a
/// `critical: true` marker in the message.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Trace => log::trace!("{}", message),
            Severity::Debug => log::debug!("{}", message),
            Severity::Info => log::info!("{}", message),
            Severity::Warn => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
            Severity::Critical => log::error!("[critical] {}", message),
        }
    }
}
