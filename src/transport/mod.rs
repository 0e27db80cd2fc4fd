//! Device transports: one contract, two interchangeable implementations.
//!
//! A [`Directive`] is a single low-level device instruction. The direct
//! transport translates it to an adb invocation against a fixed device
//! address; the broker transport forwards it as a named RPC over a
//! session-oriented channel. Both must tolerate directives that produce no
//! output and must surface timeouts distinctly from connection failures.

use async_trait::async_trait;

use crate::device::{AppId, Key};
use crate::error::Result;

pub mod adb;
pub mod broker;

pub use adb::AdbTransport;
pub use broker::BrokerTransport;

/// A single low-level device instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    KeyPress(Key),
    LaunchApp(AppId),
    StopApp(AppId),
    /// Open a URI via a view intent, optionally pinned to a package.
    ViewUri {
        uri: String,
        package: Option<&'static str>,
    },
    /// Switch to an HDMI input port.
    InputSource { hdmi: u8 },
    /// Type text into the focused field.
    InputText(String),
    /// Query which app owns the foreground window. Produces output.
    ForegroundQuery,
}

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Check-then-connect (direct) or initialize the session (broker).
    /// Called once at the start of each dispatch cycle; cheap when the
    /// link is already up.
    async fn ensure_ready(&self) -> Result<()>;

    /// Send one directive. `wants_output` requests captured text; directives
    /// that produce none return `Ok(None)` either way.
    async fn send(&self, directive: &Directive, wants_output: bool) -> Result<Option<String>>;

    /// Capture the screen as encoded image bytes.
    async fn capture_screen(&self) -> Result<Vec<u8>>;

    /// Short label for logs.
    fn label(&self) -> &'static str;
}
