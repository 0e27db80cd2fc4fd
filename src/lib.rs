//! tv-agent
//!
//! Natural-language control plane for a screen-only Android TV. A free-text
//! command is mapped by an LLM tool-selector onto a static catalog of typed
//! device capabilities; each invocation is validated and executed against
//! the device over one of two interchangeable transports (direct adb, or a
//! session-oriented broker). Stateful actions like "open Netflix as
//! profile 2" run as blind, timed navigation sequences, optionally
//! disambiguated by on-screen text recognition.
//!
//! ## Key components
//!
//! - **Catalog** — static registry of schema-typed capabilities, exposed
//!   verbatim to the tool-selector
//! - **Transports** — [`transport::AdbTransport`] and
//!   [`transport::BrokerTransport`] behind one [`transport::DeviceTransport`]
//!   contract
//! - **Sequencer** — executes data-driven navigation plans with no feedback
//!   channel beyond elapsed time
//! - **Disambiguator** — capture + text recognition resolving a named target
//!   to a navigational offset
//! - **Dispatcher** — ties the above together, one command at a time per
//!   device

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod navigation;
pub mod profile;
pub mod selector;
pub mod transport;
pub mod vision;

pub use catalog::{CapabilityAction, CapabilityDescriptor, Catalog, Invocation, SideEffect};
pub use config::BehaviorConfig;
pub use device::{AppId, Key};
pub use dispatch::{DispatchResponse, Dispatcher, ExecutionResult, Outcome};
pub use error::{Result, TvAgentError};
pub use navigation::{NavOutcome, NavTarget, NavigationPlan, Sequencer, SequencerState};
pub use profile::{MemoryProfileStore, PgProfileStore, ProfileStore, UserPreference};
pub use selector::{OpenAiSelector, RawInvocation, SelectorOutcome, ToolSelector};
pub use transport::{AdbTransport, BrokerTransport, DeviceTransport, Directive};
pub use vision::{DetectedLabel, Disambiguator, TesseractRecognizer, TextRecognizer};
