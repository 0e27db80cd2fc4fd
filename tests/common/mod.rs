//! Shared fakes: a transport that records every directive instead of
//! touching a device, a scripted selector, and a canned recognizer.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use tv_agent::config::BehaviorConfig;
use tv_agent::error::{Result, TvAgentError};
use tv_agent::selector::SelectorOutcome;
use tv_agent::transport::{DeviceTransport, Directive};
use tv_agent::vision::{DetectedLabel, TextRecognizer};
use tv_agent::{Catalog, ToolSelector};

#[derive(Debug, Clone, Copy)]
pub enum FailKind {
    Timeout,
    Connection,
}

#[derive(Default)]
pub struct FakeTransport {
    log: Mutex<Vec<Directive>>,
    calls: Mutex<usize>,
    /// Fail the Nth send (1-based) with the given kind; later sends succeed.
    fail_on: Mutex<Option<(usize, FailKind)>>,
    foreground: Mutex<Option<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_send(&self, nth: usize, kind: FailKind) {
        *self.fail_on.lock().unwrap() = Some((nth, kind));
    }

    pub fn set_foreground(&self, output: &str) {
        *self.foreground.lock().unwrap() = Some(output.to_string());
    }

    pub fn sent(&self) -> Vec<Directive> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceTransport for FakeTransport {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, directive: &Directive, wants_output: bool) -> Result<Option<String>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if let Some((nth, kind)) = *self.fail_on.lock().unwrap() {
            if call == nth {
                return Err(match kind {
                    FailKind::Timeout => TvAgentError::Timeout(Duration::from_secs(5)),
                    FailKind::Connection => {
                        TvAgentError::Connection("link dropped".to_string())
                    }
                });
            }
        }
        self.log.lock().unwrap().push(directive.clone());
        if wants_output && matches!(directive, Directive::ForegroundQuery) {
            return Ok(self.foreground.lock().unwrap().clone());
        }
        Ok(None)
    }

    async fn capture_screen(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    fn label(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeSelector {
    outcome: Mutex<std::result::Result<SelectorOutcome, String>>,
}

impl FakeSelector {
    pub fn returning(outcome: SelectorOutcome) -> Self {
        Self {
            outcome: Mutex::new(Ok(outcome)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Mutex::new(Err(message.to_string())),
        }
    }
}

#[async_trait]
impl ToolSelector for FakeSelector {
    async fn select(
        &self,
        _command: &str,
        _catalog: &Catalog,
        _preference_hint: Option<&str>,
    ) -> Result<SelectorOutcome> {
        match &*self.outcome.lock().unwrap() {
            Ok(outcome) => Ok(outcome.clone()),
            Err(message) => Err(TvAgentError::Selector(message.clone())),
        }
    }
}

pub struct FakeRecognizer {
    labels: Vec<DetectedLabel>,
}

impl FakeRecognizer {
    pub fn with_names(names: &[&str]) -> Self {
        let labels = names
            .iter()
            .enumerate()
            .map(|(i, name)| DetectedLabel {
                text: name.to_string(),
                x: 300 + i as u32 * 200,
                y: 640,
                confidence: 95.0,
            })
            .collect();
        Self { labels }
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<Vec<DetectedLabel>> {
        Ok(self.labels.clone())
    }
}

/// Behavior config with every delay zeroed so sequences run instantly.
pub fn quiet_config() -> BehaviorConfig {
    let mut config = BehaviorConfig::default();
    config.timing.volume_inter_delay_ms = 0;
    config.timing.navigate_inter_delay_ms = 0;
    config.timing.seek_inter_delay_ms = 0;
    config.timing.seek_confirm_delay_ms = 0;
    config.netflix.load_settle_ms = 0;
    config.netflix.step_delay_ms = 0;
    config.netflix.pin_prompt_delay_ms = 0;
    config.netflix.pin_digit_delay_ms = 0;
    config.netflix.final_settle_ms = 0;
    config.youtube.load_settle_ms = 0;
    config.youtube.sidebar_settle_ms = 0;
    config.youtube.reference_move_delay_ms = 0;
    config.youtube.step_delay_ms = 0;
    config.youtube.final_settle_ms = 0;
    config
}
