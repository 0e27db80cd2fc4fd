//! Navigation sequencer: multi-step, timed UI traversals executed blind,
//! with elapsed-time waits standing in for on-screen state. A sequence is
//! data — a plan of typed steps with declared delays — so it can be executed
//! against a fake transport and asserted on, not inline control flow.
//!
//! Because there is no feedback channel, every plan first drives the cursor
//! to a documented reference position (e.g. "focus defaults to the first
//! profile on menu open") so that repeat-count math is deterministic.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::catalog::clamp;
use crate::config::{NetflixNavConfig, YoutubeNavConfig};
use crate::device::{AppId, Key};
use crate::error::Result;
use crate::transport::{DeviceTransport, Directive};
use crate::vision::{Disambiguator, TextRecognizer};

/// What the sequence is steering toward: a known position, or a label that
/// must first be resolved on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum NavTarget {
    Index(i64),
    Label(String),
}

/// A block of identical cursor moves with a per-press delay.
#[derive(Debug, Clone)]
pub struct MoveBlock {
    pub key: Key,
    pub times: u32,
    pub delay: Duration,
}

/// A complete blind-traversal plan for one stateful capability.
#[derive(Debug, Clone)]
pub struct NavigationPlan {
    pub app: AppId,
    pub load_settle: Duration,
    /// Moves that drive the cursor to the documented reference position.
    pub reference_moves: Vec<MoveBlock>,
    /// Key that advances one slot from the reference position.
    pub step_key: Key,
    pub step_delay: Duration,
    pub max_slots: u32,
    pub target: NavTarget,
    pub pin: Option<String>,
    pub pin_prompt_delay: Duration,
    pub pin_digit_delay: Duration,
    pub final_settle: Duration,
}

impl NavigationPlan {
    /// Netflix profile gate: focus defaults to the first profile on menu
    /// open, so the reference position needs no moves; step down to the
    /// target, select, then enter the PIN (auto-confirmed after the last
    /// digit) if one is configured.
    pub fn netflix_profile(
        index: i64,
        pin: Option<String>,
        config: &NetflixNavConfig,
    ) -> Self {
        Self {
            app: AppId::Netflix,
            load_settle: Duration::from_millis(config.load_settle_ms),
            reference_moves: Vec::new(),
            step_key: Key::Down,
            step_delay: Duration::from_millis(config.step_delay_ms),
            max_slots: config.max_slots,
            target: NavTarget::Index(index),
            pin: pin.filter(|p| !p.is_empty()),
            pin_prompt_delay: Duration::from_millis(config.pin_prompt_delay_ms),
            pin_digit_delay: Duration::from_millis(config.pin_digit_delay_ms),
            final_settle: Duration::from_millis(config.final_settle_ms),
        }
    }

    /// YouTube account strip: enter the sidebar, press Up enough times to
    /// guarantee the cursor is at the top, then Right onto the first
    /// account — the reference position — and step right to the target.
    pub fn youtube_account(target: NavTarget, config: &YoutubeNavConfig) -> Self {
        let sidebar_delay = Duration::from_millis(config.sidebar_settle_ms);
        let reference_delay = Duration::from_millis(config.reference_move_delay_ms);
        Self {
            app: AppId::YouTube,
            load_settle: Duration::from_millis(config.load_settle_ms),
            reference_moves: vec![
                MoveBlock {
                    key: Key::Left,
                    times: 1,
                    delay: sidebar_delay,
                },
                MoveBlock {
                    key: Key::Up,
                    times: config.reference_up_presses,
                    delay: reference_delay,
                },
                MoveBlock {
                    key: Key::Right,
                    times: 1,
                    delay: sidebar_delay,
                },
            ],
            step_key: Key::Right,
            step_delay: Duration::from_millis(config.step_delay_ms),
            max_slots: config.max_slots,
            target,
            pin: None,
            pin_prompt_delay: Duration::ZERO,
            pin_digit_delay: Duration::ZERO,
            final_settle: Duration::from_millis(config.final_settle_ms),
        }
    }

    /// Clamp a requested slot to the addressable range. Targets at or below
    /// zero mean the reference position itself; targets past the documented
    /// slot count clamp to the last slot rather than overshooting blind.
    pub fn effective_index(&self, requested: i64) -> u32 {
        clamp(requested, 1, self.max_slots as i64) as u32
    }
}

/// Sequencer states. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SequencerState {
    Idle,
    Launching,
    AwaitingLoad,
    PositioningCursor,
    SteppingToTarget,
    Confirming,
    PinEntry,
    Settled,
    Done,
    Failed,
}

/// Terminal outcome of one sequence run. Transport errors never escape the
/// sequencer; they become a `Failed` outcome describing what completed.
#[derive(Debug, Clone)]
pub struct NavOutcome {
    pub state: SequencerState,
    /// True when the target label was not found and the sequence fell back
    /// to confirming whatever had focus.
    pub partial: bool,
    pub resolved_index: Option<u32>,
    pub message: String,
    pub detected_labels: Option<Vec<String>>,
}

impl NavOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == SequencerState::Done && !self.partial
    }
}

struct Progress {
    state: SequencerState,
    directives: u32,
}

pub struct Sequencer {
    transport: Arc<dyn DeviceTransport>,
    disambiguator: Option<Disambiguator>,
}

impl Sequencer {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Self {
        let disambiguator =
            recognizer.map(|r| Disambiguator::new(Arc::clone(&transport), r));
        Self {
            transport,
            disambiguator,
        }
    }

    /// Execute a plan to completion or to the first transport failure.
    /// There is no cooperative cancellation: once started, remaining steps
    /// run until the sequence settles or a directive fails.
    pub async fn run(&self, plan: &NavigationPlan) -> NavOutcome {
        let mut progress = Progress {
            state: SequencerState::Idle,
            directives: 0,
        };
        match self.drive(plan, &mut progress).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(app = plan.app.display_name(), state = ?progress.state, error = %err, "navigation sequence aborted");
                NavOutcome {
                    state: SequencerState::Failed,
                    partial: false,
                    resolved_index: None,
                    message: format!(
                        "{} sequence aborted in {:?} after {} directives: {err}",
                        plan.app.display_name(),
                        progress.state,
                        progress.directives
                    ),
                    detected_labels: None,
                }
            }
        }
    }

    async fn drive(&self, plan: &NavigationPlan, progress: &mut Progress) -> Result<NavOutcome> {
        progress.state = SequencerState::Launching;
        self.send(&Directive::LaunchApp(plan.app), progress).await?;

        progress.state = SequencerState::AwaitingLoad;
        sleep(plan.load_settle).await;

        // Resolve a label target to a slot before any cursor movement; the
        // labels were captured on this screen and are discarded after this
        // one decision.
        let (index, labels) = match &plan.target {
            NavTarget::Index(requested) => (Some(plan.effective_index(*requested)), None),
            NavTarget::Label(name) => match &self.disambiguator {
                Some(disambiguator) => {
                    let resolution = disambiguator.resolve(name).await?;
                    let index = resolution
                        .position
                        .map(|p| plan.effective_index(p as i64));
                    if index.is_none() {
                        warn!(label = %name, seen = ?resolution.labels, "target label not on screen, confirming current focus");
                    }
                    (index, Some(resolution.labels))
                }
                None => {
                    warn!(label = %name, "no recognizer configured, confirming current focus");
                    (None, None)
                }
            },
        };

        progress.state = SequencerState::PositioningCursor;
        for block in &plan.reference_moves {
            self.send_moves(block.key, block.times, block.delay, progress)
                .await?;
        }

        if let Some(index) = index {
            progress.state = SequencerState::SteppingToTarget;
            self.send_moves(plan.step_key, index - 1, plan.step_delay, progress)
                .await?;
        }

        progress.state = SequencerState::Confirming;
        self.send(&Directive::KeyPress(Key::Ok), progress).await?;

        if let Some(pin) = &plan.pin {
            progress.state = SequencerState::PinEntry;
            sleep(plan.pin_prompt_delay).await;
            for digit in pin.chars() {
                let Some(key) = Key::for_digit(digit) else {
                    warn!("skipping non-digit PIN character");
                    continue;
                };
                self.send(&Directive::KeyPress(key), progress).await?;
                sleep(plan.pin_digit_delay).await;
            }
            // The PIN gate auto-confirms after the last digit.
        }

        progress.state = SequencerState::Settled;
        sleep(plan.final_settle).await;

        progress.state = SequencerState::Done;
        let outcome = match (index, &plan.target) {
            (Some(index), _) => {
                info!(app = plan.app.display_name(), index, "navigation sequence settled");
                NavOutcome {
                    state: SequencerState::Done,
                    partial: false,
                    resolved_index: Some(index),
                    message: match plan.app {
                        AppId::Netflix => {
                            format!("launched Netflix and selected profile {index}")
                        }
                        AppId::YouTube => {
                            format!("launched YouTube and switched to account {index}")
                        }
                    },
                    detected_labels: labels,
                }
            }
            (None, NavTarget::Label(name)) => {
                let not_found = crate::error::TvAgentError::NavigationTargetNotFound {
                    target: name.clone(),
                    seen: labels.clone().unwrap_or_default(),
                };
                NavOutcome {
                    state: SequencerState::Done,
                    partial: true,
                    resolved_index: None,
                    message: format!("{not_found}; confirmed the focused item instead"),
                    detected_labels: labels,
                }
            }
            // Index targets always resolve; this arm is unreachable but
            // keeps the match total.
            (None, NavTarget::Index(_)) => NavOutcome {
                state: SequencerState::Done,
                partial: true,
                resolved_index: None,
                message: "confirmed the focused item".to_string(),
                detected_labels: labels,
            },
        };
        Ok(outcome)
    }

    async fn send(&self, directive: &Directive, progress: &mut Progress) -> Result<()> {
        self.transport.send(directive, false).await?;
        progress.directives += 1;
        Ok(())
    }

    async fn send_moves(
        &self,
        key: Key,
        times: u32,
        delay: Duration,
        progress: &mut Progress,
    ) -> Result<()> {
        for _ in 0..times {
            self.send(&Directive::KeyPress(key), progress).await?;
            sleep(delay).await;
        }
        Ok(())
    }
}
