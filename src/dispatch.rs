//! Command dispatcher: free text in, ordered execution results out.
//!
//! The selector maps the text onto catalog entries; each returned invocation
//! is validated, then executed — plain capabilities go straight to the
//! transport, stateful profile switches go through the navigation sequencer.
//! A per-device admission mutex serializes whole dispatches, so two
//! concurrent commands cannot interleave their directives.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::catalog::{clamp, CapabilityAction, Catalog, Invocation};
use crate::config::BehaviorConfig;
use crate::device::{AppId, Key, LAUNCHER_PACKAGE};
use crate::error::{Result, TvAgentError};
use crate::navigation::{NavOutcome, NavTarget, NavigationPlan, Sequencer, SequencerState};
use crate::profile::UserPreference;
use crate::selector::{RawInvocation, ToolSelector};
use crate::transport::{DeviceTransport, Directive};
use crate::vision::TextRecognizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

/// One capability's outcome. Immutable once created; actions already sent to
/// the device cannot be undone, so failures never roll earlier results back.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub capability: String,
    pub arguments: Value,
    pub outcome: Outcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ExecutionResult {
    fn failure(capability: &str, arguments: Value, message: String) -> Self {
        Self {
            capability: capability.to_string(),
            arguments,
            outcome: Outcome::Failure,
            message,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<ExecutionResult>,
}

impl DispatchResponse {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            results: Vec::new(),
        }
    }
}

pub struct Dispatcher {
    catalog: Arc<Catalog>,
    transport: Arc<dyn DeviceTransport>,
    selector: Arc<dyn ToolSelector>,
    sequencer: Sequencer,
    config: Arc<BehaviorConfig>,
    /// Admission lock: one command at a time per device.
    admission: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<Catalog>,
        transport: Arc<dyn DeviceTransport>,
        selector: Arc<dyn ToolSelector>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
        config: Arc<BehaviorConfig>,
    ) -> Self {
        let sequencer = Sequencer::new(Arc::clone(&transport), recognizer);
        Self {
            catalog,
            transport,
            selector,
            sequencer,
            config,
            admission: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Process one command to completion. Always returns a response; selector
    /// failures fail the whole command before any side effect, while
    /// per-invocation failures are folded into the result list.
    pub async fn dispatch(
        &self,
        text: &str,
        preference: Option<&UserPreference>,
    ) -> DispatchResponse {
        let hint = preference.map(preference_hint);
        let selected = match self
            .selector
            .select(text, &self.catalog, hint.as_deref())
            .await
        {
            Ok(selected) => selected,
            Err(err) => {
                warn!(error = %err, "tool selector failed");
                return DispatchResponse::failed(err.to_string());
            }
        };

        if selected.invocations.is_empty() {
            let message = selected
                .reply
                .unwrap_or_else(|| "no action taken".to_string());
            return DispatchResponse {
                success: true,
                message,
                results: Vec::new(),
            };
        }

        let _admission = self.admission.lock().await;

        if let Err(err) = self.transport.ensure_ready().await {
            return DispatchResponse::failed(format!("device not reachable: {err}"));
        }

        let mut results = Vec::with_capacity(selected.invocations.len());
        for raw in &selected.invocations {
            // A failed invocation does not stop the ones queued after it.
            results.push(self.execute_raw(raw, preference).await);
        }

        let success = results.iter().all(|r| r.outcome == Outcome::Success);
        let message = results
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        info!(results = results.len(), success, "command dispatched");
        DispatchResponse {
            success,
            message,
            results,
        }
    }

    async fn execute_raw(
        &self,
        raw: &RawInvocation,
        preference: Option<&UserPreference>,
    ) -> ExecutionResult {
        // Unknown names are rejected here, never forwarded to the transport.
        let Some(descriptor) = self.catalog.resolve(&raw.name) else {
            let err = TvAgentError::CapabilityNotFound(raw.name.clone());
            warn!(capability = %raw.name, "selector named an unknown capability");
            return ExecutionResult::failure(&raw.name, raw.arguments.clone(), err.to_string());
        };

        let invocation = match descriptor.validate(&raw.arguments) {
            Ok(invocation) => invocation,
            Err(err) => {
                return ExecutionResult::failure(&raw.name, raw.arguments.clone(), err.to_string())
            }
        };

        self.execute(&invocation, preference).await
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        preference: Option<&UserPreference>,
    ) -> ExecutionResult {
        let arguments = Value::Object(invocation.args.clone());

        // Stateful profile switches, and plain launches upgraded by a stored
        // preference, run through the sequencer.
        if let Some(plan) = self.navigation_plan(invocation, preference) {
            let outcome = self.sequencer.run(&plan).await;
            return self.fold_navigation(invocation, arguments, outcome);
        }

        match self.execute_plain(invocation).await {
            Ok((message, detail)) => ExecutionResult {
                capability: invocation.capability.to_string(),
                arguments,
                outcome: Outcome::Success,
                message,
                detail,
            },
            Err(err) => ExecutionResult::failure(invocation.capability, arguments, err.to_string()),
        }
    }

    /// Decide whether this invocation needs a navigation sequence, and build
    /// its plan. Explicit arguments win over stored preferences.
    fn navigation_plan(
        &self,
        invocation: &Invocation,
        preference: Option<&UserPreference>,
    ) -> Option<NavigationPlan> {
        match invocation.action {
            CapabilityAction::SelectProfile(AppId::Netflix) => {
                let index = invocation.opt_int_arg("profile_index").unwrap_or(1);
                let pin = preference.and_then(|p| p.netflix_pin.clone());
                Some(NavigationPlan::netflix_profile(
                    index,
                    pin,
                    &self.config.netflix,
                ))
            }
            CapabilityAction::SelectProfile(AppId::YouTube) => {
                let target = match invocation.opt_str_arg("account_name") {
                    Some(name) => NavTarget::Label(name.to_string()),
                    None => NavTarget::Index(invocation.opt_int_arg("account_index").unwrap_or(1)),
                };
                Some(NavigationPlan::youtube_account(target, &self.config.youtube))
            }
            CapabilityAction::Launch(AppId::Netflix) => {
                let preference = preference?;
                Some(NavigationPlan::netflix_profile(
                    preference.netflix_profile_index as i64,
                    preference.netflix_pin.clone(),
                    &self.config.netflix,
                ))
            }
            CapabilityAction::Launch(AppId::YouTube) => {
                let preference = preference?;
                let target = match (
                    &preference.youtube_account_name,
                    preference.youtube_account_index,
                ) {
                    (Some(name), _) => NavTarget::Label(name.clone()),
                    (None, Some(index)) => NavTarget::Index(index as i64),
                    (None, None) => return None,
                };
                Some(NavigationPlan::youtube_account(target, &self.config.youtube))
            }
            _ => None,
        }
    }

    fn fold_navigation(
        &self,
        invocation: &Invocation,
        arguments: Value,
        outcome: NavOutcome,
    ) -> ExecutionResult {
        let detail = outcome
            .detected_labels
            .as_ref()
            .map(|labels| json!({ "detected_labels": labels }));
        let result_outcome = if outcome.state == SequencerState::Failed {
            Outcome::Failure
        } else if outcome.partial {
            Outcome::Partial
        } else {
            Outcome::Success
        };
        ExecutionResult {
            capability: invocation.capability.to_string(),
            arguments,
            outcome: result_outcome,
            message: outcome.message,
            detail,
        }
    }

    async fn execute_plain(&self, invocation: &Invocation) -> Result<(String, Option<Value>)> {
        let timing = &self.config.timing;
        match invocation.action {
            CapabilityAction::Remote => {
                let name = invocation.str_arg("key")?;
                let key = Key::parse(name).ok_or_else(|| TvAgentError::InvalidArguments {
                    capability: invocation.capability.to_string(),
                    details: format!("unknown key `{name}`"),
                })?;
                self.transport.send(&Directive::KeyPress(key), false).await?;
                Ok((format!("pressed {name}"), None))
            }
            CapabilityAction::Navigate => {
                let direction = invocation.str_arg("direction")?;
                let key = Key::for_direction(direction).ok_or_else(|| {
                    TvAgentError::InvalidArguments {
                        capability: invocation.capability.to_string(),
                        details: format!("unknown direction `{direction}`"),
                    }
                })?;
                let steps = invocation.int_arg("steps")?;
                self.press_repeatedly(key, steps, timing.navigate_inter_delay_ms)
                    .await?;
                Ok((format!("moved {direction} {steps} steps"), None))
            }
            CapabilityAction::Volume => {
                let action = invocation.str_arg("action")?;
                if action == "mute" {
                    self.transport
                        .send(&Directive::KeyPress(Key::VolumeMute), false)
                        .await?;
                    return Ok(("volume mute toggled".to_string(), None));
                }
                let steps = invocation.int_arg("steps")?;
                let key = if action == "up" {
                    Key::VolumeUp
                } else {
                    Key::VolumeDown
                };
                self.press_repeatedly(key, steps, timing.volume_inter_delay_ms)
                    .await?;
                let verb = if action == "up" { "increased" } else { "decreased" };
                Ok((format!("volume {verb} by {steps}"), None))
            }
            CapabilityAction::Power => {
                let action = invocation.str_arg("action")?;
                let key = match action {
                    "on" => Key::Wakeup,
                    "off" => Key::Sleep,
                    _ => Key::Power,
                };
                self.transport.send(&Directive::KeyPress(key), false).await?;
                Ok((format!("power {action}"), None))
            }
            CapabilityAction::InputSource => {
                let hdmi = invocation.int_arg("hdmi")? as u8;
                self.transport
                    .send(&Directive::InputSource { hdmi }, false)
                    .await?;
                Ok((format!("switched to HDMI {hdmi}"), None))
            }
            CapabilityAction::PlayPause => {
                self.transport
                    .send(&Directive::KeyPress(Key::PlayPause), false)
                    .await?;
                Ok(("toggled play/pause".to_string(), None))
            }
            CapabilityAction::Seek { forward } => {
                let app = self.app_arg(invocation)?;
                let seconds = invocation.int_arg("seconds")?;
                // One press per ten seconds; the confirming Ok commits it.
                let presses = clamp(seconds / 10, 1, 6);
                let key = match (app, forward) {
                    (AppId::YouTube, true) => Key::FastForward,
                    (AppId::YouTube, false) => Key::Rewind,
                    (AppId::Netflix, true) => Key::Right,
                    (AppId::Netflix, false) => Key::Left,
                };
                self.press_repeatedly(key, presses, timing.seek_inter_delay_ms)
                    .await?;
                sleep(Duration::from_millis(timing.seek_confirm_delay_ms)).await;
                self.transport.send(&Directive::KeyPress(Key::Ok), false).await?;
                let verb = if forward { "skipped ahead" } else { "rewound" };
                Ok((
                    format!("{} {verb} {} seconds", app.display_name(), presses * 10),
                    None,
                ))
            }
            CapabilityAction::StopPlayback => {
                self.transport
                    .send(&Directive::KeyPress(Key::Stop), false)
                    .await?;
                Ok(("stopped playback".to_string(), None))
            }
            CapabilityAction::Launch(app) => {
                self.transport.send(&Directive::LaunchApp(app), false).await?;
                Ok((format!("launched {}", app.display_name()), None))
            }
            CapabilityAction::Close(app) => {
                self.transport.send(&Directive::StopApp(app), false).await?;
                Ok((format!("closed {}", app.display_name()), None))
            }
            CapabilityAction::Search(app) => {
                let query = invocation.str_arg("query")?;
                let encoded = encode_query(query);
                let uri = match app {
                    AppId::YouTube => {
                        format!("https://www.youtube.com/results?search_query={encoded}")
                    }
                    AppId::Netflix => format!("https://www.netflix.com/search?q={encoded}"),
                };
                self.view_uri(uri, app).await?;
                Ok((
                    format!("searching {} for \"{query}\"", app.display_name()),
                    None,
                ))
            }
            CapabilityAction::PlayYoutubeVideo => {
                let video_id = invocation.str_arg("video_id")?;
                self.view_uri(
                    format!("https://www.youtube.com/watch?v={video_id}"),
                    AppId::YouTube,
                )
                .await?;
                Ok((format!("playing video {video_id}"), None))
            }
            CapabilityAction::OpenYoutubeChannel => {
                let channel = invocation.str_arg("channel")?;
                let uri = if channel.starts_with("UC") {
                    format!("https://www.youtube.com/channel/{channel}")
                } else if channel.starts_with('@') {
                    format!("https://www.youtube.com/{channel}")
                } else {
                    format!("https://www.youtube.com/@{channel}")
                };
                self.view_uri(uri, AppId::YouTube).await?;
                Ok((format!("opened channel {channel}"), None))
            }
            CapabilityAction::PlayNetflixTitle => {
                let title_id = invocation.str_arg("title_id")?;
                self.view_uri(
                    format!("https://www.netflix.com/title/{title_id}"),
                    AppId::Netflix,
                )
                .await?;
                Ok((format!("playing title {title_id}"), None))
            }
            CapabilityAction::OpenPage(app) => {
                let page = invocation.str_arg("page")?;
                let url = crate::device::page_url(app, page).ok_or_else(|| {
                    TvAgentError::InvalidArguments {
                        capability: invocation.capability.to_string(),
                        details: format!("{} has no page `{page}`", app.display_name()),
                    }
                })?;
                self.view_uri(url.to_string(), app).await?;
                Ok((format!("opened {} {page}", app.display_name()), None))
            }
            CapabilityAction::Screenshot => {
                let image = self.transport.capture_screen().await?;
                Ok((
                    format!("captured screen ({} bytes)", image.len()),
                    Some(json!({ "bytes": image.len() })),
                ))
            }
            CapabilityAction::InputText => {
                let text = invocation.str_arg("text")?;
                self.transport
                    .send(&Directive::InputText(text.to_string()), false)
                    .await?;
                Ok((format!("typed \"{text}\""), None))
            }
            CapabilityAction::CurrentApp => {
                let output = self
                    .transport
                    .send(&Directive::ForegroundQuery, true)
                    .await?;
                let message = match output.as_deref().and_then(parse_foreground_package) {
                    Some(package) => {
                        let name = match AppId::from_package(&package) {
                            Some(app) => app.display_name().to_string(),
                            None if package == LAUNCHER_PACKAGE => "Home".to_string(),
                            None => package,
                        };
                        format!("current app: {name}")
                    }
                    None => "unable to determine the foreground app".to_string(),
                };
                Ok((message, None))
            }
            CapabilityAction::SelectProfile(_) => unreachable!("handled by navigation_plan"),
        }
    }

    fn app_arg(&self, invocation: &Invocation) -> Result<AppId> {
        let name = invocation.str_arg("app")?;
        AppId::parse(name).ok_or_else(|| TvAgentError::InvalidArguments {
            capability: invocation.capability.to_string(),
            details: format!("unknown app `{name}`"),
        })
    }

    async fn press_repeatedly(&self, key: Key, times: i64, inter_delay_ms: u64) -> Result<()> {
        for _ in 0..times {
            self.transport.send(&Directive::KeyPress(key), false).await?;
            sleep(Duration::from_millis(inter_delay_ms)).await;
        }
        Ok(())
    }

    async fn view_uri(&self, uri: String, app: AppId) -> Result<()> {
        self.transport
            .send(
                &Directive::ViewUri {
                    uri,
                    package: Some(app.package()),
                },
                false,
            )
            .await?;
        Ok(())
    }
}

/// Natural-language summary of the stored preferences, folded into the
/// selector's system directive.
fn preference_hint(preference: &UserPreference) -> String {
    let mut hint = format!(
        "The user's stored Netflix profile is #{}{}.",
        preference.netflix_profile_index,
        if preference.netflix_pin.is_some() {
            " (a PIN is configured)"
        } else {
            ""
        }
    );
    match (
        &preference.youtube_account_name,
        preference.youtube_account_index,
    ) {
        (Some(name), _) => hint.push_str(&format!(
            " Their YouTube account is named \"{name}\"."
        )),
        (None, Some(index)) => {
            hint.push_str(&format!(" Their YouTube account is #{index}."))
        }
        (None, None) => {}
    }
    hint
}

/// application/x-www-form-urlencoded query encoding (spaces become `+`).
fn encode_query(query: &str) -> String {
    form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

/// Pull the focused package out of `dumpsys window` output, e.g.
/// `mCurrentFocus=Window{abc u0 com.netflix.ninja/com.netflix.ninja.MainActivity}`.
fn parse_foreground_package(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains("mCurrentFocus"))?;
    let token = line
        .split_whitespace()
        .find(|t| t.contains('/') && !t.contains("://"))?;
    let package = token.split('/').next()?;
    let package: String = package
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
        .collect();
    if package.contains('.') {
        Some(package)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_package_parses_dumpsys_focus_line() {
        let output = "mCurrentFocus=Window{1a2b3c u0 com.netflix.ninja/com.netflix.ninja.MainActivity}";
        assert_eq!(
            parse_foreground_package(output).as_deref(),
            Some("com.netflix.ninja")
        );
    }

    #[test]
    fn foreground_package_rejects_garbage() {
        assert_eq!(parse_foreground_package(""), None);
        assert_eq!(parse_foreground_package("mCurrentFocus=null"), None);
    }

    #[test]
    fn preference_hint_names_stored_slots() {
        let hint = preference_hint(&UserPreference {
            user_id: "alice".into(),
            netflix_profile_index: 2,
            netflix_pin: Some("1234".into()),
            youtube_account_index: None,
            youtube_account_name: Some("Mia".into()),
        });
        assert!(hint.contains("#2"));
        assert!(hint.contains("PIN is configured"));
        assert!(hint.contains("\"Mia\""));
    }

    #[test]
    fn query_encoding_is_url_safe() {
        assert_eq!(encode_query("rust tutorial"), "rust+tutorial");
        assert_eq!(encode_query("a&b=c"), "a%26b%3Dc");
    }
}
