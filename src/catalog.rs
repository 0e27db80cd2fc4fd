//! Capability catalog: the static set of named, schema-typed device actions
//! exposed to the tool-selector. Built once at startup and never mutated.
//!
//! Each descriptor carries a tagged [`CapabilityAction`] resolved at build
//! time, so the dispatcher executes an enum match rather than comparing
//! name strings.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::device::AppId;
use crate::error::{Result, TvAgentError};

/// Declared side-effect class of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Repeating the invocation converges on the same device state
    /// (queries, deep links, app launches).
    Idempotent,
    /// Each repetition moves device state (key presses, text entry).
    Stateful,
    /// Multi-step blind UI traversal handled by the navigation sequencer.
    Navigational,
}

/// Handler tag for a capability, resolved when the catalog is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityAction {
    Remote,
    Navigate,
    Volume,
    Power,
    InputSource,
    PlayPause,
    Seek { forward: bool },
    StopPlayback,
    Launch(AppId),
    Close(AppId),
    Search(AppId),
    PlayYoutubeVideo,
    OpenYoutubeChannel,
    PlayNetflixTitle,
    OpenPage(AppId),
    Screenshot,
    InputText,
    CurrentApp,
    SelectProfile(AppId),
}

#[derive(Debug, Clone)]
pub enum ParamKind {
    String,
    /// Out-of-range values clamp to the nearest bound rather than failing;
    /// approximate repeat counts are tolerated in this domain.
    Integer { min: i64, max: i64 },
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    fn required_str(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::String,
            required: true,
            default: None,
            description,
        }
    }

    fn choice(
        name: &'static str,
        options: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Choice(options),
            required: true,
            default: None,
            description,
        }
    }

    fn int(
        name: &'static str,
        min: i64,
        max: i64,
        default: Option<i64>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Integer { min, max },
            required: default.is_none(),
            default: default.map(Value::from),
            description,
        }
    }

    fn schema(&self) -> Value {
        match &self.kind {
            ParamKind::String => json!({
                "type": "string",
                "description": self.description,
            }),
            ParamKind::Integer { min, max } => json!({
                "type": "integer",
                "minimum": min,
                "maximum": max,
                "description": self.description,
            }),
            ParamKind::Choice(options) => json!({
                "type": "string",
                "enum": options,
                "description": self.description,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub side_effect: SideEffect,
    pub action: CapabilityAction,
}

impl CapabilityDescriptor {
    /// JSON-schema-like parameter description, exposed verbatim to the
    /// tool-selector boundary.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(param.name.to_string(), param.schema());
            if param.required {
                required.push(Value::from(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate selector-provided arguments against the parameter schema,
    /// producing a normalized argument map: defaults filled, numeric values
    /// clamped to their documented bounds, unknown extras dropped.
    pub fn validate(&self, args: &Value) -> Result<Invocation> {
        let supplied = args.as_object().cloned().unwrap_or_default();
        let mut normalized = Map::new();

        for param in &self.params {
            let raw = supplied.get(param.name).filter(|v| !v.is_null());
            let value = match (raw, &param.default) {
                (Some(v), _) => self.check_param(param, v)?,
                (None, Some(default)) => default.clone(),
                (None, None) if param.required => {
                    return Err(self.invalid(format!("missing required argument `{}`", param.name)))
                }
                (None, None) => continue,
            };
            normalized.insert(param.name.to_string(), value);
        }

        let logged_args = Value::Object(normalized.clone());
        debug!(capability = self.name, args = %logged_args, "validated invocation");
        Ok(Invocation {
            capability: self.name,
            action: self.action,
            side_effect: self.side_effect,
            args: normalized,
        })
    }

    fn check_param(&self, param: &ParamSpec, value: &Value) -> Result<Value> {
        match &param.kind {
            ParamKind::String => value
                .as_str()
                .map(Value::from)
                .ok_or_else(|| self.invalid(format!("argument `{}` must be a string", param.name))),
            ParamKind::Integer { min, max } => {
                let n = value
                    .as_i64()
                    .or_else(|| value.as_f64().map(|f| f.round() as i64))
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                    .ok_or_else(|| {
                        self.invalid(format!("argument `{}` must be an integer", param.name))
                    })?;
                Ok(Value::from(clamp(n, *min, *max)))
            }
            ParamKind::Choice(options) => {
                let s = value.as_str().map(str::to_lowercase).ok_or_else(|| {
                    self.invalid(format!("argument `{}` must be a string", param.name))
                })?;
                if options.contains(&s.as_str()) {
                    Ok(Value::from(s))
                } else {
                    Err(self.invalid(format!(
                        "argument `{}` must be one of {:?}, got `{s}`",
                        param.name, options
                    )))
                }
            }
        }
    }

    fn invalid(&self, details: String) -> TvAgentError {
        TvAgentError::InvalidArguments {
            capability: self.name.to_string(),
            details,
        }
    }
}

/// Clamp to the nearest bound. Idempotent on in-range values.
pub fn clamp(value: i64, min: i64, max: i64) -> i64 {
    value.max(min).min(max)
}

/// A validated, ready-to-execute capability call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub capability: &'static str,
    pub action: CapabilityAction,
    pub side_effect: SideEffect,
    pub args: Map<String, Value>,
}

impl Invocation {
    pub fn str_arg(&self, name: &str) -> Result<&str> {
        self.args.get(name).and_then(Value::as_str).ok_or_else(|| {
            TvAgentError::InvalidArguments {
                capability: self.capability.to_string(),
                details: format!("missing string argument `{name}`"),
            }
        })
    }

    pub fn int_arg(&self, name: &str) -> Result<i64> {
        self.args.get(name).and_then(Value::as_i64).ok_or_else(|| {
            TvAgentError::InvalidArguments {
                capability: self.capability.to_string(),
                details: format!("missing integer argument `{name}`"),
            }
        })
    }

    pub fn opt_str_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    pub fn opt_int_arg(&self, name: &str) -> Option<i64> {
        self.args.get(name).and_then(Value::as_i64)
    }
}

/// The capability catalog. Stable iteration order; `resolve` is a plain
/// lookup with no side effects.
pub struct Catalog {
    entries: Vec<CapabilityDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl Catalog {
    pub fn standard() -> Self {
        let entries = standard_entries();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, i))
            .collect();
        Self { entries, index }
    }

    pub fn list(&self) -> &[CapabilityDescriptor] {
        &self.entries
    }

    pub fn resolve(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i])
    }
}

fn standard_entries() -> Vec<CapabilityDescriptor> {
    use CapabilityAction as A;
    use SideEffect::{Idempotent, Navigational, Stateful};

    vec![
        CapabilityDescriptor {
            name: "tv_remote",
            description: "Press a single remote-control key.",
            params: vec![ParamSpec::choice(
                "key",
                &[
                    "home", "back", "up", "down", "left", "right", "ok", "enter", "menu", "search",
                ],
                "Key to press",
            )],
            side_effect: Stateful,
            action: A::Remote,
        },
        CapabilityDescriptor {
            name: "tv_navigate",
            description: "Move the cursor several steps in one direction.",
            params: vec![
                ParamSpec::choice("direction", &["up", "down", "left", "right"], "Direction"),
                ParamSpec::int("steps", 1, 20, Some(1), "Number of presses (1-20)"),
            ],
            side_effect: Stateful,
            action: A::Navigate,
        },
        CapabilityDescriptor {
            name: "tv_volume",
            description: "Adjust the volume up or down, or toggle mute.",
            params: vec![
                ParamSpec::choice("action", &["up", "down", "mute"], "Volume action"),
                ParamSpec::int("steps", 1, 15, Some(1), "Number of volume steps (1-15)"),
            ],
            side_effect: Stateful,
            action: A::Volume,
        },
        CapabilityDescriptor {
            name: "tv_power",
            description: "Turn the TV on or off, or toggle power.",
            params: vec![ParamSpec::choice(
                "action",
                &["on", "off", "toggle"],
                "Power action",
            )],
            side_effect: Stateful,
            action: A::Power,
        },
        CapabilityDescriptor {
            name: "tv_input_source",
            description: "Switch to an HDMI input source.",
            params: vec![ParamSpec::int("hdmi", 1, 4, None, "HDMI port (1-4)")],
            side_effect: Idempotent,
            action: A::InputSource,
        },
        CapabilityDescriptor {
            name: "play_pause",
            description: "Toggle playback of the current video.",
            params: vec![],
            side_effect: Stateful,
            action: A::PlayPause,
        },
        CapabilityDescriptor {
            name: "rewind",
            description: "Rewind the current video in 10-second units.",
            params: vec![
                ParamSpec::choice("app", &["youtube", "netflix"], "App currently playing"),
                ParamSpec::int("seconds", 10, 60, Some(10), "Seconds to rewind (10-60)"),
            ],
            side_effect: Stateful,
            action: A::Seek { forward: false },
        },
        CapabilityDescriptor {
            name: "fast_forward",
            description: "Fast-forward the current video in 10-second units.",
            params: vec![
                ParamSpec::choice("app", &["youtube", "netflix"], "App currently playing"),
                ParamSpec::int("seconds", 10, 60, Some(10), "Seconds to skip (10-60)"),
            ],
            side_effect: Stateful,
            action: A::Seek { forward: true },
        },
        CapabilityDescriptor {
            name: "stop_playback",
            description: "Stop playback.",
            params: vec![],
            side_effect: Stateful,
            action: A::StopPlayback,
        },
        CapabilityDescriptor {
            name: "youtube_launch",
            description: "Launch the YouTube app.",
            params: vec![],
            side_effect: Idempotent,
            action: A::Launch(AppId::YouTube),
        },
        CapabilityDescriptor {
            name: "youtube_close",
            description: "Force-stop the YouTube app.",
            params: vec![],
            side_effect: Stateful,
            action: A::Close(AppId::YouTube),
        },
        CapabilityDescriptor {
            name: "youtube_search",
            description: "Search YouTube for a query.",
            params: vec![ParamSpec::required_str("query", "Search keywords")],
            side_effect: Idempotent,
            action: A::Search(AppId::YouTube),
        },
        CapabilityDescriptor {
            name: "youtube_play",
            description: "Play a specific YouTube video by id.",
            params: vec![ParamSpec::required_str(
                "video_id",
                "Video id, e.g. dQw4w9WgXcQ",
            )],
            side_effect: Idempotent,
            action: A::PlayYoutubeVideo,
        },
        CapabilityDescriptor {
            name: "youtube_channel",
            description: "Open a YouTube channel by id or @handle.",
            params: vec![ParamSpec::required_str("channel", "Channel id or @handle")],
            side_effect: Idempotent,
            action: A::OpenYoutubeChannel,
        },
        CapabilityDescriptor {
            name: "youtube_navigate",
            description: "Go to a YouTube page.",
            params: vec![ParamSpec::choice(
                "page",
                &["home", "subscriptions", "library"],
                "Page to open",
            )],
            side_effect: Idempotent,
            action: A::OpenPage(AppId::YouTube),
        },
        CapabilityDescriptor {
            name: "netflix_launch",
            description: "Launch the Netflix app (without profile selection).",
            params: vec![],
            side_effect: Idempotent,
            action: A::Launch(AppId::Netflix),
        },
        CapabilityDescriptor {
            name: "netflix_close",
            description: "Force-stop the Netflix app.",
            params: vec![],
            side_effect: Stateful,
            action: A::Close(AppId::Netflix),
        },
        CapabilityDescriptor {
            name: "netflix_search",
            description: "Search Netflix for a query.",
            params: vec![ParamSpec::required_str("query", "Search keywords")],
            side_effect: Idempotent,
            action: A::Search(AppId::Netflix),
        },
        CapabilityDescriptor {
            name: "netflix_play",
            description: "Play a Netflix title by id.",
            params: vec![ParamSpec::required_str("title_id", "Title id")],
            side_effect: Idempotent,
            action: A::PlayNetflixTitle,
        },
        CapabilityDescriptor {
            name: "netflix_navigate",
            description: "Go to a Netflix page.",
            params: vec![ParamSpec::choice(
                "page",
                &["home", "my_list"],
                "Page to open",
            )],
            side_effect: Idempotent,
            action: A::OpenPage(AppId::Netflix),
        },
        CapabilityDescriptor {
            name: "tv_screenshot",
            description: "Capture the current TV screen.",
            params: vec![],
            side_effect: Idempotent,
            action: A::Screenshot,
        },
        CapabilityDescriptor {
            name: "tv_input_text",
            description: "Type text on the TV (ASCII only).",
            params: vec![ParamSpec::required_str("text", "Text to type")],
            side_effect: Stateful,
            action: A::InputText,
        },
        CapabilityDescriptor {
            name: "tv_current_app",
            description: "Report which app is currently in the foreground.",
            params: vec![],
            side_effect: Idempotent,
            action: A::CurrentApp,
        },
        CapabilityDescriptor {
            name: "netflix_select_profile",
            description: "Launch Netflix and select a profile by position, entering the PIN if one is configured.",
            params: vec![ParamSpec::int(
                "profile_index",
                1,
                5,
                None,
                "Profile position, 1 = first",
            )],
            side_effect: Navigational,
            action: A::SelectProfile(AppId::Netflix),
        },
        CapabilityDescriptor {
            name: "youtube_select_account",
            description: "Launch YouTube and switch to an account by position or by name.",
            params: vec![
                ParamSpec::int("account_index", 1, 8, Some(1), "Account position, 1 = first"),
                ParamSpec {
                    name: "account_name",
                    kind: ParamKind::String,
                    required: false,
                    default: None,
                    description: "Account name to find on screen instead of a position",
                },
            ],
            side_effect: Navigational,
            action: A::SelectProfile(AppId::YouTube),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_round_trips_every_listed_capability() {
        let catalog = Catalog::standard();
        for descriptor in catalog.list() {
            let resolved = catalog.resolve(descriptor.name).expect("missing entry");
            assert_eq!(resolved.name, descriptor.name);
            assert_eq!(resolved.action, descriptor.action);
        }
        assert!(catalog.resolve("make_coffee").is_none());
    }

    #[test]
    fn clamp_is_idempotent_and_bound_preserving() {
        assert_eq!(clamp(7, 1, 15), 7);
        assert_eq!(clamp(clamp(7, 1, 15), 1, 15), 7);
        assert_eq!(clamp(99, 1, 15), 15);
        assert_eq!(clamp(-3, 1, 15), 1);
        assert_eq!(clamp(clamp(99, 1, 15), 1, 15), 15);
    }

    #[test]
    fn validate_clamps_out_of_range_steps() {
        let catalog = Catalog::standard();
        let descriptor = catalog.resolve("tv_volume").unwrap();
        let invocation = descriptor
            .validate(&json!({"action": "up", "steps": 40}))
            .unwrap();
        assert_eq!(invocation.int_arg("steps").unwrap(), 15);
    }

    #[test]
    fn validate_fills_defaults_and_drops_extras() {
        let catalog = Catalog::standard();
        let descriptor = catalog.resolve("tv_navigate").unwrap();
        let invocation = descriptor
            .validate(&json!({"direction": "down", "bogus": true}))
            .unwrap();
        assert_eq!(invocation.int_arg("steps").unwrap(), 1);
        assert!(invocation.args.get("bogus").is_none());
    }

    #[test]
    fn validate_rejects_missing_required_and_bad_choice() {
        let catalog = Catalog::standard();
        let descriptor = catalog.resolve("tv_remote").unwrap();
        assert!(matches!(
            descriptor.validate(&json!({})),
            Err(TvAgentError::InvalidArguments { .. })
        ));
        assert!(matches!(
            descriptor.validate(&json!({"key": "volume_up"})),
            Err(TvAgentError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn choice_values_normalize_to_lowercase() {
        let catalog = Catalog::standard();
        let descriptor = catalog.resolve("rewind").unwrap();
        let invocation = descriptor.validate(&json!({"app": "YouTube"})).unwrap();
        assert_eq!(invocation.str_arg("app").unwrap(), "youtube");
        assert_eq!(invocation.int_arg("seconds").unwrap(), 10);
    }

    #[test]
    fn input_schema_lists_required_parameters() {
        let catalog = Catalog::standard();
        let schema = catalog.resolve("tv_volume").unwrap().input_schema();
        assert_eq!(schema["required"], json!(["action"]));
        assert_eq!(schema["properties"]["steps"]["maximum"], json!(15));
    }
}
