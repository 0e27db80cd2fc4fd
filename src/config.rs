//! Behavior configuration: timings, navigation geometry, and recognizer
//! filters. Everything has a working default; a TOML file can override any
//! subset of fields.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TvAgentError};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BehaviorConfig {
    pub timing: TimingConfig,
    pub netflix: NetflixNavConfig,
    pub youtube: YoutubeNavConfig,
    pub recognizer: RecognizerConfig,
}

impl BehaviorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TvAgentError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| TvAgentError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

/// Per-call timeouts and inter-directive delays for plain capabilities.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Timeout for a single fire-and-forget directive (key press, launch).
    pub directive_timeout_ms: u64,
    /// Timeout for a directive that captures output (status queries, capture).
    pub query_timeout_ms: u64,
    /// Timeout for one broker RPC round trip.
    pub broker_call_timeout_ms: u64,
    /// Delay between repeated volume presses.
    pub volume_inter_delay_ms: u64,
    /// Delay between repeated navigation presses.
    pub navigate_inter_delay_ms: u64,
    /// Delay between repeated seek presses.
    pub seek_inter_delay_ms: u64,
    /// Pause before the confirming Ok press that commits a seek.
    pub seek_confirm_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            directive_timeout_ms: 5_000,
            query_timeout_ms: 15_000,
            broker_call_timeout_ms: 60_000,
            volume_inter_delay_ms: 100,
            navigate_inter_delay_ms: 300,
            seek_inter_delay_ms: 200,
            seek_confirm_delay_ms: 300,
        }
    }
}

impl TimingConfig {
    pub fn directive_timeout(&self) -> Duration {
        Duration::from_millis(self.directive_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Netflix profile-gate geometry. Focus defaults to the first profile on
/// menu open, so no reference moves are needed before stepping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetflixNavConfig {
    pub load_settle_ms: u64,
    pub step_delay_ms: u64,
    /// Wait for the PIN prompt to appear after selecting a locked profile.
    pub pin_prompt_delay_ms: u64,
    pub pin_digit_delay_ms: u64,
    pub final_settle_ms: u64,
    /// Netflix shows at most five profiles; higher targets clamp here.
    pub max_slots: u32,
}

impl Default for NetflixNavConfig {
    fn default() -> Self {
        Self {
            load_settle_ms: 3_000,
            step_delay_ms: 300,
            pin_prompt_delay_ms: 2_000,
            pin_digit_delay_ms: 200,
            final_settle_ms: 2_000,
            max_slots: 5,
        }
    }
}

/// YouTube account-switch geometry: enter the sidebar, drive to the top,
/// then step right through the account strip.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YoutubeNavConfig {
    pub load_settle_ms: u64,
    /// Pause after entering the sidebar.
    pub sidebar_settle_ms: u64,
    /// Up presses needed to guarantee the cursor is at the top of the
    /// sidebar regardless of where focus landed.
    pub reference_up_presses: u32,
    pub reference_move_delay_ms: u64,
    pub step_delay_ms: u64,
    pub final_settle_ms: u64,
    pub max_slots: u32,
}

impl Default for YoutubeNavConfig {
    fn default() -> Self {
        Self {
            load_settle_ms: 4_000,
            sidebar_settle_ms: 300,
            reference_up_presses: 8,
            reference_move_delay_ms: 200,
            step_delay_ms: 300,
            final_settle_ms: 2_000,
            max_slots: 8,
        }
    }
}

/// Text-recognition filters applied while reading the account strip.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub tesseract_path: String,
    /// Language pack spec passed to the recognizer (mixed-script).
    pub languages: String,
    /// Words below this confidence are discarded.
    pub min_confidence: f32,
    /// Screen band where account labels render; words outside are UI chrome.
    pub band: Option<RecognizerBand>,
    /// Lowercased UI terms that are never account names.
    pub ignore_terms: Vec<String>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            languages: "chi_tra+eng".to_string(),
            min_confidence: 85.0,
            band: Some(RecognizerBand::default()),
            ignore_terms: vec!["youtube".to_string(), "kids".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognizerBand {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl Default for RecognizerBand {
    fn default() -> Self {
        Self {
            x_min: 200,
            x_max: 1200,
            y_min: 620,
            y_max: 660,
        }
    }
}

impl RecognizerBand {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x > self.x_min && x < self.x_max && y > self.y_min && y < self.y_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = BehaviorConfig::default();
        assert_eq!(config.netflix.max_slots, 5);
        assert_eq!(config.youtube.reference_up_presses, 8);
        assert!(config.recognizer.band.is_some());
    }

    #[test]
    fn toml_overlay_keeps_unnamed_defaults() {
        let config: BehaviorConfig = toml::from_str(
            r#"
            [netflix]
            load_settle_ms = 5000

            [recognizer]
            min_confidence = 70.0
            "#,
        )
        .unwrap();
        assert_eq!(config.netflix.load_settle_ms, 5_000);
        assert_eq!(config.netflix.max_slots, 5);
        assert_eq!(config.recognizer.min_confidence, 70.0);
        assert_eq!(config.timing.volume_inter_delay_ms, 100);
    }

    #[test]
    fn band_bounds_are_exclusive() {
        let band = RecognizerBand::default();
        assert!(band.contains(700, 640));
        assert!(!band.contains(200, 640));
        assert!(!band.contains(700, 660));
    }
}
