//! Visual disambiguation: capture the screen, extract labeled on-screen
//! items, and resolve a free-text target to a navigational offset. Used only
//! when a target is named rather than indexed; detected labels are consumed
//! by a single decision and never cached, since on-screen layout is not
//! assumed stable between commands.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::transport::DeviceTransport;

pub mod ocr;

pub use ocr::TesseractRecognizer;

/// One recognized on-screen text fragment. `x`/`y` are the fragment's center
/// position; ordering of the containing sequence is defined by the
/// recognizer, not guaranteed spatial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedLabel {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub confidence: f32,
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Extract labeled text fragments from encoded image bytes.
    async fn recognize(&self, image: &[u8]) -> Result<Vec<DetectedLabel>>;
}

/// Resolve a target label to a 1-indexed position among the detected labels.
///
/// Matching is case-insensitive substring containment of the target within a
/// detected label; the first match in the supplied order wins. No scoring,
/// no edit distance — ties stand on first occurrence.
pub fn locate(target: &str, labels: &[DetectedLabel]) -> Option<u32> {
    let needle = target.to_lowercase();
    labels
        .iter()
        .position(|label| label.text.to_lowercase().contains(&needle))
        .map(|i| i as u32 + 1)
}

/// Outcome of one capture-recognize-locate pass. The full recognized label
/// set is kept for diagnostics regardless of whether the target was found.
#[derive(Debug, Clone)]
pub struct Disambiguation {
    pub position: Option<u32>,
    pub labels: Vec<String>,
}

pub struct Disambiguator {
    transport: Arc<dyn DeviceTransport>,
    recognizer: Arc<dyn TextRecognizer>,
}

impl Disambiguator {
    pub fn new(transport: Arc<dyn DeviceTransport>, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            transport,
            recognizer,
        }
    }

    pub async fn resolve(&self, target: &str) -> Result<Disambiguation> {
        let image = self.transport.capture_screen().await?;
        debug!(bytes = image.len(), "captured screen for disambiguation");

        let detected = self.recognizer.recognize(&image).await?;
        let position = locate(target, &detected);
        let labels: Vec<String> = detected.into_iter().map(|l| l.text).collect();

        info!(label = target, ?position, count = labels.len(), "resolved screen target");
        Ok(Disambiguation { position, labels })
    }
}
