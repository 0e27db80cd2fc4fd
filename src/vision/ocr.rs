//! Mixed-script text recognition by shelling out to the Tesseract CLI in
//! TSV mode. Confidence and spatial-band filters are applied here, as
//! configuration of the recognize step; label matching happens upstream.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{DetectedLabel, TextRecognizer};
use crate::config::RecognizerConfig;
use crate::error::{Result, TvAgentError};

pub struct TesseractRecognizer {
    config: RecognizerConfig,
}

impl TesseractRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    /// Parse Tesseract TSV output. Columns: level, page, block, par, line,
    /// word, left, top, width, height, conf, text. Words failing the
    /// confidence or band filters are dropped; survivors are ordered
    /// left-to-right by center position.
    fn parse_tsv(&self, tsv: &str) -> Vec<DetectedLabel> {
        let mut labels = Vec::new();
        for line in tsv.lines().skip(1) {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < 12 {
                continue;
            }
            let text = columns[11].trim();
            if text.chars().count() <= 1 {
                continue;
            }
            let confidence: f32 = match columns[10].parse() {
                Ok(c) => c,
                Err(_) => continue,
            };
            if confidence < self.config.min_confidence {
                continue;
            }
            let (left, top, width): (u32, u32, u32) = match (
                columns[6].parse(),
                columns[7].parse(),
                columns[8].parse(),
            ) {
                (Ok(l), Ok(t), Ok(w)) => (l, t, w),
                _ => continue,
            };
            let x = left + width / 2;
            let y = top;
            if let Some(band) = &self.config.band {
                if !band.contains(x, y) {
                    continue;
                }
            }
            if self
                .config
                .ignore_terms
                .iter()
                .any(|term| term.eq_ignore_ascii_case(text))
            {
                continue;
            }
            labels.push(DetectedLabel {
                text: text.to_string(),
                x,
                y,
                confidence,
            });
        }
        labels.sort_by_key(|label| label.x);
        labels
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<DetectedLabel>> {
        let mut command = Command::new(&self.config.tesseract_path);
        command
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.languages)
            .arg("tsv");
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::null());
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| TvAgentError::Capture(format!("failed to spawn tesseract: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TvAgentError::Capture("tesseract stdin unavailable".into()))?;
        stdin
            .write_all(image)
            .await
            .map_err(|e| TvAgentError::Capture(format!("tesseract stdin write failed: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TvAgentError::Capture(format!("tesseract io error: {e}")))?;
        if !output.status.success() {
            return Err(TvAgentError::Capture(format!(
                "tesseract exited with {}",
                output.status
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let labels = self.parse_tsv(&tsv);
        debug!(count = labels.len(), "recognized screen labels");
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecognizerBand;

    fn tsv_row(left: u32, top: u32, width: u32, conf: &str, text: &str) -> String {
        format!("5\t1\t1\t1\t1\t1\t{left}\t{top}\t{width}\t30\t{conf}\t{text}")
    }

    fn recognizer() -> TesseractRecognizer {
        TesseractRecognizer::new(RecognizerConfig {
            band: Some(RecognizerBand::default()),
            ..RecognizerConfig::default()
        })
    }

    #[test]
    fn keeps_confident_words_inside_band_sorted_by_x() {
        let tsv = [
            "level\tpage\tblock\tpar\tline\tword\tleft\ttop\twidth\theight\tconf\ttext".to_string(),
            tsv_row(800, 630, 60, "95", "Jordan"),
            tsv_row(400, 630, 60, "92", "Alex"),
        ]
        .join("\n");
        let labels = recognizer().parse_tsv(&tsv);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].text, "Alex");
        assert_eq!(labels[1].text, "Jordan");
    }

    #[test]
    fn drops_low_confidence_and_out_of_band_words() {
        let tsv = [
            "level\tpage\tblock\tpar\tline\tword\tleft\ttop\twidth\theight\tconf\ttext".to_string(),
            tsv_row(400, 630, 60, "40", "Ghost"),
            tsv_row(400, 100, 60, "95", "Banner"),
            tsv_row(400, 630, 60, "-1", "Noise"),
        ]
        .join("\n");
        assert!(recognizer().parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn drops_ui_terms_and_single_characters() {
        let tsv = [
            "level\tpage\tblock\tpar\tline\tword\tleft\ttop\twidth\theight\tconf\ttext".to_string(),
            tsv_row(400, 630, 60, "95", "YouTube"),
            tsv_row(500, 630, 60, "95", "Kids"),
            tsv_row(600, 630, 10, "95", "X"),
            tsv_row(700, 630, 60, "95", "Mia"),
        ]
        .join("\n");
        let labels = recognizer().parse_tsv(&tsv);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].text, "Mia");
    }
}
