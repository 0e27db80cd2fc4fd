//! Direct transport: directives become `adb -s <addr> …` invocations over a
//! point-to-point link. The link may silently drop, so the transport
//! check-then-connects lazily and retries a failed directive once after
//! reconnecting. Timeouts are never retried.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DeviceTransport, Directive};
use crate::config::TimingConfig;
use crate::error::{Result, TvAgentError};

pub struct AdbTransport {
    adb_path: String,
    device: String,
    directive_timeout: Duration,
    query_timeout: Duration,
    /// Guards the check-then-connect cycle so concurrent reconnects cannot
    /// interleave. Holds whether the last cycle saw the device attached.
    link: Mutex<bool>,
}

impl AdbTransport {
    pub fn new(adb_path: impl Into<String>, device: impl Into<String>, timing: &TimingConfig) -> Self {
        Self {
            adb_path: adb_path.into(),
            device: device.into(),
            directive_timeout: timing.directive_timeout(),
            query_timeout: timing.query_timeout(),
            link: Mutex::new(false),
        }
    }

    /// Translate a directive into adb arguments (after `-s <device>`).
    fn translate(directive: &Directive) -> Vec<String> {
        match directive {
            Directive::KeyPress(key) => vec![
                "shell".into(),
                "input".into(),
                "keyevent".into(),
                key.keycode().to_string(),
            ],
            Directive::LaunchApp(app) => vec![
                "shell".into(),
                "am".into(),
                "start".into(),
                "-n".into(),
                format!("{}/{}", app.package(), app.activity()),
            ],
            Directive::StopApp(app) => vec![
                "shell".into(),
                "am".into(),
                "force-stop".into(),
                app.package().into(),
            ],
            Directive::ViewUri { uri, package } => {
                let mut args = vec![
                    "shell".into(),
                    "am".into(),
                    "start".into(),
                    "-a".into(),
                    "android.intent.action.VIEW".into(),
                    "-d".into(),
                    uri.clone(),
                ];
                if let Some(package) = package {
                    args.push((*package).into());
                }
                args
            }
            Directive::InputSource { hdmi } => {
                // HDMI ports map to passthrough hardware inputs 5-8.
                let hw_port = hdmi + 4;
                vec![
                    "shell".into(),
                    "am".into(),
                    "start".into(),
                    "-a".into(),
                    "android.intent.action.VIEW".into(),
                    "-d".into(),
                    format!(
                        "content://android.media.tv/passthrough/com.mediatek.tvinput%2F.hdmi.HDMIInputService%2FHW{hw_port}"
                    ),
                    "-n".into(),
                    "org.droidtv.playtv/.PlayTvActivity".into(),
                    "-f".into(),
                    "0x10000000".into(),
                ]
            }
            Directive::InputText(text) => vec![
                "shell".into(),
                "input".into(),
                "text".into(),
                text.replace(' ', "%s"),
            ],
            Directive::ForegroundQuery => vec![
                "shell".into(),
                "dumpsys window | grep -E 'mCurrentFocus'".into(),
            ],
        }
    }

    async fn run_adb(&self, args: &[String], timeout: Duration) -> Result<String> {
        let mut command = Command::new(&self.adb_path);
        command.arg("-s").arg(&self.device).args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        debug!(device = %self.device, ?args, "adb dispatch");

        let child = command
            .spawn()
            .map_err(|e| TvAgentError::Connection(format!("failed to spawn adb: {e}")))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| TvAgentError::Timeout(timeout))?
            .map_err(|e| TvAgentError::Connection(format!("adb io error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TvAgentError::Connection(format!(
                "adb exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a raw adb invocation without the `-s` device selector
    /// (connection management commands).
    async fn run_adb_global(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let mut command = Command::new(&self.adb_path);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| TvAgentError::Connection(format!("failed to spawn adb: {e}")))?;
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| TvAgentError::Timeout(timeout))?
            .map_err(|e| TvAgentError::Connection(format!("adb io error: {e}")))?;

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn connect_locked(&self, attached: &mut bool) -> Result<()> {
        let devices = self
            .run_adb_global(&["devices"], self.query_timeout)
            .await?;
        if devices
            .lines()
            .any(|line| line.starts_with(&self.device) && line.ends_with("device"))
        {
            *attached = true;
            return Ok(());
        }

        info!(device = %self.device, "adb link down, connecting");
        let result = self
            .run_adb_global(&["connect", &self.device], self.query_timeout)
            .await?;
        let lowered = result.to_lowercase();
        if lowered.contains("connected") {
            *attached = true;
            Ok(())
        } else {
            *attached = false;
            Err(TvAgentError::Connection(format!(
                "adb connect {} failed: {result}",
                self.device
            )))
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let mut attached = self.link.lock().await;
        *attached = false;
        self.connect_locked(&mut attached).await
    }
}

#[async_trait]
impl DeviceTransport for AdbTransport {
    async fn ensure_ready(&self) -> Result<()> {
        let mut attached = self.link.lock().await;
        self.connect_locked(&mut attached).await
    }

    async fn send(&self, directive: &Directive, wants_output: bool) -> Result<Option<String>> {
        let args = Self::translate(directive);
        let timeout = if wants_output {
            self.query_timeout
        } else {
            self.directive_timeout
        };

        let output = match self.run_adb(&args, timeout).await {
            Ok(output) => output,
            // One reconnect-and-retry for link failures; timeouts surface as-is.
            Err(err) if err.is_connection() => {
                warn!(device = %self.device, error = %err, "directive failed, reconnecting");
                self.reconnect().await?;
                self.run_adb(&args, timeout).await?
            }
            Err(err) => return Err(err),
        };

        if wants_output && !output.is_empty() {
            Ok(Some(output))
        } else {
            Ok(None)
        }
    }

    async fn capture_screen(&self) -> Result<Vec<u8>> {
        let remote = "/sdcard/tv-agent-screen.png";
        let local = std::env::temp_dir().join("tv-agent-screen.png");
        let local_str = local.to_string_lossy().to_string();

        self.run_adb(
            &["shell".into(), "screencap".into(), "-p".into(), remote.into()],
            self.query_timeout,
        )
        .await
        .map_err(|e| TvAgentError::Capture(e.to_string()))?;
        self.run_adb(
            &["pull".into(), remote.into(), local_str.clone()],
            self.query_timeout,
        )
        .await
        .map_err(|e| TvAgentError::Capture(e.to_string()))?;
        self.run_adb(
            &["shell".into(), "rm".into(), remote.into()],
            self.directive_timeout,
        )
        .await
        .ok();

        tokio::fs::read(&local)
            .await
            .map_err(|e| TvAgentError::Capture(format!("failed to read {local_str}: {e}")))
    }

    fn label(&self) -> &'static str {
        "adb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AppId, Key};

    #[test]
    fn key_press_translates_to_input_keyevent() {
        let args = AdbTransport::translate(&Directive::KeyPress(Key::VolumeUp));
        assert_eq!(args, vec!["shell", "input", "keyevent", "24"]);
    }

    #[test]
    fn launch_names_package_and_activity() {
        let args = AdbTransport::translate(&Directive::LaunchApp(AppId::Netflix));
        assert_eq!(args[3], "-n");
        assert_eq!(args[4], "com.netflix.ninja/com.netflix.ninja.MainActivity");
    }

    #[test]
    fn input_text_escapes_spaces() {
        let args = AdbTransport::translate(&Directive::InputText("hello world".into()));
        assert_eq!(args[3], "hello%sworld");
    }

    #[test]
    fn input_source_maps_hdmi_to_hardware_port() {
        let args = AdbTransport::translate(&Directive::InputSource { hdmi: 1 });
        assert!(args.iter().any(|a| a.contains("HW5")));
    }
}
