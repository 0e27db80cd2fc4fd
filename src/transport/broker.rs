//! Broker transport: directives are forwarded as named RPCs to a device
//! broker speaking JSON-RPC 2.0 over streamable HTTP. The session is
//! established once via `initialize`, which yields a session id carried in
//! the `mcp-session-id` header on every subsequent call; if the id is absent
//! when a call is attempted, the transport re-initializes transparently and
//! retries the call once. Responses may arrive as a bare JSON body or as a
//! single `data:`-prefixed event line; both are accepted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{DeviceTransport, Directive};
use crate::config::TimingConfig;
use crate::error::{Result, TvAgentError};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct BrokerTransport {
    base_url: String,
    http: reqwest::Client,
    call_timeout: Duration,
    session: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl BrokerTransport {
    pub fn new(base_url: impl Into<String>, timing: &TimingConfig) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            call_timeout: Duration::from_millis(timing.broker_call_timeout_ms),
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Translate a directive into the broker's RPC name and parameters.
    fn translate(directive: &Directive) -> (&'static str, Value) {
        match directive {
            Directive::KeyPress(key) => ("key_press", json!({ "keycode": key.keycode() })),
            Directive::LaunchApp(app) => (
                "launch_app",
                json!({ "package": app.package(), "activity": app.activity() }),
            ),
            Directive::StopApp(app) => ("stop_app", json!({ "package": app.package() })),
            Directive::ViewUri { uri, package } => {
                ("view_uri", json!({ "uri": uri, "package": package }))
            }
            Directive::InputSource { hdmi } => ("input_source", json!({ "hdmi": hdmi })),
            Directive::InputText(text) => ("input_text", json!({ "text": text })),
            Directive::ForegroundQuery => ("foreground_app", json!({})),
        }
    }

    fn map_http_error(err: reqwest::Error, timeout: Duration) -> TvAgentError {
        if err.is_timeout() {
            TvAgentError::Timeout(timeout)
        } else {
            TvAgentError::Connection(err.to_string())
        }
    }

    /// Parse a response delivered either as bare JSON or as a single
    /// `data:`-prefixed event-stream line.
    fn parse_body(body: &str) -> Result<RpcResponse> {
        for line in body.lines() {
            if let Some(data) = line.trim().strip_prefix("data: ") {
                return Ok(serde_json::from_str(data)?);
            }
        }
        Ok(serde_json::from_str(body.trim())?)
    }

    async fn rpc(&self, method: &'static str, params: Value, session: Option<&str>) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!(method, id = request.id, "-> broker rpc");

        let mut builder = self
            .http
            .post(&self.base_url)
            .timeout(self.call_timeout)
            .header("Accept", "application/json, text/event-stream")
            .json(&request);
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_http_error(e, self.call_timeout))?;

        let session_header = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| Self::map_http_error(e, self.call_timeout))?;

        if let Some(id) = session_header {
            *self.session.lock().await = Some(id);
        }

        let parsed = Self::parse_body(&body)?;
        if let Some(err) = parsed.error {
            return Err(TvAgentError::Connection(format!(
                "broker rpc {method} failed ({}): {}",
                err.code, err.message
            )));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn initialize(&self) -> Result<String> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "tv-agent",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        self.rpc("initialize", params, None).await?;

        let session = self
            .session
            .lock()
            .await
            .clone()
            .ok_or_else(|| TvAgentError::Connection("broker returned no session id".into()))?;

        // Discover the broker's capability listing once per session.
        let tools = self
            .rpc("tools/list", json!({}), Some(&session))
            .await
            .ok()
            .and_then(|v| v.get("tools").and_then(Value::as_array).map(Vec::len));
        info!(session = %session, tools = ?tools, "broker session initialized");

        Ok(session)
    }

    async fn current_session(&self) -> Option<String> {
        self.session.lock().await.clone()
    }

    /// Invoke a named broker capability, re-initializing once if the session
    /// id is absent.
    async fn call_named(&self, name: &'static str, arguments: Value) -> Result<Value> {
        let session = match self.current_session().await {
            Some(session) => session,
            None => self.initialize().await?,
        };
        let params = json!({ "name": name, "arguments": arguments });
        self.rpc("tools/call", params, Some(&session)).await
    }

    /// First content item's text field is the human-readable result.
    fn result_text(result: &Value) -> Option<String> {
        result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
impl DeviceTransport for BrokerTransport {
    async fn ensure_ready(&self) -> Result<()> {
        if self.current_session().await.is_none() {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn send(&self, directive: &Directive, wants_output: bool) -> Result<Option<String>> {
        let (name, arguments) = Self::translate(directive);
        let result = self.call_named(name, arguments).await?;
        if wants_output {
            Ok(Self::result_text(&result))
        } else {
            Ok(None)
        }
    }

    async fn capture_screen(&self) -> Result<Vec<u8>> {
        let result = self
            .call_named("screen_capture", json!({}))
            .await
            .map_err(|e| TvAgentError::Capture(e.to_string()))?;

        let encoded = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("data").or_else(|| item.get("text")))
            .and_then(Value::as_str)
            .ok_or_else(|| TvAgentError::Capture("broker returned no image content".into()))?;

        BASE64
            .decode(encoded.trim())
            .map_err(|e| TvAgentError::Capture(format!("invalid base64 image: {e}")))
    }

    fn label(&self) -> &'static str {
        "broker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Key;

    #[test]
    fn parses_bare_json_body() {
        let parsed =
            BrokerTransport::parse_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
                .unwrap();
        assert!(parsed.error.is_none());
        assert_eq!(parsed.result.unwrap()["ok"], Value::Bool(true));
    }

    #[test]
    fn parses_event_stream_line() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n";
        let parsed = BrokerTransport::parse_body(body).unwrap();
        assert!(parsed.result.unwrap().get("tools").is_some());
    }

    #[test]
    fn surfaces_rpc_errors() {
        let parsed = BrokerTransport::parse_body(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"no such method"}}"#,
        )
        .unwrap();
        let err = parsed.error.unwrap();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn key_press_carries_keycode() {
        let (name, params) = BrokerTransport::translate(&Directive::KeyPress(Key::Ok));
        assert_eq!(name, "key_press");
        assert_eq!(params["keycode"], 23);
    }

    #[test]
    fn result_text_reads_first_content_item() {
        let result = serde_json::json!({
            "content": [{"type": "text", "text": "done"}, {"type": "text", "text": "extra"}]
        });
        assert_eq!(BrokerTransport::result_text(&result).as_deref(), Some("done"));
        assert_eq!(BrokerTransport::result_text(&Value::Null), None);
    }
}
