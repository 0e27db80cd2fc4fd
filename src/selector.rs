//! Tool-selector boundary: given free text and the capability catalog,
//! return zero or more raw invocations, or a plain-text reply with no
//! invocation. The concrete implementation talks to an OpenAI-compatible
//! chat-completions endpoint; the seam is a trait so dispatch logic can be
//! exercised with a scripted selector.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::{Result, TvAgentError};

/// An unvalidated capability call as named by the selector. Validated
/// against the matching descriptor before anything reaches the transport.
#[derive(Debug, Clone)]
pub struct RawInvocation {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct SelectorOutcome {
    pub invocations: Vec<RawInvocation>,
    /// Free-text reply, used as the response when no invocation was chosen.
    pub reply: Option<String>,
}

#[async_trait]
pub trait ToolSelector: Send + Sync {
    async fn select(
        &self,
        command: &str,
        catalog: &Catalog,
        preference_hint: Option<&str>,
    ) -> Result<SelectorOutcome>;
}

const SYSTEM_PROMPT: &str = "\
You are a TV control assistant. The user gives natural-language instructions; \
map each onto the provided tools and call them directly, without extra \
commentary.

Common instructions:
- \"open YouTube\" -> youtube_launch
- \"search for X\" -> youtube_search or netflix_search
- \"pause\" -> play_pause
- \"rewind 10 seconds\" -> rewind(app, seconds)
- \"skip ahead\" -> fast_forward(app, seconds)
- \"turn the volume up\" -> tv_volume(action=\"up\")
- \"go home\" -> tv_remote(key=\"home\")
- \"switch to HDMI 1\" -> tv_input_source(hdmi=1)

rewind and fast_forward need to know whether youtube or netflix is playing; \
use tv_current_app if unsure.";

pub struct OpenAiSelector {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiSelector {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Convert the catalog to the function-calling tool format, exposed
    /// verbatim: one entry per capability, schema included.
    fn tools_payload(catalog: &Catalog) -> Vec<Value> {
        catalog
            .list()
            .iter()
            .map(|descriptor| {
                json!({
                    "type": "function",
                    "function": {
                        "name": descriptor.name,
                        "description": descriptor.description,
                        "parameters": descriptor.input_schema(),
                    },
                })
            })
            .collect()
    }

    fn parse_outcome(body: &ChatResponse) -> SelectorOutcome {
        let Some(choice) = body.choices.first() else {
            return SelectorOutcome::default();
        };

        let invocations = choice
            .message
            .tool_calls
            .iter()
            .map(|call| {
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|e| {
                        warn!(tool = %call.function.name, error = %e, "selector returned unparsable arguments");
                        json!({})
                    });
                RawInvocation {
                    name: call.function.name.clone(),
                    arguments,
                }
            })
            .collect();

        SelectorOutcome {
            invocations,
            reply: choice.message.content.clone().filter(|c| !c.is_empty()),
        }
    }
}

#[async_trait]
impl ToolSelector for OpenAiSelector {
    async fn select(
        &self,
        command: &str,
        catalog: &Catalog,
        preference_hint: Option<&str>,
    ) -> Result<SelectorOutcome> {
        let mut system = SYSTEM_PROMPT.to_string();
        if let Some(hint) = preference_hint {
            system.push_str("\n\n");
            system.push_str(hint);
        }

        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": command },
            ],
            "tools": Self::tools_payload(catalog),
            "tool_choice": "auto",
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TvAgentError::Selector(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TvAgentError::Selector(format!(
                "selector endpoint returned {status}: {}",
                body.trim()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| TvAgentError::Selector(format!("invalid selector response: {e}")))?;

        let outcome = Self::parse_outcome(&body);
        debug!(
            invocations = outcome.invocations.len(),
            has_reply = outcome.reply.is_some(),
            "selector outcome"
        );
        Ok(outcome)
    }
}

// ── Chat-completions wire types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded argument object, per the function-calling contract.
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(raw: Value) -> ChatResponse {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn parses_tool_calls_with_encoded_arguments() {
        let body = response(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "tv_volume",
                            "arguments": "{\"action\":\"up\",\"steps\":3}"
                        }
                    }]
                }
            }]
        }));
        let outcome = OpenAiSelector::parse_outcome(&body);
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].name, "tv_volume");
        assert_eq!(outcome.invocations[0].arguments["steps"], 3);
        assert!(outcome.reply.is_none());
    }

    #[test]
    fn plain_reply_has_no_invocations() {
        let body = response(json!({
            "choices": [{
                "message": { "content": "I can only control the TV." }
            }]
        }));
        let outcome = OpenAiSelector::parse_outcome(&body);
        assert!(outcome.invocations.is_empty());
        assert_eq!(outcome.reply.as_deref(), Some("I can only control the TV."));
    }

    #[test]
    fn unparsable_arguments_degrade_to_empty_object() {
        let body = response(json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": { "name": "tv_remote", "arguments": "not json" }
                    }]
                }
            }]
        }));
        let outcome = OpenAiSelector::parse_outcome(&body);
        assert_eq!(outcome.invocations[0].arguments, json!({}));
    }

    #[test]
    fn tools_payload_exposes_every_capability() {
        let catalog = Catalog::standard();
        let tools = OpenAiSelector::tools_payload(&catalog);
        assert_eq!(tools.len(), catalog.list().len());
        assert!(tools
            .iter()
            .any(|t| t["function"]["name"] == "netflix_select_profile"));
    }
}
