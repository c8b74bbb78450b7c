//! Chat-completion client and retry policy.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::core::message::{ChatMessage, message_from_value};
use crate::io::config::RetryConfig;

/// Requests the next assistant turn for a conversation.
pub trait CompletionClient {
    fn complete(&self, model: &str, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn complete(&self, model: &str, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage> {
        (**self).complete(model, messages, tools)
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    token: String,
}

impl OpenAiClient {
    pub fn new(endpoint: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build completion http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

impl CompletionClient for OpenAiClient {
    #[instrument(skip_all, fields(model = model, messages = messages.len(), tools = tools.len()))]
    fn complete(&self, model: &str, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": 1.0,
            "top_p": 1.0,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }

        let url = format!("{}/chat/completions", self.endpoint);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .context("completion request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_else(|_| "<no body>".into());
            bail!("completion endpoint returned {status}: {text}");
        }
        let payload: Value = response.json().context("invalid completion response")?;
        let message = payload
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow!("completion response has no choices[0].message"))?;
        let message = message_from_value(message)?
            .ok_or_else(|| anyhow!("completion response message is null"))?;
        debug!(tool_calls = message.tool_calls.len(), "completion received");
        Ok(message)
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_attempts: 1,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
    };

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Retries the wrapped client according to a [`RetryPolicy`].
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    fn complete(&self, model: &str, messages: &[ChatMessage], tools: &[Value]) -> Result<ChatMessage> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(model, messages, tools) {
                Ok(message) => return Ok(message),
                Err(err) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = %format!("{err:#}"),
                        "completion failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("completion failed after {attempt} attempt(s)")
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;
    use mockito::Matcher;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn retrying_client_recovers_from_transient_failures() {
        let scripted = ScriptedClient::new(vec![]);
        scripted.push_error("503 from upstream");
        scripted.push_error("connection reset");
        scripted.push_reply(ChatMessage::assistant("ok"));
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::NONE
        };
        let client = RetryingClient::new(scripted, policy);
        let reply = client.complete("m", &[ChatMessage::user("hi")], &[]).expect("reply");
        assert_eq!(reply.text(), "ok");
        assert_eq!(client.into_inner().requests().len(), 3);
    }

    #[test]
    fn retrying_client_gives_up_after_max_attempts() {
        let scripted = ScriptedClient::new(vec![]);
        scripted.push_error("down");
        scripted.push_error("still down");
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::NONE
        };
        let client = RetryingClient::new(scripted, policy);
        let err = client.complete("m", &[], &[]).expect_err("exhausted");
        assert!(format!("{err:#}").contains("after 2 attempt(s)"));
        assert!(format!("{err:#}").contains("still down"));
    }

    #[test]
    fn openai_client_posts_tools_and_decodes_tool_calls() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "model": "openai/gpt-4.1",
                "tool_choice": "auto",
                "messages": [{"role": "user", "content": "hi"}],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant", "content": null,
                    "tool_calls": [{"id": "c1", "type": "function",
                    "function": {"name": "list_files", "arguments": "{}"}}]}}]}"#,
            )
            .create();

        let client = OpenAiClient::new(&server.url(), "secret").expect("client");
        let tools = vec![json!({"type": "function", "function": {"name": "list_files"}})];
        let reply = client
            .complete("openai/gpt-4.1", &[ChatMessage::user("hi")], &tools)
            .expect("reply");
        mock.assert();
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].function.name, "list_files");
    }

    #[test]
    fn openai_client_surfaces_http_errors() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create();
        let client = OpenAiClient::new(&server.url(), "secret").expect("client");
        let err = client.complete("m", &[], &[]).expect_err("429");
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }
}
