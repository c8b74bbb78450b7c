//! Best-effort chat notifications (Slack, Discord).

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

pub const SLACK_API: &str = "https://slack.com/api";
pub const DISCORD_API: &str = "https://discord.com/api/v10";

/// One delivery target for notifications.
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, message: &str) -> Result<()>;
}

/// Fans a message out to every configured channel.
///
/// A failing channel is logged and never affects the other channels or the
/// caller.
#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn add(&mut self, channel: Box<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send `message` to every channel; returns how many deliveries succeeded.
    pub fn notify_all(&self, message: &str) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(message) {
                Ok(()) => {
                    debug!(channel = channel.name(), "notification sent");
                    delivered += 1;
                }
                Err(err) => {
                    warn!(channel = channel.name(), err = %format!("{err:#}"), "notification failed");
                }
            }
        }
        delivered
    }

    /// Channels whose credentials are present in the environment.
    ///
    /// Reads `SLACK_BOT_TOKEN`/`SLACK_CHANNEL` and `DISCORD_BOT_TOKEN`/`DISCORD_CHANNEL_ID`.
    /// Missing variables skip that channel with a warning.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut notifier = Notifier::default();
        match (lookup("SLACK_BOT_TOKEN"), lookup("SLACK_CHANNEL")) {
            (Some(token), Some(channel)) => match SlackChannel::new(SLACK_API, &token, &channel) {
                Ok(slack) => notifier.add(Box::new(slack)),
                Err(err) => warn!(err = %format!("{err:#}"), "slack notifications disabled"),
            },
            _ => warn!("SLACK_BOT_TOKEN or SLACK_CHANNEL not set, skipping slack notifications"),
        }
        match (lookup("DISCORD_BOT_TOKEN"), lookup("DISCORD_CHANNEL_ID")) {
            (Some(token), Some(channel)) => match DiscordChannel::new(DISCORD_API, &token, &channel) {
                Ok(discord) => notifier.add(Box::new(discord)),
                Err(err) => warn!(err = %format!("{err:#}"), "discord notifications disabled"),
            },
            _ => warn!("DISCORD_BOT_TOKEN or DISCORD_CHANNEL_ID not set, skipping discord notifications"),
        }
        info!(channels = ?notifier.channel_names(), "notification channels configured");
        notifier
    }
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("build notification http client")
}

/// Slack `chat.postMessage`.
pub struct SlackChannel {
    http: Client,
    api_base: String,
    token: String,
    channel: String,
}

impl SlackChannel {
    pub fn new(api_base: &str, token: &str, channel: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            channel: channel.to_string(),
        })
    }
}

impl NotificationChannel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    fn send(&self, message: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.token)
            .json(&json!({"channel": self.channel, "text": message}))
            .send()
            .context("slack request")?;
        let status = response.status();
        if !status.is_success() {
            bail!("slack returned {status}");
        }
        // Slack reports API errors with HTTP 200 and `ok: false`.
        let body: Value = response.json().context("decode slack response")?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = body.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(anyhow!("slack rejected message: {reason}"));
        }
        Ok(())
    }
}

/// Discord bot channel message.
pub struct DiscordChannel {
    http: Client,
    api_base: String,
    token: String,
    channel_id: String,
}

impl DiscordChannel {
    pub fn new(api_base: &str, token: &str, channel_id: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            channel_id: channel_id.to_string(),
        })
    }
}

impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn send(&self, message: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/channels/{}/messages", self.api_base, self.channel_id))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({"content": message}))
            .send()
            .context("discord request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("discord returned {status}: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingChannel;
    use mockito::Matcher;

    struct FailingChannel;

    impl NotificationChannel for FailingChannel {
        fn name(&self) -> &str {
            "failing"
        }

        fn send(&self, _message: &str) -> Result<()> {
            Err(anyhow!("offline"))
        }
    }

    #[test]
    fn failing_channel_does_not_block_others() {
        let recorder = RecordingChannel::default();
        let notifier = Notifier::new(vec![Box::new(FailingChannel), Box::new(recorder.clone())]);
        assert_eq!(notifier.notify_all("hello"), 1);
        assert_eq!(recorder.messages(), vec!["hello".to_string()]);
    }

    #[test]
    fn from_env_skips_channels_without_credentials() {
        let notifier = Notifier::from_env(|key| match key {
            "DISCORD_BOT_TOKEN" => Some("t".to_string()),
            "DISCORD_CHANNEL_ID" => Some("42".to_string()),
            "SLACK_BOT_TOKEN" => Some("t".to_string()),
            _ => None,
        });
        assert_eq!(notifier.channel_names(), vec!["discord"]);
    }

    #[test]
    fn slack_ok_false_is_an_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::Json(json!({"channel": "C1", "text": "done"})))
            .with_status(200)
            .with_body(r#"{"ok": false, "error": "channel_not_found"}"#)
            .create();
        let slack = SlackChannel::new(&server.url(), "xoxb", "C1").expect("slack");
        let err = slack.send("done").expect_err("rejected");
        mock.assert();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[test]
    fn discord_posts_bot_message() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/channels/42/messages")
            .match_header("authorization", "Bot secret")
            .with_status(200)
            .with_body("{}")
            .create();
        let discord = DiscordChannel::new(&server.url(), "secret", "42").expect("discord");
        discord.send("MVP reached").expect("sent");
        mock.assert();
    }
}
