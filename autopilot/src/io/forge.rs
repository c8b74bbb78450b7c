//! Hosted source control (issues, pull requests, branches).

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::io::completion::RetryPolicy;

pub const GITHUB_API: &str = "https://api.github.com";

/// Three attempts, backing off from 2s up to 10s.
pub const FORGE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    initial_backoff: Duration::from_secs(2),
    max_backoff: Duration::from_secs(10),
};

/// Number and title of an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Source-control operations the engine and the forge tools rely on.
pub trait SourceControl: Send + Sync {
    fn open_issues(&self) -> Result<Vec<IssueSummary>>;
    fn open_pull_requests(&self) -> Result<Vec<IssueSummary>>;
    fn create_branch(&self, name: &str, base: &str) -> Result<()>;
    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<IssueSummary>;
}

/// GitHub REST v3 client for one repository.
pub struct GitHubForge {
    http: Client,
    api_base: String,
    repo: String,
    token: String,
    retry: RetryPolicy,
}

impl GitHubForge {
    pub fn new(repo: &str, token: &str) -> Result<Self> {
        Self::with_api_base(GITHUB_API, repo, token)
    }

    pub fn with_api_base(api_base: &str, repo: &str, token: &str) -> Result<Self> {
        let valid = repo
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !valid {
            bail!("repository must be 'owner/name', got '{repo}'");
        }
        let http = Client::builder()
            .user_agent(concat!("autopilot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build GitHub http client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
            retry: FORGE_RETRY,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.repo, path)
    }

    /// Send with retries. Transport failures, 429 and 5xx responses are retried;
    /// other error statuses fail at once.
    fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let mut attempt = 1;
        loop {
            let Some(current) = request.try_clone() else {
                bail!("GitHub {what} request cannot be sent");
            };
            let (retryable, err) = match current
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .send()
            {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json()
                        .with_context(|| format!("decode GitHub {what} response"));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().unwrap_or_default();
                    let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    (retryable, anyhow!("GitHub {what} returned {status}: {body}"))
                }
                Err(err) => (true, anyhow::Error::new(err).context(format!("GitHub {what}"))),
            };
            if !retryable || attempt >= self.retry.max_attempts {
                return Err(err);
            }
            let delay = self.retry.backoff(attempt);
            warn!(
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                err = %format!("{err:#}"),
                "GitHub request failed, retrying"
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    fn list(&self, path: &str, what: &str) -> Result<Vec<Value>> {
        let request = self
            .http
            .get(self.url(path))
            .query(&[("state", "open"), ("per_page", "30")]);
        match self.send(request, what)? {
            Value::Array(items) => Ok(items),
            other => Err(anyhow!("GitHub {what} returned a non-list: {other}")),
        }
    }
}

fn summary(item: &Value) -> Result<IssueSummary> {
    serde_json::from_value(json!({
        "number": item.get("number").cloned().unwrap_or(Value::Null),
        "title": item.get("title").cloned().unwrap_or(Value::Null),
    }))
    .context("decode issue summary")
}

impl SourceControl for GitHubForge {
    #[instrument(skip_all, fields(repo = %self.repo))]
    fn open_issues(&self) -> Result<Vec<IssueSummary>> {
        let items = self.list("issues", "list issues")?;
        // The issues endpoint also returns pull requests.
        items
            .iter()
            .filter(|item| item.get("pull_request").is_none())
            .map(summary)
            .collect()
    }

    #[instrument(skip_all, fields(repo = %self.repo))]
    fn open_pull_requests(&self) -> Result<Vec<IssueSummary>> {
        self.list("pulls", "list pull requests")?
            .iter()
            .map(summary)
            .collect()
    }

    #[instrument(skip_all, fields(repo = %self.repo, branch = name, base = base))]
    fn create_branch(&self, name: &str, base: &str) -> Result<()> {
        let base_ref = self.send(
            self.http.get(self.url(&format!("git/ref/heads/{base}"))),
            "read base branch",
        )?;
        let sha = base_ref
            .pointer("/object/sha")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("base branch '{base}' has no commit sha"))?;
        debug!(sha, "resolved base branch");
        self.send(
            self.http
                .post(self.url("git/refs"))
                .json(&json!({"ref": format!("refs/heads/{name}"), "sha": sha})),
            "create branch",
        )?;
        info!("branch created");
        Ok(())
    }

    #[instrument(skip_all, fields(repo = %self.repo, head = %draft.head, base = %draft.base))]
    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<IssueSummary> {
        let created = self.send(
            self.http.post(self.url("pulls")).json(&json!({
                "title": draft.title,
                "body": draft.body,
                "head": draft.head,
                "base": draft.base,
            })),
            "create pull request",
        )?;
        let pr = summary(&created)?;
        info!(number = pr.number, "pull request created");
        Ok(pr)
    }
}
