use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, SlackConfig};
use crate::models::{Issue, MentionRecord, PullRequestItem, PullState};

pub const SLACK_API: &str = "https://slack.com/api";

/// Failure while bringing up the chat client.
///
/// Initialization is an explicit step: the member directory is loaded
/// eagerly so a permission problem surfaces at startup, not on the first
/// mention mid-report.
#[derive(Debug, Error)]
pub enum SlackInitError {
    #[error("slack channel is not configured")]
    MissingChannel,
    #[error("slack API returned an error: {0}")]
    Api(String),
    #[error(
        "slack user list is empty; the app needs `users:read` and `users:read.email` permissions"
    )]
    EmptyUserList,
    #[error("failed to reach slack")]
    Transport(#[from] reqwest::Error),
}

/// Chat client: fire-and-forget channel posts plus best-effort member
/// mention resolution by email.
#[derive(Debug)]
pub struct SlackClient {
    http: Client,
    api: String,
    token: String,
    channel: String,
    user: String,
    /// Lower-cased email to workspace user id.
    directory: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    members: Vec<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

impl SlackClient {
    /// Connect to the Slack Web API and load the member directory.
    pub async fn connect(config: &SlackConfig) -> Result<Self, SlackInitError> {
        Self::connect_to(SLACK_API, config).await
    }

    /// Same as [`connect`](Self::connect) against a custom API base.
    pub async fn connect_to(api: &str, config: &SlackConfig) -> Result<Self, SlackInitError> {
        if config.channel.is_empty() {
            return Err(SlackInitError::MissingChannel);
        }

        let channel = if config.channel.starts_with('#') {
            config.channel.clone()
        } else {
            format!("#{}", config.channel)
        };

        let http = Client::new();

        let response: UsersListResponse = http
            .get(format!("{api}/users.list"))
            .bearer_auth(&config.token)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(SlackInitError::Api(
                response.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        if response.members.is_empty() {
            return Err(SlackInitError::EmptyUserList);
        }

        let directory: HashMap<String, String> = response
            .members
            .into_iter()
            .filter_map(|u| Some((u.profile.email?.to_lowercase(), u.id)))
            .collect();

        info!(members = directory.len(), "Connected to Slack");

        Ok(Self {
            http,
            api: api.to_string(),
            token: config.token.clone(),
            channel,
            user: config.user.clone(),
            directory,
        })
    }

    /// Mention token for a member email, or the escaped email when the
    /// workspace doesn't know it.
    pub fn mention(&self, email: &str) -> String {
        match self.directory.get(&email.to_lowercase()) {
            Some(id) => format!("<@{id}>"),
            None => escape(email),
        }
    }

    /// Post a message to the configured channel.
    pub async fn post(&self, text: &str) -> Result<()> {
        debug!(channel = %self.channel, "Posting to Slack");

        let payload = serde_json::json!({
            "channel": self.channel,
            "username": self.user,
            "text": text,
        });

        let response: PostMessageResponse = self
            .http
            .post(format!("{}/chat.postMessage", self.api))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send Slack message")?
            .json()
            .await
            .context("Failed to parse Slack response")?;

        if !response.ok {
            anyhow::bail!(
                "Slack post failed: {}",
                response.error.unwrap_or_else(|| "unknown".to_string())
            );
        }

        info!("Slack message sent");

        Ok(())
    }

    /// One merged mention line: PR link, author, and a mention token per
    /// member whose login maps back to a known email.
    pub fn mention_record_line(&self, config: &Config, record: &MentionRecord) -> String {
        let mentions: Vec<String> = record
            .mentioned
            .iter()
            .filter_map(|login| config.email_for_github(login))
            .map(|email| self.mention(email))
            .collect();

        if mentions.is_empty() {
            return "_None_".to_string();
        }

        format!(
            "{} mentioned: {}",
            pull_item_line(config, &record.item),
            mentions.join(","),
        )
    }

    /// One tracker issue line with a mention token for the assignee.
    pub fn issue_line(&self, jira_endpoint: &str, issue: &Issue) -> String {
        let link = format!("{}/browse/{}", jira_endpoint, issue.key);
        let status = if issue.status.is_empty() {
            "Unknown"
        } else {
            issue.status.as_str()
        };
        let due = issue
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut s = format!(
            "[ {} ] DueDate:{} <{}|{}>",
            escape(status),
            escape(&due),
            link,
            escape(&issue.summary),
        );

        if let Some(assignee) = &issue.assignee {
            s.push_str(&format!(" assigned to {}", self.mention(&assignee.email)));
        }

        s
    }

    pub fn issue_lines(&self, buf: &mut String, jira_endpoint: &str, issues: &[Issue]) {
        if issues.is_empty() {
            buf.push_str("_None_\n");
            return;
        }
        for issue in issues {
            buf.push_str(&format!("• {}\n", self.issue_line(jira_endpoint, issue)));
        }
    }

    pub fn mention_record_lines(&self, buf: &mut String, config: &Config, records: &[MentionRecord]) {
        if records.is_empty() {
            buf.push_str("_None_\n");
            return;
        }
        for record in records {
            buf.push_str(&format!("• {}\n", self.mention_record_line(config, record)));
        }
    }
}

/// Escape Slack control characters.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Section header: bold title and quoted description.
pub fn section(buf: &mut String, title: &str, description: &str) {
    buf.push_str(&format!("*{}*\n", escape(title)));
    buf.push_str(&format!("> {}\n", escape(description)));
}

/// One pull request line, tagged when closed or community-authored.
pub fn pull_item_line(config: &Config, item: &PullRequestItem) -> String {
    let closed = match item.state {
        PullState::Closed => " _(Closed)_",
        PullState::Open => "",
    };
    let community = if config.is_team_login(&item.author) {
        ""
    } else {
        " _(Community)_"
    };

    let mut s = format!(
        "{}{} <{}|{}> by @{}",
        closed,
        community,
        item.url,
        escape(&item.title),
        escape(&item.author),
    );

    if !item.assignees.is_empty() {
        s.push_str(", assigned to");
        for assignee in &item.assignees {
            s.push_str(&format!(" @{}", escape(assignee)));
        }
    }

    s
}
