use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Main configuration structure, loaded from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub jira: JiraConfig,
    pub confluence: ConfluenceConfig,
    pub slack: SlackConfig,
    pub github: GithubConfig,
    pub teams: Vec<Team>,
    pub daily: DailyConfig,
    pub release: ReleaseConfig,
}

/// Jira connection and query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    pub endpoint: String,
    pub user: String,
    pub token: String,
    /// Display name of the Jira server, as the wiki's jira macro wants it.
    pub server: String,
    /// Server id of the Jira server, paired with `server` in the macro.
    pub server_id: String,
    pub project: String,
    /// JQL fragment scoping personal weekly queries to the team backlog.
    /// Interpolated verbatim, never interpreted.
    pub weekly_scope: String,
    /// Comma-separated status names that mean "no longer being worked on".
    pub non_process_status: String,
    /// Statuses excluded from the due-date report widgets.
    pub stop_status: String,
    /// Custom field id holding the free-text progress note.
    pub progress_field: String,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            user: String::new(),
            token: String::new(),
            server: String::new(),
            server_id: String::new(),
            project: String::new(),
            weekly_scope: String::new(),
            non_process_status: String::new(),
            stop_status:
                r#""Job Closed",Closed,"CAN'T REPRODUCE",Paused,Blocked,TODO,"To Do""#.to_string(),
            progress_field: "customfield_11100".to_string(),
        }
    }
}

/// Confluence connection and page-tree configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    pub endpoint: String,
    pub user: String,
    pub token: String,
    pub space: String,
    /// Title of the parent page for weekly due-date reports.
    pub weekly_parent: String,
    /// Title of the parent page for personal weekly reports.
    pub personal_parent: String,
}

/// Slack connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub token: String,
    pub channel: String,
    /// Bot display name used when posting.
    pub user: String,
}

/// GitHub search configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub token: String,
    /// Search qualifier scoping queries to the team's repositories,
    /// e.g. `org:example` or `repo:example/server`.
    pub search_scope: String,
}

/// A team of members to report on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub members: Vec<Member>,
}

/// One team member's identities across the tracker, code host and chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub email: String,
    pub github: String,
}

/// Daily digest configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    pub on_lookup_failure: LookupFailurePolicy,
}

/// What to do when one member's code-host lookup fails mid-collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Abort the whole report run.
    #[default]
    Fail,
    /// Log a warning, keep what was already collected, move on.
    Skip,
}

/// Release report and release link configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Key of the umbrella release issue the report is rooted at.
    pub umbrella_issue: String,
    pub issue_links: Vec<IssueLinkRule>,
}

/// Rule for linking release epics to an umbrella issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueLinkRule {
    pub link_to: String,
    pub labels: Vec<String>,
    pub release_version: String,
}

impl Config {
    /// Load configuration from a YAML file. A missing file is a startup
    /// error, not a silent default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// Fail fast on configuration that would only blow up mid-report.
    pub fn validate(&self) -> Result<()> {
        if self.jira.endpoint.is_empty() {
            anyhow::bail!("jira.endpoint is required");
        }
        if self.slack.channel.is_empty() {
            anyhow::bail!("slack.channel is required");
        }
        if self.teams.iter().all(|t| t.members.is_empty()) {
            anyhow::bail!("at least one team member must be configured");
        }
        Ok(())
    }

    /// All members across all teams, in configuration order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.teams.iter().flat_map(|t| t.members.iter())
    }

    /// All member emails, in configuration order.
    pub fn member_emails(&self) -> Vec<&str> {
        self.members().map(|m| m.email.as_str()).collect()
    }

    /// Resolve a code-host login back to the member's email.
    pub fn email_for_github(&self, login: &str) -> Option<&str> {
        self.members()
            .find(|m| m.github.eq_ignore_ascii_case(login))
            .map(|m| m.email.as_str())
    }

    /// True when the login belongs to a configured team member.
    pub fn is_team_login(&self, login: &str) -> bool {
        self.members().any(|m| m.github.eq_ignore_ascii_case(login))
    }
}
