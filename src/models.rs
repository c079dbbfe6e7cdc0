use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Closed classification of a tracker issue type.
///
/// Epics are containers that get recursively expanded; everything else is
/// rendered as a flat line. Unrecognized type strings fall back to
/// `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Epic,
    Standard,
}

impl IssueType {
    /// Parse a free-form tracker type string, case-insensitively.
    pub fn parse(type_name: &str) -> Self {
        if type_name.eq_ignore_ascii_case("epic") {
            IssueType::Epic
        } else {
            IssueType::Standard
        }
    }

    pub fn is_epic(self) -> bool {
        self == IssueType::Epic
    }
}

/// Issue assignee identity as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub display_name: String,
    pub email: String,
}

/// A single worklog entry on an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worklog {
    pub comment: String,
    pub updated: DateTime<Utc>,
}

/// Read-only snapshot of a tracker issue, fetched once per report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    /// Type name as the tracker reports it, original casing kept for
    /// group headings.
    pub type_name: String,
    pub issue_type: IssueType,
    pub status: String,
    pub summary: String,
    pub assignee: Option<Assignee>,
    pub due_date: Option<NaiveDate>,
    /// Keys of explicit sub-task references.
    pub subtask_keys: Vec<String>,
    /// Worklog entries, oldest first (tracker order).
    pub worklogs: Vec<Worklog>,
    /// Free-text progress custom field, absent when the field is missing
    /// or not a string.
    pub progress: Option<String>,
}

impl Issue {
    /// Latest worklog entry updated within the past 7 days, if any.
    ///
    /// Weekly reports attach this as the issue's progress note.
    pub fn latest_weekly_worklog(&self, now: DateTime<Utc>) -> Option<&Worklog> {
        let latest = self.worklogs.last()?;
        if now.signed_duration_since(latest.updated) > Duration::days(7) {
            return None;
        }
        Some(latest)
    }
}

/// Open/closed state of a pull request or code-host issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Closed,
}

/// Snapshot of a pull request (or code-host issue) from a search result.
///
/// The web URL is the identity used for deduplication across members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestItem {
    pub url: String,
    pub title: String,
    pub author: String,
    pub state: PullState,
    pub assignees: Vec<String>,
}

/// One pull request together with every member it mentioned.
///
/// The item snapshot is first-write-wins; the mention list accumulates in
/// member-iteration order and intentionally preserves duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionRecord {
    pub item: PullRequestItem,
    pub mentioned: Vec<String>,
}
