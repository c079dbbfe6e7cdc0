use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::JiraConfig;
use crate::models::{Assignee, Issue, IssueType, Worklog};

/// Field-selection policy for a tracker search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: u32,
    /// Field names to fetch; empty means the server default set,
    /// `["*all"]` fetches everything (worklogs, subtasks, custom fields).
    pub fields: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            fields: Vec::new(),
        }
    }
}

impl SearchOptions {
    /// Fetch every field, needed wherever worklogs or subtasks matter.
    pub fn all_fields() -> Self {
        Self {
            max_results: 100,
            fields: vec!["*all".to_string()],
        }
    }
}

/// Seam for anything that answers JQL queries with issue snapshots.
///
/// The epic expander and the report assemblers only depend on this trait,
/// so tests drive them with an in-memory fake instead of a live tracker.
pub trait IssueSource {
    fn search(
        &self,
        jql: &str,
        opts: &SearchOptions,
    ) -> impl std::future::Future<Output = Result<Vec<Issue>>> + Send;
}

/// Jira REST client (basic auth).
pub struct JiraClient {
    http: Client,
    endpoint: String,
    user: String,
    token: String,
    progress_field: String,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            token: config.token.clone(),
            progress_field: config.progress_field.clone(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.token))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to call Jira: {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jira API error ({status}) on {path}: {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Jira response from {path}"))
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.token))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call Jira: {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jira API error ({status}) on {path}: {body}");
        }

        Ok(())
    }

    /// Id of the team's scrum board for the given project.
    pub async fn board_id(&self, project: &str) -> Result<u64> {
        let boards: BoardList = self
            .get_json(
                "/rest/agile/1.0/board",
                &[
                    ("projectKeyOrId", project.to_string()),
                    ("type", "scrum".to_string()),
                ],
            )
            .await?;

        let board = boards
            .values
            .first()
            .with_context(|| format!("No scrum board found for project {project}"))?;

        Ok(board.id)
    }

    /// The currently active sprint on a board.
    pub async fn active_sprint(&self, board_id: u64) -> Result<Sprint> {
        let sprints: SprintList = self
            .get_json(
                &format!("/rest/agile/1.0/board/{board_id}/sprint"),
                &[("state", "active".to_string())],
            )
            .await?;

        sprints
            .values
            .into_iter()
            .next()
            .with_context(|| format!("No active sprint on board {board_id}"))
    }

    /// Create the follow-up sprint starting where the previous one ended.
    pub async fn create_next_sprint(&self, board_id: u64, after: DateTime<Utc>) -> Result<Sprint> {
        let start = after;
        let end = after + Duration::days(7);

        let body = serde_json::json!({
            "name": format!("Sprint {}", start.format("%Y-%m-%d")),
            "originBoardId": board_id,
            "startDate": start.to_rfc3339(),
            "endDate": end.to_rfc3339(),
        });

        let url = format!("{}/rest/agile/1.0/sprint", self.endpoint);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.token))
            .json(&body)
            .send()
            .await
            .context("Failed to create sprint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jira API error ({status}) creating sprint: {body}");
        }

        let sprint: Sprint = response
            .json()
            .await
            .context("Failed to parse created sprint")?;

        info!(id = sprint.id, name = %sprint.name, "Created sprint");

        Ok(sprint)
    }

    /// Transition a sprint to `closed` or `active`.
    pub async fn update_sprint_state(&self, sprint_id: u64, state: &str) -> Result<()> {
        info!(sprint_id, state, "Updating sprint state");
        self.post_json(
            &format!("/rest/agile/1.0/sprint/{sprint_id}"),
            &serde_json::json!({ "state": state }),
        )
        .await
    }

    /// Move issues into a sprint.
    pub async fn move_issues_to_sprint(&self, sprint_id: u64, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        info!(sprint_id, count = keys.len(), "Moving issues to sprint");
        self.post_json(
            &format!("/rest/agile/1.0/sprint/{sprint_id}/issue"),
            &serde_json::json!({ "issues": keys }),
        )
        .await
    }

    /// Create a "Relates" link between two issues.
    pub async fn link_issues(&self, inward_key: &str, outward_key: &str) -> Result<()> {
        info!(inward_key, outward_key, "Linking issues");
        self.post_json(
            "/rest/api/2/issueLink",
            &serde_json::json!({
                "type": { "name": "Relates" },
                "inwardIssue": { "key": inward_key },
                "outwardIssue": { "key": outward_key },
            }),
        )
        .await
    }
}

impl IssueSource for JiraClient {
    async fn search(&self, jql: &str, opts: &SearchOptions) -> Result<Vec<Issue>> {
        debug!(jql, max_results = opts.max_results, "Searching Jira");

        let mut query = vec![
            ("jql", jql.to_string()),
            ("maxResults", opts.max_results.to_string()),
        ];
        if !opts.fields.is_empty() {
            query.push(("fields", opts.fields.join(",")));
        }

        let response: SearchResponse = self.get_json("/rest/api/2/search", &query).await?;

        let issues: Vec<Issue> = response
            .issues
            .into_iter()
            .map(|raw| raw.into_issue(&self.progress_field))
            .collect();

        debug!(count = issues.len(), "Jira search complete");

        Ok(issues)
    }
}

/// Sprint record from the agile API. Dates stay raw strings since Jira's
/// offset format is not RFC 3339; use [`parse_jira_datetime`] at the point
/// of use.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SprintList {
    #[serde(default)]
    values: Vec<Sprint>,
}

#[derive(Debug, Deserialize)]
struct BoardList {
    #[serde(default)]
    values: Vec<Board>,
}

#[derive(Debug, Deserialize)]
struct Board {
    id: u64,
}

/// Parse Jira's `2019-05-06T10:12:01.000+0800` timestamp flavor, RFC 3339
/// accepted as well.
pub fn parse_jira_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Debug, Default, Deserialize)]
struct RawFields {
    issuetype: Option<NamedField>,
    status: Option<NamedField>,
    summary: Option<String>,
    assignee: Option<RawAssignee>,
    duedate: Option<String>,
    #[serde(default)]
    subtasks: Vec<RawIssueRef>,
    worklog: Option<RawWorklogs>,
    /// Everything else, so the configured progress custom field can be
    /// fished out without a schema for it.
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssignee {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct RawIssueRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct RawWorklogs {
    #[serde(default)]
    worklogs: Vec<RawWorklogRecord>,
}

#[derive(Debug, Deserialize)]
struct RawWorklogRecord {
    comment: Option<String>,
    updated: Option<String>,
}

impl RawIssue {
    /// Missing or ill-shaped fields default to absent; a data-shape
    /// problem never fails the run.
    fn into_issue(self, progress_field: &str) -> Issue {
        let fields = self.fields;

        let type_name = fields.issuetype.map(|t| t.name).unwrap_or_default();
        let issue_type = IssueType::parse(&type_name);

        let progress = fields
            .extra
            .get(progress_field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let worklogs = fields
            .worklog
            .map(|w| {
                w.worklogs
                    .into_iter()
                    .filter_map(|r| {
                        let updated = parse_jira_datetime(r.updated.as_deref()?)?;
                        Some(Worklog {
                            comment: r.comment.unwrap_or_default(),
                            updated,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Issue {
            key: self.key,
            type_name,
            issue_type,
            status: fields.status.map(|s| s.name).unwrap_or_default(),
            summary: fields.summary.unwrap_or_default(),
            assignee: fields.assignee.map(|a| Assignee {
                display_name: a.display_name,
                email: a.email_address,
            }),
            due_date: fields
                .duedate
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            subtask_keys: fields.subtasks.into_iter().map(|s| s.key).collect(),
            worklogs,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> JiraClient {
        JiraClient::new(&JiraConfig {
            endpoint: server.uri(),
            user: "bot".to_string(),
            token: "secret".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_search_deserializes_full_issue() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "issues": [{
                "key": "TR-1",
                "fields": {
                    "issuetype": { "name": "Epic" },
                    "status": { "name": "In Progress" },
                    "summary": "Build the thing",
                    "assignee": {
                        "displayName": "Alice",
                        "emailAddress": "alice@example.com"
                    },
                    "duedate": "2024-03-20",
                    "subtasks": [{ "key": "TR-2" }, { "key": "TR-3" }],
                    "worklog": {
                        "worklogs": [{
                            "comment": "wired up the API",
                            "updated": "2024-03-15T10:12:01.000+0800"
                        }]
                    },
                    "customfield_11100": "80% done"
                }
            }]
        });

        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = TR"))
            .and(query_param("fields", "*all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let issues = client
            .search("project = TR", &SearchOptions::all_fields())
            .await
            .unwrap();

        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.key, "TR-1");
        assert_eq!(issue.issue_type, IssueType::Epic);
        assert_eq!(issue.type_name, "Epic");
        assert_eq!(issue.assignee.as_ref().unwrap().email, "alice@example.com");
        assert_eq!(issue.subtask_keys, vec!["TR-2", "TR-3"]);
        assert_eq!(issue.worklogs.len(), 1);
        assert_eq!(issue.progress.as_deref(), Some("80% done"));
        assert!(issue.due_date.is_some());
    }

    #[tokio::test]
    async fn test_search_defaults_missing_fields() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "issues": [{ "key": "TR-9", "fields": {} }]
        });

        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let issues = client
            .search("key = TR-9", &SearchOptions::default())
            .await
            .unwrap();

        let issue = &issues[0];
        assert_eq!(issue.issue_type, IssueType::Standard);
        assert!(issue.assignee.is_none());
        assert!(issue.due_date.is_none());
        assert!(issue.subtask_keys.is_empty());
        assert!(issue.worklogs.is_empty());
        assert!(issue.progress.is_none());
    }

    #[tokio::test]
    async fn test_search_propagates_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad jql"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .search("nonsense ===", &SearchOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_link_issues() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/api/2/issueLink"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.link_issues("REL-1", "TR-5").await.unwrap();
    }

    #[tokio::test]
    async fn test_board_and_active_sprint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/agile/1.0/board"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [{ "id": 42, "name": "TR board" }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/agile/1.0/board/42/sprint"))
            .and(query_param("state", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [{
                    "id": 7,
                    "name": "Sprint 12",
                    "state": "active",
                    "endDate": "2024-03-22T00:00:00.000Z"
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let board = client.board_id("TR").await.unwrap();
        assert_eq!(board, 42);

        let sprint = client.active_sprint(board).await.unwrap();
        assert_eq!(sprint.id, 7);
        assert!(parse_jira_datetime(sprint.end_date.as_deref().unwrap()).is_some());
    }

    #[test]
    fn test_parse_jira_datetime() {
        assert!(parse_jira_datetime("2019-05-06T10:12:01.000+0800").is_some());
        assert!(parse_jira_datetime("2024-03-22T00:00:00.000Z").is_some());
        assert!(parse_jira_datetime("not a date").is_none());
    }
}
