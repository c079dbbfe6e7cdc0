use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::{Config, LookupFailurePolicy};
use crate::github::PullSource;
use crate::jira::{IssueSource, SearchOptions};
use crate::mentions::MentionCollector;
use crate::slack::{self, SlackClient};

const GITHUB_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Assemble and deliver the daily Slack digest: merged PR mentions per
/// member, team issues updated in the last day, and issues closing in on
/// their due date.
pub async fn run(
    config: &Config,
    tracker: &impl IssueSource,
    pulls: &impl PullSource,
    chat: &SlackClient,
    print: bool,
) -> Result<()> {
    let text = build(config, tracker, pulls, chat).await?;

    if print {
        println!("{text}");
    } else {
        chat.post(&text).await?;
    }

    info!("Daily report complete");

    Ok(())
}

/// Build the digest text without delivering it.
pub async fn build(
    config: &Config,
    tracker: &impl IssueSource,
    pulls: &impl PullSource,
    chat: &SlackClient,
) -> Result<String> {
    let now = Utc::now();
    let since = (now - Duration::hours(24)).format(GITHUB_DATE_FORMAT).to_string();

    let mut buf = String::from("*Daily Report*\n\n");

    let collector = collect_mentions(config, pulls, &since).await?;
    slack::section(
        &mut buf,
        "Pull Requests that mentioned you",
        "PRs that mentioned you in the last 24 hours",
    );
    chat.mention_record_lines(&mut buf, config, collector.records());
    buf.push('\n');

    let emails = config.member_emails().join(",");

    let updated = tracker
        .search(
            &format!("assignee in ({emails}) AND updated >= -1d ORDER BY assignee"),
            &SearchOptions::default(),
        )
        .await?;
    slack::section(&mut buf, "Team Tracker Issues", "Updated in the last 24 hours");
    chat.issue_lines(&mut buf, &config.jira.endpoint, &updated);
    buf.push('\n');

    let due_soon = tracker
        .search(
            &format!(
                "status not in ({}) AND assignee in ({emails}) and duedate <= 2d ORDER BY assignee",
                config.jira.non_process_status,
            ),
            &SearchOptions::default(),
        )
        .await?;
    slack::section(
        &mut buf,
        "Getting To Due Date Tracker Issues",
        "The due date is less than 2 days away",
    );
    chat.issue_lines(&mut buf, &config.jira.endpoint, &due_soon);
    buf.push('\n');

    Ok(buf)
}

/// Scan every member's mention search and merge the results by item URL.
///
/// A member whose lookup fails either aborts the run or is skipped with a
/// warning, per the configured policy; accumulation for prior members is
/// kept either way.
async fn collect_mentions(
    config: &Config,
    pulls: &impl PullSource,
    since: &str,
) -> Result<MentionCollector> {
    let mut collector = MentionCollector::new();

    for member in config.members() {
        match pulls.mentions(&member.github, since, None).await {
            Ok(items) => collector.add(&member.github, items),
            Err(err) => match config.daily.on_lookup_failure {
                LookupFailurePolicy::Fail => {
                    return Err(err)
                        .with_context(|| format!("Mention lookup failed for {}", member.github));
                }
                LookupFailurePolicy::Skip => {
                    warn!(member = %member.github, error = %err, "Skipping member after failed mention lookup");
                }
            },
        }
    }

    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DailyConfig, Member, SlackConfig, Team};
    use crate::models::{Issue, PullRequestItem, PullState};
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakePulls {
        by_member: HashMap<String, Vec<PullRequestItem>>,
        failing: Vec<String>,
    }

    impl PullSource for FakePulls {
        async fn mentions(
            &self,
            user: &str,
            _since: &str,
            _until: Option<&str>,
        ) -> Result<Vec<PullRequestItem>> {
            if self.failing.iter().any(|f| f == user) {
                anyhow::bail!("search exploded for {user}");
            }
            Ok(self.by_member.get(user).cloned().unwrap_or_default())
        }
    }

    struct FakeTracker;

    impl IssueSource for FakeTracker {
        async fn search(&self, _jql: &str, _opts: &SearchOptions) -> Result<Vec<Issue>> {
            Ok(Vec::new())
        }
    }

    fn config() -> Config {
        Config {
            teams: vec![Team {
                name: "Infra".to_string(),
                members: vec![
                    Member {
                        name: "Alice".to_string(),
                        email: "alice@example.com".to_string(),
                        github: "alice-gh".to_string(),
                    },
                    Member {
                        name: "Bob".to_string(),
                        email: "bob@example.com".to_string(),
                        github: "bob-gh".to_string(),
                    },
                ],
            }],
            ..Default::default()
        }
    }

    fn pr(url: &str) -> PullRequestItem {
        PullRequestItem {
            url: url.to_string(),
            title: "title".to_string(),
            author: "alice-gh".to_string(),
            state: PullState::Open,
            assignees: Vec::new(),
        }
    }

    async fn chat_client(server: &MockServer) -> SlackClient {
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "members": [
                    { "id": "U001", "profile": { "email": "alice@example.com" } },
                    { "id": "U002", "profile": { "email": "bob@example.com" } }
                ]
            })))
            .mount(server)
            .await;

        SlackClient::connect_to(
            &server.uri(),
            &SlackConfig {
                token: "xoxb".to_string(),
                channel: "status".to_string(),
                user: "bot".to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_collect_mentions_merges_by_url_in_member_order() {
        let config = config();
        let mut by_member = HashMap::new();
        by_member.insert("alice-gh".to_string(), vec![pr("https://host/pr/5")]);
        by_member.insert("bob-gh".to_string(), vec![pr("https://host/pr/5")]);
        let pulls = FakePulls {
            by_member,
            failing: Vec::new(),
        };

        let collector = collect_mentions(&config, &pulls, "2024-03-14T00:00:00Z")
            .await
            .unwrap();

        assert_eq!(collector.len(), 1);
        let record = collector.get("https://host/pr/5").unwrap();
        assert_eq!(record.mentioned, vec!["alice-gh", "bob-gh"]);
    }

    #[tokio::test]
    async fn test_collect_mentions_fail_policy_aborts() {
        let config = config();
        let pulls = FakePulls {
            by_member: HashMap::new(),
            failing: vec!["bob-gh".to_string()],
        };

        let err = collect_mentions(&config, &pulls, "2024-03-14T00:00:00Z")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bob-gh"));
    }

    #[tokio::test]
    async fn test_collect_mentions_skip_policy_keeps_prior_members() {
        let mut config = config();
        config.daily = DailyConfig {
            on_lookup_failure: LookupFailurePolicy::Skip,
        };
        let mut by_member = HashMap::new();
        by_member.insert("alice-gh".to_string(), vec![pr("https://host/pr/9")]);
        let pulls = FakePulls {
            by_member,
            failing: vec!["bob-gh".to_string()],
        };

        let collector = collect_mentions(&config, &pulls, "2024-03-14T00:00:00Z")
            .await
            .unwrap();

        assert_eq!(collector.len(), 1);
        assert!(collector.get("https://host/pr/9").is_some());
    }

    #[tokio::test]
    async fn test_build_digest_sections() {
        let server = MockServer::start().await;
        let chat = chat_client(&server).await;
        let config = config();

        let mut by_member = HashMap::new();
        by_member.insert("alice-gh".to_string(), vec![pr("https://host/pr/5")]);
        by_member.insert("bob-gh".to_string(), vec![pr("https://host/pr/5")]);
        let pulls = FakePulls {
            by_member,
            failing: Vec::new(),
        };

        let text = build(&config, &FakeTracker, &pulls, &chat).await.unwrap();

        assert!(text.starts_with("*Daily Report*"));
        assert!(text.contains("*Pull Requests that mentioned you*"));
        assert!(text.contains("mentioned: <@U001>,<@U002>"));
        assert!(text.contains("*Team Tracker Issues*"));
        // Empty tracker sections render as None, not nothing.
        assert!(text.contains("_None_"));
    }
}
