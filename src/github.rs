use anyhow::{Context, Result};
use octocrab::models::IssueState;
use octocrab::Octocrab;
use tracing::debug;

use crate::config::GithubConfig;
use crate::models::{PullRequestItem, PullState};

/// Seam for the daily digest's "pull requests that mentioned you" lookup.
pub trait PullSource {
    fn mentions(
        &self,
        user: &str,
        since: &str,
        until: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<PullRequestItem>>> + Send;
}

/// GitHub search client for PR activity, scoped to the team repositories.
pub struct GitHubClient {
    client: Octocrab,
    search_scope: String,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            search_scope: config.search_scope.clone(),
        })
    }

    /// Pull requests authored by `user` in the window.
    pub async fn search_authored(
        &self,
        user: &str,
        since: &str,
        until: Option<&str>,
    ) -> Result<Vec<PullRequestItem>> {
        let query = build_query(
            &self.search_scope,
            &format!("type:pr author:{user}"),
            "created",
            since,
            until,
        );
        self.search(&query).await
    }

    /// Pull requests reviewed by `user` in the window.
    pub async fn search_reviewed(
        &self,
        user: &str,
        since: &str,
        until: Option<&str>,
    ) -> Result<Vec<PullRequestItem>> {
        let query = build_query(
            &self.search_scope,
            &format!("type:pr reviewed-by:{user}"),
            "updated",
            since,
            until,
        );
        self.search(&query).await
    }

    async fn search(&self, query: &str) -> Result<Vec<PullRequestItem>> {
        debug!(query, "Searching GitHub");

        let page = self
            .client
            .search()
            .issues_and_pull_requests(query)
            .per_page(100)
            .send()
            .await
            .with_context(|| format!("GitHub search failed: {query}"))?;

        let items: Vec<PullRequestItem> = page.items.iter().map(to_item).collect();

        debug!(count = items.len(), "GitHub search complete");

        Ok(items)
    }
}

impl PullSource for GitHubClient {
    async fn mentions(
        &self,
        user: &str,
        since: &str,
        until: Option<&str>,
    ) -> Result<Vec<PullRequestItem>> {
        let query = build_query(
            &self.search_scope,
            &format!("type:pr mentions:{user}"),
            "updated",
            since,
            until,
        );
        self.search(&query).await
    }
}

fn to_item(issue: &octocrab::models::issues::Issue) -> PullRequestItem {
    PullRequestItem {
        url: issue.html_url.to_string(),
        title: issue.title.clone(),
        author: issue.user.login.clone(),
        state: match issue.state {
            IssueState::Closed => PullState::Closed,
            _ => PullState::Open,
        },
        assignees: issue.assignees.iter().map(|a| a.login.clone()).collect(),
    }
}

/// Assemble a search query with a date window and the configured repo
/// scope fragment.
fn build_query(
    scope: &str,
    base: &str,
    date_field: &str,
    since: &str,
    until: Option<&str>,
) -> String {
    let window = match until {
        Some(until) => format!("{date_field}:{since}..{until}"),
        None => format!("{date_field}:>={since}"),
    };

    if scope.is_empty() {
        format!("{base} {window}")
    } else {
        format!("{base} {window} {scope}")
    }
}
