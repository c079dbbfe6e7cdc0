use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ConfluenceConfig;

/// A wiki page, as much of it as publishing needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub space: SpaceRef,
    #[serde(default, rename = "_links")]
    pub links: Links,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub number: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpaceRef {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub webui: String,
}

/// Confluence REST client (basic auth). The wiki is treated as a
/// key-value document store keyed by (space, title).
pub struct ConfluenceClient {
    http: Client,
    endpoint: String,
    user: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentList {
    #[serde(default)]
    results: Vec<Content>,
}

impl ConfluenceClient {
    pub fn new(config: &ConfluenceConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            token: config.token.clone(),
        }
    }

    /// Look up a page by space and title.
    pub async fn get_by_title(&self, space: &str, title: &str) -> Result<Option<Content>> {
        let url = format!("{}/rest/api/content", self.endpoint);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.token))
            .query(&[
                ("title", title),
                ("spaceKey", space),
                ("expand", "version.number,space.key"),
            ])
            .send()
            .await
            .context("Failed to query wiki content")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Confluence API error ({status}): {body}");
        }

        let list: ContentList = response
            .json()
            .await
            .context("Failed to parse wiki content list")?;

        Ok(list.results.into_iter().next())
    }

    /// Create a page under a parent.
    pub async fn create(
        &self,
        space: &str,
        parent_id: &str,
        title: &str,
        body: &str,
    ) -> Result<Content> {
        debug!(space, title, "Creating wiki page");

        let payload = serde_json::json!({
            "type": "page",
            "title": title,
            "space": { "key": space },
            "ancestors": [{ "id": parent_id }],
            "body": {
                "storage": { "value": body, "representation": "storage" }
            }
        });

        let url = format!("{}/rest/api/content", self.endpoint);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.token))
            .json(&payload)
            .send()
            .await
            .context("Failed to create wiki page")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Confluence API error ({status}) creating page: {body}");
        }

        let content: Content = response
            .json()
            .await
            .context("Failed to parse created wiki page")?;

        info!(id = %content.id, title, "Created wiki page");

        Ok(content)
    }

    /// Replace a page's body, bumping the version number.
    ///
    /// No compare-and-set: two runs updating the same title can overwrite
    /// each other. Known limitation of the single-writer usage model.
    pub async fn update(&self, content: &Content, body: &str) -> Result<Content> {
        debug!(id = %content.id, title = %content.title, "Updating wiki page");

        let payload = serde_json::json!({
            "id": content.id,
            "type": "page",
            "title": content.title,
            "space": { "key": content.space.key },
            "version": { "number": content.version.number + 1 },
            "body": {
                "storage": { "value": body, "representation": "storage" }
            }
        });

        let url = format!("{}/rest/api/content/{}", self.endpoint, content.id);
        let response = self
            .http
            .put(&url)
            .basic_auth(&self.user, Some(&self.token))
            .json(&payload)
            .send()
            .await
            .context("Failed to update wiki page")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Confluence API error ({status}) updating page: {body}");
        }

        let content: Content = response
            .json()
            .await
            .context("Failed to parse updated wiki page")?;

        info!(id = %content.id, "Updated wiki page");

        Ok(content)
    }

    /// Read-then-write upsert keyed by (space, title). The parent page
    /// must already exist; its title anchors where new pages land.
    pub async fn upsert(
        &self,
        space: &str,
        parent_title: &str,
        title: &str,
        body: &str,
    ) -> Result<Content> {
        if let Some(existing) = self.get_by_title(space, title).await? {
            return self.update(&existing, body).await;
        }

        let parent = self
            .get_by_title(space, parent_title)
            .await?
            .with_context(|| format!("Parent page not found: {space}/{parent_title}"))?;

        self.create(space, &parent.id, title, body).await
    }
}
