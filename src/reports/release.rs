use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::expand::EpicExpander;
use crate::html;
use crate::jira::{IssueSource, JiraClient, SearchOptions};

/// Release report: the configured umbrella issue followed by the full
/// recursive expansion of everything linked to it.
pub async fn report_body(config: &Config, tracker: &(impl IssueSource + Sync)) -> Result<String> {
    let umbrella_key = &config.release.umbrella_issue;
    if umbrella_key.is_empty() {
        anyhow::bail!("release.umbrella_issue is not configured");
    }

    let issues = tracker
        .search(&format!("key = {umbrella_key}"), &SearchOptions::default())
        .await?;
    let umbrella = issues
        .first()
        .with_context(|| format!("Release umbrella issue not found: {umbrella_key}"))?;

    let mut buf = String::new();
    html::page_begin(&mut buf);
    html::section_begin(&mut buf);
    buf.push_str("<p>");

    html::issue_row(&mut buf, &config.jira, &umbrella.key);
    let expander = EpicExpander::new(tracker, &config.jira);
    expander.expand_linked(&mut buf, umbrella, None).await?;

    buf.push_str("</p>");
    html::section_end(&mut buf);
    html::page_end(&mut buf);

    Ok(buf)
}

/// Create "Relates" links from the umbrella issues to every epic matched
/// by the configured label/version rules.
pub async fn link(config: &Config, jira: &JiraClient) -> Result<()> {
    for rule in &config.release.issue_links {
        let epics = jira
            .search(
                &format!(
                    "labels in ({}) and fixVersion = {} and type = Epic",
                    rule.labels.join(","),
                    rule.release_version,
                ),
                &SearchOptions::default(),
            )
            .await?;

        info!(link_to = %rule.link_to, count = epics.len(), "Linking release epics");

        for epic in &epics {
            jira.link_issues(&rule.link_to, &epic.key).await?;
        }
    }

    Ok(())
}
