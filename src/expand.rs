use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::classify::RepeatChecker;
use crate::config::JiraConfig;
use crate::html;
use crate::jira::{IssueSource, SearchOptions};
use crate::models::Issue;

/// Safety net against cyclic link graphs. The one-hop parent exclusion
/// only breaks immediate back-edges; longer cycles (A→B→C→A) are cut by
/// this cap.
pub const MAX_DEPTH: usize = 20;

const LINKED_COLUMNS: &str = "key,summary,type,created,updated,due,assignee,priority,status,resolution";

/// Recursively renders an epic's children and linked epics into nested
/// storage-format markup.
///
/// Tracker failures propagate fatally: a half-rendered report is worse
/// than no report.
pub struct EpicExpander<'a, S> {
    source: &'a S,
    jira: &'a JiraConfig,
    depth_limit: usize,
}

impl<'a, S: IssueSource + Sync> EpicExpander<'a, S> {
    pub fn new(source: &'a S, jira: &'a JiraConfig) -> Self {
        Self {
            source,
            jira,
            depth_limit: MAX_DEPTH,
        }
    }

    #[cfg(test)]
    fn with_depth_limit(mut self, depth_limit: usize) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    /// Render an epic's own line, then its resolved children as a nested
    /// list. The epic itself is always shown; the visited set only
    /// governs whether an issue appears inside a list of children.
    pub async fn expand_epic(
        &self,
        buf: &mut String,
        epic: &Issue,
        visited: &mut RepeatChecker,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.expand_epic_at(buf, epic, visited, now, 0).await
    }

    fn expand_epic_at<'b>(
        &'b self,
        buf: &'b mut String,
        epic: &'b Issue,
        visited: &'b mut RepeatChecker,
        now: DateTime<Utc>,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        Box::pin(async move {
            html::issue_with_progress(buf, self.jira, None, epic, now);

            if depth >= self.depth_limit {
                warn!(key = %epic.key, depth, "Epic nesting too deep, not descending");
                return Ok(());
            }

            let children = self
                .source
                .search(&self.children_jql(epic), &SearchOptions::all_fields())
                .await?;
            if children.is_empty() {
                return Ok(());
            }

            buf.push_str("<ul>");
            for child in &children {
                if visited.check(&child.key) {
                    continue;
                }
                buf.push_str("<li>");
                if child.issue_type.is_epic() {
                    self.expand_epic_at(buf, child, visited, now, depth + 1)
                        .await?;
                } else {
                    html::issue_with_progress(buf, self.jira, Some(epic), child, now);
                }
                buf.push_str("</li>");
            }
            buf.push_str("</ul>");

            Ok(())
        })
    }

    /// Children of an epic: everything under its epic link, plus explicit
    /// sub-tasks when it has any, both restricted to the configured team
    /// scope (an opaque JQL fragment).
    fn children_jql(&self, epic: &Issue) -> String {
        let scope = &self.jira.weekly_scope;
        if epic.subtask_keys.is_empty() {
            format!(r#""Epic Link" = {} AND {}"#, epic.key, scope)
        } else {
            format!(
                r#"("Epic Link" = {} AND {}) OR (key in ({}) AND {})"#,
                epic.key,
                scope,
                epic.subtask_keys.join(","),
                scope,
            )
        }
    }

    /// Render an expand block of issues linked to `issue`: a server-side
    /// JQL widget for the non-epic ones, then a nested expand block per
    /// linked epic. `exclude_parent` is the issue that led here and keeps
    /// the expansion from stepping straight back into it.
    pub async fn expand_linked(
        &self,
        buf: &mut String,
        issue: &Issue,
        exclude_parent: Option<&Issue>,
    ) -> Result<()> {
        self.expand_linked_at(buf, issue, exclude_parent.map(|i| i.key.as_str()), 0)
            .await
    }

    fn expand_linked_at<'b>(
        &'b self,
        buf: &'b mut String,
        issue: &'b Issue,
        exclude_parent: Option<&'b str>,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        Box::pin(async move {
            buf.push_str(&format!(
                "<ac:structured-macro ac:name=\"expand\" ac:schema-version=\"1\">\
                 <ac:parameter ac:name=\"title\">{} linked issues</ac:parameter>\
                 <ac:rich-text-body>\n",
                html::escape(&issue.key),
            ));

            html::jql_widget(
                buf,
                self.jira,
                &format!(
                    r#"(issue in linkedIssues({key}) or "Epic Link" = {key}) AND type != "Version Release" and type != Epic"#,
                    key = issue.key,
                ),
                LINKED_COLUMNS,
                50,
            );

            if depth >= self.depth_limit {
                warn!(key = %issue.key, depth, "Linked-issue nesting too deep, not descending");
            } else {
                let jql = match exclude_parent {
                    Some(parent) => format!(
                        r#"issue in linkedIssues({}) AND type != "Version Release" and type = Epic and key != {}"#,
                        issue.key, parent,
                    ),
                    None => format!(
                        r#"issue in linkedIssues({}) AND type != "Version Release" and type = Epic"#,
                        issue.key,
                    ),
                };

                let epics = self.source.search(&jql, &SearchOptions::default()).await?;
                for epic in &epics {
                    html::issue_row(buf, self.jira, &epic.key);
                    self.expand_linked_at(buf, epic, Some(&issue.key), depth + 1)
                        .await?;
                }
            }

            buf.push_str("</ac:rich-text-body></ac:structured-macro>\n");

            Ok(())
        })
    }
}
