use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::classify::{classify_by_type, RepeatChecker};
use crate::config::{Config, ConfluenceConfig, JiraConfig, Member};
use crate::confluence::ConfluenceClient;
use crate::expand::EpicExpander;
use crate::html;
use crate::jira::{parse_jira_datetime, IssueSource, JiraClient, SearchOptions};
use crate::models::Issue;
use crate::slack::SlackClient;

const DAY_FORMAT: &str = "%Y/%m/%d";

/// Generate and publish one "works of this week" page per configured
/// member, grouped under a per-week parent page.
pub async fn run_personal_reports(
    config: &Config,
    tracker: &(impl IssueSource + Sync),
    wiki: &ConfluenceClient,
    now: DateTime<Utc>,
) -> Result<()> {
    let date = format!(
        "{} ~ {}",
        (now - Duration::days(7)).format(DAY_FORMAT),
        now.format(DAY_FORMAT),
    );

    for team in &config.teams {
        info!(team = %team.name, "Generating personal weekly reports");
        for member in &team.members {
            let body = personal_report_body(config, tracker, member, now).await?;
            publish_personal_report(wiki, &config.confluence, &date, member, &body).await?;
        }
    }

    Ok(())
}

/// Render every member's weekly body without publishing anything, one
/// `(member name, body)` pair per configured member.
pub async fn personal_report_bodies(
    config: &Config,
    tracker: &(impl IssueSource + Sync),
    now: DateTime<Utc>,
) -> Result<Vec<(String, String)>> {
    let mut bodies = Vec::new();
    for member in config.members() {
        let body = personal_report_body(config, tracker, member, now).await?;
        bodies.push((member.name.clone(), body));
    }
    Ok(bodies)
}

/// One member's weekly sub-document: epics first (seeding the fresh
/// per-member visited set), then the remaining groups in type order.
pub async fn personal_report_body(
    config: &Config,
    tracker: &(impl IssueSource + Sync),
    member: &Member,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut buf = String::new();
    html::headline(&mut buf, "h2", " Works of this week");

    let issues = tracker
        .search(
            &format!(
                r#"assignee = "{}" AND {}"#,
                member.email, config.jira.weekly_scope,
            ),
            &SearchOptions::all_fields(),
        )
        .await?;

    let groups = classify_by_type(issues);
    let mut visited = RepeatChecker::new();
    let expander = EpicExpander::new(tracker, &config.jira);

    if let Some(epics) = groups.get("epic") {
        html::headline(&mut buf, "h3", "Epic");
        render_issue_list(&mut buf, &expander, &config.jira, epics, &mut visited, now).await?;
    }
    buf.push_str("<br/>");

    for (type_key, group) in &groups {
        if type_key == "epic" || group.is_empty() {
            continue;
        }
        html::headline(&mut buf, "h3", &group[0].type_name);
        render_issue_list(&mut buf, &expander, &config.jira, group, &mut visited, now).await?;
        buf.push_str("<br/>");
    }

    Ok(buf)
}

/// Unordered list of issues, skipping anything the visited set has
/// already shown; epic entries expand recursively in place.
async fn render_issue_list<S: IssueSource + Sync>(
    buf: &mut String,
    expander: &EpicExpander<'_, S>,
    jira: &JiraConfig,
    issues: &[Issue],
    visited: &mut RepeatChecker,
    now: DateTime<Utc>,
) -> Result<()> {
    if issues.is_empty() {
        return Ok(());
    }

    buf.push_str("<ul>");
    for issue in issues {
        if visited.check(&issue.key) {
            continue;
        }
        buf.push_str("<li>");
        if issue.issue_type.is_epic() {
            expander.expand_epic(buf, issue, visited, now).await?;
        } else {
            html::issue_with_progress(buf, jira, None, issue, now);
        }
        buf.push_str("</li>");
    }
    buf.push_str("</ul>");

    Ok(())
}

/// Upsert one member's page: update in place when it exists, otherwise
/// create it under the week's parent page, creating that one first when
/// this is the week's first report.
async fn publish_personal_report(
    wiki: &ConfluenceClient,
    conf: &ConfluenceConfig,
    date: &str,
    member: &Member,
    body: &str,
) -> Result<()> {
    let title = format!("{date} {}", member.name);

    if let Some(existing) = wiki.get_by_title(&conf.space, &title).await? {
        let updated = wiki.update(&existing, body).await?;
        info!(title, link = %updated.links.webui, "Updated personal weekly report");
        return Ok(());
    }

    let week = match wiki.get_by_title(&conf.space, date).await? {
        Some(page) => page,
        None => {
            let parent = wiki
                .get_by_title(&conf.space, &conf.personal_parent)
                .await?
                .with_context(|| format!("Parent page not found: {}", conf.personal_parent))?;
            wiki.create(&conf.space, &parent.id, date, "").await?
        }
    };

    let created = wiki.create(&conf.space, &week.id, &title, body).await?;
    info!(title, link = %created.links.webui, "Created personal weekly report");

    Ok(())
}

/// Due-date report: one server-rendered query widget per member, nothing
/// resolved locally, so no dedup is involved.
pub fn deadline_report_body(config: &Config) -> String {
    let mut buf = String::new();
    html::page_begin(&mut buf);
    html::toc(&mut buf);

    html::section_begin(&mut buf);
    buf.push_str("\n<h1>Issues Exceed Due Date</h1>\n");
    for email in config.member_emails() {
        html::jql_widget(
            &mut buf,
            &config.jira,
            &format!(
                "assignee = {email} AND duedate < now() AND status not in ({})",
                config.jira.stop_status,
            ),
            "key,summary,created,updated,assignee,status,due",
            50,
        );
    }
    html::section_end(&mut buf);

    html::page_end(&mut buf);
    buf
}

pub async fn run_deadline_report(
    config: &Config,
    wiki: &ConfluenceClient,
    now: DateTime<Utc>,
) -> Result<()> {
    let body = deadline_report_body(config);
    let title = format!(
        "{} {} Due Dates",
        now.format("%Y-%m-%d"),
        config.jira.project,
    );

    let content = wiki
        .upsert(
            &config.confluence.space,
            &config.confluence.weekly_parent,
            &title,
            &body,
        )
        .await?;

    info!(title, link = %content.links.webui, "Weekly due-date report published");

    Ok(())
}

/// Close the active sprint, open the next one, and carry everything not
/// yet done over to it.
pub async fn rotate_sprint(config: &Config, jira: &JiraClient, chat: &SlackClient) -> Result<()> {
    let board = jira.board_id(&config.jira.project).await?;
    let active = jira.active_sprint(board).await?;

    let handover = active
        .end_date
        .as_deref()
        .and_then(parse_jira_datetime)
        .unwrap_or_else(Utc::now);
    let next = jira.create_next_sprint(board, handover).await?;

    let pending = jira
        .search(
            &format!(
                "project = {} and Sprint = {} and statusCategory != Done",
                config.jira.project, active.id,
            ),
            &SearchOptions::default(),
        )
        .await?;

    jira.update_sprint_state(active.id, "closed").await?;

    let keys: Vec<String> = pending.iter().map(|i| i.key.clone()).collect();
    jira.move_issues_to_sprint(next.id, &keys).await?;
    jira.update_sprint_state(next.id, "active").await?;

    info!(
        closed = %active.name,
        opened = %next.name,
        carried = keys.len(),
        "Sprint rotated"
    );

    chat.post(&format!("Current active sprint {} is closed", active.name))
        .await?;

    Ok(())
}
