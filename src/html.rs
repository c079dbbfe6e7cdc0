//! Confluence storage-format rendering helpers.
//!
//! Pages are assembled as flat strings the same way the wiki editor would
//! store them: layout wrappers and `jira` structured macros for issue
//! widgets.

use chrono::{DateTime, Utc};

use crate::config::JiraConfig;
use crate::models::Issue;

/// Escape text destined for storage-format markup.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn page_begin(buf: &mut String) {
    buf.push_str("<ac:layout>");
}

pub fn page_end(buf: &mut String) {
    buf.push_str("</ac:layout>");
}

pub fn headline(buf: &mut String, tag: &str, text: &str) {
    buf.push_str(&format!("<{tag}>{}</{tag}>", escape(text)));
}

pub fn section_begin(buf: &mut String) {
    buf.push_str("<ac:layout-section ac:type=\"single\"><ac:layout-cell><hr/>\n");
}

pub fn section_end(buf: &mut String) {
    buf.push_str("</ac:layout-cell></ac:layout-section>\n");
}

/// Table of contents macro, placed in its own section.
pub fn toc(buf: &mut String) {
    section_begin(buf);
    buf.push_str(
        "<ac:structured-macro ac:name=\"toc\">\
         <ac:parameter ac:name=\"printable\">true</ac:parameter>\
         <ac:parameter ac:name=\"style\">square</ac:parameter>\
         <ac:parameter ac:name=\"maxLevel\">2</ac:parameter>\
         <ac:parameter ac:name=\"type\">list</ac:parameter>\
         </ac:structured-macro>\n",
    );
    section_end(buf);
}

/// Single-issue jira macro with the full column set, used for standalone
/// issue rows.
pub fn issue_row(buf: &mut String, jira: &JiraConfig, key: &str) {
    buf.push_str(&format!(
        "<p><ac:structured-macro ac:name=\"jira\" ac:schema-version=\"1\">\
         <ac:parameter ac:name=\"server\">{}</ac:parameter>\
         <ac:parameter ac:name=\"columns\">key,summary,type,created,updated,due,assignee,reporter,priority,status,resolution</ac:parameter>\
         <ac:parameter ac:name=\"serverId\">{}</ac:parameter>\
         <ac:parameter ac:name=\"key\">{}</ac:parameter>\
         </ac:structured-macro></p>\n",
        escape(&jira.server),
        escape(&jira.server_id),
        escape(key),
    ));
}

/// Compact single-issue jira macro, used inside lists.
pub fn issue_inline(buf: &mut String, jira: &JiraConfig, key: &str) {
    buf.push_str(&format!(
        "<ac:structured-macro ac:name=\"jira\" ac:schema-version=\"1\">\
         <ac:parameter ac:name=\"server\">{}</ac:parameter>\
         <ac:parameter ac:name=\"serverId\">{}</ac:parameter>\
         <ac:parameter ac:name=\"key\">{}</ac:parameter>\
         </ac:structured-macro>",
        escape(&jira.server),
        escape(&jira.server_id),
        escape(key),
    ));
}

/// JQL result widget: the wiki renders the query server-side, so nothing
/// is resolved locally.
pub fn jql_widget(buf: &mut String, jira: &JiraConfig, jql: &str, columns: &str, max_issues: u32) {
    buf.push_str(&format!(
        "<p><ac:structured-macro ac:name=\"jira\" ac:schema-version=\"1\">\
         <ac:parameter ac:name=\"server\">{}</ac:parameter>\
         <ac:parameter ac:name=\"columns\">{columns}</ac:parameter>\
         <ac:parameter ac:name=\"maximumIssues\">{max_issues}</ac:parameter>\
         <ac:parameter ac:name=\"jqlQuery\">{}</ac:parameter>\
         <ac:parameter ac:name=\"serverId\">{}</ac:parameter>\
         </ac:structured-macro></p>\n",
        escape(&jira.server),
        escape(jql),
        escape(&jira.server_id),
    ));
}

/// Compact issue macro followed by a progress note.
///
/// The note names the assignee when it differs from the enclosing epic's
/// assignee, then appends the freshest weekly worklog comment or the
/// progress custom field, whichever exists.
pub fn issue_with_progress(
    buf: &mut String,
    jira: &JiraConfig,
    epic: Option<&Issue>,
    issue: &Issue,
    now: DateTime<Utc>,
) {
    issue_inline(buf, jira, &issue.key);

    let mut progress = String::new();
    if let (Some(epic), Some(assignee)) = (epic, issue.assignee.as_ref()) {
        let differs = epic
            .assignee
            .as_ref()
            .map(|ea| ea.email != assignee.email)
            .unwrap_or(true);
        if differs {
            progress.push_str(&format!("@{} ", assignee.display_name));
        }
    }
    if let Some(worklog) = issue.latest_weekly_worklog(now) {
        progress.push_str(&worklog.comment);
    } else if let Some(note) = issue.progress.as_deref() {
        progress.push_str(note);
    }

    if !progress.is_empty() {
        buf.push_str(&format!(" : {}", escape(&progress)));
    }
}
