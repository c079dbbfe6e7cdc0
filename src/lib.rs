pub mod classify;
pub mod config;
pub mod confluence;
pub mod expand;
pub mod github;
pub mod html;
pub mod jira;
pub mod mentions;
pub mod models;
pub mod reports;
pub mod slack;

pub use classify::{classify_by_type, RepeatChecker};
pub use config::{Config, Member, Team};
pub use confluence::{ConfluenceClient, Content};
pub use expand::EpicExpander;
pub use github::{GitHubClient, PullSource};
pub use jira::{IssueSource, JiraClient, SearchOptions};
pub use mentions::MentionCollector;
pub use models::*;
pub use slack::{SlackClient, SlackInitError};
