use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use team_report::{reports, Config, ConfluenceClient, GitHubClient, JiraClient, SlackClient};

#[derive(Parser)]
#[command(name = "team-report")]
#[command(about = "Automated team status reports from Jira and GitHub")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(long, default_value = "team-report.yml")]
    config: PathBuf,

    /// Render to stdout instead of publishing
    #[arg(long, global = true)]
    print: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Post the daily digest to the team channel
    Daily,

    /// Weekly tasks
    Weekly {
        #[command(subcommand)]
        command: WeeklyCommands,
    },

    /// Release tasks
    Release {
        #[command(subcommand)]
        command: ReleaseCommands,
    },
}

#[derive(Subcommand)]
enum WeeklyCommands {
    /// Create one personal weekly report page per member
    Report,

    /// Create the weekly due-date report page
    DeadLineReport,

    /// Close the current sprint and open the next one
    RotateSprint,
}

#[derive(Subcommand)]
enum ReleaseCommands {
    /// Render the release status report
    Report,

    /// Link release epics to their umbrella issues
    Link,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("team_report=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Daily => {
            let jira = JiraClient::new(&config.jira);
            let github = GitHubClient::new(&config.github)?;
            let slack = SlackClient::connect(&config.slack).await?;
            reports::daily::run(&config, &jira, &github, &slack, cli.print).await?;
        }
        Commands::Weekly { command } => match command {
            WeeklyCommands::Report => {
                let jira = JiraClient::new(&config.jira);
                if cli.print {
                    let bodies =
                        reports::weekly::personal_report_bodies(&config, &jira, Utc::now()).await?;
                    for (name, body) in bodies {
                        println!("{name}\n{body}\n");
                    }
                } else {
                    let wiki = ConfluenceClient::new(&config.confluence);
                    reports::weekly::run_personal_reports(&config, &jira, &wiki, Utc::now())
                        .await?;
                }
            }
            WeeklyCommands::DeadLineReport => {
                if cli.print {
                    println!("{}", reports::weekly::deadline_report_body(&config));
                } else {
                    let wiki = ConfluenceClient::new(&config.confluence);
                    reports::weekly::run_deadline_report(&config, &wiki, Utc::now()).await?;
                }
            }
            WeeklyCommands::RotateSprint => {
                let jira = JiraClient::new(&config.jira);
                let slack = SlackClient::connect(&config.slack).await?;
                reports::weekly::rotate_sprint(&config, &jira, &slack).await?;
            }
        },
        Commands::Release { command } => match command {
            ReleaseCommands::Report => {
                let jira = JiraClient::new(&config.jira);
                println!("{}", reports::release::report_body(&config, &jira).await?);
            }
            ReleaseCommands::Link => {
                let jira = JiraClient::new(&config.jira);
                reports::release::link(&config, &jira).await?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_flag_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["team-report", "daily", "--print"]).unwrap();
        assert!(cli.print);
        assert!(matches!(cli.command, Commands::Daily));

        let cli = Cli::try_parse_from(["team-report", "weekly", "report", "--print"]).unwrap();
        assert!(cli.print);
        assert!(matches!(
            cli.command,
            Commands::Weekly {
                command: WeeklyCommands::Report
            }
        ));
    }
}
