use anyhow::Result;
use colored::*;
use std::path::Path;

use buildboard::{Aggregator, BoardConfig, BuildSummary, ConfigError, Status, create_backends};

mod args;
use args::CliArgs;

fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    // If user hasn't set RUST_LOG, default to warnings+.
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Warn);
    }
    let _ = builder.try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse()?;
    let _ = dotenvy::dotenv();
    init_logging();

    let config = match &args.config {
        Some(path) => BoardConfig::load_from(Path::new(path))?,
        None => BoardConfig::load()?,
    };
    if config.backends.is_empty() {
        return Err(ConfigError::NoBackends.into());
    }

    let backends = create_backends(&config)?;
    let aggregator = Aggregator::new(backends, config.concurrency);

    if !args.quiet {
        let mode = match &args.poll {
            Some(window) => format!("polling last {window}h"),
            None => "full scan".to_string(),
        };
        println!(
            "{} {} | {} backend(s) | {}",
            ">>".bold(),
            "buildboard".bold(),
            config.backends.len(),
            mode.dimmed()
        );
    }

    let summaries = match &args.poll {
        Some(window) => aggregator.poll_since(window).await?,
        None => aggregator.full_scan().await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            print_summary(summary);
        }
        if !args.quiet {
            println!("{}", format!("{} definition(s)", summaries.len()).dimmed());
        }
    }

    Ok(())
}

fn print_summary(summary: &BuildSummary) {
    let status = match summary.status {
        Status::Succeeded => summary.status.as_str().green(),
        Status::Failed => summary.status.as_str().red(),
        Status::PartiallySucceeded => summary.status.as_str().yellow(),
        Status::InProgress => summary.status.as_str().cyan(),
        Status::NotStarted | Status::Stopped => summary.status.as_str().dimmed(),
    };

    let tests = if summary.total_tests > 0 {
        format!(" [{} of {} tests]", summary.passed_tests, summary.total_tests)
    } else {
        String::new()
    };

    let requester = summary.requested_by.as_deref().unwrap_or("-");

    println!(
        "{:<20} {:<30} {:<20} {}{}",
        summary.team_project.bold(),
        summary.build_definition,
        status,
        requester.dimmed(),
        tests
    );
}
