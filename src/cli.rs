use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::commands::digest::DigestOptions;
use crate::commands::watch::WatchOptions;

#[derive(Debug, Parser)]
#[command(name = "isummarize", version, about = "Daily Slack conversation digests")]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler: one tick with --once, forever with --daemon.
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// Build and deliver a digest right now.
    Digest {
        /// Slack user id to receive the report; defaults to ISUM_RECIPIENT.
        #[arg(long)]
        recipient: Option<String>,
        /// Channel that gets a short notice if the run fails.
        #[arg(long)]
        reply_channel: Option<String>,
        /// Print the report instead of sending it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show paths, configuration, last cycle and daemon lock state.
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "failed" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

/// Returns whether the command finished without issues.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();
    let report = match cli.command {
        Command::Watch { once, daemon } => commands::watch::run(&WatchOptions { once, daemon })?,
        Command::Digest {
            recipient,
            reply_channel,
            dry_run,
        } => commands::digest::run(&DigestOptions {
            recipient,
            reply_channel,
            dry_run,
        })?,
        Command::Status => commands::status::run()?,
    };
    print_report(&report, cli.json)?;
    Ok(report.ok)
}
