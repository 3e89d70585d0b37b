use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::commands::{CommandReport, build_pipeline};
use crate::digest::config::{DigestConfig, SlackConfig, load_config, slack_config_from_env};
use crate::digest::dispatch::Dispatcher;
use crate::digest::format::GENERIC_FAILURE_NOTICE;
use crate::digest::paths::resolve_paths;
use crate::digest::scheduler::{Scheduler, recipient_channel};
use crate::digest::util::now_epoch_secs;
use crate::error::DaemonErrorCode;
use crate::slack::SlackClient;

#[derive(Debug, Clone, Default)]
pub struct DigestOptions {
    pub recipient: Option<String>,
    pub reply_channel: Option<String>,
    pub dry_run: bool,
}

/// Manual trigger: one cycle now, outside the schedule.
///
/// Any failure, including setup, posts the generic notice to `--reply-channel`.
pub fn run(opts: &DigestOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("digest");
    let slack_config = match load_config() {
        Ok(config) => {
            if let Err(err) = execute(opts, &config, &mut report) {
                report.issue(format!("digest setup failed: {err:#}"));
            }
            config.slack
        }
        Err(err) => {
            report.issue(format!(
                "{}: {err:#}",
                DaemonErrorCode::E002ConfigMissing.as_str()
            ));
            slack_config_from_env()
        }
    };

    if !report.ok {
        notify_requester(&mut report, opts.reply_channel.as_deref(), &slack_config);
    }
    Ok(report)
}

fn execute(opts: &DigestOptions, config: &DigestConfig, report: &mut CommandReport) -> Result<()> {
    let paths = resolve_paths()?;
    let pipeline = build_pipeline(config, &paths)?;

    if opts.dry_run {
        let outcome = pipeline.build_report(now_epoch_secs()?)?;
        report.detail(format!("status={}", outcome.status()));
        report.detail(outcome.summary_line());
        for line in outcome.report.lines() {
            report.detail(format!("report| {line}"));
        }
        return Ok(());
    }

    let Some(recipient) = opts
        .recipient
        .clone()
        .or_else(|| config.scheduler.recipient.clone())
    else {
        report.issue("no recipient: pass --recipient or set ISUM_RECIPIENT");
        return Ok(());
    };

    let (sender, slot) = recipient_channel();
    sender.set(&recipient);
    let interval = Duration::from_secs(config.scheduler.interval_secs.max(1));
    let mut scheduler = Scheduler::new(Arc::new(pipeline), slot, interval, Some(paths));

    match scheduler.tick_blocking() {
        Some(Ok(outcome)) => {
            report.detail(format!("status={}", outcome.status()));
            report.detail(outcome.summary_line());
            if let Some(channel) = outcome.delivered_to {
                report.detail(format!("delivered_to={channel}"));
            }
        }
        Some(Err(err)) => report.issue(format!("digest failed: {err}")),
        None => report.issue("digest did not run"),
    }
    Ok(())
}

/// Requesters only ever see the generic notice; details stay in the logs.
fn notify_requester(
    report: &mut CommandReport,
    reply_channel: Option<&str>,
    slack_config: &SlackConfig,
) {
    let Some(channel) = reply_channel else {
        return;
    };
    let delivered = SlackClient::from_config(slack_config)
        .and_then(|client| Dispatcher::new(&client).deliver(channel, GENERIC_FAILURE_NOTICE));
    match delivered {
        Ok(()) => report.detail(format!("failure_notice_sent={channel}")),
        Err(err) => report.issue(format!("failure notice not sent: {err}")),
    }
}
