use anyhow::Result;
use std::env;
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use crate::commands::watch::{DaemonLockPayload, daemon_lock_path};
use crate::digest::completion::resolve_remote_config;
use crate::digest::config::{load_config, resolve_config_path};
use crate::digest::paths::resolve_paths;
use crate::digest::state;
use crate::digest::util::{env_non_empty, pid_alive};
use crate::error::DaemonErrorCode;

include!(concat!(env!("OUT_DIR"), "/isum_env_allowlist.rs"));

fn lock_report(lock_path: &Path) -> CommandReport {
    let mut report = CommandReport::new("status.daemon");
    if !lock_path.exists() {
        report.detail("daemon.lock=not_found (daemon likely not running)");
        return report;
    }

    let payload = match fs::read_to_string(lock_path) {
        Ok(raw) => match serde_json::from_str::<DaemonLockPayload>(&raw) {
            Ok(payload) => payload,
            Err(err) => {
                report.issue(format!("daemon.lock=corrupt ({err})"));
                return report;
            }
        },
        Err(err) => {
            report.issue(format!("daemon.lock=unreadable ({err})"));
            return report;
        }
    };

    report.detail("daemon.lock=found");
    report.detail(format!("daemon.pid={}", payload.pid));
    report.detail(format!("daemon.start_time={}", payload.start_time));
    if pid_alive(payload.pid) {
        report.detail("daemon.process=alive");
    } else {
        report.detail("daemon.process=dead (stale lock)");
    }
    let current = env!("BUILD_UUID");
    if payload.build_uuid == current {
        report.detail("daemon.build_match=ok");
    } else {
        report.issue(format!(
            "daemon.build_mismatch (lock={} current={current})",
            payload.build_uuid
        ));
    }
    report
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let paths = resolve_paths()?;
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));

    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config={}", path.display())),
        Some(path) => report.detail(format!("config={} (absent, using defaults)", path.display())),
        None => report.detail("config=unresolved (using defaults)"),
    }

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("slack.api_base={}", cfg.slack.api_base));
            report.detail(format!("slack.archive_base_url={}", cfg.slack.archive_base_url));
            report.detail(format!("slack.lookback_hours={}", cfg.slack.lookback_hours));
            report.detail(format!("slack.history_limit={}", cfg.slack.history_limit));
            report.detail(format!("scheduler.interval_secs={}", cfg.scheduler.interval_secs));
            report.detail(format!(
                "scheduler.recipient={}",
                if cfg.scheduler.recipient.is_some() { "set" } else { "unset" }
            ));
            report.detail(format!("completion.echo_timestamps={}", cfg.completion.echo_timestamps));
        }
        Err(err) => report.issue(format!(
            "{}: {err:#}",
            DaemonErrorCode::E002ConfigMissing.as_str()
        )),
    }

    let token_set = env_non_empty("SLACK_BOT_TOKEN").is_some()
        || env_non_empty("ISUM_SLACK_BOT_TOKEN").is_some();
    report.detail(format!(
        "slack.token={}",
        if token_set { "set" } else { "missing" }
    ));
    match resolve_remote_config() {
        Some(remote) => report.detail(format!(
            "completion.provider={} model={}",
            remote.provider.label(),
            remote.model
        )),
        None => report.detail("completion.provider=missing"),
    }

    let overrides: Vec<&str> = GENERATED_ISUM_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var(key).is_ok_and(|v| !v.trim().is_empty()))
        .collect();
    report.detail(format!("env.overrides={}", overrides.join(",")));

    match state::load(&paths) {
        Ok(st) => {
            report.detail(format!("state.cycles_completed={}", st.cycles_completed));
            report.detail(format!("state.ticks_skipped_busy={}", st.ticks_skipped_busy));
            report.detail(format!(
                "state.last_cycle_status={}",
                st.last_cycle_status.as_deref().unwrap_or("never")
            ));
            if let Some(at) = st.last_delivered_epoch_secs {
                report.detail(format!("state.last_delivered_epoch_secs={at}"));
            }
        }
        Err(err) => report.issue(format!(
            "{}: {err:#}",
            DaemonErrorCode::E003StateCorrupt.as_str()
        )),
    }

    report.merge(lock_report(&daemon_lock_path(&paths)));
    Ok(report)
}
