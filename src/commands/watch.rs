use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::commands::{CommandReport, build_pipeline};
use crate::digest::audit;
use crate::digest::config::load_config;
use crate::digest::paths::{DigestPaths, resolve_paths};
use crate::digest::scheduler::{Scheduler, recipient_channel};
use crate::error::DaemonErrorCode;

pub const DAEMON_LOCK_FILE: &str = "isummarize-watch.daemon.lock";

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonLockPayload {
    pub pid: u32,
    pub build_uuid: String,
    pub start_time: String,
}

pub fn daemon_lock_path(paths: &DigestPaths) -> PathBuf {
    paths.logs_dir.join(DAEMON_LOCK_FILE)
}

/// Holds the exclusive lock for as long as the returned file lives.
fn acquire_daemon_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        anyhow::bail!(
            "{}: another watcher daemon holds {}",
            DaemonErrorCode::E001Locked.as_str(),
            path.display()
        );
    }

    let payload = DaemonLockPayload {
        pid: std::process::id(),
        build_uuid: env!("BUILD_UUID").to_string(),
        start_time: chrono::Utc::now().to_rfc3339(),
    };
    file.set_len(0)?;
    file.write_all(serde_json::to_string(&payload)?.as_bytes())?;
    file.flush()?;
    Ok(file)
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    let paths = resolve_paths()?;
    let config = load_config()
        .with_context(|| DaemonErrorCode::E002ConfigMissing.as_str().to_string())?;
    let recipient = config.scheduler.recipient.clone();

    if !opts.daemon && recipient.is_none() {
        tracing::info!("no recipient known yet; skipping tick");
        audit::record(&paths, "scheduler", "skipped", "reason=no-recipient");
        report.detail("tick skipped: no recipient configured (set ISUM_RECIPIENT)");
        return Ok(report);
    }

    let pipeline = build_pipeline(&config, &paths)?;
    let (sender, slot) = recipient_channel();
    if let Some(user) = recipient.as_deref() {
        sender.set(user);
    }
    let interval = Duration::from_secs(config.scheduler.interval_secs.max(1));
    let mut scheduler = Scheduler::new(Arc::new(pipeline), slot, interval, Some(paths.clone()));

    if opts.daemon {
        let lock_path = daemon_lock_path(&paths);
        let _lock = acquire_daemon_lock(&lock_path)?;
        audit::record(
            &paths,
            "scheduler",
            "started",
            &format!("interval_secs={} lock={}", interval.as_secs(), lock_path.display()),
        );
        report.detail(format!("daemon_lock={}", lock_path.display()));
        scheduler.run_forever()?;
        return Ok(report);
    }

    match scheduler.tick_blocking() {
        Some(Ok(outcome)) => {
            report.detail("digest cycle completed");
            report.detail(format!("status={}", outcome.status()));
            report.detail(outcome.summary_line());
            match outcome.delivered_to {
                Some(channel) => report.detail(format!("delivered_to={channel}")),
                None => report.detail("delivered_to=none"),
            }
        }
        Some(Err(err)) => report.issue(format!("digest cycle failed: {err}")),
        None => report.issue("digest cycle did not run"),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_holder_is_refused() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("logs").join(DAEMON_LOCK_FILE);
        let _held = acquire_daemon_lock(&path).expect("first lock");

        let payload: DaemonLockPayload =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(payload.pid, std::process::id());
        assert_eq!(payload.build_uuid, env!("BUILD_UUID"));

        let err = acquire_daemon_lock(&path).expect_err("already locked");
        assert!(err.to_string().starts_with("E001_LOCKED"));
    }
}
