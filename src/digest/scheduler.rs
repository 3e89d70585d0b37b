use crate::digest::audit;
use crate::digest::paths::DigestPaths;
use crate::digest::pipeline::{CycleOutcome, CycleRunner};
use crate::digest::state;
use crate::digest::util::now_epoch_secs;
use crate::error::DigestResult;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Write half of the recipient slot, handed to whatever observes inbound requests.
#[derive(Debug, Clone)]
pub struct RecipientSender {
    tx: Sender<String>,
}

impl RecipientSender {
    /// Blank ids are ignored. Returns false once the scheduler is gone.
    pub fn set(&self, user_id: &str) -> bool {
        let trimmed = user_id.trim();
        if trimmed.is_empty() {
            return true;
        }
        self.tx.send(trimmed.to_string()).is_ok()
    }
}

/// Read half: the most recent non-empty recipient wins.
#[derive(Debug)]
pub struct RecipientSlot {
    rx: Receiver<String>,
    current: Option<String>,
}

impl RecipientSlot {
    pub fn current(&mut self) -> Option<&str> {
        loop {
            match self.rx.try_recv() {
                Ok(next) => self.current = Some(next),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.current.as_deref()
    }
}

pub fn recipient_channel() -> (RecipientSender, RecipientSlot) {
    let (tx, rx) = mpsc::channel();
    (
        RecipientSender { tx },
        RecipientSlot { rx, current: None },
    )
}

pub enum TickOutcome {
    NoRecipient,
    SkippedBusy,
    Started(JoinHandle<DigestResult<CycleOutcome>>),
    Failed(String),
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fixed-interval trigger. At most one cycle runs at a time; ticks that land
/// while a cycle is still running are dropped, not queued.
pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    slot: RecipientSlot,
    interval: Duration,
    busy: Arc<AtomicBool>,
    paths: Option<DigestPaths>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        slot: RecipientSlot,
        interval: Duration,
        paths: Option<DigestPaths>,
    ) -> Self {
        Self {
            runner,
            slot,
            interval,
            busy: Arc::new(AtomicBool::new(false)),
            paths,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let Some(recipient) = self.slot.current().map(str::to_string) else {
            tracing::info!("no recipient known yet; skipping tick");
            return TickOutcome::NoRecipient;
        };

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("previous cycle still running; dropping tick");
            if let Some(paths) = &self.paths {
                if let Err(err) = state::update(paths, |s| s.ticks_skipped_busy += 1) {
                    tracing::warn!(error = %format!("{err:#}"), "failed to record skipped tick");
                }
                audit::record(paths, "scheduler", "skipped", "reason=busy");
            }
            return TickOutcome::SkippedBusy;
        }

        let guard = BusyGuard(self.busy.clone());
        let runner = self.runner.clone();
        let paths = self.paths.clone();
        let spawned = thread::Builder::new()
            .name("isummarize-cycle".to_string())
            .spawn(move || {
                let _guard = guard;
                run_and_record(runner.as_ref(), paths.as_ref(), &recipient)
            });

        match spawned {
            Ok(handle) => TickOutcome::Started(handle),
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn cycle worker");
                TickOutcome::Failed(err.to_string())
            }
        }
    }

    /// Runs one tick and waits for its cycle. `None` means nothing ran.
    pub fn tick_blocking(&mut self) -> Option<DigestResult<CycleOutcome>> {
        match self.tick() {
            TickOutcome::Started(handle) => match handle.join() {
                Ok(result) => Some(result),
                Err(_) => {
                    tracing::error!("cycle worker panicked");
                    None
                }
            },
            TickOutcome::NoRecipient | TickOutcome::SkippedBusy | TickOutcome::Failed(_) => None,
        }
    }

    pub fn run_forever(&mut self) -> Result<()> {
        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler started");
        loop {
            if let TickOutcome::Failed(err) = self.tick() {
                tracing::warn!(error = %err, "tick failed; will retry next interval");
            }
            thread::sleep(self.interval);
        }
    }
}

fn run_and_record(
    runner: &dyn CycleRunner,
    paths: Option<&DigestPaths>,
    recipient: &str,
) -> DigestResult<CycleOutcome> {
    let started = now_epoch_secs().unwrap_or(0);
    let result = runner.run_cycle(recipient, started);
    match &result {
        Ok(outcome) => tracing::info!(
            status = outcome.status(),
            delivered = outcome.delivered_to.is_some(),
            "{}",
            outcome.summary_line()
        ),
        Err(err) => tracing::error!(error = %err, "cycle failed"),
    }

    if let Some(paths) = paths {
        let recorded = state::update(paths, |s| {
            s.last_cycle_epoch_secs = Some(started);
            s.cycles_completed += 1;
            match &result {
                Ok(outcome) => {
                    s.last_cycle_status = Some(outcome.status().to_string());
                    s.last_channel_count = outcome.channels;
                    if outcome.delivered_to.is_some() {
                        s.last_delivered_epoch_secs = Some(started);
                    }
                }
                Err(_) => s.last_cycle_status = Some("failed".to_string()),
            }
        });
        if let Err(err) = recorded {
            tracing::warn!(error = %format!("{err:#}"), "failed to record cycle state");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DigestError;
    use std::sync::Mutex;
    use std::sync::mpsc::SyncSender;

    /// Blocks inside `run_cycle` until the test releases it.
    struct GatedRunner {
        entered: Mutex<SyncSender<String>>,
        release: Mutex<Receiver<()>>,
    }

    impl CycleRunner for GatedRunner {
        fn run_cycle(&self, recipient: &str, _now: u64) -> DigestResult<CycleOutcome> {
            if let Ok(tx) = self.entered.lock() {
                let _ = tx.send(recipient.to_string());
            }
            if let Ok(rx) = self.release.lock() {
                let _ = rx.recv();
            }
            Ok(CycleOutcome {
                channels: 1,
                delivered_to: Some(format!("D-{recipient}")),
                ..Default::default()
            })
        }
    }

    struct FailingRunner;

    impl CycleRunner for FailingRunner {
        fn run_cycle(&self, _recipient: &str, _now: u64) -> DigestResult<CycleOutcome> {
            Err(DigestError::transport("conversations.open", "user_not_found"))
        }
    }

    fn temp_paths(root: &std::path::Path) -> DigestPaths {
        DigestPaths {
            home: root.to_path_buf(),
            state_dir: root.join("state"),
            logs_dir: root.join("logs"),
        }
    }

    #[test]
    fn slot_keeps_latest_non_empty_recipient() {
        let (tx, mut slot) = recipient_channel();
        assert_eq!(slot.current(), None);
        tx.set("U1");
        tx.set("  ");
        tx.set("U2");
        assert_eq!(slot.current(), Some("U2"));
        drop(tx);
        assert_eq!(slot.current(), Some("U2"));
    }

    #[test]
    fn tick_without_recipient_is_a_no_op() {
        let (_tx, slot) = recipient_channel();
        let mut scheduler =
            Scheduler::new(Arc::new(FailingRunner), slot, Duration::from_secs(20), None);
        assert!(matches!(scheduler.tick(), TickOutcome::NoRecipient));
        assert!(!scheduler.busy.load(Ordering::Acquire));
    }

    #[test]
    fn overlapping_tick_is_dropped_while_cycle_runs() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = temp_paths(tmp.path());
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::channel();
        let runner = Arc::new(GatedRunner {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let (tx, slot) = recipient_channel();
        tx.set("U7");
        let mut scheduler =
            Scheduler::new(runner, slot, Duration::from_secs(20), Some(paths.clone()));

        let TickOutcome::Started(handle) = scheduler.tick() else {
            panic!("first tick should start a cycle");
        };
        assert_eq!(entered_rx.recv().expect("cycle entered"), "U7");
        assert!(scheduler.busy.load(Ordering::Acquire));
        assert!(matches!(scheduler.tick(), TickOutcome::SkippedBusy));

        release_tx.send(()).expect("release");
        let outcome = handle.join().expect("join").expect("cycle ok");
        assert_eq!(outcome.delivered_to.as_deref(), Some("D-U7"));
        assert!(!scheduler.busy.load(Ordering::Acquire));

        let saved = state::load(&paths).expect("state");
        assert_eq!(saved.ticks_skipped_busy, 1);
        assert_eq!(saved.cycles_completed, 1);
        assert_eq!(saved.last_cycle_status.as_deref(), Some("ok"));
        assert!(saved.last_delivered_epoch_secs.is_some());
    }

    #[test]
    fn failed_cycle_returns_to_idle() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = temp_paths(tmp.path());
        let (tx, slot) = recipient_channel();
        tx.set("U1");
        let mut scheduler = Scheduler::new(
            Arc::new(FailingRunner),
            slot,
            Duration::from_secs(20),
            Some(paths.clone()),
        );

        let first = scheduler.tick_blocking().expect("ran");
        assert!(first.is_err());
        assert!(!scheduler.busy.load(Ordering::Acquire));
        assert!(scheduler.tick_blocking().is_some());

        let saved = state::load(&paths).expect("state");
        assert_eq!(saved.cycles_completed, 2);
        assert_eq!(saved.last_cycle_status.as_deref(), Some("failed"));
    }
}
