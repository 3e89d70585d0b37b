use crate::digest::paths::DigestPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Serializes load-modify-save across the tick and worker threads.
static UPDATE_LOCK: Mutex<()> = Mutex::new(());

/// Bookkeeping for `status`. Never consulted when deciding what to summarize,
/// and deliberately holds no recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestState {
    pub schema_version: u32,
    pub last_cycle_epoch_secs: Option<u64>,
    pub last_cycle_status: Option<String>,
    pub last_channel_count: usize,
    pub last_delivered_epoch_secs: Option<u64>,
    pub cycles_completed: u64,
    pub ticks_skipped_busy: u64,
}

impl Default for DigestState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            last_cycle_epoch_secs: None,
            last_cycle_status: None,
            last_channel_count: 0,
            last_delivered_epoch_secs: None,
            cycles_completed: 0,
            ticks_skipped_busy: 0,
        }
    }
}

pub fn state_file_path(paths: &DigestPaths) -> PathBuf {
    paths.state_dir.join("isummarize_state.json")
}

pub fn load(paths: &DigestPaths) -> Result<DigestState> {
    let file = state_file_path(paths);
    if !file.exists() {
        return Ok(DigestState::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: DigestState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

/// Writes to a sibling temp file and renames it over the state file, so
/// readers see either the old or the new contents.
pub fn save(paths: &DigestPaths, state: &DigestState) -> Result<PathBuf> {
    let file = state_file_path(paths);
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
    let data = serde_json::to_string_pretty(state)?;
    let mut tmp = NamedTempFile::new_in(&paths.state_dir)
        .with_context(|| format!("failed to stage {}", file.display()))?;
    writeln!(tmp, "{data}").with_context(|| format!("failed to write {}", file.display()))?;
    tmp.persist(&file)
        .with_context(|| format!("failed to replace {}", file.display()))?;
    Ok(file)
}

/// Load-modify-save; a corrupt file is replaced rather than wedging the daemon.
pub fn update<F>(paths: &DigestPaths, apply: F) -> Result<DigestState>
where
    F: FnOnce(&mut DigestState),
{
    let _held = UPDATE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut state = match load(paths) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(
                code = crate::error::DaemonErrorCode::E003StateCorrupt.as_str(),
                error = %format!("{err:#}"),
                "state file unreadable, starting fresh"
            );
            DigestState::default()
        }
    };
    apply(&mut state);
    save(paths, &state)?;
    Ok(state)
}
