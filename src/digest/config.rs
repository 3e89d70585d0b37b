use crate::digest::completion::SamplingParams;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
    pub archive_base_url: String,
    pub history_limit: u32,
    pub lookback_hours: u64,
    pub trigger_phrase: String,
    pub request_timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            archive_base_url: "https://isummarize.slack.com/archives".to_string(),
            history_limit: 100,
            lookback_hours: 24,
            trigger_phrase: "@i_summarize summarize".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub recipient: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            recipient: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub request_timeout_secs: u64,
    pub echo_timestamps: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            request_timeout_secs: 45,
            echo_timestamps: false,
        }
    }
}

impl CompletionConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DigestConfig {
    pub slack: SlackConfig,
    pub scheduler: SchedulerConfig,
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDigestConfig {
    slack: Option<SlackConfig>,
    scheduler: Option<SchedulerConfig>,
    completion: Option<CompletionConfig>,
}

fn env_or_f64(var: &str, fallback: f64) -> f64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<f64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn validate(cfg: &DigestConfig) -> Result<()> {
    if cfg.scheduler.interval_secs == 0 {
        return Err(anyhow!(
            "invalid scheduler interval: must be >= 1 second"
        ));
    }
    if cfg.slack.history_limit == 0 || cfg.slack.history_limit > 1000 {
        return Err(anyhow!("invalid history limit: require 1 <= limit <= 1000"));
    }
    if cfg.slack.lookback_hours == 0 {
        return Err(anyhow!("invalid lookback hours: must be >= 1"));
    }
    if cfg.slack.trigger_phrase.trim().is_empty() {
        return Err(anyhow!("invalid trigger phrase: cannot be empty"));
    }
    if cfg.slack.archive_base_url.trim().is_empty() {
        return Err(anyhow!("invalid archive base url: cannot be empty"));
    }
    let c = &cfg.completion;
    if !(0.0..=2.0).contains(&c.temperature) {
        return Err(anyhow!("invalid temperature: require 0 <= temperature <= 2"));
    }
    if !(c.top_p > 0.0 && c.top_p <= 1.0) {
        return Err(anyhow!("invalid top_p: require 0 < top_p <= 1"));
    }
    if !(-2.0..=2.0).contains(&c.frequency_penalty) || !(-2.0..=2.0).contains(&c.presence_penalty)
    {
        return Err(anyhow!("invalid penalty: require -2 <= penalty <= 2"));
    }
    if c.max_tokens == 0 {
        return Err(anyhow!("invalid max tokens: must be >= 1"));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("ISUM_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".isummarize").join("config.toml"))
}

fn merge_file_config(base: &mut DigestConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialDigestConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse isummarize config {}: {err}", path.display()))?;
    if let Some(slack) = parsed.slack {
        base.slack = slack;
    }
    if let Some(scheduler) = parsed.scheduler {
        base.scheduler = scheduler;
    }
    if let Some(completion) = parsed.completion {
        base.completion = completion;
    }
    Ok(())
}

fn apply_slack_env(slack: &mut SlackConfig) {
    slack.api_base = env_or_string("ISUM_SLACK_API_BASE", &slack.api_base);
    slack.archive_base_url = env_or_string("ISUM_ARCHIVE_BASE_URL", &slack.archive_base_url);
    slack.history_limit = env_or_u32("ISUM_HISTORY_LIMIT", slack.history_limit);
    slack.lookback_hours = env_or_u64("ISUM_LOOKBACK_HOURS", slack.lookback_hours);
    slack.trigger_phrase = env_or_string("ISUM_TRIGGER_PHRASE", &slack.trigger_phrase);
    slack.request_timeout_secs =
        env_or_u64("ISUM_SLACK_TIMEOUT_SECS", slack.request_timeout_secs);
}

fn apply_env(cfg: &mut DigestConfig) {
    apply_slack_env(&mut cfg.slack);
    cfg.scheduler.interval_secs =
        env_or_u64("ISUM_SCHEDULER_INTERVAL_SECS", cfg.scheduler.interval_secs);
    cfg.scheduler.recipient = env_or_optional("ISUM_RECIPIENT", cfg.scheduler.recipient.take());
    cfg.completion.temperature =
        env_or_f64("ISUM_COMPLETION_TEMPERATURE", cfg.completion.temperature);
    cfg.completion.max_tokens =
        env_or_u32("ISUM_COMPLETION_MAX_TOKENS", cfg.completion.max_tokens);
    cfg.completion.top_p = env_or_f64("ISUM_COMPLETION_TOP_P", cfg.completion.top_p);
    cfg.completion.frequency_penalty = env_or_f64(
        "ISUM_COMPLETION_FREQUENCY_PENALTY",
        cfg.completion.frequency_penalty,
    );
    cfg.completion.presence_penalty = env_or_f64(
        "ISUM_COMPLETION_PRESENCE_PENALTY",
        cfg.completion.presence_penalty,
    );
    cfg.completion.request_timeout_secs = env_or_u64(
        "ISUM_COMPLETION_TIMEOUT_SECS",
        cfg.completion.request_timeout_secs,
    );
    cfg.completion.echo_timestamps =
        env_or_bool("ISUM_ECHO_TIMESTAMPS", cfg.completion.echo_timestamps);
}

/// Slack settings from defaults plus env only, for when the full config cannot be loaded.
pub fn slack_config_from_env() -> SlackConfig {
    let mut slack = SlackConfig::default();
    apply_slack_env(&mut slack);
    slack
}

pub fn load_config() -> Result<DigestConfig> {
    let mut cfg = DigestConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
