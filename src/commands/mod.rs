pub mod digest;
pub mod status;
pub mod watch;

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::digest::completion::summarizer_from_env;
use crate::digest::config::DigestConfig;
use crate::digest::paths::DigestPaths;
use crate::digest::pipeline::Pipeline;
use crate::slack::SlackClient;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn merge(&mut self, mut other: CommandReport) {
        self.ok &= other.ok;
        self.details.append(&mut other.details);
        self.issues.append(&mut other.issues);
    }
}

/// Wires the Slack client and the configured completion provider into a pipeline.
pub fn build_pipeline(config: &DigestConfig, paths: &DigestPaths) -> Result<Pipeline> {
    let slack = SlackClient::from_config(&config.slack)?;
    let summarizer = summarizer_from_env(config.completion.request_timeout_secs)?;
    Ok(Pipeline::new(
        Arc::new(slack),
        Arc::from(summarizer),
        config.clone(),
        Some(paths.clone()),
    ))
}
