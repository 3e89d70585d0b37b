//! In-memory collaborators shared by the pipeline unit tests.

use crate::digest::completion::{SamplingParams, Summarizer};
use crate::digest::platform::ChatPlatform;
use crate::digest::types::{ChannelRef, RawMessage, UserProfile};
use crate::error::{DigestError, DigestResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakePlatform {
    pub channels: Vec<ChannelRef>,
    pub history: BTreeMap<String, Vec<RawMessage>>,
    pub replies: BTreeMap<(String, String), Vec<RawMessage>>,
    pub profiles: BTreeMap<String, UserProfile>,
    pub failing_history: BTreeSet<String>,
    pub failing_replies: BTreeSet<(String, String)>,
    pub fail_list: bool,
    pub fail_open_direct: bool,
    pub fail_post: bool,
    pub profile_lookups: Mutex<Vec<String>>,
    pub posted: Mutex<Vec<(String, String)>>,
}

impl FakePlatform {
    pub fn with_channel(mut self, id: &str, name: &str, messages: Vec<RawMessage>) -> Self {
        self.channels.push(ChannelRef {
            id: id.to_string(),
            name: name.to_string(),
        });
        self.history.insert(id.to_string(), messages);
        self
    }

    pub fn with_replies(
        mut self,
        channel: &str,
        root_ts: &str,
        messages: Vec<RawMessage>,
    ) -> Self {
        self.replies
            .insert((channel.to_string(), root_ts.to_string()), messages);
        self
    }

    pub fn with_user(
        mut self,
        id: &str,
        display: Option<&str>,
        real: Option<&str>,
        handle: &str,
    ) -> Self {
        self.profiles.insert(
            id.to_string(),
            UserProfile {
                display_name: display.map(str::to_string),
                real_name: real.map(str::to_string),
                handle: handle.to_string(),
            },
        );
        self
    }

    pub fn lookup_count(&self, user_id: &str) -> usize {
        self.profile_lookups
            .lock()
            .map(|calls| calls.iter().filter(|id| id.as_str() == user_id).count())
            .unwrap_or(0)
    }

    pub fn posted(&self) -> Vec<(String, String)> {
        self.posted.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

pub fn msg(user: &str, text: &str, ts: &str) -> RawMessage {
    RawMessage {
        user: Some(user.to_string()),
        text: text.to_string(),
        ts: ts.to_string(),
        ..Default::default()
    }
}

pub fn threaded(user: &str, text: &str, ts: &str, replies: u64) -> RawMessage {
    RawMessage {
        reply_count: Some(replies),
        ..msg(user, text, ts)
    }
}

impl ChatPlatform for FakePlatform {
    fn list_joined_channels(&self) -> DigestResult<Vec<ChannelRef>> {
        if self.fail_list {
            return Err(DigestError::transport("conversations.list", "ratelimited"));
        }
        Ok(self.channels.clone())
    }

    fn fetch_history(
        &self,
        channel_id: &str,
        _oldest_epoch_secs: u64,
        _latest_epoch_secs: u64,
        limit: u32,
    ) -> DigestResult<Vec<RawMessage>> {
        if self.failing_history.contains(channel_id) {
            return Err(DigestError::transport("conversations.history", "fatal_error"));
        }
        Ok(self
            .history
            .get(channel_id)
            .map(|m| m.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    fn fetch_replies(&self, channel_id: &str, root_ts: &str) -> DigestResult<Vec<RawMessage>> {
        let key = (channel_id.to_string(), root_ts.to_string());
        if self.failing_replies.contains(&key) {
            return Err(DigestError::transport("conversations.replies", "thread_not_found"));
        }
        Ok(self.replies.get(&key).cloned().unwrap_or_default())
    }

    fn fetch_user_profile(&self, user_id: &str) -> DigestResult<UserProfile> {
        if let Ok(mut calls) = self.profile_lookups.lock() {
            calls.push(user_id.to_string());
        }
        self.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| DigestError::transport("users.info", "user_not_found"))
    }

    fn open_direct_channel(&self, user_id: &str) -> DigestResult<String> {
        if self.fail_open_direct {
            return Err(DigestError::transport("conversations.open", "user_not_found"));
        }
        Ok(format!("D-{user_id}"))
    }

    fn post_message(&self, channel_id: &str, text: &str) -> DigestResult<()> {
        if self.fail_post {
            return Err(DigestError::transport("chat.postMessage", "not_in_channel"));
        }
        if let Ok(mut posted) = self.posted.lock() {
            posted.push((channel_id.to_string(), text.to_string()));
        }
        Ok(())
    }
}

/// Returns canned completions and records every prompt it receives.
#[derive(Default)]
pub struct FakeSummarizer {
    pub response: String,
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    pub fn replying(response: &str) -> Self {
        Self {
            response: response.to_string(),
            ..Default::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Summarizer for FakeSummarizer {
    fn label(&self) -> &'static str {
        "fake"
    }

    fn complete(&self, prompt: &str, _params: &SamplingParams) -> DigestResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(DigestError::transport("completion", "status 500"));
        }
        Ok(self.response.clone())
    }
}
