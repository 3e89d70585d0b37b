use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A channel the bot is a member of, as reported by the channel directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

/// Message shape returned by history and replies fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub reply_count: Option<u64>,
}

impl RawMessage {
    /// System notices (joins, topic changes, ...) and anything posted by a bot.
    pub fn is_automated(&self) -> bool {
        let has_subtype = self
            .subtype
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        let has_bot = self.bot_id.as_deref().is_some_and(|b| !b.trim().is_empty());
        has_subtype || has_bot
    }

    pub fn has_replies(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub real_name: Option<String>,
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    pub speaker_id: String,
    pub speaker_name: String,
    pub text: String,
    pub timestamp: String,
    pub is_thread_reply: bool,
    pub parent_timestamp: Option<String>,
}

impl Utterance {
    pub fn root(speaker_id: String, speaker_name: String, text: String, timestamp: String) -> Self {
        Self {
            speaker_id,
            speaker_name,
            text,
            timestamp,
            is_thread_reply: false,
            parent_timestamp: None,
        }
    }

    pub fn reply(
        speaker_id: String,
        speaker_name: String,
        text: String,
        timestamp: String,
        parent_timestamp: &str,
    ) -> Self {
        Self {
            speaker_id,
            speaker_name,
            text,
            timestamp,
            is_thread_reply: true,
            parent_timestamp: Some(parent_timestamp.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelWindow {
    pub channel_id: String,
    pub channel_name: String,
    pub since_epoch_secs: u64,
    pub until_epoch_secs: u64,
    pub utterances: Vec<Utterance>,
}

impl ChannelWindow {
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Timestamps of top-level messages, in window order.
    pub fn root_timestamps(&self) -> Vec<&str> {
        self.utterances
            .iter()
            .filter(|u| !u.is_thread_reply)
            .map(|u| u.timestamp.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRecord {
    pub topic: String,
    pub summary: Option<String>,
    pub source_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChannelDigest {
    NoActivity {
        channel_id: String,
        channel_name: String,
    },
    Summarized {
        channel_id: String,
        channel_name: String,
        records: Vec<SummaryRecord>,
    },
}

impl ChannelDigest {
    /// An empty record list collapses into the no-activity sentinel.
    pub fn from_records(channel_id: &str, channel_name: &str, records: Vec<SummaryRecord>) -> Self {
        if records.is_empty() {
            return Self::NoActivity {
                channel_id: channel_id.to_string(),
                channel_name: channel_name.to_string(),
            };
        }
        Self::Summarized {
            channel_id: channel_id.to_string(),
            channel_name: channel_name.to_string(),
            records,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::NoActivity { channel_id, .. } | Self::Summarized { channel_id, .. } => {
                channel_id
            }
        }
    }

    pub fn channel_name(&self) -> &str {
        match self {
            Self::NoActivity { channel_name, .. } | Self::Summarized { channel_name, .. } => {
                channel_name
            }
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            Self::NoActivity { .. } => 0,
            Self::Summarized { records, .. } => records.len(),
        }
    }
}

/// Slack timestamps are `<secs>.<micros>` strings; compare them numerically.
pub fn ts_sort_key(ts: &str) -> (u64, u64) {
    let (secs, frac) = ts.trim().split_once('.').unwrap_or((ts.trim(), "0"));
    let secs = secs.parse::<u64>().unwrap_or(0);
    let micros = format!("{frac:0<6}")
        .get(..6)
        .and_then(|digits| digits.parse::<u64>().ok())
        .unwrap_or(0);
    (secs, micros)
}

pub fn compare_ts(a: &str, b: &str) -> Ordering {
    ts_sort_key(a).cmp(&ts_sort_key(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_ordering_is_numeric_not_lexical() {
        assert_eq!(compare_ts("99.000001", "100.000000"), Ordering::Less);
        assert_eq!(compare_ts("100.5", "100.000400"), Ordering::Greater);
        assert_eq!(compare_ts("100", "100.000000"), Ordering::Equal);
    }

    #[test]
    fn automated_messages_are_detected_by_subtype_or_bot_id() {
        let human = RawMessage {
            user: Some("U1".into()),
            text: "hi".into(),
            ts: "1.0".into(),
            ..Default::default()
        };
        assert!(!human.is_automated());

        let joined = RawMessage {
            subtype: Some("channel_join".into()),
            ..human.clone()
        };
        assert!(joined.is_automated());

        let bot = RawMessage {
            bot_id: Some("B1".into()),
            ..human.clone()
        };
        assert!(bot.is_automated());

        let blank_subtype = RawMessage {
            subtype: Some(String::new()),
            ..human
        };
        assert!(!blank_subtype.is_automated());
    }

    #[test]
    fn empty_records_collapse_to_no_activity() {
        let digest = ChannelDigest::from_records("C1", "general", Vec::new());
        assert!(matches!(digest, ChannelDigest::NoActivity { .. }));
        assert_eq!(digest.record_count(), 0);
        assert_eq!(digest.channel_name(), "general");
    }
}
