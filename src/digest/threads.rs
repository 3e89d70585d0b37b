use crate::digest::identity::IdentifierResolver;
use crate::digest::platform::ChatPlatform;
use crate::digest::types::{RawMessage, Utterance, compare_ts};
use crate::digest::warn;

#[derive(Debug, Clone)]
pub struct ThreadAggregatorOptions {
    pub page_size: u32,
    pub trigger_phrase: String,
}

/// Flattens a channel's roots and their threads into one ordered utterance list.
pub struct ThreadAggregator<'a> {
    platform: &'a dyn ChatPlatform,
    resolver: &'a IdentifierResolver,
    options: &'a ThreadAggregatorOptions,
}

/// Result of aggregating one channel. `history_failed` marks a channel whose
/// root fetch failed and therefore contributes an empty window.
#[derive(Debug, Clone, Default)]
pub struct AggregatedChannel {
    pub utterances: Vec<Utterance>,
    pub history_failed: bool,
    pub failed_threads: usize,
    pub dropped_messages: usize,
}

impl<'a> ThreadAggregator<'a> {
    pub fn new(
        platform: &'a dyn ChatPlatform,
        resolver: &'a IdentifierResolver,
        options: &'a ThreadAggregatorOptions,
    ) -> Self {
        Self {
            platform,
            resolver,
            options,
        }
    }

    fn is_trigger(&self, text: &str) -> bool {
        let phrase = self.options.trigger_phrase.trim();
        !phrase.is_empty() && text.trim() == phrase
    }

    fn speaker(&self, message: &RawMessage) -> (String, String) {
        let id = message.user.clone().unwrap_or_default();
        let name = if id.is_empty() {
            "unknown".to_string()
        } else {
            self.resolver.speaker_name(&id)
        };
        (id, name)
    }

    pub fn collect(
        &self,
        channel_id: &str,
        since_epoch_secs: u64,
        until_epoch_secs: u64,
    ) -> AggregatedChannel {
        let mut out = AggregatedChannel::default();

        let mut roots = match self.platform.fetch_history(
            channel_id,
            since_epoch_secs,
            until_epoch_secs,
            self.options.page_size,
        ) {
            Ok(messages) => messages,
            Err(err) => {
                warn::emit("W_HISTORY", "collect", channel_id, "", &err.to_string());
                out.history_failed = true;
                return out;
            }
        };
        // History arrives newest-first; the transcript reads oldest-first.
        roots.sort_by(|a, b| compare_ts(&a.ts, &b.ts));

        for root in roots {
            if root.is_automated() {
                out.dropped_messages += 1;
                continue;
            }
            let text = self.resolver.substitute_identifiers(&root.text);
            if self.is_trigger(&text) {
                out.dropped_messages += 1;
                continue;
            }

            let (speaker_id, speaker_name) = self.speaker(&root);
            out.utterances.push(Utterance::root(
                speaker_id,
                speaker_name,
                text,
                root.ts.clone(),
            ));

            if root.has_replies() {
                self.append_replies(channel_id, &root.ts, &mut out);
            }
        }

        out
    }

    fn append_replies(&self, channel_id: &str, root_ts: &str, out: &mut AggregatedChannel) {
        let mut replies = match self.platform.fetch_replies(channel_id, root_ts) {
            Ok(messages) => messages,
            Err(err) => {
                warn::emit("W_REPLIES", "collect", channel_id, root_ts, &err.to_string());
                out.failed_threads += 1;
                return;
            }
        };
        replies.retain(|reply| reply.ts != root_ts);
        replies.sort_by(|a, b| compare_ts(&a.ts, &b.ts));

        for reply in replies {
            if reply.is_automated() {
                out.dropped_messages += 1;
                continue;
            }
            let text = self.resolver.substitute_identifiers(&reply.text);
            let (speaker_id, speaker_name) = self.speaker(&reply);
            out.utterances.push(Utterance::reply(
                speaker_id,
                speaker_name,
                text,
                reply.ts.clone(),
                root_ts,
            ));
        }
    }
}
