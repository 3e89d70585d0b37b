use crate::digest::identity::IdentifierResolver;
use crate::digest::platform::ChatPlatform;
use crate::digest::threads::{ThreadAggregator, ThreadAggregatorOptions};
use crate::digest::types::ChannelWindow;
use crate::digest::warn;

#[derive(Debug, Clone, Default)]
pub struct CollectionOutcome {
    pub listing_failed: bool,
    pub windows: Vec<ChannelWindow>,
    pub failed_channels: Vec<String>,
    pub failed_threads: usize,
    pub dropped_messages: usize,
}

pub struct ConversationCollector<'a> {
    platform: &'a dyn ChatPlatform,
    resolver: &'a IdentifierResolver,
    options: ThreadAggregatorOptions,
    lookback_secs: u64,
}

impl<'a> ConversationCollector<'a> {
    pub fn new(
        platform: &'a dyn ChatPlatform,
        resolver: &'a IdentifierResolver,
        options: ThreadAggregatorOptions,
        lookback_hours: u64,
    ) -> Self {
        Self {
            platform,
            resolver,
            options,
            lookback_secs: lookback_hours.saturating_mul(3600),
        }
    }

    /// One window per joined channel, covering the lookback period that ends at `now_epoch_secs`.
    ///
    /// Nothing here is fatal. A failed listing yields zero channels, and a
    /// failed channel keeps an empty window.
    pub fn collect_all(&self, now_epoch_secs: u64) -> CollectionOutcome {
        let mut outcome = CollectionOutcome::default();
        let channels = match self.platform.list_joined_channels() {
            Ok(channels) => channels,
            Err(err) => {
                warn::emit("W_LIST", "collect", "", "conversations.list", &err.to_string());
                outcome.listing_failed = true;
                return outcome;
            }
        };
        let since = now_epoch_secs.saturating_sub(self.lookback_secs);
        let aggregator = ThreadAggregator::new(self.platform, self.resolver, &self.options);

        for channel in channels {
            let aggregated = aggregator.collect(&channel.id, since, now_epoch_secs);
            if aggregated.history_failed {
                outcome.failed_channels.push(channel.id.clone());
            }
            outcome.failed_threads += aggregated.failed_threads;
            outcome.dropped_messages += aggregated.dropped_messages;
            tracing::debug!(
                channel = %channel.id,
                utterances = aggregated.utterances.len(),
                "collected channel window"
            );
            outcome.windows.push(ChannelWindow {
                channel_id: channel.id,
                channel_name: channel.name,
                since_epoch_secs: since,
                until_epoch_secs: now_epoch_secs,
                utterances: aggregated.utterances,
            });
        }
        outcome
    }
}
