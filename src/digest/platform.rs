use crate::digest::types::{ChannelRef, RawMessage, UserProfile};
use crate::error::DigestResult;

/// Chat-platform operations the pipeline consumes.
///
/// Implementations are plain blocking calls; every failure surfaces as
/// `DigestError::Transport` so callers can decide how small the blast radius is.
pub trait ChatPlatform: Send + Sync {
    /// Channels the bot is a member of, archived channels excluded.
    fn list_joined_channels(&self) -> DigestResult<Vec<ChannelRef>>;

    /// Top-level messages posted in `[oldest, latest]` (epoch seconds), at most `limit`.
    fn fetch_history(
        &self,
        channel_id: &str,
        oldest_epoch_secs: u64,
        latest_epoch_secs: u64,
        limit: u32,
    ) -> DigestResult<Vec<RawMessage>>;

    /// Every message of the thread anchored at `root_ts`. May include the root itself.
    fn fetch_replies(&self, channel_id: &str, root_ts: &str) -> DigestResult<Vec<RawMessage>>;

    fn fetch_user_profile(&self, user_id: &str) -> DigestResult<UserProfile>;

    fn open_direct_channel(&self, user_id: &str) -> DigestResult<String>;

    fn post_message(&self, channel_id: &str, text: &str) -> DigestResult<()>;
}
