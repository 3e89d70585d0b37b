use crate::digest::platform::ChatPlatform;
use crate::digest::warn;
use crate::error::DigestResult;

/// Sends finished reports. One attempt per call; the next scheduled cycle is the retry.
pub struct Dispatcher<'a> {
    platform: &'a dyn ChatPlatform,
}

impl<'a> Dispatcher<'a> {
    pub fn new(platform: &'a dyn ChatPlatform) -> Self {
        Self { platform }
    }

    /// The recipient's private channel. Failing here aborts the cycle's delivery.
    pub fn recipient_channel(&self, user_id: &str) -> DigestResult<String> {
        self.platform.open_direct_channel(user_id).inspect_err(|err| {
            warn::emit("W_DM_OPEN", "deliver", "", user_id, &err.to_string());
        })
    }

    pub fn deliver(&self, channel_id: &str, report: &str) -> DigestResult<()> {
        match self.platform.post_message(channel_id, report) {
            Ok(()) => {
                tracing::info!(channel = channel_id, bytes = report.len(), "digest delivered");
                Ok(())
            }
            Err(err) => {
                warn::emit("W_DELIVER", "deliver", channel_id, "", &err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::testing::FakePlatform;

    #[test]
    fn deliver_posts_once_to_the_given_channel() {
        let platform = FakePlatform::default();
        let dispatcher = Dispatcher::new(&platform);
        let channel = dispatcher.recipient_channel("U1").expect("dm");
        dispatcher.deliver(&channel, "report").expect("deliver");
        assert_eq!(platform.posted(), vec![("D-U1".to_string(), "report".to_string())]);
    }

    #[test]
    fn failures_surface_without_retry() {
        let platform = FakePlatform {
            fail_post: true,
            fail_open_direct: true,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&platform);
        assert!(dispatcher.recipient_channel("U1").is_err());
        assert!(dispatcher.deliver("D1", "report").is_err());
        assert!(platform.posted().is_empty());
    }
}
