use crate::digest::audit;
use crate::digest::collector::ConversationCollector;
use crate::digest::completion::Summarizer;
use crate::digest::config::DigestConfig;
use crate::digest::dispatch::Dispatcher;
use crate::digest::format::format_report;
use crate::digest::identity::IdentifierResolver;
use crate::digest::parse::parse;
use crate::digest::paths::DigestPaths;
use crate::digest::platform::ChatPlatform;
use crate::digest::prompt::build_prompt;
use crate::digest::threads::ThreadAggregatorOptions;
use crate::digest::types::{ChannelDigest, ChannelWindow};
use crate::digest::warn;
use crate::error::{DigestError, DigestResult};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub listing_failed: bool,
    pub channels: usize,
    pub summarized_channels: usize,
    pub quiet_channels: usize,
    pub failed_channels: Vec<String>,
    pub failed_summaries: Vec<String>,
    pub failed_threads: usize,
    pub dropped_messages: usize,
    pub report: String,
    pub delivered_to: Option<String>,
}

impl CycleOutcome {
    pub fn status(&self) -> &'static str {
        if !self.listing_failed
            && self.failed_channels.is_empty()
            && self.failed_summaries.is_empty()
            && self.failed_threads == 0
        {
            "ok"
        } else {
            "degraded"
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "channels={} summarized={} quiet={} failed_channels={} failed_summaries={} \
             failed_threads={} dropped_messages={}",
            self.channels,
            self.summarized_channels,
            self.quiet_channels,
            self.failed_channels.len(),
            self.failed_summaries.len(),
            self.failed_threads,
            self.dropped_messages
        )
    }
}

/// Transport failures are usually transient; anything else points at the provider's output.
fn summarize_warn_code(err: &DigestError) -> &'static str {
    if err.is_transport() {
        "W_SUMMARIZE_TRANSPORT"
    } else {
        "W_SUMMARIZE"
    }
}

/// One collect -> summarize -> format -> dispatch run, end to end.
pub trait CycleRunner: Send + Sync + 'static {
    fn run_cycle(&self, recipient: &str, now_epoch_secs: u64) -> DigestResult<CycleOutcome>;
}

/// Owns the collaborators and the process-wide identifier cache.
pub struct Pipeline {
    platform: Arc<dyn ChatPlatform>,
    summarizer: Arc<dyn Summarizer>,
    resolver: IdentifierResolver,
    config: DigestConfig,
    paths: Option<DigestPaths>,
}

impl Pipeline {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        summarizer: Arc<dyn Summarizer>,
        config: DigestConfig,
        paths: Option<DigestPaths>,
    ) -> Self {
        let resolver = IdentifierResolver::new(platform.clone());
        Self {
            platform,
            summarizer,
            resolver,
            config,
            paths,
        }
    }

    fn audit(&self, phase: &str, status: &str, message: &str) {
        if let Some(paths) = &self.paths {
            audit::record(paths, phase, status, message);
        }
    }

    /// Quiet channels never reach the summarizer.
    pub fn summarize_window(&self, window: &ChannelWindow) -> DigestResult<ChannelDigest> {
        if window.is_empty() {
            return Ok(ChannelDigest::from_records(
                &window.channel_id,
                &window.channel_name,
                Vec::new(),
            ));
        }
        let prompt = build_prompt(window, self.config.completion.echo_timestamps);
        let raw = self
            .summarizer
            .complete(&prompt, &self.config.completion.sampling())?;
        let records = parse(&raw, window);
        if records.is_empty() {
            tracing::info!(channel = %window.channel_id, "summarizer returned no topics");
        }
        Ok(ChannelDigest::from_records(
            &window.channel_id,
            &window.channel_name,
            records,
        ))
    }

    /// Collects and summarizes every channel, returning the rendered report.
    pub fn build_report(&self, now_epoch_secs: u64) -> DigestResult<CycleOutcome> {
        let collector = ConversationCollector::new(
            self.platform.as_ref(),
            &self.resolver,
            ThreadAggregatorOptions {
                page_size: self.config.slack.history_limit,
                trigger_phrase: self.config.slack.trigger_phrase.clone(),
            },
            self.config.slack.lookback_hours,
        );
        let collected = collector.collect_all(now_epoch_secs);
        if collected.listing_failed {
            self.audit("collect", "failed", "reason=channel-listing");
        }

        let mut outcome = CycleOutcome {
            listing_failed: collected.listing_failed,
            channels: collected.windows.len(),
            failed_channels: collected.failed_channels,
            failed_threads: collected.failed_threads,
            dropped_messages: collected.dropped_messages,
            ..Default::default()
        };
        let collect_ok = !outcome.listing_failed && outcome.failed_channels.is_empty();
        self.audit(
            "collect",
            if collect_ok { "ok" } else { "degraded" },
            &format!(
                "channels={} failed_channels={} failed_threads={} cached_names={}",
                outcome.channels,
                outcome.failed_channels.len(),
                outcome.failed_threads,
                self.resolver.cached_len()
            ),
        );

        let mut digests = Vec::with_capacity(collected.windows.len());
        for window in &collected.windows {
            match self.summarize_window(window) {
                Ok(digest) => {
                    tracing::debug!(
                        channel = %window.channel_id,
                        records = digest.record_count(),
                        "channel summarized"
                    );
                    match &digest {
                        ChannelDigest::NoActivity { .. } => outcome.quiet_channels += 1,
                        ChannelDigest::Summarized { .. } => outcome.summarized_channels += 1,
                    }
                    digests.push(digest);
                }
                Err(err) => {
                    warn::emit(
                        summarize_warn_code(&err),
                        "summarize",
                        &window.channel_id,
                        self.summarizer.label(),
                        &err.to_string(),
                    );
                    outcome.failed_summaries.push(window.channel_id.clone());
                }
            }
        }
        self.audit(
            "summarize",
            if outcome.failed_summaries.is_empty() { "ok" } else { "degraded" },
            &format!(
                "provider={} summarized={} quiet={} failed={}",
                self.summarizer.label(),
                outcome.summarized_channels,
                outcome.quiet_channels,
                outcome.failed_summaries.join(",")
            ),
        );

        outcome.report = format_report(&self.config.slack.archive_base_url, &digests);
        Ok(outcome)
    }
}

impl CycleRunner for Pipeline {
    fn run_cycle(&self, recipient: &str, now_epoch_secs: u64) -> DigestResult<CycleOutcome> {
        let dispatcher = Dispatcher::new(self.platform.as_ref());
        let channel = dispatcher.recipient_channel(recipient).inspect_err(|err| {
            self.audit("deliver", "failed", &format!("recipient={recipient} error={err}"));
        })?;

        let mut outcome = self.build_report(now_epoch_secs)?;
        if outcome.channels == 0 {
            tracing::info!(recipient, "bot is not a member of any channel; nothing to deliver");
            self.audit("deliver", "skipped", "reason=no-channels");
            return Ok(outcome);
        }

        dispatcher.deliver(&channel, &outcome.report).inspect_err(|err| {
            self.audit("deliver", "failed", &format!("channel={channel} error={err}"));
        })?;
        self.audit("deliver", "ok", &format!("channel={channel} {}", outcome.summary_line()));
        outcome.delivered_to = Some(channel);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::format::{NO_ACTIVITY_NOTICE, REPORT_HEADER};
    use crate::digest::testing::{FakePlatform, FakeSummarizer, msg, threaded};

    fn pipeline(platform: Arc<FakePlatform>, summarizer: Arc<FakeSummarizer>) -> Pipeline {
        let mut config = DigestConfig::default();
        config.slack.archive_base_url = "https://acme.slack.com/archives".to_string();
        Pipeline::new(platform, summarizer, config, None)
    }

    #[test]
    fn full_cycle_delivers_linked_topics_and_quiet_notice() {
        let platform = Arc::new(
            FakePlatform::default()
                .with_user("U1", Some("Ann"), None, "ann")
                .with_user("U2", None, Some("Bo Lee"), "bo")
                .with_channel(
                    "C1",
                    "eng",
                    vec![threaded("U1", "launch is friday <@U2>", "100.000100", 1)],
                )
                .with_replies("C1", "100.000100", vec![msg("U2", "ack", "101.000000")])
                .with_channel("C2", "random", Vec::new()),
        );
        let summarizer = Arc::new(FakeSummarizer::replying(
            "Topic: Launch\nSummary: Ships Friday",
        ));
        let outcome = pipeline(platform.clone(), summarizer.clone())
            .run_cycle("U9", 200)
            .expect("cycle");

        assert_eq!(outcome.delivered_to.as_deref(), Some("D-U9"));
        assert_eq!(outcome.summarized_channels, 1);
        assert_eq!(outcome.quiet_channels, 1);

        let prompts = summarizer.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(
            prompts[0].ends_with("Ann said: launch is friday @Bo Lee Bo Lee (thread) said: ack")
        );

        let posted = platform.posted();
        assert_eq!(posted.len(), 1);
        let report = &posted[0].1;
        assert!(report.starts_with(REPORT_HEADER));
        let linked = "><https://acme.slack.com/archives/C1/p100000100|Launch>\n>Ships Friday";
        assert!(report.contains(linked));
        assert!(report.contains(&format!(
            "<https://acme.slack.com/archives/C2|#random>\n{NO_ACTIVITY_NOTICE}"
        )));
    }

    #[test]
    fn one_failing_channel_does_not_block_the_others() {
        let mut platform = FakePlatform::default()
            .with_channel("CA", "alpha", vec![msg("U1", "a", "1.0")])
            .with_channel("CB", "beta", vec![msg("U1", "b", "2.000000")]);
        platform.failing_history.insert("CA".to_string());
        let platform = Arc::new(platform);
        let summarizer = Arc::new(FakeSummarizer::replying("Topic: B\nSummary: bee"));

        let outcome = pipeline(platform.clone(), summarizer)
            .run_cycle("U9", 10)
            .expect("cycle");
        assert_eq!(outcome.status(), "degraded");
        assert_eq!(outcome.failed_channels, vec!["CA".to_string()]);
        assert!(outcome.report.contains("#alpha>\nThere weren't any"));
        assert!(outcome.report.contains("/CB/p2000000|B>"));
    }

    #[test]
    fn summarizer_failure_drops_only_that_channel() {
        let platform = Arc::new(
            FakePlatform::default()
                .with_channel("C1", "eng", vec![msg("U1", "a", "1.0")])
                .with_channel("C2", "quiet", Vec::new()),
        );
        let summarizer = Arc::new(FakeSummarizer {
            fail: true,
            ..Default::default()
        });
        let outcome = pipeline(platform, summarizer).run_cycle("U9", 10).expect("cycle");
        assert_eq!(outcome.failed_summaries, vec!["C1".to_string()]);
        assert!(!outcome.report.contains("#eng"));
        assert!(outcome.report.contains("#quiet"));
    }

    #[test]
    fn empty_completion_maps_to_no_activity() {
        let platform = Arc::new(
            FakePlatform::default().with_channel("C1", "eng", vec![msg("U1", "a", "1.0")]),
        );
        let summarizer = Arc::new(FakeSummarizer::replying("   "));
        let outcome = pipeline(platform, summarizer).build_report(10).expect("report");
        assert_eq!(outcome.quiet_channels, 1);
        assert!(outcome.report.contains(NO_ACTIVITY_NOTICE));
    }

    #[test]
    fn recipient_channel_failure_aborts_before_collecting() {
        let platform = Arc::new(FakePlatform {
            fail_open_direct: true,
            ..FakePlatform::default().with_channel("C1", "eng", vec![msg("U1", "a", "1.0")])
        });
        let summarizer = Arc::new(FakeSummarizer::replying("Topic: A"));
        let result = pipeline(platform.clone(), summarizer.clone()).run_cycle("U9", 10);
        assert!(result.is_err());
        assert!(summarizer.prompts().is_empty());
        assert!(platform.posted().is_empty());
    }

    #[test]
    fn delivery_failure_is_reported_as_cycle_error() {
        let platform = Arc::new(FakePlatform {
            fail_post: true,
            ..FakePlatform::default().with_channel("C1", "eng", Vec::new())
        });
        let summarizer = Arc::new(FakeSummarizer::default());
        let err = pipeline(platform, summarizer)
            .run_cycle("U9", 10)
            .expect_err("delivery fails");
        assert!(err.is_transport());
    }

    #[test]
    fn listing_failure_is_degraded_not_fatal() {
        let platform = Arc::new(FakePlatform {
            fail_list: true,
            ..FakePlatform::default().with_channel("C1", "eng", vec![msg("U1", "a", "1.0")])
        });
        let summarizer = Arc::new(FakeSummarizer::replying("Topic: A"));
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = DigestPaths {
            home: tmp.path().to_path_buf(),
            state_dir: tmp.path().join("state"),
            logs_dir: tmp.path().join("logs"),
        };
        let outcome = Pipeline::new(
            platform.clone(),
            summarizer.clone(),
            DigestConfig::default(),
            Some(paths.clone()),
        )
        .run_cycle("U9", 10)
        .expect("listing failure does not abort the cycle");
        assert_eq!(outcome.channels, 0);
        assert_eq!(outcome.status(), "degraded");
        assert!(outcome.delivered_to.is_none());
        assert!(summarizer.prompts().is_empty());
        assert!(platform.posted().is_empty());

        let audit = std::fs::read_to_string(paths.logs_dir.join("audit.log")).expect("audit log");
        assert!(audit.contains("reason=channel-listing"));
        assert!(audit.contains("reason=no-channels"));
    }

    #[test]
    fn summarize_warn_code_separates_transport_from_bad_output() {
        let transport = DigestError::transport("completion", "status 503");
        let malformed = DigestError::Parse("no choices".to_string());
        assert_eq!(summarize_warn_code(&transport), "W_SUMMARIZE_TRANSPORT");
        assert_eq!(summarize_warn_code(&malformed), "W_SUMMARIZE");
    }
}
