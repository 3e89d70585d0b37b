use crate::digest::types::{ChannelDigest, SummaryRecord};

pub const NO_ACTIVITY_NOTICE: &str =
    "There weren't any meaningful conversations in the last 24 hours.";
pub const REPORT_HEADER: &str = "*Good morning, this is your daily summary:*";
pub const GENERIC_FAILURE_NOTICE: &str =
    "An error occurred while fetching messages or generating the summary. Please try again later.";

/// Slack mrkdwn control characters; link text must not contain raw `<`, `>` or `|`.
fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('|', "\u{2758}")
}

pub fn channel_link(archive_base: &str, channel_id: &str) -> String {
    format!("{}/{}", archive_base.trim_end_matches('/'), channel_id)
}

/// `<base>/<channel>/p<ts without the dot>`, the archive deep-link format.
pub fn permalink(archive_base: &str, channel_id: &str, ts: &str) -> String {
    format!(
        "{}/p{}",
        channel_link(archive_base, channel_id),
        ts.replace('.', "")
    )
}

/// Inverse of [`permalink`]: recovers `(channel_id, ts)` from a deep link.
#[cfg(test)]
pub fn parse_permalink(archive_base: &str, link: &str) -> Option<(String, String)> {
    let base = archive_base.trim_end_matches('/');
    let rest = link.strip_prefix(base)?.strip_prefix('/')?;
    let (channel, anchor) = rest.split_once('/')?;
    let digits = anchor.strip_prefix('p')?;
    if channel.is_empty() || digits.len() <= 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (secs, micros) = digits.split_at(digits.len() - 6);
    Some((channel.to_string(), format!("{secs}.{micros}")))
}

fn render_record(archive_base: &str, channel_id: &str, record: &SummaryRecord) -> String {
    let link = match record.source_timestamp.as_deref() {
        Some(ts) => permalink(archive_base, channel_id, ts),
        None => channel_link(archive_base, channel_id),
    };
    let mut out = format!("><{link}|{}>\n", escape_mrkdwn(&record.topic));
    if let Some(summary) = record.summary.as_deref() {
        out.push_str(&format!(">{}\n", escape_mrkdwn(summary)));
    }
    out
}

/// Body of one channel: the sentinel notice, or one quoted block per record.
pub fn format_digest(archive_base: &str, digest: &ChannelDigest) -> String {
    match digest {
        ChannelDigest::NoActivity { .. } => NO_ACTIVITY_NOTICE.to_string(),
        ChannelDigest::Summarized {
            channel_id,
            records,
            ..
        } => records
            .iter()
            .map(|record| render_record(archive_base, channel_id, record))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Channel body under a linked `#name` header.
pub fn format_channel_section(archive_base: &str, digest: &ChannelDigest) -> String {
    format!(
        "<{}|#{}>\n{}\n",
        channel_link(archive_base, digest.channel_id()),
        escape_mrkdwn(digest.channel_name()),
        format_digest(archive_base, digest)
    )
}

pub fn format_report(archive_base: &str, digests: &[ChannelDigest]) -> String {
    let sections = digests
        .iter()
        .map(|digest| format_channel_section(archive_base, digest))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{REPORT_HEADER}\n\n{sections}")
}
