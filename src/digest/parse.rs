use crate::digest::types::{ChannelWindow, SummaryRecord};

/// Removes an optional `Topic:` / `Topic 3:` style label (any case), plus
/// markdown emphasis the model likes to wrap it in.
fn strip_label(line: &str, label: &str) -> String {
    let trimmed = line.trim().trim_start_matches(['#', '*', '-', ' ']);
    let Some(head) = trimmed.get(..label.len()) else {
        return clean(trimmed);
    };
    if !head.eq_ignore_ascii_case(label) {
        return clean(trimmed);
    }
    let after_label = &trimmed[label.len()..];
    let after_number = after_label
        .trim_start()
        .trim_start_matches(|c: char| c.is_ascii_digit());
    match after_number.strip_prefix(':') {
        Some(rest) => clean(rest),
        None => clean(trimmed),
    }
}

fn clean(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

/// Pulls a `[ts:...]` tag out of a line, returning the line without it.
fn take_ts_tag(line: &str) -> (String, Option<String>) {
    let Some(start) = line.find("[ts:") else {
        return (line.to_string(), None);
    };
    let Some(len) = line[start..].find(']') else {
        return (line.to_string(), None);
    };
    let tag = line[start + 4..start + len].trim().to_string();
    let mut rest = String::with_capacity(line.len());
    rest.push_str(&line[..start]);
    rest.push_str(&line[start + len + 1..]);
    (rest.trim().to_string(), Some(tag))
}

fn blocks(raw: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(trimmed);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Splits a completion into ordered topic/summary records.
///
/// Linking is best-effort: the record at position `i` is paired with the
/// `i`-th root message of the window, which assumes the model kept topics in
/// message order. Nothing verifies that; a reordered or merged answer links to
/// the wrong message. An echoed `[ts:...]` tag naming a root of this window
/// takes precedence over the positional guess.
pub fn parse(raw: &str, window: &ChannelWindow) -> Vec<SummaryRecord> {
    if window.is_empty() || raw.trim().is_empty() {
        return Vec::new();
    }
    let roots = window.root_timestamps();

    let mut records = Vec::new();
    for block in blocks(raw) {
        let (topic_line, echoed) = take_ts_tag(block[0]);
        let topic = strip_label(&topic_line, "Topic");
        if topic.is_empty() {
            continue;
        }
        let summary = block
            .get(1)
            .map(|line| strip_label(&take_ts_tag(line).0, "Summary"))
            .filter(|s| !s.is_empty());

        let position = records.len();
        let source_timestamp = echoed
            .filter(|tag| roots.contains(&tag.as_str()))
            .or_else(|| roots.get(position).map(|ts| ts.to_string()));

        records.push(SummaryRecord {
            topic,
            summary,
            source_timestamp,
        });
    }
    records
}
