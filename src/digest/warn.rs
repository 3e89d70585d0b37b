fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn render(code: &str, stage: &str, channel: &str, subject: &str, err: &str) -> String {
    format!(
        "ISUM_WARN code={} stage={} channel={} subject={} err={}",
        sanitize_value(code),
        sanitize_value(stage),
        sanitize_value(channel),
        sanitize_value(subject),
        sanitize_value(err),
    )
}

/// One grep-able line per degraded unit of work (a channel, a thread, a lookup).
pub fn emit(code: &str, stage: &str, channel: &str, subject: &str, err: &str) {
    tracing::warn!(
        code,
        stage,
        channel,
        subject,
        "{}",
        render(code, stage, channel, subject, err)
    );
}
