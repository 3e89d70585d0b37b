use crate::digest::types::{ChannelWindow, Utterance};

pub const THREAD_MARKER: &str = "(thread)";

const INSTRUCTIONS: &str = "Please provide a summary with separate topics and summaries for the \
     following Slack channel conversations and their threads with reference to users. The main \
     conversation and threads are separated by \"(thread)\". Format the output as:\n\n\
     Topic 1\nSummary 1\n\nTopic 2\nSummary 2";

const ECHO_INSTRUCTIONS: &str = "Messages that start a conversation carry a tag like \
     [ts:1700000000.000100]. Copy the tag of the message each topic is about to the end of \
     that topic's line.";

fn transcript_line(utterance: &Utterance, echo_timestamps: bool) -> String {
    let text = utterance.text.replace(['\r', '\n'], " ");
    if utterance.is_thread_reply {
        return format!("{} {THREAD_MARKER} said: {text}", utterance.speaker_name);
    }
    if echo_timestamps {
        format!(
            "[ts:{}] {} said: {text}",
            utterance.timestamp, utterance.speaker_name
        )
    } else {
        format!("{} said: {text}", utterance.speaker_name)
    }
}

/// Joins the window's utterances, in order, behind a single free-form instruction.
pub fn build_prompt(window: &ChannelWindow, echo_timestamps: bool) -> String {
    let transcript = window
        .utterances
        .iter()
        .map(|u| transcript_line(u, echo_timestamps))
        .collect::<Vec<_>>()
        .join(" ");

    if echo_timestamps {
        format!("{INSTRUCTIONS}\n\n{ECHO_INSTRUCTIONS}\n\n{transcript}")
    } else {
        format!("{INSTRUCTIONS}\n\n{transcript}")
    }
}
