use crate::digest::config::SlackConfig;
use crate::digest::platform::ChatPlatform;
use crate::digest::types::{ChannelRef, RawMessage, UserProfile};
use crate::digest::util::{env_non_empty, truncate_with_ellipsis};
use crate::error::{DigestError, DigestResult};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;

const MAX_LIST_PAGES: usize = 20;
const MAX_REPLY_PAGES: usize = 20;
const LIST_PAGE_SIZE: &str = "200";
const REPLIES_PAGE_SIZE: &str = "200";

/// Blocking Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    http: Client,
    api_base: String,
    token: String,
}

impl SlackClient {
    pub fn new(api_base: &str, token: &str, timeout_secs: u64) -> DigestResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|err| DigestError::Config(format!("failed to build slack client: {err}")))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Token comes from `SLACK_BOT_TOKEN`, then `ISUM_SLACK_BOT_TOKEN`.
    pub fn from_config(config: &SlackConfig) -> DigestResult<Self> {
        let token = env_non_empty("SLACK_BOT_TOKEN")
            .or_else(|| env_non_empty("ISUM_SLACK_BOT_TOKEN"))
            .ok_or_else(|| {
                DigestError::Config(
                    "missing slack bot token; set SLACK_BOT_TOKEN or ISUM_SLACK_BOT_TOKEN"
                        .to_string(),
                )
            })?;
        Self::new(&config.api_base, &token, config.request_timeout_secs)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    fn get(&self, method: &str, query: &[(&str, &str)]) -> DigestResult<Value> {
        let request = self
            .http
            .get(self.url(method))
            .bearer_auth(&self.token)
            .query(query);
        send(method, request)
    }

    fn post(&self, method: &str, payload: &Value) -> DigestResult<Value> {
        let request = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(payload);
        send(method, request)
    }
}

/// Slack answers most failures with HTTP 200 and `"ok": false`; both shapes are transport errors.
fn send(method: &str, request: RequestBuilder) -> DigestResult<Value> {
    let response = request
        .send()
        .map_err(|err| DigestError::transport(method, err))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| DigestError::transport(method, err))?;
    if !status.is_success() {
        return Err(DigestError::transport(
            method,
            format!("status {status}: {}", truncate_with_ellipsis(&body, 300)),
        ));
    }

    let data: Value = serde_json::from_str(&body).map_err(|err| {
        DigestError::transport(method, format!("response is not valid JSON: {err}"))
    })?;
    if data.get("ok").and_then(Value::as_bool) != Some(true) {
        let reason = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(DigestError::transport(method, reason));
    }
    Ok(data)
}

fn next_cursor(data: &Value) -> Option<String> {
    data.get("response_metadata")
        .and_then(|rm| rm.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToOwned::to_owned)
}

fn joined_channels(data: &Value) -> Vec<ChannelRef> {
    data.get("channels")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|channel| {
            let id = channel.get("id").and_then(Value::as_str)?;
            let is_member = channel
                .get("is_member")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let is_archived = channel
                .get("is_archived")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !is_member || is_archived {
                return None;
            }
            let name = channel
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(id);
            Some(ChannelRef {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

fn messages(method: &str, data: &Value) -> DigestResult<Vec<RawMessage>> {
    let Some(raw) = data.get("messages") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(raw.clone())
        .map_err(|err| DigestError::transport(method, format!("unexpected message shape: {err}")))
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn seconds_param(epoch_secs: u64) -> String {
    format!("{epoch_secs}.000000")
}

impl ChatPlatform for SlackClient {
    fn list_joined_channels(&self) -> DigestResult<Vec<ChannelRef>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_LIST_PAGES {
            let mut query = vec![
                ("exclude_archived", "true"),
                ("types", "public_channel,private_channel"),
                ("limit", LIST_PAGE_SIZE),
            ];
            if let Some(next) = cursor.as_deref() {
                query.push(("cursor", next));
            }
            let data = self.get("conversations.list", &query)?;
            channels.extend(joined_channels(&data));

            cursor = next_cursor(&data);
            if cursor.is_none() {
                break;
            }
            if page == MAX_LIST_PAGES {
                tracing::warn!(
                    pages = MAX_LIST_PAGES,
                    "conversations.list reached page limit; channel list may be incomplete"
                );
            }
        }
        Ok(channels)
    }

    fn fetch_history(
        &self,
        channel_id: &str,
        oldest_epoch_secs: u64,
        latest_epoch_secs: u64,
        limit: u32,
    ) -> DigestResult<Vec<RawMessage>> {
        let oldest = seconds_param(oldest_epoch_secs);
        let latest = seconds_param(latest_epoch_secs);
        let limit = limit.to_string();
        let data = self.get(
            "conversations.history",
            &[
                ("channel", channel_id),
                ("oldest", oldest.as_str()),
                ("latest", latest.as_str()),
                ("inclusive", "true"),
                ("limit", limit.as_str()),
            ],
        )?;
        messages("conversations.history", &data)
    }

    fn fetch_replies(&self, channel_id: &str, root_ts: &str) -> DigestResult<Vec<RawMessage>> {
        let mut replies = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_REPLY_PAGES {
            let mut query = vec![
                ("channel", channel_id),
                ("ts", root_ts),
                ("limit", REPLIES_PAGE_SIZE),
            ];
            if let Some(next) = cursor.as_deref() {
                query.push(("cursor", next));
            }
            let data = self.get("conversations.replies", &query)?;
            replies.extend(messages("conversations.replies", &data)?);

            cursor = next_cursor(&data);
            if cursor.is_none() {
                break;
            }
            if page == MAX_REPLY_PAGES {
                tracing::warn!(
                    channel = channel_id,
                    thread = root_ts,
                    pages = MAX_REPLY_PAGES,
                    "conversations.replies reached page limit; thread may be incomplete"
                );
            }
        }
        Ok(replies)
    }

    fn fetch_user_profile(&self, user_id: &str) -> DigestResult<UserProfile> {
        let data = self.get("users.info", &[("user", user_id)])?;
        let user = data
            .get("user")
            .ok_or_else(|| DigestError::transport("users.info", "response missing user"))?;
        let profile = user.get("profile");
        Ok(UserProfile {
            display_name: non_empty(profile.and_then(|p| p.get("display_name"))),
            real_name: non_empty(profile.and_then(|p| p.get("real_name")))
                .or_else(|| non_empty(user.get("real_name"))),
            handle: non_empty(user.get("name")).unwrap_or_else(|| user_id.to_string()),
        })
    }

    fn open_direct_channel(&self, user_id: &str) -> DigestResult<String> {
        let data = self.post("conversations.open", &json!({ "users": user_id }))?;
        non_empty(data.get("channel").and_then(|c| c.get("id")))
            .ok_or_else(|| {
                DigestError::transport("conversations.open", "response missing channel id")
            })
    }

    fn post_message(&self, channel_id: &str, text: &str) -> DigestResult<()> {
        self.post(
            "chat.postMessage",
            &json!({
                "channel": channel_id,
                "text": text,
                "mrkdwn": true,
                "unfurl_links": false,
            }),
        )?;
        Ok(())
    }
}
