use crate::digest::util::env_non_empty;
use crate::error::{DigestError, DigestResult};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Sampling knobs forwarded to whichever provider is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

pub trait Summarizer: Send + Sync {
    fn label(&self) -> &'static str;
    fn complete(&self, prompt: &str, params: &SamplingParams) -> DigestResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProvider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenAiCompatible,
}

impl RemoteProvider {
    pub fn label(self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "openai",
            RemoteProvider::Anthropic => "anthropic",
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAiCompatible => "openai-compatible",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteModelConfig {
    pub provider: RemoteProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

fn parse_provider_alias(raw: &str) -> Option<RemoteProvider> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "openai" => Some(RemoteProvider::OpenAi),
        "anthropic" | "claude" => Some(RemoteProvider::Anthropic),
        "gemini" | "google" => Some(RemoteProvider::Gemini),
        "openai-compatible" | "compatible" | "deepseek" => Some(RemoteProvider::OpenAiCompatible),
        _ => None,
    }
}

fn parse_prefixed_model(raw: &str) -> (Option<RemoteProvider>, String) {
    let trimmed = raw.trim();
    if let Some((prefix, model)) = trimmed.split_once(':')
        && let Some(provider) = parse_provider_alias(prefix)
    {
        return (Some(provider), model.trim().to_string());
    }
    (None, trimmed.to_string())
}

fn infer_provider_from_model(model: &str) -> Option<RemoteProvider> {
    let lower = model.trim().to_ascii_lowercase();
    if lower.starts_with("deepseek-") {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if lower.starts_with("claude-") {
        return Some(RemoteProvider::Anthropic);
    }
    if lower.starts_with("gemini-") {
        return Some(RemoteProvider::Gemini);
    }
    if lower.starts_with("gpt-")
        || lower.starts_with("o1")
        || lower.starts_with("o3")
        || lower.starts_with("o4")
    {
        return Some(RemoteProvider::OpenAi);
    }
    None
}

/// Reads one trimmed, non-empty environment value.
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn first_available_provider(env: EnvLookup<'_>) -> Option<RemoteProvider> {
    if env("AI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if env("OPENAI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAi);
    }
    if env("ANTHROPIC_API_KEY").is_some() {
        return Some(RemoteProvider::Anthropic);
    }
    if env("GEMINI_API_KEY").is_some() {
        return Some(RemoteProvider::Gemini);
    }
    None
}

fn default_model_for_provider(provider: RemoteProvider) -> &'static str {
    match provider {
        RemoteProvider::OpenAi => "gpt-4.1-mini",
        RemoteProvider::Anthropic => "claude-3-5-haiku-latest",
        RemoteProvider::Gemini => "gemini-2.5-flash-lite",
        RemoteProvider::OpenAiCompatible => "deepseek-chat",
    }
}

fn resolve_api_key(provider: RemoteProvider, env: EnvLookup<'_>) -> Option<String> {
    match provider {
        RemoteProvider::OpenAi => env("OPENAI_API_KEY").or_else(|| env("AI_API_KEY")),
        RemoteProvider::Anthropic => env("ANTHROPIC_API_KEY").or_else(|| env("AI_API_KEY")),
        RemoteProvider::Gemini => env("GEMINI_API_KEY").or_else(|| env("AI_API_KEY")),
        RemoteProvider::OpenAiCompatible => env("AI_API_KEY")
            .or_else(|| env("DEEPSEEK_API_KEY"))
            .or_else(|| env("OPENAI_API_KEY")),
    }
}

fn resolve_base_url(provider: RemoteProvider, model: &str, env: EnvLookup<'_>) -> Option<String> {
    if let Some(base) = env("AI_BASE_URL") {
        return Some(base);
    }
    match provider {
        RemoteProvider::OpenAiCompatible
            if model.trim().to_ascii_lowercase().starts_with("deepseek-") =>
        {
            Some("https://api.deepseek.com".to_string())
        }
        _ => None,
    }
}

/// Picks provider, model and key from the environment.
///
/// Precedence: `ISUM_COMPLETION_PROVIDER` / `AI_PROVIDER`, then a `provider:` prefix
/// on `ISUM_COMPLETION_MODEL` / `AI_MODEL`, then the model name, then whichever
/// provider has a key.
pub fn resolve_remote_config() -> Option<RemoteModelConfig> {
    resolve_remote_config_from(&env_non_empty)
}

fn resolve_remote_config_from(env: EnvLookup<'_>) -> Option<RemoteModelConfig> {
    let configured_model = env("ISUM_COMPLETION_MODEL").or_else(|| env("AI_MODEL"));

    let mut chosen_provider = env("ISUM_COMPLETION_PROVIDER")
        .as_deref()
        .and_then(parse_provider_alias)
        .or_else(|| env("AI_PROVIDER").as_deref().and_then(parse_provider_alias));
    let (prefixed_provider, mut model) = configured_model
        .as_deref()
        .map(parse_prefixed_model)
        .unwrap_or((None, String::new()));
    if chosen_provider.is_none() {
        chosen_provider = prefixed_provider
            .or_else(|| infer_provider_from_model(&model))
            .or_else(|| first_available_provider(env));
    }

    let provider = chosen_provider?;
    if model.trim().is_empty() {
        model = default_model_for_provider(provider).to_string();
    }
    let base_url = resolve_base_url(provider, &model, env);
    let api_key = resolve_api_key(provider, env)?;
    Some(RemoteModelConfig {
        provider,
        model,
        api_key,
        base_url,
    })
}

fn http_client(timeout_secs: u64) -> DigestResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|err| DigestError::Config(format!("failed to build http client: {err}")))
}

fn post_json(
    operation: &str,
    request: reqwest::blocking::RequestBuilder,
    payload: &Value,
) -> DigestResult<Value> {
    let response = request
        .json(payload)
        .send()
        .map_err(|err| DigestError::transport(operation, err))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(DigestError::transport(
            operation,
            format!("status {status}: {}", crate::digest::util::truncate_with_ellipsis(&body, 300)),
        ));
    }
    response
        .json::<Value>()
        .map_err(|err| DigestError::Parse(format!("{operation} returned invalid JSON: {err}")))
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let first = choices.first()?;
    if let Some(text) = first.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let content = first.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let chunks = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>();
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    let content = json.get("content").and_then(Value::as_array)?;
    let chunks = content
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)?;
    let chunks = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join(""))
    }
}

/// OpenAI chat completions, and anything that speaks the same dialect.
pub struct OpenAiCompatSummarizer {
    provider: RemoteProvider,
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

pub struct AnthropicSummarizer {
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

pub struct GeminiSummarizer {
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

fn openai_payload(model: &str, prompt: &str, params: &SamplingParams) -> Value {
    json!({
        "model": model,
        "messages": [
            {"role": "user", "content": prompt}
        ],
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "top_p": params.top_p,
        "frequency_penalty": params.frequency_penalty,
        "presence_penalty": params.presence_penalty
    })
}

fn anthropic_payload(model: &str, prompt: &str, params: &SamplingParams) -> Value {
    let mut payload = json!({
        "model": model,
        "max_tokens": params.max_tokens,
        "temperature": params.temperature,
        "messages": [
            {"role": "user", "content": prompt}
        ]
    });
    // Anthropic has no penalties; top_p is only sent when it actually narrows sampling.
    if params.top_p < 1.0 {
        payload["top_p"] = json!(params.top_p);
    }
    payload
}

fn gemini_payload(prompt: &str, params: &SamplingParams) -> Value {
    let mut generation = json!({
        "temperature": params.temperature,
        "maxOutputTokens": params.max_tokens,
        "topP": params.top_p
    });
    if params.frequency_penalty != 0.0 {
        generation["frequencyPenalty"] = json!(params.frequency_penalty);
    }
    if params.presence_penalty != 0.0 {
        generation["presencePenalty"] = json!(params.presence_penalty);
    }
    json!({
        "contents": [
            {"parts": [{"text": prompt}]}
        ],
        "generationConfig": generation
    })
}

impl Summarizer for OpenAiCompatSummarizer {
    fn label(&self) -> &'static str {
        self.provider.label()
    }

    fn complete(&self, prompt: &str, params: &SamplingParams) -> DigestResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self.client.post(&url).bearer_auth(&self.api_key);
        let payload = openai_payload(&self.model, prompt, params);
        let json = post_json("chat.completions", request, &payload)?;
        let text = extract_openai_compatible_text(&json).ok_or_else(|| {
            DigestError::Parse(format!("{} response missing text content", self.label()))
        })?;
        Ok(text.trim().to_string())
    }
}

impl Summarizer for AnthropicSummarizer {
    fn label(&self) -> &'static str {
        RemoteProvider::Anthropic.label()
    }

    fn complete(&self, prompt: &str, params: &SamplingParams) -> DigestResult<String> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let json = post_json("messages", request, &anthropic_payload(&self.model, prompt, params))?;
        let text = extract_anthropic_text(&json)
            .ok_or_else(|| DigestError::Parse("anthropic response missing text content".into()))?;
        Ok(text.trim().to_string())
    }
}

impl Summarizer for GeminiSummarizer {
    fn label(&self) -> &'static str {
        RemoteProvider::Gemini.label()
    }

    fn complete(&self, prompt: &str, params: &SamplingParams) -> DigestResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key);
        let json = post_json("generateContent", request, &gemini_payload(prompt, params))?;
        let text = extract_gemini_text(&json)
            .ok_or_else(|| DigestError::Parse("gemini response missing text content".into()))?;
        Ok(text.trim().to_string())
    }
}

pub fn build_summarizer(
    remote: &RemoteModelConfig,
    timeout_secs: u64,
) -> DigestResult<Box<dyn Summarizer>> {
    let client = http_client(timeout_secs)?;
    let summarizer: Box<dyn Summarizer> = match remote.provider {
        RemoteProvider::OpenAi | RemoteProvider::OpenAiCompatible => {
            Box::new(OpenAiCompatSummarizer {
                provider: remote.provider,
                model: remote.model.clone(),
                api_key: remote.api_key.clone(),
                base_url: remote
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                client,
            })
        }
        RemoteProvider::Anthropic => Box::new(AnthropicSummarizer {
            model: remote.model.clone(),
            api_key: remote.api_key.clone(),
            base_url: remote
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            client,
        }),
        RemoteProvider::Gemini => Box::new(GeminiSummarizer {
            model: remote.model.clone(),
            api_key: remote.api_key.clone(),
            base_url: remote
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            client,
        }),
    };
    Ok(summarizer)
}

/// Summarizer from the environment, or a config error naming what is missing.
pub fn summarizer_from_env(timeout_secs: u64) -> DigestResult<Box<dyn Summarizer>> {
    let remote = resolve_remote_config().ok_or_else(|| {
        DigestError::Config(
            "no summarization provider configured; set ISUM_COMPLETION_PROVIDER/\
             ISUM_COMPLETION_MODEL and a provider API key"
                .into(),
        )
    })?;
    tracing::debug!(
        provider = remote.provider.label(),
        model = %remote.model,
        "resolved summarization provider"
    );
    build_summarizer(&remote, timeout_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn explicit_provider_beats_model_prefix() {
        let env = env_of(&[
            ("ISUM_COMPLETION_PROVIDER", "anthropic"),
            ("ISUM_COMPLETION_MODEL", "openai:claude-3-7-sonnet"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]);
        let remote = resolve_remote_config_from(&env).expect("resolved");
        assert_eq!(remote.provider, RemoteProvider::Anthropic);
        assert_eq!(remote.model, "claude-3-7-sonnet");
        assert_eq!(remote.api_key, "sk-ant");
    }

    #[test]
    fn isum_model_prefix_accepts_compatible_aliases() {
        let env = env_of(&[
            ("ISUM_COMPLETION_MODEL", "deepseek: deepseek-reasoner"),
            ("AI_MODEL", "gpt-4.1"),
            ("DEEPSEEK_API_KEY", "sk-ds"),
        ]);
        let remote = resolve_remote_config_from(&env).expect("resolved");
        assert_eq!(remote.provider, RemoteProvider::OpenAiCompatible);
        assert_eq!(remote.model, "deepseek-reasoner");
        assert_eq!(remote.api_key, "sk-ds");
        assert_eq!(remote.base_url.as_deref(), Some("https://api.deepseek.com"));

        let (provider, model) = parse_prefixed_model("compatible:local-llama");
        assert_eq!(provider, Some(RemoteProvider::OpenAiCompatible));
        assert_eq!(model, "local-llama");
    }

    #[test]
    fn bare_ai_api_key_falls_back_to_openai_compatible() {
        let env = env_of(&[
            ("AI_API_KEY", "sk-any"),
            ("AI_BASE_URL", "http://127.0.0.1:8080"),
        ]);
        let remote = resolve_remote_config_from(&env).expect("resolved");
        assert_eq!(remote.provider, RemoteProvider::OpenAiCompatible);
        assert_eq!(remote.model, "deepseek-chat");
        assert_eq!(remote.base_url.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn provider_without_key_does_not_resolve() {
        let env = env_of(&[
            ("ISUM_COMPLETION_MODEL", "gemini-2.5-pro"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]);
        assert!(resolve_remote_config_from(&env).is_none());
        assert!(resolve_remote_config_from(&env_of(&[])).is_none());
    }

    #[test]
    fn openai_payload_carries_every_sampling_knob() {
        let payload = openai_payload("gpt-4.1-mini", "hi", &SamplingParams::default());
        assert_eq!(payload["temperature"], json!(0.7));
        assert_eq!(payload["max_tokens"], json!(2048));
        assert_eq!(payload["top_p"], json!(1.0));
        assert_eq!(payload["frequency_penalty"], json!(0.0));
        assert_eq!(payload["presence_penalty"], json!(0.0));
        assert_eq!(payload["messages"][0]["content"], json!("hi"));
    }

    #[test]
    fn anthropic_and_gemini_payloads_skip_neutral_knobs() {
        let params = SamplingParams::default();
        let anthropic = anthropic_payload("claude-3-5-haiku-latest", "hi", &params);
        assert!(anthropic.get("top_p").is_none());
        assert_eq!(anthropic["max_tokens"], json!(2048));

        let gemini = gemini_payload("hi", &params);
        assert_eq!(gemini["generationConfig"]["maxOutputTokens"], json!(2048));
        assert!(gemini["generationConfig"].get("frequencyPenalty").is_none());

        let tuned = SamplingParams {
            top_p: 0.9,
            presence_penalty: 0.5,
            ..SamplingParams::default()
        };
        assert_eq!(anthropic_payload("m", "hi", &tuned)["top_p"], json!(0.9));
        assert_eq!(
            gemini_payload("hi", &tuned)["generationConfig"]["presencePenalty"],
            json!(0.5)
        );
    }

    #[test]
    fn extract_openai_compatible_text_reads_chat_and_legacy_shapes() {
        let chat = json!({"choices": [{"message": {"content": "Topic: A\nSummary: b"}}]});
        assert_eq!(
            extract_openai_compatible_text(&chat).as_deref(),
            Some("Topic: A\nSummary: b")
        );
        let legacy = json!({"choices": [{"text": "\n\nTopic: A"}]});
        assert_eq!(
            extract_openai_compatible_text(&legacy).as_deref(),
            Some("\n\nTopic: A")
        );
        assert_eq!(extract_openai_compatible_text(&json!({"choices": []})), None);
    }

    #[test]
    fn extract_anthropic_text_reads_content_blocks() {
        let payload = json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ]
        });
        assert_eq!(
            extract_anthropic_text(&payload).as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn extract_gemini_text_joins_parts() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "Topic: A\n"}, {"text": "Summary: b"}]}}]
        });
        assert_eq!(
            extract_gemini_text(&payload).as_deref(),
            Some("Topic: A\nSummary: b")
        );
    }
}
