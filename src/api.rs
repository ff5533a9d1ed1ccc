//! Summarization service clients.
//!
//! The digest HTML is written by an external, slow and fallible service. This
//! module hides it behind one trait so the preview logic can be tested with
//! stubs:
//! - [`Summarizer`]: Core trait turning a digest into an HTML document
//! - [`LlmSummarizer`]: Talks to an OpenAI-compatible LLM through `awful_aj`
//! - [`HttpSummarizer`]: Posts the digest to a remote summarization endpoint
//! - [`SummarizerBackend`]: Runtime choice between the two
//!
//! Failed calls are not retried; the error goes straight back to the user.

use crate::models::DigestConfig;
use crate::utils::{extract_html_document, truncate_for_log};
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use reqwest::header::CONTENT_TYPE;
use std::error::Error;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Why a digest could not be generated. The `Display` text is shown to the
/// user as-is.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("{0}")]
    Service(String),

    #[error("The summarization service did not return an HTML document.")]
    MalformedDocument,

    #[error("Digest generation timed out after {0:?}.")]
    TimedOut(Duration),

    #[error("Digest generation failed unexpectedly: {0}")]
    Unexpected(String),
}

/// Something that can write the HTML digest for a configuration.
pub trait Summarizer {
    /// Produce a complete, self-contained HTML document for `digest`.
    async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError>;
}

impl<T: Summarizer + ?Sized> Summarizer for &T {
    async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
        (**self).summarize(digest).await
    }
}

/// Build the instruction sent to the LLM for `digest`.
pub fn build_prompt(digest: &DigestConfig) -> String {
    let mut prompt = String::new();
    let stories = digest.story_count.get();
    let plural = if stories == 1 { "story" } else { "stories" };

    let _ = writeln!(
        prompt,
        "Write a news digest titled \"{}\" ({} edition).",
        digest.name,
        digest.schedule.label().to_lowercase()
    );
    if digest.topics.is_empty() {
        let _ = writeln!(
            prompt,
            "Cover the {stories} most important general news {plural} of the day."
        );
    } else {
        let _ = writeln!(
            prompt,
            "For each of the following topics, summarize the {stories} most important recent {plural}:"
        );
        for topic in &digest.topics {
            let _ = writeln!(prompt, "- {topic}");
        }
    }
    let _ = writeln!(
        prompt,
        "Each story needs a title, a two to three sentence summary and a link to the source article."
    );
    let _ = write!(
        prompt,
        "Respond with a single complete HTML document with inline styles, suitable for an email body. Do not include scripts."
    );
    prompt
}

/// Generates digests with an OpenAI-compatible LLM via `awful_aj`.
#[derive(Debug)]
pub struct LlmSummarizer {
    /// LLM configuration (API keys, endpoints, model settings).
    config: AwfulJadeConfig,
    /// Chat template framing the conversation.
    template: ChatTemplate,
}

impl LlmSummarizer {
    /// Template used when none is configured.
    pub const DEFAULT_TEMPLATE: &'static str = "news_digest";

    /// Load the chat template and LLM configuration.
    ///
    /// `config_path` defaults to `config.yaml` in the `awful_aj` config
    /// directory.
    #[instrument(level = "info")]
    pub async fn load(template_name: &str, config_path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let template = template::load_template(template_name).await?;
        info!(template_name, "Loaded chat template");

        let conf_file = match config_path {
            Some(path) => PathBuf::from(path),
            None => config_dir()?.join("config.yaml"),
        };
        let config_path = conf_file.to_str().ok_or("Not a valid config filename")?;
        let config = config::load_config(config_path)
            .map_err(|e| format!("Failed to load LLM config from {config_path}: {e:?}"))?;
        info!(config_path, "Loaded LLM configuration");

        Ok(Self { config, template })
    }
}

impl Summarizer for LlmSummarizer {
    #[instrument(level = "info", skip_all, fields(id = %digest.id))]
    async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let prompt = build_prompt(digest);
        let res = ask(&self.config, prompt, &self.template, None, None).await;
        let dt = t0.elapsed();

        let raw = match res {
            Ok(raw) => raw,
            Err(e) => {
                warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "LLM call failed");
                return Err(GenerationError::Service(e.to_string()));
            }
        };
        info!(elapsed_ms = dt.as_millis() as u128, bytes = raw.len(), "LLM call succeeded");

        extract_html_document(&raw).ok_or_else(|| {
            warn!(response_preview = %truncate_for_log(&raw, 300), "LLM response has no HTML document");
            GenerationError::MalformedDocument
        })
    }
}

/// Generates digests by POSTing the digest JSON to a summarization endpoint.
///
/// A 2xx answer carries the HTML document as its body. Any other status is a
/// failure whose message is the JSON `error` field, or the body text.
#[derive(Debug, Clone)]
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSummarizer {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

impl Summarizer for HttpSummarizer {
    #[instrument(level = "info", skip_all, fields(id = %digest.id, endpoint = %self.endpoint))]
    async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let body = serde_json::to_string(digest)
            .map_err(|e| GenerationError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GenerationError::Service(format!("Could not reach the summarization service: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Service(format!("Failed to read the summarization response: {e}")))?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(
                elapsed_ms = dt.as_millis() as u128,
                %status,
                body_preview = %truncate_for_log(&text, 300),
                "Summarization service returned an error"
            );
            return Err(GenerationError::Service(error_message(status, &text)));
        }
        debug!(elapsed_ms = dt.as_millis() as u128, bytes = text.len(), "Summarization service answered");

        extract_html_document(&text).ok_or(GenerationError::MalformedDocument)
    }
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("Summarization service responded with {status}"),
    }
}

/// The summarizer selected in the settings.
#[derive(Debug)]
pub enum SummarizerBackend {
    Llm(LlmSummarizer),
    Http(HttpSummarizer),
}

impl Summarizer for SummarizerBackend {
    async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
        match self {
            SummarizerBackend::Llm(llm) => llm.summarize(digest).await,
            SummarizerBackend::Http(http) => http.summarize(digest).await,
        }
    }
}

/// No summarizer configured: every call fails.
impl<T: Summarizer> Summarizer for Option<T> {
    async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
        match self {
            Some(inner) => inner.summarize(digest).await,
            None => Err(GenerationError::Service(
                "No summarization service is configured.".to_string(),
            )),
        }
    }
}
