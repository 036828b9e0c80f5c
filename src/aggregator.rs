//! Opinion aggregation: turns a room's free-text entries into exactly five poll options.
//!
//! The provider's answer is untrusted text. It is parsed into a strict schema and
//! validated here, before anything reaches the database.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::llm::{GenerateRequest, LlmConfig, LlmError, LlmProvider};
use crate::types::{GeneratedOption, POLL_OPTION_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("No opinions to summarize")]
    EmptyInput,

    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error("Malformed AI response: {0}")]
    Malformed(String),
}

/// Knobs for a single summarization call
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_tokens: 2048,
        }
    }
}

impl From<&LlmConfig> for SummarizeOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            timeout: config.default_timeout,
            max_tokens: config.default_max_tokens,
        }
    }
}

const SYSTEM_PROMPT: &str = "You turn a group's free-text opinions into concrete options \
they can vote on. You always answer with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct RawPoll {
    options: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    option_text: String,
    explanation: String,
    related_opinions: Vec<usize>,
}

/// Build the user prompt: topic, numbered opinions, output contract
pub fn build_prompt(entries: &[String], topic: &str) -> String {
    let numbered: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {}", i + 1, entry))
        .collect();

    format!(
        r#"Topic: {topic}

Opinions submitted by participants:

{opinions}

---

Write exactly {count} options that together cover these opinions.
- Each option must be concrete and actionable.
- Merge similar opinions into a single option and reflect as many different opinions as you can.
- For each option explain which opinions it reflects and why it matters, so voters can follow the reasoning.
- Write in the same language as the opinions.

Answer with JSON only, in this shape:
{{"options": [{{"option_text": "...", "explanation": "...", "related_opinions": [0, 2]}}]}}

"related_opinions" lists zero-based indices into the opinion list above (opinion 1 is index 0)."#,
        topic = topic,
        opinions = numbered.join("\n"),
        count = POLL_OPTION_COUNT,
    )
}

/// Remove a surrounding Markdown code fence, if the model added one
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json"), which may run straight into the body
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse and validate a provider response against the poll schema
pub fn parse_options(
    text: &str,
    entry_count: usize,
) -> Result<[GeneratedOption; POLL_OPTION_COUNT], AggregateError> {
    let raw: RawPoll = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AggregateError::Malformed(format!("invalid JSON: {}", e)))?;

    if raw.options.len() != POLL_OPTION_COUNT {
        return Err(AggregateError::Malformed(format!(
            "expected {} options, got {}",
            POLL_OPTION_COUNT,
            raw.options.len()
        )));
    }

    let mut options = Vec::with_capacity(POLL_OPTION_COUNT);
    for (pos, raw_option) in raw.options.into_iter().enumerate() {
        let option_text = raw_option.option_text.trim().to_string();
        if option_text.is_empty() {
            return Err(AggregateError::Malformed(format!(
                "option {} has empty option_text",
                pos + 1
            )));
        }

        if let Some(bad) = raw_option
            .related_opinions
            .iter()
            .find(|&&idx| idx >= entry_count)
        {
            return Err(AggregateError::Malformed(format!(
                "option {} references opinion {} but only {} exist",
                pos + 1,
                bad,
                entry_count
            )));
        }

        options.push(GeneratedOption {
            option_text,
            explanation: raw_option.explanation.trim().to_string(),
            related_opinions: raw_option.related_opinions.into_iter().collect::<BTreeSet<_>>(),
        });
    }

    options
        .try_into()
        .map_err(|_| AggregateError::Malformed("option count changed during validation".into()))
}

/// Summarize `entries` about `topic` into exactly five validated options.
/// One provider call, no retries.
pub async fn summarize(
    provider: &dyn LlmProvider,
    entries: &[String],
    topic: &str,
    opts: &SummarizeOptions,
) -> Result<[GeneratedOption; POLL_OPTION_COUNT], AggregateError> {
    if entries.is_empty() {
        return Err(AggregateError::EmptyInput);
    }

    let request = GenerateRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        prompt: build_prompt(entries, topic),
        max_tokens: Some(opts.max_tokens),
        timeout: opts.timeout,
        json_output: true,
    };

    let response = provider.generate(request).await?;
    tracing::info!(
        provider = %response.metadata.provider,
        model = %response.metadata.model,
        latency_ms = response.metadata.latency_ms,
        tokens = ?response.metadata.tokens_used,
        "AI summarization returned"
    );

    parse_options(&response.text, entries.len()).inspect_err(|e| {
        tracing::warn!("Rejecting AI response from {}: {}", provider.name(), e);
    })
}
