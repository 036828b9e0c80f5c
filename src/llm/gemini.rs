use super::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider (REST `generateContent`)
pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> LlmResult<Self> {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL.to_string())
    }

    /// Point the provider at a different endpoint (proxies, test servers)
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> LlmResult<Self> {
        // Deadlines come from each request's `timeout`
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}

fn text_content(text: String) -> GeminiContent {
    GeminiContent {
        parts: vec![GeminiPart { text }],
    }
}

impl GeminiResponse {
    /// Concatenate the text parts of the first candidate
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let start = Instant::now();

        let body = GeminiRequest {
            contents: vec![text_content(request.prompt)],
            system_instruction: request.system.map(text_content),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                response_mime_type: request.json_output.then_some("application/json"),
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let exchange = async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| LlmError::ApiError(e.to_string()))?;

            if !response.status().is_success() {
                return Err(LlmError::ApiError(format!(
                    "Gemini API returned status: {}",
                    response.status()
                )));
            }

            response
                .json::<GeminiResponse>()
                .await
                .map_err(|e| LlmError::ParseError(e.to_string()))
        };

        // Covers both the send and the body read
        let gemini_response = tokio::time::timeout(request.timeout, exchange)
            .await
            .map_err(|_| LlmError::Timeout(request.timeout))??;

        let tokens_used = gemini_response
            .usage_metadata
            .as_ref()
            .and_then(|u| u.total_token_count);
        let text = gemini_response
            .into_text()
            .ok_or_else(|| LlmError::ParseError("No content in response".to_string()))?;

        Ok(GenerateResponse {
            text: text.trim().to_string(),
            metadata: ResponseMetadata {
                provider: "gemini".to_string(),
                model: self.model.clone(),
                tokens_used,
                latency_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
