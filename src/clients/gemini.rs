use crate::config::Config;
use crate::http;
use crate::types::ErrorInfo;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const NO_RESPONSE_TEXT: &str = "No response from Gemini API.";

/// Text generation through the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GeminiClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.gemini_api_url.clone(),
            model: cfg.gemini_model.clone(),
            api_key: cfg.gemini_key.clone(),
        }
    }

    /// Generate text for `prompt`. A response without any candidate text
    /// yields [`NO_RESPONSE_TEXT`].
    pub async fn generate(&self, prompt: &str) -> Result<String, ErrorInfo> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            http::encode_path_segment(&self.model)
        );
        info!("generate: model={} prompt_len={}", self.model, prompt.len());
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };
        let req = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let resp: GenerateResponse = http::send_json(req).await?;
        Ok(resp.text().unwrap_or_else(|| NO_RESPONSE_TEXT.to_string()))
    }
}

/// Prompt handed to the model: the user's query followed by the search results.
pub fn extraction_prompt(query: &str, results: &serde_json::Value) -> String {
    format!("{} : {}", query, results)
}
