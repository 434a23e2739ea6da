use crate::config::Config;
use crate::http;
use crate::types::ErrorInfo;
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;

/// Google web search through SerpAPI's JSON endpoint.
#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SearchClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.search_api_url.clone(),
            api_key: cfg.serpapi_key.clone(),
        }
    }

    /// Run `query` and return the raw result document.
    pub async fn search(&self, query: &str) -> Result<Value, ErrorInfo> {
        let url = format!("{}/search.json", self.base_url);
        info!("search: q={:?}", query);
        let req = self.client.get(&url).query(&[
            ("engine", "google"),
            ("q", query),
            ("api_key", self.api_key.as_str()),
        ]);
        let results: Value = http::send_json(req).await?;
        // SerpAPI reports some failures (bad key, exhausted plan) with 200.
        if let Some(err) = results.get("error") {
            let message = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(ErrorInfo::new("upstream_error", message));
        }
        if !results.is_object() {
            return Err(ErrorInfo::new(
                "server_error",
                "search response was not a JSON object",
            ));
        }
        debug!(
            "search returned {} organic results",
            results
                .get("organic_results")
                .and_then(|r| r.as_array())
                .map(|a| a.len())
                .unwrap_or(0)
        );
        Ok(results)
    }
}
