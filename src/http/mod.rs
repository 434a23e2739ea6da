use crate::config::Config;
use crate::types::ErrorInfo;
use log::warn;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        default_headers.insert(USER_AGENT, ua);
    }
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    // Credentials are attached per request: query keys for search/generative,
    // bearer tokens for the spreadsheet API.
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
}

pub fn map_status_to_error(status: StatusCode, message: String) -> ErrorInfo {
    let code = match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::TOO_MANY_REQUESTS => "rate_limited",
        s if s.is_server_error() => "upstream_error",
        _ => "server_error",
    };
    ErrorInfo::new(code, message)
}

/// Send a request once and decode a JSON body. Failures are not retried.
pub async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ErrorInfo> {
    let res = req.send().await.map_err(|e| {
        warn!("HTTP error sending request: {}", redact(&e));
        ErrorInfo::new("upstream_error", redact(&e))
    })?;
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(map_status_to_error(status, error_message(&text, status)));
    }
    serde_json::from_str(&text).map_err(|e| ErrorInfo::new("server_error", e.to_string()))
}

// Google and SerpAPI error bodies carry the human-readable part at
// `error.message` or `error`.
fn error_message(body: &str, status: StatusCode) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        let err = v.get("error")?;
        err.get("message")
            .and_then(|m| m.as_str())
            .or_else(|| err.as_str())
            .map(str::to_string)
    });
    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => format!("HTTP {}", status.as_u16()),
        None => body.trim().to_string(),
    }
}

// reqwest errors embed the full URL, and the search/generative keys travel
// in the query string.
fn redact(e: &reqwest::Error) -> String {
    let msg = e.to_string();
    match e.url().and_then(|u| u.query()) {
        Some(q) if !q.is_empty() => msg.replace(q, "[REDACTED]"),
        _ => msg,
    }
}

pub fn encode_path_segment(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}
