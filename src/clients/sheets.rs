use super::oauth::TokenFile;
use crate::config::Config;
use crate::http;
use crate::types::ErrorInfo;
use log::info;
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_RANGE: &str = "Sheet1";

/// Read-only access to Google Sheets cell values.
#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    base_url: String,
    tokens: TokenFile,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl SheetsClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.sheets_api_url.clone(),
            tokens: TokenFile::new(&cfg.google_token_file, cfg.oauth_token_url.clone()),
        }
    }

    /// Cell values of `range` (A1 notation or a sheet name), row by row.
    pub async fn values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, ErrorInfo> {
        let token = self.tokens.access_token(&self.client).await?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            http::encode_path_segment(spreadsheet_id),
            http::encode_path_segment(range)
        );
        info!("sheets: reading {} from {}", range, spreadsheet_id);
        let vr: ValueRange = http::send_json(self.client.get(&url).bearer_auth(token)).await?;
        Ok(vr
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

// FORMATTED_VALUE rendering returns strings, but numbers and booleans can
// still show up with other render options.
fn cell_text(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
