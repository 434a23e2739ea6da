//! Google authorized-user credentials (`token.json`).
//!
//! The file is produced by Google's installed-app consent flow and holds an
//! access token plus a refresh token. Access tokens are refreshed with the
//! `refresh_token` grant when they are missing or within
//! [`REFRESH_WINDOW_SECS`] of expiry, and the file is replaced atomically.

use crate::types::ErrorInfo;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

/// Refresh when less than five minutes remain on the access token.
const REFRESH_WINDOW_SECS: i64 = 300;

/// On-disk authorized-user credentials. Unknown fields are preserved.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl AuthorizedUser {
    /// A usable access token at `now`, if any.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        match self.expiry {
            Some(exp) if (exp - now).num_seconds() < REFRESH_WINDOW_SECS => None,
            _ => Some(token),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn auth_error(message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::new("unauthorized", message)
}

/// File-backed credential source for the spreadsheet client.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
    token_url: String,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>, token_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token_url: token_url.into(),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn load(&self) -> Result<AuthorizedUser, ErrorInfo> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            auth_error(format!(
                "no Google credentials at {} ({}); complete the consent flow and place token.json there",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| auth_error(format!("corrupt token file: {}", e)))
    }

    /// Writes a sibling temp file and renames it over `token.json`, holding
    /// an exclusive lock on `token.json.lock` so concurrent refreshes do not
    /// interleave. A failed write leaves the previous file intact.
    pub fn save(&self, creds: &AuthorizedUser) -> Result<(), ErrorInfo> {
        let json = serde_json::to_string_pretty(creds)
            .map_err(|e| auth_error(format!("encoding token file: {}", e)))?;
        let write_err = |e: std::io::Error| auth_error(format!("writing token file: {}", e));
        let lock = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.sibling(".lock"))
            .map_err(write_err)?;
        lock.lock_exclusive()
            .map_err(|e| auth_error(format!("token file lock failed: {}", e)))?;
        let tmp = self.sibling(".tmp");
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let result = opts
            .open(&tmp)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| std::fs::rename(&tmp, &self.path));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        let _ = FileExt::unlock(&lock);
        result.map_err(write_err)
    }

    /// A valid access token, refreshing and persisting it when needed.
    pub async fn access_token(&self, client: &Client) -> Result<String, ErrorInfo> {
        let mut creds = self.load()?;
        if let Some(token) = creds.valid_token(Utc::now()) {
            return Ok(token.to_string());
        }
        let refresh_token = creds.refresh_token.clone().ok_or_else(|| {
            auth_error("access token expired and no refresh token is available; re-run the consent flow")
        })?;
        info!("refreshing Google access token");
        let resp = self.refresh(client, &creds, &refresh_token).await?;
        creds.token = Some(resp.access_token.clone());
        creds.expiry = resp
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        if let Some(rotated) = resp.refresh_token {
            creds.refresh_token = Some(rotated);
        }
        self.save(&creds)?;
        debug!("token file {} updated", self.path.display());
        Ok(resp.access_token)
    }

    async fn refresh(
        &self,
        client: &Client,
        creds: &AuthorizedUser,
        refresh_token: &str,
    ) -> Result<TokenResponse, ErrorInfo> {
        let resp = client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| auth_error(format!("token refresh request failed: {}", e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| auth_error(format!("reading refresh response: {}", e)))?;
        if !status.is_success() {
            return Err(auth_error(format!(
                "token refresh returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| auth_error(format!("parsing refresh response: {}", e)))
    }
}
