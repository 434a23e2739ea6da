use std::env;
use std::path::PathBuf;
use url::Url;

/// Runtime configuration for the web front-end and its API clients.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    pub serpapi_key: String,
    pub gemini_key: String,
    pub daily_limit: u32,
    pub usage_file: PathBuf,
    pub bind_addr: String,
    pub search_api_url: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub sheets_api_url: String,
    pub oauth_token_url: String,
    pub google_token_file: PathBuf,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("serpapi_key", &"[REDACTED]")
            .field("gemini_key", &"[REDACTED]")
            .field("daily_limit", &self.daily_limit)
            .field("usage_file", &self.usage_file)
            .field("bind_addr", &self.bind_addr)
            .field("search_api_url", &self.search_api_url)
            .field("gemini_api_url", &self.gemini_api_url)
            .field("gemini_model", &self.gemini_model)
            .field("sheets_api_url", &self.sheets_api_url)
            .field("oauth_token_url", &self.oauth_token_url)
            .field("google_token_file", &self.google_token_file)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

pub const DEFAULT_DAILY_LIMIT: u32 = 5;
pub const DEFAULT_USAGE_FILE: &str = "api_usage.json";

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - SERPAPI_API_KEY [required]
    /// - GEMINI_API_KEY [required]
    /// - API_DAILY_LIMIT (default: 5)
    /// - USAGE_FILE (default: api_usage.json)
    /// - BIND_ADDR (default: 127.0.0.1:5000)
    /// - SEARCH_API_URL (default: https://serpapi.com)
    /// - GEMINI_API_URL (default: https://generativelanguage.googleapis.com)
    /// - GEMINI_MODEL (default: gemini-1.5-flash)
    /// - SHEETS_API_URL (default: https://sheets.googleapis.com)
    /// - OAUTH_TOKEN_URL (default: https://oauth2.googleapis.com/token)
    /// - GOOGLE_TOKEN_FILE (default: token.json)
    /// - HTTP_TIMEOUT_SECS (default: 30)
    /// - HTTP_USER_AGENT (default: search-extract/<version>)
    pub fn from_env() -> Result<Self, String> {
        let serpapi_key =
            env::var("SERPAPI_API_KEY").map_err(|_| "Missing SERPAPI_API_KEY".to_string())?;
        let gemini_key =
            env::var("GEMINI_API_KEY").map_err(|_| "Missing GEMINI_API_KEY".to_string())?;

        let mut cfg = Self::with_keys(serpapi_key, gemini_key);
        cfg.daily_limit = daily_limit_from_env()?;
        cfg.usage_file = usage_file_from_env();
        if let Ok(v) = env::var("BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Ok(v) = env::var("SEARCH_API_URL") {
            cfg.search_api_url = base_url("SEARCH_API_URL", &v)?;
        }
        if let Ok(v) = env::var("GEMINI_API_URL") {
            cfg.gemini_api_url = base_url("GEMINI_API_URL", &v)?;
        }
        if let Ok(v) = env::var("GEMINI_MODEL") {
            cfg.gemini_model = v;
        }
        if let Ok(v) = env::var("SHEETS_API_URL") {
            cfg.sheets_api_url = base_url("SHEETS_API_URL", &v)?;
        }
        if let Ok(v) = env::var("OAUTH_TOKEN_URL") {
            Url::parse(&v).map_err(|e| format!("Invalid OAUTH_TOKEN_URL: {}", e))?;
            cfg.oauth_token_url = v;
        }
        if let Ok(v) = env::var("GOOGLE_TOKEN_FILE") {
            cfg.google_token_file = PathBuf::from(v);
        }
        if let Ok(v) = env::var("HTTP_TIMEOUT_SECS") {
            cfg.timeout_secs = timeout_secs(&v)?;
        }
        if let Ok(v) = env::var("HTTP_USER_AGENT") {
            cfg.user_agent = v;
        }
        Ok(cfg)
    }

    /// Defaults for everything except the two API keys.
    pub fn with_keys(serpapi_key: impl Into<String>, gemini_key: impl Into<String>) -> Self {
        Self {
            serpapi_key: serpapi_key.into(),
            gemini_key: gemini_key.into(),
            daily_limit: DEFAULT_DAILY_LIMIT,
            usage_file: PathBuf::from(DEFAULT_USAGE_FILE),
            bind_addr: "127.0.0.1:5000".into(),
            search_api_url: "https://serpapi.com".into(),
            gemini_api_url: "https://generativelanguage.googleapis.com".into(),
            gemini_model: "gemini-1.5-flash".into(),
            sheets_api_url: "https://sheets.googleapis.com".into(),
            oauth_token_url: "https://oauth2.googleapis.com/token".into(),
            google_token_file: PathBuf::from("token.json"),
            user_agent: format!("search-extract/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

/// API_DAILY_LIMIT, readable without the API keys (used by `--print-usage`).
pub fn daily_limit_from_env() -> Result<u32, String> {
    match env::var("API_DAILY_LIMIT") {
        Ok(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid API_DAILY_LIMIT: {}", s)),
        Err(_) => Ok(DEFAULT_DAILY_LIMIT),
    }
}

pub fn usage_file_from_env() -> PathBuf {
    env::var("USAGE_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_USAGE_FILE))
}

fn timeout_secs(raw: &str) -> Result<u64, String> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(format!("Invalid HTTP_TIMEOUT_SECS: {}", raw)),
    }
}

fn base_url(var: &str, raw: &str) -> Result<String, String> {
    let parsed = Url::parse(raw).map_err(|e| format!("Invalid {}: {}", var, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("Invalid {}: unsupported scheme {}", var, parsed.scheme()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
