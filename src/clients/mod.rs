//! Clients for the three remote services: web search, text generation and
//! spreadsheet reads. Search and generation are metered by the usage guard.

pub mod gemini;
pub mod oauth;
pub mod search;
pub mod sheets;

pub use gemini::GeminiClient;
pub use search::SearchClient;
pub use sheets::SheetsClient;
