use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::NaiveDate;
use httpmock::Method::{GET, POST};
use httpmock::{Mock, MockServer};
use search_extract::config::Config;
use search_extract::usage::{
    FileUsageStore, FixedClock, MemoryUsageStore, StorageError, UsageGuard, UsageRecord, UsageService,
    UsageStore,
};
use search_extract::web::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "X-TEST-BOUNDARY";
const GEMINI_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 12).unwrap()
}

fn state_with(server: &MockServer, store: impl UsageStore + 'static, limit: u32) -> AppState {
    let mut cfg = Config::with_keys("serp-key", "gem-key");
    cfg.search_api_url = server.base_url();
    cfg.gemini_api_url = server.base_url();
    cfg.sheets_api_url = server.base_url();
    cfg.oauth_token_url = format!("{}/token", server.base_url());
    cfg.daily_limit = limit;
    let guard = UsageGuard::with_clock(store, limit, Arc::new(FixedClock(today())));
    let usage = UsageService::spawn(guard).unwrap();
    AppState::new(cfg, usage).unwrap()
}

async fn send(state: &AppState, req: Request<Body>) -> Response {
    router(state.clone()).oneshot(req).await.unwrap()
}

async fn body_text(res: Response) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn session_cookie(res: &Response) -> String {
    let raw = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

fn upload_request(csv: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"companies.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = BOUNDARY,
        csv = csv
    );
    Request::builder()
        .method("POST")
        .uri("/")
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

fn form_request(uri: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        builder = builder.header(COOKIE, c);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

async fn mock_search(server: &MockServer) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search.json");
            then.status(200).json_body(serde_json::json!({
                "organic_results": [{"title": "Acme Inc", "snippet": "contact: hello@acme.test"}]
            }));
        })
        .await
}

async fn mock_gemini(server: &MockServer) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path(GEMINI_PATH).body_contains("hello@acme.test");
            then.status(200).json_body(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "Acme: hello@acme.test"}]}}]
            }));
        })
        .await
}

#[tokio::test]
async fn index_renders_upload_form() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, get_request("/", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(SET_COOKIE).is_none());
    let html = body_text(res).await;
    assert!(html.contains("multipart/form-data"));
}

#[tokio::test]
async fn cookieless_visits_do_not_create_sessions() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    for uri in ["/", "/result", "/download"] {
        for _ in 0..20 {
            let res = send(&state, get_request(uri, None)).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get(SET_COOKIE).is_none());
        }
    }
    assert!(state.sessions.is_empty());

    let res = send(&state, upload_request("company\nAcme\n")).await;
    assert!(res.headers().get(SET_COOKIE).is_some());
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn upload_shows_preview_and_columns() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, upload_request("company,city\nAcme,Paris\nGlobex,Springfield\n")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_text(res).await;
    assert!(html.contains("<table class=\"dataframe\">"));
    assert!(html.contains("<td>Globex</td>"));
    assert!(html.contains("<option value=\"company\">company</option>"));
}

#[tokio::test]
async fn unreadable_upload_reports_error_on_index() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, upload_request("")).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(res).await;
    assert!(html.contains("Error reading file: the file is empty"));
}

#[tokio::test]
async fn full_flow_records_two_metered_calls() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let gemini = mock_gemini(&server).await;
    let store = MemoryUsageStore::new();
    let state = state_with(&server, store.clone(), 5);

    let res = send(&state, upload_request("company\nAcme\n")).await;
    let cookie = session_cookie(&res);

    let res = send(
        &state,
        form_request(
            "/query",
            &[("query", "email of Acme"), ("entity_column", "company")],
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_text(res).await;
    assert!(html.contains("Acme: hello@acme.test"));
    assert!(html.contains("email of Acme"));
    search.assert_async().await;
    gemini.assert_async().await;
    assert_eq!(store.get(), Some(UsageRecord { date: today(), count: 2 }));

    let res = send(&state, form_request("/result", &[], Some(&cookie))).await;
    assert!(body_text(res).await.contains("Acme: hello@acme.test"));

    let res = send(&state, get_request("/download", Some(&cookie))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"results.csv\""
    );
    assert_eq!(
        body_text(res).await,
        "Extracted Information\r\nAcme: hello@acme.test\r\n"
    );

    let res = send(&state, get_request("/usage", None)).await;
    let usage: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
    assert_eq!(
        usage,
        serde_json::json!({"date": "2024-09-12", "count": 2, "limit": 5, "remaining": 3})
    );
}

#[tokio::test]
async fn exhausted_budget_blocks_before_search() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let store = MemoryUsageStore::with_record(UsageRecord { date: today(), count: 5 });
    let state = state_with(&server, store.clone(), 5);

    let res = send(
        &state,
        form_request("/query", &[("query", "q"), ("entity_column", "company")], None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(body_text(res).await.contains("API call limit reached for today."));
    assert_eq!(search.hits_async().await, 0);
    assert_eq!(store.get(), Some(UsageRecord { date: today(), count: 5 }));
}

#[tokio::test]
async fn yesterdays_count_does_not_block_today() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let gemini = mock_gemini(&server).await;
    let yesterday = today().pred_opt().unwrap();
    let store = MemoryUsageStore::with_record(UsageRecord { date: yesterday, count: 5 });
    let state = state_with(&server, store.clone(), 5);

    let res = send(
        &state,
        form_request("/query", &[("query", "q"), ("entity_column", "company")], None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    search.assert_async().await;
    gemini.assert_async().await;
    assert_eq!(store.get(), Some(UsageRecord { date: today(), count: 2 }));
}

#[tokio::test]
async fn budget_can_run_out_between_search_and_generation() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let gemini = mock_gemini(&server).await;
    let store = MemoryUsageStore::with_record(UsageRecord { date: today(), count: 4 });
    let state = state_with(&server, store.clone(), 5);

    let res = send(
        &state,
        form_request("/query", &[("query", "q"), ("entity_column", "company")], None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(search.hits_async().await, 1);
    assert_eq!(gemini.hits_async().await, 0);
    assert_eq!(store.get(), Some(UsageRecord { date: today(), count: 5 }));
}

#[tokio::test]
async fn corrupt_usage_file_fails_closed() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api_usage.json");
    std::fs::write(&path, "{\"date\": \"yesterday\"").unwrap();
    let state = state_with(&server, FileUsageStore::new(&path), 5);

    let res = send(
        &state,
        form_request("/query", &[("query", "q"), ("entity_column", "company")], None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_text(res).await.contains("Usage tracking is unavailable"));
    assert_eq!(search.hits_async().await, 0);
}

/// Reads succeed; every write fails.
#[derive(Clone)]
struct ReadOnlyStore(UsageRecord);

impl UsageStore for ReadOnlyStore {
    fn load(&self) -> Result<Option<UsageRecord>, StorageError> {
        Ok(Some(self.0))
    }

    fn save(&self, _record: &UsageRecord) -> Result<(), StorageError> {
        Err(StorageError::Io {
            path: PathBuf::from("api_usage.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test]
async fn unrecordable_call_discards_its_result() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let gemini = mock_gemini(&server).await;
    let state = state_with(&server, ReadOnlyStore(UsageRecord { date: today(), count: 1 }), 5);

    let res = send(&state, upload_request("company\nAcme\n")).await;
    let cookie = session_cookie(&res);
    let res = send(
        &state,
        form_request(
            "/query",
            &[("query", "email of Acme"), ("entity_column", "company")],
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_text(res).await.contains("Usage tracking is unavailable"));
    assert_eq!(search.hits_async().await, 1);
    assert_eq!(gemini.hits_async().await, 0);

    let res = send(&state, get_request("/result", Some(&cookie))).await;
    assert!(body_text(res).await.contains("No extracted information available."));
}

#[tokio::test]
async fn failed_search_is_not_counted() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search.json");
            then.status(200).json_body(serde_json::json!({"error": "Invalid API key."}));
        })
        .await;
    let store = MemoryUsageStore::new();
    let state = state_with(&server, store.clone(), 5);

    let res = send(
        &state,
        form_request("/query", &[("query", "q"), ("entity_column", "company")], None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(body_text(res).await.contains("Error using SerpAPI API"));
    assert_eq!(store.get(), None);
}

#[tokio::test]
async fn query_requires_entity_column() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, form_request("/query", &[("query", "q")], None)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(res).await.contains("Entity column is required."));
}

#[tokio::test]
async fn query_requires_query_text() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(
        &state,
        form_request("/query", &[("query", "  "), ("entity_column", "company")], None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(res).await.contains("Query is required."));
    assert_eq!(search.hits_async().await, 0);
}

#[tokio::test]
async fn query_rejects_column_not_in_upload() {
    let server = MockServer::start_async().await;
    let search = mock_search(&server).await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, upload_request("company\nAcme\n")).await;
    let cookie = session_cookie(&res);
    let res = send(
        &state,
        form_request("/query", &[("query", "q"), ("entity_column", "city")], Some(&cookie)),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(search.hits_async().await, 0);
}

#[tokio::test]
async fn result_without_session_uses_placeholder() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, get_request("/result", None)).await;
    assert!(body_text(res).await.contains("No extracted information available."));
}

#[tokio::test]
async fn sheet_import_previews_values() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    std::fs::write(
        &token_path,
        r#"{"token":"t","refresh_token":"r","client_id":"c","client_secret":"s"}"#,
    )
    .unwrap();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sheet-9/values/Sheet1");
            then.status(200)
                .json_body(serde_json::json!({"values": [["company", "site"], ["Initech", "initech.test"]]}));
        })
        .await;
    let mut state = state_with(&server, MemoryUsageStore::new(), 5);
    let mut cfg = (*state.config).clone();
    cfg.google_token_file = token_path;
    state = AppState::new(cfg, state.usage.clone()).unwrap();

    let res = send(&state, form_request("/sheet", &[("spreadsheet_id", "sheet-9")], None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_text(res).await;
    assert!(html.contains("<td>initech.test</td>"));
    assert!(html.contains("<option value=\"site\">site</option>"));
}

#[tokio::test]
async fn health_is_ok() {
    let server = MockServer::start_async().await;
    let state = state_with(&server, MemoryUsageStore::new(), 5);
    let res = send(&state, get_request("/health", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, r#"{"status":"ok"}"#);
}
