use super::AppState;
use crate::clients::gemini::extraction_prompt;
use crate::clients::sheets::DEFAULT_RANGE;
use crate::dataset::{self, Dataset};
use crate::error::AppError;
use crate::pages::{self, IndexView, QueryView};
use crate::session::SessionContext;
use crate::types::ErrorInfo;
use crate::usage::{UsageService, UsageSnapshot};
use axum::extract::{Form, Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use log::{debug, info, warn};
use serde::Deserialize;
use std::future::Future;

pub const NO_RESULTS_MESSAGE: &str = "No extracted information available.";

pub async fn index(ctx: SessionContext) -> Response {
    ctx.respond(Html(pages::index(&IndexView::default())))
}

fn dataset_loaded(mut ctx: SessionContext, ds: Dataset) -> Response {
    info!("dataset loaded: {} columns, {} rows", ds.columns.len(), ds.rows.len());
    let preview = ds.to_html();
    let page = pages::index(&IndexView {
        preview_html: Some(&preview),
        columns: &ds.columns,
        error: None,
    });
    ctx.data.columns = ds.columns;
    ctx.data.preview_html = Some(preview);
    ctx.respond(Html(page))
}

fn dataset_failed(ctx: SessionContext, err: AppError) -> Response {
    warn!("dataset rejected: {}", err);
    let page = pages::index(&IndexView {
        error: Some(&err.to_string()),
        ..Default::default()
    });
    ctx.respond((err.status(), Html(page)))
}

pub async fn upload(ctx: SessionContext, mut multipart: Multipart) -> Result<Response, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;
        // Browsers send an empty, unnamed part when no file was chosen.
        if bytes.is_empty() && filename.as_deref().unwrap_or("").is_empty() {
            continue;
        }
        debug!("upload {:?}: {} bytes", filename, bytes.len());
        upload = Some(bytes);
        break;
    }
    let Some(bytes) = upload else {
        return Ok(ctx.respond(Html(pages::index(&IndexView::default()))));
    };
    Ok(match Dataset::from_csv(&bytes) {
        Ok(ds) => dataset_loaded(ctx, ds),
        Err(e) => dataset_failed(ctx, AppError::Dataset(e)),
    })
}

#[derive(Debug, Deserialize)]
pub struct SheetForm {
    #[serde(default)]
    spreadsheet_id: String,
    #[serde(default)]
    range: String,
}

pub async fn load_sheet(
    State(state): State<AppState>,
    ctx: SessionContext,
    Form(form): Form<SheetForm>,
) -> Result<Response, AppError> {
    let id = form.spreadsheet_id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("Spreadsheet ID is required.".into()));
    }
    let range = match form.range.trim() {
        "" => DEFAULT_RANGE,
        r => r,
    };
    let values = state
        .sheets
        .values(id, range)
        .await
        .map_err(AppError::remote("Google Sheets"))?;
    Ok(match Dataset::from_rows(values) {
        Ok(ds) => dataset_loaded(ctx, ds),
        Err(e) => dataset_failed(ctx, AppError::Dataset(e)),
    })
}

/// Run one metered call: check the daily budget, call, then record it.
/// Storage failures deny the call.
async fn metered<T>(
    usage: &UsageService,
    service: &'static str,
    call: impl Future<Output = Result<T, ErrorInfo>>,
) -> Result<T, AppError> {
    if !usage.is_allowed().await? {
        warn!("{} call denied: daily limit of {} reached", service, usage.limit());
        return Err(AppError::LimitReached);
    }
    let out = call.await.map_err(AppError::remote(service))?;
    let record = usage.record_usage().await?;
    info!("{} call recorded ({}/{} today)", service, record.count, usage.limit());
    Ok(out)
}

#[derive(Debug, Deserialize)]
pub struct QueryForm {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    entity_column: Option<String>,
}

pub async fn run_query(
    State(state): State<AppState>,
    mut ctx: SessionContext,
    Form(form): Form<QueryForm>,
) -> Result<Response, AppError> {
    let entity_column = form
        .entity_column
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Entity column is required.".into()))?;
    let query = form
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Query is required.".into()))?;
    if !ctx.data.columns.is_empty() && !ctx.data.columns.contains(&entity_column) {
        return Err(AppError::BadRequest(format!(
            "Unknown entity column: {}",
            entity_column
        )));
    }

    let results = metered(&state.usage, "SerpAPI", state.search.search(&query)).await?;
    let prompt = extraction_prompt(&query, &results);
    let extracted = metered(&state.usage, "Gemini", state.gemini.generate(&prompt)).await?;

    let page = pages::query_result(&QueryView {
        query: &query,
        entity_column: &entity_column,
        extracted_info: &extracted,
    });
    ctx.data.query = Some(query);
    ctx.data.search_results = Some(results);
    ctx.data.extracted_info = Some(extracted);
    Ok(ctx.respond(Html(page)))
}

pub async fn show_result(ctx: SessionContext) -> Response {
    let page = pages::result(ctx.data.extracted_info.as_deref().unwrap_or(NO_RESULTS_MESSAGE));
    ctx.respond(Html(page))
}

pub async fn download(ctx: SessionContext) -> Result<Response, AppError> {
    let extracted = ctx
        .data
        .extracted_info
        .as_deref()
        .unwrap_or(NO_RESULTS_MESSAGE);
    let body = dataset::results_csv(extracted)?;
    let disposition = format!("attachment; filename=\"{}\"", dataset::RESULTS_FILENAME);
    Ok(ctx.respond((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    )))
}

pub async fn usage(State(state): State<AppState>) -> Result<Json<UsageSnapshot>, AppError> {
    Ok(Json(state.usage.snapshot().await?))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
