use crate::dataset::DatasetError;
use crate::pages;
use crate::types::ErrorInfo;
use crate::usage::StorageError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use log::warn;

pub const LIMIT_REACHED_MESSAGE: &str = "API call limit reached for today.";

/// Failures surfaced to the browser. None of them stop the server.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", LIMIT_REACHED_MESSAGE)]
    LimitReached,

    #[error("Usage tracking is unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("Error using {service} API: {source}")]
    RemoteApi {
        service: &'static str,
        #[source]
        source: ErrorInfo,
    },

    #[error("Error reading file: {0}")]
    Dataset(#[from] DatasetError),

    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn remote(service: &'static str) -> impl FnOnce(ErrorInfo) -> Self {
        move |source| AppError::RemoteApi { service, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::LimitReached => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RemoteApi { .. } => StatusCode::BAD_GATEWAY,
            AppError::Dataset(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("request failed ({}): {}", status.as_u16(), self);
        (status, Html(pages::error(&self.to_string()))).into_response()
    }
}
