//! HTTP boundary: JSON API plus thin server-rendered views.

mod organs;
mod pages;
mod patients;

use crate::error::{OrganError, RecordError};
use crate::orchestrator::Console;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub(crate) fn router(console: Console) -> Router {
    let app_dir = console.app_dir.clone();

    let mut app = Router::new()
        .route("/", get(pages::systems))
        .route("/patients", get(pages::patients))
        .route("/discharged", get(pages::discharged))
        .route("/organs", get(pages::organs))
        .route("/status", get(pages::status))
        .route(
            "/api/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route("/api/patients/:id", get(patients::get_patient))
        .route("/api/patients/:id/status", post(patients::transition_patient))
        .route("/api/organs", get(organs::list_organs))
        .route("/api/organs/:name", get(organs::organ_status))
        .route("/api/organs/:name/restart", post(organs::restart_organ))
        .route("/api/systems", get(organs::systems))
        .route("/api/performance", get(organs::performance))
        .route("/api/ledger", get(organs::ledger))
        .with_state(console);

    // The dashboard bundle is built elsewhere; serve it only when it is actually there.
    if let Some(dir) = app_dir.filter(|d| d.is_dir()) {
        info!(dir = %dir.display(), "serving dashboard at /app");
        app = app.nest_service("/app", ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(TraceLayer::new_for_http())
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            field: None,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            field: None,
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        let (status, field) = match &e {
            RecordError::Validation { field } => (StatusCode::UNPROCESSABLE_ENTITY, Some(*field)),
            RecordError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            RecordError::InvalidTransition { .. } => (StatusCode::CONFLICT, None),
            RecordError::Persistence { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        Self {
            status,
            message: e.to_string(),
            field,
        }
    }
}

impl From<OrganError> for ApiError {
    fn from(e: OrganError) -> Self {
        let status = match &e {
            OrganError::OrganNotFound(_) => StatusCode::NOT_FOUND,
            OrganError::RestartTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OrganError::LaunchFailure { .. } => StatusCode::BAD_GATEWAY,
            OrganError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
            field: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "request failed");
        }
        let mut body = serde_json::json!({ "error": self.message });
        if let Some(field) = self.field {
            body["field"] = field.into();
        }
        (self.status, Json(body)).into_response()
    }
}

/// Run blocking store work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("task join error: {e}")))?
}
