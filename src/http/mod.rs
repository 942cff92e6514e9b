//! HTTP front door.
//!
//! | route | method | purpose |
//! |---|---|---|
//! | `/calculation/` | POST | JSON submission, answers `{"result-callback": url}` |
//! | `/formhandler/` | POST | form-encoded submission from the bundled page |
//! | `/jobstatus/*path` | GET | raw status record behind a callback URL |
//! | `/interface/` | GET | RAML description of the service |
//! | `/` | GET | submission form |
//!
//! Every request-time failure is answered with `400` and a plain-text message,
//! including bodies the extractors refuse.

mod form;

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, FormRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::CalcError;
use crate::service::CalcService;

pub use form::form_to_request;

const INDEX_HTML: &str = include_str!("index.html");
const INTERFACE_RAML: &str = include_str!("interface.raml");

/// Placeholder in the form page replaced by the discovered store location.
const STORE_PLACEHOLDER: &str = "DEFAULT";

#[derive(Clone)]
pub struct AppState {
    pub service: CalcService,
}

#[derive(Serialize)]
struct SubmitResponse {
    #[serde(rename = "result-callback")]
    result_callback: String,
}

impl IntoResponse for CalcError {
    fn into_response(self) -> Response {
        let msg = self.to_string();
        tracing::warn!(error = %msg, "Request failed");
        (StatusCode::BAD_REQUEST, msg).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/calculation", post(calculation_handler))
        .route("/calculation/", post(calculation_handler))
        .route("/formhandler", post(form_handler))
        .route("/formhandler/", post(form_handler))
        .route("/jobstatus/*callback", get(status_handler))
        .route("/interface", get(interface_handler))
        .route("/interface/", get(interface_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled. Jobs already launched keep running.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind HTTP server");
        e
    })?;
    tracing::info!(addr = %addr, "Serving label calculation requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let store = state
        .service
        .default_store_location()
        .await
        .map(|loc| {
            loc.trim_start_matches("http://")
                .trim_start_matches("https://")
                .to_string()
        })
        .unwrap_or_default();
    Html(INDEX_HTML.replacen(STORE_PLACEHOLDER, &store, 1))
}

async fn interface_handler() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/raml+yaml"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        INTERFACE_RAML,
    )
}

async fn calculation_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SubmitResponse>, CalcError> {
    let body = body.map_err(|e| CalcError::Validation(e.body_text()))?;
    let doc: Value = serde_json::from_slice(&body)
        .map_err(|e| CalcError::Validation(format!("body is not valid JSON: {}", e)))?;
    submit(&state, doc).await
}

async fn form_handler(
    State(state): State<AppState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Json<SubmitResponse>, CalcError> {
    let Form(fields) = form.map_err(|e| CalcError::Validation(e.body_text()))?;
    let doc = form_to_request(&fields)?;
    submit(&state, doc).await
}

async fn submit(state: &AppState, doc: Value) -> Result<Json<SubmitResponse>, CalcError> {
    let result_callback = state.service.submit(&doc).await?;
    Ok(Json(SubmitResponse { result_callback }))
}

async fn status_handler(
    State(state): State<AppState>,
    Path(callback): Path<String>,
) -> Result<impl IntoResponse, CalcError> {
    let record = state.service.status(&callback).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], record))
}
