//! HTTP answer endpoint.
//!
//! `POST /` with `{"question": "..."}` answers `{"answer": "..."}`. Browsers
//! call it cross-origin, so every response allows any origin and `OPTIONS /`
//! answers the preflight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use faqbot_matcher::{MatchEngine, MatchError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::reply_text;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<MatchEngine>,
    verbose: bool,
    request_timeout: Duration,
}

impl AppState {
    /// Create handler state around a ready engine.
    pub fn new(engine: Arc<MatchEngine>) -> Self {
        Self {
            engine,
            verbose: false,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Include the matched question and score in responses.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Body of `POST /`.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

/// Successful answer.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AskResponse {
    pub answer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_question: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(ask).options(preflight))
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting server on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolve once `signal` fires. A signal source that cannot be installed
/// never resolves, so the server keeps running.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(err) => {
            warn!("Cannot listen for shutdown signal, serving until killed: {err}");
            std::future::pending::<()>().await;
        }
    }
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected request body: {rejection}");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let outcome = tokio::time::timeout(
        state.request_timeout,
        state.engine.answer(&request.question),
    )
    .await;

    match outcome {
        Ok(Ok(result)) => {
            let body = AskResponse {
                answer: reply_text(&result).to_string(),
                matched_question: state.verbose.then(|| result.matched_question.clone()),
                similarity: state.verbose.then_some(result.similarity),
            };
            with_cors((StatusCode::OK, Json(body)).into_response())
        }
        Ok(Err(err)) => {
            let status = status_for(&err);
            if status.is_server_error() {
                error!("Failed to answer question: {err}");
            } else {
                debug!("Rejected question: {err}");
            }
            error_response(status, err.to_string())
        }
        Err(_) => {
            warn!(
                "Question timed out after {}ms",
                state.request_timeout.as_millis()
            );
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "timed out while answering the question".to_string(),
            )
        }
    }
}

async fn preflight() -> Response {
    let mut response = with_cors(StatusCode::OK.into_response());
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn status_for(err: &MatchError) -> StatusCode {
    match err {
        err if err.is_client_error() => StatusCode::BAD_REQUEST,
        MatchError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    with_cors((status, Json(ErrorResponse { error })).into_response())
}

fn with_cors(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
