//! HTTP surface: one POST endpoint around [`render_card`].
//!
//! ```text
//! POST /api/render   JSON request → PNG bytes or JSON envelope
//! POST /             same handler
//! GET  /healthz      liveness
//! ```
//!
//! Any other method on the render paths is answered with 405 and the usual
//! `{ ok: false, error }` body.

use crate::card::{render_card, CardOutput};
use crate::config::RenderConfig;
use crate::error::CardError;
use crate::pipeline::package::{Disposition, OutputArtifact, PNG_MIME};
use crate::request::RenderRequest;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error body shared by every failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A failure on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    detail: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, detail: Option<String>) -> Self {
        Self {
            status,
            error,
            detail,
        }
    }
}

impl From<CardError> for ApiError {
    fn from(err: CardError) -> Self {
        match &err {
            CardError::UnknownStyle { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "Unknown style", Some(err.to_string()))
            }
            CardError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, "Invalid request body", Some(err.to_string()))
            }
            _ => {
                error!("Render failed: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to render",
                    Some(err.to_string()),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.error.to_string(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the application router.
pub fn router(config: Arc<RenderConfig>) -> Router {
    Router::new()
        .route("/api/render", post(render).fallback(method_not_allowed))
        .route("/", post(render).fallback(method_not_allowed))
        .route("/healthz", get(healthz))
        .with_state(config)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, config: RenderConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Listening on http://{} (store: {})",
        listener.local_addr()?,
        config.store.name()
    );
    axum::serve(listener, router(Arc::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn render(State(config): State<Arc<RenderConfig>>, body: Bytes) -> Result<Response, ApiError> {
    let req = parse_body(&body)?;
    let output = render_card(&req, &config).await?;

    let response = match output.artifact {
        OutputArtifact::Binary {
            bytes,
            filename,
            disposition,
        } => png_response(bytes, &filename, disposition),
        artifact => {
            let output = CardOutput { artifact, ..output };
            (StatusCode::OK, Json(output.envelope())).into_response()
        }
    };
    Ok(response)
}

fn png_response(bytes: Vec<u8>, filename: &str, disposition: Disposition) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PNG_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition.header_value(filename)),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        bytes,
    )
        .into_response()
}

/// An empty body is an empty request; anything else must be a JSON object.
fn parse_body(body: &[u8]) -> Result<RenderRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RenderRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "Invalid request body",
            Some(e.to_string()),
        )
    })
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", None)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(RenderConfig::default()))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn get_is_method_not_allowed() {
        for uri in ["/api/render", "/"] {
            let response = app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            let body = json_body(response).await;
            assert_eq!(body["ok"], false);
            assert_eq!(body["error"], "Method not allowed");
        }
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let response = app()
            .oneshot(
                Request::post("/api/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid request body");
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn unknown_style_is_bad_request() {
        let response = app()
            .oneshot(
                Request::post("/api/render")
                    .body(Body::from(r#"{"style":"poster"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Unknown style");
        assert!(body["detail"].as_str().unwrap().contains("poster"));
    }

    #[tokio::test]
    async fn png_response_carries_bytes_and_headers() {
        let png = vec![0x89, b'P', b'N', b'G'];
        let response = png_response(png.clone(), "card.png", Disposition::Attachment);

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"card.png\""
        );
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), png.as_slice());
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let response = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn engine_errors_map_to_500() {
        let err = ApiError::from(CardError::EngineLaunch("no chrome".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error, "Failed to render");
    }

    #[test]
    fn blank_body_is_default_request() {
        assert_eq!(parse_body(b"  \n").unwrap(), RenderRequest::default());
    }
}
