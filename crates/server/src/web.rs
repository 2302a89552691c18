//! Read-only HTTP query surface over the device registry.
//!
//! Three routes: `/health`, `/readings/{imei}` and `/status/{imei}`.
//! Handlers only read registry snapshots; they never block a session beyond
//! a lock handoff and never leak internal error values.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::DeviceRegistry;

/// Builds the query router. Non-GET methods on a matched route answer 405;
/// unmatched paths answer 404.
pub fn router(registry: Arc<DeviceRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readings/:imei", get(readings))
        .route("/status/:imei", get(status))
        .with_state(registry)
}

/// Binds the query listener on `port` (0 picks an ephemeral port).
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind query listener on {addr}"))?;
    info!("query surface listening on http://{}", listener.local_addr()?);
    Ok(listener)
}

/// Serves the query surface until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<DeviceRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("query surface failed")
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn readings(
    State(registry): State<Arc<DeviceRegistry>>,
    Path(raw): Path<String>,
) -> Response {
    let imei = match parse_imei(&raw) {
        Ok(imei) => imei,
        Err(code) => return code.into_response(),
    };
    match registry.lookup(imei).await {
        Some(handle) => {
            let reading = handle.last_reading().await;
            (StatusCode::OK, reading.to_string()).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn status(State(registry): State<Arc<DeviceRegistry>>, Path(raw): Path<String>) -> Response {
    let imei = match parse_imei(&raw) {
        Ok(imei) => imei,
        Err(code) => return code.into_response(),
    };
    if registry.exists(imei).await {
        StatusCode::OK.into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

/// Path-parameter discipline: a non-digit anywhere is a bad request, a
/// digit string of the wrong length is a path mismatch.
fn parse_imei(raw: &str) -> Result<u64, StatusCode> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if raw.len() != 15 {
        return Err(StatusCode::NOT_FOUND);
    }
    raw.parse::<u64>().map_err(|_| StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_imei_accepts_15_digits() {
        assert_eq!(parse_imei("490154203237518"), Ok(490154203237518));
        assert_eq!(parse_imei("000000000000000"), Ok(0));
    }

    #[test]
    fn test_parse_imei_rejects_non_digits() {
        assert_eq!(parse_imei("49015420323751x"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_imei("not-an-imei"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_imei(""), Err(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_parse_imei_rejects_wrong_length() {
        assert_eq!(parse_imei("1234"), Err(StatusCode::NOT_FOUND));
        assert_eq!(parse_imei("4901542032375189"), Err(StatusCode::NOT_FOUND));
    }
}
