//! HTTP transport for the dispatcher.
//!
//! Accepts SOAP over HTTP POST and hands the body and the SOAP headers to the
//! [`EndpointDispatcher`]. Faults go out as HTTP 500, as the SOAP HTTP
//! bindings require.
//!
//! The body is read here against `settings.max_body_size` rather than
//! through axum's default extractor limit, so an oversized request still
//! gets a `BODY_TOO_LARGE` SOAP fault.

use crate::dispatcher::{EndpointDispatcher, InboundMessage};
use crate::error::{Fault, FaultCode};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info};

/// HTTP server hosting one dispatcher.
pub struct SoapServer {
    router: Router,
}

impl SoapServer {
    pub fn new(dispatcher: Arc<EndpointDispatcher>) -> Self {
        Self {
            router: build_router(dispatcher),
        }
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "SOAP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("SOAP server stopped");
        Ok(())
    }
}

/// Build the router: the endpoint path plus tracing and timeout layers.
#[allow(deprecated)]
pub fn build_router(dispatcher: Arc<EndpointDispatcher>) -> Router {
    let config = dispatcher.config();
    let path = config.server.path.clone();
    let timeout = Duration::from_secs(config.server.request_timeout_secs);

    Router::new()
        .route(&path, post(soap_handler))
        .with_state(dispatcher)
        .layer(DefaultBodyLimit::disable())
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

async fn soap_handler(
    State(dispatcher): State<Arc<EndpointDispatcher>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let max_body_size = dispatcher.config().settings.max_body_size;

    let outcome = match read_body(body, max_body_size).await {
        Ok(bytes) => dispatcher.dispatch(&InboundMessage {
            content_type,
            soap_action: headers.get("soapaction").and_then(|v| v.to_str().ok()),
            body: &bytes,
        }),
        Err(fault) => dispatcher.reject(content_type, fault),
    };

    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, outcome.content_type)], outcome.body).into_response()
}

/// Collect the request body, stopping as soon as it passes `max` bytes.
async fn read_body(body: Body, max: usize) -> Result<Vec<u8>, Fault> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            debug!(error = %e, "Failed to read request body");
            Fault::new(
                FaultCode::MalformedRequest,
                format!("Failed to read request body: {}", e),
            )
        })?;
        if buf.len() + chunk.len() > max {
            return Err(Fault::new(
                FaultCode::BodyTooLarge,
                format!("Request body exceeds maximum {}", max),
            ));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
