//! HTTP surface: a health probe, the OCR side endpoint and a thin
//! transport wrapper over the dialogue engine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::ExpenseAgent;
use crate::error::AgentError;
use crate::extract::OcrBackend;

pub mod ocr;
pub mod turn;

pub(crate) struct ServerState {
    pub(crate) agent: Arc<ExpenseAgent>,
    pub(crate) ocr: Arc<dyn OcrBackend>,
}

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) fn map_error(error: AgentError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        AgentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AgentError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        AgentError::ExternalService(_) | AgentError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/ocr", post(ocr::recognize))
        .route("/turn", post(turn::run_turn))
        .with_state(state)
        .layer(cors)
}

async fn health() -> &'static str {
    "ok"
}

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Server {
    pub async fn start(
        addr: SocketAddr,
        agent: Arc<ExpenseAgent>,
        ocr: Arc<dyn OcrBackend>,
    ) -> Result<Self, String> {
        let state = Arc::new(ServerState { agent, ocr });
        let app = router(state);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| format!("failed to bind {addr}: {error}"))?;
        let addr = listener
            .local_addr()
            .map_err(|error| error.to_string())?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) -> Result<(), String> {
        if let Some(sender) = self.shutdown.take() {
            sender
                .send(())
                .map_err(|_| "failed to send server shutdown signal".to_string())
        } else {
            Ok(())
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
