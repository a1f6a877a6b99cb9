use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use keihi::engine::ExpenseAgent;
use keihi::extract::{CommandOcr, OcrBackend};
use keihi::server::Server;
use keihi::storage::FileClaimStore;
use keihi_llm::OpenAiCompatibleGenerator;

const DEFAULT_PORT: u16 = 10002;
const DEFAULT_CLAIMS_PATH: &str = "data/claims.json";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keihi=info")),
        )
        .init();

    let host = std::env::var("KEIHI_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("KEIHI_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let claims_path =
        std::env::var("KEIHI_CLAIMS_PATH").unwrap_or_else(|_| DEFAULT_CLAIMS_PATH.to_string());

    let store = Arc::new(FileClaimStore::new(claims_path.as_str()));
    let ocr: Arc<dyn OcrBackend> = Arc::new(CommandOcr::from_env());
    let mut agent = ExpenseAgent::new(store, Arc::clone(&ocr));
    match OpenAiCompatibleGenerator::from_env() {
        Some(generator) => {
            tracing::info!(model = generator.model(), "generative review UI enabled");
            agent = agent.with_generator(Arc::new(generator));
        }
        None => {
            tracing::info!("no LLM credential configured; deterministic UI only");
        }
    }

    let addr: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(addr) => addr,
        Err(error) => {
            tracing::error!(%error, %host, port, "invalid listen address");
            std::process::exit(1);
        }
    };
    let mut server = match Server::start(addr, Arc::new(agent), ocr).await {
        Ok(server) => server,
        Err(error) => {
            tracing::error!(%error, "failed to start server");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %server.addr(), claims = %claims_path, "keihi agent listening");

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to wait for shutdown signal");
    }
    let _ = server.shutdown();
}
