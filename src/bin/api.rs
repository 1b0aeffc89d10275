use document_agent_orchestrator::{
    api::start_server,
    config::EngineConfig,
    nlu::language_model_from_env,
    orchestrator::WorkflowEngine,
    provider::{HttpMarketDataProvider, MarketDataProvider, MockMarketDataProvider},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = EngineConfig::from_env();
    let nlu = language_model_from_env(config.fetch_timeout)?;

    let provider: Arc<dyn MarketDataProvider> =
        match HttpMarketDataProvider::from_env(config.fetch_timeout) {
            Some(provider) => Arc::new(provider),
            None => {
                info!("MARKET_DATA_BASE_URL not set; using fixed-data provider");
                Arc::new(MockMarketDataProvider::new())
            }
        };

    let engine = Arc::new(WorkflowEngine::new(nlu, provider, config));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    info!("Document Agent Orchestrator API starting on port {}", port);

    start_server(engine, port).await
}
