use document_agent_orchestrator::{
    config::EngineConfig,
    models::{AssistRequest, DocumentContext},
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
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    info!("Document Agent Orchestrator starting");

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

    let engine = WorkflowEngine::new(nlu, provider, config);

    let request = AssistRequest {
        request: "Insert a paragraph about AAPL's latest earnings".to_string(),
        request_id: "demo-1".to_string(),
        context: DocumentContext::default(),
    };

    info!(request_id = %request.request_id, "Running workflow");

    let response = engine.run(request).await;

    println!("\n=== WORKFLOW RESPONSE ===");
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
