//! Workflow Orchestrator
//!
//! Top-level driver: Router -> optional Augmentation -> Handler ->
//! Synthesizer over one exclusively-owned workflow state. Every stage catches
//! its own failures and converts them into a recorded error plus a degraded
//! continuation; `run` always returns a structurally valid response.

use crate::augmentation::AugmentationAgent;
use crate::cache::QuoteCache;
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::handlers::OperationHandlers;
use crate::host::DocumentHost;
use crate::models::{AssistRequest, FinalResponse, OperationResult, WorkflowState};
use crate::nlu::LanguageModel;
use crate::provider::MarketDataProvider;
use crate::router::IntentRouter;
use crate::synthesizer::ResponseSynthesizer;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct WorkflowEngine {
    router: IntentRouter,
    augmenter: AugmentationAgent,
    handlers: OperationHandlers,
    synthesizer: ResponseSynthesizer,
    host: Option<Arc<dyn DocumentHost>>,
}

impl WorkflowEngine {
    pub fn new(
        nlu: Arc<dyn LanguageModel>,
        provider: Arc<dyn MarketDataProvider>,
        config: EngineConfig,
    ) -> Self {
        let cache = QuoteCache::new(config.cache_freshness, config.cache_hard_expiry);

        Self {
            router: IntentRouter::new(nlu.clone()),
            augmenter: AugmentationAgent::new(nlu.clone(), provider, cache, config.clone()),
            handlers: OperationHandlers::new(nlu),
            synthesizer: ResponseSynthesizer::new(config.default_confidence),
            host: None,
        }
    }

    /// Attach the document-editing host; without one, results are returned
    /// to the caller but not applied anywhere.
    pub fn with_host(mut self, host: Arc<dyn DocumentHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Run one request through the workflow. Total: terminates with a
    /// well-formed response for every input, including total stage failure.
    pub async fn run(&self, request: AssistRequest) -> FinalResponse {
        let start = Instant::now();

        if request.request.trim().is_empty() {
            let err = WorkflowError::InvalidRequest("request text is empty".to_string());
            let mut state = WorkflowState::new(request);
            state.record_error("ingress", &err);
            return self.synthesizer.error_response(
                &state.request_id,
                &err.to_string(),
                state.errors,
                start.elapsed().as_millis() as u64,
            );
        }

        let mut state = WorkflowState::new(request);

        // Caller-supplied request ids may collide across retries; the run id
        // disambiguates log correlation.
        let run_id = Uuid::new_v4();

        info!(
            run_id = %run_id,
            request_id = %state.request_id,
            request = %state.raw_request,
            "Workflow: starting"
        );

        // === ROUTE ===
        let decision = self
            .router
            .classify(&state.raw_request, &state.document_context)
            .await;

        if let Some(reason) = decision.fallback_reason {
            state.record_error("router", &WorkflowError::RouterFallback(reason));
        }

        let intent = decision.intent;
        state.set_intent(intent);
        state.needs_augmentation = decision.needs_augmentation;
        state.confidence = decision.confidence;
        state.operation_params = decision.params;

        debug!(
            request_id = %state.request_id,
            intent = %intent,
            needs_augmentation = state.needs_augmentation,
            "Workflow: routed"
        );

        // === AUGMENT (optional) ===
        if state.needs_augmentation {
            match self.augmenter.augment(&state.raw_request).await {
                Ok(record) => {
                    debug!(
                        request_id = %state.request_id,
                        symbol = %record.symbol,
                        is_stale = record.is_stale,
                        "Workflow: augmentation succeeded"
                    );
                    state.augmentation_result = Some(record);
                }
                Err(e) => {
                    // Non-fatal: the handler runs without live figures.
                    warn!(
                        request_id = %state.request_id,
                        error = %e,
                        "Workflow: augmentation failed; continuing without it"
                    );
                    state.record_error("augmentation", &e);
                }
            }
        }

        // === HANDLE ===
        let result = match self
            .handlers
            .execute(
                intent,
                &state.operation_params,
                &state.document_context,
                state.augmentation_result.as_ref(),
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    request_id = %state.request_id,
                    error = %e,
                    "Workflow: handler failed; degrading"
                );
                state.record_error("handler", &e);
                OperationResult::degraded(intent, &e.to_string())
            }
        };
        state.set_operation_result(result);

        // === APPLY (optional host) ===
        if let (Some(host), Some(result)) = (&self.host, &state.operation_result) {
            if !result.is_degraded() {
                if let Err(e) = host.apply(result, &state.document_context).await {
                    let err = WorkflowError::HostApply(e.to_string());
                    warn!(request_id = %state.request_id, error = %err, "Workflow: host apply failed");
                    state.record_error("host", &err);
                }
            }
        }

        // === SYNTHESIZE ===
        let elapsed = start.elapsed().as_millis() as u64;
        match self.synthesizer.synthesize(&state, elapsed) {
            Ok(response) => {
                info!(
                    run_id = %run_id,
                    request_id = %state.request_id,
                    response_type = %response.response_type,
                    execution_time_ms = elapsed,
                    error_count = response.metadata.errors.len(),
                    "Workflow: complete"
                );
                response
            }
            Err(e) => {
                error!(request_id = %state.request_id, error = %e, "Workflow: synthesis failed");
                state.record_error("synthesizer", &e);
                self.synthesizer.error_response(
                    &state.request_id,
                    &e.to_string(),
                    state.errors,
                    elapsed,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::DocumentContext;
    use crate::nlu::{ExtractedEntities, IntentClassification, StaticNlu};
    use crate::provider::{MockMarketDataProvider, PriceSnapshot, SummaryMetrics};
    use crate::synthesizer::derive_operation_id;
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        EngineConfig {
            backoff_base: Duration::from_millis(1),
            fetch_timeout: Duration::from_secs(1),
            ..EngineConfig::default()
        }
    }

    fn engine_with_provider(provider: Arc<dyn MarketDataProvider>) -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(StaticNlu), provider, test_config())
    }

    fn request(text: &str, id: &str, context: DocumentContext) -> AssistRequest {
        AssistRequest {
            request: text.to_string(),
            request_id: id.to_string(),
            context,
        }
    }

    struct DownNlu;

    #[async_trait::async_trait]
    impl LanguageModel for DownNlu {
        async fn classify_intent(
            &self,
            _request: &str,
            _context: &DocumentContext,
        ) -> Result<IntentClassification> {
            Err(WorkflowError::Llm("model down".to_string()))
        }

        async fn extract_entities(&self, _request: &str) -> Result<ExtractedEntities> {
            Err(WorkflowError::Llm("model down".to_string()))
        }

        async fn generate_text(&self, _prompt: &str) -> Result<(String, f64)> {
            Err(WorkflowError::Llm("model down".to_string()))
        }
    }

    struct DownProvider;

    #[async_trait::async_trait]
    impl MarketDataProvider for DownProvider {
        async fn price_snapshot(&self, _symbol: &str, _timeframe: &str) -> Result<PriceSnapshot> {
            Err(WorkflowError::ExternalServiceUnavailable(
                "provider offline".to_string(),
            ))
        }

        async fn summary_metrics(&self, _symbol: &str) -> Result<SummaryMetrics> {
            Err(WorkflowError::ExternalServiceUnavailable(
                "provider offline".to_string(),
            ))
        }
    }

    struct RecordingHost {
        applied: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DocumentHost for RecordingHost {
        async fn apply(
            &self,
            _operation: &OperationResult,
            _target: &DocumentContext,
        ) -> Result<()> {
            self.applied
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_end_to_end_augmented_content() {
        let provider = Arc::new(MockMarketDataProvider::new());
        let engine = engine_with_provider(provider.clone());

        let response = engine
            .run(request(
                "Insert a paragraph about AAPL's latest earnings",
                "r1",
                DocumentContext::default(),
            ))
            .await;

        assert_eq!(response.response_type, "insert");
        assert_eq!(response.metadata.operation_id, derive_operation_id("r1"));
        assert!(response.metadata.errors.is_empty());

        let content = response
            .payload
            .get("content")
            .and_then(serde_json::Value::as_str)
            .expect("content field present");
        assert!(content.contains("AAPL"));

        // Augmentation ran: one outbound call per facet.
        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn test_augmentation_skipped_without_financial_trigger() {
        let provider = Arc::new(MockMarketDataProvider::new());
        let engine = engine_with_provider(provider.clone());

        let response = engine
            .run(request(
                "Write a short poem about spring",
                "r2",
                DocumentContext::default(),
            ))
            .await;

        assert_eq!(response.response_type, "insert");
        assert_eq!(provider.fetches(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_no_selection_degrades() {
        let engine = engine_with_provider(Arc::new(MockMarketDataProvider::new()));

        let context = DocumentContext {
            cursor_position: None,
            selected_text: Some(String::new()),
            document_info: None,
        };

        let response = engine
            .run(request("Make this bold", "r3", context))
            .await;

        assert_eq!(response.response_type, "format");
        assert!(response.response.to_lowercase().contains("selected"));
        assert!(!response.metadata.errors.is_empty());
        assert_eq!(response.metadata.errors[0].kind, "NoSelectionError");
    }

    #[tokio::test]
    async fn test_router_failure_still_terminates() {
        let engine = WorkflowEngine::new(
            Arc::new(DownNlu),
            Arc::new(MockMarketDataProvider::new()),
            test_config(),
        );

        let response = engine
            .run(request(
                "Insert a paragraph about AAPL stock",
                "r4",
                DocumentContext::default(),
            ))
            .await;

        // Fallback intent, with the router fallback recorded.
        assert_eq!(response.response_type, "insert");
        assert!(response
            .metadata
            .errors
            .iter()
            .any(|e| e.kind == "RouterFallback"));
    }

    #[tokio::test]
    async fn test_augmentation_failure_is_non_fatal() {
        let engine = engine_with_provider(Arc::new(DownProvider));

        let response = engine
            .run(request(
                "Insert a paragraph about AAPL's latest earnings",
                "r5",
                DocumentContext::default(),
            ))
            .await;

        assert_eq!(response.response_type, "insert");
        let content = response
            .payload
            .get("content")
            .and_then(serde_json::Value::as_str)
            .unwrap();
        assert!(!content.is_empty());
        assert!(response
            .metadata
            .errors
            .iter()
            .any(|e| e.kind == "ExternalServiceUnavailable"));
    }

    #[tokio::test]
    async fn test_empty_request_yields_error_response() {
        let engine = engine_with_provider(Arc::new(MockMarketDataProvider::new()));

        let response = engine
            .run(request("   ", "r6", DocumentContext::default()))
            .await;

        assert_eq!(response.response_type, "error");
        assert!(!response.metadata.errors.is_empty());
    }

    #[tokio::test]
    async fn test_every_response_type_is_known() {
        let engine = engine_with_provider(Arc::new(MockMarketDataProvider::new()));
        let known = ["insert", "format", "chart", "table"];

        let cases = [
            "Write a summary of the quarter",
            "Make the selection italic",
            "Chart revenue by region",
            "Insert a 2x2 table",
        ];

        for (i, case) in cases.iter().enumerate() {
            let context = DocumentContext {
                cursor_position: None,
                selected_text: Some("some selection".to_string()),
                document_info: None,
            };
            let response = engine
                .run(request(case, &format!("r-case-{}", i), context))
                .await;
            assert!(
                known.contains(&response.response_type.as_str()),
                "unexpected type {} for {:?}",
                response.response_type,
                case
            );
        }
    }

    #[tokio::test]
    async fn test_host_apply_invoked_on_success() {
        let host = Arc::new(RecordingHost {
            applied: std::sync::atomic::AtomicUsize::new(0),
        });
        let engine = engine_with_provider(Arc::new(MockMarketDataProvider::new()))
            .with_host(host.clone());

        engine
            .run(request(
                "Insert a 3x4 table",
                "r7",
                DocumentContext::default(),
            ))
            .await;

        assert_eq!(host.applied.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Degraded results are not applied.
        engine
            .run(request("Make this bold", "r8", DocumentContext::default()))
            .await;
        assert_eq!(host.applied.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_augmentation_across_requests() {
        let provider = Arc::new(MockMarketDataProvider::new());
        let engine = engine_with_provider(provider.clone());

        for id in ["ra", "rb"] {
            let response = engine
                .run(request(
                    "Insert a note on AAPL earnings",
                    id,
                    DocumentContext::default(),
                ))
                .await;
            assert_eq!(response.response_type, "insert");
        }

        // Second request hits the shared quote cache.
        assert_eq!(provider.fetches(), 2);
    }
}
