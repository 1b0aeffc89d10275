//! Intent Router
//!
//! Classifies the raw request into one of the four operation kinds, decides
//! whether financial augmentation is required, and extracts operation
//! parameters. Classification is delegated to the language model; the
//! augmentation decision is a deterministic predicate and never is.

use crate::models::{DocumentContext, Intent};
use crate::nlu::LanguageModel;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Financial-domain trigger terms, matched case-insensitively as substrings.
const FINANCIAL_TRIGGER_TERMS: &[&str] = &[
    "stock",
    "price",
    "earnings",
    "market",
    "financial",
    "investment",
    "ticker",
    "share",
    "dividend",
    "revenue",
    "quote",
];

/// All-caps tokens that read like tickers but never are.
const TICKER_STOPWORDS: &[&str] = &[
    "I", "A", "OK", "AM", "PM", "PS", "FYI", "ASAP", "TODO", "FAQ", "PDF", "CEO", "CFO", "USA",
    "AND", "OR", "THE", "NOT",
];

/// Find the first ticker-like token: `$`-prefixed 1-5 uppercase letters, or a
/// bare all-uppercase word of 2-5 letters that is not a known stopword.
pub fn scan_ticker_symbol(text: &str) -> Option<String> {
    for raw in text.split(|c: char| c.is_whitespace() || ",.;:!?()[]{}'\"".contains(c)) {
        if raw.is_empty() {
            continue;
        }

        let (dollar, token) = match raw.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        // Possessives like "AAPL's" survive the split above as "AAPL's".
        let token = token.split('\u{2019}').next().unwrap_or(token);

        let len_ok = if dollar {
            (1..=5).contains(&token.len())
        } else {
            (2..=5).contains(&token.len())
        };

        if len_ok
            && token.chars().all(|c| c.is_ascii_uppercase())
            && !TICKER_STOPWORDS.contains(&token)
        {
            return Some(token.to_string());
        }
    }

    None
}

/// Deterministic augmentation predicate: does the request mention the
/// financial domain at all? The intent check is layered on top by the router.
pub fn needs_financial_augmentation(text: &str) -> bool {
    let lowered = text.to_lowercase();

    FINANCIAL_TRIGGER_TERMS
        .iter()
        .any(|term| lowered.contains(term))
        || scan_ticker_symbol(text).is_some()
}

/// Routing outcome for one request. Always well-formed; a failed
/// classification call surfaces as `fallback_reason`, never as an error.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub intent: Intent,
    pub needs_augmentation: bool,
    pub params: Map<String, Value>,
    pub confidence: Option<f64>,
    pub fallback_reason: Option<String>,
}

pub struct IntentRouter {
    nlu: Arc<dyn LanguageModel>,
}

impl IntentRouter {
    pub fn new(nlu: Arc<dyn LanguageModel>) -> Self {
        Self { nlu }
    }

    /// Classify one request. Never fails: classification errors and unknown
    /// labels both collapse to the GenerateContent fallback.
    pub async fn classify(&self, raw_request: &str, context: &DocumentContext) -> RouteDecision {
        match self.nlu.classify_intent(raw_request, context).await {
            Ok(classification) => match Intent::from_label(&classification.label) {
                Some(intent) => {
                    let mut params = classification.params;
                    // Handlers always get the raw request text to work from.
                    params
                        .entry("text".to_string())
                        .or_insert_with(|| Value::String(raw_request.to_string()));

                    let needs_augmentation = intent == Intent::GenerateContent
                        && needs_financial_augmentation(raw_request);

                    debug!(
                        intent = %intent,
                        needs_augmentation,
                        confidence = classification.confidence,
                        "Request classified"
                    );

                    RouteDecision {
                        intent,
                        needs_augmentation,
                        params,
                        confidence: Some(classification.confidence),
                        fallback_reason: None,
                    }
                }
                None => {
                    warn!(label = %classification.label, "Unknown intent label from model");
                    Self::fallback(
                        raw_request,
                        format!("unknown intent label: {}", classification.label),
                    )
                }
            },
            Err(e) => {
                warn!(error = %e, "Classification call failed");
                Self::fallback(raw_request, e.to_string())
            }
        }
    }

    fn fallback(raw_request: &str, reason: String) -> RouteDecision {
        let mut params = Map::new();
        params.insert(
            "text".to_string(),
            Value::String(raw_request.to_string()),
        );

        RouteDecision {
            intent: Intent::GenerateContent,
            needs_augmentation: false,
            params,
            confidence: None,
            fallback_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WorkflowError};
    use crate::nlu::{ExtractedEntities, IntentClassification, StaticNlu};

    struct FailingNlu;

    #[async_trait::async_trait]
    impl LanguageModel for FailingNlu {
        async fn classify_intent(
            &self,
            _request: &str,
            _context: &DocumentContext,
        ) -> Result<IntentClassification> {
            Err(WorkflowError::Llm("model unreachable".to_string()))
        }

        async fn extract_entities(&self, _request: &str) -> Result<ExtractedEntities> {
            Err(WorkflowError::Llm("model unreachable".to_string()))
        }

        async fn generate_text(&self, _prompt: &str) -> Result<(String, f64)> {
            Err(WorkflowError::Llm("model unreachable".to_string()))
        }
    }

    struct BadLabelNlu;

    #[async_trait::async_trait]
    impl LanguageModel for BadLabelNlu {
        async fn classify_intent(
            &self,
            _request: &str,
            _context: &DocumentContext,
        ) -> Result<IntentClassification> {
            Ok(IntentClassification {
                label: "summarize_document".to_string(),
                confidence: 0.99,
                params: Map::new(),
            })
        }

        async fn extract_entities(&self, _request: &str) -> Result<ExtractedEntities> {
            Ok(ExtractedEntities::default())
        }

        async fn generate_text(&self, _prompt: &str) -> Result<(String, f64)> {
            Ok((String::new(), 0.5))
        }
    }

    #[test]
    fn test_ticker_scan() {
        assert_eq!(scan_ticker_symbol("look at AAPL today"), Some("AAPL".into()));
        assert_eq!(scan_ticker_symbol("buy $T now"), Some("T".into()));
        assert_eq!(
            scan_ticker_symbol("AAPL's latest earnings"),
            Some("AAPL".into())
        );
        assert_eq!(scan_ticker_symbol("I want a summary ASAP"), None);
        assert_eq!(scan_ticker_symbol("make this bold"), None);
        assert_eq!(scan_ticker_symbol("TOOLONGTICKER here"), None);
    }

    #[test]
    fn test_augmentation_predicate() {
        assert!(needs_financial_augmentation(
            "Insert a paragraph about AAPL's latest earnings"
        ));
        assert!(needs_financial_augmentation("what is the stock doing"));
        assert!(needs_financial_augmentation("current MSFT levels"));
        assert!(!needs_financial_augmentation("write a birthday note"));
        assert!(!needs_financial_augmentation("make this bold"));
    }

    #[tokio::test]
    async fn test_classify_routes_and_gates_augmentation() {
        let router = IntentRouter::new(Arc::new(StaticNlu));
        let ctx = DocumentContext::default();

        let decision = router
            .classify("Insert a paragraph about AAPL's latest earnings", &ctx)
            .await;
        assert_eq!(decision.intent, Intent::GenerateContent);
        assert!(decision.needs_augmentation);
        assert!(decision.fallback_reason.is_none());
        assert!(decision.params.get("text").is_some());

        // Financial wording with a non-content intent must not augment.
        let decision = router
            .classify("Create a chart of AAPL stock price", &ctx)
            .await;
        assert_eq!(decision.intent, Intent::CreateChart);
        assert!(!decision.needs_augmentation);
    }

    #[tokio::test]
    async fn test_fallback_on_classification_failure() {
        let router = IntentRouter::new(Arc::new(FailingNlu));
        let ctx = DocumentContext::default();

        // Fallback is idempotent: same outcome every time.
        for _ in 0..3 {
            let decision = router.classify("anything about AAPL stock", &ctx).await;
            assert_eq!(decision.intent, Intent::GenerateContent);
            assert!(!decision.needs_augmentation);
            assert!(decision.fallback_reason.is_some());
        }
    }

    #[tokio::test]
    async fn test_fallback_on_unknown_label() {
        let router = IntentRouter::new(Arc::new(BadLabelNlu));
        let ctx = DocumentContext::default();

        let decision = router.classify("summarize this for me", &ctx).await;
        assert_eq!(decision.intent, Intent::GenerateContent);
        assert!(decision
            .fallback_reason
            .as_deref()
            .unwrap()
            .contains("summarize_document"));
    }
}
