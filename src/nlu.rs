//! Language-understanding capability
//!
//! Classification, entity extraction, and text generation are delegated to a
//! possibly-slow, possibly-unreliable remote model. The trait keeps the
//! orchestrator testable; `StaticNlu` keeps the system functional without any
//! LLM dependency.

use crate::error::{Result, WorkflowError};
use crate::models::DocumentContext;
use crate::router::scan_ticker_symbol;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{error, info};

/// Structured classification result from the model.
#[derive(Debug, Clone)]
pub struct IntentClassification {
    /// Raw label; the router validates it against the closed intent set.
    pub label: String,
    pub confidence: f64,
    /// Operation parameters extracted alongside the label.
    pub params: Map<String, Value>,
}

/// Entities pulled out of a request for augmentation.
#[derive(Debug, Clone, Default)]
pub struct ExtractedEntities {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn classify_intent(
        &self,
        request: &str,
        context: &DocumentContext,
    ) -> Result<IntentClassification>;

    async fn extract_entities(&self, request: &str) -> Result<ExtractedEntities>;

    async fn generate_text(&self, prompt: &str) -> Result<(String, f64)>;
}

//
// ================= Gemini-backed implementation =================
//

/// Reusable Gemini client (connection-pooled, timeout-bounded).
pub struct GeminiNlu {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiNlu {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        })
    }

    async fn generate(&self, system_prompt: &str, query: &str) -> Result<(String, f64)> {
        if self.api_key.is_empty() {
            return Err(WorkflowError::Llm(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: query.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 768,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                WorkflowError::Llm(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(WorkflowError::Llm(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| WorkflowError::Llm(format!("Gemini parse error: {}", e)))?;

        let candidate = gemini_response
            .candidates
            .first()
            .ok_or_else(|| WorkflowError::Llm("No response from Gemini API".to_string()))?;

        let answer = candidate
            .content
            .parts
            .first()
            .ok_or_else(|| WorkflowError::Llm("Empty response from Gemini".to_string()))?
            .text
            .clone();

        let confidence = match candidate.finish_reason.as_deref() {
            Some("STOP") => 0.9,
            Some("LENGTH") => 0.75,
            _ => 0.6,
        };

        Ok((answer, confidence))
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiNlu {
    async fn classify_intent(
        &self,
        request: &str,
        context: &DocumentContext,
    ) -> Result<IntentClassification> {
        let selection_note = if context.has_selection() {
            "The user currently has text selected in the document."
        } else {
            "The user has no text selected."
        };

        let system_prompt = format!(
            r#"You classify document-assistant requests.

{}

Pick exactly one intent from: generate_content, classify_formatting, create_chart, create_table.

Return ONLY valid JSON, no explanation text:
{{ "intent": "<one of the four>", "confidence": <0..1>, "params": {{ ... }} }}"#,
            selection_note
        );

        let (raw, call_confidence) = self.generate(&system_prompt, request).await?;
        let json = parse_fenced_json(&raw)?;

        let label = json
            .get("intent")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::Llm("Classification missing intent".to_string()))?
            .to_string();

        let confidence = json
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(call_confidence);

        let params = json
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(IntentClassification {
            label,
            confidence,
            params,
        })
    }

    async fn extract_entities(&self, request: &str) -> Result<ExtractedEntities> {
        let system_prompt = r#"Extract the stock ticker symbol and timeframe mentioned in the request.

Return ONLY valid JSON:
{ "symbol": "<uppercase ticker or null>", "timeframe": "<e.g. 1d, 1w, 1m, or null>" }"#;

        let (raw, _) = self.generate(system_prompt, request).await?;
        let json = parse_fenced_json(&raw)?;

        Ok(ExtractedEntities {
            symbol: json
                .get("symbol")
                .and_then(Value::as_str)
                .map(|s| s.to_uppercase()),
            timeframe: json
                .get("timeframe")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
        })
    }

    async fn generate_text(&self, prompt: &str) -> Result<(String, f64)> {
        let system_prompt = "You draft document content for a word processor. \
            Write polished prose ready for insertion. When financial figures are \
            provided in the prompt, use them verbatim and do not invent numbers.";

        self.generate(system_prompt, prompt).await
    }
}

/// Strip an optional markdown code fence and parse the remainder as JSON.
fn parse_fenced_json(response: &str) -> Result<Value> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned)
        .map_err(|e| WorkflowError::Llm(format!("Invalid model JSON: {} | raw={}", e, response)))
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

//
// ================= Deterministic stand-in =================
//

const FORMAT_KEYWORDS: &[&str] = &[
    "bold", "italic", "underline", "highlight", "font", "color", "format", "style",
];

const CHART_KEYWORDS: &[&str] = &["chart", "graph", "plot", "visualize", "visualise"];

const TABLE_KEYWORDS: &[&str] = &["table", "grid", "spreadsheet", "rows and columns"];

/// Keyword-driven `LanguageModel` with no external dependency.
/// Used when no API key is configured and throughout the test suite.
pub struct StaticNlu;

#[async_trait::async_trait]
impl LanguageModel for StaticNlu {
    async fn classify_intent(
        &self,
        request: &str,
        _context: &DocumentContext,
    ) -> Result<IntentClassification> {
        if request.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("empty request".to_string()));
        }

        let lowered = request.to_lowercase();
        // Single-word keywords anchor at token starts so that "paragraph"
        // does not read as "graph" (plurals like "charts" still match).
        let tokens: Vec<&str> = lowered
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .collect();
        let has_any = |keywords: &[&str]| {
            keywords.iter().any(|k| {
                if k.contains(' ') {
                    lowered.contains(k)
                } else {
                    tokens.iter().any(|t| t.starts_with(k))
                }
            })
        };

        let (label, confidence) = if has_any(CHART_KEYWORDS) {
            ("create_chart", 0.9)
        } else if has_any(TABLE_KEYWORDS) {
            ("create_table", 0.9)
        } else if has_any(FORMAT_KEYWORDS) {
            ("classify_formatting", 0.9)
        } else {
            ("generate_content", 0.7)
        };

        let mut params = Map::new();
        params.insert("text".to_string(), Value::String(request.to_string()));

        Ok(IntentClassification {
            label: label.to_string(),
            confidence,
            params,
        })
    }

    async fn extract_entities(&self, request: &str) -> Result<ExtractedEntities> {
        let lowered = request.to_lowercase();

        let timeframe = if lowered.contains("year") || lowered.contains("annual") {
            Some("1y".to_string())
        } else if lowered.contains("month") || lowered.contains("quarter") {
            Some("1m".to_string())
        } else if lowered.contains("week") {
            Some("1w".to_string())
        } else {
            None
        };

        Ok(ExtractedEntities {
            symbol: scan_ticker_symbol(request),
            timeframe,
        })
    }

    async fn generate_text(&self, prompt: &str) -> Result<(String, f64)> {
        let text = format!(
            "Here is a draft based on your request: {}",
            prompt.trim()
        );
        Ok((text, 0.7))
    }
}

//
// ================= Construction from environment =================
//

/// Gemini when a key is configured, deterministic stand-in otherwise.
pub fn language_model_from_env(
    timeout: Duration,
) -> Result<std::sync::Arc<dyn LanguageModel>> {
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            info!("Using Gemini language model");
            Ok(std::sync::Arc::new(GeminiNlu::new(key, timeout)?))
        }
        _ => {
            info!("GEMINI_API_KEY not set; using deterministic language model");
            Ok(std::sync::Arc::new(StaticNlu))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"intent\": \"create_chart\", \"confidence\": 0.92}\n```";
        let json = parse_fenced_json(raw).unwrap();
        assert_eq!(json["intent"], "create_chart");

        assert!(parse_fenced_json("not json at all").is_err());
    }

    #[tokio::test]
    async fn test_static_nlu_classification() {
        let ctx = DocumentContext::default();

        let chart = StaticNlu
            .classify_intent("Plot revenue as a line graph", &ctx)
            .await
            .unwrap();
        assert_eq!(chart.label, "create_chart");

        let table = StaticNlu
            .classify_intent("Add a table of expenses", &ctx)
            .await
            .unwrap();
        assert_eq!(table.label, "create_table");

        let format = StaticNlu
            .classify_intent("Make this bold", &ctx)
            .await
            .unwrap();
        assert_eq!(format.label, "classify_formatting");

        let content = StaticNlu
            .classify_intent("Write a summary of the meeting", &ctx)
            .await
            .unwrap();
        assert_eq!(content.label, "generate_content");
    }

    #[tokio::test]
    async fn test_keywords_match_whole_words_only() {
        let ctx = DocumentContext::default();

        // "paragraph" contains "graph" but is not a chart request.
        let insert = StaticNlu
            .classify_intent("Insert a paragraph about AAPL's latest earnings", &ctx)
            .await
            .unwrap();
        assert_eq!(insert.label, "generate_content");

        // Token-anchored matching still catches plurals and punctuation.
        let charts = StaticNlu
            .classify_intent("Add some graphs, please", &ctx)
            .await
            .unwrap();
        assert_eq!(charts.label, "create_chart");

        let table = StaticNlu
            .classify_intent("Lay this out in rows and columns", &ctx)
            .await
            .unwrap();
        assert_eq!(table.label, "create_table");
    }

    #[test]
    fn test_candidate_reads_camel_case_finish_reason() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "ok" }] },
                "finishReason": "STOP"
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            response.candidates[0].finish_reason.as_deref(),
            Some("STOP")
        );
    }

    #[tokio::test]
    async fn test_static_nlu_rejects_empty_request() {
        let ctx = DocumentContext::default();
        assert!(StaticNlu.classify_intent("   ", &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_static_nlu_entity_extraction() {
        let entities = StaticNlu
            .extract_entities("How did AAPL move this week?")
            .await
            .unwrap();
        assert_eq!(entities.symbol.as_deref(), Some("AAPL"));
        assert_eq!(entities.timeframe.as_deref(), Some("1w"));
    }
}
