//! Core data models for the document agent workflow engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

//
// ================= Intent =================
//

/// Closed set of operation kinds. Dispatch over this enum is an exhaustive
/// match so adding a variant is a compile-time event, not a runtime surprise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    GenerateContent,
    ClassifyFormatting,
    CreateChart,
    CreateTable,
}

impl Intent {
    /// Lowercased wire tag mirrored into the final response `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Intent::GenerateContent => "insert",
            Intent::ClassifyFormatting => "format",
            Intent::CreateChart => "chart",
            Intent::CreateTable => "table",
        }
    }

    /// Parse a classification label coming back from the language model.
    /// Returns `None` for anything outside the four known values.
    pub fn from_label(label: &str) -> Option<Intent> {
        match label.trim().to_lowercase().as_str() {
            "generate_content" | "content" | "insert" | "generate" => {
                Some(Intent::GenerateContent)
            }
            "classify_formatting" | "formatting" | "format" => Some(Intent::ClassifyFormatting),
            "create_chart" | "chart" => Some(Intent::CreateChart),
            "create_table" | "table" => Some(Intent::CreateTable),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

//
// ================= Document Context =================
//

/// Opaque snapshot of the host document. The engine never interprets these
/// fields beyond checking for a non-empty selection; they are forwarded to
/// handlers and to the host as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_info: Option<Value>,
}

impl DocumentContext {
    pub fn has_selection(&self) -> bool {
        self.selected_text
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

//
// ================= Ingress =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistRequest {
    pub request: String,
    pub request_id: String,
    #[serde(default)]
    pub context: DocumentContext,
}

//
// ================= Stage Errors =================
//

/// One recorded failure, tagged with the stage that caught it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageError {
    pub stage: String,
    pub kind: String,
    pub message: String,
}

//
// ================= Financial Data =================
//

/// Normalized output of the augmentation agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialDataRecord {
    pub symbol: String,
    pub current_price: f64,
    pub change_percent: f64,
    pub market_cap: String,
    pub pe_ratio: Option<f64>,
    pub volume: String,
    pub formatted_summary: String,
    pub source_timestamp: DateTime<Utc>,
    pub is_stale: bool,
}

//
// ================= Operation Results =================
//

/// Explicit formatting attribute set. Every flag is a concrete value; handlers
/// never emit partial or inferred attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormattingAttributes {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Column,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Column => "column",
        };
        write!(f, "{}", s)
    }
}

/// Tagged union over the four operation payloads. Each variant carries a
/// free-form diagnostic metadata map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationResult {
    Content {
        content: String,
        metadata: Map<String, Value>,
    },
    Formatting {
        formatting: FormattingAttributes,
        metadata: Map<String, Value>,
    },
    Chart {
        chart_type: ChartKind,
        configuration: Value,
        metadata: Map<String, Value>,
    },
    Table {
        rows: u32,
        columns: u32,
        configuration: Value,
        metadata: Map<String, Value>,
    },
}

impl OperationResult {
    pub fn intent(&self) -> Intent {
        match self {
            OperationResult::Content { .. } => Intent::GenerateContent,
            OperationResult::Formatting { .. } => Intent::ClassifyFormatting,
            OperationResult::Chart { .. } => Intent::CreateChart,
            OperationResult::Table { .. } => Intent::CreateTable,
        }
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        match self {
            OperationResult::Content { metadata, .. }
            | OperationResult::Formatting { metadata, .. }
            | OperationResult::Chart { metadata, .. }
            | OperationResult::Table { metadata, .. } => metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            OperationResult::Content { metadata, .. }
            | OperationResult::Formatting { metadata, .. }
            | OperationResult::Chart { metadata, .. }
            | OperationResult::Table { metadata, .. } => metadata,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata()
            .get("degraded")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Empty-payload result for an intent whose handler failed. Carries the
    /// explanatory message in metadata so synthesis can surface it.
    pub fn degraded(intent: Intent, message: &str) -> OperationResult {
        let mut metadata = Map::new();
        metadata.insert("degraded".to_string(), Value::Bool(true));
        metadata.insert("error".to_string(), Value::String(message.to_string()));

        match intent {
            Intent::GenerateContent => OperationResult::Content {
                content: String::new(),
                metadata,
            },
            Intent::ClassifyFormatting => OperationResult::Formatting {
                formatting: FormattingAttributes::default(),
                metadata,
            },
            Intent::CreateChart => OperationResult::Chart {
                chart_type: ChartKind::Bar,
                configuration: Value::Object(Map::new()),
                metadata,
            },
            Intent::CreateTable => OperationResult::Table {
                rows: 0,
                columns: 0,
                configuration: Value::Object(Map::new()),
                metadata,
            },
        }
    }
}

//
// ================= Workflow State =================
//

/// Mutable record threaded through the stages of one request. Owned
/// exclusively by the orchestrator; `intent` and `operation_result` are each
/// written exactly once.
#[derive(Debug)]
pub struct WorkflowState {
    pub request_id: String,
    pub raw_request: String,
    pub document_context: DocumentContext,
    pub intent: Option<Intent>,
    pub needs_augmentation: bool,
    pub confidence: Option<f64>,
    pub augmentation_result: Option<FinancialDataRecord>,
    pub operation_params: Map<String, Value>,
    pub operation_result: Option<OperationResult>,
    pub errors: Vec<StageError>,
}

impl WorkflowState {
    pub fn new(request: AssistRequest) -> Self {
        Self {
            request_id: request.request_id,
            raw_request: request.request,
            document_context: request.context,
            intent: None,
            needs_augmentation: false,
            confidence: None,
            augmentation_result: None,
            operation_params: Map::new(),
            operation_result: None,
            errors: Vec::new(),
        }
    }

    /// Set-once write. Only the orchestrator calls this, after routing.
    pub fn set_intent(&mut self, intent: Intent) {
        debug_assert!(self.intent.is_none(), "intent assigned twice");
        self.intent = Some(intent);
    }

    /// Set-once write. Only the orchestrator calls this, after the handler.
    pub fn set_operation_result(&mut self, result: OperationResult) {
        debug_assert!(
            self.operation_result.is_none(),
            "operation_result assigned twice"
        );
        self.operation_result = Some(result);
    }

    pub fn record_error(&mut self, stage: &str, error: &crate::error::WorkflowError) {
        self.errors.push(StageError {
            stage: stage.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }
}

//
// ================= Final Response =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub execution_time_ms: u64,
    pub confidence: f64,
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StageError>,
}

/// Egress object. Intent-specific payload fields are flattened to the top
/// level next to `type` and `response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub response: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    pub metadata: ResponseMetadata,
}
