//! Response Synthesizer
//!
//! Merges the operation result, the original request, and any augmentation
//! output into one canonical response object. The summary text is filled from
//! per-intent templates, not a second model call, so this stage stays fast
//! and auditable. It is the last line of defense: the orchestrator pairs it
//! with a minimal error response for the case where even synthesis fails.

use crate::error::{Result, WorkflowError};
use crate::models::{
    FinalResponse, FormattingAttributes, Intent, OperationResult, ResponseMetadata, StageError,
    WorkflowState,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Stable operation id derived from the opaque ingress request id.
pub fn derive_operation_id(request_id: &str) -> String {
    let hash = Sha256::digest(request_id.as_bytes());
    format!("op-{}", hex::encode(&hash[..6]))
}

pub struct ResponseSynthesizer {
    default_confidence: f64,
}

impl ResponseSynthesizer {
    pub fn new(default_confidence: f64) -> Self {
        Self { default_confidence }
    }

    pub fn synthesize(&self, state: &WorkflowState, execution_time_ms: u64) -> Result<FinalResponse> {
        let operation_result = state
            .operation_result
            .as_ref()
            .ok_or_else(|| WorkflowError::Synthesis("no operation result to merge".to_string()))?;

        let intent = operation_result.intent();
        let payload = payload_fields(operation_result)?;

        let response = if operation_result.is_degraded() {
            degraded_message(intent, operation_result)
        } else {
            summary_message(operation_result, state)
        };

        Ok(FinalResponse {
            response_type: intent.tag().to_string(),
            response,
            payload,
            metadata: ResponseMetadata {
                execution_time_ms,
                confidence: state.confidence.unwrap_or(self.default_confidence),
                operation_id: derive_operation_id(&state.request_id),
                errors: state.errors.clone(),
            },
        })
    }

    /// Last-resort catch-all when synthesis itself cannot produce a typed
    /// response. Always structurally valid.
    pub fn error_response(
        &self,
        request_id: &str,
        message: &str,
        errors: Vec<StageError>,
        execution_time_ms: u64,
    ) -> FinalResponse {
        FinalResponse {
            response_type: "error".to_string(),
            response: format!("The request could not be completed: {}", message),
            payload: Map::new(),
            metadata: ResponseMetadata {
                execution_time_ms,
                confidence: 0.0,
                operation_id: derive_operation_id(request_id),
                errors,
            },
        }
    }
}

/// Flatten the intent-specific fields of the operation result to the top
/// level of the egress object.
fn payload_fields(result: &OperationResult) -> Result<Map<String, Value>> {
    let mut payload = Map::new();

    match result {
        OperationResult::Content { content, .. } => {
            payload.insert("content".to_string(), Value::String(content.clone()));
        }
        OperationResult::Formatting { formatting, .. } => {
            payload.insert("formatting".to_string(), serde_json::to_value(formatting)?);
        }
        OperationResult::Chart {
            chart_type,
            configuration,
            ..
        } => {
            payload.insert("chart_type".to_string(), serde_json::to_value(chart_type)?);
            payload.insert("configuration".to_string(), configuration.clone());
        }
        OperationResult::Table {
            rows,
            columns,
            configuration,
            ..
        } => {
            payload.insert("rows".to_string(), Value::from(*rows));
            payload.insert("columns".to_string(), Value::from(*columns));
            payload.insert("configuration".to_string(), configuration.clone());
        }
    }

    Ok(payload)
}

fn summary_message(result: &OperationResult, state: &WorkflowState) -> String {
    match result {
        OperationResult::Content { content, .. } => {
            let words = content.split_whitespace().count();
            match &state.augmentation_result {
                Some(record) => format!(
                    "Drafted {} words of content using live {} market data{}.",
                    words,
                    record.symbol,
                    if record.is_stale { " (cached)" } else { "" }
                ),
                None => format!("Drafted {} words of content ready to insert.", words),
            }
        }
        OperationResult::Formatting { formatting, .. } => {
            let applied = describe_formatting(formatting);
            if applied.is_empty() {
                "No formatting changes were requested for the selection.".to_string()
            } else {
                format!("Applying {} to the selected text.", applied.join(", "))
            }
        }
        OperationResult::Chart { chart_type, .. } => {
            format!("Prepared a {} chart specification.", chart_type)
        }
        OperationResult::Table { rows, columns, .. } => {
            format!("Prepared a {}x{} table.", rows, columns)
        }
    }
}

fn describe_formatting(formatting: &FormattingAttributes) -> Vec<String> {
    let mut applied = Vec::new();
    if formatting.bold {
        applied.push("bold".to_string());
    }
    if formatting.italic {
        applied.push("italic".to_string());
    }
    if formatting.underline {
        applied.push("underline".to_string());
    }
    if let Some(size) = formatting.font_size {
        applied.push(format!("{}pt", size));
    }
    if let Some(color) = &formatting.color {
        applied.push(color.clone());
    }
    applied
}

fn degraded_message(intent: Intent, result: &OperationResult) -> String {
    let detail = result
        .metadata()
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("an internal stage failed");

    format!(
        "The {} operation partially failed: {}. See metadata.errors for details.",
        intent.tag(),
        detail
    )
}
