//! Operation handlers
//!
//! One handler per intent, selected through an exhaustive match so the
//! compiler enforces coverage when a new operation kind is added. Handlers
//! are pure with respect to workflow state: they read parameters, context,
//! and the optional augmentation record, and return a fresh result.

use crate::error::{Result, WorkflowError};
use crate::models::{
    ChartKind, DocumentContext, FinancialDataRecord, FormattingAttributes, Intent,
    OperationResult,
};
use crate::nlu::LanguageModel;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const TIME_SERIES_KEYWORDS: &[&str] = &[
    "over time", "trend", "history", "timeline", "monthly", "quarterly", "weekly", "daily",
    "per month", "per year",
];

const PROPORTION_KEYWORDS: &[&str] = &[
    "share", "proportion", "percentage", "breakdown", "distribution", "split",
];

const COMPARISON_KEYWORDS: &[&str] = &["compare", "comparison", " vs ", "versus", "against"];

const COLOR_WORDS: &[&str] = &[
    "red", "blue", "green", "yellow", "orange", "purple", "black", "white", "gray", "grey",
];

pub struct OperationHandlers {
    nlu: Arc<dyn LanguageModel>,
}

impl OperationHandlers {
    pub fn new(nlu: Arc<dyn LanguageModel>) -> Self {
        Self { nlu }
    }

    pub async fn execute(
        &self,
        intent: Intent,
        params: &Map<String, Value>,
        context: &DocumentContext,
        augmentation: Option<&FinancialDataRecord>,
    ) -> Result<OperationResult> {
        match intent {
            Intent::GenerateContent => self.generate_content(params, augmentation).await,
            Intent::ClassifyFormatting => classify_formatting(params, context),
            Intent::CreateChart => Ok(create_chart(params)),
            Intent::CreateTable => Ok(create_table(params)),
        }
    }

    /// Content generation. Live figures, when present, come exclusively from
    /// the augmentation record; the handler never re-derives them.
    async fn generate_content(
        &self,
        params: &Map<String, Value>,
        augmentation: Option<&FinancialDataRecord>,
    ) -> Result<OperationResult> {
        let text = request_text(params);

        let prompt = match augmentation {
            Some(record) => format!(
                "{}\n\nUse these live figures verbatim:\n{}",
                text, record.formatted_summary
            ),
            None => text.to_string(),
        };

        let (mut content, _confidence) = self
            .nlu
            .generate_text(&prompt)
            .await
            .map_err(|e| WorkflowError::Handler(format!("content generation failed: {}", e)))?;

        let mut metadata = Map::new();

        if let Some(record) = augmentation {
            // Guarantee the figures made it into the factual basis.
            if !content.contains(record.symbol.as_str()) {
                content.push_str("\n\n");
                content.push_str(&record.formatted_summary);
            }
            metadata.insert("augmented".to_string(), Value::Bool(true));
            metadata.insert(
                "data_stale".to_string(),
                Value::Bool(record.is_stale),
            );
        }

        Ok(OperationResult::Content { content, metadata })
    }
}

fn request_text(params: &Map<String, Value>) -> &str {
    params.get("text").and_then(Value::as_str).unwrap_or("")
}

/// Map the requested formatting onto an explicit attribute set. Requires a
/// non-empty selection in the document context.
fn classify_formatting(
    params: &Map<String, Value>,
    context: &DocumentContext,
) -> Result<OperationResult> {
    if !context.has_selection() {
        return Err(WorkflowError::NoSelection(
            "no text is selected in the document".to_string(),
        ));
    }

    let text = request_text(params).to_lowercase();

    let keyword_or_param = |param: &str, keyword: &str| -> bool {
        params
            .get(param)
            .and_then(Value::as_bool)
            .unwrap_or_else(|| text.contains(keyword))
    };

    let font_size = params
        .get("font_size")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .or_else(|| parse_font_size(&text));

    let color = params
        .get("color")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .or_else(|| {
            COLOR_WORDS
                .iter()
                .find(|c| text.contains(**c))
                .map(|c| c.to_string())
        });

    let formatting = FormattingAttributes {
        bold: keyword_or_param("bold", "bold"),
        italic: keyword_or_param("italic", "italic"),
        underline: keyword_or_param("underline", "underline"),
        font_size,
        color,
    };

    let mut metadata = Map::new();
    metadata.insert(
        "selection_length".to_string(),
        json!(context.selected_text.as_deref().unwrap_or("").len()),
    );

    Ok(OperationResult::Formatting {
        formatting,
        metadata,
    })
}

/// Deterministic chart-kind selection from the requested data shape.
fn create_chart(params: &Map<String, Value>) -> OperationResult {
    let text = request_text(params).to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    // Explicit kind names win over shape inference.
    let (chart_type, shape, resolved) = if text.contains("column") {
        (ChartKind::Column, "categorical", true)
    } else if text.contains("pie") {
        (ChartKind::Pie, "proportion", true)
    } else if text.contains("line") {
        (ChartKind::Line, "time_series", true)
    } else if text.contains("bar") {
        (ChartKind::Bar, "categorical", true)
    } else if has_any(TIME_SERIES_KEYWORDS) {
        (ChartKind::Line, "time_series", true)
    } else if has_any(PROPORTION_KEYWORDS) {
        (ChartKind::Pie, "proportion", true)
    } else if has_any(COMPARISON_KEYWORDS) {
        (ChartKind::Bar, "categorical", true)
    } else {
        (ChartKind::Bar, "unspecified", false)
    };

    let configuration = json!({
        "data_shape": shape,
        "legend": true,
    });

    let mut metadata = Map::new();
    if !resolved {
        metadata.insert("complexity".to_string(), Value::String("simple".to_string()));
    }

    OperationResult::Chart {
        chart_type,
        configuration,
        metadata,
    }
}

/// Compute row/column counts from the request, defaulting to 3x4.
fn create_table(params: &Map<String, Value>) -> OperationResult {
    let text = request_text(params).to_lowercase();
    let (rows, columns) = parse_table_dims(&text);

    let mut metadata = Map::new();
    let (rows, columns) = match (rows, columns) {
        (Some(r), Some(c)) => (r, c),
        (Some(r), None) => (r, 4),
        (None, Some(c)) => (3, c),
        (None, None) => {
            metadata.insert(
                "estimated_size".to_string(),
                Value::String("small".to_string()),
            );
            (3, 4)
        }
    };

    OperationResult::Table {
        rows: rows.clamp(1, 100),
        columns: columns.clamp(1, 50),
        configuration: json!({ "header_row": true }),
        metadata,
    }
}

fn parse_font_size(text: &str) -> Option<u32> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        // "14pt" / "14px"
        if let Some(stripped) = token.strip_suffix("pt").or_else(|| token.strip_suffix("px")) {
            if let Ok(size) = stripped.parse() {
                return Some(size);
            }
        }
        // "size 14" / "points 14" would be odd; "size" followed by a number
        if (*token == "size" || *token == "font") && i + 1 < tokens.len() {
            if let Ok(size) = tokens[i + 1].trim_end_matches("pt").parse() {
                return Some(size);
            }
        }
    }

    None
}

fn parse_table_dims(text: &str) -> (Option<u32>, Option<u32>) {
    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || ",.;:!?()".contains(c))
        .filter(|t| !t.is_empty())
        .collect();

    // "3x4"
    for token in &tokens {
        if let Some((a, b)) = token.split_once('x') {
            if let (Ok(rows), Ok(columns)) = (a.parse(), b.parse()) {
                return (Some(rows), Some(columns));
            }
        }
    }

    // "3 by 4"
    for window in tokens.windows(3) {
        if window[1] == "by" {
            if let (Ok(rows), Ok(columns)) = (window[0].parse(), window[2].parse()) {
                return (Some(rows), Some(columns));
            }
        }
    }

    // "4 rows" / "3 columns" in either order
    let mut rows = None;
    let mut columns = None;
    for window in tokens.windows(2) {
        if let Ok(n) = window[0].parse::<u32>() {
            if window[1].starts_with("row") {
                rows = Some(n);
            } else if window[1].starts_with("col") {
                columns = Some(n);
            }
        }
    }

    (rows, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlu::StaticNlu;
    use chrono::Utc;

    fn params_with_text(text: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("text".to_string(), Value::String(text.to_string()));
        params
    }

    fn context_with_selection(selection: &str) -> DocumentContext {
        DocumentContext {
            cursor_position: None,
            selected_text: Some(selection.to_string()),
            document_info: None,
        }
    }

    fn sample_record() -> FinancialDataRecord {
        FinancialDataRecord {
            symbol: "AAPL".to_string(),
            current_price: 189.45,
            change_percent: 1.23,
            market_cap: "2.95T".to_string(),
            pe_ratio: Some(31.4),
            volume: "48,210,000".to_string(),
            formatted_summary:
                "AAPL is trading at $189.45 (+1.23%), market cap 2.95T, volume 48,210,000."
                    .to_string(),
            source_timestamp: Utc::now(),
            is_stale: false,
        }
    }

    #[tokio::test]
    async fn test_content_generation_embeds_augmentation() {
        let handlers = OperationHandlers::new(Arc::new(StaticNlu));
        let record = sample_record();

        let result = handlers
            .execute(
                Intent::GenerateContent,
                &params_with_text("Insert a paragraph about AAPL's latest earnings"),
                &DocumentContext::default(),
                Some(&record),
            )
            .await
            .unwrap();

        match result {
            OperationResult::Content { content, metadata } => {
                assert!(content.contains("AAPL"));
                assert_eq!(metadata.get("augmented"), Some(&Value::Bool(true)));
            }
            other => panic!("expected content result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_formatting_requires_selection() {
        let handlers = OperationHandlers::new(Arc::new(StaticNlu));

        let err = handlers
            .execute(
                Intent::ClassifyFormatting,
                &params_with_text("Make this bold"),
                &DocumentContext::default(),
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "NoSelectionError");

        // Whitespace-only selections count as empty.
        let ctx = context_with_selection("   ");
        let err = handlers
            .execute(
                Intent::ClassifyFormatting,
                &params_with_text("Make this bold"),
                &ctx,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NoSelectionError");
    }

    #[tokio::test]
    async fn test_formatting_attribute_mapping() {
        let handlers = OperationHandlers::new(Arc::new(StaticNlu));
        let ctx = context_with_selection("quarterly totals");

        let result = handlers
            .execute(
                Intent::ClassifyFormatting,
                &params_with_text("make this bold and underline it in red, 14pt"),
                &ctx,
                None,
            )
            .await
            .unwrap();

        match result {
            OperationResult::Formatting { formatting, .. } => {
                assert!(formatting.bold);
                assert!(!formatting.italic);
                assert!(formatting.underline);
                assert_eq!(formatting.font_size, Some(14));
                assert_eq!(formatting.color.as_deref(), Some("red"));
            }
            other => panic!("expected formatting result, got {:?}", other),
        }
    }

    #[test]
    fn test_chart_kind_rules() {
        let kind_of = |text: &str| match create_chart(&params_with_text(text)) {
            OperationResult::Chart { chart_type, .. } => chart_type,
            _ => unreachable!(),
        };

        assert_eq!(kind_of("revenue trend over time"), ChartKind::Line);
        assert_eq!(kind_of("market share breakdown"), ChartKind::Pie);
        assert_eq!(kind_of("compare sales across regions"), ChartKind::Bar);
        assert_eq!(kind_of("a column chart of totals"), ChartKind::Column);
        assert_eq!(kind_of("a pie of expenses"), ChartKind::Pie);
    }

    #[test]
    fn test_chart_default_is_simple_bar() {
        match create_chart(&params_with_text("chart the data")) {
            OperationResult::Chart {
                chart_type,
                metadata,
                ..
            } => {
                assert_eq!(chart_type, ChartKind::Bar);
                assert_eq!(
                    metadata.get("complexity").and_then(Value::as_str),
                    Some("simple")
                );
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_table_dimension_parsing() {
        let dims = |text: &str| match create_table(&params_with_text(text)) {
            OperationResult::Table { rows, columns, .. } => (rows, columns),
            _ => unreachable!(),
        };

        assert_eq!(dims("insert a 3x4 table"), (3, 4));
        assert_eq!(dims("a table 2 by 5"), (2, 5));
        assert_eq!(dims("table with 6 rows and 2 columns"), (6, 2));
        assert_eq!(dims("table with 5 columns"), (3, 5));
    }

    #[test]
    fn test_table_default_size() {
        match create_table(&params_with_text("add a table")) {
            OperationResult::Table {
                rows,
                columns,
                metadata,
                ..
            } => {
                assert_eq!((rows, columns), (3, 4));
                assert_eq!(
                    metadata.get("estimated_size").and_then(Value::as_str),
                    Some("small")
                );
            }
            _ => unreachable!(),
        }
    }
}
