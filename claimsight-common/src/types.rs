//! Record and analysis wire types shared across Claimsight services
//!
//! Field names and casing follow the records backend REST API
//! (`pendingLeads`, `justificativa`, Portuguese validity labels), so these
//! types serialize to exactly what the backend persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A record awaiting AI analysis.
///
/// `id` is stable across fetch and save and is the only field the engine
/// interprets (de-duplication and queue filtering). Import-defined columns
/// are carried in `fields` unmodified and passed through to the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRecord {
    /// Stable record identifier (never mutated by the engine)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Import-defined columns, passed through to the analyzer as-is
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PendingRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }
}

/// Classification produced by the analyzer for one record.
///
/// Created by the analyze call, consumed immediately by the save call, then
/// discarded from engine memory (not retained beyond logging).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Matches the source record's id (the backend may echo it as `record_id`)
    #[serde(alias = "record_id", deserialize_with = "string_or_number")]
    pub id: String,
    /// Classification outcome
    pub validity: Validity,
    /// Free-text justification from the analyzer
    #[serde(rename = "justificativa", default)]
    pub justification: String,
    /// Confidence score, opaque pass-through (backend decides the scale)
    #[serde(default)]
    pub score: f64,
}

/// Closed set of classification outcomes.
///
/// Serialized with the labels the records backend persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    #[serde(rename = "Válido")]
    Valid,
    #[serde(rename = "Inválido")]
    Invalid,
    #[serde(rename = "Atenção")]
    Attention,
    #[serde(rename = "Validar Manualmente")]
    NeedsManualReview,
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Validity::Valid => "Válido",
            Validity::Invalid => "Inválido",
            Validity::Attention => "Atenção",
            Validity::NeedsManualReview => "Validar Manualmente",
        };
        write!(f, "{}", label)
    }
}

/// Best-effort counters snapshot from the records backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Records still awaiting analysis
    #[serde(rename = "pendingLeads", default)]
    pub pending_count: u64,
    /// Records already analyzed
    #[serde(rename = "processedLeads", default)]
    pub processed_count: u64,
    /// Backend-assigned batch label (display only)
    #[serde(rename = "currentBatch", default)]
    pub current_batch_id: String,
    /// Forward-compatible pass-through for fields this service ignores
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// System settings snapshot from the records backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Active AI provider ("gemini", "gpt", ...)
    #[serde(default = "default_ai_provider")]
    pub ai_provider: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            ai_provider: default_ai_provider(),
            extra: Map::new(),
        }
    }
}

fn default_ai_provider() -> String {
    "gemini".to_string()
}

/// Engine log severity. Advisory metadata only; never affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    /// Analyzer-specific narration, distinguished in the operator log view
    #[serde(rename = "AI-ENGINE")]
    AiEngine,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::AiEngine => "AI-ENGINE",
        };
        write!(f, "{}", label)
    }
}

/// One timestamped engine log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Accept both `"42"` and `42` for identifiers; the backend stores integer
/// primary keys but the engine treats ids as opaque strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_record_accepts_numeric_id_and_keeps_extra_columns() {
        let json = r#"{"id": 17, "nome": "Maria", "motivo_acidente": "queda", "coluna_extra": 3}"#;
        let record: PendingRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, "17");
        assert_eq!(record.fields["nome"], "Maria");
        assert_eq!(record.fields["coluna_extra"], 3);

        // Round-trip keeps the pass-through columns for the analyzer
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["motivo_acidente"], "queda");
    }

    #[test]
    fn validity_serializes_to_backend_labels() {
        assert_eq!(
            serde_json::to_string(&Validity::Valid).unwrap(),
            "\"Válido\""
        );
        assert_eq!(
            serde_json::to_string(&Validity::NeedsManualReview).unwrap(),
            "\"Validar Manualmente\""
        );

        let parsed: Validity = serde_json::from_str("\"Atenção\"").unwrap();
        assert_eq!(parsed, Validity::Attention);
    }

    #[test]
    fn analysis_result_accepts_record_id_alias() {
        let json = r#"{"record_id": 9, "validity": "Inválido", "justificativa": "relato vazio", "score": 0.0}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.id, "9");
        assert_eq!(result.validity, Validity::Invalid);
    }

    #[test]
    fn engine_metrics_uses_backend_casing() {
        let json = r##"{"pendingLeads": 120, "processedLeads": 80, "currentBatch": "#1234"}"##;
        let metrics: EngineMetrics = serde_json::from_str(json).unwrap();
        assert_eq!(metrics.pending_count, 120);
        assert_eq!(metrics.processed_count, 80);
        assert_eq!(metrics.current_batch_id, "#1234");
    }

    #[test]
    fn log_level_labels_match_operator_view() {
        assert_eq!(LogLevel::AiEngine.to_string(), "AI-ENGINE");
        assert_eq!(serde_json::to_string(&LogLevel::Success).unwrap(), "\"SUCCESS\"");
    }
}
