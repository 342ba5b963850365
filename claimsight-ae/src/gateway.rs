//! Records backend gateway
//!
//! The engine never talks to storage or the AI provider directly; everything
//! goes through the records backend REST API. `BackendGateway` is the seam
//! the engine loop depends on, `HttpGateway` the production implementation.
//!
//! Failure contract (per operation):
//! - `fetch_pending`: `Err` = network/5xx; an empty Vec is a valid "nothing
//!   to do right now" outcome, not an error.
//! - `analyze_batch`: `Ok(None)` = recoverable request-level failure,
//!   distinct from `Ok(Some(vec![]))` (request succeeded, no valid
//!   classifications).
//! - `save_results`: returns the ids durably persisted; an empty list is a
//!   recoverable save failure. Results the backend cannot key are excluded
//!   from the returned list, so callers only strip what was actually saved.
//! - `get_metrics` / `get_settings`: best-effort; failures never abort a
//!   cycle, callers keep their last-known values.

use async_trait::async_trait;
use claimsight_common::types::{AnalysisResult, BackendSettings, EngineMetrics, PendingRecord};
use claimsight_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Operations the analysis engine requires from the records backend.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Fetch up to `limit` records currently awaiting analysis.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<PendingRecord>>;

    /// Run AI classification over one sub-batch.
    async fn analyze_batch(
        &self,
        records: &[PendingRecord],
    ) -> Result<Option<Vec<AnalysisResult>>>;

    /// Persist analysis results. Returns the ids that were durably saved;
    /// an empty list signals a recoverable save failure.
    async fn save_results(&self, results: &[AnalysisResult]) -> Result<Vec<String>>;

    /// Best-effort counters snapshot.
    async fn get_metrics(&self) -> Result<EngineMetrics>;

    /// System settings (AI provider selection).
    async fn get_settings(&self) -> Result<BackendSettings>;
}

/// HTTP implementation of [`BackendGateway`] using reqwest.
///
/// Each call carries the client-wide timeout configured at construction;
/// AI analysis of a full sub-batch can take minutes, so the default is
/// generous. A timeout surfaces as the same `Err` path as any other
/// network failure.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client construction failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Paginated record listing as returned by `GET /records`.
#[derive(Debug, Deserialize)]
struct RecordPage {
    items: Vec<PendingRecord>,
}

/// Payload shape expected by `POST /analyses/batch`.
///
/// The backend keys analyses by integer `record_id` and stores the validity
/// label under `status`; `validity` is echoed alongside for compatibility.
#[derive(Debug, Serialize)]
struct SaveAnalysisPayload<'a> {
    record_id: i64,
    status: claimsight_common::types::Validity,
    justificativa: &'a str,
    score: f64,
    validity: claimsight_common::types::Validity,
}

/// Map results onto the backend payload, keeping only ids the backend can
/// key (integer primary keys). Returns the payload and the ids it covers;
/// the ids of skipped results never reach the caller's saved set.
fn build_save_payload(results: &[AnalysisResult]) -> (Vec<SaveAnalysisPayload<'_>>, Vec<String>) {
    let mut payload = Vec::with_capacity(results.len());
    let mut ids = Vec::with_capacity(results.len());
    for r in results {
        match r.id.parse::<i64>() {
            Ok(record_id) => {
                payload.push(SaveAnalysisPayload {
                    record_id,
                    status: r.validity,
                    justificativa: &r.justification,
                    score: r.score,
                    validity: r.validity,
                });
                ids.push(r.id.clone());
            }
            Err(_) => {
                warn!(id = %r.id, "Skipping result with non-numeric record id");
            }
        }
    }
    (payload, ids)
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<PendingRecord>> {
        let url = format!(
            "{}?limit={}&status=pending_analysis",
            self.url("/records"),
            limit
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(backend_err)?
            .error_for_status()
            .map_err(backend_err)?;

        let page: RecordPage = response.json().await.map_err(backend_err)?;
        Ok(page.items)
    }

    async fn analyze_batch(
        &self,
        records: &[PendingRecord],
    ) -> Result<Option<Vec<AnalysisResult>>> {
        let response = self
            .client
            .post(self.url("/engine/analyze"))
            .json(&records)
            .send()
            .await
            .map_err(backend_err)?
            .error_for_status()
            .map_err(backend_err)?;

        // The analyze endpoint reports request-level failures in the body
        // (non-array JSON) rather than with an error status.
        let body: Value = response.json().await.map_err(backend_err)?;
        match body {
            Value::Array(_) => {
                let results: Vec<AnalysisResult> = serde_json::from_value(body)
                    .map_err(|e| Error::Backend(format!("Malformed analysis response: {}", e)))?;
                Ok(Some(results))
            }
            _ => Ok(None),
        }
    }

    async fn save_results(&self, results: &[AnalysisResult]) -> Result<Vec<String>> {
        let (payload, ids) = build_save_payload(results);

        if payload.is_empty() {
            return Ok(Vec::new());
        }

        self.client
            .post(self.url("/analyses/batch"))
            .json(&payload)
            .send()
            .await
            .map_err(backend_err)?
            .error_for_status()
            .map_err(backend_err)?;

        Ok(ids)
    }

    async fn get_metrics(&self) -> Result<EngineMetrics> {
        let response = self
            .client
            .get(self.url("/engine/metrics"))
            .send()
            .await
            .map_err(backend_err)?
            .error_for_status()
            .map_err(backend_err)?;

        response.json().await.map_err(backend_err)
    }

    async fn get_settings(&self) -> Result<BackendSettings> {
        let response = self
            .client
            .get(self.url("/settings"))
            .send()
            .await
            .map_err(backend_err)?
            .error_for_status()
            .map_err(backend_err)?;

        response.json().await.map_err(backend_err)
    }
}

fn backend_err(e: reqwest::Error) -> Error {
    Error::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimsight_common::types::Validity;

    fn result(id: &str, validity: Validity) -> AnalysisResult {
        AnalysisResult {
            id: id.to_string(),
            validity,
            justification: "relato incompleto".to_string(),
            score: 0.55,
        }
    }

    #[test]
    fn save_payload_uses_backend_field_names() {
        let results = vec![result("42", Validity::Attention)];
        let (payload, ids) = build_save_payload(&results);
        assert_eq!(ids, vec!["42".to_string()]);

        let json = serde_json::to_value(&payload[0]).unwrap();
        assert_eq!(json["record_id"], 42);
        assert_eq!(json["status"], "Atenção");
        assert_eq!(json["justificativa"], "relato incompleto");
        assert_eq!(json["validity"], "Atenção");
    }

    #[test]
    fn non_numeric_ids_are_excluded_from_payload_and_saved_set() {
        let results = vec![
            result("42", Validity::Valid),
            result("lead-temp", Validity::Valid),
            result("7", Validity::Invalid),
        ];

        let (payload, ids) = build_save_payload(&results);

        // The unkeyable result is neither sent nor reported as saved
        assert_eq!(payload.len(), 2);
        assert_eq!(ids, vec!["42".to_string(), "7".to_string()]);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let gateway =
            HttpGateway::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.url("/engine/metrics"), "http://localhost:8000/engine/metrics");
    }
}
