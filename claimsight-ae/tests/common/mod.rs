//! Shared test helpers: a scriptable in-memory backend gateway.

// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use claimsight_ae::gateway::BackendGateway;
use claimsight_common::types::{
    AnalysisResult, BackendSettings, EngineMetrics, PendingRecord, Validity,
};
use claimsight_common::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted response for `fetch_pending`. When the script runs out the
/// gateway keeps answering with an empty page.
pub enum FetchStep {
    Records(Vec<PendingRecord>),
    Empty,
    Fail,
}

/// How `analyze_batch` behaves.
#[derive(Clone, Copy)]
pub enum AnalyzeMode {
    /// Return one Valid result per input record
    Echo,
    /// Request-level failure reported in the body: `Ok(None)`
    RequestFailure,
    /// Request succeeded but produced no classifications
    EmptyResults,
    /// Transport failure
    NetworkError,
    /// First call fails request-level (`Ok(None)`), every later call echoes
    NullFirst,
}

/// How `save_results` behaves.
#[derive(Clone, Copy)]
pub enum SaveMode {
    Accept,
    /// Backend persisted nothing: empty saved-id list
    Reject,
    NetworkError,
    /// First call errors, every later call accepts
    FailFirst,
    /// Persists every result except the last one in the batch
    DropLast,
}

pub struct MockGateway {
    pub fetch_script: Mutex<VecDeque<FetchStep>>,
    pub analyze_mode: Mutex<AnalyzeMode>,
    pub save_mode: Mutex<SaveMode>,
    /// Value reported as `pendingLeads` by `get_metrics`
    pub pending_count: AtomicU64,
    pub ai_provider: Mutex<String>,
    pub fetch_calls: AtomicUsize,
    pub analyze_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            fetch_script: Mutex::new(VecDeque::new()),
            analyze_mode: Mutex::new(AnalyzeMode::Echo),
            save_mode: Mutex::new(SaveMode::Accept),
            pending_count: AtomicU64::new(0),
            ai_provider: Mutex::new("gemini".to_string()),
            fetch_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
        }
    }
}

impl MockGateway {
    pub fn push_fetch(&self, step: FetchStep) {
        self.fetch_script.lock().unwrap().push_back(step);
    }

    pub fn set_analyze_mode(&self, mode: AnalyzeMode) {
        *self.analyze_mode.lock().unwrap() = mode;
    }

    pub fn set_save_mode(&self, mode: SaveMode) {
        *self.save_mode.lock().unwrap() = mode;
    }

    fn consume_pending(&self, n: u64) {
        let _ = self
            .pending_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(n))
            });
    }
}

/// Build a pending record with a numeric id, as the backend serves them.
pub fn record(id: u64) -> PendingRecord {
    PendingRecord::new(id.to_string())
}

pub fn records(ids: std::ops::Range<u64>) -> Vec<PendingRecord> {
    ids.map(record).collect()
}

#[async_trait]
impl BackendGateway for MockGateway {
    async fn fetch_pending(&self, _limit: usize) -> Result<Vec<PendingRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.fetch_script.lock().unwrap().pop_front() {
            Some(FetchStep::Records(batch)) => Ok(batch),
            Some(FetchStep::Empty) | None => Ok(Vec::new()),
            Some(FetchStep::Fail) => Err(Error::Backend("connection refused".to_string())),
        }
    }

    async fn analyze_batch(
        &self,
        records: &[PendingRecord],
    ) -> Result<Option<Vec<AnalysisResult>>> {
        let call = self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let echo = || {
            records
                .iter()
                .map(|r| AnalysisResult {
                    id: r.id.clone(),
                    validity: Validity::Valid,
                    justification: "registro consistente".to_string(),
                    score: 0.9,
                })
                .collect()
        };
        match *self.analyze_mode.lock().unwrap() {
            AnalyzeMode::Echo => Ok(Some(echo())),
            AnalyzeMode::RequestFailure => Ok(None),
            AnalyzeMode::EmptyResults => Ok(Some(Vec::new())),
            AnalyzeMode::NetworkError => Err(Error::Backend("analyze timed out".to_string())),
            AnalyzeMode::NullFirst => {
                if call == 0 {
                    Ok(None)
                } else {
                    Ok(Some(echo()))
                }
            }
        }
    }

    async fn save_results(&self, results: &[AnalysisResult]) -> Result<Vec<String>> {
        let call = self.save_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.save_mode.lock().unwrap();
        let all_ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        match mode {
            SaveMode::Accept => {
                self.consume_pending(all_ids.len() as u64);
                Ok(all_ids)
            }
            SaveMode::Reject => Ok(Vec::new()),
            SaveMode::NetworkError => Err(Error::Backend("save failed".to_string())),
            SaveMode::FailFirst => {
                if call == 0 {
                    Err(Error::Backend("save failed".to_string()))
                } else {
                    self.consume_pending(all_ids.len() as u64);
                    Ok(all_ids)
                }
            }
            SaveMode::DropLast => {
                let keep = all_ids.len().saturating_sub(1);
                self.consume_pending(keep as u64);
                Ok(all_ids.into_iter().take(keep).collect())
            }
        }
    }

    async fn get_metrics(&self) -> Result<EngineMetrics> {
        Ok(EngineMetrics {
            pending_count: self.pending_count.load(Ordering::SeqCst),
            processed_count: 0,
            current_batch_id: "#1".to_string(),
            extra: Default::default(),
        })
    }

    async fn get_settings(&self) -> Result<BackendSettings> {
        Ok(BackendSettings {
            ai_provider: self.ai_provider.lock().unwrap().clone(),
            extra: Default::default(),
        })
    }
}
