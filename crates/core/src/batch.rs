// crates/core/src/batch.rs
//! Tagged settle-all results for one orchestration run.

use serde_json::Value;
use statboard_types::SourceKind;

use crate::error::FetchError;

/// The settled outcome of one source.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub source: SourceKind,
    pub outcome: Result<Value, FetchError>,
}

impl SourceResult {
    pub fn ok(source: SourceKind, payload: Value) -> Self {
        Self {
            source,
            outcome: Ok(payload),
        }
    }

    pub fn err(source: SourceKind, error: FetchError) -> Self {
        Self {
            source,
            outcome: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Every source's result from one run, in the order the sources were issued.
#[derive(Debug, Clone, Default)]
pub struct ResultBatch {
    results: Vec<SourceResult>,
}

impl ResultBatch {
    pub fn new(results: Vec<SourceResult>) -> Self {
        Self { results }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Payload for `source`, or `None` if it failed or was not part of the batch.
    pub fn payload(&self, source: SourceKind) -> Option<&Value> {
        self.results
            .iter()
            .find(|r| r.source == source)
            .and_then(|r| r.outcome.as_ref().ok())
    }

    pub fn failed_sources(&self) -> Vec<SourceKind> {
        self.results
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.source)
            .collect()
    }

    /// True when any source gave up because its run no longer applies.
    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(&r.outcome, Err(e) if e.is_cancelled()))
    }

    /// True when the batch is non-empty and no source produced a payload.
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| !r.is_ok())
    }
}

impl FromIterator<SourceResult> for ResultBatch {
    fn from_iter<I: IntoIterator<Item = SourceResult>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
