// crates/types/src/activity.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// What a timeline entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Upload,
    Search,
}

/// A normalized "recent activity" entry.
///
/// Built once from a raw feed record and never mutated; the whole list is
/// replaced on the next successful merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Unique within one merged result set.
    pub id: String,
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    #[ts(type = "string")]
    pub occurred_at: DateTime<Utc>,
    /// 0.0–100.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub status: String,
}

/// One row of the "recent uploads" slice, derived from the job list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub id: String,
    pub status: String,
    /// 0.0–100.0
    pub progress: f64,
    #[ts(type = "string | null")]
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}
