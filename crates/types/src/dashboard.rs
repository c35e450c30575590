// crates/types/src/dashboard.rs
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Headline counters shown at the top of the dashboard.
///
/// `successful_uploads` never exceeds `total_uploads`; the normalizer
/// enforces this when building the record from backend payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[ts(type = "number")]
    pub total_uploads: u64,
    #[ts(type = "number")]
    pub successful_uploads: u64,
    /// 0.0–100.0
    pub avg_confidence: f64,
    pub avg_process_time_seconds: f64,
}

impl DashboardStats {
    /// Share of uploads that succeeded, as a percentage. Zero when there are no uploads.
    pub fn success_rate(&self) -> f64 {
        if self.total_uploads == 0 {
            return 0.0;
        }
        (self.successful_uploads as f64 / self.total_uploads as f64) * 100.0
    }
}

/// Which card group a performance metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Accuracy,
    Volume,
    Latency,
}

/// One pre-formatted performance card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub label: String,
    pub display_value: String,
    pub change_label: String,
    pub category: MetricCategory,
}

/// Opaque chart datum, passed through from the analytics source untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(transparent)]
pub struct AnalyticsSeriesPoint(#[ts(type = "unknown")] pub serde_json::Value);
