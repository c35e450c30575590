// crates/types/src/view.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{ActivityRecord, AnalyticsSeriesPoint, DashboardStats, PerformanceMetric, UploadSummary};

/// Why the dashboard is showing an explicit error banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub enum ViewErrorKind {
    /// Every source failed for a non-auth reason.
    AllSourcesFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ViewError {
    pub kind: ViewErrorKind,
    pub message: String,
    /// The view offers a manual retry.
    pub retryable: bool,
}

impl ViewError {
    pub fn all_sources_failed() -> Self {
        Self {
            kind: ViewErrorKind::AllSourcesFailed,
            message: "Unable to load dashboard data. Showing the last known values.".into(),
            retryable: true,
        }
    }
}

/// Everything the dashboard screen renders, handed over by value.
///
/// Slices are replaced independently: a slice whose source failed keeps its
/// previous contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    #[serde(default)]
    pub identity_id: Option<String>,
    pub stats: DashboardStats,
    pub performance: Vec<PerformanceMetric>,
    pub activity: Vec<ActivityRecord>,
    pub uploads: Vec<UploadSummary>,
    pub analytics: Vec<AnalyticsSeriesPoint>,
    pub loading: bool,
    #[serde(default)]
    pub error: Option<ViewError>,
    pub session_expired: bool,
    #[ts(type = "string | null")]
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl DashboardView {
    /// Empty view bound to one identity.
    pub fn for_identity(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: Some(identity_id.into()),
            ..Default::default()
        }
    }
}
