// crates/core/src/aliases.rs
//! Backend field-name aliases, in lookup precedence order.
//!
//! The precedence reflects which endpoint versions were deployed, not a
//! contract, so it lives in configuration and can be reordered without a
//! code change.

use serde::{Deserialize, Serialize};

/// Unit a time-valued field is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

/// A time-valued field name together with its unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAlias {
    pub field: String,
    pub unit: TimeUnit,
}

impl TimedAlias {
    pub fn seconds(field: &str) -> Self {
        Self {
            field: field.to_string(),
            unit: TimeUnit::Seconds,
        }
    }

    pub fn millis(field: &str) -> Self {
        Self {
            field: field.to_string(),
            unit: TimeUnit::Milliseconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTable {
    // Stats payload
    pub total_uploads: Vec<String>,
    pub successful_uploads: Vec<String>,
    pub avg_confidence: Vec<String>,
    pub avg_process_time: Vec<TimedAlias>,

    // Performance payload
    pub accuracy: Vec<String>,
    pub accuracy_change: Vec<String>,
    pub volume: Vec<String>,
    pub volume_change: Vec<String>,
    pub latency: Vec<TimedAlias>,
    pub latency_change: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            total_uploads: names(&["totalUploads", "totalSearches", "total_uploads", "total_searches"]),
            successful_uploads: names(&[
                "successfulUploads",
                "successfulSearches",
                "successful_uploads",
                "successful_searches",
            ]),
            avg_confidence: names(&["avgConfidence", "averageConfidence", "avg_confidence"]),
            avg_process_time: vec![
                TimedAlias::seconds("avgProcessTime"),
                TimedAlias::seconds("avgProcessingTime"),
                TimedAlias::seconds("avg_process_time"),
                TimedAlias::millis("avgResponseTime"),
                TimedAlias::millis("avg_response_time"),
            ],
            accuracy: names(&["accuracy", "matchAccuracy", "avgConfidence"]),
            accuracy_change: names(&["accuracyChange", "accuracy_change"]),
            volume: names(&["monthlyVolume", "volume", "totalSearches", "totalUploads"]),
            volume_change: names(&["volumeChange", "volume_change"]),
            latency: vec![
                TimedAlias::seconds("avgProcessTime"),
                TimedAlias::millis("avgResponseTime"),
                TimedAlias::millis("responseTime"),
                TimedAlias::millis("avg_response_time"),
            ],
            latency_change: names(&["latencyChange", "responseTimeChange", "latency_change"]),
        }
    }
}
