// crates/core/src/normalizer.rs
//! Maps versioned backend metric payloads onto `DashboardStats` and the
//! performance cards.

use serde_json::Value;
use statboard_types::{DashboardStats, MetricCategory, PerformanceMetric};

use crate::aliases::{AliasTable, TimeUnit, TimedAlias};
use crate::payload::{as_f64, envelope_data};

/// Scale a raw confidence/percentage onto 0–100.
///
/// Values above 100 are on a 0–10000 scale and are divided by 100. The
/// result is always clamped to [0, 100].
pub fn normalize_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    let scaled = if raw > 100.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 100.0)
}

/// Stats and performance cards from one run. `None` means the source failed
/// and the caller should keep its previous slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedMetrics {
    pub stats: Option<DashboardStats>,
    pub performance: Option<Vec<PerformanceMetric>>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsNormalizer {
    aliases: AliasTable,
}

impl MetricsNormalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn normalize(&self, raw_stats: Option<&Value>, raw_metrics: Option<&Value>) -> NormalizedMetrics {
        NormalizedMetrics {
            stats: raw_stats.map(|body| self.stats(body)),
            performance: raw_metrics.map(|body| self.performance(body)),
        }
    }

    /// Build `DashboardStats` from a stats envelope. Missing fields read as zero.
    pub fn stats(&self, body: &Value) -> DashboardStats {
        let data = envelope_data(body);
        let total_uploads = count(first_number(data, &self.aliases.total_uploads));
        let successful_uploads =
            count(first_number(data, &self.aliases.successful_uploads)).min(total_uploads);

        DashboardStats {
            total_uploads,
            successful_uploads,
            avg_confidence: first_number(data, &self.aliases.avg_confidence)
                .map(normalize_confidence)
                .unwrap_or(0.0),
            avg_process_time_seconds: first_seconds(data, &self.aliases.avg_process_time)
                .unwrap_or(0.0),
        }
    }

    /// Build the three performance cards from a metrics envelope.
    pub fn performance(&self, body: &Value) -> Vec<PerformanceMetric> {
        let data = envelope_data(body);
        let accuracy = first_number(data, &self.aliases.accuracy)
            .map(normalize_confidence)
            .unwrap_or(0.0);
        let volume = count(first_number(data, &self.aliases.volume));
        let latency = first_seconds(data, &self.aliases.latency).unwrap_or(0.0);

        vec![
            PerformanceMetric {
                label: "Match Accuracy".into(),
                display_value: format!("{accuracy:.1}%"),
                change_label: change_label(data, &self.aliases.accuracy_change),
                category: MetricCategory::Accuracy,
            },
            PerformanceMetric {
                label: "Monthly Volume".into(),
                display_value: group_thousands(volume),
                change_label: change_label(data, &self.aliases.volume_change),
                category: MetricCategory::Volume,
            },
            PerformanceMetric {
                label: "Avg. Processing Time".into(),
                display_value: format_seconds(latency),
                change_label: change_label(data, &self.aliases.latency_change),
                category: MetricCategory::Latency,
            },
        ]
    }
}

fn field<'a>(data: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    data?.get(name)
}

fn first_number(data: Option<&Value>, aliases: &[String]) -> Option<f64> {
    aliases.iter().find_map(|name| field(data, name).and_then(as_f64))
}

/// First present time field, in seconds. Milliseconds become whole seconds.
fn first_seconds(data: Option<&Value>, aliases: &[TimedAlias]) -> Option<f64> {
    aliases.iter().find_map(|alias| {
        let raw = field(data, &alias.field).and_then(as_f64)?;
        let secs = match alias.unit {
            TimeUnit::Seconds => raw,
            TimeUnit::Milliseconds => (raw / 1000.0).round(),
        };
        Some(secs.max(0.0))
    })
}

fn count(value: Option<f64>) -> u64 {
    value.map(|n| n.max(0.0).round() as u64).unwrap_or(0)
}

fn change_label(data: Option<&Value>, aliases: &[String]) -> String {
    let Some(raw) = aliases.iter().find_map(|name| field(data, name)) else {
        return "0%".into();
    };
    if let Some(n) = as_f64(raw) {
        let magnitude = trim_decimal(n.abs());
        return if magnitude == "0" {
            "0%".into()
        } else if n > 0.0 {
            format!("+{magnitude}%")
        } else {
            format!("-{magnitude}%")
        };
    }
    // Some endpoints already send a formatted label.
    match raw.as_str().map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => "0%".into(),
    }
}

fn trim_decimal(n: f64) -> String {
    let s = format!("{n:.1}");
    match s.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => s,
    }
}

fn format_seconds(secs: f64) -> String {
    format!("{}s", trim_decimal(secs))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
