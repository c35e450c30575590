// crates/core/src/payload.rs
//! Backend response envelopes and the raw record shapes they carry.
//!
//! Backends wrap payloads as `{success, data}`; older endpoints omit
//! `success` and some nest lists one level deeper. Everything here is
//! lenient: unknown or malformed fields read as absent instead of failing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use statboard_types::AnalyticsSeriesPoint;

use crate::error::FetchError;

/// Unix timestamps above this are treated as milliseconds.
const MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

// ── Raw feed records ────────────────────────────────────────────────────

/// An entry from the activity feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActivity {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub details: Option<RawActivityDetails>,
    #[serde(default)]
    pub created_at: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActivityDetails {
    #[serde(default)]
    pub confidence: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// An entry from the job list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJob {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Value,
    #[serde(default)]
    pub completed_at: Value,
    #[serde(default)]
    pub created_at: Value,
    #[serde(default, alias = "filename", alias = "original_filename")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub confidence: Value,
}

impl RawJob {
    /// When the job finished, falling back to when it was created.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.completed_at).or_else(|| parse_timestamp(&self.created_at))
    }
}

// ── Envelope handling ───────────────────────────────────────────────────

/// Reject `{success: false}` envelopes; pass everything else through.
pub fn check_envelope(body: Value) -> Result<Value, FetchError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("error")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("request unsuccessful")
            .to_string();
        return Err(FetchError::Rejected { message });
    }
    Ok(body)
}

/// The `data` member of an envelope, if present and not null.
pub fn envelope_data(body: &Value) -> Option<&Value> {
    body.get("data").filter(|d| !d.is_null())
}

/// Activity feed: `{success, data: {activities: [...]}}`.
pub fn activities(body: &Value) -> Vec<RawActivity> {
    let list = envelope_data(body).and_then(|d| d.get("activities"));
    records(list, "activity")
}

/// Job list: `{data: {data: [...]}}` or `{data: {jobs: [...]}}`.
pub fn jobs(body: &Value) -> Vec<RawJob> {
    let list = envelope_data(body).and_then(|d| {
        if d.is_array() {
            Some(d)
        } else {
            d.get("data").filter(|v| v.is_array()).or_else(|| d.get("jobs"))
        }
    });
    records(list, "job")
}

/// Analytics series: `{success, data: {series: [...]}}`, passed through as-is.
pub fn analytics_series(body: &Value) -> Vec<AnalyticsSeriesPoint> {
    envelope_data(body)
        .and_then(|d| d.get("series"))
        .and_then(Value::as_array)
        .map(|points| points.iter().cloned().map(AnalyticsSeriesPoint).collect())
        .unwrap_or_default()
}

fn records<T: for<'de> Deserialize<'de>>(list: Option<&Value>, kind: &str) -> Vec<T> {
    let Some(items) = list.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(kind, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

// ── Scalar helpers ──────────────────────────────────────────────────────

/// A finite number from a JSON number or numeric string.
pub fn as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// A non-empty identifier from a JSON string or number.
pub fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339 / `YYYY-MM-DD HH:MM:SS` strings (UTC) or unix seconds/millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(_) => {
            let n = as_f64(value)?;
            if n < 0.0 {
                return None;
            }
            let millis = if n >= MILLIS_THRESHOLD { n } else { n * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}
