// crates/core/src/activity.rs
//! Merges the activity feed and the job list into one recent-activity
//! timeline, and derives the recent-uploads slice from the job list.

use std::collections::HashSet;

use statboard_types::{ActivityKind, ActivityRecord, UploadSummary};

use crate::normalizer::normalize_confidence;
use crate::payload::{as_f64, as_id, parse_timestamp, RawActivity, RawJob};

/// Job statuses that count as finished for the timeline.
const TERMINAL_JOB_STATUSES: &[&str] = &["completed", "complete", "done", "succeeded", "success", "finished"];

/// Default number of timeline entries the dashboard shows.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 5;

/// Result of one merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedActivity {
    pub records: Vec<ActivityRecord>,
    /// How many of the two feeds failed to fetch (0, 1 or 2).
    pub failed_feeds: usize,
}

impl MergedActivity {
    /// Both feeds failed: there is nothing to show and nothing to overwrite with.
    pub fn all_feeds_failed(&self) -> bool {
        self.failed_feeds == 2
    }

    /// At least one feed failed, so an empty result may just mean "unknown".
    pub fn is_degraded(&self) -> bool {
        self.failed_feeds > 0
    }
}

#[derive(Debug, Clone)]
pub struct ActivityMerger {
    limit: usize,
}

impl Default for ActivityMerger {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_LIMIT)
    }
}

impl ActivityMerger {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Merge both feeds. `None` means the feed failed to fetch; `Some(&[])`
    /// means it genuinely had no activity.
    ///
    /// Output is newest first, ties kept in feed order (activity feed before
    /// jobs), de-duplicated by id and capped at the configured limit.
    pub fn merge(&self, activities: Option<&[RawActivity]>, jobs: Option<&[RawJob]>) -> MergedActivity {
        let failed_feeds = usize::from(activities.is_none()) + usize::from(jobs.is_none());

        let mut records: Vec<ActivityRecord> = activities
            .unwrap_or_default()
            .iter()
            .filter_map(from_activity)
            .chain(jobs.unwrap_or_default().iter().filter_map(from_job))
            .collect();

        // Stable: equal timestamps keep source order.
        records.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let mut seen = HashSet::new();
        records.retain(|r| seen.insert(r.id.clone()));
        records.truncate(self.limit);

        MergedActivity { records, failed_feeds }
    }
}

/// Recent uploads from the job list, newest first, capped at `limit`.
pub fn summarize_uploads(jobs: &[RawJob], limit: usize) -> Vec<UploadSummary> {
    let mut uploads: Vec<UploadSummary> = jobs
        .iter()
        .filter_map(|job| {
            Some(UploadSummary {
                id: as_id(&job.id)?,
                status: job.status.as_deref().map(str::to_lowercase).unwrap_or_else(|| "unknown".into()),
                progress: as_f64(&job.progress).map(|p| p.clamp(0.0, 100.0)).unwrap_or(0.0),
                occurred_at: job.occurred_at(),
            })
        })
        .collect();
    // `None` timestamps sort last.
    uploads.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    uploads.truncate(limit);
    uploads
}

fn is_terminal(status: Option<&str>) -> bool {
    status.is_some_and(|s| {
        let s = s.trim();
        TERMINAL_JOB_STATUSES.iter().any(|t| t.eq_ignore_ascii_case(s))
    })
}

fn activity_kind(resource_type: Option<&str>) -> ActivityKind {
    match resource_type.map(str::to_lowercase) {
        Some(t) if t.contains("upload") || t == "job" || t == "image" || t == "file" => ActivityKind::Upload,
        _ => ActivityKind::Search,
    }
}

fn title_for(kind: ActivityKind, action: Option<&str>) -> String {
    let noun = match kind {
        ActivityKind::Upload => "Upload",
        ActivityKind::Search => "Search",
    };
    match action.map(str::trim).filter(|a| !a.is_empty()) {
        Some(action) => format!("{noun} {}", action.replace('_', " ").to_lowercase()),
        None => noun.to_string(),
    }
}

fn from_activity(raw: &RawActivity) -> Option<ActivityRecord> {
    let id = as_id(&raw.id)?;
    let occurred_at = parse_timestamp(&raw.created_at)?;
    let kind = activity_kind(raw.resource_type.as_deref());
    let details = raw.details.as_ref();

    Some(ActivityRecord {
        id: format!("activity:{id}"),
        kind,
        title: title_for(kind, raw.action.as_deref()),
        description: details.and_then(|d| d.description.clone()).unwrap_or_default(),
        occurred_at,
        confidence: details.and_then(|d| as_f64(&d.confidence)).map(normalize_confidence),
        status: details
            .and_then(|d| d.status.as_deref())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "unknown".into()),
    })
}

fn from_job(raw: &RawJob) -> Option<ActivityRecord> {
    if !is_terminal(raw.status.as_deref()) {
        return None;
    }
    let id = as_id(&raw.id)?;
    let occurred_at = raw.occurred_at()?;

    Some(ActivityRecord {
        description: raw.file_name.clone().unwrap_or_else(|| format!("Job {id}")),
        id: format!("job:{id}"),
        kind: ActivityKind::Upload,
        title: "Upload processed".into(),
        occurred_at,
        confidence: as_f64(&raw.confidence).map(normalize_confidence),
        status: raw.status.as_deref().unwrap_or_default().trim().to_lowercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn activity(id: i64, at: &str) -> RawActivity {
        RawActivity {
            id: json!(id),
            resource_type: Some("search".into()),
            action: Some("completed".into()),
            details: None,
            created_at: json!(at),
        }
    }

    fn job(id: i64, status: &str, at: &str) -> RawJob {
        RawJob {
            id: json!(id),
            status: Some(status.into()),
            completed_at: json!(at),
            ..Default::default()
        }
    }

    fn ids(merged: &MergedActivity) -> Vec<&str> {
        merged.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_merge_sorts_newest_first_across_feeds() {
        let activities = vec![activity(1, "2026-01-01T10:00:00Z"), activity(2, "2026-01-01T12:00:00Z")];
        let jobs = vec![job(7, "completed", "2026-01-01T11:00:00Z")];

        let merged = ActivityMerger::new(5).merge(Some(&activities), Some(&jobs));
        assert_eq!(ids(&merged), vec!["activity:2", "job:7", "activity:1"]);
        assert_eq!(merged.failed_feeds, 0);
    }

    #[test]
    fn test_ties_keep_source_order() {
        let at = "2026-01-01T10:00:00Z";
        let activities = vec![activity(1, at), activity(2, at)];
        let jobs = vec![job(3, "done", at)];

        let merged = ActivityMerger::new(5).merge(Some(&activities), Some(&jobs));
        assert_eq!(ids(&merged), vec!["activity:1", "activity:2", "job:3"]);
    }

    #[test]
    fn test_only_terminal_jobs_are_included() {
        let at = "2026-01-01T10:00:00Z";
        let jobs = vec![
            job(1, "processing", at),
            job(2, "Completed", at),
            job(3, "queued", at),
            job(4, "failed", at),
        ];
        let merged = ActivityMerger::new(5).merge(Some(&[]), Some(&jobs));
        assert_eq!(ids(&merged), vec!["job:2"]);
        assert_eq!(merged.records[0].status, "completed");
    }

    #[test]
    fn test_activity_feed_ignores_status() {
        let mut pending = activity(1, "2026-01-01T10:00:00Z");
        pending.details = Some(payload::RawActivityDetails {
            status: Some("pending".into()),
            ..Default::default()
        });
        let merged = ActivityMerger::new(5).merge(Some(&[pending]), Some(&[]));
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].status, "pending");
    }

    #[test]
    fn test_truncates_to_limit() {
        let activities: Vec<RawActivity> = (0..10)
            .map(|i| activity(i, &format!("2026-01-01T10:{:02}:00Z", i)))
            .collect();
        let merged = ActivityMerger::new(3).merge(Some(&activities), Some(&[]));
        assert_eq!(ids(&merged), vec!["activity:9", "activity:8", "activity:7"]);
    }

    #[test]
    fn test_failed_job_feed_uses_activity_feed_only() {
        let activities = vec![activity(1, "2026-01-01T10:00:00Z"), activity(2, "2026-01-02T10:00:00Z")];
        let merged = ActivityMerger::new(5).merge(Some(&activities), None);
        assert_eq!(ids(&merged), vec!["activity:2", "activity:1"]);
        assert!(merged.is_degraded());
        assert!(!merged.all_feeds_failed());
    }

    #[test]
    fn test_failed_feed_differs_from_empty_feed() {
        let empty = ActivityMerger::new(5).merge(Some(&[]), Some(&[]));
        let failed = ActivityMerger::new(5).merge(None, None);
        assert!(empty.records.is_empty() && !empty.is_degraded());
        assert!(failed.records.is_empty() && failed.all_feeds_failed());
    }

    #[test]
    fn test_duplicate_ids_keep_most_recent() {
        let activities = vec![activity(1, "2026-01-01T10:00:00Z"), activity(1, "2026-01-03T10:00:00Z")];
        let merged = ActivityMerger::new(5).merge(Some(&activities), Some(&[]));
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].occurred_at.to_rfc3339(), "2026-01-03T10:00:00+00:00");
    }

    #[test]
    fn test_same_raw_id_in_both_feeds_stays_distinct() {
        let at = "2026-01-01T10:00:00Z";
        let merged = ActivityMerger::new(5).merge(Some(&[activity(5, at)]), Some(&[job(5, "completed", at)]));
        assert_eq!(ids(&merged), vec!["activity:5", "job:5"]);
    }

    #[test]
    fn test_confidence_is_normalized_in_both_feeds() {
        let body = json!({"success": true, "data": {"activities": [{
            "id": "a1",
            "resource_type": "search",
            "action": "face_match",
            "details": {"confidence": 9250, "description": "Matched 3 photos", "status": "completed"},
            "created_at": "2026-02-01T09:00:00Z"
        }]}});
        let activities = payload::activities(&body);
        let mut j = job(9, "completed", "2026-02-01T08:00:00Z");
        j.confidence = json!(64.5);
        j.file_name = Some("beach.jpg".into());

        let merged = ActivityMerger::new(5).merge(Some(&activities), Some(&[j]));
        let first = &merged.records[0];
        assert_eq!(first.title, "Search face match");
        assert_eq!(first.description, "Matched 3 photos");
        assert_eq!(first.confidence, Some(92.5));
        assert_eq!(first.kind, ActivityKind::Search);

        let second = &merged.records[1];
        assert_eq!(second.kind, ActivityKind::Upload);
        assert_eq!(second.description, "beach.jpg");
        assert_eq!(second.confidence, Some(64.5));
    }

    #[test]
    fn test_job_falls_back_to_created_at() {
        let j = RawJob {
            id: json!(1),
            status: Some("completed".into()),
            created_at: json!("2026-01-05T00:00:00Z"),
            ..Default::default()
        };
        let merged = ActivityMerger::new(5).merge(None, Some(&[j]));
        assert_eq!(merged.records.len(), 1);
    }

    #[test]
    fn test_records_without_timestamp_or_id_are_skipped() {
        let no_time = RawActivity {
            id: json!(1),
            ..Default::default()
        };
        let no_id = RawActivity {
            created_at: json!("2026-01-01T00:00:00Z"),
            ..Default::default()
        };
        let merged = ActivityMerger::new(5).merge(Some(&[no_time, no_id]), Some(&[]));
        assert!(merged.records.is_empty());
    }

    #[test]
    fn test_summarize_uploads() {
        let jobs = vec![
            RawJob {
                id: json!("a"),
                status: Some("PROCESSING".into()),
                progress: json!(140),
                created_at: json!("2026-01-01T00:00:00Z"),
                ..Default::default()
            },
            job(2, "completed", "2026-01-02T00:00:00Z"),
            RawJob {
                id: json!(3),
                ..Default::default()
            },
        ];
        let uploads = summarize_uploads(&jobs, 10);
        assert_eq!(uploads.len(), 3);
        assert_eq!(uploads[0].id, "2");
        assert_eq!(uploads[1].id, "a");
        assert_eq!(uploads[1].status, "processing");
        assert_eq!(uploads[1].progress, 100.0);
        assert_eq!(uploads[2].status, "unknown");
        assert!(uploads[2].occurred_at.is_none());

        assert_eq!(summarize_uploads(&jobs, 1).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_merge_is_sorted_and_bounded(
            activity_times in proptest::collection::vec(0i64..1_000_000, 0..20),
            job_times in proptest::collection::vec(0i64..1_000_000, 0..20),
            limit in 1usize..8,
        ) {
            let activities: Vec<RawActivity> = activity_times
                .iter()
                .enumerate()
                .map(|(i, t)| RawActivity { id: json!(i), created_at: json!(t), ..Default::default() })
                .collect();
            let jobs: Vec<RawJob> = job_times
                .iter()
                .enumerate()
                .map(|(i, t)| RawJob {
                    id: json!(i),
                    status: Some("completed".into()),
                    completed_at: json!(t),
                    ..Default::default()
                })
                .collect();

            let merged = ActivityMerger::new(limit).merge(Some(&activities), Some(&jobs));
            prop_assert!(merged.records.len() <= limit);
            prop_assert!(merged.records.windows(2).all(|w| w[0].occurred_at >= w[1].occurred_at));
            prop_assert_eq!(merged.records.len(), limit.min(activity_times.len() + job_times.len()));
        }

        #[test]
        fn prop_one_failed_feed_keeps_the_other(
            times in proptest::collection::vec(0i64..1_000_000, 1..10),
        ) {
            let activities: Vec<RawActivity> = times
                .iter()
                .enumerate()
                .map(|(i, t)| RawActivity { id: json!(i), created_at: json!(t), ..Default::default() })
                .collect();
            let merged = ActivityMerger::new(5).merge(Some(&activities), None);
            prop_assert!(!merged.records.is_empty());
            prop_assert_eq!(merged.failed_feeds, 1);
        }
    }
}
