// crates/server/src/coordinator.rs
//! Orchestrates one dashboard refresh: all sources in parallel, settle-all,
//! normalize and merge, auth scan, then view and cache updates.
//!
//! The most recently started session is authoritative. Every write to the
//! view or the cache re-checks that the writing session is still the active
//! one, so a superseded run can never overwrite a newer result.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use statboard_core::{
    payload, summarize_uploads, ActivityMerger, AuthErrorHandler, DashboardConfig, MetricsNormalizer,
    ResultBatch, SessionTerminator, SourceResult,
};
use statboard_db::{CacheSlice, CacheStore};
use statboard_types::{
    ActivityRecord, AnalyticsSeriesPoint, DashboardStats, DashboardView, PerformanceMetric, SourceKind,
    UploadSummary, ViewError,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fetcher::SourceFetcher;
use crate::identity::IdentityProvider;
use crate::metrics;

/// What triggered a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshTrigger {
    /// First load after mount; the loading indicator may show.
    pub is_initial_load: bool,
    /// Cancel an in-flight run instead of being skipped by it.
    pub supersede: bool,
}

impl RefreshTrigger {
    pub fn initial() -> Self {
        Self {
            is_initial_load: true,
            supersede: false,
        }
    }

    pub fn manual() -> Self {
        Self::default()
    }

    pub fn superseding() -> Self {
        Self {
            is_initial_load: false,
            supersede: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RefreshOutcome {
    /// The identity provider is not ready, or reports a different identity.
    NotReady,
    /// Another run is in flight and no supersede was requested.
    Skipped,
    Applied {
        #[serde(rename = "failedSources")]
        failed_sources: Vec<SourceKind>,
    },
    /// A newer session (or an unmount) took over before this one finished.
    Superseded,
    AuthExpired,
    AllFailed,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::NotReady => "not_ready",
            RefreshOutcome::Skipped => "skipped",
            RefreshOutcome::Applied { .. } => "applied",
            RefreshOutcome::Superseded => "superseded",
            RefreshOutcome::AuthExpired => "auth_expired",
            RefreshOutcome::AllFailed => "all_failed",
        }
    }
}

/// Coordinator lifecycle. The session id is the staleness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching(u64),
    Applying(u64),
}

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    identity_id: String,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    last_session_id: u64,
    active: Option<ActiveSession>,
    /// Bumped by mount/unmount/sign-out so stale cache hydration is dropped.
    mount_generation: u64,
    /// No run has completed since the current mount.
    awaiting_first_completion: bool,
}

/// Slices produced by one run. `None` keeps the previous value.
#[derive(Debug, Default)]
struct Slices {
    stats: Option<DashboardStats>,
    performance: Option<Vec<PerformanceMetric>>,
    activity: Option<Vec<ActivityRecord>>,
    uploads: Option<Vec<UploadSummary>>,
    analytics: Option<Vec<AnalyticsSeriesPoint>>,
}

pub struct RequestCoordinator {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    cache: CacheStore,
    identity: Arc<dyn IdentityProvider>,
    terminator: Arc<dyn SessionTerminator>,
    normalizer: MetricsNormalizer,
    merger: ActivityMerger,
    auth: AuthErrorHandler,
    upload_limit: usize,
    inner: Mutex<Inner>,
    view: watch::Sender<DashboardView>,
}

impl RequestCoordinator {
    pub fn new(
        config: &DashboardConfig,
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        cache: CacheStore,
        identity: Arc<dyn IdentityProvider>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        let (view, _) = watch::channel(DashboardView::default());
        Self {
            fetchers,
            cache,
            identity,
            terminator,
            normalizer: MetricsNormalizer::new(config.aliases.clone()),
            merger: ActivityMerger::new(config.activity_limit),
            auth: AuthErrorHandler,
            upload_limit: config.upload_limit,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                last_session_id: 0,
                active: None,
                mount_generation: 0,
                awaiting_first_completion: false,
            }),
            view,
        }
    }

    /// Current view-state, by value.
    pub fn view(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.view.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("Coordinator mutex poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Start a mount lifetime for `identity_id`: cancel any in-flight run,
    /// reset the view if it belonged to someone else, re-arm the loading
    /// indicator and hydrate each slice from the cache.
    pub async fn mount(&self, identity_id: &str) {
        let generation = {
            let mut inner = self.lock();
            cancel_active(&mut inner);
            inner.mount_generation += 1;
            inner.awaiting_first_completion = true;
            self.view.send_modify(|view| {
                if view.identity_id.as_deref() != Some(identity_id) {
                    *view = DashboardView::for_identity(identity_id);
                }
                view.loading = true;
                view.session_expired = false;
            });
            inner.mount_generation
        };
        debug!(identity_id, "Dashboard mounted");

        let hydrated = Slices {
            stats: self.cache.get_slice(identity_id, CacheSlice::Stats).await,
            performance: self.cache.get_slice(identity_id, CacheSlice::Performance).await,
            activity: self.cache.get_slice(identity_id, CacheSlice::Activity).await,
            uploads: self.cache.get_slice(identity_id, CacheSlice::Uploads).await,
            analytics: self.cache.get_slice(identity_id, CacheSlice::Analytics).await,
        };

        // Network results that landed first are fresher than the cache.
        let inner = self.lock();
        if inner.mount_generation == generation && inner.awaiting_first_completion {
            self.view.send_modify(|view| apply_slices(view, hydrated));
        }
    }

    /// Leave the dashboard: cancel in-flight work and go idle.
    pub fn unmount(&self) {
        let mut inner = self.lock();
        cancel_active(&mut inner);
        inner.mount_generation += 1;
        inner.awaiting_first_completion = false;
        self.view.send_modify(|view| view.loading = false);
    }

    /// Explicit user sign-out: cancel, forget the cached snapshots of
    /// `identity_id` and clear the view.
    pub async fn sign_out(&self, identity_id: &str) {
        {
            let mut inner = self.lock();
            cancel_active(&mut inner);
            inner.mount_generation += 1;
            inner.awaiting_first_completion = false;
            self.view.send_replace(DashboardView::default());
        }
        self.cache.clear_all(identity_id).await;
        info!(identity_id, "Signed out; cached dashboard cleared");
    }

    /// Run one refresh for `identity_id`.
    pub async fn refresh(&self, identity_id: &str, trigger: RefreshTrigger) -> RefreshOutcome {
        if !self.identity.is_ready() || self.identity.current_identity().as_deref() != Some(identity_id) {
            debug!(identity_id, "Identity provider not ready for this identity");
            return RefreshOutcome::NotReady;
        }

        let started = Instant::now();
        let Some((session_id, cancel)) = self.begin(identity_id, trigger) else {
            debug!(identity_id, "Refresh already in flight; skipped");
            return RefreshOutcome::Skipped;
        };

        let outcome = self.run(session_id, identity_id, &cancel).await;
        metrics::record_refresh(outcome.as_str(), started.elapsed());
        info!(
            identity_id,
            session_id,
            outcome = outcome.as_str(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Refresh finished"
        );
        outcome
    }

    fn begin(&self, identity_id: &str, trigger: RefreshTrigger) -> Option<(u64, CancellationToken)> {
        let mut inner = self.lock();
        if let Some(active) = &inner.active {
            if active.identity_id == identity_id && !trigger.supersede {
                return None;
            }
            let identity_changed = active.identity_id != identity_id;
            debug!(superseded = active.id, identity_changed, "Superseding in-flight refresh");
            active.cancel.cancel();
        }

        inner.last_session_id += 1;
        let id = inner.last_session_id;
        let cancel = CancellationToken::new();
        inner.active = Some(ActiveSession {
            id,
            identity_id: identity_id.to_string(),
            cancel: cancel.clone(),
        });
        inner.phase = Phase::Fetching(id);

        if trigger.is_initial_load && inner.awaiting_first_completion {
            self.view.send_if_modified(|view| !std::mem::replace(&mut view.loading, true));
        }
        Some((id, cancel))
    }

    async fn run(&self, session_id: u64, identity_id: &str, cancel: &CancellationToken) -> RefreshOutcome {
        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            results = self.fetch_all(identity_id, cancel) => Some(results),
        };
        let Some(batch) = settled else {
            debug!(session_id, "Refresh cancelled before settlement");
            return RefreshOutcome::Superseded;
        };
        if batch.was_cancelled() {
            // A fetcher found the session already handed to another identity.
            debug!(session_id, identity_id, "Sources cancelled mid-run; discarding batch");
            self.finish(session_id);
            return RefreshOutcome::Superseded;
        }

        if !self.enter_applying(session_id) {
            debug!(session_id, "Refresh superseded after settlement");
            return RefreshOutcome::Superseded;
        }
        log_failures(session_id, &batch);

        if !self.is_current(session_id) {
            return RefreshOutcome::Superseded;
        }
        let auth = self.auth.handle(&batch, identity_id, self.terminator.as_ref()).await;
        if auth.auth_expired {
            self.complete(session_id, |view| view.session_expired = true);
            return RefreshOutcome::AuthExpired;
        }

        if batch.all_failed() {
            error!(session_id, identity_id, "Every dashboard source failed");
            if !self.complete(session_id, |view| view.error = Some(ViewError::all_sources_failed())) {
                return RefreshOutcome::Superseded;
            }
            return RefreshOutcome::AllFailed;
        }

        let slices = self.build_slices(&batch);
        let to_cache = CacheWrites::from(&slices);
        let applied = self.complete_keeping_active(session_id, |view| {
            apply_slices(view, slices);
            view.error = None;
            view.last_updated = Some(Utc::now());
        });
        if !applied {
            return RefreshOutcome::Superseded;
        }

        for (slice, value) in to_cache.0 {
            if !self.is_current(session_id) {
                debug!(session_id, "Superseded during cache write-back");
                return RefreshOutcome::Superseded;
            }
            self.cache.set(identity_id, slice.key(), &value).await;
        }
        self.finish(session_id);

        RefreshOutcome::Applied {
            failed_sources: batch.failed_sources(),
        }
    }

    async fn fetch_all(&self, identity_id: &str, cancel: &CancellationToken) -> ResultBatch {
        let calls = self.fetchers.iter().map(|fetcher| {
            let child = cancel.child_token();
            async move {
                let source = fetcher.source();
                SourceResult {
                    source,
                    outcome: fetcher.fetch(identity_id, &child).await,
                }
            }
        });
        join_all(calls).await.into_iter().collect()
    }

    fn build_slices(&self, batch: &ResultBatch) -> Slices {
        let metrics = self.normalizer.normalize(
            batch.payload(SourceKind::Stats),
            batch.payload(SourceKind::Performance),
        );
        let activities = batch.payload(SourceKind::Activity).map(payload::activities);
        let jobs = batch.payload(SourceKind::Jobs).map(payload::jobs);

        let merged = self.merger.merge(activities.as_deref(), jobs.as_deref());
        // An empty merge with a failed feed is "unknown", not "no activity".
        let activity = if merged.is_degraded() && merged.records.is_empty() {
            None
        } else {
            Some(merged.records)
        };

        Slices {
            stats: metrics.stats,
            performance: metrics.performance,
            activity,
            uploads: jobs.as_deref().map(|jobs| summarize_uploads(jobs, self.upload_limit)),
            analytics: batch.payload(SourceKind::Analytics).map(payload::analytics_series),
        }
    }

    fn is_current(&self, session_id: u64) -> bool {
        is_active(&self.lock(), session_id)
    }

    fn enter_applying(&self, session_id: u64) -> bool {
        let mut inner = self.lock();
        if !is_active(&inner, session_id) {
            return false;
        }
        inner.phase = Phase::Applying(session_id);
        true
    }

    /// Apply `update` to the view and mark the first completion, if still
    /// the active session. The session stays active for cache write-back.
    fn complete_keeping_active(&self, session_id: u64, update: impl FnOnce(&mut DashboardView)) -> bool {
        let mut inner = self.lock();
        if !is_active(&inner, session_id) {
            return false;
        }
        inner.awaiting_first_completion = false;
        self.view.send_modify(|view| {
            update(view);
            view.loading = false;
        });
        true
    }

    fn complete(&self, session_id: u64, update: impl FnOnce(&mut DashboardView)) -> bool {
        let applied = self.complete_keeping_active(session_id, update);
        self.finish(session_id);
        applied
    }

    fn finish(&self, session_id: u64) {
        let mut inner = self.lock();
        if inner.active.as_ref().is_some_and(|a| a.id == session_id) {
            inner.active = None;
            inner.phase = Phase::Idle;
        }
    }
}

fn is_active(inner: &Inner, session_id: u64) -> bool {
    inner
        .active
        .as_ref()
        .is_some_and(|a| a.id == session_id && !a.cancel.is_cancelled())
}

fn cancel_active(inner: &mut Inner) {
    if let Some(active) = inner.active.take() {
        active.cancel.cancel();
    }
    inner.phase = Phase::Idle;
}

fn apply_slices(view: &mut DashboardView, slices: Slices) {
    if let Some(stats) = slices.stats {
        view.stats = stats;
    }
    if let Some(performance) = slices.performance {
        view.performance = performance;
    }
    if let Some(activity) = slices.activity {
        view.activity = activity;
    }
    if let Some(uploads) = slices.uploads {
        view.uploads = uploads;
    }
    if let Some(analytics) = slices.analytics {
        view.analytics = analytics;
    }
}

fn log_failures(session_id: u64, batch: &ResultBatch) {
    for result in batch.iter() {
        match &result.outcome {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => debug!(session_id, source = %result.source, "Source cancelled"),
            Err(e) => {
                warn!(session_id, source = %result.source, error = %e, "Source failed; keeping previous slice");
                metrics::record_source_failure(result.source);
            }
        }
    }
}

/// Serialized slices to persist, captured before the view takes ownership.
struct CacheWrites(Vec<(CacheSlice, serde_json::Value)>);

impl From<&Slices> for CacheWrites {
    fn from(slices: &Slices) -> Self {
        fn push<T: Serialize>(out: &mut Vec<(CacheSlice, serde_json::Value)>, slice: CacheSlice, value: &Option<T>) {
            let Some(value) = value else { return };
            match serde_json::to_value(value) {
                Ok(json) => out.push((slice, json)),
                Err(e) => warn!(slice = slice.key(), error = %e, "Slice not serializable; not cached"),
            }
        }

        let mut out = Vec::new();
        push(&mut out, CacheSlice::Stats, &slices.stats);
        push(&mut out, CacheSlice::Performance, &slices.performance);
        push(&mut out, CacheSlice::Activity, &slices.activity);
        push(&mut out, CacheSlice::Uploads, &slices.uploads);
        push(&mut out, CacheSlice::Analytics, &slices.analytics);
        CacheWrites(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionIdentity;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use statboard_core::FetchError;
    use statboard_db::{DbResult, KvStore, MemoryKv};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replies from a script; each call pops the next `(delay, reply)`.
    /// Once the script runs out the last reply repeats.
    struct ScriptedFetcher {
        source: SourceKind,
        script: Mutex<VecDeque<(Duration, Result<Value, FetchError>)>>,
        last: Mutex<Option<(Duration, Result<Value, FetchError>)>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(source: SourceKind, script: Vec<(u64, Result<Value, FetchError>)>) -> Arc<Self> {
            Arc::new(Self {
                source,
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|(ms, reply)| (Duration::from_millis(ms), reply))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn ok(source: SourceKind, ms: u64, body: Value) -> Arc<Self> {
            Self::new(source, vec![(ms, Ok(body))])
        }

        fn err(source: SourceKind, ms: u64, error: FetchError) -> Arc<Self> {
            Self::new(source, vec![(ms, Err(error))])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceFetcher for ScriptedFetcher {
        fn source(&self) -> SourceKind {
            self.source
        }

        async fn fetch(&self, _identity_id: &str, cancel: &CancellationToken) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, reply) = match next {
                Some(step) => {
                    *self.last.lock().unwrap() = Some(step.clone());
                    step
                }
                None => self.last.lock().unwrap().clone().expect("script not empty"),
            };
            tokio::select! {
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => reply,
            }
        }
    }

    #[derive(Default)]
    struct CountingTerminator(AtomicUsize);

    #[async_trait]
    impl SessionTerminator for CountingTerminator {
        async fn sign_out(&self, _identity_id: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands the session to bob when called, then fetches the way the HTTP
    /// fetcher does: only with a token that belongs to the requested identity.
    struct SessionSwitchingFetcher {
        session: Arc<SessionIdentity>,
    }

    #[async_trait]
    impl SourceFetcher for SessionSwitchingFetcher {
        fn source(&self) -> SourceKind {
            SourceKind::Stats
        }

        async fn fetch(&self, identity_id: &str, _cancel: &CancellationToken) -> Result<Value, FetchError> {
            self.session.sign_in("bob", "bob-token");
            match self.session.access_token_for(identity_id) {
                Some(_) => Ok(stats_body(99)),
                None => Err(FetchError::Cancelled),
            }
        }
    }

    /// Fixed snapshot whose reads take `delay`; writes are dropped so the
    /// snapshot stays stale.
    struct SlowSnapshotKv {
        inner: Arc<MemoryKv>,
        delay: Duration,
    }

    #[async_trait]
    impl KvStore for SlowSnapshotKv {
        async fn get(&self, key: &str) -> DbResult<Option<String>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(key).await
        }

        async fn set(&self, _key: &str, _value: &str) -> DbResult<()> {
            Ok(())
        }

        async fn remove_prefix(&self, prefix: &str) -> DbResult<u64> {
            self.inner.remove_prefix(prefix).await
        }
    }

    fn stats_body(total: u64) -> Value {
        json!({"success": true, "data": {"totalUploads": total, "successfulUploads": total, "avgConfidence": 90}})
    }

    fn activity_body() -> Value {
        json!({"success": true, "data": {"activities": [
            {"id": 1, "resource_type": "upload", "action": "processed",
             "details": {"confidence": 9100, "description": "a.jpg"}, "created_at": "2026-03-01T10:00:00Z"},
            {"id": 2, "resource_type": "search", "action": "matched",
             "details": {"confidence": 88}, "created_at": "2026-03-01T12:00:00Z"}
        ]}})
    }

    fn jobs_body() -> Value {
        json!({"data": {"jobs": [
            {"id": "j1", "status": "completed", "progress": 100, "completed_at": "2026-03-01T11:00:00Z"}
        ]}})
    }

    fn healthy_fetchers() -> Vec<Arc<dyn SourceFetcher>> {
        vec![
            ScriptedFetcher::ok(SourceKind::Stats, 10, stats_body(10)),
            ScriptedFetcher::ok(SourceKind::Jobs, 10, jobs_body()),
            ScriptedFetcher::ok(SourceKind::Activity, 10, activity_body()),
            ScriptedFetcher::ok(SourceKind::Performance, 10, json!({"success": true, "data": {"accuracy": 95}})),
            ScriptedFetcher::ok(SourceKind::Analytics, 10, json!({"success": true, "data": {"series": [{"x": 1}]}})),
        ]
    }

    struct Harness {
        coordinator: Arc<RequestCoordinator>,
        terminator: Arc<CountingTerminator>,
    }

    fn harness(fetchers: Vec<Arc<dyn SourceFetcher>>) -> Harness {
        harness_with_cache(fetchers, CacheStore::in_memory())
    }

    fn harness_with_cache(fetchers: Vec<Arc<dyn SourceFetcher>>, cache: CacheStore) -> Harness {
        let terminator = Arc::new(CountingTerminator::default());
        let coordinator = RequestCoordinator::new(
            &DashboardConfig::default(),
            fetchers,
            cache,
            Arc::new(SessionIdentity::signed_in("alice", "tok")),
            terminator.clone(),
        );
        Harness {
            coordinator: Arc::new(coordinator),
            terminator,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_applies_all_slices_and_caches_them() {
        let h = harness(healthy_fetchers());
        h.coordinator.mount("alice").await;
        assert!(h.coordinator.view().loading);

        let outcome = h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert_eq!(outcome, RefreshOutcome::Applied { failed_sources: vec![] });

        let view = h.coordinator.view();
        assert!(!view.loading);
        assert_eq!(view.stats.total_uploads, 10);
        assert_eq!(view.activity.len(), 3);
        assert_eq!(view.uploads.len(), 1);
        assert_eq!(view.analytics.len(), 1);
        assert_eq!(view.performance.len(), 3);
        assert!(view.last_updated.is_some());
        assert_eq!(h.coordinator.phase(), Phase::Idle);

        let cached: Option<DashboardStats> = h.coordinator.cache().get_slice("alice", CacheSlice::Stats).await;
        assert_eq!(cached.map(|s| s.total_uploads), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_requires_ready_matching_identity() {
        let h = harness(healthy_fetchers());
        assert_eq!(
            h.coordinator.refresh("mallory", RefreshTrigger::initial()).await,
            RefreshOutcome::NotReady
        );

        let coordinator = RequestCoordinator::new(
            &DashboardConfig::default(),
            healthy_fetchers(),
            CacheStore::in_memory(),
            Arc::new(SessionIdentity::new()),
            Arc::new(CountingTerminator::default()),
        );
        assert_eq!(
            coordinator.refresh("alice", RefreshTrigger::initial()).await,
            RefreshOutcome::NotReady
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_without_supersede_is_skipped() {
        let stats = ScriptedFetcher::ok(SourceKind::Stats, 100, stats_body(1));
        let h = harness(vec![stats.clone()]);

        let first = {
            let c = h.coordinator.clone();
            tokio::spawn(async move { c.refresh("alice", RefreshTrigger::manual()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.coordinator.phase(), Phase::Fetching(1));

        let second = h.coordinator.refresh("alice", RefreshTrigger::manual()).await;
        assert_eq!(second, RefreshOutcome::Skipped);
        assert_eq!(first.await.unwrap(), RefreshOutcome::Applied { failed_sources: vec![] });
        assert_eq!(stats.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_started_refresh_wins() {
        // First run resolves at t=200ms, the second (started at t=10ms) at t=60ms.
        let stats = ScriptedFetcher::new(
            SourceKind::Stats,
            vec![(200, Ok(stats_body(1))), (50, Ok(stats_body(2)))],
        );
        let cache = CacheStore::in_memory();
        let h = harness_with_cache(vec![stats.clone()], cache.clone());

        let first = {
            let c = h.coordinator.clone();
            tokio::spawn(async move { c.refresh("alice", RefreshTrigger::manual()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = h.coordinator.refresh("alice", RefreshTrigger::superseding()).await;

        assert_eq!(second, RefreshOutcome::Applied { failed_sources: vec![] });
        assert_eq!(first.await.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(h.coordinator.view().stats.total_uploads, 2);

        let cached: Option<DashboardStats> = cache.get_slice("alice", CacheSlice::Stats).await;
        assert_eq!(cached.map(|s| s.total_uploads), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_keeps_previous_slice() {
        let cache = CacheStore::in_memory();
        let previous_uploads = vec![UploadSummary {
            id: "old".into(),
            status: "completed".into(),
            progress: 100.0,
            occurred_at: None,
        }];
        cache.set_slice("alice", CacheSlice::Uploads, &previous_uploads).await;

        let h = harness_with_cache(
            vec![
                ScriptedFetcher::ok(SourceKind::Stats, 10, stats_body(3)),
                ScriptedFetcher::err(SourceKind::Jobs, 30_000, FetchError::Transport("timed out".into())),
                ScriptedFetcher::ok(SourceKind::Activity, 10, activity_body()),
            ],
            cache.clone(),
        );
        h.coordinator.mount("alice").await;
        assert_eq!(h.coordinator.view().uploads, previous_uploads);

        let outcome = h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert_eq!(
            outcome,
            RefreshOutcome::Applied {
                failed_sources: vec![SourceKind::Jobs]
            }
        );

        let view = h.coordinator.view();
        let ids: Vec<&str> = view.activity.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["activity:2", "activity:1"]);
        assert_eq!(view.uploads, previous_uploads);

        let cached: Option<Vec<UploadSummary>> = cache.get_slice("alice", CacheSlice::Uploads).await;
        assert_eq!(cached, Some(previous_uploads));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_signs_out_once_and_skips_cache() {
        let cache = CacheStore::in_memory();
        let h = harness_with_cache(
            vec![
                ScriptedFetcher::err(SourceKind::Stats, 10, FetchError::Unauthorized { status: 401 }),
                ScriptedFetcher::err(SourceKind::Jobs, 10, FetchError::Unauthorized { status: 403 }),
                ScriptedFetcher::ok(SourceKind::Activity, 10, activity_body()),
            ],
            cache.clone(),
        );
        h.coordinator.mount("alice").await;

        let outcome = h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert_eq!(outcome, RefreshOutcome::AuthExpired);
        assert_eq!(h.terminator.0.load(Ordering::SeqCst), 1);

        let view = h.coordinator.view();
        assert!(view.session_expired);
        assert!(view.activity.is_empty());
        assert_eq!(cache.get("alice", CacheSlice::Activity.key()).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_sets_retryable_error_and_keeps_data() {
        let stats = ScriptedFetcher::new(
            SourceKind::Stats,
            vec![(10, Ok(stats_body(7))), (10, Err(FetchError::Transport("down".into())))],
        );
        let jobs = ScriptedFetcher::new(
            SourceKind::Jobs,
            vec![(10, Ok(jobs_body())), (10, Err(FetchError::Status { status: 500, body: String::new() }))],
        );
        let h = harness(vec![stats, jobs]);
        h.coordinator.mount("alice").await;

        h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        let outcome = h.coordinator.refresh("alice", RefreshTrigger::manual()).await;
        assert_eq!(outcome, RefreshOutcome::AllFailed);

        let view = h.coordinator.view();
        assert_eq!(view.error, Some(ViewError::all_sources_failed()));
        assert_eq!(view.stats.total_uploads, 7);
        assert_eq!(view.uploads.len(), 1);
        assert_eq!(h.terminator.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_only_until_first_completion() {
        let h = harness(healthy_fetchers());
        let mut rx = h.coordinator.subscribe();
        h.coordinator.mount("alice").await;
        assert!(rx.borrow_and_update().loading);

        h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert!(!h.coordinator.view().loading);

        h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert!(!h.coordinator.view().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_result_beats_late_cache_hydration() {
        let memory = Arc::new(MemoryKv::new());
        CacheStore::new(memory.clone())
            .set_slice("alice", CacheSlice::Stats, &DashboardStats {
                total_uploads: 3,
                ..Default::default()
            })
            .await;
        let cache = CacheStore::new(Arc::new(SlowSnapshotKv {
            inner: memory,
            delay: Duration::from_millis(100),
        }));
        let h = harness_with_cache(vec![ScriptedFetcher::ok(SourceKind::Stats, 0, stats_body(10))], cache);

        let mount = {
            let c = h.coordinator.clone();
            tokio::spawn(async move { c.mount("alice").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(h.coordinator.view().loading);

        let outcome = h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert_eq!(outcome, RefreshOutcome::Applied { failed_sources: vec![] });
        assert_eq!(h.coordinator.view().stats.total_uploads, 10);

        mount.await.unwrap();
        let view = h.coordinator.view();
        assert_eq!(view.stats.total_uploads, 10);
        assert!(!view.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_in_flight_run() {
        let stats = ScriptedFetcher::ok(SourceKind::Stats, 500, stats_body(9));
        let h = harness(vec![stats]);
        h.coordinator.mount("alice").await;

        let run = {
            let c = h.coordinator.clone();
            tokio::spawn(async move { c.refresh("alice", RefreshTrigger::initial()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.coordinator.unmount();

        assert_eq!(run.await.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(h.coordinator.phase(), Phase::Idle);
        assert_eq!(h.coordinator.view().stats.total_uploads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_identity_cache_only() {
        let cache = CacheStore::in_memory();
        cache.set("bob", "stats", &json!({"totalUploads": 1})).await;
        let h = harness_with_cache(healthy_fetchers(), cache.clone());
        h.coordinator.mount("alice").await;
        h.coordinator.refresh("alice", RefreshTrigger::initial()).await;

        h.coordinator.sign_out("alice").await;
        assert_eq!(h.coordinator.view(), DashboardView::default());
        assert_eq!(cache.get("alice", "stats").await, None);
        assert!(cache.get("bob", "stats").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_for_new_identity_drops_previous_view() {
        let h = harness(healthy_fetchers());
        h.coordinator.mount("alice").await;
        h.coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert_eq!(h.coordinator.view().stats.total_uploads, 10);

        h.coordinator.mount("bob").await;
        let view = h.coordinator.view();
        assert_eq!(view.identity_id.as_deref(), Some("bob"));
        assert_eq!(view.stats, DashboardStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_switch_mid_run_discards_batch() {
        let session = Arc::new(SessionIdentity::signed_in("alice", "alice-token"));
        let terminator = Arc::new(CountingTerminator::default());
        let cache = CacheStore::in_memory();
        let coordinator = RequestCoordinator::new(
            &DashboardConfig::default(),
            vec![
                Arc::new(SessionSwitchingFetcher { session: session.clone() }) as Arc<dyn SourceFetcher>,
                ScriptedFetcher::err(SourceKind::Jobs, 10, FetchError::Unauthorized { status: 401 }),
            ],
            cache.clone(),
            session.clone(),
            terminator.clone(),
        );
        coordinator.mount("alice").await;

        let outcome = coordinator.refresh("alice", RefreshTrigger::initial()).await;
        assert_eq!(outcome, RefreshOutcome::Superseded);
        assert_eq!(coordinator.phase(), Phase::Idle);
        assert_eq!(coordinator.view().stats.total_uploads, 0);
        for slice in CacheSlice::ALL {
            assert_eq!(cache.get("alice", slice.key()).await, None);
        }
        assert_eq!(terminator.0.load(Ordering::SeqCst), 0);
        assert_eq!(session.current_identity().as_deref(), Some("bob"));
    }

    #[test]
    fn test_outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(RefreshOutcome::Applied {
            failed_sources: vec![SourceKind::Jobs],
        })
        .unwrap();
        assert_eq!(json, json!({"kind": "applied", "failedSources": ["jobs"]}));
        assert_eq!(
            serde_json::to_value(RefreshOutcome::AuthExpired).unwrap(),
            json!({"kind": "authExpired"})
        );
    }
}
