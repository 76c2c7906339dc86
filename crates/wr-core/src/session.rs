//! Per-page filtering bookkeeping
//!
//! A `PageFilterSession` accumulates one `MatchedUrlInfo` per evaluated
//! request for the current navigation of a page. Every navigation gets a
//! new generation; records tagged with an older generation are dropped so
//! in-flight evaluations from a previous page never leak into the new one.
//!
//! The list and its counts change together under one mutex. The blocked
//! count is mirrored into an atomic so the load-progress badge can poll it
//! without taking the lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::defender::{ProtectionStatus, TrackerDomain};
use crate::types::{Action, Category, ResourceType};

// =============================================================================
// Records
// =============================================================================

/// Decision recorded for one sub-resource request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedUrlInfo {
    pub url: String,
    pub resource_type: ResourceType,
    pub category: Option<Category>,
    pub action: Action,
}

/// Filtering report for one page load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total_urls: usize,
    pub blocked_urls: usize,
    pub whitelisted_urls: usize,
    pub matched: Vec<MatchedUrlInfo>,
}

impl PageInfo {
    /// Rebuild a report from its detail list.
    pub fn from_records(matched: Vec<MatchedUrlInfo>) -> Self {
        let mut info = PageInfo::default();
        for record in matched {
            info.push(record);
        }
        info
    }

    fn push(&mut self, record: MatchedUrlInfo) {
        self.total_urls += 1;
        match record.action {
            Action::Blocked => self.blocked_urls += 1,
            Action::Whitelisted => self.whitelisted_urls += 1,
            Action::Allowed => {}
        }
        self.matched.push(record);
    }

    /// Check that the counters agree with the detail list.
    pub fn is_consistent(&self) -> bool {
        let recomputed = PageInfo::from_records(self.matched.clone());
        recomputed.total_urls == self.total_urls
            && recomputed.blocked_urls == self.blocked_urls
            && recomputed.whitelisted_urls == self.whitelisted_urls
    }
}

// =============================================================================
// Session
// =============================================================================

/// Lifecycle of one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageState {
    /// Navigation started, nothing recorded yet
    Fresh,
    /// Sub-resources are being recorded
    Loading,
    /// Load finished; further records are refused until the next navigation
    Loaded,
}

/// Outcome of a `record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The record belongs to a superseded navigation
    StaleGeneration,
    /// The navigation already finished loading
    PageLoaded,
    /// No open page has this id; nothing was recorded
    UnknownPage,
}

#[derive(Debug)]
struct SessionState {
    generation: u64,
    state: PageState,
    info: PageInfo,
    trackers: Vec<TrackerDomain>,
}

/// Per-page aggregator of filtering decisions.
#[derive(Debug)]
pub struct PageFilterSession {
    inner: Mutex<SessionState>,
    generation: AtomicU64,
    blocked: AtomicUsize,
    total: AtomicUsize,
}

impl Default for PageFilterSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFilterSession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionState {
                generation: 0,
                state: PageState::Fresh,
                info: PageInfo::default(),
                trackers: Vec::new(),
            }),
            generation: AtomicU64::new(0),
            blocked: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// Current navigation generation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PageState {
        self.inner.lock().state
    }

    /// Start a new navigation: clear everything and bump the generation.
    /// Returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = PageState::Fresh;
        inner.info = PageInfo::default();
        inner.trackers.clear();
        self.blocked.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
        self.generation.store(inner.generation, Ordering::Release);
        inner.generation
    }

    /// Record against the current generation.
    pub fn record(&self, info: MatchedUrlInfo) -> RecordOutcome {
        let generation = self.generation();
        self.record_for(generation, info)
    }

    /// Record a decision made during `generation`.
    pub fn record_for(&self, generation: u64, info: MatchedUrlInfo) -> RecordOutcome {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            debug!(
                "dropping stale record for {} (generation {} < {})",
                info.url, generation, inner.generation
            );
            return RecordOutcome::StaleGeneration;
        }
        if inner.state == PageState::Loaded {
            return RecordOutcome::PageLoaded;
        }

        inner.state = PageState::Loading;
        if info.action == Action::Blocked {
            self.blocked.fetch_add(1, Ordering::AcqRel);
        }
        self.total.fetch_add(1, Ordering::AcqRel);
        inner.info.push(info);
        RecordOutcome::Recorded
    }

    /// Record an observed tracker for `generation`. A tracker domain seen
    /// again has its methods merged and its action replaced.
    pub fn record_tracker(&self, generation: u64, tracker: TrackerDomain) -> RecordOutcome {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            return RecordOutcome::StaleGeneration;
        }
        if inner.state == PageState::Loaded {
            return RecordOutcome::PageLoaded;
        }

        match inner.trackers.iter_mut().find(|t| t.domain == tracker.domain) {
            Some(existing) => {
                existing.methods |= tracker.methods;
                existing.action = tracker.action;
            }
            None => inner.trackers.push(tracker),
        }
        RecordOutcome::Recorded
    }

    /// Mark the current navigation as finished.
    pub fn finish_load(&self) {
        self.inner.lock().state = PageState::Loaded;
    }

    /// Consistent copy of the page report.
    pub fn snapshot(&self) -> PageInfo {
        self.inner.lock().info.clone()
    }

    /// Consistent copy of the tracker protection status.
    pub fn protection_status(&self) -> ProtectionStatus {
        ProtectionStatus::new(self.inner.lock().trackers.clone())
    }

    /// Blocked requests so far. O(1), lock-free.
    #[inline]
    pub fn blocked_count(&self) -> usize {
        self.blocked.load(Ordering::Acquire)
    }

    /// Evaluated requests so far. O(1), lock-free.
    #[inline]
    pub fn total_count(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::defender::{ProtectiveAction, TrackingMethods};

    fn info(url: &str, action: Action) -> MatchedUrlInfo {
        MatchedUrlInfo {
            url: url.to_string(),
            resource_type: ResourceType::Image,
            category: (action == Action::Blocked).then_some(Category::Ads),
            action,
        }
    }

    #[test]
    fn test_record_updates_counts() {
        let session = PageFilterSession::new();
        session.record(info("a", Action::Blocked));
        session.record(info("b", Action::Allowed));
        session.record(info("c", Action::Whitelisted));

        let page = session.snapshot();
        assert_eq!(page.total_urls, 3);
        assert_eq!(page.blocked_urls, 1);
        assert_eq!(page.whitelisted_urls, 1);
        assert_eq!(session.blocked_count(), 1);
        assert_eq!(session.total_count(), 3);
        assert!(page.is_consistent());
        assert_eq!(session.state(), PageState::Loading);
    }

    #[test]
    fn test_stale_records_after_reset_are_dropped() {
        let session = PageFilterSession::new();
        let old = session.generation();
        session.record(info("a", Action::Blocked));

        let new = session.reset();
        assert!(new > old);
        for i in 0..10 {
            let outcome = session.record_for(old, info(&format!("late{}", i), Action::Blocked));
            assert_eq!(outcome, RecordOutcome::StaleGeneration);
        }

        let page = session.snapshot();
        assert_eq!(page.total_urls, 0);
        assert_eq!(page.blocked_urls, 0);
        assert_eq!(session.blocked_count(), 0);
        assert_eq!(session.state(), PageState::Fresh);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let session = PageFilterSession::new();
        session.record(info("a", Action::Blocked));
        assert_eq!(session.snapshot(), session.snapshot());
    }

    #[test]
    fn test_loaded_refuses_records() {
        let session = PageFilterSession::new();
        session.record(info("a", Action::Allowed));
        session.finish_load();
        assert_eq!(session.record(info("b", Action::Blocked)), RecordOutcome::PageLoaded);
        assert_eq!(session.snapshot().total_urls, 1);

        session.reset();
        assert_eq!(session.record(info("c", Action::Blocked)), RecordOutcome::Recorded);
    }

    #[test]
    fn test_tracker_merge() {
        let session = PageFilterSession::new();
        let g = session.generation();
        session.record_tracker(
            g,
            TrackerDomain::new("t.net", TrackingMethods::HTTP_COOKIES, ProtectiveAction::Unblock),
        );
        session.record_tracker(
            g,
            TrackerDomain::new("t.net", TrackingMethods::CANVAS_FINGERPRINT, ProtectiveAction::BlockAll),
        );

        let status = session.protection_status();
        assert_eq!(status.trackers().len(), 1);
        assert_eq!(
            status.trackers()[0].methods,
            TrackingMethods::HTTP_COOKIES | TrackingMethods::CANVAS_FINGERPRINT
        );
        assert_eq!(status.trackers()[0].action, ProtectiveAction::BlockAll);
    }

    #[test]
    fn test_concurrent_records_stay_consistent() {
        let session = Arc::new(PageFilterSession::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let action = if i % 2 == 0 { Action::Blocked } else { Action::Allowed };
                        session.record(info(&format!("{}-{}", t, i), action));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let page = session.snapshot();
        assert_eq!(page.total_urls, 800);
        assert_eq!(page.blocked_urls, 400);
        assert_eq!(session.blocked_count(), 400);
        assert!(page.is_consistent());
    }
}
