//! Tracker protection status (WebDefender)
//!
//! The loading layer reports tracking activity it observes on a page
//! (cookies, local storage, canvas reads, font probing). The engine stores
//! one `TrackerDomain` per domain with the protective action it applied.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Tracking vectors observed for a domain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TrackingMethods: u8 {
        const HTTP_COOKIES = 1 << 0;
        const HTML5_LOCAL_STORAGE = 1 << 1;
        const CANVAS_FINGERPRINT = 1 << 2;
        const FONT_ENUMERATION = 1 << 3;
    }
}

/// What was done about a tracker domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveAction {
    /// Protection disabled for the page's origin
    Unblock,
    /// Storage access denied, requests allowed
    BlockCookies,
    /// Requests to the domain cancelled
    BlockAll,
}

/// A tracking domain seen on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerDomain {
    pub domain: String,
    pub methods: TrackingMethods,
    pub action: ProtectiveAction,
}

impl TrackerDomain {
    pub fn new(domain: impl Into<String>, methods: TrackingMethods, action: ProtectiveAction) -> Self {
        Self {
            domain: domain.into().to_ascii_lowercase(),
            methods,
            action,
        }
    }
}

/// Number of tracker domains using each vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorCounts {
    pub cookies: usize,
    pub local_storage: usize,
    pub fingerprinting: usize,
    pub font_enumeration: usize,
}

impl VectorCounts {
    /// Largest single count, for scaling bar graphs.
    pub fn max(&self) -> usize {
        self.cookies
            .max(self.local_storage)
            .max(self.fingerprinting)
            .max(self.font_enumeration)
    }
}

/// Tracker protection summary for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionStatus {
    trackers: Vec<TrackerDomain>,
}

impl ProtectionStatus {
    pub fn new(trackers: Vec<TrackerDomain>) -> Self {
        Self { trackers }
    }

    pub fn trackers(&self) -> &[TrackerDomain] {
        &self.trackers
    }

    /// Trackers the engine acted against.
    pub fn protected_count(&self) -> usize {
        self.trackers
            .iter()
            .filter(|t| t.action != ProtectiveAction::Unblock)
            .count()
    }

    pub fn vector_counts(&self) -> VectorCounts {
        let mut counts = VectorCounts::default();
        for t in &self.trackers {
            if t.methods.contains(TrackingMethods::HTTP_COOKIES) {
                counts.cookies += 1;
            }
            if t.methods.contains(TrackingMethods::HTML5_LOCAL_STORAGE) {
                counts.local_storage += 1;
            }
            if t.methods.contains(TrackingMethods::CANVAS_FINGERPRINT) {
                counts.fingerprinting += 1;
            }
            if t.methods.contains(TrackingMethods::FONT_ENUMERATION) {
                counts.font_enumeration += 1;
            }
        }
        counts
    }

    /// One-line overview, or `None` when no trackers were seen.
    pub fn overview(&self) -> Option<String> {
        if self.trackers.is_empty() {
            return None;
        }
        let n = self.protected_count();
        Some(format!(
            "{} tracker{} blocked",
            n,
            if n == 1 { "" } else { "s" }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_count_skips_unblocked() {
        let status = ProtectionStatus::new(vec![
            TrackerDomain::new("a.net", TrackingMethods::HTTP_COOKIES, ProtectiveAction::BlockAll),
            TrackerDomain::new("b.net", TrackingMethods::HTTP_COOKIES, ProtectiveAction::Unblock),
            TrackerDomain::new("c.net", TrackingMethods::CANVAS_FINGERPRINT, ProtectiveAction::BlockCookies),
        ]);
        assert_eq!(status.protected_count(), 2);
        assert_eq!(status.overview().as_deref(), Some("2 trackers blocked"));
    }

    #[test]
    fn test_vector_counts() {
        let status = ProtectionStatus::new(vec![
            TrackerDomain::new(
                "a.net",
                TrackingMethods::HTTP_COOKIES | TrackingMethods::HTML5_LOCAL_STORAGE,
                ProtectiveAction::BlockAll,
            ),
            TrackerDomain::new("b.net", TrackingMethods::HTTP_COOKIES, ProtectiveAction::Unblock),
        ]);
        let counts = status.vector_counts();
        assert_eq!(counts.cookies, 2);
        assert_eq!(counts.local_storage, 1);
        assert_eq!(counts.fingerprinting, 0);
        assert_eq!(counts.max(), 2);
    }

    #[test]
    fn test_empty_status_has_no_overview() {
        assert_eq!(ProtectionStatus::default().overview(), None);
    }

    #[test]
    fn test_tracker_json_names_methods() {
        let tracker = TrackerDomain::new(
            "Tracker.Example.net",
            TrackingMethods::HTTP_COOKIES | TrackingMethods::CANVAS_FINGERPRINT,
            ProtectiveAction::BlockAll,
        );
        let json = serde_json::to_string(&tracker).unwrap();
        assert!(json.contains("CANVAS_FINGERPRINT"), "{}", json);
        assert!(json.contains("\"block_all\""), "{}", json);

        let back: TrackerDomain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tracker);
    }
}
