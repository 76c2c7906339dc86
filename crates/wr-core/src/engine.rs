//! Filter engine
//!
//! Ties the matcher, the per-feature permission resolvers and the per-page
//! sessions together. The loading layer calls [`FilterEngine::evaluate`]
//! once per sub-resource; the settings layer reads and writes overrides
//! through [`FilterEngine::permissions`] and polls page reports.
//!
//! Until [`FilterEngine::mark_rules_loaded`] runs every request fails open:
//! it is allowed and recorded, never blocked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::defender::{ProtectionStatus, ProtectiveAction, TrackerDomain, TrackingMethods};
use crate::error::PermissionError;
use crate::matcher::{RuleMatcher, TieBreak};
use crate::permissions::{EffectiveSetting, PermissionResolver};
use crate::report::PageReport;
use crate::ruleset::{PreparedRequest, RuleSet};
use crate::session::{MatchedUrlInfo, PageFilterSession, PageInfo, PageState, RecordOutcome};
use crate::settings::{GlobalPreferences, SettingKind};
use crate::types::{
    Action, Category, ContentSetting, FilterFeature, FilterRequest, PageId, ResourceType,
    RuleAction,
};
use crate::url::{extract_host, normalize_origin};

/// Whether initial rule loading has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitStatus {
    Uninitialized,
    Ready { rule_sets: usize },
}

/// Result of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    /// Category of the winning rule set, if a rule matched
    pub category: Option<Category>,
    /// What the page session did with the record
    pub outcome: RecordOutcome,
}

#[derive(Debug)]
struct PageSlot {
    session: Arc<PageFilterSession>,
    incognito: bool,
}

impl PageSlot {
    fn new(incognito: bool) -> Self {
        Self {
            session: Arc::new(PageFilterSession::new()),
            incognito,
        }
    }
}

/// The content-filtering decision engine.
#[derive(Debug)]
pub struct FilterEngine {
    matcher: RuleMatcher,
    refiner: PermissionResolver,
    defender: PermissionResolver,
    pages: RwLock<HashMap<PageId, PageSlot>>,
    rules_loaded: AtomicBool,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterEngine {
    /// Engine with both features enabled and first-loaded tie breaking.
    pub fn new() -> Self {
        Self::with_preferences(&GlobalPreferences::default(), TieBreak::default())
    }

    /// Engine whose feature defaults follow `prefs`.
    pub fn with_preferences(prefs: &GlobalPreferences, tie_break: TieBreak) -> Self {
        Self {
            matcher: RuleMatcher::with_tie_break(tie_break),
            refiner: PermissionResolver::new(SettingKind::WebRefiner.is_enabled(prefs)),
            defender: PermissionResolver::new(SettingKind::WebDefender.is_enabled(prefs)),
            pages: RwLock::new(HashMap::new()),
            rules_loaded: AtomicBool::new(false),
        }
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    /// Permission resolver of one filter feature.
    pub fn permissions(&self, feature: FilterFeature) -> &PermissionResolver {
        match feature {
            FilterFeature::WebRefiner => &self.refiner,
            FilterFeature::WebDefender => &self.defender,
        }
    }

    // =========================================================================
    // Rule loading
    // =========================================================================

    /// Append a rule set. Returns its load-order index.
    pub fn add_rule_set(&self, set: RuleSet) -> usize {
        let (name, category, rules) = (set.name().to_string(), set.category(), set.len());
        let index = self.matcher.add_rule_set(set);
        info!(
            "loaded rule set '{}' ({}, {} rules) at index {}",
            name, category, rules, index
        );
        index
    }

    /// Mark initial rule loading as finished. Evaluations start blocking.
    pub fn mark_rules_loaded(&self) {
        if !self.rules_loaded.swap(true, Ordering::AcqRel) {
            info!("rules ready: {} rule sets", self.matcher.rule_set_count());
        }
    }

    pub fn status(&self) -> InitStatus {
        if self.rules_loaded.load(Ordering::Acquire) {
            InitStatus::Ready {
                rule_sets: self.matcher.rule_set_count(),
            }
        } else {
            InitStatus::Uninitialized
        }
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Decide one sub-resource request and record it on the page.
    pub fn evaluate(
        &self,
        page: PageId,
        origin: &str,
        url: &str,
        resource_type: ResourceType,
        incognito: bool,
    ) -> Action {
        self.evaluate_request(&FilterRequest {
            page,
            origin,
            url,
            resource_type,
            incognito,
            generation: None,
        })
        .action
    }

    /// Decide a request and report how it was recorded.
    ///
    /// When the request carries no generation the page's current one is
    /// captured before matching, so a navigation that lands mid-evaluation
    /// causes the record to be dropped. Requests for pages that are not
    /// open (never opened, or already closed) are decided but not recorded.
    pub fn evaluate_request(&self, req: &FilterRequest<'_>) -> Verdict {
        let session = self.session(req.page);
        let generation = match (&session, req.generation) {
            (_, Some(generation)) => generation,
            (Some(session), None) => session.generation(),
            (None, None) => 0,
        };

        let (action, category) = self.decide(req.origin, req.url, req.resource_type, req.incognito);
        let outcome = match session {
            Some(session) => session.record_for(
                generation,
                MatchedUrlInfo {
                    url: req.url.to_string(),
                    resource_type: req.resource_type,
                    category,
                    action,
                },
            ),
            None => RecordOutcome::UnknownPage,
        };
        debug!(
            "{} {} {} -> {:?} ({:?})",
            req.page, req.resource_type, req.url, action, outcome
        );

        Verdict {
            action,
            category,
            outcome,
        }
    }

    fn decide(
        &self,
        origin: &str,
        url: &str,
        resource_type: ResourceType,
        incognito: bool,
    ) -> (Action, Option<Category>) {
        if !self.rules_loaded.load(Ordering::Acquire) {
            return (Action::Allowed, None);
        }
        if !self.refiner.is_enabled_for(origin, incognito) {
            return (Action::Allowed, None);
        }

        let origin_key = normalize_origin(origin);
        let site_host = extract_host(&origin_key).unwrap_or("");
        let req = PreparedRequest::new(url, resource_type, site_host);
        match self.matcher.match_request(&req) {
            None => (Action::Allowed, None),
            Some(m) => match m.action {
                RuleAction::Block => (Action::Blocked, Some(m.category)),
                RuleAction::Allow => (Action::Whitelisted, Some(m.category)),
            },
        }
    }

    // =========================================================================
    // Tracker protection
    // =========================================================================

    /// Record a tracking domain observed on a page and return the action
    /// taken against it.
    pub fn observe_tracker(
        &self,
        page: PageId,
        origin: &str,
        domain: &str,
        methods: TrackingMethods,
        incognito: bool,
    ) -> ProtectiveAction {
        let action = if !self.defender.is_enabled_for(origin, incognito) {
            ProtectiveAction::Unblock
        } else if self.is_blocked_tracker(origin, domain) {
            ProtectiveAction::BlockAll
        } else {
            ProtectiveAction::BlockCookies
        };

        let outcome = match self.session(page) {
            Some(session) => {
                session.record_tracker(session.generation(), TrackerDomain::new(domain, methods, action))
            }
            None => RecordOutcome::UnknownPage,
        };
        debug!(
            "{} tracker {} ({:?}) -> {:?} ({:?})",
            page, domain, methods, action, outcome
        );
        action
    }

    fn is_blocked_tracker(&self, origin: &str, domain: &str) -> bool {
        if !self.rules_loaded.load(Ordering::Acquire) {
            return false;
        }
        let origin_key = normalize_origin(origin);
        let site_host = extract_host(&origin_key).unwrap_or("");
        let url = format!("https://{}/", domain.trim().trim_end_matches('.'));
        let req = PreparedRequest::new(&url, ResourceType::Other, site_host);
        matches!(
            self.matcher.match_request(&req),
            Some(m) if m.category == Category::Trackers && m.action == RuleAction::Block
        )
    }

    // =========================================================================
    // Page lifecycle
    // =========================================================================

    /// Start tracking a page. Re-opening a known page keeps its session.
    pub fn open_page(&self, page: PageId, incognito: bool) {
        self.pages
            .write()
            .entry(page)
            .or_insert_with(|| PageSlot::new(incognito));
        debug!("{} opened (incognito={})", page, incognito);
    }

    /// Stop tracking a page and return its last report.
    ///
    /// Closing the last incognito page ends the incognito session.
    pub fn close_page(&self, page: PageId) -> Option<PageInfo> {
        let (slot, incognito_left) = {
            let mut pages = self.pages.write();
            let slot = pages.remove(&page)?;
            let left = pages.values().any(|s| s.incognito);
            (slot, left)
        };
        debug!("{} closed", page);

        if slot.incognito && !incognito_left {
            self.end_incognito_session();
        }
        Some(slot.session.snapshot())
    }

    /// A navigation started on `page`. Only main-frame navigations reset the
    /// session; returns the new generation in that case.
    ///
    /// A main-frame navigation on a page that is not open opens it.
    pub fn on_navigation_started(&self, page: PageId, main_frame: bool, incognito: bool) -> Option<u64> {
        if !main_frame {
            return None;
        }
        let generation = self.session_or_open(page, incognito).reset();
        debug!("{} navigation started, generation {}", page, generation);
        Some(generation)
    }

    /// The current navigation of `page` finished loading.
    pub fn on_load_finished(&self, page: PageId) {
        if let Some(session) = self.session(page) {
            session.finish_load();
        }
    }

    /// Wipe the incognito overrides of every feature.
    pub fn end_incognito_session(&self) {
        for feature in FilterFeature::ALL {
            self.permissions(feature).on_incognito_session_end();
        }
    }

    fn session(&self, page: PageId) -> Option<Arc<PageFilterSession>> {
        self.pages.read().get(&page).map(|slot| Arc::clone(&slot.session))
    }

    fn session_or_open(&self, page: PageId, incognito: bool) -> Arc<PageFilterSession> {
        if let Some(session) = self.session(page) {
            return session;
        }
        let mut pages = self.pages.write();
        let slot = pages.entry(page).or_insert_with(|| PageSlot::new(incognito));
        Arc::clone(&slot.session)
    }

    // =========================================================================
    // Page queries
    // =========================================================================

    /// Blocked requests on `page`. Zero for unknown pages.
    pub fn blocked_count(&self, page: PageId) -> usize {
        self.session(page).map_or(0, |s| s.blocked_count())
    }

    /// Evaluated requests on `page`. Zero for unknown pages.
    pub fn total_count(&self, page: PageId) -> usize {
        self.session(page).map_or(0, |s| s.total_count())
    }

    pub fn page_info(&self, page: PageId) -> Option<PageInfo> {
        self.session(page).map(|s| s.snapshot())
    }

    pub fn page_report(&self, page: PageId) -> Option<PageReport> {
        self.page_info(page).map(|info| info.report())
    }

    pub fn page_state(&self, page: PageId) -> Option<PageState> {
        self.session(page).map(|s| s.state())
    }

    pub fn protection_status(&self, page: PageId) -> Option<ProtectionStatus> {
        self.session(page).map(|s| s.protection_status())
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn set_global_default(&self, feature: FilterFeature, enabled: bool) {
        self.permissions(feature).set_global_default(enabled);
    }

    pub fn set_origin_override(
        &self,
        feature: FilterFeature,
        origin: &str,
        setting: ContentSetting,
        incognito: bool,
    ) -> Result<(), PermissionError> {
        self.permissions(feature)
            .set_origin_override(origin, setting, incognito)
    }

    pub fn clear_origin_override(&self, feature: FilterFeature, origin: &str, incognito: bool) {
        self.permissions(feature)
            .clear_origin_override(origin, incognito);
    }

    pub fn use_default_for_origin(&self, feature: FilterFeature, origin: &str) {
        self.permissions(feature).use_default_for_origin(origin);
    }

    pub fn effective_setting(
        &self,
        feature: FilterFeature,
        origin: &str,
        incognito: bool,
    ) -> EffectiveSetting {
        self.permissions(feature)
            .effective_setting(origin, incognito)
    }
}
