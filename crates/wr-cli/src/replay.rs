//! Page load replay
//!
//! A pages file lists page loads as the loading layer would report them:
//!
//! ```json
//! [
//!   {
//!     "page": 1,
//!     "origin": "http://localhost:8000",
//!     "requests": [
//!       { "url": "http://localhost:8000/ad_img01.jpg", "type": "image" }
//!     ],
//!     "trackers": [
//!       { "domain": "tracker.example.net", "methods": ["cookies", "canvas"] }
//!     ]
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use wr_core::{
    FilterEngine, PageId, PageInfo, PageReport, ProtectionStatus, ResourceType, TrackingMethods,
};

#[derive(Debug, Clone, Deserialize)]
pub struct PageLoad {
    pub page: u64,
    pub origin: String,
    #[serde(default)]
    pub incognito: bool,
    #[serde(default)]
    pub requests: Vec<RequestEntry>,
    #[serde(default)]
    pub trackers: Vec<TrackerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestEntry {
    pub url: String,
    /// Network-layer type name; unknown names count as `other`
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerEntry {
    pub domain: String,
    #[serde(default)]
    pub methods: Vec<MethodName>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodName {
    Cookies,
    LocalStorage,
    Canvas,
    Fonts,
}

impl MethodName {
    fn flag(self) -> TrackingMethods {
        match self {
            Self::Cookies => TrackingMethods::HTTP_COOKIES,
            Self::LocalStorage => TrackingMethods::HTML5_LOCAL_STORAGE,
            Self::Canvas => TrackingMethods::CANVAS_FINGERPRINT,
            Self::Fonts => TrackingMethods::FONT_ENUMERATION,
        }
    }
}

/// What one replayed page load produced.
#[derive(Debug, Clone, Serialize)]
pub struct PageOutcome {
    pub page: u64,
    pub origin: String,
    pub incognito: bool,
    pub report: PageReport,
    pub summary: Option<String>,
    pub protection: ProtectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<PageInfo>,
}

pub fn parse_pages(text: &str) -> Result<Vec<PageLoad>, serde_json::Error> {
    serde_json::from_str(text)
}

/// Run each page load through `engine` as one main-frame navigation.
pub fn replay(engine: &FilterEngine, pages: &[PageLoad], details: bool) -> Vec<PageOutcome> {
    let mut outcomes = Vec::with_capacity(pages.len());

    for load in pages {
        let page = PageId(load.page);
        engine.open_page(page, load.incognito);
        engine.on_navigation_started(page, true, load.incognito);

        for req in &load.requests {
            let ty = req
                .resource_type
                .as_deref()
                .map_or(ResourceType::Other, ResourceType::from_str);
            engine.evaluate(page, &load.origin, &req.url, ty, load.incognito);
        }
        for tracker in &load.trackers {
            let methods = tracker
                .methods
                .iter()
                .fold(TrackingMethods::empty(), |acc, m| acc | m.flag());
            engine.observe_tracker(page, &load.origin, &tracker.domain, methods, load.incognito);
        }
        engine.on_load_finished(page);

        let protection = engine.protection_status(page).unwrap_or_default();
        let info = engine.close_page(page).unwrap_or_default();
        let report = info.report();
        outcomes.push(PageOutcome {
            page: load.page,
            origin: load.origin.clone(),
            incognito: load.incognito,
            summary: report.summary(),
            report,
            protection,
            details: details.then_some(info),
        });
    }

    outcomes
}
