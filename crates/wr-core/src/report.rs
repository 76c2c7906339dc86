//! Page report breakdowns for badges and detail screens.

use serde::{Deserialize, Serialize};

use crate::session::PageInfo;
use crate::types::{Action, Category, ResourceType};

/// Blocked requests per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub ads: usize,
    pub trackers: usize,
    pub malware: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::Ads => self.ads,
            Category::Trackers => self.trackers,
            Category::MalwareDomains => self.malware,
        }
    }

    fn bump(&mut self, category: Category) {
        match category {
            Category::Ads => self.ads += 1,
            Category::Trackers => self.trackers += 1,
            Category::MalwareDomains => self.malware += 1,
        }
    }
}

/// Blocked requests per resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub images: usize,
    pub scripts: usize,
    pub stylesheets: usize,
    pub subframes: usize,
    pub other: usize,
}

impl TypeCounts {
    pub fn get(&self, ty: ResourceType) -> usize {
        match ty {
            ResourceType::Image => self.images,
            ResourceType::Script => self.scripts,
            ResourceType::Stylesheet => self.stylesheets,
            ResourceType::SubFrame => self.subframes,
            ResourceType::Other => self.other,
        }
    }

    fn bump(&mut self, ty: ResourceType) {
        match ty {
            ResourceType::Image => self.images += 1,
            ResourceType::Script => self.scripts += 1,
            ResourceType::Stylesheet => self.stylesheets += 1,
            ResourceType::SubFrame => self.subframes += 1,
            ResourceType::Other => self.other += 1,
        }
    }
}

/// Aggregated view of a `PageInfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    pub total: usize,
    pub blocked: usize,
    pub whitelisted: usize,
    pub by_category: CategoryCounts,
    pub by_type: TypeCounts,
}

impl PageReport {
    /// Badge text, e.g. "2 ads and 1 tracker blocked".
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(3);
        let c = &self.by_category;
        if c.ads > 0 {
            parts.push(counted(c.ads, "ad", "ads"));
        }
        if c.trackers > 0 {
            parts.push(counted(c.trackers, "tracker", "trackers"));
        }
        if c.malware > 0 {
            parts.push(counted(c.malware, "malware domain", "malware domains"));
        }

        let list = match parts.split_last() {
            None => return None,
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
        };
        Some(format!("{} blocked", list))
    }
}

fn counted(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

impl PageInfo {
    /// Per-category and per-type breakdown of blocked requests.
    pub fn report(&self) -> PageReport {
        let mut report = PageReport {
            total: self.total_urls,
            blocked: self.blocked_urls,
            whitelisted: self.whitelisted_urls,
            ..PageReport::default()
        };
        for record in self.matched.iter().filter(|r| r.action == Action::Blocked) {
            if let Some(category) = record.category {
                report.by_category.bump(category);
            }
            report.by_type.bump(record.resource_type);
        }
        report
    }
}
