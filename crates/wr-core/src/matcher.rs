//! Core Matching Engine
//!
//! This is the hot path - every sub-resource request goes through here.
//! The loaded sets live in a copy-on-write slice: `match_request` clones
//! one `Arc` under a short read lock and then runs lock-free, while
//! `add_rule_set` builds a new slice and swaps it in under the write lock.
//! A reader therefore sees either the old or the new list, never a
//! partially appended one.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ruleset::{PreparedRequest, RuleSet};
use crate::types::{Category, ResourceType, RuleAction};

// =============================================================================
// Tie Break Policy
// =============================================================================

/// How to choose between matching sets of equal priority and action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The set loaded first wins
    #[default]
    FirstLoaded,
    /// The set loaded last wins
    LastLoaded,
}

// =============================================================================
// Match Result
// =============================================================================

/// The winning rule set for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub category: Category,
    pub priority: i32,
    pub action: RuleAction,
    /// Load-order index of the winning set
    pub set_index: usize,
    /// Pattern text of the rule that matched
    pub pattern: String,
}

// =============================================================================
// Matcher
// =============================================================================

/// Evaluates requests against every loaded rule set.
#[derive(Debug)]
pub struct RuleMatcher {
    sets: RwLock<Arc<[Arc<RuleSet>]>>,
    tie_break: TieBreak,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::with_tie_break(TieBreak::default())
    }
}

impl RuleMatcher {
    /// Create an empty matcher with the default tie break.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tie_break(tie_break: TieBreak) -> Self {
        Self {
            sets: RwLock::new(Arc::from(Vec::new())),
            tie_break,
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Append a rule set. Returns its load-order index.
    pub fn add_rule_set(&self, set: RuleSet) -> usize {
        let mut guard = self.sets.write();
        let mut next: Vec<Arc<RuleSet>> = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::new(set));
        let index = next.len() - 1;
        *guard = Arc::from(next);
        index
    }

    /// Current immutable view of the loaded sets.
    pub fn rule_sets(&self) -> Arc<[Arc<RuleSet>]> {
        Arc::clone(&self.sets.read())
    }

    pub fn rule_set_count(&self) -> usize {
        self.sets.read().len()
    }

    /// Match a URL with no document context (first-party).
    pub fn match_url(&self, url: &str, resource_type: ResourceType) -> Option<RuleMatch> {
        let req = PreparedRequest::new(url, resource_type, "");
        self.match_request(&req)
    }

    /// Match a prepared request and return the winning set, if any.
    ///
    /// Highest priority wins. At equal priority an allow set beats a block
    /// set; remaining ties follow the configured [`TieBreak`].
    pub fn match_request(&self, req: &PreparedRequest<'_>) -> Option<RuleMatch> {
        let sets = self.rule_sets();

        let mut best: Option<MatchCandidate<'_>> = None;
        for (set_index, set) in sets.iter().enumerate() {
            // A set that cannot outrank the current best is not worth scanning
            if let Some(b) = &best {
                if !self.may_replace(b, set.priority(), set.action()) {
                    continue;
                }
            }
            if let Some(rule) = set.first_match(req) {
                best = Some(MatchCandidate {
                    set_index,
                    priority: set.priority(),
                    action: set.action(),
                    category: set.category(),
                    pattern: rule.pattern.as_str(),
                });
            }
        }

        best.map(|c| RuleMatch {
            category: c.category,
            priority: c.priority,
            action: c.action,
            set_index: c.set_index,
            pattern: c.pattern.to_string(),
        })
    }

    fn may_replace(&self, best: &MatchCandidate<'_>, priority: i32, action: RuleAction) -> bool {
        if priority != best.priority {
            return priority > best.priority;
        }
        match (best.action, action) {
            (RuleAction::Block, RuleAction::Allow) => true,
            (RuleAction::Allow, RuleAction::Block) => false,
            _ => self.tie_break == TieBreak::LastLoaded,
        }
    }
}

#[derive(Debug)]
struct MatchCandidate<'s> {
    set_index: usize,
    priority: i32,
    action: RuleAction,
    category: Category,
    pattern: &'s str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::{AnchorType, Pattern, Rule};

    fn block_set(name: &str, category: Category, priority: i32, patterns: &[&str]) -> RuleSet {
        RuleSet::from_patterns(name, category, priority, patterns.iter().copied()).unwrap()
    }

    fn allow_set(name: &str, priority: i32, pattern: &str) -> RuleSet {
        let rule = Rule::new(Pattern::new(pattern, AnchorType::None, false).unwrap());
        RuleSet::new(name, Category::Ads, priority, RuleAction::Allow, vec![rule]).unwrap()
    }

    #[test]
    fn test_no_sets_no_match() {
        let matcher = RuleMatcher::new();
        assert_eq!(matcher.match_url("https://example.com/ad.js", ResourceType::Script), None);
    }

    #[test]
    fn test_highest_priority_wins() {
        let matcher = RuleMatcher::new();
        matcher.add_rule_set(block_set("ads", Category::Ads, 1, &["track"]));
        matcher.add_rule_set(block_set("trackers", Category::Trackers, 5, &["track"]));

        let m = matcher.match_url("https://t.net/track.js", ResourceType::Script).unwrap();
        assert_eq!(m.category, Category::Trackers);
        assert_eq!(m.priority, 5);
        assert_eq!(m.set_index, 1);
    }

    #[test]
    fn test_tie_break_policies() {
        let first = RuleMatcher::new();
        let last = RuleMatcher::with_tie_break(TieBreak::LastLoaded);
        for matcher in [&first, &last] {
            matcher.add_rule_set(block_set("ads", Category::Ads, 3, &["pixel"]));
            matcher.add_rule_set(block_set("malware", Category::MalwareDomains, 3, &["pixel"]));
        }

        let url = "https://cdn.net/pixel.gif";
        assert_eq!(first.match_url(url, ResourceType::Image).unwrap().category, Category::Ads);
        assert_eq!(
            last.match_url(url, ResourceType::Image).unwrap().category,
            Category::MalwareDomains
        );
    }

    #[test]
    fn test_allow_beats_block_at_equal_priority() {
        let matcher = RuleMatcher::new();
        matcher.add_rule_set(block_set("ads", Category::Ads, 2, &["ad_"]));
        matcher.add_rule_set(allow_set("exceptions", 2, "ad_img"));

        let m = matcher.match_url("http://localhost/ad_img01.jpg", ResourceType::Image).unwrap();
        assert_eq!(m.action, RuleAction::Allow);

        let m = matcher.match_url("http://localhost/ad_script01.js", ResourceType::Script).unwrap();
        assert_eq!(m.action, RuleAction::Block);
    }

    #[test]
    fn test_higher_priority_block_beats_allow() {
        let matcher = RuleMatcher::new();
        matcher.add_rule_set(allow_set("exceptions", 1, "ad_img"));
        matcher.add_rule_set(block_set("ads", Category::Ads, 9, &["ad_"]));

        let m = matcher.match_url("http://localhost/ad_img01.jpg", ResourceType::Image).unwrap();
        assert_eq!(m.action, RuleAction::Block);
        assert_eq!(m.pattern, "ad_");
    }

    #[test]
    fn test_snapshot_is_stable_across_add() {
        let matcher = RuleMatcher::new();
        matcher.add_rule_set(block_set("ads", Category::Ads, 1, &["ad_"]));
        let view = matcher.rule_sets();
        matcher.add_rule_set(block_set("trackers", Category::Trackers, 1, &["trk"]));

        assert_eq!(view.len(), 1);
        assert_eq!(matcher.rule_set_count(), 2);
    }

    #[test]
    fn test_concurrent_match_and_add() {
        let matcher = Arc::new(RuleMatcher::new());
        matcher.add_rule_set(block_set("ads", Category::Ads, 1, &["ad_"]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let matcher = Arc::clone(&matcher);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let m = matcher.match_url("http://localhost/ad_img.png", ResourceType::Image);
                        assert!(m.is_some());
                    }
                })
            })
            .collect();

        for i in 0..50 {
            matcher.add_rule_set(block_set(&format!("extra{}", i), Category::Trackers, 0, &["zzz"]));
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(matcher.rule_set_count(), 51);
    }
}
