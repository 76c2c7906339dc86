//! Rule source loading
//!
//! Each source is parsed, deduplicated and split into at most two rule
//! sets: its block rules and its `@@` allow rules. A source that cannot be
//! read, yields no rules or rejects too many lines is skipped with a
//! warning; the other sources still load.

use std::borrow::Cow;
use std::path::PathBuf;

use log::{debug, info, warn};
use wr_core::{Category, FilterEngine, RuleAction, RuleSet, RuleSetError};

use crate::error::LoadError;
use crate::optimizer::optimize_rules;
use crate::parser::{parse_rule_list, RejectedLine};

/// Where a source's text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleText {
    Inline(String),
    File(PathBuf),
}

/// One rule list to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    pub name: String,
    pub category: Category,
    pub priority: i32,
    /// Action of the list's unprefixed rules
    pub action: RuleAction,
    pub text: RuleText,
}

impl RuleSource {
    pub fn inline(name: impl Into<String>, category: Category, priority: i32, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            priority,
            action: RuleAction::Block,
            text: RuleText::Inline(text.into()),
        }
    }

    pub fn file(name: impl Into<String>, category: Category, priority: i32, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            category,
            priority,
            action: RuleAction::Block,
            text: RuleText::File(path.into()),
        }
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    fn read(&self) -> Result<Cow<'_, str>, LoadError> {
        match &self.text {
            RuleText::Inline(text) => Ok(Cow::Borrowed(text.as_str())),
            RuleText::File(path) => {
                let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
                    name: self.name.clone(),
                    source,
                })?;
                String::from_utf8(bytes)
                    .map(Cow::Owned)
                    .map_err(|_| LoadError::NotUtf8(self.name.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// Largest tolerated share of rejected rule lines, in `0.0..=1.0`
    pub max_rejected_ratio: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_rejected_ratio: 0.5,
        }
    }
}

/// Per-source numbers from a successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub name: String,
    /// Rules kept after deduplication
    pub rules: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub deduped: usize,
    pub rejected_lines: Vec<RejectedLine>,
}

impl SourceStats {
    /// Lines that were meant to be rules, before deduplication.
    pub fn rule_lines(&self) -> usize {
        self.rules + self.deduped + self.rejected
    }
}

/// Rule sets compiled from one source.
#[derive(Debug, Clone)]
pub struct CompiledSource {
    pub sets: Vec<RuleSet>,
    pub stats: SourceStats,
}

/// Outcome of loading a batch of sources.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub sets: Vec<RuleSet>,
    pub loaded: Vec<SourceStats>,
    pub failed: Vec<(String, LoadError)>,
}

/// Compile one source into its block and allow rule sets.
pub fn compile_source(source: &RuleSource, options: &LoadOptions) -> Result<CompiledSource, LoadError> {
    let text = source.read()?;
    let mut list = parse_rule_list(&text);

    for line in &list.rejected {
        debug!("{}:{}: {} ({})", source.name, line.line_no, line.error, line.text);
    }

    let total = list.rule_lines();
    let rejected = list.rejected.len();
    if total > 0 && rejected as f64 / total as f64 > options.max_rejected_ratio {
        return Err(LoadError::TooManyRejected {
            name: source.name.clone(),
            rejected,
            total,
        });
    }

    let stats = optimize_rules(&mut list.rules);

    let mut primary = Vec::new();
    let mut exceptions = Vec::new();
    for parsed in list.rules {
        if parsed.action == RuleAction::Allow && source.action == RuleAction::Block {
            exceptions.push(parsed.rule);
        } else {
            primary.push(parsed.rule);
        }
    }

    let rules = primary.len() + exceptions.len();
    let mut sets = Vec::with_capacity(2);
    if !primary.is_empty() {
        sets.push(RuleSet::new(
            source.name.clone(),
            source.category,
            source.priority,
            source.action,
            primary,
        )?);
    }
    if !exceptions.is_empty() {
        sets.push(RuleSet::new(
            format!("{} (exceptions)", source.name),
            source.category,
            source.priority,
            RuleAction::Allow,
            exceptions,
        )?);
    }
    if sets.is_empty() {
        return Err(RuleSetError::NoRules(source.name.clone()).into());
    }

    Ok(CompiledSource {
        sets,
        stats: SourceStats {
            name: source.name.clone(),
            rules,
            rejected,
            skipped: list.skipped,
            deduped: stats.deduped,
            rejected_lines: list.rejected,
        },
    })
}

/// Compile every source, skipping the ones that fail.
pub fn load_rule_sets(sources: &[RuleSource], options: &LoadOptions) -> LoadReport {
    let mut report = LoadReport::default();

    for source in sources {
        match compile_source(source, options) {
            Ok(compiled) => {
                info!(
                    "compiled '{}': {} rules ({} rejected, {} duplicates)",
                    compiled.stats.name,
                    compiled.stats.rules,
                    compiled.stats.rejected,
                    compiled.stats.deduped
                );
                report.sets.extend(compiled.sets);
                report.loaded.push(compiled.stats);
            }
            Err(e) => {
                warn!("skipping rule source '{}': {}", source.name, e);
                report.failed.push((source.name.clone(), e));
            }
        }
    }

    report
}

impl LoadReport {
    /// Hand the compiled sets to `engine` and mark its rules as loaded.
    /// Returns the number of sets installed.
    pub fn install(self, engine: &FilterEngine) -> usize {
        let count = self.sets.len();
        for set in self.sets {
            engine.add_rule_set(set);
        }
        engine.mark_rules_loaded();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wr_core::{Action, InitStatus, PageId, ResourceType};

    #[test]
    fn test_mixed_list_splits_exceptions() {
        let source = RuleSource::inline("ads", Category::Ads, 1, "ad_\n@@ad_ok\n");
        let compiled = compile_source(&source, &LoadOptions::default()).unwrap();

        assert_eq!(compiled.sets.len(), 2);
        assert_eq!(compiled.sets[0].action(), RuleAction::Block);
        assert_eq!(compiled.sets[1].action(), RuleAction::Allow);
        assert_eq!(compiled.sets[1].name(), "ads (exceptions)");
        assert_eq!(compiled.stats.rules, 2);
    }

    #[test]
    fn test_allow_source_keeps_one_set() {
        let source = RuleSource::inline("whitelist", Category::Ads, 5, "ad_ok\n@@ad_fine\n")
            .with_action(RuleAction::Allow);
        let compiled = compile_source(&source, &LoadOptions::default()).unwrap();
        assert_eq!(compiled.sets.len(), 1);
        assert_eq!(compiled.sets[0].len(), 2);
    }

    #[test]
    fn test_bad_sources_are_skipped() {
        let sources = vec![
            RuleSource::inline("ads", Category::Ads, 1, "ad_img\nad_script\n"),
            RuleSource::inline("empty", Category::Trackers, 1, "! nothing here\n"),
            RuleSource::inline("junk", Category::Trackers, 1, "a$x\nb$y\nc\n"),
            RuleSource::file("missing", Category::MalwareDomains, 1, "/nonexistent/rules.txt"),
        ];
        let report = load_rule_sets(&sources, &LoadOptions::default());

        assert_eq!(report.sets.len(), 1);
        assert_eq!(report.loaded.len(), 1);
        let failed: Vec<_> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(failed, ["empty", "junk", "missing"]);
        assert!(matches!(report.failed[0].1, LoadError::RuleSet(RuleSetError::NoRules(_))));
        assert!(matches!(
            report.failed[1].1,
            LoadError::TooManyRejected { rejected: 2, total: 3, .. }
        ));
        assert!(matches!(report.failed[2].1, LoadError::Io { .. }));
    }

    #[test]
    fn test_rejected_ratio_limit() {
        let source = RuleSource::inline("half", Category::Ads, 1, "ok1\nbad$nope\n");
        assert!(compile_source(&source, &LoadOptions::default()).is_ok());

        let strict = LoadOptions {
            max_rejected_ratio: 0.0,
        };
        assert!(compile_source(&source, &strict).is_err());
    }

    #[test]
    fn test_stats_keep_rejected_lines() {
        let source = RuleSource::inline("ads", Category::Ads, 1, "ad_img\nad_img\nad_x$popup\n! c\nad_js\n");
        let stats = compile_source(&source, &LoadOptions::default()).unwrap().stats;

        assert_eq!(stats.rules, 2);
        assert_eq!(stats.deduped, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.rule_lines(), 4);
        assert_eq!(stats.rejected_lines.len(), 1);
        assert_eq!(stats.rejected_lines[0].line_no, 3);
        assert_eq!(stats.rejected_lines[0].text, "ad_x$popup");
    }

    #[test]
    fn test_hosts_list_leaves_localhost_alone() {
        let sources = vec![RuleSource::inline(
            "hosts",
            Category::Trackers,
            1,
            "127.0.0.1 localhost\n::1 localhost\n0.0.0.0 0.0.0.0\n0.0.0.0 ads.example.net\n",
        )];
        let engine = FilterEngine::new();
        assert_eq!(load_rule_sets(&sources, &LoadOptions::default()).install(&engine), 1);

        let local = engine.evaluate(
            PageId(1),
            "http://localhost:8000",
            "http://localhost:8000/app.js",
            ResourceType::Script,
            false,
        );
        assert_eq!(local, Action::Allowed);
        let ad = engine.evaluate(
            PageId(1),
            "http://localhost:8000",
            "https://ads.example.net/banner.png",
            ResourceType::Image,
            false,
        );
        assert_eq!(ad, Action::Blocked);
    }

    #[test]
    fn test_install_into_engine() {
        let sources = vec![RuleSource::inline(
            "ads",
            Category::Ads,
            1,
            "ad_frame\nad_img\nad_style\nad_script\n",
        )];
        let engine = FilterEngine::new();
        let installed = load_rule_sets(&sources, &LoadOptions::default()).install(&engine);

        assert_eq!(installed, 1);
        assert_eq!(engine.status(), InitStatus::Ready { rule_sets: 1 });
        let action = engine.evaluate(
            PageId(1),
            "http://localhost",
            "http://localhost/ad_img01.jpg",
            ResourceType::Image,
            false,
        );
        assert_eq!(action, Action::Blocked);
    }
}
