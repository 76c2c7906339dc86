//! Engine configuration file
//!
//! ```json
//! {
//!   "rule_sets": [
//!     { "path": "ads.txt", "category": "ads", "priority": 1 },
//!     { "path": "allow.txt", "category": "ads", "priority": 2, "action": "allow" }
//!   ],
//!   "preferences": { "web_refiner": true, "web_defender": true },
//!   "origins": {
//!     "web_refiner": [ { "origin": "https://news.example.com", "setting": "block" } ]
//!   },
//!   "tie_break": "first_loaded"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wr_core::{
    Category, ContentSetting, FilterEngine, FilterFeature, GlobalPreferences, RuleAction,
    SettingKind, TieBreak,
};
use wr_rules::{LoadOptions, RuleSource};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Config has no rule sets")]
    NoRuleSets,
    #[error("max_rejected_ratio must be within 0..=1, got {0}")]
    BadRatio(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    /// Display name; defaults to the file name
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
    pub category: Category,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub action: RuleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginSetting {
    pub origin: String,
    pub setting: ContentSetting,
}

/// Persisted per-origin settings, one list per feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginSettings {
    pub web_refiner: Vec<OriginSetting>,
    pub web_defender: Vec<OriginSetting>,
}

impl OriginSettings {
    fn for_feature(&self, feature: FilterFeature) -> &[OriginSetting] {
        match feature {
            FilterFeature::WebRefiner => &self.web_refiner,
            FilterFeature::WebDefender => &self.web_defender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rule_sets: Vec<RuleSetConfig>,
    pub preferences: GlobalPreferences,
    pub origins: OriginSettings,
    pub tie_break: TieBreak,
    pub max_rejected_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rule_sets: Vec::new(),
            preferences: GlobalPreferences::default(),
            origins: OriginSettings::default(),
            tie_break: TieBreak::default(),
            max_rejected_ratio: LoadOptions::default().max_rejected_ratio,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        // Rule paths are relative to the config file
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for rs in &mut self.rule_sets {
            if rs.path.is_relative() {
                rs.path = base.join(&rs.path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rule_sets.is_empty() {
            return Err(ConfigError::NoRuleSets);
        }
        if !(0.0..=1.0).contains(&self.max_rejected_ratio) {
            return Err(ConfigError::BadRatio(self.max_rejected_ratio));
        }
        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            max_rejected_ratio: self.max_rejected_ratio,
        }
    }

    pub fn rule_sources(&self) -> Vec<RuleSource> {
        self.rule_sets
            .iter()
            .map(|rs| {
                let name = rs.name.clone().unwrap_or_else(|| {
                    rs.path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| rs.path.display().to_string())
                });
                RuleSource::file(name, rs.category, rs.priority, rs.path.clone()).with_action(rs.action)
            })
            .collect()
    }

    /// Engine with the configured defaults and persisted origin settings
    /// applied. Rule sets are not loaded.
    pub fn build_engine(&self) -> FilterEngine {
        let engine = FilterEngine::with_preferences(&self.preferences, self.tie_break);
        for feature in FilterFeature::ALL {
            let enabled = SettingKind::from(feature).is_enabled(&self.preferences);
            let persisted = self
                .origins
                .for_feature(feature)
                .iter()
                .map(|o| (o.origin.as_str(), o.setting));
            engine
                .permissions(feature)
                .apply_initial_preferences(enabled, persisted);
        }
        engine
    }
}
