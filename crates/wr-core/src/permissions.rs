//! Per-origin permission resolution
//!
//! Two disjoint override stores sit above a global default:
//!
//! 1. incognito overrides (consulted only for incognito requests)
//! 2. persistent overrides
//! 3. the global default-enabled flag
//!
//! Overrides are read on every evaluation and written only when the user
//! changes a setting, so each store is a `RwLock`ed map. The incognito
//! store is replaced wholesale when the incognito session ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::PermissionError;
use crate::types::ContentSetting;
use crate::url::normalize_origin;

/// Which layer produced an effective setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    Incognito,
    Persistent,
    Default,
}

/// Effective setting for an origin together with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSetting {
    pub setting: ContentSetting,
    pub source: SettingSource,
}

impl EffectiveSetting {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.setting == ContentSetting::Allow
    }
}

/// Resolves whether a filter feature is enabled for an origin.
#[derive(Debug)]
pub struct PermissionResolver {
    default_enabled: AtomicBool,
    persistent: RwLock<HashMap<String, ContentSetting>>,
    incognito: RwLock<HashMap<String, ContentSetting>>,
    setup_complete: AtomicBool,
}

impl Default for PermissionResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PermissionResolver {
    pub fn new(default_enabled: bool) -> Self {
        Self {
            default_enabled: AtomicBool::new(default_enabled),
            persistent: RwLock::new(HashMap::new()),
            incognito: RwLock::new(HashMap::new()),
            setup_complete: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn global_default(&self) -> bool {
        self.default_enabled.load(Ordering::Acquire)
    }

    /// Resolve the enable/disable decision for an origin.
    pub fn is_enabled_for(&self, origin: &str, incognito: bool) -> bool {
        self.effective_setting(origin, incognito).is_enabled()
    }

    /// Resolve the effective setting and the layer it came from.
    pub fn effective_setting(&self, origin: &str, incognito: bool) -> EffectiveSetting {
        let key = normalize_origin(origin);

        if incognito {
            if let Some(&setting) = self.incognito.read().get(&key) {
                return EffectiveSetting {
                    setting,
                    source: SettingSource::Incognito,
                };
            }
        }

        if let Some(&setting) = self.persistent.read().get(&key) {
            return EffectiveSetting {
                setting,
                source: SettingSource::Persistent,
            };
        }

        EffectiveSetting {
            setting: ContentSetting::from_enabled(self.global_default()),
            source: SettingSource::Default,
        }
    }

    /// Explicit override stored for an origin in one namespace.
    pub fn setting_for_origin(&self, origin: &str, incognito: bool) -> Option<ContentSetting> {
        let key = normalize_origin(origin);
        self.store(incognito).read().get(&key).copied()
    }

    /// Incognito-only override for an origin.
    pub fn setting_for_incognito_origin(&self, origin: &str) -> Option<ContentSetting> {
        self.setting_for_origin(origin, true)
    }

    /// All overrides in one namespace, sorted by origin.
    pub fn overrides(&self, incognito: bool) -> Vec<(String, ContentSetting)> {
        let mut out: Vec<_> = self
            .store(incognito)
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // =========================================================================
    // Updates
    // =========================================================================

    pub fn set_global_default(&self, enabled: bool) {
        self.default_enabled.store(enabled, Ordering::Release);
        debug!("global default set to {}", enabled);
    }

    /// Store an override. `UseDefault` removes any existing override.
    pub fn set_origin_override(
        &self,
        origin: &str,
        setting: ContentSetting,
        incognito: bool,
    ) -> Result<(), PermissionError> {
        self.set_permission_for_origins(&[origin], setting, incognito)
    }

    /// Apply one setting to a batch of origins under a single write lock.
    pub fn set_permission_for_origins<S: AsRef<str>>(
        &self,
        origins: &[S],
        setting: ContentSetting,
        incognito: bool,
    ) -> Result<(), PermissionError> {
        if setting == ContentSetting::Ask {
            return Err(PermissionError::UnsupportedSetting(setting));
        }

        let mut keys = Vec::with_capacity(origins.len());
        for origin in origins {
            let origin = origin.as_ref();
            if origin.trim().is_empty() {
                return Err(PermissionError::InvalidOrigin(origin.to_string()));
            }
            keys.push(normalize_origin(origin));
        }

        let mut store = self.store(incognito).write();
        for key in keys {
            if setting == ContentSetting::UseDefault {
                store.remove(&key);
            } else {
                store.insert(key, setting);
            }
        }
        Ok(())
    }

    /// Remove an override in one namespace.
    pub fn clear_origin_override(&self, origin: &str, incognito: bool) {
        let key = normalize_origin(origin);
        self.store(incognito).write().remove(&key);
    }

    /// Remove overrides in both namespaces, reverting to the global default.
    pub fn use_default_for_origin(&self, origin: &str) {
        let key = normalize_origin(origin);
        self.persistent.write().remove(&key);
        self.incognito.write().remove(&key);
    }

    /// Wipe every incognito override at once.
    pub fn on_incognito_session_end(&self) {
        let dropped = std::mem::take(&mut *self.incognito.write());
        info!("incognito session ended, {} overrides discarded", dropped.len());
    }

    // =========================================================================
    // Startup
    // =========================================================================

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.load(Ordering::Acquire)
    }

    /// One-time convergence with persisted preferences.
    ///
    /// Splits the persisted settings into allow and block batches and applies
    /// them to the persistent store. Returns `false` (and does nothing) once
    /// setup has already completed. Entries that are neither `Allow` nor
    /// `Block` are ignored.
    pub fn apply_initial_preferences<I, S>(&self, enabled: bool, persisted: I) -> bool
    where
        I: IntoIterator<Item = (S, ContentSetting)>,
        S: AsRef<str>,
    {
        if self
            .setup_complete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.set_global_default(enabled);

        let mut allow_list = Vec::new();
        let mut block_list = Vec::new();
        for (origin, setting) in persisted {
            let origin = origin.as_ref();
            if origin.trim().is_empty() {
                continue;
            }
            match setting {
                ContentSetting::Allow => allow_list.push(normalize_origin(origin)),
                ContentSetting::Block => block_list.push(normalize_origin(origin)),
                ContentSetting::Ask | ContentSetting::UseDefault => {}
            }
        }

        let mut store = self.persistent.write();
        for origin in &allow_list {
            store.insert(origin.clone(), ContentSetting::Allow);
        }
        for origin in &block_list {
            store.insert(origin.clone(), ContentSetting::Block);
        }

        info!(
            "initial preferences applied: default={}, allow={}, block={}",
            enabled,
            allow_list.len(),
            block_list.len()
        );
        true
    }

    fn store(&self, incognito: bool) -> &RwLock<HashMap<String, ContentSetting>> {
        if incognito {
            &self.incognito
        } else {
            &self.persistent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_origin_uses_global_default() {
        let resolver = PermissionResolver::new(true);
        assert!(resolver.is_enabled_for("https://example.com", false));
        assert!(resolver.is_enabled_for("https://example.com", true));

        resolver.set_global_default(false);
        assert!(!resolver.is_enabled_for("https://example.com", false));
        assert_eq!(
            resolver.effective_setting("https://example.com", false).source,
            SettingSource::Default
        );
    }

    #[test]
    fn test_persistent_override() {
        let resolver = PermissionResolver::new(true);
        resolver
            .set_origin_override("https://example.com", ContentSetting::Block, false)
            .unwrap();

        assert!(!resolver.is_enabled_for("https://example.com", false));
        assert!(!resolver.is_enabled_for("https://EXAMPLE.com/some/page", true));
        assert!(resolver.is_enabled_for("https://other.com", false));
    }

    #[test]
    fn test_incognito_override_does_not_leak() {
        let resolver = PermissionResolver::new(true);
        resolver
            .set_origin_override("https://example.com", ContentSetting::Block, true)
            .unwrap();

        assert!(!resolver.is_enabled_for("https://example.com", true));
        assert!(resolver.is_enabled_for("https://example.com", false));
        assert_eq!(resolver.setting_for_origin("https://example.com", false), None);
        assert!(resolver.overrides(false).is_empty());
    }

    #[test]
    fn test_incognito_takes_precedence_over_persistent() {
        let resolver = PermissionResolver::new(true);
        resolver
            .set_origin_override("https://example.com", ContentSetting::Block, false)
            .unwrap();
        resolver
            .set_origin_override("https://example.com", ContentSetting::Allow, true)
            .unwrap();

        let eff = resolver.effective_setting("https://example.com", true);
        assert_eq!(eff.setting, ContentSetting::Allow);
        assert_eq!(eff.source, SettingSource::Incognito);
        assert!(!resolver.is_enabled_for("https://example.com", false));
    }

    #[test]
    fn test_incognito_session_end_wipes_all() {
        let resolver = PermissionResolver::new(true);
        let origins = ["https://a.com", "https://b.com", "http://c.com:8080"];
        resolver
            .set_permission_for_origins(&origins, ContentSetting::Block, true)
            .unwrap();
        resolver
            .set_origin_override("https://a.com", ContentSetting::Block, false)
            .unwrap();

        resolver.on_incognito_session_end();

        for origin in origins {
            assert_eq!(resolver.setting_for_incognito_origin(origin), None);
        }
        assert_eq!(
            resolver.setting_for_origin("https://a.com", false),
            Some(ContentSetting::Block)
        );
    }

    #[test]
    fn test_use_default_clears_both_layers() {
        let resolver = PermissionResolver::new(false);
        resolver
            .set_origin_override("https://a.com", ContentSetting::Allow, false)
            .unwrap();
        resolver
            .set_origin_override("https://a.com", ContentSetting::Allow, true)
            .unwrap();
        assert!(resolver.is_enabled_for("https://a.com", false));

        resolver.use_default_for_origin("https://a.com");
        assert!(!resolver.is_enabled_for("https://a.com", false));
        assert!(!resolver.is_enabled_for("https://a.com", true));
    }

    #[test]
    fn test_use_default_setting_removes_override() {
        let resolver = PermissionResolver::new(true);
        resolver
            .set_origin_override("https://a.com", ContentSetting::Block, false)
            .unwrap();
        resolver
            .set_origin_override("https://a.com", ContentSetting::UseDefault, false)
            .unwrap();
        assert_eq!(resolver.setting_for_origin("https://a.com", false), None);
    }

    #[test]
    fn test_rejects_ask_and_empty_origin() {
        let resolver = PermissionResolver::new(true);
        assert_eq!(
            resolver.set_origin_override("https://a.com", ContentSetting::Ask, false),
            Err(PermissionError::UnsupportedSetting(ContentSetting::Ask))
        );
        assert!(matches!(
            resolver.set_origin_override("  ", ContentSetting::Block, false),
            Err(PermissionError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn test_clear_origin_override_is_namespaced() {
        let resolver = PermissionResolver::new(true);
        resolver
            .set_origin_override("https://a.com", ContentSetting::Block, false)
            .unwrap();
        resolver
            .set_origin_override("https://a.com", ContentSetting::Block, true)
            .unwrap();

        resolver.clear_origin_override("https://a.com", true);
        assert_eq!(resolver.setting_for_incognito_origin("https://a.com"), None);
        assert_eq!(
            resolver.setting_for_origin("https://a.com", false),
            Some(ContentSetting::Block)
        );
    }

    #[test]
    fn test_apply_initial_preferences_once() {
        let resolver = PermissionResolver::new(true);
        let persisted = vec![
            ("https://allowed.com", ContentSetting::Allow),
            ("https://blocked.com", ContentSetting::Block),
            ("https://asked.com", ContentSetting::Ask),
        ];

        assert!(resolver.apply_initial_preferences(false, persisted.clone()));
        assert!(resolver.is_setup_complete());
        assert!(!resolver.global_default());
        assert!(resolver.is_enabled_for("https://allowed.com", false));
        assert!(!resolver.is_enabled_for("https://blocked.com", false));
        assert_eq!(resolver.setting_for_origin("https://asked.com", false), None);

        // Second call is a no-op, even with different input
        resolver.use_default_for_origin("https://allowed.com");
        assert!(!resolver.apply_initial_preferences(true, persisted));
        assert!(!resolver.global_default());
        assert_eq!(resolver.setting_for_origin("https://allowed.com", false), None);
    }

    #[test]
    fn test_overrides_sorted_by_origin() {
        let resolver = PermissionResolver::new(true);
        resolver
            .set_origin_override("https://zeta.com", ContentSetting::Allow, false)
            .unwrap();
        resolver
            .set_origin_override("https://alpha.com", ContentSetting::Block, false)
            .unwrap();
        resolver
            .set_origin_override("https://mid.com", ContentSetting::Block, true)
            .unwrap();

        let persistent = resolver.overrides(false);
        let origins: Vec<_> = persistent.iter().map(|(o, _)| o.as_str()).collect();
        assert_eq!(origins, ["https://alpha.com", "https://zeta.com"]);
        assert_eq!(persistent[0].1, ContentSetting::Block);
        assert_eq!(resolver.overrides(true).len(), 1);
    }
}
