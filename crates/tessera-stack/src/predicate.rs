//! Stack predicates

use tessera_core::{Bounded, Settings, Version, VERSION_KEY};

use crate::Component;

/// Decides whether a component is live under some settings
pub trait Predicate: Send + Sync {
    fn matches(&self, component: &Component, settings: &Settings) -> bool;
}

/// Every component is live
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysPredicate;

impl Predicate for AlwaysPredicate {
    fn matches(&self, _component: &Component, _settings: &Settings) -> bool {
        true
    }
}

/// Live when `version_added <= version < version_removed`.
///
/// Unset bounds and an unset version fall back to the configured
/// sentinels, so by default a component without bounds is always live
/// and, without a version in the settings, every component is compared
/// as if at the greatest version.
#[derive(Clone, Debug)]
pub struct VersionPredicate {
    /// Settings key holding the evaluated version
    pub settings_version_key: String,
    /// Component settings keys consulted when a bound is not set directly
    pub added_key: String,
    pub removed_key: String,
    pub default_version: Bounded<Version>,
    pub default_added: Bounded<Version>,
    pub default_removed: Bounded<Version>,
}

impl Default for VersionPredicate {
    fn default() -> Self {
        Self {
            settings_version_key: VERSION_KEY.into(),
            added_key: "version_added".into(),
            removed_key: "version_removed".into(),
            default_version: Bounded::Greatest,
            default_added: Bounded::Least,
            default_removed: Bounded::Greatest,
        }
    }
}

impl VersionPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate components at this version when the settings carry none
    pub fn with_default_version(mut self, version: impl Into<Version>) -> Self {
        self.default_version = Bounded::Value(version.into());
        self
    }

    pub fn version_of(&self, settings: &Settings) -> Bounded<Version> {
        Bounded::from_option(
            settings.version_at(&self.settings_version_key),
            self.default_version.clone(),
        )
    }

    pub fn bounds_of(&self, component: &Component) -> (Bounded<Version>, Bounded<Version>) {
        let own = component.settings();
        let added = component
            .version_added()
            .cloned()
            .or_else(|| own.version_at(&self.added_key));
        let removed = component
            .version_removed()
            .cloned()
            .or_else(|| own.version_at(&self.removed_key));
        (
            Bounded::from_option(added, self.default_added.clone()),
            Bounded::from_option(removed, self.default_removed.clone()),
        )
    }
}

impl Predicate for VersionPredicate {
    fn matches(&self, component: &Component, settings: &Settings) -> bool {
        let version = self.version_of(settings);
        let (added, removed) = self.bounds_of(component);
        added.at_or_below(&version) && removed.above(&version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(version: i32) -> Settings {
        Settings::new().with_version(version)
    }

    #[test]
    fn test_removal_is_exclusive() {
        let p = VersionPredicate::new();
        let c = Component::int8().added(1).removed(3);
        assert!(!p.matches(&c, &at(0)));
        assert!(p.matches(&c, &at(1)));
        assert!(p.matches(&c, &at(2)));
        assert!(!p.matches(&c, &at(3)));
    }

    #[test]
    fn test_unset_version_is_greatest() {
        let p = VersionPredicate::new();
        assert!(p.matches(&Component::int8().added(100), &Settings::new()));
        assert!(!p.matches(&Component::int8().removed(100), &Settings::new()));
        assert!(p.matches(&Component::int8(), &Settings::new()));
        assert!(p.matches(&Component::int8(), &at(0)));
    }

    #[test]
    fn test_bounds_from_component_settings() {
        let p = VersionPredicate::new();
        let c = Component::int8().setting("version_added", 2);
        assert!(!p.matches(&c, &at(1)));
        assert!(p.matches(&c, &at(2)));
    }

    #[test]
    fn test_tuple_versions() {
        let p = VersionPredicate::new();
        let c = Component::int8().added((1, "beta"));
        assert!(p.matches(&c, &Settings::new().with_version((2, "alpha"))));
        assert!(!p.matches(&c, &Settings::new().with_version((1, "alpha"))));
    }

    #[test]
    fn test_default_version() {
        let p = VersionPredicate::new().with_default_version(0);
        assert!(!p.matches(&Component::int8().added(1), &Settings::new()));
    }

    #[test]
    fn test_always() {
        assert!(AlwaysPredicate.matches(&Component::text().removed(0), &at(5)));
    }
}
