//! Settings snapshots
//!
//! Settings travel with every state/dump/load call. Two keys are
//! recognized by the core: `version` and `constraint_policy`. Everything
//! else is free-form and forwarded to components and drivers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{TesseraError, Value, Version};

pub const VERSION_KEY: &str = "version";
pub const CONSTRAINT_POLICY_KEY: &str = "constraint_policy";

/// How constraint violations are handled on dump and load
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConstraintPolicy {
    /// Violating values pass through untouched
    Ignore,
    /// Violating values are reshaped (clamped/converted); failure to reshape is fatal
    Coerce,
    /// Any violation is fatal
    #[default]
    Strict,
}

impl ConstraintPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintPolicy::Ignore => "ignore",
            ConstraintPolicy::Coerce => "coerce",
            ConstraintPolicy::Strict => "strict",
        }
    }
}

impl FromStr for ConstraintPolicy {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(ConstraintPolicy::Ignore),
            "coerce" | "reshape" => Ok(ConstraintPolicy::Coerce),
            "strict" => Ok(ConstraintPolicy::Strict),
            other => Err(TesseraError::InvalidSettings(format!(
                "invalid constraint policy: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ConstraintPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings snapshot
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    version: Option<Version>,
    constraint_policy: Option<ConstraintPolicy>,
    extra: BTreeMap<String, Value>,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn with_version(mut self, version: impl Into<Version>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_policy(mut self, policy: ConstraintPolicy) -> Self {
        self.constraint_policy = Some(policy);
        self
    }

    /// Set a key; `version` and `constraint_policy` are routed to their typed slots
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        // Malformed policies are dropped here; use `set` to observe the error.
        let _ = self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), TesseraError> {
        let key = key.into();
        let value = value.into();

        match key.as_str() {
            VERSION_KEY => self.version = Some(Version(value)),
            CONSTRAINT_POLICY_KEY => {
                let policy = value
                    .as_str()
                    .ok_or_else(|| TesseraError::InvalidSettings("constraint_policy must be text".into()))?
                    .parse()?;
                self.constraint_policy = Some(policy);
            }
            _ => {
                self.extra.insert(key, value);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Version looked up under an arbitrary key (the typed slot for `version`)
    pub fn version_at(&self, key: &str) -> Option<Version> {
        if key == VERSION_KEY {
            return self.version.clone();
        }
        self.extra.get(key).cloned().map(Version)
    }

    /// Effective constraint policy (strict when unset)
    #[inline]
    pub fn constraint_policy(&self) -> ConstraintPolicy {
        self.constraint_policy.unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(Value::as_bool)
    }

    pub fn contains(&self, key: &str) -> bool {
        match key {
            VERSION_KEY => self.version.is_some(),
            CONSTRAINT_POLICY_KEY => self.constraint_policy.is_some(),
            _ => self.extra.contains_key(key),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match key {
            VERSION_KEY => self.version.take().map(|v| v.0),
            CONSTRAINT_POLICY_KEY => self
                .constraint_policy
                .take()
                .map(|p| Value::from(p.as_str())),
            _ => self.extra.remove(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.constraint_policy.is_none() && self.extra.is_empty()
    }

    /// Iterate over the free-form keys
    pub fn extras(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.extra.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Layer these settings over `base`; keys set here win
    pub fn merged_over(&self, base: &Settings) -> Settings {
        let mut merged = base.clone();
        if let Some(v) = &self.version {
            merged.version = Some(v.clone());
        }
        if let Some(p) = self.constraint_policy {
            merged.constraint_policy = Some(p);
        }
        for (k, v) in &self.extra {
            merged.extra.insert(k.clone(), v.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_keys_are_typed() {
        let settings = Settings::new()
            .with("version", 2)
            .with("constraint_policy", "coerce")
            .with("big_endian", true);

        assert_eq!(settings.version(), Some(&Version::from(2)));
        assert_eq!(settings.constraint_policy(), ConstraintPolicy::Coerce);
        assert_eq!(settings.get_bool("big_endian"), Some(true));
        assert!(settings.get("version").is_none());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut settings = Settings::new();
        assert!(settings.set("constraint_policy", "lenient").is_err());
        assert_eq!(settings.constraint_policy(), ConstraintPolicy::Strict);
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = Settings::new().with_version(1).with("a", 1).with("b", 2);
        let overlay = Settings::new().with_version(3).with("b", 20);
        let merged = overlay.merged_over(&base);

        assert_eq!(merged.version(), Some(&Version::from(3)));
        assert_eq!(merged.get("a"), Some(&Value::from(1)));
        assert_eq!(merged.get("b"), Some(&Value::from(20)));
    }

    #[test]
    fn test_version_at_custom_key() {
        let settings = Settings::new().with("protocol", 7);
        assert_eq!(settings.version_at("protocol"), Some(Version::from(7)));
        assert_eq!(settings.version_at("version"), None);
    }

    #[test]
    fn test_reshape_is_coerce_alias() {
        assert_eq!("reshape".parse::<ConstraintPolicy>().unwrap(), ConstraintPolicy::Coerce);
    }
}
