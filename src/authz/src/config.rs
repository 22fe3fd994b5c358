//! Engine configuration
//!
//! Every setting has a default and can be overridden from the environment:
//!
//! - `ROLEGRAPH_MAX_DEPTH` - maximum group nesting depth (default: 64)
//! - `ROLEGRAPH_MAX_GROUPS` - maximum groups expanded per resolution (default: 10000)
//! - `ROLEGRAPH_ENABLE_CACHE` - enable the principal role cache (default: true)
//! - `ROLEGRAPH_CACHE_CAPACITY` - cached principals (default: 10000)
//! - `ROLEGRAPH_CACHE_TTL_SECS` - optional entry lifetime, unset means no expiry

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Traversal bounds for the group resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum nesting depth below a seed group
    pub max_depth: usize,

    /// Maximum number of groups expanded in one resolution
    pub max_groups: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_groups: 10_000,
        }
    }
}

/// Principal role cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached principals
    pub capacity: usize,

    /// Optional lifetime of a cached role set
    #[serde(with = "ttl_secs")]
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: None,
        }
    }
}

/// Role engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable the principal role cache
    pub enable_cache: bool,

    /// Resolver traversal bounds
    pub resolver: ResolverConfig,

    /// Cache configuration
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            resolver: ResolverConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `ROLEGRAPH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(depth) = parse_var(&lookup, "ROLEGRAPH_MAX_DEPTH")? {
            config.resolver.max_depth = depth;
        }
        if let Some(groups) = parse_var(&lookup, "ROLEGRAPH_MAX_GROUPS")? {
            config.resolver.max_groups = groups;
        }
        if let Some(enabled) = parse_var(&lookup, "ROLEGRAPH_ENABLE_CACHE")? {
            config.enable_cache = enabled;
        }
        if let Some(capacity) = parse_var(&lookup, "ROLEGRAPH_CACHE_CAPACITY")? {
            config.cache.capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ROLEGRAPH_CACHE_TTL_SECS")? {
            config.cache.ttl = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resolver.max_depth == 0 {
            return Err(AuthzError::InvalidArgument(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.resolver.max_groups == 0 {
            return Err(AuthzError::InvalidArgument(
                "max_groups must be at least 1".to_string(),
            ));
        }
        if self.enable_cache && self.cache.capacity == 0 {
            return Err(AuthzError::InvalidArgument(
                "cache capacity must be at least 1 when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AuthzError::InvalidArgument(format!("{}='{}': {}", key, raw, e))),
        _ => Ok(None),
    }
}

mod ttl_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(ttl) => s.serialize_some(&ttl.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.enable_cache);
        assert_eq!(config.resolver.max_depth, 64);
        assert_eq!(config.cache.ttl, None);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ROLEGRAPH_MAX_DEPTH", "8"),
            ("ROLEGRAPH_MAX_GROUPS", "100"),
            ("ROLEGRAPH_ENABLE_CACHE", "false"),
            ("ROLEGRAPH_CACHE_CAPACITY", "50"),
            ("ROLEGRAPH_CACHE_TTL_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.resolver.max_depth, 8);
        assert_eq!(config.resolver.max_groups, 100);
        assert!(!config.enable_cache);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.ttl, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_values() {
        let err = EngineConfig::from_lookup(lookup(&[("ROLEGRAPH_MAX_DEPTH", "deep")]))
            .unwrap_err();
        assert!(err.to_string().contains("ROLEGRAPH_MAX_DEPTH"));

        let err = EngineConfig::from_lookup(lookup(&[("ROLEGRAPH_MAX_GROUPS", "0")]))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"cache": {"ttl": 5}, "resolver": {"max_depth": 3}}"#)
                .unwrap();

        assert_eq!(config.cache.ttl, Some(Duration::from_secs(5)));
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.resolver.max_depth, 3);
        assert_eq!(config.resolver.max_groups, 10_000);
    }
}
