//! Analyzer configuration sourced from defaults or `ROUTEMAP_*` environment variables.

use serde::Deserialize;

/// Default number of entries kept by a [`crate::cache::UnitCache`].
pub const DEFAULT_UNIT_CACHE_CAPACITY: usize = 4096;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Worker threads for per-unit extraction. `1` runs sequentially.
    pub workers: usize,
    /// Report statements that more than one idiom matched.
    pub flag_ambiguous_matches: bool,
    /// Entries kept by the incremental unit cache. `0` disables caching.
    pub unit_cache_capacity: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            flag_ambiguous_matches: true,
            unit_cache_capacity: DEFAULT_UNIT_CACHE_CAPACITY,
        }
    }
}

impl AnalyzerConfig {
    /// Read `ROUTEMAP_WORKERS`, `ROUTEMAP_FLAG_AMBIGUOUS` and `ROUTEMAP_UNIT_CACHE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let workers = lookup("ROUTEMAP_WORKERS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.workers);
        let flag_ambiguous_matches = lookup("ROUTEMAP_FLAG_AMBIGUOUS")
            .map(|v| truthy(&v))
            .unwrap_or(defaults.flag_ambiguous_matches);
        let unit_cache_capacity = match lookup("ROUTEMAP_UNIT_CACHE") {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) => n,
                Err(_) if truthy(&v) => defaults.unit_cache_capacity,
                Err(_) => 0,
            },
            None => defaults.unit_cache_capacity,
        };
        Self {
            workers,
            flag_ambiguous_matches,
            unit_cache_capacity,
        }
    }
}

fn truthy(raw: &str) -> bool {
    let v = raw.trim().to_lowercase();
    !matches!(v.as_str(), "0" | "false" | "no" | "off")
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AnalyzerConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, AnalyzerConfig::default());
        assert!(config.workers >= 1);
        assert!(config.flag_ambiguous_matches);
    }

    #[test]
    fn test_env_overrides() {
        let config = AnalyzerConfig::from_lookup(lookup_from(&[
            ("ROUTEMAP_WORKERS", "3"),
            ("ROUTEMAP_FLAG_AMBIGUOUS", "off"),
            ("ROUTEMAP_UNIT_CACHE", "16"),
        ]));
        assert_eq!(config.workers, 3);
        assert!(!config.flag_ambiguous_matches);
        assert_eq!(config.unit_cache_capacity, 16);
    }

    #[test]
    fn test_invalid_workers_falls_back() {
        let config = AnalyzerConfig::from_lookup(lookup_from(&[
            ("ROUTEMAP_WORKERS", "zero"),
            ("ROUTEMAP_UNIT_CACHE", "no"),
        ]));
        assert_eq!(config.workers, AnalyzerConfig::default().workers);
        assert_eq!(config.unit_cache_capacity, 0);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"workers": 2}"#).expect("valid config json");
        assert_eq!(config.workers, 2);
        assert!(config.flag_ambiguous_matches);
    }
}
