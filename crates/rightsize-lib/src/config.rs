//! Static configuration for the pod mutator

use crate::error::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Immutable mutator configuration, built once at startup
#[derive(Debug, Clone)]
pub struct MutatorConfig {
    stats_url: Url,
    excluded_namespaces: HashSet<String>,
    excluded_pod_prefixes: Vec<String>,
}

impl MutatorConfig {
    /// Create a configuration for the given statistics endpoint with no exclusions
    pub fn new(stats_url: &str) -> Result<Self, ConfigError> {
        let stats_url = Url::parse(stats_url).map_err(|source| ConfigError::InvalidUrl {
            url: stats_url.to_string(),
            source,
        })?;

        Ok(Self {
            stats_url,
            excluded_namespaces: HashSet::new(),
            excluded_pod_prefixes: Vec::new(),
        })
    }

    /// Skip pods in these namespaces entirely
    pub fn with_excluded_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_namespaces = namespaces
            .into_iter()
            .map(Into::into)
            .filter(|ns: &String| !ns.is_empty())
            .collect();
        self
    }

    /// Skip pods whose name starts with any of these prefixes
    pub fn with_excluded_pod_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // An empty prefix would match every pod
        self.excluded_pod_prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        self
    }

    pub fn stats_url(&self) -> &Url {
        &self.stats_url
    }

    pub fn is_namespace_excluded(&self, namespace: &str) -> bool {
        self.excluded_namespaces.contains(namespace)
    }

    /// Returns the first excluded prefix the pod name starts with
    pub fn excluded_prefix_for(&self, pod_name: &str) -> Option<&str> {
        self.excluded_pod_prefixes
            .iter()
            .find(|prefix| pod_name.starts_with(prefix.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        let err = MutatorConfig::new("not a url").unwrap_err();
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn test_exclusions() {
        let config = MutatorConfig::new("http://stats:8080/stats")
            .unwrap()
            .with_excluded_namespaces(["kube-system", ""])
            .with_excluded_pod_prefixes(["debug-", ""]);

        assert!(config.is_namespace_excluded("kube-system"));
        assert!(!config.is_namespace_excluded("default"));
        assert!(!config.is_namespace_excluded(""));
        assert_eq!(config.excluded_prefix_for("debug-shell-abc"), Some("debug-"));
        assert_eq!(config.excluded_prefix_for("web-abc"), None);
    }
}
