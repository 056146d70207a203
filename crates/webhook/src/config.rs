//! Webhook configuration

use anyhow::{Context, Result};
use rightsize_lib::MutatorConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const ENV_PREFIX: &str = "RIGHTSIZE";
const CONFIG_FILE_VAR: &str = "RIGHTSIZE_CONFIG_FILE";

/// Webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Instance name used in structured logs (pod name from the downward API)
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port serving /mutate, /healthz, /readyz and /metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Statistics snapshot endpoint
    #[serde(default = "default_stats_url")]
    pub stats_url: String,

    /// Per-request timeout for the statistics fetch
    #[serde(default = "default_stats_timeout")]
    pub stats_timeout_secs: u64,

    /// Namespaces whose pods are never touched
    #[serde(default)]
    pub excluded_namespaces: Vec<String>,

    /// Pod name prefixes that are never touched
    #[serde(default)]
    pub excluded_pod_prefixes: Vec<String>,
}

fn default_instance() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "rightsize-webhook".to_string())
}

fn default_port() -> u16 {
    8443
}

fn default_stats_url() -> String {
    "http://autopilot:8080/stats".to_string()
}

fn default_stats_timeout() -> u64 {
    5
}

impl WebhookConfig {
    /// Load configuration from the optional config file and `RIGHTSIZE_*` environment
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var(CONFIG_FILE_VAR).ok(), None)
    }

    /// Load configuration, optionally overriding the process environment
    pub fn load_from(file: Option<String>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("excluded_namespaces")
            .with_list_parse_key("excluded_pod_prefixes")
            .source(env);

        builder
            .add_source(environment)
            .build()
            .context("Failed to read webhook configuration")?
            .try_deserialize()
            .context("Invalid webhook configuration")
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_secs)
    }

    /// Build the immutable mutator configuration
    pub fn mutator_config(&self) -> Result<MutatorConfig> {
        let config = MutatorConfig::new(&self.stats_url)?
            .with_excluded_namespaces(self.excluded_namespaces.iter().map(|ns| ns.trim()))
            .with_excluded_pod_prefixes(self.excluded_pod_prefixes.iter().map(|p| p.trim()));
        Ok(config)
    }
}
