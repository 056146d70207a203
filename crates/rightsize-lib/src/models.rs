//! Statistics snapshot served by the usage backend
//!
//! Every statistic is optional: a missing or null value means the backend has
//! no recommendation, which is not the same thing as zero usage.

use serde::{Deserialize, Serialize};

/// Snapshot of per-workload usage statistics
///
/// A body without a `stats` list is rejected, and the caller treats it the
/// same as an unreachable backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub stats: Vec<WorkloadStat>,
}

/// Statistics for one workload, keyed by `"<kind>/<namespace>/<name>"`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadStat {
    pub workload: String,
    #[serde(default)]
    pub is_horizontally_autoscaled_on_cpu: bool,
    #[serde(default)]
    pub container_stats: Vec<ContainerStat>,
}

impl WorkloadStat {
    /// Statistics for the named container, first match wins
    pub fn container(&self, name: &str) -> Option<&ContainerStat> {
        self.container_stats
            .iter()
            .find(|stat| stat.container_name == name)
    }
}

/// Statistics for one container of a workload
///
/// CPU figures are in cores, memory figures in decimal megabytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStat {
    pub container_name: String,
    #[serde(default)]
    pub cpu_stats: Option<MaxStat>,
    #[serde(default)]
    pub memory_stats: Option<MaxStat>,
    #[serde(default)]
    pub simple_predictions_cpu: Option<Prediction>,
    #[serde(default)]
    pub simple_predictions_memory: Option<Prediction>,
    #[serde(default)]
    pub memory_7day: Option<MaxStat>,
}

/// Observed maximum over a window
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MaxStat {
    #[serde(default)]
    pub max: Option<f64>,
}

/// Forecast produced by the backend's predictor
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub max_value: Option<f64>,
}
