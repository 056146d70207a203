//! Per-container resource decisions
//!
//! Turns a workload's container statistics into new requests/limits:
//! - CPU requests follow the recommendation exactly and CPU limits are dropped
//! - memory requests move only when they are off by more than 16 MB, and the
//!   memory limit is set to twice the larger of the recommendation and the
//!   7-day maximum
//! - DaemonSet requests are never rewritten, only their limits
//! - a workload unknown to the backend only loses its CPU limits

use crate::models::{ContainerStat, WorkloadStat};
use crate::quantity::{self, CPU, MEMORY};
use crate::workload::WorkloadIdentity;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Memory requests closer than this to the recommendation are left alone
pub const MEMORY_DEADBAND_BYTES: u64 = 16_000_000;

/// Lower bound for any memory limit written by the engine, in MB
pub const MIN_MEMORY_LIMIT_MB: f64 = 16.0;

/// Lower bound for any memory limit written by the engine, in bytes
pub const MIN_MEMORY_LIMIT_BYTES: u64 = 16_000_000;

/// Recommended resources for one container, in canonical units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
}

impl Recommendation {
    /// Derive a recommendation, or `None` when CPU or memory usage is unknown
    ///
    /// Non-zero predictions take precedence over observed maxima. The memory
    /// limit is `max(2 * memory, 2 * memory_7day)` with a 16 MB floor.
    pub fn from_stat(stat: &ContainerStat) -> Option<Self> {
        let observed_cpu = stat.cpu_stats.and_then(|s| s.max)?;
        let observed_memory = stat.memory_stats.and_then(|s| s.max)?;

        let cpu_cores = stat
            .simple_predictions_cpu
            .and_then(|p| p.max_value)
            .filter(|v| *v != 0.0)
            .unwrap_or(observed_cpu);
        let memory_mb = stat
            .simple_predictions_memory
            .and_then(|p| p.max_value)
            .filter(|v| *v != 0.0)
            .unwrap_or(observed_memory);

        let weekly_limit_mb = stat
            .memory_7day
            .and_then(|s| s.max)
            .map(|max| 2.0 * max)
            .unwrap_or(0.0);
        let memory_limit_mb = (2.0 * memory_mb)
            .max(weekly_limit_mb)
            .max(MIN_MEMORY_LIMIT_MB);

        let cpu_millicores = ((cpu_cores * 1000.0).round().max(0.0) as u64).max(1);

        Some(Self {
            cpu_millicores,
            memory_bytes: quantity::mb_to_bytes(memory_mb),
            memory_limit_bytes: quantity::mb_to_bytes(memory_limit_mb),
        })
    }
}

/// A single field written or removed on a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    /// Field path, e.g. `requests.cpu`
    pub field: &'static str,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Adjustment {
    fn new(field: &'static str, from: Option<Quantity>, to: Option<String>) -> Self {
        Self {
            field,
            from: from.map(|q| q.0),
            to,
        }
    }
}

/// Result of evaluating one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOutcome {
    /// The workload is known but this container has no usable statistics
    Skipped,
    Evaluated {
        changed: bool,
        adjustments: Vec<Adjustment>,
    },
}

impl ContainerOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ContainerOutcome::Evaluated { changed: true, .. })
    }

    pub fn adjustments(&self) -> &[Adjustment] {
        match self {
            ContainerOutcome::Skipped => &[],
            ContainerOutcome::Evaluated { adjustments, .. } => adjustments,
        }
    }
}

/// Evaluate one container of `workload`
///
/// `workload_stat` is `None` when the backend has no entry for the workload.
pub fn decide(
    container: &mut Container,
    workload: &WorkloadIdentity,
    workload_stat: Option<&WorkloadStat>,
) -> ContainerOutcome {
    let Some(workload_stat) = workload_stat else {
        return strip_cpu_limit(container);
    };

    let recommendation = workload_stat
        .container(&container.name)
        .and_then(Recommendation::from_stat);

    match recommendation {
        Some(recommendation) => apply(container, workload, &recommendation),
        None => {
            info!(
                container = %container.name,
                workload = %workload,
                "No stat found for container"
            );
            ContainerOutcome::Skipped
        }
    }
}

/// Remove the CPU limit of a container whose workload has no statistics
///
/// Counts as a change only when there was a limit to remove.
pub fn strip_cpu_limit(container: &mut Container) -> ContainerOutcome {
    let removed = container
        .resources
        .as_mut()
        .and_then(|r| remove_entry(&mut r.limits, CPU));

    match removed {
        Some(previous) => {
            debug!(container = %container.name, limit = %previous.0, "Removed CPU limit from unmanaged workload");
            ContainerOutcome::Evaluated {
                changed: true,
                adjustments: vec![Adjustment::new("limits.cpu", Some(previous), None)],
            }
        }
        None => ContainerOutcome::Evaluated {
            changed: false,
            adjustments: Vec::new(),
        },
    }
}

/// Apply a recommendation to a container
pub fn apply(
    container: &mut Container,
    workload: &WorkloadIdentity,
    recommendation: &Recommendation,
) -> ContainerOutcome {
    let name = container.name.clone();
    // Nothing to manage without requests, and no empty block is added
    let Some(resources) = container.resources.as_mut() else {
        return ContainerOutcome::Evaluated {
            changed: false,
            adjustments: Vec::new(),
        };
    };

    let mut changed = false;
    let mut adjustments = Vec::new();

    debug!(
        container = %name,
        workload = %workload,
        cpu = %quantity::format_cpu(recommendation.cpu_millicores),
        memory = %quantity::format_memory_mb(recommendation.memory_bytes),
        "Computed recommendation"
    );

    // Zero or unset CPU requests are not under automatic management
    let current_cpu = quantity::cpu_of(resources.requests.as_ref());
    if current_cpu > 0 {
        if workload.is_daemonset() {
            let current_limit = quantity::cpu_of(resources.limits.as_ref());
            let candidate_limit = current_limit.max(recommendation.cpu_millicores.saturating_mul(2));
            if let Some(previous) = remove_entry(&mut resources.limits, CPU) {
                adjustments.push(Adjustment::new("limits.cpu", Some(previous), None));
            }
            info!(
                container = %name,
                candidate_limit = %quantity::format_cpu(candidate_limit),
                request = %quantity::format_cpu(current_cpu),
                "Removed CPU limit for DaemonSet container, request unchanged"
            );
        } else {
            let target = quantity::format_cpu(recommendation.cpu_millicores);
            let previous = set_entry(&mut resources.requests, CPU, target.clone());
            adjustments.push(Adjustment::new("requests.cpu", previous, Some(target)));
            if let Some(previous) = remove_entry(&mut resources.limits, CPU) {
                adjustments.push(Adjustment::new("limits.cpu", Some(previous), None));
            }
            info!(
                container = %name,
                from = %quantity::format_cpu(current_cpu),
                to = %quantity::format_cpu(recommendation.cpu_millicores),
                "Adjusted CPU for container"
            );
        }
        changed = true;
    }

    let current_memory = quantity::memory_of(resources.requests.as_ref());
    if current_memory > 0
        && recommendation.memory_bytes.abs_diff(current_memory) > MEMORY_DEADBAND_BYTES
    {
        if workload.is_daemonset() {
            let current_limit = quantity::memory_of(resources.limits.as_ref());
            let limit = current_limit
                .max(recommendation.memory_limit_bytes)
                .max(MIN_MEMORY_LIMIT_BYTES);
            let target = quantity::format_memory_mb(limit);
            let previous = set_entry(&mut resources.limits, MEMORY, target.clone());
            adjustments.push(Adjustment::new("limits.memory", previous, Some(target)));
            info!(
                container = %name,
                limit = %quantity::format_memory_mb(limit),
                request_mb = quantity::bytes_to_mb(current_memory),
                "Adjusted memory limit only for DaemonSet container"
            );
        } else {
            let request = quantity::format_memory_mb(recommendation.memory_bytes);
            let limit = quantity::format_memory_mb(recommendation.memory_limit_bytes);
            let previous_request = set_entry(&mut resources.requests, MEMORY, request.clone());
            let previous_limit = set_entry(&mut resources.limits, MEMORY, limit.clone());
            adjustments.push(Adjustment::new("requests.memory", previous_request, Some(request)));
            adjustments.push(Adjustment::new("limits.memory", previous_limit, Some(limit)));
            info!(
                container = %name,
                from_mb = quantity::bytes_to_mb(current_memory),
                to_mb = quantity::bytes_to_mb(recommendation.memory_bytes),
                "Adjusted memory for container"
            );
        }
        changed = true;
    }

    ContainerOutcome::Evaluated {
        changed,
        adjustments,
    }
}

/// Remove `key`, dropping the map once it is empty
fn remove_entry(map: &mut Option<BTreeMap<String, Quantity>>, key: &str) -> Option<Quantity> {
    let entries = map.as_mut()?;
    let removed = entries.remove(key);
    if entries.is_empty() {
        *map = None;
    }
    removed
}

/// Set `key` to `value`, returning the previous quantity
fn set_entry(
    map: &mut Option<BTreeMap<String, Quantity>>,
    key: &str,
    value: String,
) -> Option<Quantity> {
    map.get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), Quantity(value))
}
