//! Admission-time pod mutation
//!
//! [`PodMutator::process`] runs the whole pipeline for one admission request:
//! exclusion checks, workload resolution, statistics lookup, scheduling
//! constraint removal and per-container resource decisions. Every path admits
//! the pod; the decision only says whether and how it was rewritten.


use crate::config::MutatorConfig;
use crate::decision::{self, ContainerOutcome};
use crate::models::WorkloadStat;
use crate::observability::{RightsizeMetrics, StructuredLogger};
use crate::stats::{find_stat, HttpFetcher, StatsClient};
use crate::workload::{self, WorkloadIdentity};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use tracing::{debug, info};

/// The parts of an admission request the mutator looks at
#[derive(Debug, Clone, Default)]
pub struct PodAdmission {
    pub uid: String,
    /// Namespace the request targets
    pub namespace: String,
    /// Object name from the request (often empty for generated pod names)
    pub name: String,
    pub pod: Option<Pod>,
}

impl PodAdmission {
    pub fn new(namespace: impl Into<String>, pod: Pod) -> Self {
        Self {
            namespace: namespace.into(),
            pod: Some(pod),
            ..Default::default()
        }
    }

    /// Pod name, falling back to `generateName` and then the request name
    pub fn pod_name(&self) -> &str {
        self.pod
            .as_ref()
            .and_then(|pod| {
                pod.metadata
                    .name
                    .as_deref()
                    .or(pod.metadata.generate_name.as_deref())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.name)
    }

    fn effective_namespace(&self) -> &str {
        if !self.namespace.is_empty() {
            return &self.namespace;
        }
        self.pod
            .as_ref()
            .and_then(|pod| pod.metadata.namespace.as_deref())
            .unwrap_or_default()
    }
}

/// Why a pod was admitted without changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmodifiedReason {
    MissingPod,
    UnresolvedWorkload,
    HorizontallyAutoscaled,
    NoChange,
}

/// Why processing stopped before looking at the pod's resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortCircuit {
    ExcludedNamespace(String),
    ExcludedPrefix(String),
    StatsUnavailable,
}

/// Outcome of one admission request; the pod is always allowed
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Unmodified(UnmodifiedReason),
    Mutated(Box<Pod>),
    NoFurtherAction(ShortCircuit),
}

impl AdmissionDecision {
    pub fn changed(&self) -> bool {
        matches!(self, AdmissionDecision::Mutated(_))
    }

    pub fn pod(&self) -> Option<&Pod> {
        match self {
            AdmissionDecision::Mutated(pod) => Some(pod),
            _ => None,
        }
    }

    pub fn into_pod(self) -> Option<Pod> {
        match self {
            AdmissionDecision::Mutated(pod) => Some(*pod),
            _ => None,
        }
    }

    /// Short label used for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            AdmissionDecision::Mutated(_) => "mutated",
            AdmissionDecision::Unmodified(UnmodifiedReason::MissingPod) => "missing_pod",
            AdmissionDecision::Unmodified(UnmodifiedReason::UnresolvedWorkload) => "unresolved_workload",
            AdmissionDecision::Unmodified(UnmodifiedReason::HorizontallyAutoscaled) => "hpa_on_cpu",
            AdmissionDecision::Unmodified(UnmodifiedReason::NoChange) => "no_change",
            AdmissionDecision::NoFurtherAction(ShortCircuit::ExcludedNamespace(_)) => "excluded_namespace",
            AdmissionDecision::NoFurtherAction(ShortCircuit::ExcludedPrefix(_)) => "excluded_prefix",
            AdmissionDecision::NoFurtherAction(ShortCircuit::StatsUnavailable) => "stats_unavailable",
        }
    }
}

/// What [`rightsize_pod`] did to a pod
#[derive(Debug, Clone, Default)]
pub struct PodReport {
    pub changed: bool,
    pub removed_topology_spread: bool,
    pub removed_anti_affinity: bool,
    pub containers: Vec<(String, ContainerOutcome)>,
}

impl PodReport {
    pub fn adjusted_containers(&self) -> usize {
        self.containers
            .iter()
            .filter(|(_, outcome)| !outcome.adjustments().is_empty())
            .count()
    }
}

/// Runs the admission pipeline against a statistics backend
pub struct PodMutator<F> {
    config: MutatorConfig,
    stats: StatsClient<F>,
    logger: StructuredLogger,
    metrics: RightsizeMetrics,
}

impl<F: HttpFetcher> PodMutator<F> {
    pub fn new(config: MutatorConfig, fetcher: F) -> Self {
        let stats = StatsClient::new(config.stats_url().as_str(), fetcher);
        Self {
            config,
            stats,
            logger: StructuredLogger::new("rightsize"),
            metrics: RightsizeMetrics::new(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &MutatorConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsClient<F> {
        &self.stats
    }

    /// Decide what to do with the pod in `admission`
    pub fn process(&self, admission: &PodAdmission) -> AdmissionDecision {
        let Some(pod) = admission.pod.as_ref() else {
            info!(uid = %admission.uid, "No pod object found in request, allowing without adjustment");
            return AdmissionDecision::Unmodified(UnmodifiedReason::MissingPod);
        };

        let namespace = admission.effective_namespace();
        let pod_name = admission.pod_name();
        info!(namespace = %namespace, pod = %pod_name, "Processing pod");

        if self.config.is_namespace_excluded(namespace) {
            info!(namespace = %namespace, "Skipping pod in excluded namespace");
            return AdmissionDecision::NoFurtherAction(ShortCircuit::ExcludedNamespace(
                namespace.to_string(),
            ));
        }

        if let Some(prefix) = self.config.excluded_prefix_for(pod_name) {
            info!(pod = %pod_name, prefix = %prefix, "Skipping pod with excluded prefix");
            return AdmissionDecision::NoFurtherAction(ShortCircuit::ExcludedPrefix(
                prefix.to_string(),
            ));
        }

        let Some(workload) = workload::resolve(pod, namespace) else {
            info!(
                namespace = %namespace,
                pod = %pod_name,
                "Could not determine workload for pod, allowing without adjustment"
            );
            return AdmissionDecision::Unmodified(UnmodifiedReason::UnresolvedWorkload);
        };
        info!(pod = %pod_name, workload = %workload, "Resolved owning workload");

        let snapshot = match self.stats.try_fetch_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.inc_stats_fetch_errors();
                self.logger
                    .log_stats_unavailable(self.stats.url(), &e.to_string());
                return AdmissionDecision::NoFurtherAction(ShortCircuit::StatsUnavailable);
            }
        };

        let workload_stat = find_stat(&workload, &snapshot);
        if workload_stat.is_some_and(|stat| stat.is_horizontally_autoscaled_on_cpu) {
            info!(workload = %workload, "Workload is horizontally autoscaled on CPU, skipping");
            return AdmissionDecision::Unmodified(UnmodifiedReason::HorizontallyAutoscaled);
        }
        if workload_stat.is_none() {
            debug!(workload = %workload, "Workload has no statistics, removing CPU limits only");
        }

        let mut mutated = pod.clone();
        let report = rightsize_pod(&mut mutated, &workload, workload_stat);

        for (container, outcome) in &report.containers {
            for adjustment in outcome.adjustments() {
                self.logger.log_container_adjusted(
                    &workload.to_string(),
                    container,
                    adjustment.field,
                    adjustment.from.as_deref().unwrap_or("-"),
                    adjustment.to.as_deref().unwrap_or("-"),
                );
            }
        }
        self.metrics
            .add_containers_adjusted(report.adjusted_containers() as u64);

        if report.changed {
            AdmissionDecision::Mutated(Box::new(mutated))
        } else {
            AdmissionDecision::Unmodified(UnmodifiedReason::NoChange)
        }
    }
}

/// Rewrite `pod` for `workload` in place
///
/// Drops topology spread constraints and pod anti-affinity, then evaluates
/// containers followed by init containers in declaration order.
pub fn rightsize_pod(
    pod: &mut Pod,
    workload: &WorkloadIdentity,
    workload_stat: Option<&WorkloadStat>,
) -> PodReport {
    let mut report = PodReport::default();
    let Some(spec) = pod.spec.as_mut() else {
        return report;
    };

    report.removed_topology_spread = remove_topology_spread(spec);
    report.removed_anti_affinity = remove_pod_anti_affinity(spec);
    report.changed = report.removed_topology_spread || report.removed_anti_affinity;

    let init_containers = spec.init_containers.iter_mut().flatten();
    for container in spec.containers.iter_mut().chain(init_containers) {
        let outcome = decision::decide(container, workload, workload_stat);
        report.changed |= outcome.changed();
        report.containers.push((container.name.clone(), outcome));
    }

    report
}

fn remove_topology_spread(spec: &mut PodSpec) -> bool {
    match spec.topology_spread_constraints.take() {
        Some(constraints) if !constraints.is_empty() => {
            info!(count = constraints.len(), "Removing topologySpreadConstraints from pod");
            true
        }
        // Leave an explicitly empty list where it was
        other => {
            spec.topology_spread_constraints = other;
            false
        }
    }
}

fn remove_pod_anti_affinity(spec: &mut PodSpec) -> bool {
    let Some(affinity) = spec.affinity.as_mut() else {
        return false;
    };
    if affinity.pod_anti_affinity.take().is_none() {
        return false;
    }

    info!("Removing podAntiAffinity from pod");
    if affinity.node_affinity.is_none() && affinity.pod_affinity.is_none() {
        spec.affinity = None;
    }
    true
}
