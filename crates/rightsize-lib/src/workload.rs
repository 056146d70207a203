//! Owning-workload resolution for pods

use k8s_openapi::api::core::v1::Pod;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static REPLICASET_HASH: OnceLock<Regex> = OnceLock::new();

fn replicaset_hash() -> &'static Regex {
    REPLICASET_HASH
        .get_or_init(|| Regex::new(r"-[a-z0-9]+$").expect("replicaset hash pattern is valid"))
}

/// Workload controller kinds that statistics are keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }

    /// Map an owner-reference kind to a workload kind
    pub fn from_owner_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(WorkloadKind::Deployment),
            "StatefulSet" => Some(WorkloadKind::StatefulSet),
            "DaemonSet" => Some(WorkloadKind::DaemonSet),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logical workload a pod belongs to
///
/// Displays as `"<kind>/<namespace>/<name>"`, the key used by the statistics
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl WorkloadIdentity {
    pub fn new(kind: WorkloadKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn is_daemonset(&self) -> bool {
        self.kind == WorkloadKind::DaemonSet
    }

    /// Parse a `"<kind>/<namespace>/<name>"` key
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, '/');
        let kind = WorkloadKind::from_owner_kind(parts.next()?)?;
        let namespace = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::new(kind, namespace, name))
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Strip the pod-template hash from a ReplicaSet name
pub fn deployment_name_from_replicaset(replicaset: &str) -> String {
    replicaset_hash().replace(replicaset, "").into_owned()
}

/// Resolve the workload owning `pod`
///
/// A direct Deployment, StatefulSet or DaemonSet owner wins as soon as it is
/// seen. A ReplicaSet owner only provides a fallback Deployment identity.
/// The namespace comes from the pod, or from `default_namespace` when the pod
/// does not carry one yet.
pub fn resolve(pod: &Pod, default_namespace: &str) -> Option<WorkloadIdentity> {
    let owners = pod.metadata.owner_references.as_deref()?;

    let mut matched: Option<(WorkloadKind, String)> = None;
    for owner in owners {
        if let Some(kind) = WorkloadKind::from_owner_kind(&owner.kind) {
            matched = Some((kind, owner.name.clone()));
            break;
        }
        if owner.kind == "ReplicaSet" {
            matched = Some((
                WorkloadKind::Deployment,
                deployment_name_from_replicaset(&owner.name),
            ));
        }
    }

    let (kind, name) = matched?;
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(default_namespace);

    Some(WorkloadIdentity::new(kind, namespace, name))
}
