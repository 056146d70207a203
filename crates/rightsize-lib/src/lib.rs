//! Admission-time resource right-sizing for Kubernetes pods
//!
//! This crate provides the core functionality for:
//! - Converting CPU/memory quantities to canonical units and back
//! - Resolving the workload that owns a pod
//! - Fetching per-workload usage statistics
//! - Deciding new container requests/limits and mutating the pod
//! - Health checks and observability for the webhook host

pub mod config;
pub mod decision;
pub mod error;
pub mod health;
pub mod models;
pub mod mutator;
pub mod observability;
pub mod quantity;
pub mod stats;
pub mod workload;

pub use config::MutatorConfig;
pub use error::{ConfigError, FetchError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use mutator::{AdmissionDecision, PodAdmission, PodMutator, ShortCircuit, UnmodifiedReason};
pub use observability::{RightsizeMetrics, StructuredLogger};
pub use stats::{HttpFetcher, HttpResponse, ReqwestFetcher, StatsClient};
pub use workload::{WorkloadIdentity, WorkloadKind};
