//! HTTP API: the mutating admission endpoint plus health checks and metrics

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use k8s_openapi::api::core::v1::Pod;
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, SerializePatchError},
    DynamicObject,
};
use prometheus::{Encoder, TextEncoder};
use rightsize_lib::{
    health::components, AdmissionDecision, ComponentStatus, HealthRegistry, HttpFetcher,
    PodAdmission, PodMutator, RightsizeMetrics, ShortCircuit, StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};

/// Mutator over whatever fetcher the host injected
pub type SharedMutator = PodMutator<Arc<dyn HttpFetcher>>;

/// Error type for building admission responses
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Patch(#[from] SerializePatchError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub mutator: Arc<SharedMutator>,
    pub health_registry: HealthRegistry,
    pub metrics: RightsizeMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        mutator: SharedMutator,
        health_registry: HealthRegistry,
        metrics: RightsizeMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            mutator: Arc::new(mutator),
            health_registry,
            metrics,
            logger,
        }
    }
}

/// Handle a mutating admission review for a Pod
async fn mutate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<AdmissionReview<DynamicObject>> {
    let review: AdmissionReview<Pod> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Failed to decode admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(admit(&state, &request).await.into_review())
}

/// Run the mutator for one request; every path allows the pod
pub async fn admit(state: &AppState, request: &AdmissionRequest<Pod>) -> AdmissionResponse {
    let admission = PodAdmission {
        uid: request.uid.clone(),
        namespace: request.namespace.clone().unwrap_or_default(),
        name: request.name.clone(),
        pod: request.object.clone(),
    };
    let namespace = admission.namespace.clone();
    let pod_name = admission.pod_name().to_string();

    // The statistics fetch blocks, keep it off the async workers
    let mutator = state.mutator.clone();
    let decision = match tokio::task::spawn_blocking(move || mutator.process(&admission)).await {
        Ok(decision) => {
            state
                .health_registry
                .record_success(components::ADMISSION)
                .await;
            decision
        }
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Admission worker failed, allowing pod unchanged");
            // Degraded, never unhealthy, so readiness is unaffected
            state
                .health_registry
                .record_failure(components::ADMISSION, e.to_string())
                .await;
            state.metrics.inc_admission("worker_failed");
            return AdmissionResponse::from(request);
        }
    };

    record_backend_health(state, &decision).await;
    state.metrics.inc_admission(decision.outcome());
    state.logger.log_decision(
        &request.uid,
        &namespace,
        &pod_name,
        decision.outcome(),
        decision.changed(),
    );

    let response = AdmissionResponse::from(request);
    let (Some(original), Some(mutated)) = (request.object.as_ref(), decision.pod()) else {
        return response;
    };

    match build_patch(original, mutated).and_then(|patch| Ok(response.with_patch(patch)?)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Failed to build patch, allowing pod unchanged");
            AdmissionResponse::from(request)
        }
    }
}

async fn record_backend_health(state: &AppState, decision: &AdmissionDecision) {
    match decision {
        AdmissionDecision::NoFurtherAction(ShortCircuit::StatsUnavailable) => {
            state
                .health_registry
                .record_failure(components::STATS_BACKEND, "statistics snapshot unavailable")
                .await;
        }
        AdmissionDecision::Mutated(_)
        | AdmissionDecision::Unmodified(rightsize_lib::UnmodifiedReason::HorizontallyAutoscaled)
        | AdmissionDecision::Unmodified(rightsize_lib::UnmodifiedReason::NoChange) => {
            state
                .health_registry
                .record_success(components::STATS_BACKEND)
                .await;
        }
        // No fetch was attempted
        _ => {}
    }
}

/// JSON patch turning `original` into `mutated`
pub fn build_patch(original: &Pod, mutated: &Pod) -> Result<json_patch::Patch, WebhookError> {
    let before = serde_json::to_value(original)?;
    let after = serde_json::to_value(mutated)?;
    Ok(json_patch::diff(&before, &after))
}

/// Health check response - 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting webhook server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn pod(cpu_request: &str, cpu_limit: Option<&str>) -> Pod {
        let mut requests = std::collections::BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity(cpu_request.to_string()));
        let limits = cpu_limit.map(|limit| {
            let mut limits = std::collections::BTreeMap::new();
            limits.insert("cpu".to_string(), Quantity(limit.to_string()));
            limits
        });

        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    resources: Some(ResourceRequirements {
                        requests: Some(requests),
                        limits,
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_patch_targets_changed_fields() {
        let original = pod("250m", Some("1"));
        let mutated = pod("400m", None);

        let patch = serde_json::to_value(build_patch(&original, &mutated).unwrap()).unwrap();
        let ops = patch.as_array().unwrap();

        assert!(ops.iter().any(|op| {
            op["op"] == "replace"
                && op["path"] == "/spec/containers/0/resources/requests/cpu"
                && op["value"] == "400m"
        }));
        assert!(ops
            .iter()
            .any(|op| op["op"] == "remove" && op["path"] == "/spec/containers/0/resources/limits"));
    }

    #[test]
    fn test_build_patch_identical_pods_is_empty() {
        let original = pod("250m", None);
        let patch = build_patch(&original, &original.clone()).unwrap();
        assert!(patch.0.is_empty());
    }
}
