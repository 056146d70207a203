//! Integration tests for the webhook API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rightsize_lib::{
    health::components, FetchError, HealthRegistry, HttpFetcher, HttpResponse, MutatorConfig,
    PodMutator, RightsizeMetrics, StructuredLogger,
};
use rightsize_webhook::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Fetcher serving a fixed statistics body, or failing when `None`
struct FakeStats {
    body: Option<Value>,
    calls: AtomicUsize,
    panics_left: AtomicUsize,
}

impl FakeStats {
    fn serving(body: Value) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body),
            calls: AtomicUsize::new(0),
            panics_left: AtomicUsize::new(0),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            body: None,
            calls: AtomicUsize::new(0),
            panics_left: AtomicUsize::new(0),
        })
    }

    /// Serves `body`, but the first fetch panics
    fn crashing_once(body: Value) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body),
            calls: AtomicUsize::new(0),
            panics_left: AtomicUsize::new(1),
        })
    }
}

impl HttpFetcher for FakeStats {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("stats decoder crashed");
        }
        match &self.body {
            Some(body) => Ok(HttpResponse {
                status: 200,
                body: body.to_string().into_bytes(),
            }),
            None => Err(FetchError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

async fn setup_test_app(stats: Arc<FakeStats>) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STATS_BACKEND).await;
    health_registry.register(components::ADMISSION).await;
    health_registry.set_ready(true).await;

    let config = MutatorConfig::new("http://stats.test/stats")
        .unwrap()
        .with_excluded_namespaces(["kube-system"]);
    let fetcher: Arc<dyn HttpFetcher> = stats;
    let mutator = PodMutator::new(config, fetcher);

    let state = Arc::new(AppState::new(
        mutator,
        health_registry,
        RightsizeMetrics::new(),
        StructuredLogger::new("test"),
    ));
    (create_router(state.clone()), state)
}

fn review(namespace: &str, owner: &str, resources: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": namespace,
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
            "object": {
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "generateName": format!("{}-", owner),
                    "ownerReferences": [{
                        "apiVersion": "apps/v1",
                        "kind": "ReplicaSet",
                        "name": owner,
                        "uid": "9b1a7c52",
                    }],
                },
                "spec": {
                    "containers": [{"name": "app", "image": "app:1", "resources": resources}],
                },
            },
            "dryRun": false,
        }
    })
}

fn web_stats(hpa: bool) -> Value {
    json!({
        "stats": [{
            "workload": "Deployment/shop/web",
            "is_horizontally_autoscaled_on_cpu": hpa,
            "container_stats": [{
                "container_name": "app",
                "cpu_stats": {"max": 0.4},
                "memory_stats": {"max": 300},
                "memory_7day": {"max": 350},
            }],
        }]
    })
}

async fn post_review(app: Router, body: Value) -> Value {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mutate")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_mutate_returns_patch_for_rightsized_pod() {
    let (app, _state) = setup_test_app(FakeStats::serving(web_stats(false))).await;

    let body = post_review(
        app,
        review(
            "shop",
            "web-7f9c8d6b5",
            json!({"requests": {"cpu": "250m", "memory": "256Mi"}, "limits": {"cpu": "1"}}),
        ),
    )
    .await;

    let response = &body["response"];
    assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");
    assert!(response["patch"].as_str().is_some_and(|p| !p.is_empty()));
}

#[tokio::test]
async fn test_mutate_hpa_workload_has_no_patch() {
    let (app, _state) = setup_test_app(FakeStats::serving(web_stats(true))).await;

    let body = post_review(
        app,
        review("shop", "web-7f9c8d6b5", json!({"requests": {"cpu": "250m"}, "limits": {"cpu": "1"}})),
    )
    .await;

    assert_eq!(body["response"]["allowed"], true);
    assert!(body["response"]["patch"].is_null());
}

#[tokio::test]
async fn test_mutate_excluded_namespace_skips_fetch() {
    let stats = FakeStats::serving(web_stats(false));
    let (app, _state) = setup_test_app(stats.clone()).await;

    let body = post_review(
        app,
        review("kube-system", "coredns-5d78c9869d", json!({"requests": {"cpu": "100m"}})),
    )
    .await;

    assert_eq!(body["response"]["allowed"], true);
    assert!(body["response"]["patch"].is_null());
    assert_eq!(stats.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mutate_fails_open_when_stats_down() {
    let (app, state) = setup_test_app(FakeStats::down()).await;

    let body = post_review(
        app.clone(),
        review("shop", "web-7f9c8d6b5", json!({"requests": {"cpu": "250m"}, "limits": {"cpu": "1"}})),
    )
    .await;

    assert_eq!(body["response"]["allowed"], true);
    assert!(body["response"]["patch"].is_null());

    let health = state.health_registry.health().await;
    assert_eq!(
        health.components[components::STATS_BACKEND].consecutive_failures,
        1
    );

    // Degraded backend keeps the webhook healthy and ready
    let (status, health) = get_json(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_mutate_rejects_review_without_request() {
    let (app, _state) = setup_test_app(FakeStats::serving(web_stats(false))).await;

    let body = post_review(
        app,
        json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"}),
    )
    .await;

    assert_eq!(body["response"]["allowed"], false);
}

#[tokio::test]
async fn test_mutate_rejects_non_json_body() {
    let (app, _state) = setup_test_app(FakeStats::serving(web_stats(false))).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mutate")
                .header("content-type", "application/json")
                .body(Body::from("not an admission review"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "AdmissionReview");
    assert_eq!(body["response"]["allowed"], false);
}

#[tokio::test]
async fn test_worker_panic_does_not_block_readiness() {
    let (app, state) = setup_test_app(FakeStats::crashing_once(web_stats(false))).await;
    let request = review(
        "shop",
        "web-7f9c8d6b5",
        json!({"requests": {"cpu": "250m"}, "limits": {"cpu": "1"}}),
    );

    // The crashed admission still allows the pod unchanged
    let body = post_review(app.clone(), request.clone()).await;
    assert_eq!(body["response"]["allowed"], true);
    assert!(body["response"]["patch"].is_null());

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);

    let body = post_review(app.clone(), request).await;
    assert_eq!(body["response"]["patchType"], "JSONPatch");

    let (status, _) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let health = state.health_registry.health().await;
    assert_eq!(health.components[components::ADMISSION].consecutive_failures, 0);
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app(FakeStats::serving(web_stats(false))).await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"][components::STATS_BACKEND].is_object());
}

#[tokio::test]
async fn test_readyz_unavailable_when_admission_unhealthy() {
    let (app, state) = setup_test_app(FakeStats::serving(web_stats(false))).await;
    state
        .health_registry
        .set_unhealthy(components::ADMISSION, "worker panicked")
        .await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_metrics_endpoint_reports_admissions() {
    let (app, _state) = setup_test_app(FakeStats::serving(web_stats(false))).await;

    post_review(
        app.clone(),
        review("shop", "web-7f9c8d6b5", json!({"requests": {"cpu": "250m"}})),
    )
    .await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("rightsize_admissions_total"));
}
