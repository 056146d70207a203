//! Statistics backend access
//!
//! The snapshot is fetched synchronously through an injected [`HttpFetcher`]
//! so the admission path can be exercised without a network. Failures are
//! never retried: a missing snapshot ends processing for that request.

mod http;

pub use http::ReqwestFetcher;

use crate::error::FetchError;
use crate::models::{StatSnapshot, WorkloadStat};
use crate::observability::RightsizeMetrics;
use crate::workload::WorkloadIdentity;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Raw HTTP response as seen by the statistics client
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Synchronous HTTP GET capability provided by the host
pub trait HttpFetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

impl<F: HttpFetcher + ?Sized> HttpFetcher for Arc<F> {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        (**self).get(url)
    }
}

/// Client for the per-workload statistics snapshot
pub struct StatsClient<F> {
    url: String,
    fetcher: F,
    metrics: RightsizeMetrics,
}

impl<F: HttpFetcher> StatsClient<F> {
    pub fn new(url: impl Into<String>, fetcher: F) -> Self {
        Self {
            url: url.into(),
            fetcher,
            metrics: RightsizeMetrics::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the snapshot, reporting why it failed
    pub fn try_fetch_snapshot(&self) -> Result<StatSnapshot, FetchError> {
        debug!(url = %self.url, "Fetching statistics snapshot");

        let started = Instant::now();
        let result = self.fetcher.get(&self.url);
        self.metrics
            .observe_stats_fetch_latency(started.elapsed().as_secs_f64());

        let response = result?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: response.status,
            });
        }

        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Fetch the snapshot, logging and swallowing any failure
    pub fn fetch_snapshot(&self) -> Option<StatSnapshot> {
        match self.try_fetch_snapshot() {
            Ok(snapshot) => {
                debug!(workloads = snapshot.stats.len(), "Fetched statistics snapshot");
                Some(snapshot)
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Failed to fetch statistics snapshot");
                self.metrics.inc_stats_fetch_errors();
                None
            }
        }
    }
}

/// Find the statistics entry for `identity`, first match wins
pub fn find_stat<'a>(identity: &WorkloadIdentity, snapshot: &'a StatSnapshot) -> Option<&'a WorkloadStat> {
    let key = identity.to_string();
    snapshot.stats.iter().find(|stat| stat.workload == key)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher returning a canned response and counting calls
    pub struct StaticFetcher {
        response: Result<HttpResponse, String>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        pub fn json(body: serde_json::Value) -> Self {
            Self::status(200, body.to_string())
        }

        pub fn status(status: u16, body: impl Into<String>) -> Self {
            Self {
                response: Ok(HttpResponse {
                    status,
                    body: body.into().into_bytes(),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn unreachable() -> Self {
            Self {
                response: Err("connection refused".to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpFetcher for StaticFetcher {
        fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().map_err(|message| FetchError::Transport {
                url: url.to_string(),
                message,
            })
        }
    }
}
