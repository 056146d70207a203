//! Blocking reqwest implementation of [`HttpFetcher`]
//!
//! The blocking client owns an internal runtime, so it must be built and
//! dropped outside of any tokio runtime.

use super::{HttpFetcher, HttpResponse};
use crate::error::FetchError;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .map_err(transport)?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport)?.to_vec();

        Ok(HttpResponse { status, body })
    }
}
