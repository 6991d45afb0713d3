//! HTTP transport seam for virtual users.
//!
//! Virtual users never touch an HTTP client directly. They build a
//! [`RequestPlan`] per iteration and hand it to a [`Transport`]. The
//! production implementation is [`ReqwestTransport`], one pooled
//! `reqwest::Client` shared read-only by every worker. Tests substitute
//! in-memory transports.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::loadtest::error::TransportError;
use crate::loadtest::scenario::Scenario;

/// Content type attached to payload bodies unless the scenario sets one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// One request, borrowed from the scenario for the length of an iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan<'a> {
    /// Id of the issuing worker. Zero outside a run.
    pub vu: u64,
    pub method: http::Method,
    pub url: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub body: Option<&'a str>,
}

impl<'a> RequestPlan<'a> {
    /// Build the plan for a worker's `iteration`-th request.
    ///
    /// Payload entries rotate: iteration `i` sends `payload[i % len]`.
    pub fn for_iteration(scenario: &'a Scenario, iteration: u64) -> Self {
        let body = if scenario.payload.is_empty() {
            None
        } else {
            let index = (iteration % scenario.payload.len() as u64) as usize;
            Some(scenario.payload[index].as_str())
        };
        Self {
            vu: 0,
            method: scenario.method.as_http(),
            url: &scenario.target_url,
            headers: &scenario.headers,
            body,
        }
    }

    /// Attribute the plan to worker `vu`.
    pub fn with_vu(mut self, vu: u64) -> Self {
        self.vu = vu;
        self
    }

    /// Whether a body is present and no `Content-Type` header was configured.
    pub fn needs_default_content_type(&self) -> bool {
        self.body.is_some()
            && !self
                .headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case(http::header::CONTENT_TYPE.as_str()))
    }
}

/// Sends a single request and reports the response status.
///
/// Implementations must be cancel-safe: the caller may drop the future at
/// any suspension point.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, plan: &RequestPlan<'_>) -> Result<u16, TransportError>;
}

/// [`Transport`] backed by a single pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the shared client. `name` is folded into the user agent so
    /// server logs can tell runs apart.
    pub fn new(name: &str) -> Result<Self, TransportError> {
        let user_agent = format!("stagehand/{} ({name})", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, plan: &RequestPlan<'_>) -> Result<u16, TransportError> {
        let mut request = self.client.request(plan.method.clone(), plan.url);
        for (name, value) in plan.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if plan.needs_default_content_type() {
            request = request.header(http::header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
        }
        if let Some(body) = plan.body {
            request = request.body(body.to_owned());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;
        let status = response.status().as_u16();

        // Drain the body so the connection goes back to the pool.
        response
            .bytes()
            .await
            .map_err(|e| TransportError::classify_reqwest(&e))?;

        Ok(status)
    }
}
