//! Readiness handler
//!
//! Reports whether the service still accepts work. Shutdown flips it to
//! unhealthy before the grace period so load balancers drain traffic first.

use crate::server::{handler_fn, DynamicHandler};
use crate::{Response, ResponseBuilder, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "ok",
            HealthStatus::Unhealthy => "shutting down",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health handler
///
/// Cloning shares the ready flag.
#[derive(Clone)]
pub struct Health {
    ready: Arc<AtomicBool>,
}

impl Health {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> HealthStatus {
        if self.is_ready() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Build the probe response
    pub fn respond(&self) -> Response {
        let status = self.status();
        ResponseBuilder::new(status.status_code())
            .header("content-type", "text/plain; charset=utf-8")
            .header("cache-control", "no-store")
            .body(format!("{}\n", status.as_str()))
            .build()
    }

    /// Route handler backed by this probe
    pub fn handler(&self) -> DynamicHandler {
        let health = self.clone();
        handler_fn(move |_req| {
            let res = health.respond();
            async move { res }
        })
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder};

    #[test]
    fn test_ready_by_default() {
        let health = Health::new();
        let res = health.respond();
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().unwrap(), "ok\n");
    }

    #[tokio::test]
    async fn test_handler_follows_flag() {
        let health = Health::new();
        let handler = health.handler();

        health.set_ready(false);
        let res = handler(RequestBuilder::new(Method::Get, "/healthz").build()).await;
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body_string().unwrap(), "shutting down\n");
    }
}
