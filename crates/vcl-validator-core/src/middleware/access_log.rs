//! Access log middleware
//!
//! Emits one structured `tracing` event per request once the response is
//! final: method, url, status, size, duration, client ip, user agent,
//! referer and request id.

use crate::{Request, Response};
use super::Middleware;

/// Access log middleware
#[derive(Default)]
pub struct AccessLog;

impl AccessLog {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for AccessLog {
    fn before(&self, _req: &mut Request) -> Option<Response> {
        None
    }

    fn after(&self, req: &Request, res: &mut Response) {
        let elapsed = req.received_at.elapsed();
        let ip = req.remote_ip().unwrap_or_default();

        tracing::info!(
            method = req.method.as_str(),
            url = %req.url(),
            status = res.status.as_u16(),
            size = res.body.len(),
            duration = elapsed.as_secs_f64() * 1000.0,
            ip = ip.as_str(),
            user_agent = req.header("user-agent").unwrap_or(""),
            referer = req.header("referer").unwrap_or(""),
            req_id = req.request_id.as_deref().unwrap_or(""),
            "request"
        );
    }
}
