//! Body size limit middleware
//!
//! Rejects oversized request bodies before they reach a handler.

use crate::{BodyError, Request, Response, StatusCode};
use super::Middleware;

const TOO_LARGE_MESSAGE: &str = "Request body too large";

/// Body limit configuration
#[derive(Clone, Debug)]
pub struct BodyLimitConfig {
    /// Maximum body size in bytes
    pub max_size: usize,
}

impl BodyLimitConfig {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Parse size from string (e.g., "10mb", "1gb", "500kb")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();

        let (num_str, multiplier) = if let Some(num) = s.strip_suffix("gb") {
            (num, 1024 * 1024 * 1024)
        } else if let Some(num) = s.strip_suffix("mb") {
            (num, 1024 * 1024)
        } else if let Some(num) = s.strip_suffix("kb") {
            (num, 1024)
        } else if let Some(num) = s.strip_suffix('b') {
            (num, 1)
        } else {
            (s.as_str(), 1)
        };

        let num: usize = num_str.trim().parse().ok()?;
        Some(Self::new(num.checked_mul(multiplier)?))
    }
}

/// Format size for display
fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

/// Body limit middleware
pub struct BodyLimit {
    config: BodyLimitConfig,
}

impl BodyLimit {
    pub fn new(config: BodyLimitConfig) -> Self {
        Self { config }
    }

    fn too_large(&self, received: Option<usize>) -> Response {
        let message = match received {
            Some(length) => format!(
                "{}: limit is {}, received {}",
                TOO_LARGE_MESSAGE,
                format_size(self.config.max_size),
                format_size(length)
            ),
            None => format!("{}: limit is {}", TOO_LARGE_MESSAGE, format_size(self.config.max_size)),
        };
        Response::error(StatusCode::PAYLOAD_TOO_LARGE, &message)
    }
}

impl Middleware for BodyLimit {
    fn before(&self, req: &mut Request) -> Option<Response> {
        // Check Content-Length header
        if let Some(length) = req.content_length() {
            if length > self.config.max_size {
                return Some(self.too_large(Some(length)));
            }
        }

        // Chunked bodies are only caught while collecting
        if let Some(BodyError::TooLarge { .. }) = req.body_error {
            return Some(self.too_large(None));
        }

        if req.body.len() > self.config.max_size {
            return Some(self.too_large(Some(req.body.len())));
        }

        None
    }

    fn after(&self, _req: &Request, res: &mut Response) {
        // The unread remainder of the body is not drained
        if res.status == StatusCode::PAYLOAD_TOO_LARGE && res.header("connection").is_none() {
            res.headers.push(("connection".to_string(), "close".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder};

    #[test]
    fn test_parse_size() {
        assert_eq!(BodyLimitConfig::parse("10mb").unwrap().max_size, 10 * 1024 * 1024);
        assert_eq!(BodyLimitConfig::parse("500KB").unwrap().max_size, 500 * 1024);
        assert_eq!(BodyLimitConfig::parse("1gb").unwrap().max_size, 1024 * 1024 * 1024);
        assert_eq!(BodyLimitConfig::parse("100b").unwrap().max_size, 100);
        assert_eq!(BodyLimitConfig::parse("100").unwrap().max_size, 100);
        assert!(BodyLimitConfig::parse("ten mb").is_none());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500B");
        assert_eq!(format_size(1024), "1.0KB");
        assert_eq!(format_size(1024 * 1024), "1.0MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0GB");
    }

    #[test]
    fn test_rejects_declared_length() {
        let limit = BodyLimit::new(BodyLimitConfig::new(1024));
        let mut req = RequestBuilder::new(Method::Post, "/validate-vcl")
            .header("Content-Length", "4096")
            .build();

        let res = limit.before(&mut req).expect("rejected");
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            res.body_string().unwrap(),
            "Request body too large: limit is 1.0KB, received 4.0KB\n"
        );
    }

    #[test]
    fn test_rejects_collected_overflow() {
        let limit = BodyLimit::new(BodyLimitConfig::new(1024));
        let mut req = RequestBuilder::new(Method::Post, "/validate-vcl")
            .body_error(BodyError::TooLarge { limit: 1024 })
            .build();

        let mut res = limit.before(&mut req).expect("rejected");
        limit.after(&req, &mut res);
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.header("connection"), Some("close"));
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_allows_small_body() {
        let limit = BodyLimit::new(BodyLimitConfig::new(1024));
        let mut req = RequestBuilder::new(Method::Post, "/validate-vcl")
            .header("Content-Length", "8")
            .body("vcl 4.1;")
            .build();
        assert!(limit.before(&mut req).is_none());
    }
}
