//! Request ID middleware
//!
//! Assigns every request a fresh ID and echoes it in a response header.

use crate::{Request, Response};
use super::Middleware;

/// Response header carrying the ID
pub const REQUEST_ID_HEADER: &str = "Request-Id";

const NANO_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_-";
const NANO_ID_LEN: usize = 21;

/// Generate NanoID (21 characters)
fn generate_nano_id() -> String {
    (0..NANO_ID_LEN)
        .map(|_| NANO_ID_ALPHABET[fastrand::usize(..NANO_ID_ALPHABET.len())] as char)
        .collect()
}

/// Request ID middleware
#[derive(Default)]
pub struct RequestId;

impl Middleware for RequestId {
    fn before(&self, req: &mut Request) -> Option<Response> {
        req.request_id = Some(generate_nano_id());
        None
    }

    fn after(&self, req: &Request, res: &mut Response) {
        if let Some(id) = &req.request_id {
            res.headers.push((REQUEST_ID_HEADER.to_string(), id.clone()));
        }
    }
}
