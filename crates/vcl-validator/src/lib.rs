//! vcl-validator: remote syntax check for Varnish configuration
//!
//! `POST /validate-vcl` with a VCL file as the body. The service writes it to
//! a temporary file, runs `varnishd -C` against it and answers `200` when the
//! compiler accepts it or `422` with the compiler diagnostics when it does not.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod signal;
pub mod sockets;
pub mod validate;
pub mod validator;

pub use app::{run, HEALTH_PATH, SERVICE_NAME, VALIDATE_PATH};
pub use config::{Cli, LogFormat};
pub use error::{AppError, Result};
pub use validate::{ValidateError, Validation};
pub use validator::{ValidatorCommand, Verdict};
