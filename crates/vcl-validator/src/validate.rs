//! `POST /validate-vcl`
//!
//! Body → temporary file → compiler → status code. The temporary file is a
//! `TempPath` owned by the request, so it is removed on every return path.

use crate::validator::{ValidatorCommand, Verdict};
use std::io::{self, Write};
use std::os::fd::IntoRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;
use thiserror::Error;
use vcl_validator_core::{handler_fn, BodyError, DynamicHandler, Request, Response, StatusCode};

/// Prefix of the temporary files holding submitted VCL
pub const TEMP_PREFIX: &str = "vcl-content";

/// Reasons a validation request does not end in 200
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("unable to read VCL")]
    ReadBody(String),

    #[error("VCL exceeds the size limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("unable to create tmp file")]
    CreateTemp(#[source] io::Error),

    #[error("unable to write to tmp file")]
    WriteTemp(#[source] io::Error),

    #[error("unable to close tmp file")]
    CloseTemp(#[source] io::Error),

    #[error("unable to run validator")]
    Spawn(#[source] io::Error),

    /// The compiler rejected the VCL; carries its diagnostics
    #[error("{stderr}")]
    Rejected { stderr: String },
}

impl ValidateError {
    pub fn status(&self) -> StatusCode {
        match self {
            ValidateError::ReadBody(_) => StatusCode::BAD_REQUEST,
            ValidateError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ValidateError::CreateTemp(_)
            | ValidateError::WriteTemp(_)
            | ValidateError::CloseTemp(_)
            | ValidateError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ValidateError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn into_response(self) -> Response {
        Response::error(self.status(), &self.to_string())
    }
}

impl From<&BodyError> for ValidateError {
    fn from(err: &BodyError) -> Self {
        match err {
            BodyError::TooLarge { limit } => ValidateError::TooLarge { limit: *limit },
            BodyError::Read(reason) => ValidateError::ReadBody(reason.clone()),
        }
    }
}

/// Validation endpoint
pub struct Validation {
    command: ValidatorCommand,
    temp_dir: Option<PathBuf>,
}

impl Validation {
    pub fn new(command: ValidatorCommand) -> Self {
        Self {
            command,
            temp_dir: None,
        }
    }

    /// Create temporary files in `dir` instead of the system temp directory
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Route handler for this endpoint
    pub fn handler(self: Arc<Self>) -> DynamicHandler {
        handler_fn(move |req| {
            let validation = self.clone();
            async move { validation.respond(&req).await }
        })
    }

    pub async fn respond(&self, req: &Request) -> Response {
        match self.validate(req).await {
            Ok(()) => Response::ok(),
            Err(e) => e.into_response(),
        }
    }

    /// Check the request body with the compiler
    pub async fn validate(&self, req: &Request) -> Result<(), ValidateError> {
        let req_id = req.request_id.as_deref().unwrap_or("");

        if let Some(err) = &req.body_error {
            tracing::warn!(req_id, error = %err, "unable to read VCL");
            return Err(err.into());
        }

        let vcl = self.persist(&req.body).map_err(|e| {
            tracing::error!(req_id, error = ?e, "tmp file failed");
            e
        })?;
        tracing::info!(req_id, filename = %vcl.display(), "created fh");

        let verdict = self.command.check(&vcl).await.map_err(|e| {
            tracing::error!(
                req_id,
                program = %self.command.program().display(),
                error = %e,
                "unable to start validator"
            );
            ValidateError::Spawn(e)
        })?;

        match verdict {
            Verdict::Passed => Ok(()),
            Verdict::Failed { status, stderr } => {
                tracing::error!(req_id, %status, stderr = stderr.as_str(), "varnishd failed");
                Err(ValidateError::Rejected { stderr })
            }
        }
    }

    /// Write the VCL to a fresh temporary file and close it
    fn persist(&self, vcl: &[u8]) -> Result<TempPath, ValidateError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);

        let named = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(ValidateError::CreateTemp)?;

        // From here on dropping `path` removes the file
        let (mut file, path) = named.into_parts();
        file.write_all(vcl).map_err(ValidateError::WriteTemp)?;
        file.sync_all().map_err(ValidateError::WriteTemp)?;

        // Dropping a File discards close(2) errors
        nix::unistd::close(file.into_raw_fd()).map_err(|e| ValidateError::CloseTemp(e.into()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use vcl_validator_core::{Method, RequestBuilder};

    fn sh(script: &str) -> ValidatorCommand {
        // $0 is "sh", $1 is the VCL path
        ValidatorCommand::new("/bin/sh", ["-c", script, "sh"])
    }

    fn post(body: &str) -> Request {
        RequestBuilder::new(Method::Post, "/validate-vcl").body(body.to_string()).build()
    }

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_valid_vcl_returns_200() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(sh("grep -q 'vcl 4.1;' \"$1\"")).temp_dir(dir.path());

        let res = validation.respond(&post("vcl 4.1;\nbackend default none;\n")).await;

        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.is_empty());
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_compiler_errors_return_422() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo 'Message from VCC-compiler:' >&2; echo \"('$1' Line 1 Pos 1)\" >&2; exit 1";
        let validation = Validation::new(sh(script)).temp_dir(dir.path());

        let res = validation.respond(&post("vcl 4.1; sub vcl_recv { nope }")).await;

        assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
        let body = res.body_string().unwrap();
        assert!(body.starts_with("Message from VCC-compiler:\n"), "{}", body);
        assert!(body.contains(TEMP_PREFIX), "{}", body);
        assert!(body.ends_with(")\n\n"), "{}", body);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_compiler_sees_submitted_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(sh("cat \"$1\" >&2; exit 1")).temp_dir(dir.path());

        let vcl = "vcl 4.1;\nbackend b { .path = \"/shared/unix-sockets/haproxy_http\"; }\n";
        let res = validation.respond(&post(vcl)).await;

        assert_eq!(res.body_string().unwrap(), format!("{}\n", vcl));
    }

    #[tokio::test]
    async fn test_temp_file_exists_only_during_check() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(sh("test -f \"$1\" && echo \"$1\" >&2; exit 3")).temp_dir(dir.path());

        let res = validation.respond(&post("vcl 4.1;")).await;

        let reported = res.body_string().unwrap();
        let path = Path::new(reported.trim_end());
        assert!(path.starts_with(dir.path()), "{}", reported);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_validator_returns_500_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(ValidatorCommand::new("/nonexistent/varnishd", ["-C", "-f"]))
            .temp_dir(dir.path());

        let res = validation.respond(&post("vcl 4.1;")).await;

        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_string().unwrap(), "unable to run validator\n");
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_unwritable_temp_dir_returns_500() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(sh("exit 0")).temp_dir(dir.path().join("missing"));

        let res = validation.respond(&post("vcl 4.1;")).await;

        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_string().unwrap(), "unable to create tmp file\n");
    }

    #[tokio::test]
    async fn test_body_errors_skip_the_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(sh("exit 1")).temp_dir(dir.path());

        let req = RequestBuilder::new(Method::Post, "/validate-vcl")
            .body_error(BodyError::Read("connection reset".to_string()))
            .build();
        let res = validation.respond(&req).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body_string().unwrap(), "unable to read VCL\n");

        let req = RequestBuilder::new(Method::Post, "/validate-vcl")
            .body_error(BodyError::TooLarge { limit: 1024 })
            .build();
        let res = validation.respond(&req).await;
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);

        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_persist_closes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let validation = Validation::new(sh("exit 0")).temp_dir(dir.path());

        let path = validation.persist(b"vcl 4.1;\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"vcl 4.1;\n");

        let still_open = fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|fd| fs::read_link(fd.unwrap().path()).ok())
            .any(|target| target == *path);
        assert!(!still_open, "{} is still open", path.display());

        drop(path);
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            ValidateError::Rejected { stderr: String::new() }.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ValidateError::CloseTemp(io::Error::other("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ValidateError::ReadBody(String::new()).status(), StatusCode::BAD_REQUEST);
    }
}
