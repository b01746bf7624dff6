//! The external VCL compiler
//!
//! `varnishd -C` compiles the VCL and exits; the generated C code, or the
//! compile errors, are written to stderr. Only the exit status decides the
//! outcome.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Compiler binary used in production
pub const VARNISHD: &str = "/usr/sbin/varnishd";

/// Arguments placed before the VCL path. The vmod and storage settings mirror
/// the production cache servers so the VCL compiles against the same setup.
pub const VARNISHD_ARGS: [&str; 6] = [
    "-E",
    "/usr/lib/varnish/vmods/libvmod_slash.so",
    "-s",
    "fellow=fellow,/cache/fellow-storage,1MB,1MB,1MB",
    "-C",
    "-f",
];

/// Result of running the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Exit status 0
    Passed,
    /// Non-zero exit or killed by a signal
    Failed { status: ExitStatus, stderr: String },
}

/// Command line that checks a VCL file
#[derive(Debug, Clone)]
pub struct ValidatorCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ValidatorCommand {
    /// The production `varnishd` invocation
    pub fn varnishd() -> Self {
        Self::new(VARNISHD, VARNISHD_ARGS)
    }

    /// Any program; the VCL path is appended after `args`
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(|a| a.as_ref().to_os_string()).collect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for checking `vcl`
    pub fn args_for(&self, vcl: &Path) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.push(vcl.as_os_str().to_os_string());
        args
    }

    /// Run the compiler against `vcl` and wait for it to exit
    ///
    /// Errors only when the process cannot be started. The child is killed if
    /// the returned future is dropped before it exits.
    pub async fn check(&self, vcl: &Path) -> io::Result<Verdict> {
        let output = Command::new(&self.program)
            .args(self.args_for(vcl))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(Verdict::Passed);
        }

        Ok(Verdict::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ValidatorCommand {
        // $0 is "sh", $1 is the VCL path
        ValidatorCommand::new("/bin/sh", ["-c", script, "sh"])
    }

    #[test]
    fn test_varnishd_command_line() {
        let cmd = ValidatorCommand::varnishd();
        assert_eq!(cmd.program(), Path::new("/usr/sbin/varnishd"));

        let args = cmd.args_for(Path::new("/tmp/vcl-content123"));
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            vec![
                "-E",
                "/usr/lib/varnish/vmods/libvmod_slash.so",
                "-s",
                "fellow=fellow,/cache/fellow-storage,1MB,1MB,1MB",
                "-C",
                "-f",
                "/tmp/vcl-content123",
            ]
        );
    }

    #[tokio::test]
    async fn test_success_ignores_stderr() {
        let verdict = sh("echo 'generated C code' >&2; exit 0")
            .check(Path::new("/dev/null"))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Passed);
    }

    #[tokio::test]
    async fn test_failure_captures_stderr_only() {
        let verdict = sh("echo on-stdout; echo \"cannot compile $1\" >&2; exit 2")
            .check(Path::new("/tmp/some.vcl"))
            .await
            .unwrap();

        match verdict {
            Verdict::Failed { status, stderr } => {
                assert_eq!(status.code(), Some(2));
                assert_eq!(stderr, "cannot compile /tmp/some.vcl\n");
            }
            Verdict::Passed => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_killed_by_signal_is_failure() {
        let verdict = sh("kill -9 $$").check(Path::new("/dev/null")).await.unwrap();
        assert!(matches!(verdict, Verdict::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cmd = ValidatorCommand::new("/nonexistent/varnishd", ["-C", "-f"]);
        let err = cmd.check(Path::new("/dev/null")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
