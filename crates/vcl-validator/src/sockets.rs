//! Placeholder unix sockets
//!
//! Backends declared with `.path = "/shared/unix-sockets/..."` point at
//! sockets that haproxy creates on the real cache servers. When they are
//! missing here, varnishd prints a `Backend path: Cannot stat` warning next to
//! the real errors. An inode of type socket is enough to silence it; a regular
//! file would turn it into a `Not a socket` error instead.

use nix::errno::Errno;
use nix::sys::stat::{mknod, Mode, SFlag};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sockets the production VCL refers to
pub const HAPROXY_SOCKETS: [&str; 2] = [
    "/shared/unix-sockets/haproxy_https",
    "/shared/unix-sockets/haproxy_http",
];

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("unable to create placeholder socket {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: Errno,
    },
}

/// Create a socket-type filesystem entry at each path
///
/// Existing entries are left alone and never removed. Returns how many
/// entries were created.
pub fn provision_placeholder_sockets<P: AsRef<Path>>(paths: &[P]) -> Result<usize, SocketError> {
    let mut created = 0;

    for path in paths {
        let path = path.as_ref();
        match mknod(path, SFlag::S_IFSOCK, Mode::S_IRUSR | Mode::S_IWUSR, 0) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "created placeholder socket");
                created += 1;
            }
            Err(Errno::EEXIST) => {
                tracing::debug!(path = %path.display(), "placeholder socket already present");
            }
            Err(source) => {
                return Err(SocketError::Create {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    Ok(created)
}
