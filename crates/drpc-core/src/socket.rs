//! Socket directory layout.
//!
//! The server listens on `daos_server.sock` and each engine on
//! `daos_engine<suffix>.sock`, all inside one socket directory that is
//! created by configuration management beforehand.

use crate::config::SocketConfig;
use crate::error::{DrpcError, Result};
use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the control plane's server socket in `dir`.
pub fn server_socket_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(SocketConfig::SERVER_SOCKET_NAME)
}

/// Path of the socket for engine `idx` in `dir`.
pub fn engine_socket_path(dir: impl AsRef<Path>, idx: u32) -> PathBuf {
    dir.as_ref().join(format!(
        "{}_{}{}",
        SocketConfig::ENGINE_SOCKET_PREFIX,
        idx,
        SocketConfig::SOCKET_SUFFIX
    ))
}

fn is_engine_socket_name(name: &str) -> bool {
    name.starts_with(SocketConfig::ENGINE_SOCKET_PREFIX) && name.ends_with(SocketConfig::SOCKET_SUFFIX)
}

/// Verify that `dir` exists and is a directory.
pub fn check_socket_dir(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    let metadata = std::fs::metadata(dir).map_err(|e| {
        let message = match e.kind() {
            ErrorKind::NotFound => "missing",
            ErrorKind::PermissionDenied => "permissions failure accessing",
            _ => "unexpected error locating",
        };
        DrpcError::SocketDir {
            message: message.to_string(),
            path: dir.to_path_buf(),
            source: Some(e),
        }
    })?;

    if !metadata.is_dir() {
        return Err(DrpcError::Io {
            message: "not a directory".to_string(),
            path: Some(dir.to_path_buf()),
            source: None,
        });
    }
    Ok(())
}

/// Remove sockets left behind by a previous run.
///
/// Removes the server socket and every engine socket in `dir`. Files that
/// are already gone are ignored.
pub fn cleanup_sockets(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    check_socket_dir(dir)?;

    remove_if_exists(&server_socket_path(dir))?;

    for entry in std::fs::read_dir(dir).map_err(|e| DrpcError::io_with_path(e, dir))? {
        let entry = entry.map_err(|e| DrpcError::io_with_path(e, dir))?;
        let name = entry.file_name();
        if name.to_str().is_some_and(is_engine_socket_name) {
            remove_if_exists(&entry.path())?;
        }
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DrpcError::io_with_path(e, path)),
    }
}

/// Verify that `path` names an existing Unix socket.
pub fn check_client_socket_path(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(DrpcError::SocketPath {
            path: PathBuf::new(),
            message: "socket path empty".to_string(),
        });
    }

    let metadata = std::fs::symlink_metadata(path).map_err(|e| DrpcError::SocketPath {
        path: path.to_path_buf(),
        message: format!("could not be accessed: {}", e),
    })?;

    if !metadata.file_type().is_socket() {
        return Err(DrpcError::SocketPath {
            path: path.to_path_buf(),
            message: "not a socket".to_string(),
        });
    }
    Ok(())
}
