// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SFTP implementation of the remote file store, backed by libssh2.
//!
//! libssh2 exposes a blocking API, so every operation runs on the tokio
//! blocking pool. The session timeout configured at connect time bounds
//! each libssh2 call; the TCP connect itself is bounded separately.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh2::{ErrorCode, Session, Sftp};
use tokio::task;

use crate::config::SftpSettings;

use super::{RemoteConnector, RemoteFileInfo, RemoteFileStore, StoreError};

// SFTP status codes (draft-ietf-secsh-filexfer-02, the version OpenSSH speaks).
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;
// libssh2 session-level timeout.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

const DIRECTORY_MODE: i32 = 0o755;

/// Connects to one configured SFTP endpoint.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    settings: SftpSettings,
}

impl SftpConnector {
    pub fn new(settings: SftpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RemoteConnector for SftpConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteFileStore>, StoreError> {
        let settings = self.settings.clone();
        let connection = task::spawn_blocking(move || SftpConnection::open(&settings))
            .await
            .map_err(|e| StoreError::Connect(format!("connect worker failed: {e}")))??;

        Ok(Box::new(SftpStore {
            inner: Arc::new(Mutex::new(connection)),
        }))
    }
}

struct SftpConnection {
    session: Session,
    sftp: Sftp,
}

impl SftpConnection {
    fn open(settings: &SftpSettings) -> Result<Self, StoreError> {
        let address = (settings.host.as_str(), settings.port)
            .to_socket_addrs()
            .map_err(|e| StoreError::Connect(format!("cannot resolve {}: {e}", settings.host)))?
            .next()
            .ok_or_else(|| {
                StoreError::Connect(format!("no address found for {}", settings.host))
            })?;

        let stream = TcpStream::connect_timeout(&address, settings.timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                StoreError::Timeout(format!("tcp connect to {address}: {e}"))
            } else {
                StoreError::Connect(format!("tcp connect to {address} failed: {e}"))
            }
        })?;

        let mut session = Session::new()
            .map_err(|e| StoreError::Connect(format!("session setup failed: {e}")))?;
        session.set_tcp_stream(stream);
        // Bounds every subsequent libssh2 call, handshake included.
        session.set_timeout(timeout_millis(settings.timeout));
        session
            .handshake()
            .map_err(|e| map_ssh_error("handshake", &settings.host, &e))?;
        session
            .userauth_password(&settings.username, &settings.password)
            .map_err(|e| StoreError::Connect(format!("authentication failed: {e}")))?;

        let sftp = session
            .sftp()
            .map_err(|e| map_ssh_error("sftp subsystem", &settings.host, &e))?;

        Ok(Self { session, sftp })
    }
}

/// One live SFTP connection, used by a single transfer job.
pub struct SftpStore {
    inner: Arc<Mutex<SftpConnection>>,
}

impl SftpStore {
    async fn run_blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SftpConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.inner);
        task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Transfer(format!("{op} worker failed: {e}")))?
    }
}

#[async_trait]
impl RemoteFileStore for SftpStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let path = path.to_string();
        self.run_blocking("download", move |conn| {
            let mut file = conn
                .sftp
                .open(Path::new(&path))
                .map_err(|e| map_ssh_error("download", &path, &e))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| map_io_error("download", &path, &e))?;
            Ok(data)
        })
        .await
    }

    async fn upload(&self, data: Vec<u8>, path: &str) -> Result<(), StoreError> {
        let path = path.to_string();
        self.run_blocking("upload", move |conn| {
            let mut file = conn
                .sftp
                .create(Path::new(&path))
                .map_err(|e| map_ssh_error("upload", &path, &e))?;
            file.write_all(&data)
                .map_err(|e| map_io_error("upload", &path, &e))?;
            Ok(())
        })
        .await
    }

    async fn stat(&self, path: &str) -> Result<RemoteFileInfo, StoreError> {
        let path = path.to_string();
        self.run_blocking("stat", move |conn| {
            let stat = conn
                .sftp
                .stat(Path::new(&path))
                .map_err(|e| map_ssh_error("stat", &path, &e))?;
            Ok(RemoteFileInfo {
                size: stat.size.unwrap_or(0),
                is_file: stat.is_file(),
                is_dir: stat.is_dir(),
            })
        })
        .await
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), StoreError> {
        let path = path.to_string();
        self.run_blocking("mkdir", move |conn| {
            if recursive {
                mkdir_recursive(conn, &path)
            } else {
                mkdir_one(conn, &path)
            }
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let path = path.to_string();
        self.run_blocking("delete", move |conn| {
            conn.sftp
                .unlink(Path::new(&path))
                .map_err(|e| map_ssh_error("delete", &path, &e))
        })
        .await
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.run_blocking("disconnect", move |conn| {
            conn.session
                .disconnect(None, "done", None)
                .map_err(|e| StoreError::Transfer(format!("disconnect failed: {e}")))
        })
        .await
    }
}

/// Create one directory, treating an already existing directory as success.
fn mkdir_one(conn: &SftpConnection, path: &str) -> Result<(), StoreError> {
    match conn.sftp.mkdir(Path::new(path), DIRECTORY_MODE) {
        Ok(()) => Ok(()),
        Err(e) => match conn.sftp.stat(Path::new(path)) {
            Ok(stat) if stat.is_dir() => Ok(()),
            _ => Err(map_ssh_error("mkdir", path, &e)),
        },
    }
}

/// Create a directory and any missing parents, one segment at a time.
fn mkdir_recursive(conn: &SftpConnection, path: &str) -> Result<(), StoreError> {
    let mut current = if path.starts_with('/') {
        String::from("/")
    } else {
        String::new()
    };

    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(segment);
        mkdir_one(conn, &current)?;
    }

    Ok(())
}

fn timeout_millis(timeout: std::time::Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

fn map_ssh_error(op: &str, path: &str, err: &ssh2::Error) -> StoreError {
    match err.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ErrorCode::SFTP(SFTP_NO_SUCH_PATH) => {
            StoreError::NotFound(path.to_string())
        }
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => {
            StoreError::Timeout(format!("{op} {path}: {err}"))
        }
        _ => StoreError::Transfer(format!("{op} {path}: {err}")),
    }
}

fn map_io_error(op: &str, path: &str, err: &std::io::Error) -> StoreError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        StoreError::Timeout(format!("{op} {path}: {err}"))
    } else {
        StoreError::Transfer(format!("{op} {path}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_capped_at_u32_millis() {
        assert_eq!(timeout_millis(std::time::Duration::from_secs(30)), 30_000);
        assert_eq!(
            timeout_millis(std::time::Duration::from_secs(u64::MAX / 1000)),
            u32::MAX
        );
    }

    #[test]
    fn sftp_not_found_codes_map_to_not_found() {
        let no_file = ssh2::Error::from_errno(ErrorCode::SFTP(SFTP_NO_SUCH_FILE));
        assert!(matches!(
            map_ssh_error("stat", "a/b", &no_file),
            StoreError::NotFound(path) if path == "a/b"
        ));

        let no_path = ssh2::Error::from_errno(ErrorCode::SFTP(SFTP_NO_SUCH_PATH));
        assert!(matches!(
            map_ssh_error("stat", "a/b", &no_path),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn session_timeout_maps_to_timeout() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT));
        assert!(matches!(
            map_ssh_error("download", "a/b", &err),
            StoreError::Timeout(_)
        ));
    }

    #[test]
    fn other_sftp_failures_map_to_transfer() {
        // 4 = SSH_FX_FAILURE, the generic catch-all status.
        let err = ssh2::Error::from_errno(ErrorCode::SFTP(4));
        assert!(matches!(
            map_ssh_error("mkdir", "a/b", &err),
            StoreError::Transfer(_)
        ));
    }
}
