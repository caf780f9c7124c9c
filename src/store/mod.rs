// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote file store capability.
//!
//! Every transfer job works against these traits rather than a concrete
//! client: [`RemoteConnector`] opens one connection per job, and the
//! returned [`RemoteFileStore`] carries the file operations the relay
//! needs. Production uses the SFTP implementation in [`sftp`]; tests use
//! the in-memory implementation in [`memory`].

use async_trait::async_trait;

pub mod memory;
pub mod sftp;

pub use memory::MemoryConnector;
pub use sftp::SftpConnector;

/// Metadata for a remote path, as reported by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub size: u64,
    pub is_file: bool,
    pub is_dir: bool,
}

/// Remote store failure.
///
/// `NotFound` is deliberately its own variant: the destination guard must
/// distinguish "the path does not exist" from every other stat failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("remote path not found: {0}")]
    NotFound(String),

    #[error("remote operation timed out: {0}")]
    Timeout(String),

    #[error("remote connection failed: {0}")]
    Connect(String),

    #[error("remote transfer failed: {0}")]
    Transfer(String),
}

/// Opens remote store connections, one per transfer job.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteFileStore>, StoreError>;
}

/// One live remote connection.
///
/// Paths are POSIX strings as derived by the path resolver. Implementations
/// must bound every operation with a timeout; a hung remote endpoint
/// surfaces as [`StoreError::Timeout`], never as an indefinite wait.
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Read the full contents of a remote file.
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Write `data` to a remote path, replacing any existing file.
    async fn upload(&self, data: Vec<u8>, path: &str) -> Result<(), StoreError>;

    /// Fetch metadata for a remote path.
    async fn stat(&self, path: &str) -> Result<RemoteFileInfo, StoreError>;

    /// Create a directory; with `recursive` set, create missing parents
    /// and tolerate segments that already exist.
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), StoreError>;

    /// Remove a remote file.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Close the connection. Further operations on this store fail.
    async fn disconnect(&self) -> Result<(), StoreError>;
}
