// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory remote file store.
//!
//! Behaves like a tiny remote filesystem with the same error taxonomy as
//! the SFTP implementation: uploads need an existing parent directory,
//! missing paths report `NotFound`. Tests use the operation counters, the
//! failure injection flags, and the live-connection gauge to assert how
//! the relay drove the store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::relay::paths::dirname;

use super::{RemoteConnector, RemoteFileInfo, RemoteFileStore, StoreError};

/// Operation counts across all connections of one [`MemoryConnector`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpCounters {
    pub connects: usize,
    pub downloads: usize,
    pub uploads: usize,
    pub stats: usize,
    pub mkdirs: usize,
    pub deletes: usize,
    pub disconnects: usize,
}

/// Which operations should fail with an injected transfer error.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureInjection {
    pub connect: bool,
    pub download: bool,
    pub upload: bool,
    pub stat: bool,
    pub mkdir: bool,
    pub delete: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    counters: OpCounters,
    fail: FailureInjection,
    live_connections: usize,
}

/// Shared-state connector handing out [`MemoryStore`] connections.
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, registering its parent directories.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let mut state = self.lock();
        register_parents(&mut state.dirs, path);
        state.files.insert(path.to_string(), data.to_vec());
    }

    /// Current contents of a stored file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    pub fn counters(&self) -> OpCounters {
        self.lock().counters
    }

    /// Number of connections opened but not yet disconnected.
    pub fn live_connections(&self) -> usize {
        self.lock().live_connections
    }

    pub fn inject(&self, fail: FailureInjection) {
        self.lock().fail = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteFileStore>, StoreError> {
        let mut state = self.lock();
        state.counters.connects += 1;
        if state.fail.connect {
            return Err(StoreError::Connect("injected connect failure".to_string()));
        }
        state.live_connections += 1;
        Ok(Box::new(MemoryStore {
            state: Arc::clone(&self.state),
        }))
    }
}

/// One handle onto the shared in-memory filesystem.
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteFileStore for MemoryStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let mut state = self.lock();
        state.counters.downloads += 1;
        if state.fail.download {
            return Err(StoreError::Transfer("injected download failure".to_string()));
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn upload(&self, data: Vec<u8>, path: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.counters.uploads += 1;
        if state.fail.upload {
            return Err(StoreError::Transfer("injected upload failure".to_string()));
        }
        let parent = dirname(path);
        if !is_implicit_root(parent) && !state.dirs.contains(parent) {
            return Err(StoreError::NotFound(parent.to_string()));
        }
        state.files.insert(path.to_string(), data);
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<RemoteFileInfo, StoreError> {
        let mut state = self.lock();
        state.counters.stats += 1;
        if state.fail.stat {
            return Err(StoreError::Transfer("injected stat failure".to_string()));
        }
        if let Some(data) = state.files.get(path) {
            return Ok(RemoteFileInfo {
                size: data.len() as u64,
                is_file: true,
                is_dir: false,
            });
        }
        if state.dirs.contains(path) {
            return Ok(RemoteFileInfo {
                size: 0,
                is_file: false,
                is_dir: true,
            });
        }
        Err(StoreError::NotFound(path.to_string()))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.counters.mkdirs += 1;
        if state.fail.mkdir {
            return Err(StoreError::Transfer("injected mkdir failure".to_string()));
        }
        if is_implicit_root(path) {
            return Ok(());
        }
        if recursive {
            register_parents(&mut state.dirs, path);
            state.dirs.insert(path.to_string());
        } else {
            let parent = dirname(path);
            if !is_implicit_root(parent) && !state.dirs.contains(parent) {
                return Err(StoreError::NotFound(parent.to_string()));
            }
            state.dirs.insert(path.to_string());
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.counters.deletes += 1;
        if state.fail.delete {
            return Err(StoreError::Transfer("injected delete failure".to_string()));
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.counters.disconnects += 1;
        state.live_connections = state.live_connections.saturating_sub(1);
        Ok(())
    }
}

fn is_implicit_root(path: &str) -> bool {
    path.is_empty() || path == "." || path == "/"
}

/// Record every ancestor directory of `path` as existing.
fn register_parents(dirs: &mut HashSet<String>, path: &str) {
    let mut current = dirname(path);
    while !is_implicit_root(current) {
        dirs.insert(current.to_string());
        current = dirname(current);
    }
}
