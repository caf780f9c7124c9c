// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File filtering for the encrypt direction.
//!
//! Two layers, both evaluated against the full decoded path before any
//! remote connection is opened: a fixed set of extensions this system
//! itself produces (re-encrypting those would loop), then the configured
//! include/exclude globs. Exclude wins over include.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use super::SkipReason;

/// Extensions treated as already-encrypted output.
const ENCRYPTED_EXTENSIONS: [&str; 3] = ["gpg", "pgp", "asc"];

/// Outcome of the filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Process,
    Skip(SkipReason),
}

/// Compiled include/exclude rules. Built once at startup so an invalid
/// pattern fails the process early instead of failing every request.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl FileFilter {
    pub fn new(include_glob: &str, exclude_glob: &str) -> Result<Self, globset::Error> {
        Ok(Self {
            include: build_globset(include_glob)?,
            exclude: build_globset(exclude_glob)?,
        })
    }

    /// Decide whether a path should be encrypted.
    pub fn evaluate(&self, path: &str) -> FilterDecision {
        if has_encrypted_extension(path) {
            return FilterDecision::Skip(SkipReason::AlreadyEncrypted);
        }

        if self.exclude.is_match(path) || !self.include.is_match(path) {
            return FilterDecision::Skip(SkipReason::Filtered);
        }

        FilterDecision::Process
    }
}

fn build_globset(pattern: &str) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    // Shell semantics: `*` stops at path separators, `**` crosses them.
    builder.add(
        GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()?,
    );
    builder.build()
}

/// Case-insensitive extension check. A leading dot is a hidden-file
/// marker, not an extension separator.
fn has_encrypted_extension(path: &str) -> bool {
    let name = super::paths::basename(path);
    let Some(idx) = name.rfind('.') else {
        return false;
    };
    if idx == 0 {
        return false;
    }
    let extension = name[idx + 1..].to_ascii_lowercase();
    ENCRYPTED_EXTENSIONS.contains(&extension.as_str())
}
