// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Destination path derivation.
//!
//! Remote paths are POSIX strings regardless of the host platform, so the
//! helpers here work on `str` rather than `std::path::Path`. Join semantics
//! follow the usual POSIX normalization: duplicate slashes collapse, `.`
//! segments drop, `..` consumes the preceding segment.

/// A fully derived source/destination pair for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Decoded path of the file to download.
    pub source: String,
    /// Directory the result is uploaded into (created if missing).
    pub destination_dir: String,
    /// Full path the result is uploaded to.
    pub destination: String,
}

/// Derive the destination for a source path.
///
/// With `relative = true` the configured path is joined onto the source
/// file's directory; otherwise it is used as-is. The destination file name
/// is the source base name plus `suffix` (empty for the decrypt direction).
pub fn resolve(source: &str, configured_path: &str, relative: bool, suffix: &str) -> ResolvedPath {
    let destination_dir = if relative {
        join(dirname(source), configured_path)
    } else {
        configured_path.to_string()
    };
    let destination = join(&destination_dir, &format!("{}{}", basename(source), suffix));

    ResolvedPath {
        source: source.to_string(),
        destination_dir,
        destination,
    }
}

/// POSIX dirname: everything before the final path separator.
///
/// A path without a separator yields `"."` so that joining a relative
/// target onto a root-level file stays relative.
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." };
    }
    match trimmed.rfind('/') {
        None => ".",
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
    }
}

/// POSIX basename: the final path component.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        None => trimmed,
        Some(idx) => &trimmed[idx + 1..],
    }
}

/// Join two path fragments and normalize the result.
pub fn join(base: &str, tail: &str) -> String {
    normalize(&format!("{base}/{tail}"))
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
