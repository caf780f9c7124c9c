// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay failure taxonomy.
//!
//! Every failed transfer maps to exactly one of these; the webhook layer
//! turns them into HTTP responses. A skipped transfer is not an error and
//! is represented as a successful outcome instead.

use axum::http::StatusCode;

use crate::pgp::PgpError;
use crate::store::StoreError;
use crate::webhook::EventError;

/// Pipeline stage names used in diagnostics and error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Guard,
    Download,
    Transform,
    Upload,
    Cleanup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connect => "connect",
            Stage::Guard => "guard",
            Stage::Download => "download",
            Stage::Transform => "transform",
            Stage::Upload => "upload",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one transfer job.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Missing or invalid webhook signature. The response body stays
    /// generic; nothing about the expected signature is disclosed.
    #[error("invalid webhook signature")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{stage} failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Crypto(#[from] PgpError),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Transport { .. } | RelayError::Crypto(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::Unauthorized => "unauthorized",
            RelayError::BadRequest(_) => "bad_request",
            RelayError::Transport { .. } => "transport_error",
            RelayError::Crypto(_) => "crypto_error",
        }
    }

    /// Stage the job failed in, where one applies.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RelayError::Transport { stage, .. } => Some(*stage),
            RelayError::Crypto(_) => Some(Stage::Transform),
            _ => None,
        }
    }
}

impl From<EventError> for RelayError {
    fn from(err: EventError) -> Self {
        RelayError::BadRequest(err.to_string())
    }
}
