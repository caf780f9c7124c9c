// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound webhook event parsing.
//!
//! The storage provider posts a JSON payload naming the file that changed:
//!
//! ```json
//! { "Id": "evt-123", "Data": { "Path": "inbox/report%20final.csv" } }
//! ```
//!
//! Paths arrive URL-encoded. They are normalized once here (`+` to space,
//! then percent-decoding) and every later stage works with the decoded
//! form.

use percent_encoding::percent_decode_str;
use serde::Deserialize;

/// Identifier substituted when the payload carries none.
const UNKNOWN_EVENT_ID: &str = "unknown";

/// A normalized change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Provider-assigned event identifier, `"unknown"` if absent.
    pub id: String,
    /// Decoded path of the file the event refers to.
    pub subject_path: String,
}

/// Event parsing failure, mapped to a 400 response by the handler.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("event payload is missing the file path")]
    MissingPath,

    #[error("file path is not valid UTF-8 after decoding")]
    InvalidEncoding,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "Data")]
    data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
struct EventData {
    #[serde(rename = "Path")]
    path: Option<String>,
}

/// Decode a provider path: `+` means space, then percent-decode.
///
/// Stray `%` sequences that are not valid escapes pass through unchanged;
/// only invalid UTF-8 in the decoded bytes is an error.
fn decode_path(raw: &str) -> Result<String, EventError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| EventError::InvalidEncoding)
}

/// Parse and normalize a raw webhook body into an [`InboundEvent`].
pub fn parse_event(raw_body: &[u8]) -> Result<InboundEvent, EventError> {
    let payload: EventPayload = serde_json::from_slice(raw_body)
        .map_err(|e| EventError::MalformedPayload(e.to_string()))?;

    let raw_path = payload
        .data
        .and_then(|data| data.path)
        .filter(|path| !path.is_empty())
        .ok_or(EventError::MissingPath)?;

    let id = payload
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| UNKNOWN_EVENT_ID.to_string());

    Ok(InboundEvent {
        id,
        subject_path: decode_path(&raw_path)?,
    })
}
