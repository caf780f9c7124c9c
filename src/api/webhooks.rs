// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook endpoints for the two transfer directions.
//!
//! Both handlers read the raw request body, since the HMAC signature is
//! computed over the exact bytes the provider sent. Parsing happens only
//! after the signature has been accepted.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::RelayError;
use crate::relay::{Direction, Relay, RelayOutcome};
use crate::state::AppState;
use crate::webhook::SIGNATURE_HEADER;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Storage event payload as delivered by the provider. Unknown fields are
/// ignored; only the id and the file path are read.
#[derive(Debug, ToSchema)]
#[schema(rename_all = "PascalCase")]
pub struct WebhookEventBody {
    /// Provider-assigned event id.
    pub id: String,
    pub data: WebhookEventData,
}

#[derive(Debug, ToSchema)]
#[schema(rename_all = "PascalCase")]
pub struct WebhookEventData {
    /// URL-encoded path of the file the event refers to.
    pub path: String,
}

/// A transfer that ran to completion.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferSuccessResponse {
    /// Always `success`.
    pub status: String,
    /// Decoded path of the source file.
    pub source_path: String,
    /// Path the transformed file was uploaded to.
    pub target_path: String,
    /// Byte size of the source file.
    pub size: u64,
    /// Correlation id, also attached to every log line of this transfer.
    pub operation_id: String,
    /// Total processing time in milliseconds.
    pub elapsed_time: i64,
}

/// A file that was deliberately left untouched.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferSkippedResponse {
    /// Always `skipped`.
    pub status: String,
    /// One of `already_encrypted`, `filtered`, `file_exists`.
    pub reason: String,
    pub source_path: String,
    /// Present when a destination had already been resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    pub operation_id: String,
}

/// A transfer that failed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferErrorResponse {
    /// Always `error`.
    pub status: String,
    /// Human-readable failure description.
    pub error: String,
    /// Stable machine-readable code.
    pub reason: String,
    /// Pipeline stage that failed, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub operation_id: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Decrypt the file referenced by a storage event.
///
/// Downloads the PGP message, decrypts it with the configured private key
/// and uploads the plaintext under the file's original name.
#[utoipa::path(
    post,
    path = "/api/webhook-pgp-decrypt",
    tag = "Webhooks",
    request_body = WebhookEventBody,
    params(
        ("x-hub-signature" = String, Header, description = "HMAC-SHA256 of the raw body, as `sha256=<hex>`")
    ),
    responses(
        (status = 200, description = "Transfer completed or skipped", body = TransferSuccessResponse),
        (status = 400, description = "Malformed event payload", body = TransferErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = TransferErrorResponse),
        (status = 500, description = "Transfer failed", body = TransferErrorResponse)
    )
)]
pub async fn webhook_pgp_decrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let operation_id = Relay::operation_id(Direction::Decrypt);
    let signature = signature_header(&headers);
    let result = state
        .relay
        .process_decrypt(&operation_id, &body, signature)
        .await;
    into_response(operation_id, result)
}

/// Encrypt the file referenced by a storage event.
///
/// Downloads the file, encrypts it to the configured recipients (signing
/// it when a signing key is configured) and uploads the ciphertext to the
/// derived destination path.
#[utoipa::path(
    post,
    path = "/api/webhook-pgp-encrypt",
    tag = "Webhooks",
    request_body = WebhookEventBody,
    params(
        ("x-hub-signature" = String, Header, description = "HMAC-SHA256 of the raw body, as `sha256=<hex>`")
    ),
    responses(
        (status = 200, description = "Transfer completed or skipped", body = TransferSuccessResponse),
        (status = 400, description = "Malformed event payload", body = TransferErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = TransferErrorResponse),
        (status = 500, description = "Transfer failed", body = TransferErrorResponse)
    )
)]
pub async fn webhook_pgp_encrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let operation_id = Relay::operation_id(Direction::Encrypt);
    let signature = signature_header(&headers);
    let result = state
        .relay
        .process_encrypt(&operation_id, &body, signature)
        .await;
    into_response(operation_id, result)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
}

fn into_response(operation_id: String, result: Result<RelayOutcome, RelayError>) -> Response {
    match result {
        Ok(RelayOutcome::Completed {
            operation_id,
            source,
            destination,
            size,
            elapsed_ms,
        }) => (
            StatusCode::OK,
            Json(TransferSuccessResponse {
                status: "success".to_string(),
                source_path: source,
                target_path: destination,
                size,
                operation_id,
                elapsed_time: elapsed_ms,
            }),
        )
            .into_response(),
        Ok(RelayOutcome::Skipped {
            operation_id,
            reason,
            source,
            destination,
        }) => (
            StatusCode::OK,
            Json(TransferSkippedResponse {
                status: "skipped".to_string(),
                reason: reason.as_str().to_string(),
                source_path: source,
                target_path: destination,
                operation_id,
            }),
        )
            .into_response(),
        Err(err) => (
            err.status_code(),
            Json(TransferErrorResponse {
                status: "error".to_string(),
                error: err.to_string(),
                reason: err.error_code().to_string(),
                stage: err.stage().map(|stage| stage.as_str().to_string()),
                operation_id,
            }),
        )
            .into_response(),
    }
}
