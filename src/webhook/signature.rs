// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook signature verification.
//!
//! Storage-provider webhooks carry an `x-hub-signature` header of the form
//! `sha256=<hex>`, an HMAC-SHA256 over the exact raw request body bytes.
//! Verification never errors: a request without a signature, or a direction
//! without a configured secret, is simply unauthenticated.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Compute the expected header value (`sha256=<hex>`) for a raw body.
fn expected_signature(secret: &str, payload_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload_body);
    let expected_bytes = mac.finalize().into_bytes();
    format!("sha256={}", hex::encode(expected_bytes))
}

/// Verify a webhook signature against the raw request body.
///
/// Returns `false` when the header is absent, the secret is not configured,
/// or the signature does not match. The comparison pads both values to a
/// common length so the comparison itself is constant-time, and any length
/// mismatch is a rejection.
pub fn verify_signature(
    payload_body: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
) -> bool {
    let (signature, secret) = match (signature, secret) {
        (Some(sig), Some(sec)) if !sig.is_empty() && !sec.is_empty() => (sig, sec),
        _ => return false,
    };

    let computed_sig = expected_signature(secret, payload_body);

    let provided = signature.as_bytes();
    let computed = computed_sig.as_bytes();

    // Compare using constant-time equality over zero-padded buffers to
    // prevent timing attacks; unequal lengths always fail.
    let common_len = provided.len().max(computed.len());
    let mut provided_padded = provided.to_vec();
    provided_padded.resize(common_len, 0);
    let mut computed_padded = computed.to_vec();
    computed_padded.resize(common_len, 0);

    let bytes_equal = provided_padded.ct_eq(&computed_padded).unwrap_u8() == 1;
    bytes_equal && provided.len() == computed.len()
}
