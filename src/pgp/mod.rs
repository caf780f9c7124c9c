// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PGP transform pipeline.
//!
//! Wraps rPGP behind the [`CryptoTransform`] capability the relay consumes.
//! Both directions operate on fully buffered data; the CPU-bound work runs
//! on the blocking thread pool so transfer tasks stay responsive.
//!
//! Key material arrives as armored text from the environment, where real
//! newlines are often transported as literal `\n` escapes; those are
//! normalized before parsing. Messages are accepted armored or binary,
//! decided by scanning the buffer for the armor header once per job.

use std::fmt;
use std::io::Cursor;

use async_trait::async_trait;
use pgp::composed::{Deserializable, Message, SignedPublicKey, SignedSecretKey};
use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::ser::Serialize;
use rand::thread_rng;
use tokio::task;

const ARMOR_HEADER: &[u8] = b"-----BEGIN PGP MESSAGE-----";

/// Armored key text plus optional passphrase.
///
/// `Debug` is redacted; key material and passphrases must never reach the
/// logs.
#[derive(Clone)]
pub struct KeyMaterial {
    pub armored_key: String,
    pub passphrase: Option<String>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("armored_key", &"<redacted>")
            .field(
                "passphrase",
                if self.passphrase.is_some() {
                    &"<set>"
                } else {
                    &"<unset>"
                },
            )
            .finish()
    }
}

/// Options for the encrypt direction.
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Sign-then-encrypt with this key; `None` produces an unsigned message.
    pub signing: Option<KeyMaterial>,
    /// ASCII-armored output instead of binary framing.
    pub ascii_armor: bool,
}

/// Cryptographic failure, mapped to a 500 response by the handler.
#[derive(Debug, thiserror::Error)]
pub enum PgpError {
    #[error("{0} is not configured")]
    MissingKey(&'static str),

    #[error("key parsing failed: {0}")]
    KeyParse(String),

    #[error("private key is locked and no passphrase is configured")]
    PassphraseRequired,

    #[error("no usable public keys found")]
    NoRecipients,

    #[error("message parsing failed: {0}")]
    MessageParse(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("crypto worker failed: {0}")]
    Worker(String),
}

/// Capability consumed by the relay for both transform directions.
#[async_trait]
pub trait CryptoTransform: Send + Sync {
    /// Decrypt a buffered PGP message (armored or binary) to plaintext.
    async fn decrypt(&self, input: Vec<u8>, key: &KeyMaterial) -> Result<Vec<u8>, PgpError>;

    /// Encrypt buffered plaintext to one or more recipients, optionally
    /// signing first. `recipient_keys` is one or more concatenated armored
    /// public keys.
    async fn encrypt(
        &self,
        input: Vec<u8>,
        recipient_keys: &str,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>, PgpError>;
}

/// Production transform backed by rPGP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgpTransform;

impl PgpTransform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CryptoTransform for PgpTransform {
    async fn decrypt(&self, input: Vec<u8>, key: &KeyMaterial) -> Result<Vec<u8>, PgpError> {
        let key = key.clone();
        task::spawn_blocking(move || decrypt_buffer(&input, &key))
            .await
            .map_err(|e| PgpError::Worker(e.to_string()))?
    }

    async fn encrypt(
        &self,
        input: Vec<u8>,
        recipient_keys: &str,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>, PgpError> {
        let recipient_keys = recipient_keys.to_string();
        let options = options.clone();
        task::spawn_blocking(move || encrypt_buffer(&input, &recipient_keys, &options))
            .await
            .map_err(|e| PgpError::Worker(e.to_string()))?
    }
}

fn decrypt_buffer(input: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, PgpError> {
    let secret_key = parse_secret_key(&key.armored_key)?;
    if is_locked(&secret_key) && key.passphrase.is_none() {
        return Err(PgpError::PassphraseRequired);
    }
    let passphrase = key.passphrase.clone().unwrap_or_default();

    let message = parse_message(input)?;
    let (decrypted, _key_ids) = message
        .decrypt(move || passphrase, &[&secret_key])
        .map_err(|e| PgpError::Decrypt(e.to_string()))?;

    let decrypted = if matches!(decrypted, Message::Compressed(_)) {
        decrypted
            .decompress()
            .map_err(|e| PgpError::Decrypt(e.to_string()))?
    } else {
        decrypted
    };

    decrypted
        .get_content()
        .map_err(|e| PgpError::Decrypt(e.to_string()))?
        .ok_or_else(|| PgpError::Decrypt("message contains no literal data".to_string()))
}

fn encrypt_buffer(
    input: &[u8],
    recipient_keys: &str,
    options: &EncryptOptions,
) -> Result<Vec<u8>, PgpError> {
    let recipients = parse_public_keys(recipient_keys)?;
    if recipients.is_empty() {
        return Err(PgpError::NoRecipients);
    }

    let mut message = Message::new_literal_bytes("", input);

    if let Some(signing) = &options.signing {
        let signing_key = parse_secret_key(&signing.armored_key)?;
        if is_locked(&signing_key) && signing.passphrase.is_none() {
            return Err(PgpError::PassphraseRequired);
        }
        let passphrase = signing.passphrase.clone().unwrap_or_default();
        message = message
            .sign(&signing_key, move || passphrase, HashAlgorithm::SHA2_256)
            .map_err(|e| PgpError::Sign(e.to_string()))?;
    }

    let mut rng = thread_rng();
    let key_refs: Vec<&SignedPublicKey> = recipients.iter().collect();
    let encrypted = message
        .encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES256, &key_refs)
        .map_err(|e| PgpError::Encrypt(e.to_string()))?;

    if options.ascii_armor {
        encrypted
            .to_armored_string(None.into())
            .map(String::into_bytes)
            .map_err(|e| PgpError::Encrypt(e.to_string()))
    } else {
        encrypted
            .to_bytes()
            .map_err(|e| PgpError::Encrypt(e.to_string()))
    }
}

/// Environment transport often turns newlines into literal `\n` escapes.
fn normalize_armor(armored: &str) -> String {
    armored.replace("\\n", "\n")
}

fn is_locked(key: &SignedSecretKey) -> bool {
    key.primary_key.secret_params().is_encrypted()
}

fn parse_secret_key(armored: &str) -> Result<SignedSecretKey, PgpError> {
    let normalized = normalize_armor(armored);
    let (key, _headers) =
        SignedSecretKey::from_string(&normalized).map_err(|e| PgpError::KeyParse(e.to_string()))?;
    Ok(key)
}

fn parse_public_keys(armored: &str) -> Result<Vec<SignedPublicKey>, PgpError> {
    let normalized = normalize_armor(armored);
    let (keys, _headers) = SignedPublicKey::from_string_many(&normalized)
        .map_err(|e| PgpError::KeyParse(e.to_string()))?;
    keys.collect::<Result<Vec<_>, _>>()
        .map_err(|e| PgpError::KeyParse(e.to_string()))
}

fn is_armored(input: &[u8]) -> bool {
    input
        .windows(ARMOR_HEADER.len())
        .any(|window| window == ARMOR_HEADER)
}

fn parse_message(input: &[u8]) -> Result<Message, PgpError> {
    if is_armored(input) {
        let text = String::from_utf8_lossy(input);
        let (message, _headers) =
            Message::from_string(&text).map_err(|e| PgpError::MessageParse(e.to_string()))?;
        Ok(message)
    } else {
        Message::from_bytes(Cursor::new(input)).map_err(|e| PgpError::MessageParse(e.to_string()))
    }
}
