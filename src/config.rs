// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All configuration is loaded from the environment once at startup;
//! missing or malformed required values abort the process before the
//! server binds.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `SFTP_HOST` | SFTP server hostname | Required |
//! | `SFTP_PORT` | SFTP server port | `22` |
//! | `SFTP_USER` | SFTP username | Required |
//! | `SFTP_PASSWORD` | SFTP password | Required |
//! | `SFTP_TIMEOUT_SECS` | Connect and I/O timeout in seconds | `30` |
//! | `DECRYPT_WEBHOOK_SECRET` | HMAC secret for the decrypt webhook | Unset (all requests rejected) |
//! | `PGP_PRIVATE_KEY` | Armored decryption key (`\n` escapes accepted) | Unset |
//! | `PGP_PRIVATE_KEY_PASSPHRASE` | Passphrase for the decryption key | Unset |
//! | `DECRYPT_UPLOAD_PATH` | Destination path for decrypted files | Required |
//! | `DECRYPT_UPLOAD_PATH_IS_RELATIVE` | Resolve destination under the source directory | `false` |
//! | `DECRYPT_DELETE_AFTER_UPLOAD` | Delete the source after upload | `false` |
//! | `ENCRYPT_WEBHOOK_SECRET` | HMAC secret for the encrypt webhook | Unset (all requests rejected) |
//! | `PGP_PUBLIC_KEYS` | Armored recipient keys, concatenated | Unset |
//! | `PGP_SIGN_PRIVATE_KEY` | Armored signing key | Unset |
//! | `PGP_SIGN_PASSPHRASE` | Passphrase for the signing key | Unset |
//! | `ENCRYPT_UPLOAD_PATH` | Destination path for encrypted files | Required |
//! | `ENCRYPT_UPLOAD_PATH_IS_RELATIVE` | Resolve destination under the source directory | `false` |
//! | `ENCRYPT_EXTENSION` | Suffix appended to encrypted files | `.gpg` |
//! | `ENCRYPT_ASCII_ARMOR` | Emit armored instead of binary ciphertext | `false` |
//! | `ENCRYPT_INCLUDE_GLOB` | Glob a file must match to be processed | `**/*` |
//! | `ENCRYPT_EXCLUDE_GLOB` | Glob that exempts files from processing | `**/*.{gpg,pgp,asc}` |
//! | `ENCRYPT_OVERWRITE` | Replace an existing destination file | `false` |
//! | `ENCRYPT_DELETE_AFTER_UPLOAD` | Delete the source after upload | `false` |
//!
//! Boolean toggles accept only the literal string `true`; anything else,
//! including `1` and `TRUE`, leaves the toggle off.

use std::time::Duration;

use crate::pgp::KeyMaterial;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_SFTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENCRYPT_EXTENSION: &str = ".gpg";
pub const DEFAULT_INCLUDE_GLOB: &str = "**/*";
pub const DEFAULT_EXCLUDE_GLOB: &str = "**/*.{gpg,pgp,asc}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Complete runtime settings for the relay.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub sftp: SftpSettings,
    pub decrypt: DecryptSettings,
    pub encrypt: EncryptSettings,
}

/// Connection parameters for the remote file store.
#[derive(Clone)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SftpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Where transformed files land.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub path: String,
    /// When set, `path` is resolved under the source file's directory
    /// instead of the store root.
    pub relative: bool,
}

#[derive(Debug, Clone)]
pub struct DecryptSettings {
    pub webhook_secret: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
    pub upload: UploadTarget,
    pub delete_after_upload: bool,
}

impl DecryptSettings {
    pub fn key_material(&self) -> Option<KeyMaterial> {
        self.private_key.as_ref().map(|key| KeyMaterial {
            armored_key: key.clone(),
            passphrase: self.passphrase.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct EncryptSettings {
    pub webhook_secret: Option<String>,
    pub public_keys: Option<String>,
    pub sign_private_key: Option<String>,
    pub sign_passphrase: Option<String>,
    pub upload: UploadTarget,
    pub extension: String,
    pub ascii_armor: bool,
    pub include_glob: String,
    pub exclude_glob: String,
    pub overwrite: bool,
    pub delete_after_upload: bool,
}

impl EncryptSettings {
    /// Signing activates only when both the key and its passphrase are
    /// configured; a key without a passphrase is treated as absent.
    pub fn signing_key(&self) -> Option<KeyMaterial> {
        match (&self.sign_private_key, &self.sign_passphrase) {
            (Some(key), Some(passphrase)) => Some(KeyMaterial {
                armored_key: key.clone(),
                passphrase: Some(passphrase.clone()),
            }),
            _ => None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sftp = SftpSettings {
            host: env_required("SFTP_HOST")?,
            port: env_parse("SFTP_PORT", DEFAULT_SFTP_PORT)?,
            username: env_required("SFTP_USER")?,
            password: env_required("SFTP_PASSWORD")?,
            timeout: Duration::from_secs(env_parse(
                "SFTP_TIMEOUT_SECS",
                DEFAULT_SFTP_TIMEOUT_SECS,
            )?),
        };

        let decrypt = DecryptSettings {
            webhook_secret: env_optional("DECRYPT_WEBHOOK_SECRET"),
            private_key: env_optional("PGP_PRIVATE_KEY"),
            passphrase: env_optional("PGP_PRIVATE_KEY_PASSPHRASE"),
            upload: UploadTarget {
                path: env_required("DECRYPT_UPLOAD_PATH")?,
                relative: env_bool("DECRYPT_UPLOAD_PATH_IS_RELATIVE"),
            },
            delete_after_upload: env_bool("DECRYPT_DELETE_AFTER_UPLOAD"),
        };

        let encrypt = EncryptSettings {
            webhook_secret: env_optional("ENCRYPT_WEBHOOK_SECRET"),
            public_keys: env_optional("PGP_PUBLIC_KEYS"),
            sign_private_key: env_optional("PGP_SIGN_PRIVATE_KEY"),
            sign_passphrase: env_optional("PGP_SIGN_PASSPHRASE"),
            upload: UploadTarget {
                path: env_required("ENCRYPT_UPLOAD_PATH")?,
                relative: env_bool("ENCRYPT_UPLOAD_PATH_IS_RELATIVE"),
            },
            extension: env_or_default("ENCRYPT_EXTENSION", DEFAULT_ENCRYPT_EXTENSION),
            ascii_armor: env_bool("ENCRYPT_ASCII_ARMOR"),
            include_glob: env_or_default("ENCRYPT_INCLUDE_GLOB", DEFAULT_INCLUDE_GLOB),
            exclude_glob: env_or_default("ENCRYPT_EXCLUDE_GLOB", DEFAULT_EXCLUDE_GLOB),
            overwrite: env_bool("ENCRYPT_OVERWRITE"),
            delete_after_upload: env_bool("ENCRYPT_DELETE_AFTER_UPLOAD"),
        };

        Ok(Settings {
            host: env_or_default("HOST", DEFAULT_HOST),
            port: env_parse("PORT", DEFAULT_PORT)?,
            sftp,
            decrypt,
            encrypt,
        })
    }

    /// Address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    env_optional(name).ok_or(ConfigError::MissingVar(name))
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_bool(name: &str) -> bool {
    env_optional(name).as_deref() == Some("true")
}

fn env_parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(name) {
        Some(raw) => raw.parse().map_err(|err| ConfigError::Invalid {
            var: name,
            message: format!("{err}"),
        }),
        None => Ok(default),
    }
}
