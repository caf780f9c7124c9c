// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Orchestration
//!
//! Drives one webhook event through the full pipeline: signature check,
//! payload parsing, filtering, path resolution, then
//! download/transform/upload against the remote store. Each job opens its
//! own connection and releases it on every exit path.

pub mod filter;
pub mod paths;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, EncryptSettings, Settings};
use crate::error::{RelayError, Stage};
use crate::pgp::{CryptoTransform, EncryptOptions, KeyMaterial, PgpError};
use crate::store::{RemoteConnector, RemoteFileStore};
use crate::webhook::{parse_event, verify_signature};

pub use filter::{FileFilter, FilterDecision};
pub use paths::ResolvedPath;

/// Which transformation a webhook requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decrypt,
    Encrypt,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Decrypt => "decrypt",
            Direction::Encrypt => "encrypt",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a file was deliberately not processed. Skips are successful
/// outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyEncrypted,
    Filtered,
    FileExists,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyEncrypted => "already_encrypted",
            SkipReason::Filtered => "filtered",
            SkipReason::FileExists => "file_exists",
        }
    }
}

/// Terminal state of one processed webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed {
        operation_id: String,
        source: String,
        destination: String,
        /// Byte size of the source file, before transformation.
        size: u64,
        elapsed_ms: i64,
    },
    Skipped {
        operation_id: String,
        reason: SkipReason,
        source: String,
        /// Present only when a destination had already been resolved,
        /// as for an existing-file skip.
        destination: Option<String>,
    },
}

/// One in-flight transfer.
struct TransferJob {
    operation_id: String,
    direction: Direction,
    resolved: ResolvedPath,
    started_at: DateTime<Utc>,
}

impl TransferJob {
    fn new(operation_id: &str, direction: Direction, resolved: ResolvedPath) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            direction,
            resolved,
            started_at: Utc::now(),
        }
    }

    fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

/// The relay service itself. Cheap to share; per-request work happens in
/// `process_decrypt` and `process_encrypt`.
pub struct Relay {
    settings: Arc<Settings>,
    connector: Arc<dyn RemoteConnector>,
    transform: Arc<dyn CryptoTransform>,
    filter: FileFilter,
}

impl Relay {
    pub fn new(
        settings: Arc<Settings>,
        connector: Arc<dyn RemoteConnector>,
        transform: Arc<dyn CryptoTransform>,
    ) -> Result<Self, ConfigError> {
        let filter = build_filter(&settings.encrypt)?;
        Ok(Self {
            settings,
            connector,
            transform,
            filter,
        })
    }

    /// Fresh correlation id for one webhook delivery.
    pub fn operation_id(direction: Direction) -> String {
        format!("{}-{}", direction.as_str(), Uuid::new_v4())
    }

    /// Connectivity probe for readiness checks: open and immediately
    /// release one remote connection.
    pub async fn check_remote(&self) -> Result<(), crate::store::StoreError> {
        let store = self.connector.connect().await?;
        store.disconnect().await
    }

    /// Handle one decrypt webhook: download the PGP message named by the
    /// event, decrypt it, upload the plaintext under its original name.
    pub async fn process_decrypt(
        &self,
        operation_id: &str,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        let secret = self.settings.decrypt.webhook_secret.as_deref();
        if !verify_signature(raw_body, signature, secret) {
            warn!(operation_id, "decrypt webhook signature rejected");
            return Err(RelayError::Unauthorized);
        }

        let event = parse_event(raw_body)?;
        info!(
            operation_id,
            event_id = %event.id,
            path = %event.subject_path,
            "processing decrypt event"
        );

        let key = self
            .settings
            .decrypt
            .key_material()
            .ok_or(PgpError::MissingKey("decryption private key"))?;

        let resolved = paths::resolve(
            &event.subject_path,
            &self.settings.decrypt.upload.path,
            self.settings.decrypt.upload.relative,
            "",
        );
        let job = TransferJob::new(operation_id, Direction::Decrypt, resolved);

        let store = self.connect().await?;
        let result = self.run_decrypt(&job, &key, store.as_ref()).await;
        release(store.as_ref(), &job.operation_id).await;
        result
    }

    /// Handle one encrypt webhook: download the file named by the event,
    /// encrypt (and optionally sign) it, upload the ciphertext to the
    /// derived destination.
    pub async fn process_encrypt(
        &self,
        operation_id: &str,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<RelayOutcome, RelayError> {
        let secret = self.settings.encrypt.webhook_secret.as_deref();
        if !verify_signature(raw_body, signature, secret) {
            warn!(operation_id, "encrypt webhook signature rejected");
            return Err(RelayError::Unauthorized);
        }

        let event = parse_event(raw_body)?;
        info!(
            operation_id,
            event_id = %event.id,
            path = %event.subject_path,
            "processing encrypt event"
        );

        if let FilterDecision::Skip(reason) = self.filter.evaluate(&event.subject_path) {
            info!(operation_id, reason = reason.as_str(), "skipping file");
            return Ok(RelayOutcome::Skipped {
                operation_id: operation_id.to_string(),
                reason,
                source: event.subject_path,
                destination: None,
            });
        }

        let encrypt = &self.settings.encrypt;
        let recipients = encrypt
            .public_keys
            .clone()
            .ok_or(PgpError::MissingKey("recipient public keys"))?;
        let options = EncryptOptions {
            signing: encrypt.signing_key(),
            ascii_armor: encrypt.ascii_armor,
        };

        let resolved = paths::resolve(
            &event.subject_path,
            &encrypt.upload.path,
            encrypt.upload.relative,
            &encrypt.extension,
        );
        let job = TransferJob::new(operation_id, Direction::Encrypt, resolved);

        let store = self.connect().await?;
        let result = self
            .run_encrypt(&job, &recipients, &options, store.as_ref())
            .await;
        release(store.as_ref(), &job.operation_id).await;
        result
    }

    async fn connect(&self) -> Result<Box<dyn RemoteFileStore>, RelayError> {
        self.connector
            .connect()
            .await
            .map_err(|source| RelayError::Transport {
                stage: Stage::Connect,
                source,
            })
    }

    async fn run_decrypt(
        &self,
        job: &TransferJob,
        key: &KeyMaterial,
        store: &dyn RemoteFileStore,
    ) -> Result<RelayOutcome, RelayError> {
        let ciphertext = download(store, job).await?;
        let size = ciphertext.len() as u64;

        let plaintext = self.transform.decrypt(ciphertext, key).await?;

        self.finish(
            job,
            store,
            plaintext,
            size,
            self.settings.decrypt.delete_after_upload,
        )
        .await
    }

    async fn run_encrypt(
        &self,
        job: &TransferJob,
        recipients: &str,
        options: &EncryptOptions,
        store: &dyn RemoteFileStore,
    ) -> Result<RelayOutcome, RelayError> {
        if !self.settings.encrypt.overwrite {
            if let Some(existing) = self.destination_exists(job, store).await? {
                return Ok(existing);
            }
        }

        let plaintext = download(store, job).await?;
        let size = plaintext.len() as u64;

        let ciphertext = self.transform.encrypt(plaintext, recipients, options).await?;

        self.finish(
            job,
            store,
            ciphertext,
            size,
            self.settings.encrypt.delete_after_upload,
        )
        .await
    }

    /// Existence guard for the encrypt direction. A missing destination
    /// means proceed; anything else that fails the stat fails the job.
    async fn destination_exists(
        &self,
        job: &TransferJob,
        store: &dyn RemoteFileStore,
    ) -> Result<Option<RelayOutcome>, RelayError> {
        match store.stat(&job.resolved.destination).await {
            Ok(info) => {
                info!(
                    operation_id = %job.operation_id,
                    destination = %job.resolved.destination,
                    size = info.size,
                    "destination already exists, skipping"
                );
                Ok(Some(RelayOutcome::Skipped {
                    operation_id: job.operation_id.clone(),
                    reason: SkipReason::FileExists,
                    source: job.resolved.source.clone(),
                    destination: Some(job.resolved.destination.clone()),
                }))
            }
            Err(crate::store::StoreError::NotFound(_)) => Ok(None),
            Err(source) => Err(RelayError::Transport {
                stage: Stage::Guard,
                source,
            }),
        }
    }

    /// Upload the transformed bytes and run post-upload cleanup. Cleanup
    /// failures are logged but never fail a job whose upload succeeded.
    async fn finish(
        &self,
        job: &TransferJob,
        store: &dyn RemoteFileStore,
        output: Vec<u8>,
        source_size: u64,
        delete_source: bool,
    ) -> Result<RelayOutcome, RelayError> {
        store
            .mkdir(&job.resolved.destination_dir, true)
            .await
            .map_err(|source| RelayError::Transport {
                stage: Stage::Upload,
                source,
            })?;

        store
            .upload(output, &job.resolved.destination)
            .await
            .map_err(|source| RelayError::Transport {
                stage: Stage::Upload,
                source,
            })?;

        if delete_source {
            if let Err(err) = store.delete(&job.resolved.source).await {
                warn!(
                    operation_id = %job.operation_id,
                    stage = %Stage::Cleanup,
                    source = %job.resolved.source,
                    error = %err,
                    "source cleanup failed after upload"
                );
            }
        }

        let elapsed_ms = job.elapsed_ms();
        info!(
            operation_id = %job.operation_id,
            direction = %job.direction,
            source = %job.resolved.source,
            destination = %job.resolved.destination,
            size = source_size,
            elapsed_ms,
            "transfer completed"
        );

        Ok(RelayOutcome::Completed {
            operation_id: job.operation_id.clone(),
            source: job.resolved.source.clone(),
            destination: job.resolved.destination.clone(),
            size: source_size,
            elapsed_ms,
        })
    }
}

fn build_filter(encrypt: &EncryptSettings) -> Result<FileFilter, ConfigError> {
    FileFilter::new(&encrypt.include_glob, &encrypt.exclude_glob).map_err(|err| {
        let var = if err.glob() == Some(encrypt.exclude_glob.as_str()) {
            "ENCRYPT_EXCLUDE_GLOB"
        } else {
            "ENCRYPT_INCLUDE_GLOB"
        };
        ConfigError::Invalid {
            var,
            message: err.to_string(),
        }
    })
}

async fn download(store: &dyn RemoteFileStore, job: &TransferJob) -> Result<Vec<u8>, RelayError> {
    store
        .download(&job.resolved.source)
        .await
        .map_err(|source| RelayError::Transport {
            stage: Stage::Download,
            source,
        })
}

async fn release(store: &dyn RemoteFileStore, operation_id: &str) {
    if let Err(err) = store.disconnect().await {
        warn!(operation_id, error = %err, "remote disconnect failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hmac::Mac;

    use super::*;
    use crate::config::{DecryptSettings, SftpSettings, UploadTarget};
    use crate::pgp::PgpTransform;
    use crate::store::memory::{FailureInjection, MemoryConnector};

    const DECRYPT_SECRET: &str = "decrypt-hook-secret";
    const ENCRYPT_SECRET: &str = "encrypt-hook-secret";
    const RECIPIENT_SEC: &str = include_str!("../pgp/testdata/recipient.sec.asc");
    const RECIPIENT_PUB: &str = include_str!("../pgp/testdata/recipient.pub.asc");
    const SIGNER_SEC: &str = include_str!("../pgp/testdata/signer.sec.asc");
    const SAMPLE_PLAINTEXT: &[u8] = include_bytes!("../pgp/testdata/sample.txt");
    const SAMPLE_MESSAGE: &[u8] = include_bytes!("../pgp/testdata/sample.txt.gpg");

    fn test_settings() -> Settings {
        Settings {
            host: "127.0.0.1".into(),
            port: 0,
            sftp: SftpSettings {
                host: "unused".into(),
                port: 22,
                username: "relay".into(),
                password: "unused".into(),
                timeout: Duration::from_secs(5),
            },
            decrypt: DecryptSettings {
                webhook_secret: Some(DECRYPT_SECRET.into()),
                private_key: Some(RECIPIENT_SEC.into()),
                passphrase: None,
                upload: UploadTarget {
                    path: "decrypted".into(),
                    relative: false,
                },
                delete_after_upload: false,
            },
            encrypt: EncryptSettings {
                webhook_secret: Some(ENCRYPT_SECRET.into()),
                public_keys: Some(RECIPIENT_PUB.into()),
                sign_private_key: None,
                sign_passphrase: None,
                upload: UploadTarget {
                    path: "encrypted".into(),
                    relative: true,
                },
                extension: ".gpg".into(),
                ascii_armor: false,
                include_glob: "**/*".into(),
                exclude_glob: "**/*.{gpg,pgp,asc}".into(),
                overwrite: false,
                delete_after_upload: false,
            },
        }
    }

    fn test_relay(settings: Settings, connector: &MemoryConnector) -> Relay {
        Relay::new(
            Arc::new(settings),
            Arc::new(connector.clone()),
            Arc::new(PgpTransform::new()),
        )
        .unwrap()
    }

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn event_body(path: &str) -> Vec<u8> {
        format!(r#"{{"Id":"evt-1","Data":{{"Path":"{path}"}}}}"#).into_bytes()
    }

    async fn decrypt_with_recipient_key(data: Vec<u8>) -> Vec<u8> {
        let key = KeyMaterial {
            armored_key: RECIPIENT_SEC.into(),
            passphrase: None,
        };
        PgpTransform::new().decrypt(data, &key).await.unwrap()
    }

    #[tokio::test]
    async fn encrypt_uploads_ciphertext_to_derived_path() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"totals,1,2,3\n");
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-1", &body, Some(&signature))
            .await
            .unwrap();

        match outcome {
            RelayOutcome::Completed {
                operation_id,
                source,
                destination,
                size,
                ..
            } => {
                assert_eq!(operation_id, "encrypt-test-1");
                assert_eq!(source, "inbox/report.csv");
                assert_eq!(destination, "inbox/encrypted/report.csv.gpg");
                assert_eq!(size, b"totals,1,2,3\n".len() as u64);
            }
            other => panic!("expected completion, got {other:?}"),
        }

        let ciphertext = connector.file("inbox/encrypted/report.csv.gpg").unwrap();
        assert_ne!(ciphertext, b"totals,1,2,3\n");
        let plaintext = decrypt_with_recipient_key(ciphertext).await;
        assert_eq!(plaintext, b"totals,1,2,3\n");

        let counters = connector.counters();
        assert_eq!(counters.connects, 1);
        assert_eq!(counters.stats, 1);
        assert_eq!(counters.downloads, 1);
        assert_eq!(counters.uploads, 1);
        assert_eq!(counters.disconnects, 1);
        assert_eq!(connector.live_connections(), 0);
        // Source is kept unless cleanup is switched on.
        assert!(connector.file("inbox/report.csv").is_some());
    }

    #[tokio::test]
    async fn decrypt_uploads_plaintext_under_original_name() {
        let connector = MemoryConnector::new();
        connector.put_file("drop/report.csv.gpg", SAMPLE_MESSAGE);
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("drop/report.csv.gpg");
        let signature = sign(&body, DECRYPT_SECRET);
        let outcome = relay
            .process_decrypt("decrypt-test-1", &body, Some(&signature))
            .await
            .unwrap();

        match outcome {
            RelayOutcome::Completed {
                source,
                destination,
                size,
                ..
            } => {
                assert_eq!(source, "drop/report.csv.gpg");
                assert_eq!(destination, "decrypted/report.csv.gpg");
                assert_eq!(size, SAMPLE_MESSAGE.len() as u64);
            }
            other => panic!("expected completion, got {other:?}"),
        }

        assert_eq!(
            connector.file("decrypted/report.csv.gpg").unwrap(),
            SAMPLE_PLAINTEXT
        );
        assert_eq!(connector.live_connections(), 0);
        // No existence guard on the decrypt side.
        assert_eq!(connector.counters().stats, 0);
    }

    #[tokio::test]
    async fn signed_encryption_still_round_trips() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/payroll.csv", b"name,amount\n");
        let mut settings = test_settings();
        settings.encrypt.sign_private_key = Some(SIGNER_SEC.into());
        settings.encrypt.sign_passphrase = Some("correct-horse-battery".into());
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/payroll.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        relay
            .process_encrypt("encrypt-test-2", &body, Some(&signature))
            .await
            .unwrap();

        let ciphertext = connector.file("inbox/encrypted/payroll.csv.gpg").unwrap();
        let plaintext = decrypt_with_recipient_key(ciphertext).await;
        assert_eq!(plaintext, b"name,amount\n");
    }

    #[tokio::test]
    async fn redelivery_skips_when_destination_exists() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"totals\n");
        connector.put_file("inbox/encrypted/report.csv.gpg", b"previous-ciphertext");
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-3", &body, Some(&signature))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RelayOutcome::Skipped {
                operation_id: "encrypt-test-3".into(),
                reason: SkipReason::FileExists,
                source: "inbox/report.csv".into(),
                destination: Some("inbox/encrypted/report.csv.gpg".into()),
            }
        );

        let counters = connector.counters();
        assert_eq!(counters.downloads, 0);
        assert_eq!(counters.uploads, 0);
        assert_eq!(connector.live_connections(), 0);
        assert_eq!(
            connector.file("inbox/encrypted/report.csv.gpg").unwrap(),
            b"previous-ciphertext"
        );
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_destination_without_guard() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"fresh\n");
        connector.put_file("inbox/encrypted/report.csv.gpg", b"stale");
        let mut settings = test_settings();
        settings.encrypt.overwrite = true;
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-4", &body, Some(&signature))
            .await
            .unwrap();

        assert!(matches!(outcome, RelayOutcome::Completed { .. }));
        assert_eq!(connector.counters().stats, 0);
        let replaced = connector.file("inbox/encrypted/report.csv.gpg").unwrap();
        assert_ne!(replaced, b"stale");
        assert_eq!(decrypt_with_recipient_key(replaced).await, b"fresh\n");
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_parsing() {
        let connector = MemoryConnector::new();
        let relay = test_relay(test_settings(), &connector);

        // Unparseable body: authentication must fail first.
        let err = relay
            .process_encrypt("encrypt-test-5", b"not json", Some("sha256=00"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized));

        let err = relay
            .process_encrypt("encrypt-test-5", b"{}", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized));

        assert_eq!(connector.counters().connects, 0);
    }

    #[tokio::test]
    async fn missing_secret_rejects_even_signed_requests() {
        let connector = MemoryConnector::new();
        let mut settings = test_settings();
        settings.decrypt.webhook_secret = None;
        let relay = test_relay(settings, &connector);

        let body = event_body("drop/file.gpg");
        let signature = sign(&body, DECRYPT_SECRET);
        let err = relay
            .process_decrypt("decrypt-test-2", &body, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized));
    }

    #[tokio::test]
    async fn authenticated_malformed_payload_is_a_bad_request() {
        let connector = MemoryConnector::new();
        let relay = test_relay(test_settings(), &connector);

        let body = br#"{"id":"evt-1"}"#;
        let signature = sign(body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-6", body, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BadRequest(_)));
        assert_eq!(connector.counters().connects, 0);
    }

    #[tokio::test]
    async fn already_encrypted_and_filtered_paths_never_connect() {
        let connector = MemoryConnector::new();
        let mut settings = test_settings();
        settings.encrypt.include_glob = "**/*.csv".into();
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/data.gpg");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-7", &body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Skipped {
                operation_id: "encrypt-test-7".into(),
                reason: SkipReason::AlreadyEncrypted,
                source: "inbox/data.gpg".into(),
                destination: None,
            }
        );

        let body = event_body("inbox/notes.txt");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-8", &body, Some(&signature))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Skipped {
                operation_id: "encrypt-test-8".into(),
                reason: SkipReason::Filtered,
                source: "inbox/notes.txt".into(),
                destination: None,
            }
        );

        assert_eq!(connector.counters().connects, 0);
    }

    #[tokio::test]
    async fn download_failure_reports_stage_and_releases_connection() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        connector.inject(FailureInjection {
            download: true,
            ..Default::default()
        });
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-9", &body, Some(&signature))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Transport {
                stage: Stage::Download,
                ..
            }
        ));
        assert_eq!(connector.counters().uploads, 0);
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn upload_failure_keeps_the_source_file() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        connector.inject(FailureInjection {
            upload: true,
            ..Default::default()
        });
        let mut settings = test_settings();
        settings.encrypt.delete_after_upload = true;
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-10", &body, Some(&signature))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Transport {
                stage: Stage::Upload,
                ..
            }
        ));
        // Cleanup never runs when the upload failed.
        assert_eq!(connector.counters().deletes, 0);
        assert!(connector.file("inbox/report.csv").is_some());
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn connect_failure_reports_its_stage() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        connector.inject(FailureInjection {
            connect: true,
            ..Default::default()
        });
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-11", &body, Some(&signature))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Transport {
                stage: Stage::Connect,
                ..
            }
        ));
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn existence_guard_failure_reports_its_stage() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        connector.inject(FailureInjection {
            stat: true,
            ..Default::default()
        });
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-16", &body, Some(&signature))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Transport {
                stage: Stage::Guard,
                ..
            }
        ));
        // A failed guard stops the job before any download.
        assert_eq!(connector.counters().downloads, 0);
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn mkdir_failure_is_reported_as_an_upload_failure() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        connector.inject(FailureInjection {
            mkdir: true,
            ..Default::default()
        });
        let relay = test_relay(test_settings(), &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-17", &body, Some(&signature))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Transport {
                stage: Stage::Upload,
                ..
            }
        ));
        assert_eq!(connector.counters().uploads, 0);
        assert!(connector.file("inbox/report.csv").is_some());
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn cleanup_removes_source_after_successful_upload() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        let mut settings = test_settings();
        settings.encrypt.delete_after_upload = true;
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-12", &body, Some(&signature))
            .await
            .unwrap();

        assert!(matches!(outcome, RelayOutcome::Completed { .. }));
        assert!(connector.file("inbox/report.csv").is_none());
        assert!(connector.file("inbox/encrypted/report.csv.gpg").is_some());
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_fail_the_job() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"data");
        connector.inject(FailureInjection {
            delete: true,
            ..Default::default()
        });
        let mut settings = test_settings();
        settings.encrypt.delete_after_upload = true;
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let outcome = relay
            .process_encrypt("encrypt-test-13", &body, Some(&signature))
            .await
            .unwrap();

        assert!(matches!(outcome, RelayOutcome::Completed { .. }));
        assert!(connector.file("inbox/report.csv").is_some());
        assert!(connector.file("inbox/encrypted/report.csv.gpg").is_some());
        assert_eq!(connector.counters().deletes, 1);
    }

    #[tokio::test]
    async fn missing_key_configuration_fails_before_connecting() {
        let connector = MemoryConnector::new();
        let mut settings = test_settings();
        settings.encrypt.public_keys = None;
        settings.decrypt.private_key = None;
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        let err = relay
            .process_encrypt("encrypt-test-14", &body, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Crypto(PgpError::MissingKey("recipient public keys"))
        ));

        let body = event_body("drop/file.gpg");
        let signature = sign(&body, DECRYPT_SECRET);
        let err = relay
            .process_decrypt("decrypt-test-3", &body, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Crypto(PgpError::MissingKey("decryption private key"))
        ));

        assert_eq!(connector.counters().connects, 0);
    }

    #[tokio::test]
    async fn armored_output_is_uploaded_when_configured() {
        let connector = MemoryConnector::new();
        connector.put_file("inbox/report.csv", b"armored please\n");
        let mut settings = test_settings();
        settings.encrypt.ascii_armor = true;
        let relay = test_relay(settings, &connector);

        let body = event_body("inbox/report.csv");
        let signature = sign(&body, ENCRYPT_SECRET);
        relay
            .process_encrypt("encrypt-test-15", &body, Some(&signature))
            .await
            .unwrap();

        let uploaded = connector.file("inbox/encrypted/report.csv.gpg").unwrap();
        assert!(uploaded.starts_with(b"-----BEGIN PGP MESSAGE-----"));
        assert_eq!(decrypt_with_recipient_key(uploaded).await, b"armored please\n");
    }

    #[test]
    fn operation_ids_are_prefixed_and_unique() {
        let a = Relay::operation_id(Direction::Encrypt);
        let b = Relay::operation_id(Direction::Encrypt);
        assert!(a.starts_with("encrypt-"));
        assert!(Relay::operation_id(Direction::Decrypt).starts_with("decrypt-"));
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_configured_glob_names_the_variable() {
        let mut settings = test_settings();
        settings.encrypt.exclude_glob = "bad{".into();
        let err = Relay::new(
            Arc::new(settings),
            Arc::new(MemoryConnector::new()),
            Arc::new(PgpTransform::new()),
        )
        .err()
        .expect("invalid glob must be rejected");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "ENCRYPT_EXCLUDE_GLOB",
                ..
            }
        ));
    }
}
