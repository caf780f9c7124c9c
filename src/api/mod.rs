// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod health;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/webhook-pgp-decrypt", post(webhooks::webhook_pgp_decrypt))
        .route("/api/webhook-pgp-encrypt", post(webhooks::webhook_pgp_encrypt))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    api_routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        webhooks::webhook_pgp_decrypt,
        webhooks::webhook_pgp_encrypt,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            webhooks::WebhookEventBody,
            webhooks::WebhookEventData,
            webhooks::TransferSuccessResponse,
            webhooks::TransferSkippedResponse,
            webhooks::TransferErrorResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Webhooks", description = "Storage-event triggered PGP transfers"),
        (name = "Health", description = "Service health and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{
        DecryptSettings, EncryptSettings, Settings, SftpSettings, UploadTarget,
    };
    use crate::pgp::PgpTransform;
    use crate::relay::Relay;
    use crate::state::AppState;
    use crate::store::memory::MemoryConnector;

    pub(crate) const DECRYPT_SECRET: &str = "decrypt-hook-secret";
    pub(crate) const ENCRYPT_SECRET: &str = "encrypt-hook-secret";

    /// Fully configured state over an in-memory store: both directions
    /// keyed with the test fixtures, relative encrypted uploads.
    pub(crate) fn test_state(connector: &MemoryConnector) -> AppState {
        let settings = Settings {
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
                private_key: Some(include_str!("../pgp/testdata/recipient.sec.asc").into()),
                passphrase: None,
                upload: UploadTarget {
                    path: "decrypted".into(),
                    relative: false,
                },
                delete_after_upload: false,
            },
            encrypt: EncryptSettings {
                webhook_secret: Some(ENCRYPT_SECRET.into()),
                public_keys: Some(include_str!("../pgp/testdata/recipient.pub.asc").into()),
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
        };
        let relay = Relay::new(
            Arc::new(settings),
            Arc::new(connector.clone()),
            Arc::new(PgpTransform::new()),
        )
        .unwrap();
        AppState::new(relay)
    }
}
