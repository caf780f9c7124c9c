// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational PGP Relay - Event-Triggered Secure File Transfers
//!
//! This crate provides a webhook-driven relay that moves files between an
//! SFTP store and PGP: storage events name a file, the relay downloads it,
//! decrypts or encrypts it, and uploads the result to a derived path.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `webhook` - Signature verification and event parsing
//! - `relay` - Transfer orchestration, filtering and path resolution
//! - `pgp` - Message encryption, decryption and signing
//! - `store` - Remote file store access (SFTP)

pub mod api;
pub mod config;
pub mod error;
pub mod pgp;
pub mod relay;
pub mod state;
pub mod store;
pub mod webhook;
