// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook authentication and event normalization.

pub mod event;
pub mod signature;

pub use event::{parse_event, EventError, InboundEvent};
pub use signature::{verify_signature, SIGNATURE_HEADER};
