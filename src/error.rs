// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Service error taxonomy.
//!
//! Every rejection a client can observe maps to a numeric `error_code`
//! carried on `ERROR` frames. Codes are grouped by module:
//!
//! * `1xx` parameter validation
//! * `2xx` connection / transport
//! * `3xx` message framing
//! * `4xx` session
//! * `5xx` resource (device)
//! * `6xx` reservation
//! * `700` unauthenticated request
//! * `900` internal invariant violation

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("connection closed by peer")]
    NetworkClosed,

    #[error("network operation timed out: {0}")]
    NetworkTimeout(&'static str),

    #[error("TLS failure: {0}")]
    NetworkTls(String),

    #[error("{field} length {len} exceeds protocol limit")]
    MessageTooLarge { field: &'static str, len: usize },

    #[error("unknown message kind {0}")]
    MessageBadKind(u32),

    #[error("argument is not valid UTF-8")]
    MessageBadUtf8,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("user {0} already has an active session")]
    SessionAlreadyExists(String),

    #[error("device {device_id} is reserved by {holder}")]
    ResourceInUse { device_id: String, holder: String },

    #[error("device {0} is in maintenance mode")]
    ResourceMaintenance(String),

    #[error("device {0} does not exist")]
    ResourceNotFound(String),

    #[error("invalid reservation time: {0}")]
    ReservationInvalidTime(String),

    #[error("reservation overlaps an approved reservation on {device_id}")]
    ReservationConflict { device_id: String },

    #[error("reservation limit reached ({0})")]
    ReservationLimitReached(usize),

    #[error("no active reservation for device {0}")]
    ReservationNotFound(String),

    #[error("reservation on {0} belongs to another user")]
    ReservationPermissionDenied(String),

    #[error("permission denied: login required")]
    PermissionDenied,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Numeric code carried on `ERROR` frames.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidParameter(_) => 100,
            Self::NetworkClosed => 201,
            Self::NetworkTimeout(_) => 202,
            Self::NetworkTls(_) => 203,
            Self::MessageTooLarge { .. } => 301,
            Self::MessageBadKind(_) => 302,
            Self::MessageBadUtf8 => 303,
            Self::AuthenticationFailed => 401,
            Self::SessionAlreadyExists(_) => 402,
            Self::ResourceInUse { .. } => 501,
            Self::ResourceMaintenance(_) => 502,
            Self::ResourceNotFound(_) => 503,
            Self::ReservationInvalidTime(_) => 601,
            Self::ReservationConflict { .. } => 602,
            Self::ReservationLimitReached(_) => 603,
            Self::ReservationNotFound(_) => 604,
            Self::ReservationPermissionDenied(_) => 605,
            Self::PermissionDenied => 700,
            Self::Internal(_) => 900,
        }
    }

    /// Session/authentication class errors. Clients reset login-form state
    /// only for these, not for resource or reservation rejections.
    pub fn is_auth(&self) -> bool {
        matches!(self.code(), 400..=499)
    }

    /// Transport and framing failures close the connection; everything else
    /// is answered with a single `ERROR` frame and the connection stays.
    pub fn closes_connection(&self) -> bool {
        matches!(self.code(), 200..=399)
    }
}
