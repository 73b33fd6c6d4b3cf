// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire message kinds.
//!
//! The first `u32` of every frame identifies the message kind. Values are
//! fixed by the protocol; `0` is never a valid kind.

use core::fmt;
use std::convert::TryFrom;

use thiserror::Error;

/// Number of defined message kinds; sized for per-kind counters.
pub const KIND_COUNT: usize = 15;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Login = 1,
    Logout = 2,
    ReserveRequest = 3,
    ReserveResponse = 4,
    CancelRequest = 5,
    CancelResponse = 6,
    StatusRequest = 7,
    StatusResponse = 8,
    StatusUpdate = 9,
    Ping = 10,
    Pong = 11,
    PingResponse = 12,
    TimeSyncRequest = 13,
    TimeSyncResponse = 14,
    Error = 15,
}

impl MessageKind {
    pub const ALL: [MessageKind; KIND_COUNT] = [
        Self::Login,
        Self::Logout,
        Self::ReserveRequest,
        Self::ReserveResponse,
        Self::CancelRequest,
        Self::CancelResponse,
        Self::StatusRequest,
        Self::StatusResponse,
        Self::StatusUpdate,
        Self::Ping,
        Self::Pong,
        Self::PingResponse,
        Self::TimeSyncRequest,
        Self::TimeSyncResponse,
        Self::Error,
    ];

    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::Login,
            2 => Self::Logout,
            3 => Self::ReserveRequest,
            4 => Self::ReserveResponse,
            5 => Self::CancelRequest,
            6 => Self::CancelResponse,
            7 => Self::StatusRequest,
            8 => Self::StatusResponse,
            9 => Self::StatusUpdate,
            10 => Self::Ping,
            11 => Self::Pong,
            12 => Self::PingResponse,
            13 => Self::TimeSyncRequest,
            14 => Self::TimeSyncResponse,
            15 => Self::Error,
            _ => return None,
        })
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Dense zero-based index, for counter arrays.
    #[inline]
    pub const fn index(self) -> usize {
        (self as u32 as usize) - 1
    }

    /// Requests a client may send; everything else is server-originated.
    pub fn is_client_request(self) -> bool {
        matches!(
            self,
            Self::Login
                | Self::Logout
                | Self::ReserveRequest
                | Self::CancelRequest
                | Self::StatusRequest
                | Self::Ping
                | Self::PingResponse
                | Self::TimeSyncRequest
        )
    }
}

/// Returned when the kind field contains an undefined value.
#[derive(Debug, Error)]
#[error("unknown message kind: {0}")]
pub struct UnknownKind(pub u32);

impl TryFrom<u32> for MessageKind {
    type Error = UnknownKind;

    fn try_from(v: u32) -> Result<Self, UnknownKind> {
        Self::from_u32(v).ok_or(UnknownKind(v))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::ReserveRequest => "reserve_request",
            Self::ReserveResponse => "reserve_response",
            Self::CancelRequest => "cancel_request",
            Self::CancelResponse => "cancel_response",
            Self::StatusRequest => "status_request",
            Self::StatusResponse => "status_response",
            Self::StatusUpdate => "status_update",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::PingResponse => "ping_response",
            Self::TimeSyncRequest => "time_sync_request",
            Self::TimeSyncResponse => "time_sync_response",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}
