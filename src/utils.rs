// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Wall-clock time as unix epoch seconds. Reservation times and session
/// activity stamps all use this granularity; sub-second precision is not
/// part of the service contract.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Millisecond wall-clock time, used by the time-sync exchange.
pub fn unix_now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Random session token. Uniqueness per process lifetime is all that is
/// required; tokens never travel back over the wire.
pub fn session_token() -> u64 {
    rand::random::<u64>()
}

/// Render an epoch-seconds stamp for logs and operator output.
pub fn format_ts(secs: u64) -> String {
    match DateTime::<Utc>::from_timestamp(secs as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("@{secs}"),
    }
}
