// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Owned state: devices, reservations, sessions, credentials.
//!
//! Each manager exclusively owns its records and exposes exactly one lock.
//! Cross-manager references are identifiers (`device_id`,
//! `reservation_id`, `username`), never pointers.

pub mod credentials;
pub mod device;
pub mod index;
pub mod reservation;
pub mod session;
