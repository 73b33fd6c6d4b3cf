// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hashed time wheel for reservation expiry.
//!
//! One bucket per second of wheel rotation. An entry lands in
//! `(current + remaining % size) % size` with `cycle = remaining / size`
//! full rotations still to go, so insertion is O(1) and each tick only
//! touches the entries whose second has arrived. Buckets drain LIFO; expiry
//! policy only depends on the reservation's own state, not intra-bucket
//! order.
//!
//! Entries carry a monotonically increasing token. The matching token is
//! stored on the reservation as its scheduler handle; a visit whose token
//! no longer matches the record is stale and gets dropped, which is how
//! cancellation invalidates an entry without ever locking the wheel.

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use crate::error::ServiceError;

/// Default wheel rotation, one hour at one bucket per second.
pub const WHEEL_SIZE: usize = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelEntry {
    pub reservation_id: u32,
    pub token: u64,
    pub cycle: u32,
}

/// Opaque handle kept on the reservation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelHandle {
    pub slot: usize,
    pub token: u64,
}

#[derive(Debug)]
struct WheelInner {
    buckets: Vec<Vec<WheelEntry>>,
    current: usize,
}

#[derive(Debug)]
pub struct TimeWheel {
    inner: Mutex<WheelInner>,
    size: usize,
    next_token: AtomicU64,
}

impl TimeWheel {
    pub fn new() -> Self {
        Self::with_size(WHEEL_SIZE)
    }

    /// Smaller wheels are useful in tests; size must be at least 2 so the
    /// one-tick look-ahead reinsert never lands back in the current bucket.
    pub fn with_size(size: usize) -> Self {
        let size = size.max(2);
        Self {
            inner: Mutex::new(WheelInner {
                buckets: (0..size).map(|_| Vec::new()).collect(),
                current: 0,
            }),
            size,
            next_token: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WheelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Schedule an expiry `remaining_secs` from now. Zero remaining time is
    /// rejected; the caller has already refused past end times.
    pub fn insert(&self, reservation_id: u32, remaining_secs: u64) -> Result<WheelHandle, ServiceError> {
        if remaining_secs == 0 {
            return Err(ServiceError::ReservationInvalidTime(
                "expiry is not in the future".to_string(),
            ));
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let cycle = (remaining_secs / self.size as u64).min(u64::from(u32::MAX)) as u32;
        let mut inner = self.lock();
        let slot = (inner.current + (remaining_secs % self.size as u64) as usize) % self.size;
        inner.buckets[slot].push(WheelEntry {
            reservation_id,
            token,
            cycle,
        });
        Ok(WheelHandle { slot, token })
    }

    /// Advance one second and detach the arrived bucket. The lock is
    /// released before the caller visits any entry.
    pub fn advance(&self) -> Vec<WheelEntry> {
        let mut inner = self.lock();
        inner.current = (inner.current + 1) % self.size;
        let current = inner.current;
        std::mem::take(&mut inner.buckets[current])
    }

    /// Put an entry back into the bucket that was just drained; it will be
    /// visited again after one full rotation.
    pub fn reinsert_current(&self, entry: WheelEntry) {
        let mut inner = self.lock();
        let current = inner.current;
        inner.buckets[current].push(entry);
    }

    /// One-tick look-ahead for the fractional remainder of an expiry that
    /// has not quite arrived.
    pub fn reinsert_next(&self, entry: WheelEntry) {
        let mut inner = self.lock();
        let slot = (inner.current + 1) % self.size;
        inner.buckets[slot].push(entry);
    }

    pub fn current_index(&self) -> usize {
        self.lock().current
    }

    /// Entries currently scheduled, all buckets included.
    pub fn pending(&self) -> usize {
        self.lock().buckets.iter().map(Vec::len).sum()
    }
}

impl Default for TimeWheel {
    fn default() -> Self {
        Self::new()
    }
}
