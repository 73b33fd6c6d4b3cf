// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reservation store: conflict-checked creation, soft cancellation, and the
//! scheduler's expiry visits.
//!
//! Creation runs the whole check-and-insert under the store lock, so two
//! racing requests for the same device serialize there and exactly one
//! wins. Cancellation only marks the record and releases the device; the
//! scheduler is the single owner of physical removal, which collapses the
//! cancel, expiry and already-gone cleanup paths into one and removes the
//! race between a cancel and an expiry firing in the same second.
//!
//! Lock order: store -> device registry -> wheel. The store never calls
//! back into the connection layer.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use tracing::warn;

use crate::{
    error::ServiceError,
    registry::device::{ActiveLease, DeviceRegistry, DeviceStatus},
    sched::wheel::{TimeWheel, WheelEntry},
};

/// Upper bound on concurrently tracked reservations, terminal states
/// included until the scheduler purges them.
pub const MAX_RESERVATIONS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Approved,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: u32,
    pub device_id: String,
    pub username: String,
    pub start_time: u64,
    pub end_time: u64,
    pub reason: String,
    pub status: ReservationStatus,
    pub created_at: u64,
    /// Scheduler handle; the wheel validates the token on its next visit.
    pub sched_slot: usize,
    pub sched_token: u64,
}

/// Outcome of one scheduler visit to one wheel entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryVisit {
    /// Record gone or handle stale; drop the entry.
    Gone,
    /// More full rotations to go; reinsert with the decremented cycle.
    Requeue { cycle: u32 },
    /// Fractional remainder; reinsert one bucket ahead.
    RequeueNear,
    /// A cancelled record was physically removed.
    PurgedCancelled,
    /// The reservation expired; the device was released.
    Completed { device_id: String },
}

#[derive(Debug)]
pub struct ReservationStore {
    inner: Mutex<HashMap<u32, Reservation>>,
    next_id: AtomicU32,
    capacity: usize,
    devices: Arc<DeviceRegistry>,
    wheel: Arc<TimeWheel>,
}

impl ReservationStore {
    pub fn new(capacity: usize, devices: Arc<DeviceRegistry>, wheel: Arc<TimeWheel>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            capacity,
            devices,
            wheel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Reservation>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a reservation starting now. On success the device flips to
    /// `RESERVED` and expiry is scheduled on the wheel; the caller is
    /// responsible for broadcasting the fleet change.
    pub fn create(
        &self,
        device_id: &str,
        username: &str,
        duration_secs: i64,
        reason: Option<String>,
        now: u64,
    ) -> Result<Reservation, ServiceError> {
        if duration_secs <= 0 {
            return Err(ServiceError::ReservationInvalidTime(format!(
                "duration {duration_secs}s is not positive"
            )));
        }
        let start = now;
        let end = now + duration_secs as u64;

        // Friendly pre-check against the device state; the authoritative
        // overlap check below runs under the store lock.
        match self.devices.get(device_id) {
            None => return Err(ServiceError::ResourceNotFound(device_id.to_string())),
            Some(d) if d.status == DeviceStatus::Maintenance => {
                return Err(ServiceError::ResourceMaintenance(device_id.to_string()));
            },
            Some(d) if d.status == DeviceStatus::Reserved => {
                return Err(ServiceError::ResourceInUse {
                    device_id: device_id.to_string(),
                    holder: d.reserved_by,
                });
            },
            Some(_) => {},
        }

        let mut map = self.lock();
        if map.len() >= self.capacity {
            return Err(ServiceError::ReservationLimitReached(self.capacity));
        }
        let overlaps = map.values().any(|r| {
            r.status == ReservationStatus::Approved
                && r.device_id == device_id
                && !(end <= r.start_time || start >= r.end_time)
        });
        if overlaps {
            return Err(ServiceError::ReservationConflict {
                device_id: device_id.to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = self.wheel.insert(id, end - now)?;
        let reservation = Reservation {
            id,
            device_id: device_id.to_string(),
            username: username.to_string(),
            start_time: start,
            end_time: end,
            reason: reason.unwrap_or_default(),
            status: ReservationStatus::Approved,
            created_at: now,
            sched_slot: handle.slot,
            sched_token: handle.token,
        };
        map.insert(id, reservation.clone());

        if let Err(e) = self.devices.update_status(
            device_id,
            DeviceStatus::Reserved,
            Some(ActiveLease {
                reservation_id: id,
                end_time: end,
                username: username.to_string(),
            }),
        ) {
            // Device vanished between the pre-check and here; undo the
            // insert and let the stale wheel entry fall out on its own.
            map.remove(&id);
            return Err(e);
        }

        Ok(reservation)
    }

    /// Soft-cancel by reservation id. The record stays in the store until
    /// the scheduler's next visit to its wheel entry.
    pub fn cancel(&self, reservation_id: u32, username: &str) -> Result<String, ServiceError> {
        let mut map = self.lock();
        let Some(r) = map.get_mut(&reservation_id) else {
            return Err(ServiceError::ReservationNotFound(format!("#{reservation_id}")));
        };
        Self::cancel_record(&self.devices, r, username)
    }

    /// Soft-cancel the active reservation on a device, as driven by
    /// `CANCEL_REQUEST` which names the device rather than the id.
    pub fn cancel_for_device(&self, device_id: &str, username: &str) -> Result<u32, ServiceError> {
        let mut map = self.lock();
        let Some(r) = map
            .values_mut()
            .find(|r| r.status == ReservationStatus::Approved && r.device_id == device_id)
        else {
            return Err(ServiceError::ReservationNotFound(device_id.to_string()));
        };
        let id = r.id;
        Self::cancel_record(&self.devices, r, username)?;
        Ok(id)
    }

    fn cancel_record(
        devices: &DeviceRegistry,
        r: &mut Reservation,
        username: &str,
    ) -> Result<String, ServiceError> {
        if r.username != username {
            return Err(ServiceError::ReservationPermissionDenied(r.device_id.clone()));
        }
        if r.status != ReservationStatus::Approved {
            return Err(ServiceError::ReservationNotFound(r.device_id.clone()));
        }
        r.status = ReservationStatus::Cancelled;
        if let Err(e) = devices.update_status(&r.device_id, DeviceStatus::Available, None) {
            warn!("cancel of #{} could not release {}: {e}", r.id, r.device_id);
        }
        Ok(r.device_id.clone())
    }

    /// One scheduler visit to one detached wheel entry. Holds the store
    /// lock for the duration of the visit only.
    pub fn expire_visit(&self, entry: &WheelEntry, now: u64) -> ExpiryVisit {
        let mut map = self.lock();
        let Some(r) = map.get_mut(&entry.reservation_id) else {
            return ExpiryVisit::Gone;
        };
        if r.sched_token != entry.token {
            return ExpiryVisit::Gone;
        }
        match r.status {
            ReservationStatus::Cancelled => {
                map.remove(&entry.reservation_id);
                ExpiryVisit::PurgedCancelled
            },
            ReservationStatus::Approved if entry.cycle > 0 => ExpiryVisit::Requeue {
                cycle: entry.cycle - 1,
            },
            ReservationStatus::Approved if r.end_time > now => ExpiryVisit::RequeueNear,
            ReservationStatus::Approved => {
                r.status = ReservationStatus::Completed;
                let device_id = r.device_id.clone();
                let id = r.id;
                map.remove(&entry.reservation_id);
                self.release_device(&device_id, id);
                ExpiryVisit::Completed { device_id }
            },
            ReservationStatus::Completed => {
                // A completed record should never still be indexed; tolerate
                // and discard rather than abort (invariant violation).
                warn!("reservation #{} already completed but still indexed", r.id);
                map.remove(&entry.reservation_id);
                ExpiryVisit::Gone
            },
        }
    }

    fn release_device(&self, device_id: &str, reservation_id: u32) {
        let held_by = self.devices.get(device_id).map(|d| d.active_reservation_id);
        match held_by {
            Some(id) if id == reservation_id => {
                if let Err(e) =
                    self.devices
                        .update_status(device_id, DeviceStatus::Available, None)
                {
                    warn!("expiry of #{reservation_id} could not release {device_id}: {e}");
                }
            },
            Some(_) => warn!(
                "device {device_id} no longer held by reservation #{reservation_id}; not released"
            ),
            None => warn!("device {device_id} disappeared before release"),
        }
    }

    pub fn get(&self, id: u32) -> Option<Reservation> {
        self.lock().get(&id).cloned()
    }

    /// The approved reservation currently covering a device, if any.
    pub fn active_for_device(&self, device_id: &str) -> Option<Reservation> {
        self.lock()
            .values()
            .find(|r| r.status == ReservationStatus::Approved && r.device_id == device_id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}
