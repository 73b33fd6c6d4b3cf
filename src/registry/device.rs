// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Device fleet registry.
//!
//! Owns every device record for the lifetime of the process. A `RESERVED`
//! device always carries the id, end time and holder of its active
//! reservation (`active_reservation_id == 0` means none); the projection is
//! maintained by the reservation store's mutations so snapshots never touch
//! the store.

use serde::Serialize;

use crate::{cfg::enums::DeviceKind, error::ServiceError, registry::index::IndexedMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Available,
    Reserved,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "available" => Self::Available,
            "reserved" => Self::Reserved,
            "maintenance" => Self::Maintenance,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub status: DeviceStatus,
    pub active_reservation_id: u32,
    pub reserved_until: u64,
    pub reserved_by: String,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            status: DeviceStatus::Available,
            active_reservation_id: 0,
            reserved_until: 0,
            reserved_by: String::new(),
        }
    }
}

/// Reservation projection applied together with a `RESERVED` transition.
#[derive(Debug, Clone)]
pub struct ActiveLease {
    pub reservation_id: u32,
    pub end_time: u64,
    pub username: String,
}

/// Owned view of one device, as serialized into status payloads and handed
/// to the UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub status: DeviceStatus,
    pub reserved_by: String,
    pub reserved_until: u64,
}

impl DeviceView {
    pub fn wire_tuple(&self) -> [String; 6] {
        [
            self.id.clone(),
            self.name.clone(),
            self.kind.to_string(),
            self.status.as_wire().to_string(),
            self.reserved_by.clone(),
            self.reserved_until.to_string(),
        ]
    }

    pub fn from_wire_tuple(args: &[String]) -> Result<Self, ServiceError> {
        let bad = |what: &str| ServiceError::InvalidParameter(format!("bad status tuple: {what}"));
        if args.len() != 6 {
            return Err(bad("length"));
        }
        Ok(Self {
            id: args[0].clone(),
            name: args[1].clone(),
            kind: args[2].parse().map_err(|_| bad("kind"))?,
            status: DeviceStatus::from_wire(&args[3]).ok_or_else(|| bad("status"))?,
            reserved_by: args[4].clone(),
            reserved_until: args[5].parse().map_err(|_| bad("end time"))?,
        })
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexedMap<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: IndexedMap::new(),
        }
    }

    pub fn add(&self, device: Device) -> Result<(), ServiceError> {
        let id = device.id.clone();
        self.devices
            .try_insert(id.clone(), device)
            .map_err(|_| ServiceError::InvalidParameter(format!("duplicate device id {id}")))
    }

    /// Removal is forbidden while a reservation holds the device.
    pub fn remove(&self, id: &str) -> Result<(), ServiceError> {
        match self.devices.get(id) {
            None => Err(ServiceError::ResourceNotFound(id.to_string())),
            Some(d) if d.status == DeviceStatus::Reserved => Err(ServiceError::ResourceInUse {
                device_id: id.to_string(),
                holder: d.reserved_by,
            }),
            Some(_) => {
                self.devices.remove(id);
                Ok(())
            },
        }
    }

    /// Transition a device and keep the reservation projection consistent:
    /// `RESERVED` requires a lease with a non-zero reservation id, any other
    /// status clears the projection.
    pub fn update_status(
        &self,
        id: &str,
        status: DeviceStatus,
        lease: Option<ActiveLease>,
    ) -> Result<(), ServiceError> {
        let lease = match (status, lease) {
            (DeviceStatus::Reserved, Some(l)) if l.reservation_id != 0 => Some(l),
            (DeviceStatus::Reserved, _) => {
                return Err(ServiceError::Internal(format!(
                    "RESERVED transition for {id} without a reservation"
                )));
            },
            (_, _) => None,
        };
        self.devices
            .update(id, |d| match lease {
                Some(l) => {
                    d.status = DeviceStatus::Reserved;
                    d.active_reservation_id = l.reservation_id;
                    d.reserved_until = l.end_time;
                    d.reserved_by = l.username;
                },
                None => {
                    d.status = status;
                    d.active_reservation_id = 0;
                    d.reserved_until = 0;
                    d.reserved_by = String::new();
                },
            })
            .ok_or_else(|| ServiceError::ResourceNotFound(id.to_string()))
    }

    pub fn is_available(&self, id: &str) -> bool {
        self.devices
            .get(id)
            .is_some_and(|d| d.status == DeviceStatus::Available)
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.get(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Fleet snapshot, ordered by device id so payloads are deterministic.
    pub fn snapshot(&self) -> Vec<DeviceView> {
        let mut views = Vec::with_capacity(self.devices.len());
        self.devices.for_each(|_, d| {
            views.push(DeviceView {
                id: d.id.clone(),
                name: d.name.clone(),
                kind: d.kind,
                status: d.status,
                reserved_by: d.reserved_by.clone(),
                reserved_until: d.reserved_until,
            });
        });
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }
}
