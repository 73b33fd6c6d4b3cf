// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared server state.
//!
//! All managers are owned here and passed around as one `Arc`; there are no
//! process-wide mutable singletons. The scheduler and every connection
//! handler capture the same instance at spawn time.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::{
    cfg::config::Config,
    registry::{
        credentials::CredentialStore,
        device::{Device, DeviceRegistry, DeviceStatus},
        reservation::ReservationStore,
        session::SessionRegistry,
    },
    sched::wheel::TimeWheel,
    server::broadcast::Broadcaster,
};

pub struct AppState {
    pub config: Config,
    pub devices: Arc<DeviceRegistry>,
    pub reservations: Arc<ReservationStore>,
    pub sessions: Arc<SessionRegistry>,
    pub credentials: Arc<CredentialStore>,
    pub wheel: Arc<TimeWheel>,
    pub broadcaster: Arc<Broadcaster>,
    /// Latest human-readable outcome, consumed by the UI collaborator.
    status_line: Mutex<String>,
}

impl AppState {
    /// Wire the managers together and seed the device fleet from config.
    pub fn build(config: Config, credentials: CredentialStore) -> Result<Arc<Self>> {
        let devices = Arc::new(DeviceRegistry::new());
        for seed in &config.devices {
            devices.add(Device::new(&seed.id, &seed.name, seed.kind))?;
            if seed.maintenance {
                devices.update_status(&seed.id, DeviceStatus::Maintenance, None)?;
            }
        }

        let wheel = Arc::new(TimeWheel::new());
        let reservations = Arc::new(ReservationStore::new(
            config.server.max_reservations,
            devices.clone(),
            wheel.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            devices,
            reservations,
            sessions: Arc::new(SessionRegistry::new()),
            credentials: Arc::new(credentials),
            wheel,
            broadcaster: Arc::new(Broadcaster::new()),
            status_line: Mutex::new(String::new()),
        }))
    }

    pub fn set_status_line(&self, line: impl Into<String>) {
        *self
            .status_line
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = line.into();
    }

    pub fn status_line(&self) -> String {
        self.status_line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
