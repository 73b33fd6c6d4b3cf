// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::DeviceKind;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Transport, limits and file locations of the serving process.
    pub server: ServerSection,
    /// The device fleet seeded at startup. Devices are never created or
    /// destroyed during a run.
    pub devices: Vec<DeviceSeed>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerSection {
    /// Listen address; the port comes from the command line.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server certificate and private key, PEM encoded.
    pub tls: TlsSection,

    /// Credential file, one `username:password` per line.
    pub users_file: String,

    /// Per-frame I/O deadline on established connections.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Sessions idle longer than this are evicted by the scheduler sweep.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Upper bound on tracked reservations, terminal states included.
    #[serde(default = "default_max_reservations")]
    pub max_reservations: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TlsSection {
    pub cert_pem: String,
    pub key_pem: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceSeed {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    /// Seed the device unavailable for reservations.
    #[serde(default)]
    pub maintenance: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_io_timeout() -> u64 {
    30
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_max_reservations() -> usize {
    crate::registry::reservation::MAX_RESERVATIONS
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.server.bind_addr.is_empty(), "bind_addr must not be empty");
        ensure!(
            !self.server.tls.cert_pem.is_empty() && !self.server.tls.key_pem.is_empty(),
            "tls.cert_pem and tls.key_pem are required"
        );
        ensure!(!self.server.users_file.is_empty(), "users_file is required");
        ensure!(self.server.io_timeout_secs >= 1, "io_timeout_secs must be >= 1");
        ensure!(
            self.server.session_timeout_secs >= 1,
            "session_timeout_secs must be >= 1"
        );
        ensure!(
            self.server.max_reservations >= 1,
            "max_reservations must be >= 1"
        );
        ensure!(!self.devices.is_empty(), "at least one device must be seeded");

        let mut seen = HashSet::new();
        for d in &self.devices {
            ensure!(!d.id.is_empty(), "device id must not be empty");
            ensure!(!d.name.is_empty(), "device {} needs a name", d.id);
            ensure!(seen.insert(d.id.as_str()), "duplicate device id {}", d.id);
        }
        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.server.io_timeout_secs)
    }
}
