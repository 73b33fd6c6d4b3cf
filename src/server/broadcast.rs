// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fleet-state fan-out.
//!
//! Every connection registers its outbound channel here; any write that
//! changes fleet-visible state snapshots the device registry once and
//! enqueues the same `STATUS_UPDATE` to every logged-in peer. A peer whose
//! channel is gone or full is skipped; its own I/O failure retires its
//! handler independently, the broadcast never aborts.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    proto::{
        frame::Frame,
        messages::{FleetStatus, IntoFrame},
    },
    registry::device::DeviceRegistry,
};

#[derive(Debug)]
struct Peer {
    tx: mpsc::Sender<Frame>,
    username: Option<String>,
}

#[derive(Debug)]
pub struct Broadcaster {
    peers: DashMap<u64, Peer>,
    next_id: AtomicU64,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, tx: mpsc::Sender<Frame>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers.insert(id, Peer { tx, username: None });
        id
    }

    /// Record the login state of a peer; only logged-in peers receive
    /// broadcasts.
    pub fn set_username(&self, peer_id: u64, username: Option<String>) {
        if let Some(mut p) = self.peers.get_mut(&peer_id) {
            p.username = username;
        }
    }

    pub fn deregister(&self, peer_id: u64) {
        self.peers.remove(&peer_id);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Snapshot the fleet once and push it to every logged-in connection.
    pub fn broadcast_status(&self, devices: &DeviceRegistry) {
        let frame = FleetStatus::update(devices.snapshot()).into_frame();
        for peer in self.peers.iter() {
            if peer.username.is_none() {
                continue;
            }
            if let Err(e) = peer.tx.try_send(frame.clone()) {
                warn!("broadcast to peer {} skipped: {e}", peer.key());
            }
        }
    }
}
