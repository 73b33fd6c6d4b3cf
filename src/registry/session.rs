// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session registry: at most one active session per username.
//!
//! The registry only holds `ACTIVE` sessions; a session leaves the map when
//! it ends (logout, disconnect) or when the idle sweep expires it, with the
//! terminal state stamped on the returned record.

use std::net::SocketAddr;

use crate::{
    error::ServiceError,
    registry::index::IndexedMap,
    utils::{session_token, unix_now},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Ended,
}

#[derive(Debug, Clone)]
pub struct ServerSession {
    pub username: String,
    pub peer_addr: SocketAddr,
    pub token: u64,
    pub state: SessionState,
    pub created_at: u64,
    pub last_activity: u64,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: IndexedMap<ServerSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: IndexedMap::new(),
        }
    }

    /// Open a session, refusing a second concurrent login for the same
    /// username.
    pub fn open(&self, username: &str, peer_addr: SocketAddr) -> Result<ServerSession, ServiceError> {
        let now = unix_now();
        let session = ServerSession {
            username: username.to_string(),
            peer_addr,
            token: session_token(),
            state: SessionState::Active,
            created_at: now,
            last_activity: now,
        };
        self.sessions
            .try_insert(username, session.clone())
            .map_err(|_| ServiceError::SessionAlreadyExists(username.to_string()))?;
        Ok(session)
    }

    /// End a session; returns the record (stamped `ENDED`) when one
    /// existed.
    pub fn close(&self, username: &str) -> Option<ServerSession> {
        self.sessions.remove(username).map(|mut s| {
            s.state = SessionState::Ended;
            s
        })
    }

    /// Refresh the activity stamp after a dispatched request.
    pub fn touch(&self, username: &str) {
        let now = unix_now();
        self.sessions.update(username, |s| s.last_activity = now);
    }

    pub fn is_active(&self, username: &str) -> bool {
        self.sessions.contains(username)
    }

    pub fn get(&self, username: &str) -> Option<ServerSession> {
        self.sessions.get(username)
    }

    /// Current session population, surfaced to the UI collaborator.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Evict sessions idle past the timeout; returns the evicted usernames.
    pub fn expire_idle(&self, now: u64, timeout_secs: u64) -> Vec<String> {
        let mut evicted = Vec::new();
        self.sessions.retain(|name, s| {
            if now.saturating_sub(s.last_activity) > timeout_secs {
                s.state = SessionState::Expired;
                evicted.push(name.clone());
                false
            } else {
                true
            }
        });
        evicted
    }
}
