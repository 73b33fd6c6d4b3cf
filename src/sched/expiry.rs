// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Scheduler tick task.
//!
//! Fires once a second: advances the wheel, detaches the arrived bucket,
//! and visits the store per entry with no two component locks held at
//! once. A single broadcast goes out per tick when anything in the fleet
//! changed. The tick also runs the idle-session sweep.

use std::{sync::Arc, time::Duration};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    registry::{
        reservation::{ExpiryVisit, ReservationStore},
        session::SessionRegistry,
    },
    sched::wheel::{TimeWheel, WheelEntry},
    server::state::AppState,
    utils::unix_now,
};

/// One tick over bare components; returns whether fleet-visible state
/// changed. Factored out of [`run`] so tests can drive ticks directly.
pub fn tick_components(
    wheel: &TimeWheel,
    store: &ReservationStore,
    sessions: &SessionRegistry,
    session_timeout_secs: u64,
    now: u64,
) -> bool {
    let mut bucket = wheel.advance();
    let mut dirty = false;

    // LIFO drain; policy only depends on each reservation's own state.
    while let Some(entry) = bucket.pop() {
        match store.expire_visit(&entry, now) {
            ExpiryVisit::Gone => {},
            ExpiryVisit::Requeue { cycle } => wheel.reinsert_current(WheelEntry { cycle, ..entry }),
            ExpiryVisit::RequeueNear => wheel.reinsert_next(entry),
            ExpiryVisit::PurgedCancelled => {
                debug!("purged cancelled reservation #{}", entry.reservation_id);
                dirty = true;
            },
            ExpiryVisit::Completed { device_id } => {
                info!(
                    "reservation #{} expired, {device_id} released",
                    entry.reservation_id
                );
                dirty = true;
            },
        }
    }

    for username in sessions.expire_idle(now, session_timeout_secs) {
        info!("session of {username} expired after {session_timeout_secs}s idle");
    }

    dirty
}

/// Tick loop. Exits when the shutdown token fires.
pub async fn run(state: Arc<AppState>, cancel: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let dirty = tick_components(
                    &state.wheel,
                    &state.reservations,
                    &state.sessions,
                    state.config.server.session_timeout_secs,
                    unix_now(),
                );
                if dirty {
                    state.broadcaster.broadcast_status(&state.devices);
                }
            }
        }
    }
    debug!("scheduler tick task stopped");
}
