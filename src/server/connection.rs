// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-connection handler task.
//!
//! Each accepted connection gets one task running the receive loop: read a
//! frame, enqueue it into the connection's priority queues, then drain and
//! dispatch in priority order. A separate writer task serializes all
//! outbound frames (direct replies and broadcasts) through one channel, so
//! a client always sees its own messages in FIFO order per priority.
//!
//! Disconnect (clean EOF, I/O error, framing violation, or shutdown) ends
//! the loop, closes the session if one was open, and deregisters the peer
//! from the broadcaster.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    metrics::PERF,
    proto::{
        codec,
        frame::Frame,
        messages::{
            CancelOk, ClientRequest, ErrorReply, FleetStatus, IntoFrame, LoginOk, LogoutOk, Pong,
            Reply, ReserveOk, TimeSyncOk,
        },
    },
    server::{queue::PriorityQueues, state::AppState},
    utils::{unix_now, unix_now_millis},
};

/// Outbound frames queued per connection before a slow consumer starts
/// losing broadcasts.
const OUTBOUND_QUEUE: usize = 64;

/// Drive one established (already TLS-wrapped) connection to completion.
pub async fn serve<S>(stream: S, peer_addr: SocketAddr, state: Arc<AppState>, cancel: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io_timeout = state.config.io_timeout();
    let (mut rd, mut wr) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Frame>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = codec::write_frame(&mut wr, &frame, io_timeout).await {
                debug!("write of {} failed, writer stopping: {e:#}", frame.kind);
                break;
            }
        }
        let _ = wr.shutdown().await;
    });

    let peer_id = state.broadcaster.register(tx.clone());
    debug!("connection from {peer_addr} registered as peer {peer_id}");

    let mut handler = ConnectionHandler {
        peer_id,
        peer_addr,
        username: None,
        queues: PriorityQueues::new(),
        state: state.clone(),
        outbound: tx,
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("connection {peer_addr} closing on shutdown");
                break;
            },
            res = codec::read_frame(&mut rd, io_timeout) => match res {
                Ok(Some(frame)) => {
                    handler.queues.push(frame);
                    if handler.drain().await.is_err() {
                        break;
                    }
                },
                Ok(None) => {
                    debug!("connection {peer_addr} closed by peer");
                    break;
                },
                Err(e) => {
                    warn!("connection {peer_addr} dropped: {e:#}");
                    break;
                },
            }
        }
    }

    handler.finish();
    state.broadcaster.deregister(peer_id);
    drop(handler);
    let _ = writer.await;
}

struct ConnectionHandler {
    peer_id: u64,
    peer_addr: SocketAddr,
    username: Option<String>,
    queues: PriorityQueues,
    state: Arc<AppState>,
    outbound: mpsc::Sender<Frame>,
}

impl ConnectionHandler {
    /// Dispatch everything queued, highest priority first.
    async fn drain(&mut self) -> Result<(), ()> {
        while let Some(frame) = self.queues.pop() {
            self.dispatch(frame).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), ()> {
        let kind = frame.kind;
        let started = Instant::now();

        let reply = match ClientRequest::parse(&frame) {
            Ok(request) => self.handle(request),
            Err(e) => Some(Reply::from(ErrorReply(e))),
        };

        let ok = !matches!(reply, Some(Reply::ErrorReply(_)));
        PERF.record(kind, started.elapsed(), ok);

        if let Some(reply) = reply {
            // Backpressure on our own replies; the send only fails when the
            // writer is gone, which retires this handler too.
            self.outbound
                .send(reply.into_frame())
                .await
                .map_err(|_| ())?;
        }
        Ok(())
    }

    /// Business dispatch. Synchronous on purpose: component locks are never
    /// held across an await point.
    fn handle(&mut self, request: ClientRequest) -> Option<Reply> {
        let authed = self.ensure_session();
        match request {
            ClientRequest::Login(args) => Some(self.login(args.username, args.password)),

            // Liveness works before login.
            ClientRequest::Ping(args) => Some(Pong { args: args.args }.into()),
            ClientRequest::PingAck => {
                self.touch();
                None
            },

            _ if !authed => Some(ErrorReply(ServiceError::PermissionDenied).into()),

            ClientRequest::Logout => Some(self.logout()),
            ClientRequest::Status => {
                self.touch();
                Some(FleetStatus::response(self.state.devices.snapshot()).into())
            },
            ClientRequest::Reserve(args) => {
                self.touch();
                Some(self.reserve(args.device_id, args.duration_secs, args.reason))
            },
            ClientRequest::Cancel(args) => {
                self.touch();
                Some(self.cancel(args.device_id))
            },
            ClientRequest::TimeSync(args) => {
                self.touch();
                Some(
                    TimeSyncOk {
                        client_t1: args.client_t1,
                        server_t3: unix_now_millis(),
                    }
                    .into(),
                )
            },
        }
    }

    fn login(&mut self, username: String, password: String) -> Reply {
        if let Some(current) = &self.username {
            return ErrorReply(ServiceError::SessionAlreadyExists(current.clone())).into();
        }
        if !self.state.credentials.verify(&username, &password) {
            info!("failed login as {username} from {}", self.peer_addr);
            return ErrorReply(ServiceError::AuthenticationFailed).into();
        }
        match self.state.sessions.open(&username, self.peer_addr) {
            Ok(_) => {
                info!("{username} logged in from {}", self.peer_addr);
                self.state.set_status_line(format!("{username} logged in"));
                self.state
                    .broadcaster
                    .set_username(self.peer_id, Some(username.clone()));
                self.username = Some(username.clone());
                LoginOk { username }.into()
            },
            Err(e) => ErrorReply(e).into(),
        }
    }

    fn logout(&mut self) -> Reply {
        if let Some(username) = self.username.take() {
            self.state.sessions.close(&username);
            self.state.broadcaster.set_username(self.peer_id, None);
            info!("{username} logged out");
        }
        LogoutOk.into()
    }

    fn reserve(&mut self, device_id: String, duration_secs: i64, reason: Option<String>) -> Reply {
        let username = self.username.as_deref().unwrap_or_default();
        match self.state.reservations.create(
            &device_id,
            username,
            duration_secs,
            reason,
            unix_now(),
        ) {
            Ok(r) => {
                info!(
                    "{username} reserved {device_id} for {duration_secs}s (#{})",
                    r.id
                );
                self.state
                    .set_status_line(format!("{device_id} reserved by {username}"));
                self.state.broadcaster.broadcast_status(&self.state.devices);
                ReserveOk {
                    device_id,
                    end_time: r.end_time,
                }
                .into()
            },
            Err(e) => {
                debug!("reserve of {device_id} by {username} rejected: {e}");
                ErrorReply(e).into()
            },
        }
    }

    fn cancel(&mut self, device_id: String) -> Reply {
        let username = self.username.as_deref().unwrap_or_default();
        match self
            .state
            .reservations
            .cancel_for_device(&device_id, username)
        {
            Ok(id) => {
                info!("{username} cancelled reservation #{id} on {device_id}");
                self.state
                    .set_status_line(format!("{device_id} released by {username}"));
                self.state.broadcaster.broadcast_status(&self.state.devices);
                CancelOk { device_id }.into()
            },
            Err(e) => {
                debug!("cancel of {device_id} by {username} rejected: {e}");
                ErrorReply(e).into()
            },
        }
    }

    fn touch(&self) {
        if let Some(u) = &self.username {
            self.state.sessions.touch(u);
        }
    }

    /// A login is only as good as its session: the idle sweep may have
    /// evicted it, in which case the connection drops back to pre-login.
    fn ensure_session(&mut self) -> bool {
        let Some(username) = self.username.clone() else {
            return false;
        };
        if self.state.sessions.is_active(&username) {
            return true;
        }
        info!("session of {username} expired; connection back to pre-login");
        self.state.broadcaster.set_username(self.peer_id, None);
        self.username = None;
        false
    }

    /// Connection teardown: a live session dies with its connection.
    fn finish(&mut self) {
        if let Some(username) = self.username.take() {
            self.state.sessions.close(&username);
            info!("session of {username} closed on disconnect");
        }
    }
}
