// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Listener loop.
//!
//! Accepts TCP connections, performs the TLS handshake off the accept path,
//! and spawns one handler task per connection. Shutdown is cooperative: the
//! signal task cancels the token, the select below observes it after the
//! current accept completes, and every handler exits on the same token.

use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, time::timeout};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::server::{connection, state::AppState};

pub async fn run(
    listener: TcpListener,
    tls: TlsAcceptor,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    },
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("could not set TCP_NODELAY for {peer_addr}: {e}");
                }

                let tls = tls.clone();
                let state = state.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    match timeout(state.config.io_timeout(), tls.accept(stream)).await {
                        Ok(Ok(tls_stream)) => {
                            connection::serve(tls_stream, peer_addr, state, cancel).await;
                        },
                        Ok(Err(e)) => warn!("TLS handshake with {peer_addr} failed: {e}"),
                        Err(_) => warn!("TLS handshake with {peer_addr} timed out"),
                    }
                });
            }
        }
    }

    info!("acceptor stopped");
    Ok(())
}
