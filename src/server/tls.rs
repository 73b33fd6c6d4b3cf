// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TLS server endpoint construction.
//!
//! The server presents a certificate and key loaded from PEM files at
//! startup; peers are not verified. TLS 1.2 and 1.3 are both accepted.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use anyhow::{Context, Result, ensure};
use tokio_rustls::TlsAcceptor;

/// Install the process-wide rustls crypto provider. Safe to call more than
/// once; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Build the acceptor from PEM cert/key files.
pub fn load_acceptor(cert_pem: &Path, key_pem: &Path) -> Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert_pem).with_context(|| format!("open certificate {cert_pem:?}"))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .with_context(|| format!("parse certificate {cert_pem:?}"))?;
    ensure!(!certs.is_empty(), "no certificates found in {cert_pem:?}");

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_pem).with_context(|| format!("open private key {key_pem:?}"))?,
    ))
    .with_context(|| format!("parse private key {key_pem:?}"))?
    .with_context(|| format!("no private key found in {key_pem:?}"))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build TLS server config")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Acceptor from an already-built rustls config (integration tests hand in
/// an in-memory self-signed certificate).
pub fn acceptor_from(config: Arc<rustls::ServerConfig>) -> TlsAcceptor {
    TlsAcceptor::from(config)
}
