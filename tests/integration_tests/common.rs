//! Shared harness: a real server on an ephemeral port behind a self-signed
//! certificate, and a minimal protocol client.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use devlease_rs::{
    cfg::config::Config,
    proto::{
        codec::{read_frame, write_frame},
        frame::Frame,
        kind::MessageKind,
        messages::FleetStatus,
    },
    registry::{credentials::CredentialStore, device::DeviceView},
    sched::expiry,
    server::{acceptor, state::AppState, tls},
};
use rustls::{
    DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
};
use tokio::{
    io::{ReadHalf, WriteHalf},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

const IO: Duration = Duration::from_secs(5);
const RECV_DEADLINE: Duration = Duration::from_secs(5);

fn test_config() -> Result<Config> {
    let yaml = r#"
server:
  bind_addr: "127.0.0.1"
  tls:
    cert_pem: in-memory.crt
    key_pem: in-memory.key
  users_file: in-memory
  io_timeout_secs: 5
  session_timeout_secs: 3600
  max_reservations: 64
devices:
  - { id: DEV001, name: "Office Laser Printer", kind: printer }
  - { id: DEV002, name: "Flatbed Scanner", kind: scanner }
  - { id: DEV003, name: "Conference Projector", kind: projector, maintenance: true }
"#;
    let cfg: Config = serde_yaml::from_str(yaml)?;
    cfg.validate()?;
    Ok(cfg)
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    cancel: CancellationToken,
}

impl TestServer {
    /// Boot a full server: TLS acceptor, scheduler tick task, seeded fleet,
    /// users `u1`/`u2` with passwords `pw1`/`pw2`.
    pub async fn spawn() -> Result<TestServer> {
        tls::install_crypto_provider();

        let credentials = CredentialStore::from_lines("u1:pw1\nu2:pw2\n");
        let state = AppState::build(test_config()?, credentials)?;

        let ck = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        let cert = ck.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(ck.key_pair.serialize_der().into());
        let server_cfg = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        tokio::spawn(expiry::run(state.clone(), cancel.clone()));
        tokio::spawn(acceptor::run(
            listener,
            tls::acceptor_from(Arc::new(server_cfg)),
            state.clone(),
            cancel.clone(),
        ));

        Ok(TestServer {
            addr,
            state,
            cancel,
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Accepts whatever certificate the server presents; the server does not
/// verify peers either.
#[derive(Debug)]
struct AcceptAnyCert(rustls::crypto::CryptoProvider);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

type ClientStream = tokio_rustls::client::TlsStream<TcpStream>;

pub struct TestClient {
    rd: ReadHalf<ClientStream>,
    wr: WriteHalf<ClientStream>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<TestClient> {
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(
                rustls::crypto::ring::default_provider(),
            )))
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect(addr).await?;
        let domain = ServerName::try_from("localhost".to_string())?;
        let stream = connector.connect(domain, tcp).await?;
        let (rd, wr) = tokio::io::split(stream);
        Ok(TestClient { rd, wr })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.wr, frame, IO).await
    }

    /// Next frame, bounded; the connection closing counts as a failure.
    pub async fn recv(&mut self) -> Result<Frame> {
        match timeout(RECV_DEADLINE, read_frame(&mut self.rd, IO)).await {
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => bail!("connection closed by server"),
            Ok(Err(e)) => Err(e),
            Err(_) => bail!("no frame within {RECV_DEADLINE:?}"),
        }
    }

    /// Next frame, asserting its kind.
    pub async fn recv_kind(&mut self, kind: MessageKind) -> Result<Frame> {
        let frame = self.recv().await?;
        if frame.kind != kind {
            bail!("expected {kind}, got {} ({frame:?})", frame.kind);
        }
        Ok(frame)
    }

    /// Skip frames of other kinds (e.g. broadcasts interleaved with a
    /// direct response) until the wanted kind arrives.
    pub async fn recv_until(&mut self, kind: MessageKind, deadline: Duration) -> Result<Frame> {
        let step = async {
            loop {
                let frame = self.recv().await?;
                if frame.kind == kind {
                    return Ok::<Frame, anyhow::Error>(frame);
                }
            }
        };
        timeout(deadline, step)
            .await
            .with_context(|| format!("no {kind} within {deadline:?}"))?
    }

    /// Assert that nothing arrives for a while.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match timeout(window, read_frame(&mut self.rd, IO)).await {
            Err(_) => Ok(()),
            Ok(Ok(Some(frame))) => bail!("unexpected frame: {frame:?}"),
            Ok(Ok(None)) => bail!("connection closed"),
            Ok(Err(e)) => Err(e),
        }
    }

    pub async fn expect_error(&mut self, code: u32) -> Result<Frame> {
        let frame = self.recv_kind(MessageKind::Error).await?;
        if frame.error_code != Some(code) {
            bail!("expected error {code}, got {:?}", frame.error_code);
        }
        Ok(frame)
    }

    pub async fn login(&mut self, user: &str, pass: &str) -> Result<Frame> {
        self.send(&Frame::new(MessageKind::Login).with_args([user, pass]))
            .await?;
        self.recv().await
    }

    pub async fn login_ok(&mut self, user: &str, pass: &str) -> Result<()> {
        let frame = self.login(user, pass).await?;
        if frame.kind != MessageKind::Login || frame.arg(0) != Some("success") {
            bail!("login failed: {frame:?}");
        }
        Ok(())
    }

    pub async fn send_reserve(&mut self, device: &str, duration: &str) -> Result<()> {
        self.send(&Frame::new(MessageKind::ReserveRequest).with_args([device, duration]))
            .await
    }

    pub async fn send_cancel(&mut self, device: &str) -> Result<()> {
        self.send(&Frame::new(MessageKind::CancelRequest).with_args([device]))
            .await
    }

    pub async fn send_status_request(&mut self) -> Result<()> {
        self.send(&Frame::new(MessageKind::StatusRequest)).await
    }
}

/// Pull one device out of a status payload.
pub fn device_in(frame: &Frame, id: &str) -> Result<DeviceView> {
    FleetStatus::parse(frame)?
        .into_iter()
        .find(|d| d.id == id)
        .with_context(|| format!("device {id} missing from status payload"))
}
