//! Connection handling and management
//!
//! A [`Connection`] owns the socket from TCP connect through registration.
//! Once registered it is turned into a [`Session`]: a reader task that
//! answers keep-alive probes on its own and forwards every other event, and
//! a writer task that serializes outbound lines. The two tasks share a
//! cancellation token; when either one stops, the session's event channel
//! closes and the owner treats the link as lost.

use crate::config::{Config, IdentityConfig, ServerConfig};
use crate::event::Event;
use crate::message::Message;
use crate::utils::string::{split_message, truncate_bytes};
use crate::{Error, Identity, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Longest line body the wire allows, excluding CRLF
pub const MAX_LINE_BYTES: usize = 510;

/// Longest inbound line kept; anything past it is dropped up to the next newline
pub const READ_LIMIT: usize = 8191;

const EVENT_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 256;
const NICK_RETRIES: usize = 3;

/// Trait for connection streams (TCP or TLS)
pub trait ConnectionStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ConnectionStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

type BoxedStream = Box<dyn ConnectionStream>;

/// Replace framing characters and cut the line to the wire limit
pub fn frame_line(line: &str) -> String {
    let clean: String = line
        .chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\0') { ' ' } else { c })
        .collect();
    let mut framed = truncate_bytes(&clean, MAX_LINE_BYTES).to_string();
    framed.push_str("\r\n");
    framed
}

async fn write_framed<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    let framed = frame_line(line);
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    trace!("-> {}", framed.trim_end());
    Ok(())
}

/// Line reader that survives being cancelled mid-line
struct LineReader {
    inner: BufReader<ReadHalf<BoxedStream>>,
    pending: Vec<u8>,
    discarding: bool,
}

impl LineReader {
    fn new(inner: ReadHalf<BoxedStream>) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
            discarding: false,
        }
    }

    fn take_line(&mut self) -> Vec<u8> {
        let mut line = std::mem::take(&mut self.pending);
        while matches!(line.last(), Some(b'\r' | b'\n')) {
            line.pop();
        }
        line
    }

    async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let limit = READ_LIMIT.saturating_sub(self.pending.len()) as u64;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.pending)
                .await?;
            let complete = self.pending.last() == Some(&b'\n');

            if n == 0 && !complete {
                if self.pending.is_empty() || self.discarding {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            if complete {
                if self.discarding {
                    self.discarding = false;
                    self.pending.clear();
                    continue;
                }
                return Ok(Some(self.take_line()));
            }

            if self.discarding {
                self.pending.clear();
                continue;
            }

            warn!("Inbound line exceeds {} bytes, truncating", READ_LIMIT);
            self.discarding = true;
            return Ok(Some(self.take_line()));
        }
    }
}

/// Connection to an IRC server, before it is split into a session
pub struct Connection {
    reader: LineReader,
    writer: WriteHalf<BoxedStream>,
    peer: String,
}

impl Connection {
    /// Open a TCP connection, upgrading to TLS when configured
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        info!("Connecting to {} (tls: {})...", addr, config.tls);

        let tcp = timeout(config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Connection(format!("Timed out connecting to {}", addr)))??;
        tcp.set_nodelay(true)?;

        let stream: BoxedStream = if config.tls {
            let connector = TlsConnector::from(Arc::new(tls_client_config(config.tls_verify)));
            let server_name = ServerName::try_from(config.host.clone())
                .map_err(|e| Error::Config(format!("Invalid TLS server name {}: {}", config.host, e)))?;

            let tls = timeout(config.connect_timeout(), connector.connect(server_name, tcp))
                .await
                .map_err(|_| Error::Connection(format!("TLS handshake with {} timed out", addr)))?
                .map_err(|e| Error::Connection(format!("TLS handshake with {} failed: {}", addr, e)))?;
            debug!("TLS handshake with {} complete", addr);
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        Ok(Self::from_stream(stream, addr))
    }

    /// Wrap an already established stream
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: ConnectionStream + 'static,
    {
        let boxed: BoxedStream = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);
        Self {
            reader: LineReader::new(read_half),
            writer: write_half,
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read one line without its CR/LF. `None` means the peer closed the stream.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_line().await
    }

    /// Write one line, sanitized and truncated to the wire limit
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        write_framed(&mut self.writer, line).await
    }

    /// Perform the registration handshake and join `channels`.
    ///
    /// Returns the nickname the server accepted.
    pub async fn register(
        &mut self,
        identity: &IdentityConfig,
        password: Option<&str>,
        channels: &[String],
        limit: Duration,
    ) -> Result<String> {
        if let Some(password) = password {
            self.send_line(&Message::pass(password).to_string()).await?;
        }

        let mut nick = identity.nickname.clone();
        self.send_line(&Message::nick(&nick).to_string()).await?;
        self.send_line(&Message::user(&identity.username, &identity.realname).to_string())
            .await?;

        let deadline = Instant::now() + limit;
        let mut nick_retries = 0;

        let accepted = loop {
            let line = timeout_at(deadline, self.read_line())
                .await
                .map_err(|_| Error::Registration("Timed out waiting for welcome".to_string()))??
                .ok_or_else(|| Error::ConnectionLost("Server closed the connection during registration".to_string()))?;

            match Event::parse(&line) {
                Event::Ping { token } => self.send_line(&Message::pong(&token).to_string()).await?,
                Event::Welcome { nick } => break nick,
                Event::Error { code, .. } if code == "433" || code == "437" => {
                    nick_retries += 1;
                    if nick_retries > NICK_RETRIES {
                        return Err(Error::Registration(format!("Nickname {} unavailable", identity.nickname)));
                    }
                    nick.push('_');
                    info!("Nickname in use, trying {}", nick);
                    self.send_line(&Message::nick(&nick).to_string()).await?;
                }
                Event::Error { code, detail } if code == "ERROR" || code == "432" || code == "464" => {
                    return Err(Error::Registration(format!("{} {}", code, detail)));
                }
                other => trace!("Ignoring during registration: {:?}", other),
            }
        };

        info!("Registered with {} as {}", self.peer, accepted);

        for channel in channels {
            self.send_line(&Message::join(channel).to_string()).await?;
            debug!("Joining {}", channel);
        }

        Ok(accepted)
    }

    /// Split into reader and writer tasks
    pub fn into_session(self, options: SessionOptions) -> Session {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (priority_tx, priority_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (normal_tx, normal_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let cancel = CancellationToken::new();

        let reader = tokio::spawn(run_reader(
            self.reader,
            event_tx,
            priority_tx,
            options.idle_timeout,
            cancel.clone(),
        ));
        let writer = tokio::spawn(run_writer(
            self.writer,
            priority_rx,
            normal_rx,
            options.message_delay,
            cancel.clone(),
        ));

        Session {
            events: event_rx,
            outbound: Outbound {
                sender: normal_tx,
                max_message_length: options.max_message_length,
            },
            cancel,
            tasks: vec![reader, writer],
        }
    }
}

async fn run_reader(
    mut reader: LineReader,
    events: mpsc::Sender<Event>,
    priority: mpsc::Sender<String>,
    idle: Duration,
    cancel: CancellationToken,
) {
    let mut probed = false;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = timeout(idle, reader.read_line()) => read,
        };

        let line = match read {
            Err(_) if probed => {
                warn!("No reply to keep-alive probe, dropping connection");
                break;
            }
            Err(_) => {
                debug!("Link idle for {:?}, probing server", idle);
                probed = true;
                if priority.send(Message::ping("keepalive").to_string()).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(Err(e)) => {
                warn!("Read error: {}", e);
                break;
            }
            Ok(Ok(None)) => {
                info!("Server closed the connection");
                break;
            }
            Ok(Ok(Some(line))) => line,
        };

        probed = false;
        if line.is_empty() {
            continue;
        }
        trace!("<- {}", String::from_utf8_lossy(&line));

        match Event::parse(&line) {
            Event::Ping { token } => {
                if priority.send(Message::pong(&token).to_string()).await.is_err() {
                    break;
                }
            }
            Event::Pong { .. } => {}
            event => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    cancel.cancel();
}

enum Outgoing {
    Line(String),
    Paced(String),
    Stop,
}

async fn paced_recv(queue: &mut mpsc::Receiver<String>, not_before: Instant) -> Option<String> {
    sleep_until(not_before).await;
    queue.recv().await
}

async fn run_writer(
    mut writer: WriteHalf<BoxedStream>,
    mut priority: mpsc::Receiver<String>,
    mut normal: mpsc::Receiver<String>,
    delay: Duration,
    cancel: CancellationToken,
) {
    let mut next_normal = Instant::now();

    loop {
        let outgoing = tokio::select! {
            biased;
            _ = cancel.cancelled() => Outgoing::Stop,
            Some(line) = priority.recv() => Outgoing::Line(line),
            line = paced_recv(&mut normal, next_normal) => match line {
                Some(line) => Outgoing::Paced(line),
                None => Outgoing::Stop,
            },
        };

        let line = match outgoing {
            Outgoing::Stop => break,
            Outgoing::Line(line) => line,
            Outgoing::Paced(line) => {
                next_normal = Instant::now() + delay;
                line
            }
        };

        if let Err(e) = write_framed(&mut writer, &line).await {
            warn!("Write error: {}", e);
            break;
        }
    }

    let _ = writer.shutdown().await;
    cancel.cancel();
}

/// Tunables for a running session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Silence before the bot probes the server
    pub idle_timeout: Duration,
    /// Minimum gap between normal outbound lines
    pub message_delay: Duration,
    /// PRIVMSG text longer than this is split
    pub max_message_length: usize,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.keepalive.idle_timeout_secs),
            message_delay: Duration::from_millis(config.output.message_delay_ms),
            max_message_length: config.output.max_message_length,
        }
    }
}

/// A registered connection split into background tasks
pub struct Session {
    events: mpsc::Receiver<Event>,
    outbound: Outbound,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Next inbound event; `None` once the connection is lost
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Handle for queueing outbound lines
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Token cancelled when the connection goes away
    pub fn closed(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send QUIT, give the writer a moment to flush it, then stop both tasks
    pub async fn quit(mut self, reason: &str) {
        self.outbound.send_raw(Message::quit(reason).to_string()).await;
        let _ = timeout(Duration::from_secs(2), self.cancel.cancelled()).await;
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A reply addressed privately to one requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub target: Identity,
    pub lines: Vec<String>,
}

impl OutboundMessage {
    pub fn new(target: Identity, lines: Vec<String>) -> Self {
        Self { target, lines }
    }

    pub fn single(target: Identity, line: impl Into<String>) -> Self {
        Self::new(target, vec![line.into()])
    }
}

/// Cloneable handle onto a session's outbound queue
#[derive(Clone)]
pub struct Outbound {
    sender: mpsc::Sender<String>,
    max_message_length: usize,
}

impl Outbound {
    /// Queue a raw line. Returns false if the session is gone, in which case
    /// the line is discarded.
    pub async fn send_raw(&self, line: String) -> bool {
        match self.sender.send(line).await {
            Ok(()) => true,
            Err(_) => {
                debug!("Session closed, discarding outbound line");
                false
            }
        }
    }

    /// Queue a PRIVMSG, split at word boundaries when it is too long
    pub async fn privmsg(&self, target: &str, text: &str) -> bool {
        for chunk in split_message(text, self.max_message_length) {
            if !self.send_raw(Message::privmsg(target, &chunk).to_string()).await {
                return false;
            }
        }
        true
    }

    /// Queue every line of a reply, in order
    pub async fn send_message(&self, message: &OutboundMessage) -> bool {
        for line in &message.lines {
            if !self.privmsg(message.target.nick(), line).await {
                return false;
            }
        }
        true
    }
}

fn tls_client_config(verify: bool) -> ClientConfig {
    if !verify {
        warn!("TLS certificate verification disabled");
        return ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();
    }

    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }
    for e in &native.errors {
        warn!("Error loading native certs: {}", e);
    }

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Certificate verifier for networks with self-signed certificates
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        tokio_rustls::rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
