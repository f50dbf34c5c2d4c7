//! The transport: owns the TCP connection, the welcome-line handshake,
//! the write serializer, and reconnection.
//!
//! Structured as a single per-connection task that both reads and writes
//! via `tokio::select!` over the socket stream and an outgoing-request
//! channel, wrapped in an outer reconnect loop that repeats the
//! connect-then-handshake sequence on every drop. A `watch::Receiver<bool>`
//! carries the shutdown signal for cooperative teardown.
//!
//! The transport never reaches back into the session or action surface by
//! value. It holds only the [`Correlator`] (a shared capability for routing
//! packets and failing pending actions) and a spontaneous-event sink
//! callback; `Session` owns both the `Transport` and the `Correlator` and
//! wires them together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Framed;

use crate::action::{ActionCall, OutgoingRequest};
use crate::codec::AmiCodec;
use crate::correlator::{CompletionSink, Correlator};
use crate::error::AmiError;
use crate::packet::Packet;
use crate::shape::{ShapeSpec, ShapeState};
use crate::token;

/// The negotiated API version, parsed from the server's welcome line
/// (`Asterisk Call Manager/<major>.<minor>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    /// The "new" event-mask and ack-literal behavior applies once both the
    /// major and minor components are nonzero.
    pub fn is_new_api(&self) -> bool {
        self.major != 0 && self.minor != 0
    }
}

/// Credentials stashed after a successful `Login`, so a reconnect can
/// transparently re-authenticate. Cleared on explicit teardown.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
    pub use_md5: bool,
}

/// A spontaneous packet handed to whoever owns the session above the
/// transport: either an event with no interested pending action, or one
/// that arrived with no ActionID at all.
pub type EventSink = Arc<dyn Fn(Packet) + Send + Sync>;

type FramedTcp = Framed<TcpStream, AmiCodec>;

/// Owns a live (or reconnecting) AMI connection.
///
/// Cloning a `Transport` is cheap and shares the same connection: every
/// clone can submit writes and observe connectivity, but only the task
/// spawned by [`Transport::connect`] drives the socket itself.
#[derive(Clone)]
pub struct Transport {
    write_tx: mpsc::UnboundedSender<OutgoingRequest>,
    shutdown_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    api_version: Arc<Mutex<ApiVersion>>,
    credentials: Arc<Mutex<Option<Credentials>>>,
    correlator: Arc<Correlator>,
}

impl Transport {
    /// Open a connection, perform the welcome-line handshake, and spawn the
    /// connection-owning task. Returns once the first connection attempt
    /// has either succeeded or exhausted itself — reconnection after that
    /// point happens in the background.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        correlator: Arc<Correlator>,
        events: EventSink,
    ) -> Result<(Transport, ApiVersion), AmiError> {
        let host = host.into();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (connected_tx, connected_rx) = watch::channel(false);
        let api_version = Arc::new(Mutex::new(ApiVersion::default()));
        let credentials = Arc::new(Mutex::new(None));

        let handshake = open_and_handshake(&host, port).await?;
        let version = handshake.version;
        *api_version.lock().unwrap() = version;
        let _ = connected_tx.send(true);

        let transport = Transport {
            write_tx,
            shutdown_tx,
            connected_rx,
            api_version: api_version.clone(),
            credentials: credentials.clone(),
            correlator: correlator.clone(),
        };

        tokio::spawn(connection_manager(
            host,
            port,
            handshake,
            correlator,
            events,
            write_rx,
            shutdown_rx,
            connected_tx,
            api_version,
            credentials,
        ));

        Ok((transport, version))
    }

    /// The negotiated API version as of the most recent (re)connect.
    pub fn api_version(&self) -> ApiVersion {
        *self.api_version.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Remember credentials so a future reconnect re-authenticates
    /// automatically. Called by the session surface after a successful
    /// `Login`.
    pub fn remember_credentials(&self, credentials: Credentials) {
        *self.credentials.lock().unwrap() = Some(credentials);
    }

    /// Submit a request on the write path. Succeeds even while
    /// disconnected (the request is queued against the next reconnect);
    /// callers that would rather fail fast should check
    /// [`Transport::is_connected`] first.
    pub fn send(&self, request: OutgoingRequest) -> Result<(), AmiError> {
        self.write_tx
            .send(request)
            .map_err(|_| AmiError::Disconnected)
    }

    /// The shared correlator, for the session surface to register pending
    /// actions against.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Idempotent teardown: stop reconnecting, drop queued credentials, and
    /// fail every pending action.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        *self.credentials.lock().unwrap() = None;
        self.correlator.fail_all(|| AmiError::Disconnected);
    }
}

/// A freshly connected socket past the welcome line, plus whatever trailing
/// bytes the line-read's buffer happened to pick up ahead of it (the server
/// is free to pipeline its first packet right behind the welcome line).
struct Handshake {
    stream: TcpStream,
    leftover: Vec<u8>,
    version: ApiVersion,
}

async fn open_and_handshake(host: &str, port: u16) -> Result<Handshake, AmiError> {
    let stream = TcpStream::connect((host, port)).await?;
    read_welcome_line(stream).await
}

/// AMI's welcome line isn't packet-framed (no blank-line terminator); read
/// exactly one `\r\n`-terminated line off the socket before handing it to
/// [`AmiCodec`]. `BufReader` may read ahead past the line's end, so its
/// leftover buffer is returned for the caller to seed into `Framed`.
async fn read_welcome_line(stream: TcpStream) -> Result<Handshake, AmiError> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let version = parse_welcome_line(&line)
        .ok_or_else(|| AmiError::Protocol(format!("unrecognized welcome line: {line:?}")))?;
    let leftover = reader.buffer().to_vec();
    Ok(Handshake {
        stream: reader.into_inner(),
        leftover,
        version,
    })
}

/// Build the packet stream for a connection, pre-seeding any bytes the
/// welcome-line read already buffered past the line itself.
fn framed_from_handshake(handshake: Handshake) -> (Sink, Source, ApiVersion) {
    let mut framed = Framed::new(handshake.stream, AmiCodec);
    framed.read_buffer_mut().extend_from_slice(&handshake.leftover);
    let (sink, source) = framed.split();
    (sink, source, handshake.version)
}

fn parse_welcome_line(line: &str) -> Option<ApiVersion> {
    let line = line.trim_end();
    let suffix = line.strip_prefix("Asterisk Call Manager/")?;
    let (major, minor) = suffix.split_once('.')?;
    Some(ApiVersion {
        major: major.trim().parse().ok()?,
        minor: minor.trim().parse().ok()?,
    })
}

/// Bounded exponential backoff between reconnect attempts.
struct Backoff {
    next: Duration,
}

const BACKOFF_MIN: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

impl Backoff {
    fn new() -> Self {
        Backoff { next: BACKOFF_MIN }
    }

    fn reset(&mut self) {
        self.next = BACKOFF_MIN;
    }

    fn advance(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(BACKOFF_MAX);
        delay
    }
}

enum ConnEnd {
    Shutdown,
    Disconnected,
}

#[allow(clippy::too_many_arguments)]
async fn connection_manager(
    host: String,
    port: u16,
    mut handshake: Handshake,
    correlator: Arc<Correlator>,
    events: EventSink,
    mut write_rx: mpsc::UnboundedReceiver<OutgoingRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
    connected_tx: watch::Sender<bool>,
    api_version: Arc<Mutex<ApiVersion>>,
    credentials: Arc<Mutex<Option<Credentials>>>,
) {
    let mut backoff = Backoff::new();
    let mut first = true;

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        if !first {
            handshake = match open_and_handshake(&host, port).await {
                Ok(handshake) => handshake,
                Err(error) => {
                    tracing::warn!(%error, "ami reconnect attempt failed");
                    if wait_or_shutdown(&mut shutdown_rx, backoff.advance()).await {
                        return;
                    }
                    continue;
                }
            };
            *api_version.lock().unwrap() = handshake.version;
        }
        first = false;
        backoff.reset();
        let _ = connected_tx.send(true);
        tracing::info!("ami connection established");

        let (mut sink, mut source, _) = framed_from_handshake(handshake);

        if let Some(creds) = credentials.lock().unwrap().clone() {
            if let Err(error) = relogin(&mut sink, &mut source, &correlator, &events, &creds).await
            {
                tracing::warn!(%error, "automatic re-login after reconnect failed");
            }
        }

        let end = run_connection(
            &mut sink,
            &mut source,
            &correlator,
            &events,
            &mut write_rx,
            &mut shutdown_rx,
        )
        .await;

        let _ = connected_tx.send(false);
        correlator.fail_all(|| AmiError::Disconnected);

        match end {
            ConnEnd::Shutdown => return,
            ConnEnd::Disconnected => {
                tracing::warn!("ami connection lost, will reconnect");
            }
        }
    }
}

type Sink = futures_util::stream::SplitSink<FramedTcp, OutgoingRequest>;
type Source = futures_util::stream::SplitStream<FramedTcp>;

async fn run_connection(
    sink: &mut Sink,
    source: &mut Source,
    correlator: &Arc<Correlator>,
    events: &EventSink,
    write_rx: &mut mpsc::UnboundedReceiver<OutgoingRequest>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnEnd {
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return ConnEnd::Shutdown;
                }
            }
            packet = source.next() => {
                match packet {
                    Some(Ok(packet)) => {
                        if let Some(spontaneous) = correlator.dispatch(packet) {
                            events(spontaneous);
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, "ami framing error");
                        return ConnEnd::Disconnected;
                    }
                    None => return ConnEnd::Disconnected,
                }
            }
            request = write_rx.recv() => {
                match request {
                    Some(request) => {
                        if let Err(error) = sink.send(request).await {
                            tracing::warn!(%error, "ami write failed");
                            return ConnEnd::Disconnected;
                        }
                    }
                    None => return ConnEnd::Shutdown,
                }
            }
        }
    }
}

/// Re-issue `Login` directly over a freshly split connection, bypassing the
/// write-serializer channel (it has no reader attached yet) and the
/// session surface above (the transport must not call back into it).
async fn relogin(
    sink: &mut Sink,
    source: &mut Source,
    correlator: &Arc<Correlator>,
    events: &EventSink,
    credentials: &Credentials,
) -> Result<(), AmiError> {
    let token = token::generate();
    let mut call =
        ActionCall::new("Login", token.clone()).raw_header("Username", credentials.username.clone());
    call = if credentials.use_md5 {
        let challenge = call_challenge(sink, source, correlator, events).await?;
        let key = crate::action::md5_challenge_key(&challenge, &credentials.secret);
        call.raw_header("Key", key).raw_header("AuthType", "MD5")
    } else {
        call.raw_header("Secret", credentials.secret.clone())
    };

    let (tx, rx) = oneshot::channel();
    correlator.register(
        token,
        ShapeState::new(ShapeSpec::Ack {
            expected: "Success",
        }),
        CompletionSink::Oneshot(tx),
    );
    sink.send(call.into_request()).await?;
    drain_until(rx, source, correlator, events).await?.map(|_| ())
}

async fn call_challenge(
    sink: &mut Sink,
    source: &mut Source,
    correlator: &Arc<Correlator>,
    events: &EventSink,
) -> Result<String, AmiError> {
    let token = token::generate();
    let call = ActionCall::new("Challenge", token.clone()).raw_header("AuthType", "MD5");
    let (tx, rx) = oneshot::channel();
    correlator.register(
        token,
        ShapeState::new(ShapeSpec::StringField {
            field: "Challenge",
        }),
        CompletionSink::Oneshot(tx),
    );
    sink.send(call.into_request()).await?;
    match drain_until(rx, source, correlator, events).await? {
        Ok(crate::shape::AmiValue::Str(s)) => Ok(s),
        Ok(other) => Err(AmiError::Protocol(format!(
            "expected a Challenge string, got {other:?}"
        ))),
        Err(e) => Err(e),
    }
}

/// Pump packets off `source` into `correlator` until `rx` resolves,
/// forwarding any spontaneous packet to `events` exactly as the ordinary
/// read loop (`run_connection`) does. Used only during the bootstrap
/// re-login handshake, before the connection's ordinary read loop has
/// started.
async fn drain_until(
    mut rx: oneshot::Receiver<Result<crate::shape::AmiValue, AmiError>>,
    source: &mut Source,
    correlator: &Arc<Correlator>,
    events: &EventSink,
) -> Result<Result<crate::shape::AmiValue, AmiError>, AmiError> {
    loop {
        if let Ok(result) = rx.try_recv() {
            return Ok(result);
        }
        match source.next().await {
            Some(Ok(packet)) => {
                if let Some(spontaneous) = correlator.dispatch(packet) {
                    events(spontaneous);
                }
            }
            Some(Err(error)) => return Err(error),
            None => return Err(AmiError::Disconnected),
        }
    }
}

async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = shutdown_rx.changed() => *shutdown_rx.borrow(),
        () = tokio::time::sleep(delay) => false,
    }
}
