//! A mock AMI server: binds a random TCP port, speaks just enough of the
//! wire protocol (welcome line, then `\r\n\r\n`-terminated packets) for a
//! test to script whatever request/response/event sequence a scenario
//! needs, without a real Asterisk instance.
//!
//! The protocol state machine itself is left to the caller rather than
//! fixed inside the server — AMI scenarios vary too much for a single
//! scripted handshake — so the connection handle hands the test direct
//! read/write control over each accepted socket.

use std::net::SocketAddr;

use ami_client::{AmiCodec, Packet};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

/// A running mock AMI server. Dropping it aborts the accept loop.
pub struct MockAmiServer {
    addr: SocketAddr,
    incoming: Mutex<mpsc::UnboundedReceiver<MockAmiConnection>>,
    accept_task: JoinHandle<()>,
}

impl MockAmiServer {
    /// Bind `127.0.0.1:0` and start accepting connections, writing `welcome`
    /// (e.g. `"Asterisk Call Manager/1.1\r\n"`) as the first line of each.
    pub async fn start(welcome: impl Into<String>) -> std::io::Result<MockAmiServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let welcome = welcome.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let welcome = welcome.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    match MockAmiConnection::new(stream, &welcome).await {
                        Ok(conn) => {
                            let _ = tx.send(conn);
                        }
                        Err(err) => tracing::warn!("mock AMI connection setup failed: {err}"),
                    }
                });
            }
        });

        Ok(MockAmiServer {
            addr,
            incoming: Mutex::new(rx),
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the next client connection and hand back a handle the test
    /// drives directly (read the client's requests, write scripted
    /// responses/events, or close early to simulate a drop).
    pub async fn accept(&self) -> MockAmiConnection {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .expect("accept loop is still running")
    }
}

impl Drop for MockAmiServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// One accepted connection, already past the welcome line.
pub struct MockAmiConnection {
    reader: FramedRead<OwnedReadHalf, AmiCodec>,
    writer: OwnedWriteHalf,
}

impl MockAmiConnection {
    async fn new(stream: TcpStream, welcome: &str) -> std::io::Result<MockAmiConnection> {
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(welcome.as_bytes()).await?;
        Ok(MockAmiConnection {
            reader: FramedRead::new(read_half, AmiCodec),
            writer: write_half,
        })
    }

    /// Read the next packet the client sent (its `Action` header names
    /// which action). `None` once the client has hung up.
    pub async fn recv_request(&mut self) -> Option<Packet> {
        self.reader.next().await.and_then(Result::ok)
    }

    /// Write one packet (a response or a spontaneous event) as an ordered
    /// header list. `AmiCodec`'s encoder isn't reusable here — it always
    /// frames an outgoing `Action:` request, and this is the server's reply
    /// direction.
    pub async fn send_packet(&mut self, headers: &[(&str, &str)]) -> std::io::Result<()> {
        let mut buf = String::new();
        for (name, value) in headers {
            buf.push_str(name);
            buf.push_str(": ");
            buf.push_str(value);
            buf.push_str("\r\n");
        }
        buf.push_str("\r\n");
        self.writer.write_all(buf.as_bytes()).await
    }

    /// Write bytes verbatim, for scenarios that need control over framing
    /// (a mid-packet disconnect, a malformed line).
    pub async fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await
    }

    /// Drop the connection, simulating the socket going away mid-session.
    pub async fn disconnect(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
