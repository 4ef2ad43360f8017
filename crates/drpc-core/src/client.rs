//! dRPC client over a packet-oriented Unix domain socket.
//!
//! A [`ClientConnection`] carries at most one call at a time: the protocol has
//! no multiplexing, and the sequence number is not used to correlate replies.
//!
//! # Thread Safety
//!
//! [`DomainSocketClient`] wraps a connection in a tokio `Mutex`. Callers hold
//! the guard returned by [`DomainSocketClient::lock`] for the whole
//! connect → send → close sequence; dropping the guard releases the lock on
//! every exit path.

use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use crate::message::{check_size, Call, Response};
use async_trait::async_trait;
use nix::errno::Errno;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_seqpacket::UnixSeqpacket;
use tracing::{debug, trace};

/// A connected message-preserving socket.
///
/// Every `send` transmits exactly one message and every `recv` returns exactly
/// one message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Receive one message. `Ok(0)` means the peer closed the connection.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn close(&self) -> io::Result<()>;
}

#[async_trait]
impl Transport for UnixSeqpacket {
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        UnixSeqpacket::send(self, buf).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UnixSeqpacket::recv(self, buf).await
    }

    fn close(&self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
}

/// Connects to a Unix domain socket. Swappable for tests.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, socket_path: &Path) -> io::Result<Box<dyn Transport>>;
}

/// Dialer for real `SOCK_SEQPACKET` sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqpacketDialer;

#[async_trait]
impl Dialer for SeqpacketDialer {
    async fn dial(&self, socket_path: &Path) -> io::Result<Box<dyn Transport>> {
        let conn = UnixSeqpacket::connect(socket_path).await?;
        Ok(Box::new(conn))
    }
}

/// Whether a dial failure is expected to clear up on its own.
///
/// Refused connections and missing socket files are permanent: the remote
/// process is not listening.
pub fn is_temporary_dial_error(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        return matches!(
            Errno::from_raw(code),
            Errno::EINTR
                | Errno::EMFILE
                | Errno::ENFILE
                | Errno::ECONNRESET
                | Errno::ECONNABORTED
                | Errno::EAGAIN
                | Errno::ETIMEDOUT
        );
    }

    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

enum ConnState {
    Disconnected,
    Connected(Box<dyn Transport>),
}

/// A client connection to a dRPC server.
pub struct ClientConnection {
    socket_path: PathBuf,
    dialer: Box<dyn Dialer>,
    state: ConnState,
    /// Incremented on every send, reset on connect.
    sequence: i64,
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("socket_path", &self.socket_path)
            .field("connected", &self.is_connected())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl ClientConnection {
    /// Create an unconnected client for the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_dialer(socket_path, SeqpacketDialer)
    }

    /// Create an unconnected client that dials through `dialer`.
    pub fn with_dialer(socket_path: impl Into<PathBuf>, dialer: impl Dialer + 'static) -> Self {
        Self {
            socket_path: socket_path.into(),
            dialer: Box::new(dialer),
            state: ConnState::Disconnected,
            sequence: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnState::Connected(_))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sequence number of the most recently sent call.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Open the connection. A no-op if already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let conn = self
            .dialer
            .dial(&self.socket_path)
            .await
            .map_err(|source| DrpcError::Connect {
                path: self.socket_path.clone(),
                temporary: is_temporary_dial_error(&source),
                source,
            })?;

        debug!("dRPC client connected to {}", self.socket_path.display());

        self.state = ConnState::Connected(conn);
        self.sequence = 0;
        Ok(())
    }

    /// Shut down the connection. A no-op if not connected.
    ///
    /// The connection is considered closed afterwards even if the transport
    /// reports an error.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ConnState::Disconnected) {
            ConnState::Disconnected => Ok(()),
            ConnState::Connected(conn) => {
                debug!("dRPC client closing {}", self.socket_path.display());
                conn.close().map_err(|source| DrpcError::Close { source })
            }
        }
    }

    /// Send a call and wait for its response.
    ///
    /// Assigns the next sequence number to `call` before sending. Transport
    /// errors are returned as-is; the connection stays open and closing it is
    /// up to the caller.
    pub async fn send_msg(&mut self, call: &mut Call) -> Result<Response> {
        let conn = match &self.state {
            ConnState::Connected(conn) => conn,
            ConnState::Disconnected => return Err(DrpcError::NotConnected),
        };

        // Always nonzero for a sent call.
        self.sequence += 1;
        call.sequence = self.sequence;

        let call_bytes = call.marshal()?;
        check_size(call_bytes.len())?;

        trace!(
            "dRPC send module={} method={} sequence={}",
            call.module,
            call.method,
            call.sequence
        );

        conn.send(&call_bytes)
            .await
            .map_err(|source| DrpcError::Send { source })?;

        // One extra byte detects datagrams that would otherwise be truncated.
        let mut buffer = vec![0u8; DrpcConfig::MAX_MSG_SIZE + 1];
        let bytes_read = conn
            .recv(&mut buffer)
            .await
            .map_err(|source| DrpcError::Recv { source })?;

        if bytes_read == 0 {
            return Err(DrpcError::ConnectionClosed);
        }
        check_size(bytes_read)?;

        Response::unmarshal(&buffer[..bytes_read])
    }
}

/// Shared handle to a [`ClientConnection`] with scoped exclusive access.
#[derive(Debug, Clone)]
pub struct DomainSocketClient {
    socket_path: PathBuf,
    inner: Arc<Mutex<ClientConnection>>,
}

impl DomainSocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::from_connection(ClientConnection::new(socket_path))
    }

    pub fn with_dialer(socket_path: impl Into<PathBuf>, dialer: impl Dialer + 'static) -> Self {
        Self::from_connection(ClientConnection::with_dialer(socket_path, dialer))
    }

    pub fn from_connection(conn: ClientConnection) -> Self {
        Self {
            socket_path: conn.socket_path().to_path_buf(),
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Acquire exclusive access to the connection.
    ///
    /// Only one call may be in flight per connection; hold the guard for the
    /// entire connect → send → close sequence.
    pub async fn lock(&self) -> MutexGuard<'_, ClientConnection> {
        self.inner.lock().await
    }
}
