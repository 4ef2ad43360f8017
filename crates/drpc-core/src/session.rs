//! Server-side state for one accepted connection.

use crate::client::Transport;
use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use crate::message::Response;
use crate::service::ModuleService;
use crate::status::Status;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Identifier of a live session within one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        SessionId(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An individual client connection to the server.
///
/// A session is driven by exactly one task, which calls
/// [`process_incoming_message`](Session::process_incoming_message) until it
/// returns an error.
pub struct Session {
    id: SessionId,
    conn: Box<dyn Transport>,
    service: Arc<ModuleService>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    pub fn new(id: SessionId, conn: Box<dyn Transport>, service: Arc<ModuleService>) -> Self {
        Self { id, conn, service }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn service(&self) -> &ModuleService {
        &self.service
    }

    /// Read one message, dispatch it and send the response.
    ///
    /// Any error means the connection is unusable and the session must end:
    /// a failed or empty read (peer gone), a failed write, or a response that
    /// could not be marshaled.
    pub async fn process_incoming_message(&self) -> Result<()> {
        // One extra byte detects datagrams that would otherwise be truncated.
        let mut buffer = vec![0u8; DrpcConfig::MAX_MSG_SIZE + 1];

        let bytes_read = self
            .conn
            .recv(&mut buffer)
            .await
            .map_err(|source| DrpcError::Recv { source })?;
        if bytes_read == 0 {
            return Err(DrpcError::ConnectionClosed);
        }

        let response = if bytes_read > DrpcConfig::MAX_MSG_SIZE {
            // The kernel already dropped the rest of the datagram, so the
            // connection is still aligned on message boundaries.
            warn!(
                "session {}: dropping message larger than {} bytes",
                self.id,
                DrpcConfig::MAX_MSG_SIZE
            );
            Response::error(
                DrpcConfig::UNKNOWN_SEQUENCE,
                Status::FailedUnmarshalCall,
                format!(
                    "message exceeds maximum size of {} bytes",
                    DrpcConfig::MAX_MSG_SIZE
                ),
            )
            .marshal()?
        } else {
            self.service
                .process_message(self, &buffer[..bytes_read])
                .await?
        };

        trace!("session {}: sending {} byte response", self.id, response.len());

        self.conn
            .send(&response)
            .await
            .map_err(|source| DrpcError::Send { source })?;

        Ok(())
    }

    /// Close the underlying connection. Errors are ignored.
    pub fn close(&self) {
        let _ = self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Call;
    use crate::module::Method;
    use crate::service::tests::EchoModule;
    use tokio_seqpacket::UnixSeqpacket;

    fn session_pair() -> (Session, UnixSeqpacket) {
        let (server_end, client_end) = UnixSeqpacket::pair().unwrap();
        let mut service = ModuleService::new();
        service.register_module(EchoModule);
        let session = Session::new(SessionId::new(7), Box::new(server_end), Arc::new(service));
        (session, client_end)
    }

    async fn roundtrip(session: &Session, peer: &UnixSeqpacket, msg: &[u8]) -> Response {
        peer.send(msg).await.unwrap();
        session.process_incoming_message().await.unwrap();

        let mut buffer = vec![0u8; DrpcConfig::MAX_MSG_SIZE];
        let n = peer.recv(&mut buffer).await.unwrap();
        Response::unmarshal(&buffer[..n]).unwrap()
    }

    #[tokio::test]
    async fn test_process_one_message() {
        let (session, peer) = session_pair();

        let mut call = Call::new(Method::PING_RANK, b"ping".to_vec());
        call.sequence = 1;
        let resp = roundtrip(&session, &peer, &call.marshal().unwrap()).await;

        assert_eq!(resp.status, Status::Success);
        assert_eq!(resp.body, b"ping");
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_session_alive() {
        let (session, peer) = session_pair();

        let resp = roundtrip(&session, &peer, b"definitely not a call").await;
        assert_eq!(resp.status, Status::FailedUnmarshalCall);

        let call = Call::new(Method::PING_RANK, b"still here".to_vec());
        let resp = roundtrip(&session, &peer, &call.marshal().unwrap()).await;
        assert_eq!(resp.status, Status::Success);
        assert_eq!(resp.body, b"still here");
    }

    #[tokio::test]
    async fn test_oversized_message_keeps_session_alive() {
        let (session, peer) = session_pair();

        let oversized = vec![b'x'; DrpcConfig::MAX_MSG_SIZE + 100];
        let resp = roundtrip(&session, &peer, &oversized).await;
        assert_eq!(resp.status, Status::FailedUnmarshalCall);
        assert!(String::from_utf8_lossy(&resp.body).contains("maximum size"));

        let call = Call::new(Method::PING_RANK, Vec::new());
        let resp = roundtrip(&session, &peer, &call.marshal().unwrap()).await;
        assert_eq!(resp.status, Status::Success);
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let (session, peer) = session_pair();
        drop(peer);

        let result = session.process_incoming_message().await;
        assert!(matches!(
            result,
            Err(DrpcError::ConnectionClosed) | Err(DrpcError::Recv { .. })
        ));
    }
}
