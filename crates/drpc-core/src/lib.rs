//! dRPC - Unix domain socket RPC between the control plane and storage engines.
//!
//! Each message is one datagram on a `SOCK_SEQPACKET` socket. A client sends a
//! [`Call`] addressed to a module and method, and the server answers with
//! exactly one [`Response`] on the same connection. The transport-level
//! [`Status`] says whether the call was dispatched; the outcome of the
//! operation itself travels inside the response body.
//!
//! # Example
//!
//! ```rust,ignore
//! use drpc_core::{make_call, CancellationToken, DomainSocketClient, Method, Request};
//!
//! #[tokio::main]
//! async fn main() -> drpc_core::Result<()> {
//!     let client = DomainSocketClient::new("/var/run/daos_server/daos_engine_0.sock");
//!     let cancel = CancellationToken::new();
//!
//!     let resp = make_call::<()>(&cancel, &client, Method::PING_RANK, &Request::Empty).await?;
//!     println!("engine answered with {} bytes", resp.body.len());
//!
//!     Ok(())
//! }
//! ```

pub mod call;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod module;
pub mod server;
pub mod service;
pub mod session;
pub mod socket;
pub mod status;

// Re-export commonly used types
pub use call::{check_response, make_call, new_call, Request, RetryableRequest};
pub use cancel::CancellationToken;
pub use client::{ClientConnection, Dialer, DomainSocketClient, SeqpacketDialer, Transport};
pub use config::{DrpcConfig, SocketConfig};
pub use error::{DrpcError, Result};
pub use message::{Call, Response};
pub use module::{Method, ModuleId};
pub use server::{DomainSocketServer, ServerState};
pub use service::{unimplemented_method, Module, ModuleService};
pub use session::{Session, SessionId};
pub use socket::{
    check_client_socket_path, check_socket_dir, cleanup_sockets, engine_socket_path,
    server_socket_path,
};
pub use status::{DaosStatus, Status, StatusResponse};
