//! dRPC server on a packet-oriented Unix domain socket.
//!
//! Binds the socket path, accepts connections, and runs one [`Session`] per
//! connection in its own task.
//!
//! # Thread Safety
//!
//! The live-session map is the only state shared between tasks. It is
//! guarded by a mutex and mutated only by the accept loop (insert) and by a
//! session's own task on teardown (remove). Each session's read/dispatch/write
//! loop runs unsynchronized with every other session.

use crate::cancel::CancellationToken;
use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use crate::service::{Module, ModuleService};
use crate::session::{Session, SessionId};
use nix::errno::Errno;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_seqpacket::UnixSeqpacketListener;
use tracing::{debug, error, info};

/// Lifecycle of a [`DomainSocketServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Started,
    ShuttingDown,
    Stopped,
}

type SessionMap = Arc<Mutex<HashMap<SessionId, Arc<Session>>>>;

fn lock_sessions(sessions: &SessionMap) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Listens for dRPC connections and dispatches their calls.
///
/// Dropping a started server shuts it down.
pub struct DomainSocketServer {
    socket_path: PathBuf,
    service: Arc<ModuleService>,
    sessions: SessionMap,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DomainSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainSocketServer")
            .field("socket_path", &self.socket_path)
            .field("state", &self.state())
            .field("service", &self.service)
            .finish()
    }
}

impl DomainSocketServer {
    /// Create an unstarted server for the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.as_os_str().is_empty() {
            return Err(DrpcError::MissingArgument("socket path"));
        }

        Ok(Self {
            socket_path,
            service: Arc::new(ModuleService::new()),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            accept_task: None,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Register a module to handle incoming calls. Only allowed before `start`.
    pub fn register_module<M: Module>(&mut self, module: M) -> Result<()> {
        if self.accept_task.is_some() {
            return Err(DrpcError::AlreadyStarted);
        }
        Arc::get_mut(&mut self.service)
            .ok_or(DrpcError::AlreadyStarted)?
            .register_module(module);
        Ok(())
    }

    /// Bind the socket and start accepting connections in the background.
    ///
    /// A stale socket file left by a previous run is unlinked first. Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.accept_task.is_some() {
            return Err(DrpcError::AlreadyStarted);
        }

        match nix::unistd::unlink(&self.socket_path) {
            Ok(()) => debug!("Removed stale socket {}", self.socket_path.display()),
            Err(Errno::ENOENT) => {}
            Err(errno) => {
                return Err(DrpcError::io_with_path(
                    std::io::Error::from(errno),
                    &self.socket_path,
                ));
            }
        }

        let listener =
            UnixSeqpacketListener::bind(&self.socket_path).map_err(|source| DrpcError::Listen {
                path: self.socket_path.clone(),
                source,
            })?;

        std::fs::set_permissions(
            &self.socket_path,
            std::fs::Permissions::from_mode(DrpcConfig::SOCKET_PERMISSIONS),
        )
        .map_err(|e| DrpcError::io_with_path(e, &self.socket_path))?;

        info!("dRPC server listening on {}", self.socket_path.display());

        self.accept_task = Some(tokio::spawn(Self::accept_loop(
            listener,
            self.service.clone(),
            self.sessions.clone(),
            self.cancel.clone(),
            self.socket_path.clone(),
        )));
        Ok(())
    }

    /// Request shutdown. Returns immediately.
    ///
    /// The listener is closed so no new sessions are created. Live sessions
    /// are not interrupted; each ends when its own connection fails.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> ServerState {
        match &self.accept_task {
            None => ServerState::Created,
            Some(task) if task.is_finished() => ServerState::Stopped,
            Some(_) if self.cancel.is_cancelled() => ServerState::ShuttingDown,
            Some(_) => ServerState::Started,
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        lock_sessions(&self.sessions).len()
    }

    /// Wait for the accept loop to exit.
    ///
    /// Returns immediately if the server was never started.
    pub async fn wait_stopped(&mut self) {
        if let Some(task) = self.accept_task.as_mut() {
            if !task.is_finished() {
                if let Err(e) = task.await {
                    error!("dRPC accept loop panicked: {}", e);
                }
            }
        }
    }

    async fn accept_loop(
        mut listener: UnixSeqpacketListener,
        service: Arc<ModuleService>,
        sessions: SessionMap,
        cancel: CancellationToken,
        socket_path: PathBuf,
    ) {
        let mut next_id = 0u64;

        loop {
            // Shutdown wins over a connection already waiting in the backlog.
            let accepted = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Quitting listener on {}", socket_path.display());
                    break;
                }
                result = listener.accept() => result,
            };

            match accepted {
                Ok(conn) => {
                    next_id += 1;
                    let session = Arc::new(Session::new(
                        SessionId::new(next_id),
                        Box::new(conn),
                        service.clone(),
                    ));
                    lock_sessions(&sessions).insert(session.id(), session.clone());
                    tokio::spawn(Self::listen_session(session, sessions.clone()));
                }
                Err(e) => {
                    // Errors are expected while the listener is being torn down.
                    if !cancel.is_cancelled() {
                        error!(
                            "{}: failed to accept connection: {}",
                            socket_path.display(),
                            e
                        );
                    }
                    break;
                }
            }
        }
    }

    async fn listen_session(session: Arc<Session>, sessions: SessionMap) {
        debug!("dRPC session {} opened", session.id());

        loop {
            if let Err(e) = session.process_incoming_message().await {
                debug!("dRPC session {} ended: {}", session.id(), e);
                break;
            }
        }

        let mut live = lock_sessions(&sessions);
        session.close();
        live.remove(&session.id());
    }
}

impl Drop for DomainSocketServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
