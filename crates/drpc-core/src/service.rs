//! Module dispatch registry.
//!
//! Maps the module of an incoming [`Call`] to a registered [`Module`] and
//! produces a [`Response`] for any input. Bad input never surfaces as an
//! error: it becomes a failure status in the response. The only error is a
//! failure to marshal the response itself.

use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use crate::message::{Call, Response};
use crate::module::{Method, ModuleId};
use crate::session::Session;
use crate::status::Status;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A set of related remote methods owned by one subsystem.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Module this handler answers for.
    fn id(&self) -> ModuleId;

    /// Handle one call addressed to a validated method of this module.
    ///
    /// Returns the serialized reply payload. An error is reported to the peer
    /// with the status from [`DrpcError::to_status`].
    async fn handle_call(&self, session: &Session, method: Method, body: &[u8]) -> Result<Vec<u8>>;
}

/// Registry of modules, populated before the server starts.
#[derive(Default)]
pub struct ModuleService {
    modules: HashMap<ModuleId, Arc<dyn Module>>,
}

impl std::fmt::Debug for ModuleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.modules.keys().collect();
        ids.sort();
        f.debug_struct("ModuleService").field("modules", &ids).finish()
    }
}

impl ModuleService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under its ID, replacing any previous registration.
    pub fn register_module<M: Module>(&mut self, module: M) {
        let id = module.id();
        if self.modules.insert(id, Arc::new(module)).is_some() {
            warn!("dRPC module {} registered twice, replacing handler", id);
        } else {
            debug!("dRPC module {} registered", id);
        }
    }

    pub fn get_module(&self, id: ModuleId) -> Option<&Arc<dyn Module>> {
        self.modules.get(&id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Decode a raw message, dispatch it and return the marshaled response.
    ///
    /// A response that would not fit in one message is replaced by a
    /// `FAILED_MARSHAL` response for the same call.
    pub async fn process_message(&self, session: &Session, msg: &[u8]) -> Result<Vec<u8>> {
        let response = self.dispatch(session, msg).await;
        let bytes = response.marshal()?;
        if bytes.len() <= DrpcConfig::MAX_MSG_SIZE {
            return Ok(bytes);
        }

        warn!(
            "session {}: {} byte response exceeds maximum of {} bytes",
            session.id(),
            bytes.len(),
            DrpcConfig::MAX_MSG_SIZE
        );
        Response::error(
            response.sequence,
            Status::FailedMarshal,
            format!(
                "response exceeds maximum message size of {} bytes",
                DrpcConfig::MAX_MSG_SIZE
            ),
        )
        .marshal()
    }

    async fn dispatch(&self, session: &Session, msg: &[u8]) -> Response {
        let call = match Call::unmarshal(msg) {
            Ok(call) => call,
            Err(e) => {
                warn!("session {}: {}", session.id(), e);
                return Response::error(
                    DrpcConfig::UNKNOWN_SEQUENCE,
                    Status::FailedUnmarshalCall,
                    e.to_string(),
                );
            }
        };

        let module_id = ModuleId::new(call.module);
        let Some(module) = self.modules.get(&module_id) else {
            debug!(
                "session {}: call to unregistered module {}",
                session.id(),
                call.module
            );
            return Response::error(
                call.sequence,
                Status::UnknownModule,
                format!("Attempted to call unregistered module {}", call.module),
            );
        };

        let method = match module_id.get_method(call.method) {
            Ok(method) => method,
            Err(e) => {
                debug!("session {}: {}", session.id(), e);
                return Response::error(call.sequence, e.to_status(), e.to_string());
            }
        };

        match module.handle_call(session, method, &call.body).await {
            Ok(body) => Response::success(call.sequence, body),
            Err(e) => {
                debug!("session {}: {} failed: {}", session.id(), method, e);
                Response::error(call.sequence, e.to_status(), e.to_string())
            }
        }
    }
}

/// Handler error for a method a module does not implement.
pub fn unimplemented_method(method: Method) -> DrpcError {
    DrpcError::InvalidMethod {
        module: method.module(),
        method: method.id(),
    }
}
