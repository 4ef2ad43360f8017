//! Server module: notifications pushed by storage engines to the control plane.

use async_trait::async_trait;
use drpc_core::message::{marshal, unmarshal};
use drpc_core::{
    check_client_socket_path, unimplemented_method, DaosStatus, Method, Module, ModuleId,
    Result, Session, StatusResponse,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Sent by an engine once it is ready to accept dRPC calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReadyReq {
    pub uri: String,
    pub nctxs: u32,
    pub drpc_listener_sock: String,
    pub instance_idx: u32,
    pub ntgts: u32,
}

/// Block device error report from an engine target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BioErrorReq {
    pub unmap_err: bool,
    pub read_err: bool,
    pub write_err: bool,
    pub tgt_id: i32,
    pub instance_idx: u32,
    pub drpc_listener_sock: String,
    pub uri: String,
}

/// RAS event forwarded from the data plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasEvent {
    pub id: u32,
    pub msg: String,
    pub hostname: String,
    pub rank: u32,
    #[serde(rename = "type")]
    pub kind: u32,
    pub severity: u32,
    /// Opaque event details.
    pub str_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEventReq {
    pub sequence: u64,
    pub event: RasEvent,
}

/// Engine that has reported itself ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyEngine {
    pub uri: String,
    pub socket_path: PathBuf,
    pub nctxs: u32,
    pub ntgts: u32,
}

/// Handler for the `Server` module.
///
/// Clones share the table of ready engines.
#[derive(Debug, Clone, Default)]
pub struct SrvModule {
    engines: Arc<Mutex<BTreeMap<u32, ReadyEngine>>>,
}

impl SrvModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines that have reported ready, keyed by instance index.
    pub fn ready_engines(&self) -> BTreeMap<u32, ReadyEngine> {
        self.engines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn handle_notify_ready(&self, req: NotifyReadyReq) -> Result<Vec<u8>> {
        check_client_socket_path(&req.drpc_listener_sock)?;

        info!(
            "engine {} ready: uri={} sock={} targets={}",
            req.instance_idx, req.uri, req.drpc_listener_sock, req.ntgts
        );

        let engine = ReadyEngine {
            uri: req.uri,
            socket_path: PathBuf::from(req.drpc_listener_sock),
            nctxs: req.nctxs,
            ntgts: req.ntgts,
        };
        let previous = self
            .engines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(req.instance_idx, engine);
        if previous.is_some() {
            warn!("engine {} reported ready again", req.instance_idx);
        }
        Ok(Vec::new())
    }

    fn handle_bio_error(&self, req: BioErrorReq) -> Result<Vec<u8>> {
        let kind = if req.unmap_err {
            "unmap"
        } else if req.read_err {
            "read"
        } else if req.write_err {
            "write"
        } else {
            "unknown"
        };

        error!(
            "request to engine {} target {} failed with {} I/O error (uri={})",
            req.instance_idx, req.tgt_id, kind, req.uri
        );
        Ok(Vec::new())
    }

    fn handle_cluster_event(&self, req: ClusterEventReq) -> Result<Vec<u8>> {
        let event = &req.event;
        info!(
            "RAS event {} (seq {}) from {} rank {}: {}",
            event.id, req.sequence, event.hostname, event.rank, event.msg
        );
        marshal(&StatusResponse::new(DaosStatus::SUCCESS))
    }
}

#[async_trait]
impl Module for SrvModule {
    fn id(&self) -> ModuleId {
        ModuleId::SRV
    }

    async fn handle_call(&self, _session: &Session, method: Method, body: &[u8]) -> Result<Vec<u8>> {
        match method {
            Method::NOTIFY_READY => self.handle_notify_ready(unmarshal(body)?),
            Method::BIO_ERROR => self.handle_bio_error(unmarshal(body)?),
            Method::CLUSTER_EVENT => self.handle_cluster_event(unmarshal(body)?),
            // Pool service ranks live in the system database, which this
            // process does not host.
            other => Err(unimplemented_method(other)),
        }
    }
}
