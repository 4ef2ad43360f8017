//! Module and method address space.
//!
//! Method IDs form one flat namespace. Module `N` owns the IDs in
//! `(N * offset, N * offset + offset)` and declares an exclusive upper bound
//! for the methods it actually implements. The table below is built at compile
//! time and never mutated.

use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a dRPC module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(i32);

impl ModuleId {
    /// Security tasks in the agent.
    pub const SECURITY_AGENT: ModuleId = ModuleId(1);
    /// Management service tasks.
    pub const MGMT: ModuleId = ModuleId(2);
    /// Tasks relating to server setup, and engine notifications.
    pub const SRV: ModuleId = ModuleId(3);
    /// Security tasks in the server.
    pub const SECURITY: ModuleId = ModuleId(4);

    pub const fn new(id: i32) -> Self {
        ModuleId(id)
    }

    pub const fn id(self) -> i32 {
        self.0
    }

    /// First method ID reserved for this module. Never itself a valid method.
    pub const fn base(self) -> i32 {
        self.0 * DrpcConfig::MODULE_METHOD_OFFSET
    }

    fn entry(self) -> Option<&'static ModuleEntry> {
        MODULES.iter().find(|entry| entry.id == self)
    }

    /// Whether the module appears in the module table.
    pub fn is_known(self) -> bool {
        self.entry().is_some()
    }

    /// Exclusive upper bound of this module's method IDs.
    pub fn method_bound(self) -> Option<i32> {
        self.entry().map(|entry| entry.method_bound)
    }

    /// Convert a raw method number into a validated method of this module.
    pub fn get_method(self, method_id: i32) -> Result<Method> {
        if !self.is_known() {
            return Err(DrpcError::UnknownModule(self.0));
        }

        let method = Method::new(self, method_id);
        if !method.is_valid() {
            return Err(DrpcError::InvalidMethod {
                module: self,
                method: method_id,
            });
        }
        Ok(method)
    }

    /// All modules in the table.
    pub fn all() -> impl Iterator<Item = ModuleId> {
        MODULES.iter().map(|entry| entry.id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry() {
            Some(entry) => f.write_str(entry.name),
            None => write!(f, "unknown module id: {}", self.0),
        }
    }
}

/// A single addressable remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method {
    module: ModuleId,
    id: i32,
}

impl Method {
    pub const fn new(module: ModuleId, id: i32) -> Self {
        Self { module, id }
    }

    pub const fn id(&self) -> i32 {
        self.id
    }

    pub const fn module(&self) -> ModuleId {
        self.module
    }

    /// Sanity check that the method ID is within its module's bounds.
    pub fn is_valid(&self) -> bool {
        match self.module.method_bound() {
            Some(bound) => self.id > self.module.base() && self.id < bound,
            None => false,
        }
    }

    /// Human-readable name from the module table, if the method has one.
    pub fn name(&self) -> Option<&'static str> {
        self.module.entry().and_then(|entry| {
            entry
                .methods
                .iter()
                .find(|(id, _)| *id == self.id)
                .map(|(_, name)| *name)
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}:{}", self.module, self.id),
        }
    }
}

// Security agent
impl Method {
    pub const REQUEST_CREDENTIALS: Method = Method::new(ModuleId::SECURITY_AGENT, 101);
}

// Management
impl Method {
    pub const PREP_SHUTDOWN: Method = Method::new(ModuleId::MGMT, 201);
    pub const PING_RANK: Method = Method::new(ModuleId::MGMT, 202);
    pub const SET_RANK: Method = Method::new(ModuleId::MGMT, 203);
    pub const CREATE_MS: Method = Method::new(ModuleId::MGMT, 204);
    pub const START_MS: Method = Method::new(ModuleId::MGMT, 205);
    pub const JOIN: Method = Method::new(ModuleId::MGMT, 206);
    pub const GET_ATTACH_INFO: Method = Method::new(ModuleId::MGMT, 207);
    pub const POOL_CREATE: Method = Method::new(ModuleId::MGMT, 208);
    pub const POOL_DESTROY: Method = Method::new(ModuleId::MGMT, 209);
    pub const POOL_EVICT: Method = Method::new(ModuleId::MGMT, 210);
    pub const POOL_EXCLUDE: Method = Method::new(ModuleId::MGMT, 211);
    pub const POOL_DRAIN: Method = Method::new(ModuleId::MGMT, 212);
    pub const POOL_EXTEND: Method = Method::new(ModuleId::MGMT, 213);
    pub const POOL_REINTEGRATE: Method = Method::new(ModuleId::MGMT, 214);
    pub const BIO_HEALTH: Method = Method::new(ModuleId::MGMT, 215);
    pub const SET_UP: Method = Method::new(ModuleId::MGMT, 216);
    pub const SMD_DEVS: Method = Method::new(ModuleId::MGMT, 217);
    pub const SMD_POOLS: Method = Method::new(ModuleId::MGMT, 218);
    pub const POOL_GET_ACL: Method = Method::new(ModuleId::MGMT, 219);
    pub const LIST_POOLS: Method = Method::new(ModuleId::MGMT, 220);
    pub const POOL_OVERWRITE_ACL: Method = Method::new(ModuleId::MGMT, 221);
    pub const POOL_UPDATE_ACL: Method = Method::new(ModuleId::MGMT, 222);
    pub const POOL_DELETE_ACL: Method = Method::new(ModuleId::MGMT, 223);
    pub const DEV_STATE_QUERY: Method = Method::new(ModuleId::MGMT, 224);
    pub const SET_FAULTY_STATE: Method = Method::new(ModuleId::MGMT, 225);
    pub const REPLACE_STORAGE: Method = Method::new(ModuleId::MGMT, 226);
    pub const LIST_CONTAINERS: Method = Method::new(ModuleId::MGMT, 227);
    pub const POOL_QUERY: Method = Method::new(ModuleId::MGMT, 228);
    pub const POOL_SET_PROP: Method = Method::new(ModuleId::MGMT, 229);
    pub const CONT_SET_OWNER: Method = Method::new(ModuleId::MGMT, 230);
    pub const GROUP_UPDATE: Method = Method::new(ModuleId::MGMT, 231);
    pub const NOTIFY_POOL_CONNECT: Method = Method::new(ModuleId::MGMT, 232);
    pub const NOTIFY_POOL_DISCONNECT: Method = Method::new(ModuleId::MGMT, 233);
    pub const NOTIFY_EXIT: Method = Method::new(ModuleId::MGMT, 234);
    pub const IDENTIFY_STORAGE: Method = Method::new(ModuleId::MGMT, 235);
}

// Server
impl Method {
    pub const NOTIFY_READY: Method = Method::new(ModuleId::SRV, 301);
    pub const BIO_ERROR: Method = Method::new(ModuleId::SRV, 302);
    pub const GET_POOL_SERVICE_RANKS: Method = Method::new(ModuleId::SRV, 303);
    pub const CLUSTER_EVENT: Method = Method::new(ModuleId::SRV, 304);
}

// Security
impl Method {
    pub const VALIDATE_CREDENTIALS: Method = Method::new(ModuleId::SECURITY, 401);
}

struct ModuleEntry {
    id: ModuleId,
    name: &'static str,
    method_bound: i32,
    methods: &'static [(i32, &'static str)],
}

static MODULES: [ModuleEntry; 4] = [
    ModuleEntry {
        id: ModuleId::SECURITY_AGENT,
        name: "Agent Security",
        method_bound: 102,
        methods: &[(101, "request agent credentials")],
    },
    ModuleEntry {
        id: ModuleId::MGMT,
        name: "Management",
        method_bound: 236,
        methods: &[
            (201, "PrepShutdown"),
            (202, "Ping"),
            (203, "SetRank"),
            (204, "CreateMS"),
            (205, "StartMS"),
            (206, "Join"),
            (207, "GetAttachInfo"),
            (208, "PoolCreate"),
            (209, "PoolDestroy"),
            (210, "PoolEvict"),
            (211, "PoolExclude"),
            (212, "PoolDrain"),
            (213, "PoolExtend"),
            (214, "PoolReintegrate"),
            (215, "BioHealthQuery"),
            (216, "Setup"),
            (217, "SmdListDevs"),
            (218, "SmdListPools"),
            (219, "PoolGetACL"),
            (220, "ListPools"),
            (221, "PoolOverwriteACL"),
            (222, "PoolUpdateACL"),
            (223, "PoolDeleteACL"),
            (224, "DevStateQuery"),
            (225, "DevSetFaulty"),
            (226, "DevReplace"),
            (227, "ListContainers"),
            (228, "PoolQuery"),
            (229, "PoolSetProp"),
            (230, "ContSetOwner"),
            (231, "GroupUpdate"),
            (232, "NotifyPoolConnect"),
            (233, "NotifyPoolDisconnect"),
            (234, "NotifyExit"),
            (235, "DevIdentify"),
        ],
    },
    ModuleEntry {
        id: ModuleId::SRV,
        name: "Server",
        method_bound: 305,
        methods: &[
            (301, "notify ready"),
            (302, "block i/o error"),
            (303, "get pool service ranks"),
            (304, "cluster event"),
        ],
    },
    ModuleEntry {
        id: ModuleId::SECURITY,
        name: "Security",
        method_bound: 402,
        methods: &[(401, "validate credentials")],
    },
];
