//! Transport and application status codes.
//!
//! Two layers of status exist on every exchange:
//!
//! - [`Status`] lives in the [`Response`](crate::message::Response) envelope and
//!   reports whether framing and dispatch succeeded.
//! - [`DaosStatus`] is an engine error number that a handler may embed in its
//!   own response body. Only the retry layer looks at it, and only through the
//!   [`StatusResponse`] view.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-level outcome of a dRPC exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Submitted,
    Failure,
    UnknownModule,
    UnknownMethod,
    FailedUnmarshalCall,
    FailedUnmarshalPayload,
    FailedMarshal,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Submitted => "SUBMITTED",
            Status::Failure => "FAILURE",
            Status::UnknownModule => "UNKNOWN_MODULE",
            Status::UnknownMethod => "UNKNOWN_METHOD",
            Status::FailedUnmarshalCall => "FAILED_UNMARSHAL_CALL",
            Status::FailedUnmarshalPayload => "FAILED_UNMARSHAL_PAYLOAD",
            Status::FailedMarshal => "FAILED_MARSHAL",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error number carried inside a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaosStatus(pub i32);

impl DaosStatus {
    pub const SUCCESS: DaosStatus = DaosStatus(0);
    pub const NO_PERM: DaosStatus = DaosStatus(-1001);
    pub const NO_HANDLE: DaosStatus = DaosStatus(-1002);
    pub const INVALID: DaosStatus = DaosStatus(-1003);
    pub const EXISTS: DaosStatus = DaosStatus(-1004);
    pub const NONEXISTENT: DaosStatus = DaosStatus(-1005);
    pub const UNREACHABLE: DaosStatus = DaosStatus(-1006);
    pub const NO_SPACE: DaosStatus = DaosStatus(-1007);
    pub const ALREADY: DaosStatus = DaosStatus(-1008);
    pub const NO_MEMORY: DaosStatus = DaosStatus(-1009);
    pub const NO_SYS: DaosStatus = DaosStatus(-1010);
    pub const TIMED_OUT: DaosStatus = DaosStatus(-1011);
    pub const BUSY: DaosStatus = DaosStatus(-1012);
    pub const TRY_AGAIN: DaosStatus = DaosStatus(-1013);
    pub const PROTOCOL: DaosStatus = DaosStatus(-1014);
    pub const UNINITIALIZED: DaosStatus = DaosStatus(-1015);
    pub const TRUNCATED: DaosStatus = DaosStatus(-1016);
    pub const OVERFLOW: DaosStatus = DaosStatus(-1017);
    pub const CANCELED: DaosStatus = DaosStatus(-1018);
    pub const NOT_LEADER: DaosStatus = DaosStatus(-2008);
    pub const NOT_REPLICA: DaosStatus = DaosStatus(-2009);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == DaosStatus::SUCCESS
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            DaosStatus::SUCCESS => "DER_SUCCESS",
            DaosStatus::NO_PERM => "DER_NO_PERM",
            DaosStatus::NO_HANDLE => "DER_NO_HDL",
            DaosStatus::INVALID => "DER_INVAL",
            DaosStatus::EXISTS => "DER_EXIST",
            DaosStatus::NONEXISTENT => "DER_NONEXIST",
            DaosStatus::UNREACHABLE => "DER_UNREACH",
            DaosStatus::NO_SPACE => "DER_NOSPACE",
            DaosStatus::ALREADY => "DER_ALREADY",
            DaosStatus::NO_MEMORY => "DER_NOMEM",
            DaosStatus::NO_SYS => "DER_NOSYS",
            DaosStatus::TIMED_OUT => "DER_TIMEDOUT",
            DaosStatus::BUSY => "DER_BUSY",
            DaosStatus::TRY_AGAIN => "DER_AGAIN",
            DaosStatus::PROTOCOL => "DER_PROTO",
            DaosStatus::UNINITIALIZED => "DER_UNINIT",
            DaosStatus::TRUNCATED => "DER_TRUNC",
            DaosStatus::OVERFLOW => "DER_OVERFLOW",
            DaosStatus::CANCELED => "DER_CANCELED",
            DaosStatus::NOT_LEADER => "DER_NOTLEADER",
            DaosStatus::NOT_REPLICA => "DER_NOTREPLICA",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DaosStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "DER_UNKNOWN({})", self.0),
        }
    }
}

impl From<i32> for DaosStatus {
    fn from(code: i32) -> Self {
        DaosStatus(code)
    }
}

/// View of a response body that only decodes its `status` field.
///
/// Retryable methods must answer with a JSON object whose top-level `status`
/// field holds the engine error number. All other fields are ignored, so such
/// a body can be inspected without knowing the method's full schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: DaosStatus,
}

impl StatusResponse {
    pub fn new(status: DaosStatus) -> Self {
        Self { status }
    }

    /// Decode the application status from a response body.
    ///
    /// Returns `None` when the body is not an object with a `status` field.
    pub fn from_body(body: &[u8]) -> Option<DaosStatus> {
        serde_json::from_slice::<StatusResponse>(body)
            .ok()
            .map(|resp| resp.status)
    }
}
