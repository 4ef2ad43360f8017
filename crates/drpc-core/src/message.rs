//! dRPC envelope types.
//!
//! A [`Call`] addresses one method and carries an opaque body owned by that
//! method's handler. A [`Response`] reports the transport status and carries
//! the handler's opaque reply.
//!
//! Each envelope is one JSON document sent as one datagram; the opaque body is
//! base64 encoded inside it:
//!
//! ```text
//! {"module":2,"method":208,"sequence":1,"body":"eyJ1dWlk...fQ=="}
//! {"sequence":1,"status":"SUCCESS","body":"eyJzdGF0dXMiOjB9"}
//! ```

use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use crate::module::Method;
use crate::status::Status;
use serde::{Deserialize, Serialize};

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub module: i32,
    pub method: i32,
    #[serde(default)]
    pub sequence: i64,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
}

impl Call {
    /// Create a call addressed to `method`. The sequence is assigned on send.
    pub fn new(method: Method, body: Vec<u8>) -> Self {
        Self {
            module: method.module().id(),
            method: method.id(),
            sequence: 0,
            body,
        }
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(DrpcError::marshal)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| DrpcError::Unmarshal {
            message: format!("invalid dRPC call: {}", e),
            source: Some(e),
        })
    }
}

/// Inbound reply envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence of the call being answered, informational only.
    #[serde(default)]
    pub sequence: i64,
    pub status: Status,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(sequence: i64, status: Status, body: Vec<u8>) -> Self {
        Self {
            sequence,
            status,
            body,
        }
    }

    /// Create a success response carrying a handler payload.
    pub fn success(sequence: i64, body: Vec<u8>) -> Self {
        Self::new(sequence, Status::Success, body)
    }

    /// Create a failure response whose body describes the error.
    pub fn error(sequence: i64, status: Status, message: impl Into<String>) -> Self {
        Self::new(sequence, status, message.into().into_bytes())
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(DrpcError::marshal)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| DrpcError::Unmarshal {
            message: format!("invalid dRPC response: {}", e),
            source: Some(e),
        })
    }

    /// Decode the body as a typed payload.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Serialize a handler payload for a response body.
///
/// A serialization failure is reported as `FAILED_MARSHAL` to the peer.
pub fn marshal<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| {
        DrpcError::failure(
            Status::FailedMarshal,
            format!("failed to marshal response payload: {}", e),
        )
    })
}

/// Decode a call body into a handler's request type.
///
/// A decode failure is reported as `FAILED_UNMARSHAL_PAYLOAD` to the peer.
pub fn unmarshal<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Reject messages that cannot fit in one datagram.
pub(crate) fn check_size(len: usize) -> Result<()> {
    if len > DrpcConfig::MAX_MSG_SIZE {
        return Err(DrpcError::MessageTooLarge {
            size: len,
            max: DrpcConfig::MAX_MSG_SIZE,
        });
    }
    Ok(())
}

mod base64_body {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleId;

    #[test]
    fn test_call_addresses_method() {
        let call = Call::new(Method::POOL_CREATE, vec![1, 2, 3]);
        assert_eq!(call.module, ModuleId::MGMT.id());
        assert_eq!(call.method, 208);
        assert_eq!(call.sequence, 0);
    }

    #[test]
    fn test_call_wire_format() {
        let mut call = Call::new(Method::NOTIFY_READY, b"{}".to_vec());
        call.sequence = 7;
        let json: serde_json::Value = serde_json::from_slice(&call.marshal().unwrap()).unwrap();

        assert_eq!(json["module"], 3);
        assert_eq!(json["method"], 301);
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["body"], "e30=");
    }

    #[test]
    fn test_response_error_serialization() {
        let resp = Response::error(4, Status::UnknownModule, "Attempted to call unregistered module");
        let bytes = resp.marshal().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"UNKNOWN_MODULE\""));

        let parsed = Response::unmarshal(&bytes).unwrap();
        assert_eq!(parsed, resp);
        assert_eq!(
            String::from_utf8(parsed.body).unwrap(),
            "Attempted to call unregistered module"
        );
    }

    #[test]
    fn test_call_unmarshal_rejects_garbage() {
        assert!(matches!(
            Call::unmarshal(b"\x00\x01not a call"),
            Err(DrpcError::Unmarshal { .. })
        ));
        // body must be base64
        assert!(Call::unmarshal(br#"{"module":2,"method":201,"body":"!!"}"#).is_err());
    }

    #[test]
    fn test_empty_body_defaults() {
        let call = Call::unmarshal(br#"{"module":2,"method":201}"#).unwrap();
        assert!(call.body.is_empty());
        assert_eq!(call.sequence, 0);
    }

    #[test]
    fn test_marshal_helper_and_decode_body() {
        let body = marshal(&serde_json::json!({"status": 0, "ranks": [1, 2]})).unwrap();
        let resp = Response::success(1, body);
        let decoded: serde_json::Value = resp.decode_body().unwrap();
        assert_eq!(decoded["ranks"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_unmarshal_helper_maps_to_payload_status() {
        let err = unmarshal::<Vec<u32>>(b"{").unwrap_err();
        assert_eq!(err.to_status(), Status::FailedUnmarshalPayload);
    }

    #[test]
    fn test_large_body_fits_in_one_message() {
        // Half the limit must fit with room to spare for the envelope.
        let call = Call::new(Method::POOL_CREATE, vec![0xa5; DrpcConfig::MAX_MSG_SIZE / 2 + 1000]);
        let bytes = call.marshal().unwrap();
        assert!(check_size(bytes.len()).is_ok(), "{} bytes", bytes.len());
        assert_eq!(Call::unmarshal(&bytes).unwrap(), call);
    }

    #[test]
    fn test_check_size() {
        assert!(check_size(DrpcConfig::MAX_MSG_SIZE).is_ok());
        assert!(matches!(
            check_size(DrpcConfig::MAX_MSG_SIZE + 1),
            Err(DrpcError::MessageTooLarge { .. })
        ));
    }
}
