//! Gateway message types
//!
//! The gateway is a separate process that owns the field-bus protocol
//! (BACnet/IP, Modbus, ...). We send it requests and it answers each one
//! with a response carrying the same sequence number.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::points::PointValue;

/// Request sent to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub seq: i64,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Gateway response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub request_seq: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

// === Request Arguments ===

/// `connect` request arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectArguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u32>,
}

/// `read` request arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadArguments {
    pub point: String,
}

/// `write` request arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteArguments {
    pub point: String,
    pub value: PointValue,
}

// === Response Bodies ===

/// `read` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub value: PointValue,
}

/// `connect` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub point_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_arguments() {
        let request = RequestMessage {
            seq: 4,
            command: "disconnect".to_string(),
            arguments: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"seq":4,"command":"disconnect"}"#
        );
    }

    #[test]
    fn test_connect_arguments_are_camel_case() {
        let args = ConnectArguments {
            network_address: Some("10.0.0.5/24".to_string()),
            device_address: None,
            device_id: Some(1001),
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["networkAddress"], "10.0.0.5/24");
        assert_eq!(json["deviceId"], 1001);
        assert!(json.get("deviceAddress").is_none());
    }

    #[test]
    fn test_failed_response_parses() {
        let response: ResponseMessage = serde_json::from_str(
            r#"{"request_seq":2,"success":false,"message":"unknown object"}"#,
        )
        .unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("unknown object"));
        assert!(response.body.is_none());
    }
}
