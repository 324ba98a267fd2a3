//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const VERSION: &str = "2.0";

/// An outgoing call. Ids are numeric; this client never sends notifications.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> Request<'a> {
    /// A call to `method`. `null` params are left off the wire.
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: VERSION,
            id,
            method,
            params: (!params.is_null()).then_some(params),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    /// `None` when the server could not parse the request id.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl Response {
    /// The result, or the error object the server sent.
    ///
    /// A missing result reads as `null`; nodes answer `null` for unknown
    /// or pending transactions.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error object of a failed call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// `data` when it is a plain string, as revert payloads usually are.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for JsonRpcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_params_are_omitted() {
        let params = Value::Null;
        let wire = serde_json::to_value(Request::new(7, "eth_chainId", &params)).unwrap();
        assert_eq!(wire, json!({"jsonrpc": "2.0", "id": 7, "method": "eth_chainId"}));

        let params = json!([{"from": "0x01"}]);
        let wire = serde_json::to_value(Request::new(8, "eth_sendTransaction", &params)).unwrap();
        assert_eq!(wire["params"][0]["from"], "0x01");
    }

    #[test]
    fn missing_result_reads_as_null() {
        let resp: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(resp.id, Some(1));
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn error_object() {
        let body = r#"{"jsonrpc":"2.0","id":null,
            "error":{"code":3,"message":"execution reverted","data":"0x08c379a0"}}"#;
        let resp: Response = serde_json::from_str(body).unwrap();
        assert_eq!(resp.id, None);
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.data_str(), Some("0x08c379a0"));
        assert_eq!(err.to_string(), "execution reverted (code 3)");
    }
}
