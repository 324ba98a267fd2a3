//! Remote decision endpoint over JSON-RPC.

use super::{ApprovalRequest, ApprovalResponse, DecisionEndpoint};
use crate::{Error, Result};
use rpc::HttpClient;
use std::time::Duration;

/// JSON-RPC method answering approval requests.
pub const APPROVE_METHOD: &str = "firewall_approve";

/// A decision service reached over HTTP.
///
/// Requests are sent as `firewall_approve` with the approval request as the
/// single positional parameter.
#[derive(Debug)]
pub struct HttpEndpoint {
    client: HttpClient,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new(url),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }
}

impl DecisionEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        self.client.url()
    }

    async fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse> {
        self.client
            .request(APPROVE_METHOD, [request])
            .await
            .map_err(endpoint_error)
    }
}

fn endpoint_error(err: rpc::Error) -> Error {
    if err.is_transport() {
        Error::Transport(err.to_string())
    } else {
        Error::Endpoint(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{Address, TransactionRequest};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut buf).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            transaction: TransactionRequest::new(Address([1; 20]), Address([2; 20])),
            policy_address: Some(Address([3; 20])),
        }
    }

    #[tokio::test]
    async fn decodes_denial() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"approved":false,
            "rejectionReason":"firewall rejected: nope"}}"#;
        let url = serve_once("200 OK", body).await;
        let response = HttpEndpoint::new(url).approve(&request()).await.unwrap();
        assert!(!response.approved);
        assert_eq!(response.rejection_reason.as_deref(), Some("firewall rejected: nope"));
    }

    #[tokio::test]
    async fn unavailable_service_is_transport() {
        let url = serve_once("502 Bad Gateway", "").await;
        let err = HttpEndpoint::new(url).approve(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_decision_is_not_retryable() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"approved":"yes"}}"#;
        let url = serve_once("200 OK", body).await;
        let err = HttpEndpoint::new(url).approve(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Endpoint(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn json_rpc_error_is_not_retryable() {
        let url = serve_once(
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid params"}}"#,
        )
        .await;
        let err = HttpEndpoint::new(url).approve(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Endpoint(_)));
        assert!(!err.is_retryable());
    }
}
