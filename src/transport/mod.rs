//! Relay transport
//!
//! A transport accepts relay requests and completes them asynchronously. The
//! delivery channel never waits on a transport: `dispatch` returns at once and
//! the outcome arrives through the completion callback, possibly on another
//! thread.

mod memory;

#[cfg(feature = "http")]
mod http;

pub use memory::MemoryTransport;

#[cfg(feature = "http")]
pub use http::HttpTransport;

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Outcome callback for a dispatched request
pub type Completion = Box<dyn FnOnce(Result<RelayReply, TransportError>) + Send + 'static>;

/// Sends relay requests without blocking the caller
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: RelayRequest, completion: Completion);
}

/// Distinguishes tracking deliveries from the one-time bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Track,
    Bootstrap,
}

/// JSON body posted to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub api_key: String,
    /// Encoded inner payload; the relay decodes it before forwarding
    pub options: String,
}

/// One POST to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub kind: RequestKind,
    pub endpoint: Url,
    pub envelope: RelayEnvelope,
    /// Whether the request may outlive the page that issued it
    pub keepalive: bool,
}

impl RelayRequest {
    pub const CONTENT_TYPE: &'static str = "application/json";

    /// Serialized request body
    pub fn body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.envelope)
    }
}

/// What came back from the relay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReply {
    pub status: u16,
    pub body: Option<String>,
}

impl RelayReply {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    pub fn with_body(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: Some(body.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Script fragment to inject, if the body carries a non-empty `script`.
    ///
    /// Missing or malformed bodies count as empty.
    pub fn script(&self) -> Option<String> {
        let body = self.body.as_deref()?;
        let reply: BootstrapReply = serde_json::from_str(body).ok()?;
        reply.script.filter(|script| !script.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct BootstrapReply {
    #[serde(default)]
    script: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_script_extraction() {
        let reply = RelayReply::with_body(200, r#"{"script": "window.px = 1;"}"#);
        assert_eq!(reply.script().as_deref(), Some("window.px = 1;"));
    }

    #[test]
    fn test_reply_without_script() {
        assert!(RelayReply::ok().script().is_none());
        assert!(RelayReply::with_body(200, "").script().is_none());
        assert!(RelayReply::with_body(200, "<html>").script().is_none());
        assert!(RelayReply::with_body(200, r#"{"script": ""}"#).script().is_none());
        assert!(RelayReply::with_body(200, r#"{"other": 1}"#).script().is_none());
        assert!(RelayReply::with_body(200, r#"{"script": 42}"#).script().is_none());
    }

    #[test]
    fn test_envelope_wire_names() {
        let request = RelayRequest {
            kind: RequestKind::Track,
            endpoint: Url::parse("https://relay.example.com").unwrap(),
            envelope: RelayEnvelope {
                api_key: "key".to_string(),
                options: "{}".to_string(),
            },
            keepalive: true,
        };

        let body: serde_json::Value = serde_json::from_str(&request.body().unwrap()).unwrap();
        assert_eq!(body["apiKey"], "key");
        assert_eq!(body["options"], "{}");
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_success_range() {
        assert!(RelayReply::ok().is_success());
        assert!(RelayReply::with_body(204, "").is_success());
        assert!(!RelayReply::with_body(500, "").is_success());
    }
}
