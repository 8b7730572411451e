//! Delivery channel
//!
//! Wraps event records and the bootstrap bundle into relay envelopes and hands
//! them to the transport. Delivery is best-effort: one attempt, no retry, and
//! every failure ends in the diagnostic sink rather than with the caller.

use crate::config::ResolvedConfig;
use crate::error::TransportError;
use crate::host::ScriptSink;
use crate::transport::{RelayEnvelope, RelayReply, RelayRequest, RequestKind, Transport};
use crate::types::{DeviceId, EventRecord};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use url::Url;

/// URI-component escaping: everything but alphanumerics and `-_.!~*'()`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Diagnostic sink: debug-level tracing when enabled, silent otherwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    enabled: bool,
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn silent() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn note(&self, message: &str) {
        if self.enabled {
            tracing::debug!(target: "synheart_pixel", "{}", message);
        }
    }

    pub fn report(&self, context: &str, error: &dyn Display) {
        if self.enabled {
            tracing::debug!(target: "synheart_pixel", error = %error, "{}", context);
        }
    }
}

/// Bundle submitted once per page load
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapOptions<'a> {
    device_id: &'a str,
    tracking_id: &'a str,
}

/// Sends records and the bootstrap call through a transport
#[derive(Clone)]
pub struct DeliveryChannel {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    api_key: String,
    keepalive: bool,
    diagnostics: Diagnostics,
}

impl DeliveryChannel {
    /// Keepalive delivery is disabled in diagnostic mode so failed requests
    /// stay inspectable.
    pub fn new(config: &ResolvedConfig, transport: Arc<dyn Transport>, diagnostics: Diagnostics) -> Self {
        Self {
            transport,
            endpoint: config.relay_endpoint.clone(),
            api_key: config.api_key.clone(),
            keepalive: !diagnostics.is_enabled(),
            diagnostics,
        }
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    /// Fire-and-forget delivery of one record
    pub fn send(&self, record: &EventRecord) {
        let options = match serde_json::to_string(record) {
            Ok(options) => options,
            Err(e) => {
                self.diagnostics.report("could not serialize tracking record", &e);
                return;
            }
        };

        let request = RelayRequest {
            kind: RequestKind::Track,
            endpoint: self.endpoint.clone(),
            envelope: RelayEnvelope {
                api_key: self.api_key.clone(),
                options,
            },
            keepalive: self.keepalive,
        };

        let diagnostics = self.diagnostics;
        let signal = record.event_signal.to_string();
        self.transport.dispatch(
            request,
            Box::new(move |outcome: Result<RelayReply, TransportError>| match outcome {
                Ok(reply) if reply.is_success() => {}
                Ok(reply) => diagnostics.report(
                    &format!("tracking request for {} failed", signal),
                    &TransportError::Status(reply.status),
                ),
                Err(e) => diagnostics.report("error sending tracking data", &e),
            }),
        );
    }

    /// Submit the device/tracking bundle and inject any script the relay returns.
    ///
    /// The bundle is JSON escaped as a URI component, which is what the relay decodes.
    pub fn bootstrap(&self, device_id: &DeviceId, tracking_id: &str, scripts: Arc<dyn ScriptSink>) {
        let bundle = BootstrapOptions {
            device_id: device_id.as_str(),
            tracking_id,
        };
        let json = match serde_json::to_string(&bundle) {
            Ok(json) => json,
            Err(e) => {
                self.diagnostics.report("could not serialize bootstrap bundle", &e);
                return;
            }
        };
        let options = utf8_percent_encode(&json, URI_COMPONENT).to_string();

        let request = RelayRequest {
            kind: RequestKind::Bootstrap,
            endpoint: self.endpoint.clone(),
            envelope: RelayEnvelope {
                api_key: self.api_key.clone(),
                options,
            },
            keepalive: false,
        };

        let diagnostics = self.diagnostics;
        self.transport.dispatch(
            request,
            Box::new(move |outcome: Result<RelayReply, TransportError>| match outcome {
                Ok(reply) => handle_bootstrap_reply(&reply, scripts.as_ref(), diagnostics),
                Err(e) => diagnostics.report("error loading pixel via relay", &e),
            }),
        );
        self.diagnostics.note(&format!("bootstrap submitted for device {}", device_id));
    }
}

fn handle_bootstrap_reply(reply: &RelayReply, scripts: &dyn ScriptSink, diagnostics: Diagnostics) {
    if !reply.is_success() {
        diagnostics.report("bootstrap request failed", &TransportError::Status(reply.status));
    }
    if let Some(script) = reply.script() {
        scripts.inject(&script);
    }
}

/// Decode a bootstrap `options` payload back into JSON
pub fn decode_bootstrap_options(options: &str) -> Option<serde_json::Value> {
    let decoded = percent_decode_str(options).decode_utf8().ok()?;
    serde_json::from_str(&decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::host::ScriptLog;
    use crate::transport::MemoryTransport;
    use crate::types::EventSignal;
    use pretty_assertions::assert_eq;

    fn resolved() -> ResolvedConfig {
        AgentConfig::new("https://collect.example.com/t/abc123", "api-key-1")
            .with_relay_endpoint("https://relay.example.com/collect")
            .resolve()
            .unwrap()
    }

    fn record() -> EventRecord {
        EventRecord {
            device_id: DeviceId::new("device-1"),
            pixel_timestamp: "2024-01-15T14:00:00.000Z".to_string(),
            event_signal: EventSignal::Pageview,
            page_url: "https://shop.example.com/".to_string(),
            page_title: "Shop".to_string(),
            event_referrer_url: None,
            outlink_url: None,
            custom_properties: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            utm_term: None,
            utm_content: None,
            screen_width: 1920,
            screen_height: 1080,
            viewport_width: 1280,
            viewport_height: 800,
            pixel_version: "4.1.4".to_string(),
        }
    }

    #[test]
    fn test_send_wraps_record_in_envelope() {
        let transport = MemoryTransport::new();
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::silent());

        channel.send(&record());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.kind, RequestKind::Track);
        assert_eq!(request.endpoint.as_str(), "https://relay.example.com/collect");
        assert_eq!(request.envelope.api_key, "api-key-1");
        assert!(request.keepalive);

        let decoded: EventRecord = serde_json::from_str(&request.envelope.options).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn test_diagnostic_mode_disables_keepalive() {
        let transport = MemoryTransport::new();
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::new(true));

        channel.send(&record());

        assert!(!channel.keepalive());
        assert!(!transport.requests()[0].keepalive);
    }

    #[test]
    fn test_send_swallows_network_failure() {
        let transport = MemoryTransport::new().failing("connection reset");
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::new(true));

        channel.send(&record());
        channel.send(&record());

        // One attempt per record, no retry
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_send_swallows_non_ok_status() {
        let transport = MemoryTransport::new().with_track_reply(RelayReply::with_body(503, "busy"));
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::silent());

        channel.send(&record());
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_bootstrap_injects_returned_script() {
        let transport = MemoryTransport::new()
            .with_bootstrap_reply(RelayReply::with_body(200, r#"{"script": "window.pixel = true;"}"#));
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::silent());
        let scripts = ScriptLog::new();

        channel.bootstrap(&DeviceId::new("device-1"), "abc123", Arc::new(scripts.clone()));

        assert_eq!(scripts.scripts(), vec!["window.pixel = true;".to_string()]);
        let requests = transport.bootstrap_requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].keepalive);
    }

    #[test]
    fn test_bootstrap_options_are_percent_encoded_json() {
        let transport = MemoryTransport::new();
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::silent());

        channel.bootstrap(&DeviceId::new("device-1"), "abc123", Arc::new(ScriptLog::new()));

        let options = &transport.bootstrap_requests()[0].envelope.options;
        assert!(options.starts_with("%7B%22deviceId%22"));
        let decoded = decode_bootstrap_options(options).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({ "deviceId": "device-1", "trackingId": "abc123" })
        );
    }

    #[test]
    fn test_bootstrap_options_escape_spaces_as_uri_component() {
        let transport = MemoryTransport::new();
        let config = AgentConfig::new("https://collect.example.com/t/abc def", "api-key-1")
            .resolve()
            .unwrap();
        let channel = DeliveryChannel::new(&config, Arc::new(transport.clone()), Diagnostics::silent());

        channel.bootstrap(&DeviceId::new("dev 1"), &config.tracking_id, Arc::new(ScriptLog::new()));

        let options = &transport.bootstrap_requests()[0].envelope.options;
        assert_eq!(
            options,
            "%7B%22deviceId%22%3A%22dev%201%22%2C%22trackingId%22%3A%22abc%20def%22%7D"
        );
        assert!(!options.contains('+'));
        let decoded = decode_bootstrap_options(options).unwrap();
        assert_eq!(decoded["deviceId"], "dev 1");
        assert_eq!(decoded["trackingId"], "abc def");
    }

    #[test]
    fn test_bootstrap_options_keep_unreserved_marks() {
        let transport = MemoryTransport::new();
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::silent());

        channel.bootstrap(&DeviceId::new("a-b_c.d!e~f*g'h(i)"), "abc123", Arc::new(ScriptLog::new()));

        let options = &transport.bootstrap_requests()[0].envelope.options;
        assert!(options.contains("a-b_c.d!e~f*g'h(i)"));
    }

    #[test]
    fn test_bootstrap_without_script_injects_nothing() {
        for reply in [
            RelayReply::ok(),
            RelayReply::with_body(200, "not json"),
            RelayReply::with_body(500, r#"{"error": "bad key"}"#),
        ] {
            let transport = MemoryTransport::new().with_bootstrap_reply(reply);
            let channel = DeliveryChannel::new(&resolved(), Arc::new(transport), Diagnostics::silent());
            let scripts = ScriptLog::new();

            channel.bootstrap(&DeviceId::new("device-1"), "abc123", Arc::new(scripts.clone()));
            assert!(scripts.scripts().is_empty());
        }
    }

    #[test]
    fn test_bootstrap_network_failure_is_swallowed() {
        let transport = MemoryTransport::new().failing("dns failure");
        let channel = DeliveryChannel::new(&resolved(), Arc::new(transport.clone()), Diagnostics::new(true));
        let scripts = ScriptLog::new();

        channel.bootstrap(&DeviceId::new("device-1"), "abc123", Arc::new(scripts.clone()));

        assert_eq!(transport.bootstrap_requests().len(), 1);
        assert!(scripts.scripts().is_empty());
    }
}
