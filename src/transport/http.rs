//! HTTP transport backed by reqwest on a tokio runtime

use super::{Completion, RelayReply, RelayRequest, Transport};
use crate::error::TransportError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const USER_AGENT: &str = concat!("synheart-pixel/", env!("CARGO_PKG_VERSION"));

/// Posts relay requests from spawned tasks.
///
/// Keepalive requests are detached and run to completion even after the
/// transport is dropped. Other requests are tied to the transport's lifetime
/// and aborted when it goes away, the way a page teardown cancels plain fetches.
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: Handle,
    in_flight: Mutex<Vec<InFlight>>,
}

struct InFlight {
    keepalive: bool,
    handle: JoinHandle<()>,
}

impl HttpTransport {
    pub fn new(runtime: Handle) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self::with_client(client, runtime)
    }

    pub fn with_client(client: reqwest::Client, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Wait for every in-flight request, keepalive or not, up to `timeout`
    pub async fn drain(&self, timeout: Duration) {
        let pending: Vec<InFlight> = match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        let _ = tokio::time::timeout(timeout, async {
            for task in pending {
                let _ = task.handle.await;
            }
        })
        .await;
    }
}

impl Transport for HttpTransport {
    fn dispatch(&self, request: RelayRequest, completion: Completion) {
        let body = match request.body() {
            Ok(body) => body,
            Err(e) => {
                completion(Err(TransportError::Task(e.to_string())));
                return;
            }
        };

        let pending = self
            .client
            .post(request.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, RelayRequest::CONTENT_TYPE)
            .body(body);

        let handle = self.runtime.spawn(async move {
            let outcome = match pending.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.ok().filter(|b| !b.is_empty());
                    Ok(RelayReply { status, body })
                }
                Err(e) => Err(TransportError::Network(e.to_string())),
            };
            completion(outcome);
        });

        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.retain(|task| !task.handle.is_finished());
            in_flight.push(InFlight {
                keepalive: request.keepalive,
                handle,
            });
        }
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Ok(in_flight) = self.in_flight.get_mut() {
            for task in in_flight.drain(..).filter(|task| !task.keepalive) {
                task.handle.abort();
            }
        }
    }
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use super::*;
    use crate::transport::{RelayEnvelope, RequestKind};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use url::Url;

    /// Accept one connection, report the raw request, answer after `delay`
    async fn relay_once(delay: Duration, body: &'static str) -> (Url, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = seen_tx.send(request);

            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        (Url::parse(&format!("http://{}/collect", addr)).unwrap(), seen_rx)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn transport() -> HttpTransport {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpTransport::with_client(client, Handle::current())
    }

    fn request(endpoint: Url, keepalive: bool) -> RelayRequest {
        RelayRequest {
            kind: RequestKind::Track,
            endpoint,
            envelope: RelayEnvelope {
                api_key: "key-1".to_string(),
                options: "{\"eventSignal\":\"pageview\"}".to_string(),
            },
            keepalive,
        }
    }

    fn completion() -> (Completion, oneshot::Receiver<Result<RelayReply, TransportError>>) {
        let (tx, rx) = oneshot::channel();
        let completion: Completion = Box::new(move |outcome: Result<RelayReply, TransportError>| {
            let _ = tx.send(outcome);
        });
        (completion, rx)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_posts_json_envelope() {
        let (endpoint, seen) = relay_once(Duration::ZERO, r#"{"script": "initPixel();"}"#).await;
        let transport = transport();
        let (done, outcome) = completion();

        transport.dispatch(request(endpoint, false), done);
        transport.drain(Duration::from_secs(5)).await;

        let raw = seen.await.unwrap();
        assert!(raw.starts_with("POST /collect"));
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(raw.ends_with(r#"{"apiKey":"key-1","options":"{\"eventSignal\":\"pageview\"}"}"#));

        let reply = outcome.await.unwrap().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.script().as_deref(), Some("initPixel();"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keepalive_request_outlives_transport() {
        let (endpoint, _seen) = relay_once(Duration::from_millis(200), "{}").await;
        let transport = transport();
        let (done, outcome) = completion();

        transport.dispatch(request(endpoint, true), done);
        drop(transport);

        let reply = tokio::time::timeout(Duration::from_secs(5), outcome)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply.status, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_plain_request_is_aborted_with_transport() {
        let (endpoint, _seen) = relay_once(Duration::from_millis(500), "{}").await;
        let transport = transport();
        let (done, outcome) = completion();

        transport.dispatch(request(endpoint, false), done);
        drop(transport);

        // The aborted task drops its completion without calling it
        let result = tokio::time::timeout(Duration::from_secs(5), outcome).await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_relay_reports_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = transport();
        let (done, outcome) = completion();
        let endpoint = Url::parse(&format!("http://{}/collect", addr)).unwrap();

        transport.dispatch(request(endpoint, false), done);
        transport.drain(Duration::from_secs(5)).await;

        assert!(matches!(outcome.await.unwrap(), Err(TransportError::Network(_))));
    }
}
