//! In-memory transport for tests and dry runs

use super::{Completion, RelayReply, RelayRequest, RequestKind, Transport};
use crate::error::TransportError;
use crate::types::EventRecord;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Outcome {
    Reply(RelayReply),
    NetworkFailure(String),
}

/// Records every request and completes it immediately.
///
/// Clones share the recorded requests, so a test can hand one clone to the
/// agent and inspect the other.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    requests: Arc<Mutex<Vec<RelayRequest>>>,
    bootstrap_outcome: Arc<Mutex<Outcome>>,
    track_outcome: Arc<Mutex<Outcome>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Every request succeeds with an empty body
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            bootstrap_outcome: Arc::new(Mutex::new(Outcome::Reply(RelayReply::ok()))),
            track_outcome: Arc::new(Mutex::new(Outcome::Reply(RelayReply::ok()))),
        }
    }

    /// Answer bootstrap requests with `reply`
    pub fn with_bootstrap_reply(self, reply: RelayReply) -> Self {
        if let Ok(mut outcome) = self.bootstrap_outcome.lock() {
            *outcome = Outcome::Reply(reply);
        }
        self
    }

    /// Answer tracking requests with `reply`
    pub fn with_track_reply(self, reply: RelayReply) -> Self {
        if let Ok(mut outcome) = self.track_outcome.lock() {
            *outcome = Outcome::Reply(reply);
        }
        self
    }

    /// Fail every request with a network error
    pub fn failing(self, message: &str) -> Self {
        for slot in [&self.bootstrap_outcome, &self.track_outcome] {
            if let Ok(mut outcome) = slot.lock() {
                *outcome = Outcome::NetworkFailure(message.to_string());
            }
        }
        self
    }

    pub fn requests(&self) -> Vec<RelayRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn bootstrap_requests(&self) -> Vec<RelayRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.kind == RequestKind::Bootstrap)
            .collect()
    }

    /// Tracking records decoded from their `options` payloads
    pub fn records(&self) -> Vec<EventRecord> {
        self.requests()
            .into_iter()
            .filter(|r| r.kind == RequestKind::Track)
            .filter_map(|r| serde_json::from_str(&r.envelope.options).ok())
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn dispatch(&self, request: RelayRequest, completion: Completion) {
        let slot = match request.kind {
            RequestKind::Bootstrap => &self.bootstrap_outcome,
            RequestKind::Track => &self.track_outcome,
        };
        let outcome = slot
            .lock()
            .map(|outcome| outcome.clone())
            .unwrap_or(Outcome::Reply(RelayReply::ok()));

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        match outcome {
            Outcome::Reply(reply) => completion(Ok(reply)),
            Outcome::NetworkFailure(message) => completion(Err(TransportError::Network(message))),
        }
    }
}
