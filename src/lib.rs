//! Synheart Pixel - client-side event telemetry agent
//!
//! The pixel observes a page session and reports what happens on it to a
//! relay endpoint: pageview, focus, blur, unload, clicks on identified
//! elements, outbound links and scroll depth.
//!
//! Every record carries a durable pseudonymous device id, page and UTM context
//! and screen geometry. Delivery is fire-and-forget; nothing the agent does can
//! fail the host page.
//!
//! ## Modules
//!
//! - **Agent**: Wires the pieces together and exposes one handler per page occurrence
//! - **Identity**: Durable device id with fallbacks for restricted hosts
//! - **Payload**: Builds [`EventRecord`]s from page state at call time
//! - **Delivery**: Relay requests, bootstrap script handoff, diagnostics
//! - **Signals**: Translate page occurrences into emissions
//! - **Replay**: Drive an agent from a recorded session

pub mod agent;
pub mod config;
pub mod delivery;
pub mod error;
pub mod host;
pub mod identity;
pub mod payload;
pub mod replay;
pub mod signals;
pub mod transport;
pub mod types;

pub use agent::PixelAgent;
pub use config::{AgentConfig, ResolvedConfig};
pub use error::{PixelError, StorageError, TransportError};
pub use host::{Capabilities, PageHost, PersistentStore, RandomSource, ScriptSink};
pub use transport::{MemoryTransport, Transport};
pub use types::{ClickTarget, DeviceId, EventDetail, EventRecord, EventSignal};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

// Replay exports
pub use replay::{run_session, ReplayAdapter, ReplayRecord};

/// Pixel version embedded in every record
pub const PIXEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent name reported by the CLI
pub const AGENT_NAME: &str = "synheart-pixel";
