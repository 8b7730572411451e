//! Host capability abstractions
//!
//! The agent never touches a browser directly. Everything it reads from or
//! writes to the hosting page goes through the traits in this module, resolved
//! once when the agent starts:
//!
//! - [`PageHost`]: location, title, referrer, screen and scroll measurements
//! - [`ScriptSink`]: executes script fragments returned by the relay
//! - [`PersistentStore`]: key/value storage that survives page loads
//! - [`RandomSource`]: strong, weak or absent identifier entropy
//! - [`Clock`]: wall-clock time for timestamps and fallback identifiers
//!
//! Stock implementations cover tests, offline replay and the CLI.

use crate::error::StorageError;
use crate::types::{ScreenMetrics, ScrollMetrics};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

/// Read access to the hosting page, queried at the moment of each emission
pub trait PageHost {
    fn location(&self) -> &Url;
    fn title(&self) -> &str;
    /// Referrer of the current document; empty means none
    fn referrer(&self) -> &str;
    fn screen(&self) -> ScreenMetrics;
    fn scroll(&self) -> ScrollMetrics;
}

/// Receives executable script text returned by the relay's bootstrap reply
pub trait ScriptSink: Send + Sync {
    fn inject(&self, source: &str);
}

/// Key/value storage that outlives the page
pub trait PersistentStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Generator of ready-made random identifiers
pub trait StrongRandom {
    fn random_uuid(&mut self) -> String;
}

/// Source of non-cryptographic random bytes
pub trait WeakRandom {
    fn fill_bytes(&mut self, dest: &mut [u8]);
}

/// Identifier entropy available in the host
pub enum RandomSource {
    Strong(Box<dyn StrongRandom>),
    Weak(Box<dyn WeakRandom>),
    None,
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RandomSource::Strong(_) => f.write_str("RandomSource::Strong"),
            RandomSource::Weak(_) => f.write_str("RandomSource::Weak"),
            RandomSource::None => f.write_str("RandomSource::None"),
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Capabilities handed to the identity store at start-up
pub struct Capabilities {
    pub random: RandomSource,
    pub storage: Option<Box<dyn PersistentStore>>,
    pub clock: Arc<dyn Clock>,
}

impl Capabilities {
    /// Full capability set: strong identifiers, the given store, system time
    pub fn with_store(store: impl PersistentStore + 'static) -> Self {
        Self {
            random: RandomSource::Strong(Box::new(UuidRandom)),
            storage: Some(Box::new(store)),
            clock: Arc::new(SystemClock),
        }
    }

    /// No storage and no entropy; identifiers fall back to the clock
    pub fn minimal() -> Self {
        Self {
            random: RandomSource::None,
            storage: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn random(mut self, random: RandomSource) -> Self {
        self.random = random;
        self
    }

    pub fn storage(mut self, storage: Option<Box<dyn PersistentStore>>) -> Self {
        self.storage = storage;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::with_store(MemoryStore::default())
    }
}

// ============================================================================
// Stock implementations
// ============================================================================

/// Strong identifiers from OS entropy (UUID v4)
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRandom;

impl StrongRandom for UuidRandom {
    fn random_uuid(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Weak random bytes from the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RngRandom;

impl WeakRandom for RngRandom {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand::thread_rng().fill_bytes(dest);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// In-memory store; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one entry, bypassing the trait
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Read(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Write(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object on disk, rewritten on every `set`
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| StorageError::Read(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StorageError::Read(e.to_string()))
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        let json =
            serde_json::to_string_pretty(&entries).map_err(|e| StorageError::Write(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| StorageError::Write(e.to_string()))
    }
}

/// Records injected scripts instead of executing them
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    scripts: Arc<Mutex<Vec<String>>>,
}

impl ScriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts
            .lock()
            .map(|scripts| scripts.clone())
            .unwrap_or_default()
    }
}

impl ScriptSink for ScriptLog {
    fn inject(&self, source: &str) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(source.to_string());
        }
    }
}

/// Owned page state, mutated by the embedder between signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPage {
    pub location: Url,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub screen: ScreenMetrics,
    #[serde(default)]
    pub scroll: ScrollMetrics,
}

impl StaticPage {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            title: String::new(),
            referrer: String::new(),
            screen: ScreenMetrics::default(),
            scroll: ScrollMetrics::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn with_screen(mut self, screen: ScreenMetrics) -> Self {
        self.screen = screen;
        self
    }
}

impl PageHost for StaticPage {
    fn location(&self) -> &Url {
        &self.location
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn referrer(&self) -> &str {
        &self.referrer
    }

    fn screen(&self) -> ScreenMetrics {
        self.screen
    }

    fn scroll(&self) -> ScrollMetrics {
        self.scroll
    }
}
