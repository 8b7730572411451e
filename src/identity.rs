//! Device identity resolution
//!
//! Resolves the pseudonymous device identifier, persisting it when storage and
//! a strong generator are available and degrading through weaker fallbacks
//! otherwise. Resolution never fails.

use crate::config::STORAGE_KEY;
use crate::delivery::Diagnostics;
use crate::host::{Capabilities, Clock, PersistentStore, RandomSource, WeakRandom};
use crate::types::DeviceId;
use std::sync::Arc;

/// Prefix of identifiers built from the clock when no entropy exists
const SENTINEL_PREFIX: &str = "fa11bac0-0000-4000-8000-";

/// Prefix of the last-resort identifier
const LAST_RESORT_PREFIX: &str = "unknown-";

/// v4 layout; `x` is any hex digit, `y` is one of 8, 9, a, b
const UUID_TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx";

/// Resolves and caches the device identifier
pub struct IdentityStore {
    random: RandomSource,
    storage: Option<Box<dyn PersistentStore>>,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
    /// Identifier resolved earlier in this page load
    resolved: Option<DeviceId>,
}

impl IdentityStore {
    pub fn new(capabilities: Capabilities, diagnostics: Diagnostics) -> Self {
        if matches!(capabilities.random, RandomSource::None | RandomSource::Weak(_)) {
            diagnostics.note("strong random generator not available for device id generation");
        }
        if capabilities.storage.is_none() {
            diagnostics.note("persistent storage not available for storing device id");
        }

        Self {
            random: capabilities.random,
            storage: capabilities.storage,
            clock: capabilities.clock,
            diagnostics,
            resolved: None,
        }
    }

    /// Resolve the device identifier.
    ///
    /// Storage is consulted on every call so an identifier written elsewhere
    /// wins; when storage has nothing, the identifier resolved earlier in this
    /// page load is reused before anything new is generated.
    pub fn resolve(&mut self) -> DeviceId {
        if let Some(stored) = self.read_stored() {
            let id = DeviceId::new(stored);
            self.resolved = Some(id.clone());
            return id;
        }

        if let Some(id) = &self.resolved {
            return id.clone();
        }

        let generated = self.generate();
        let id = if generated.is_empty() {
            self.diagnostics
                .note("failed to generate or retrieve a device id");
            DeviceId::new(format!(
                "{}{}",
                LAST_RESORT_PREFIX,
                self.clock.now().timestamp_millis()
            ))
        } else {
            DeviceId::new(generated)
        };

        self.resolved = Some(id.clone());
        id
    }

    fn read_stored(&self) -> Option<String> {
        let storage = self.storage.as_ref()?;
        match storage.get(STORAGE_KEY) {
            Ok(value) => value.filter(|id| !id.is_empty()),
            Err(e) => {
                self.diagnostics.report("could not read device id from storage", &e);
                None
            }
        }
    }

    /// Produce a fresh identifier with the best entropy available.
    ///
    /// Only strong identifiers are persisted.
    fn generate(&mut self) -> String {
        match &mut self.random {
            RandomSource::Strong(source) => {
                let id = source.random_uuid();
                if !id.is_empty() {
                    if let Some(storage) = self.storage.as_mut() {
                        if let Err(e) = storage.set(STORAGE_KEY, &id) {
                            self.diagnostics
                                .report("could not persist device id; keeping it in memory", &e);
                        }
                    }
                }
                id
            }
            RandomSource::Weak(source) => template_uuid(source.as_mut()),
            RandomSource::None => sentinel_id(self.clock.now().timestamp_millis()),
        }
    }
}

/// Fill the v4 template from weak random bytes
fn template_uuid(source: &mut dyn WeakRandom) -> String {
    let mut bytes = [0u8; 32];
    source.fill_bytes(&mut bytes);
    let mut nibbles = bytes.iter().map(|b| b & 0x0f);

    UUID_TEMPLATE
        .chars()
        .map(|c| match c {
            'x' => hex_digit(nibbles.next().unwrap_or(0)),
            'y' => hex_digit((nibbles.next().unwrap_or(0) >> 2) & 0x3 | 0x8),
            other => other,
        })
        .collect()
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble & 0x0f), 16).unwrap_or('0')
}

/// Identifier derived from the clock alone; uniqueness is not guaranteed
fn sentinel_id(millis: i64) -> String {
    let hex = format!("{:x}", millis);
    let tail = if hex.len() > 12 {
        &hex[hex.len() - 12..]
    } else {
        hex.as_str()
    };
    format!("{}{:0>12}", SENTINEL_PREFIX, tail)
}
