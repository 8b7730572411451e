//! Signal emitters
//!
//! Emitters translate raw page occurrences into [`Emission`]s. They hold no
//! reference to the payload builder or the delivery channel; the agent turns
//! their output into records and sends them.
//!
//! Shared emitter state lives in [`SessionState`], owned by the agent:
//!
//! - the unload flag, set once the page starts unloading
//! - the scroll threshold set, one fired flag per depth
//!
//! [`Emission`]: crate::types::Emission

pub mod click;
pub mod lifecycle;
pub mod scroll;

pub use scroll::{ScrollEmitter, ScrollThresholdSet, SCROLL_DEBOUNCE, SCROLL_THRESHOLDS};

/// Mutable state shared by the emitters for one page lifetime
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    unloading: bool,
    pub scroll_thresholds: ScrollThresholdSet,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unloading(&self) -> bool {
        self.unloading
    }

    /// The flag never goes back to false for the page's lifetime
    pub fn mark_unloading(&mut self) {
        self.unloading = true;
    }
}

/// Page events the host must forward to a started agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    /// Document-level click
    Click,
    /// Window focus
    Focus,
    /// Window blur
    Blur,
    /// Window `beforeunload`
    BeforeUnload,
    /// Window scroll
    Scroll,
}

impl Listener {
    pub const ALL: [Listener; 5] = [
        Listener::Click,
        Listener::Focus,
        Listener::Blur,
        Listener::BeforeUnload,
        Listener::Scroll,
    ];

    /// DOM event name to bind
    pub fn event_name(&self) -> &'static str {
        match self {
            Listener::Click => "click",
            Listener::Focus => "focus",
            Listener::Blur => "blur",
            Listener::BeforeUnload => "beforeunload",
            Listener::Scroll => "scroll",
        }
    }
}
