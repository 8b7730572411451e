//! Pixel data types
//!
//! This module defines the event records that flow from the signal emitters to
//! the delivery channel, plus the page measurements and click targets the host
//! reports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Pseudonymous identifier for one browser profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named kind of occurrence being reported
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSignal {
    Pageview,
    Click,
    Outlink,
    PageFocus,
    PageBlur,
    PageUnload,
    ScrollDepth,
    /// Signals emitted by host integrations outside the built-in set
    #[serde(untagged)]
    Custom(String),
}

impl EventSignal {
    pub fn as_str(&self) -> &str {
        match self {
            EventSignal::Pageview => "pageview",
            EventSignal::Click => "click",
            EventSignal::Outlink => "outlink",
            EventSignal::PageFocus => "page_focus",
            EventSignal::PageBlur => "page_blur",
            EventSignal::PageUnload => "page_unload",
            EventSignal::ScrollDepth => "scroll_depth",
            EventSignal::Custom(name) => name.as_str(),
        }
    }

    /// An empty signal name cannot produce a record
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl From<&str> for EventSignal {
    fn from(name: &str) -> Self {
        match name {
            "pageview" => EventSignal::Pageview,
            "click" => EventSignal::Click,
            "outlink" => EventSignal::Outlink,
            "page_focus" => EventSignal::PageFocus,
            "page_blur" => EventSignal::PageBlur,
            "page_unload" => EventSignal::PageUnload,
            "scroll_depth" => EventSignal::ScrollDepth,
            other => EventSignal::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EventSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied detail attached to an emission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDetail {
    pub custom_properties: Map<String, Value>,
    pub outlink_url: Option<String>,
}

impl EventDetail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom property, replacing any previous value under `key`
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.custom_properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_outlink_url(mut self, url: impl Into<String>) -> Self {
        self.outlink_url = Some(url.into());
        self
    }
}

/// A signal plus detail, produced by an emitter and not yet built into a record
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub signal: EventSignal,
    pub detail: EventDetail,
}

impl Emission {
    pub fn new(signal: EventSignal) -> Self {
        Self {
            signal,
            detail: EventDetail::default(),
        }
    }

    pub fn with_detail(signal: EventSignal, detail: EventDetail) -> Self {
        Self { signal, detail }
    }
}

/// Screen and viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenMetrics {
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Height measurements the document exposes; the largest one wins
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentHeights {
    pub body_scroll_height: f64,
    pub body_offset_height: f64,
    pub root_client_height: f64,
    pub root_scroll_height: f64,
    pub root_offset_height: f64,
}

impl DocumentHeights {
    /// Uniform heights, for pages where every measurement agrees
    pub fn uniform(height: f64) -> Self {
        Self {
            body_scroll_height: height,
            body_offset_height: height,
            root_client_height: height,
            root_scroll_height: height,
            root_offset_height: height,
        }
    }

    pub fn max(&self) -> f64 {
        [
            self.body_scroll_height,
            self.body_offset_height,
            self.root_client_height,
            self.root_scroll_height,
            self.root_offset_height,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

/// Scroll position at the moment of evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    #[serde(default)]
    pub document: DocumentHeights,
}

impl ScrollMetrics {
    /// Percent of the document seen so far, rounded.
    ///
    /// IEEE division semantics apply: a zero-height document with a visible
    /// viewport is infinitely scrolled, and `0 / 0` is NaN, which reaches no
    /// threshold.
    pub fn percent_scrolled(&self) -> f64 {
        ((self.scroll_top + self.viewport_height) / self.document.max() * 100.0).round()
    }
}

/// The element a click landed on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    #[serde(default)]
    pub id: String,
    pub tag_name: String,
    #[serde(default)]
    pub text_content: Option<String>,
}

/// The nearest anchor enclosing the clicked element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub href: String,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

/// Click target as reported by the host.
///
/// `element` is `None` when the click landed on something that is not an
/// element (a text node, the document itself); such clicks are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    #[serde(default)]
    pub element: Option<ElementInfo>,
    #[serde(default)]
    pub link: Option<LinkInfo>,
}

/// Campaign parameters read from the page query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

/// One telemetry record, serialized as the relay's `options` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub device_id: DeviceId,
    /// RFC 3339 with millisecond precision
    pub pixel_timestamp: String,
    pub event_signal: EventSignal,
    pub page_url: String,
    pub page_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_referrer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlink_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pixel_version: String,
}
