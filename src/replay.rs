//! Recorded page sessions
//!
//! A replay file lists page occurrences with their offset from page load, one
//! JSON object per line:
//!
//! ```text
//! {"at_ms": 0,    "signal": {"kind": "focus"}}
//! {"at_ms": 1200, "signal": {"kind": "scroll", "scroll_top": 400, "viewport_height": 800, "document": {"root_scroll_height": 2400}}}
//! {"at_ms": 3000, "signal": {"kind": "click", "target": {"element": {"id": "buy", "tag_name": "BUTTON"}}}}
//! {"at_ms": 9000, "signal": {"kind": "unload"}}
//! ```
//!
//! Replaying drives a [`PixelAgent`] over a [`StaticPage`] exactly as a live
//! host would, which makes sessions reproducible offline.

use crate::agent::PixelAgent;
use crate::error::PixelError;
use crate::host::StaticPage;
use crate::types::{ClickTarget, DocumentHeights, EventDetail, ScrollMetrics};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use url::Url;

/// One page occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageSignal {
    Click {
        target: ClickTarget,
    },
    Focus,
    Blur,
    Unload,
    /// Scroll notification carrying the position after the scroll
    Scroll {
        scroll_top: f64,
        viewport_height: f64,
        #[serde(default)]
        document: DocumentHeights,
    },
    /// In-page navigation; no pageview is emitted for it
    Navigate {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
    /// Host-defined signal
    Track {
        name: String,
        #[serde(default)]
        properties: Map<String, Value>,
    },
}

/// A page occurrence and when it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Milliseconds since page load
    pub at_ms: u64,
    pub signal: PageSignal,
}

/// Validation problem for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayIssue {
    pub index: usize,
    pub reason: String,
}

/// Totals from one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub records_replayed: usize,
    pub clicks: usize,
    pub scrolls: usize,
    pub navigations: usize,
    pub unloaded: bool,
}

/// Parser and validator for replay input
pub struct ReplayAdapter;

impl ReplayAdapter {
    /// Parse a JSON array of records
    pub fn parse_array(json: &str) -> Result<Vec<ReplayRecord>, PixelError> {
        serde_json::from_str(json)
            .map_err(|e| PixelError::ReplayParse(format!("Failed to parse record array: {}", e)))
    }

    /// Parse newline-delimited records, skipping blank lines
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<ReplayRecord>, PixelError> {
        let mut records = Vec::new();

        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: ReplayRecord =
                serde_json::from_str(trimmed).map_err(|e| PixelError::InvalidReplayRecord {
                    line: line_num + 1,
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Check ordering and values; returns one issue per offending record
    pub fn validate(records: &[ReplayRecord]) -> Vec<ReplayIssue> {
        let mut issues = Vec::new();
        let mut last_at = 0u64;

        for (index, record) in records.iter().enumerate() {
            if record.at_ms < last_at {
                issues.push(ReplayIssue {
                    index,
                    reason: format!(
                        "at_ms {} is earlier than the previous record ({})",
                        record.at_ms, last_at
                    ),
                });
            }
            last_at = last_at.max(record.at_ms);

            if let Some(reason) = validate_signal(&record.signal) {
                issues.push(ReplayIssue { index, reason });
            }
        }

        issues
    }
}

fn validate_signal(signal: &PageSignal) -> Option<String> {
    match signal {
        PageSignal::Scroll {
            scroll_top,
            viewport_height,
            ..
        } => {
            if !scroll_top.is_finite() || *scroll_top < 0.0 {
                Some(format!("scroll_top must be a non-negative number, got {}", scroll_top))
            } else if !viewport_height.is_finite() || *viewport_height < 0.0 {
                Some(format!(
                    "viewport_height must be a non-negative number, got {}",
                    viewport_height
                ))
            } else {
                None
            }
        }
        PageSignal::Navigate { url: Some(url), .. } => Url::parse(url)
            .err()
            .map(|e| format!("invalid navigation url {}: {}", url, e)),
        PageSignal::Track { name, .. } if name.is_empty() => {
            Some("track signal requires a name".to_string())
        }
        _ => None,
    }
}

/// Drive `agent` through `records`, treating `page_load` as time zero.
///
/// The agent's listeners are registered first, which submits its bootstrap
/// call. Due scroll timers run before each record is applied; a scroll still
/// pending after the last record is evaluated at the end.
pub fn run_session(
    agent: &mut PixelAgent<StaticPage>,
    records: &[ReplayRecord],
    page_load: Instant,
) -> Result<ReplaySummary, PixelError> {
    let mut summary = ReplaySummary::default();
    agent.listen(|listener| tracing::trace!(event = listener.event_name(), "listener bound"));

    for record in records {
        let now = page_load + Duration::from_millis(record.at_ms);
        agent.poll(now);

        match &record.signal {
            PageSignal::Click { target } => {
                summary.clicks += 1;
                agent.on_click(target);
            }
            PageSignal::Focus => agent.on_focus(),
            PageSignal::Blur => agent.on_blur(),
            PageSignal::Unload => {
                summary.unloaded = true;
                agent.on_before_unload();
            }
            PageSignal::Scroll {
                scroll_top,
                viewport_height,
                document,
            } => {
                summary.scrolls += 1;
                agent.page_mut().scroll = ScrollMetrics {
                    scroll_top: *scroll_top,
                    viewport_height: *viewport_height,
                    document: *document,
                };
                agent.on_scroll(now);
            }
            PageSignal::Navigate { url, title } => {
                summary.navigations += 1;
                let page = agent.page_mut();
                if let Some(url) = url {
                    page.location =
                        Url::parse(url).map_err(|e| PixelError::InvalidPageUrl(format!("{}: {}", url, e)))?;
                }
                if let Some(title) = title {
                    page.title = title.clone();
                }
            }
            PageSignal::Track { name, properties } => {
                let detail = EventDetail {
                    custom_properties: properties.clone(),
                    outlink_url: None,
                };
                agent.track(name, detail);
            }
        }

        summary.records_replayed += 1;
    }

    agent.flush();
    Ok(summary)
}
