//! Event payload construction
//!
//! Builds one [`EventRecord`] per emission from the page state at the moment
//! of the call. Nothing about the page is cached between records.

use crate::host::{Clock, PageHost};
use crate::identity::IdentityStore;
use crate::types::{EventDetail, EventRecord, EventSignal, UtmParams};
use crate::PIXEL_VERSION;
use chrono::SecondsFormat;
use std::sync::Arc;
use url::Url;

/// Assembles event records from page state and caller detail
pub struct PayloadBuilder {
    clock: Arc<dyn Clock>,
}

impl PayloadBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build a record, or `None` when `signal` is empty.
    ///
    /// The only side effect is resolving the device identifier.
    pub fn build<P: PageHost + ?Sized>(
        &self,
        page: &P,
        identity: &mut IdentityStore,
        signal: impl Into<EventSignal>,
        detail: EventDetail,
    ) -> Option<EventRecord> {
        let signal = signal.into();
        if signal.is_empty() {
            return None;
        }

        let device_id = identity.resolve();
        let location = page.location();
        let utm = extract_utm(location);
        let screen = page.screen();
        let referrer = page.referrer();

        let EventDetail {
            custom_properties,
            outlink_url,
        } = detail;

        Some(EventRecord {
            device_id,
            pixel_timestamp: self
                .clock
                .now()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            event_signal: signal,
            page_url: location.to_string(),
            page_title: page.title().to_string(),
            event_referrer_url: non_empty(referrer),
            outlink_url,
            custom_properties: Some(custom_properties).filter(|props| !props.is_empty()),
            utm_source: utm.source,
            utm_medium: utm.medium,
            utm_campaign: utm.campaign,
            utm_term: utm.term,
            utm_content: utm.content,
            screen_width: screen.screen_width,
            screen_height: screen.screen_height,
            viewport_width: screen.viewport_width,
            viewport_height: screen.viewport_height,
            pixel_version: PIXEL_VERSION.to_string(),
        })
    }
}

/// Campaign parameters from the query string; empty values count as absent
pub fn extract_utm(location: &Url) -> UtmParams {
    let param = |name: &str| {
        location
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    };

    UtmParams {
        source: param("utm_source"),
        medium: param("utm_medium"),
        campaign: param("utm_campaign"),
        term: param("utm_term"),
        content: param("utm_content"),
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
