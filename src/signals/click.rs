//! Click and outbound-link emitters
//!
//! One click can yield both a `click` (the element has an id) and an
//! `outlink` (it sits inside an anchor pointing at another host).

use crate::types::{ClickTarget, ElementInfo, Emission, EventDetail, EventSignal, LinkInfo};
use url::Url;

/// Maximum characters of element or link text carried in a record
pub const MAX_TEXT_CHARS: usize = 100;

/// Translate a click into zero, one or two emissions
pub fn on_click(target: &ClickTarget, location: &Url) -> Vec<Emission> {
    let mut emissions = Vec::new();

    let Some(element) = &target.element else {
        return emissions;
    };

    if let Some(emission) = element_click(element) {
        emissions.push(emission);
    }

    if let Some(link) = &target.link {
        if let Some(emission) = outlink(link, location) {
            emissions.push(emission);
        }
    }

    emissions
}

fn element_click(element: &ElementInfo) -> Option<Emission> {
    if element.id.is_empty() {
        return None;
    }

    let detail = EventDetail::new()
        .with_property("elementId", element.id.as_str())
        .with_property("elementTagName", element.tag_name.to_lowercase())
        .with_property("elementText", trimmed_text(element.text_content.as_deref()));

    Some(Emission::with_detail(EventSignal::Click, detail))
}

fn outlink(link: &LinkInfo, location: &Url) -> Option<Emission> {
    if link.href.is_empty() {
        return None;
    }
    let resolved = location.join(&link.href).ok()?;
    if resolved.host_str() == location.host_str() {
        return None;
    }

    let mut detail = EventDetail::new()
        .with_outlink_url(resolved.as_str())
        .with_property("linkText", trimmed_text(link.text_content.as_deref()));
    if let Some(target) = link.target.as_deref().filter(|t| !t.is_empty()) {
        detail = detail.with_property("linkTarget", target);
    }

    Some(Emission::with_detail(EventSignal::Outlink, detail))
}

/// Trim surrounding whitespace and keep the first [`MAX_TEXT_CHARS`] characters
pub fn trimmed_text(text: Option<&str>) -> String {
    text.unwrap_or_default()
        .trim()
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect()
}
