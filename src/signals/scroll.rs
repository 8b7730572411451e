//! Scroll-depth emitter
//!
//! Raw scroll notifications are debounced: each one pushes the pending
//! evaluation 100ms into the future, and only the last one in a burst is
//! evaluated. Evaluation fires every unfired threshold at or below the current
//! scroll percentage, in ascending order.

use super::SessionState;
use crate::types::{Emission, EventDetail, EventSignal, ScrollMetrics};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Quiet period after the last scroll before depth is evaluated
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(100);

/// Depth thresholds in percent, ascending
pub const SCROLL_THRESHOLDS: [u32; 4] = [25, 50, 75, 100];

/// Fired flag per threshold; flags only ever go from false to true
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollThresholdSet {
    fired: [bool; SCROLL_THRESHOLDS.len()],
}

impl ScrollThresholdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fired(&self, threshold: u32) -> bool {
        SCROLL_THRESHOLDS
            .iter()
            .position(|&t| t == threshold)
            .is_some_and(|i| self.fired[i])
    }

    /// Mark every unfired threshold at or below `percent` and return them, ascending
    pub fn fire_up_to(&mut self, percent: f64) -> Vec<u32> {
        let mut newly_fired = Vec::new();
        for (i, &threshold) in SCROLL_THRESHOLDS.iter().enumerate() {
            if percent >= f64::from(threshold) && !self.fired[i] {
                self.fired[i] = true;
                newly_fired.push(threshold);
            }
        }
        newly_fired
    }
}

/// Owned trailing-debounce timer
#[derive(Debug, Clone, Default)]
pub struct Debounce {
    deadline: Option<Instant>,
}

impl Debounce {
    /// Cancel any pending deadline and schedule a new one `delay` after `now`
    pub fn trigger(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline if it has passed
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Consume the deadline regardless of time
    pub fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Debounced scroll-depth evaluation
#[derive(Debug, Clone)]
pub struct ScrollEmitter {
    timer: Debounce,
    delay: Duration,
}

impl Default for ScrollEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollEmitter {
    pub fn new() -> Self {
        Self::with_delay(SCROLL_DEBOUNCE)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            timer: Debounce::default(),
            delay,
        }
    }

    /// Record a raw scroll notification
    pub fn on_scroll(&mut self, now: Instant) {
        self.timer.trigger(now, self.delay);
    }

    /// When the pending evaluation is due, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Evaluate if the debounce period has elapsed
    pub fn poll(&mut self, now: Instant, state: &mut SessionState, metrics: ScrollMetrics) -> Vec<Emission> {
        if !self.timer.fire_if_due(now) {
            return Vec::new();
        }
        evaluate(state, metrics)
    }

    /// Evaluate a pending scroll immediately, e.g. when the page is going away
    pub fn flush(&mut self, state: &mut SessionState, metrics: ScrollMetrics) -> Vec<Emission> {
        if !self.timer.take() {
            return Vec::new();
        }
        evaluate(state, metrics)
    }
}

/// One depth evaluation against the current scroll position
pub fn evaluate(state: &mut SessionState, metrics: ScrollMetrics) -> Vec<Emission> {
    let percent = metrics.percent_scrolled();

    state
        .scroll_thresholds
        .fire_up_to(percent)
        .into_iter()
        .map(|depth| {
            let detail = EventDetail::new()
                .with_property("scrollDepth", depth)
                .with_property("scrollPercent", percent_value(percent));
            Emission::with_detail(EventSignal::ScrollDepth, detail)
        })
        .collect()
}

/// Whole-number percent; a non-finite percent has no JSON number and is sent as null
fn percent_value(percent: f64) -> Value {
    if percent.is_finite() {
        Value::from(percent as i64)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentHeights;

    fn metrics(scroll_top: f64, viewport_height: f64, document_height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            viewport_height,
            document: DocumentHeights::uniform(document_height),
        }
    }

    fn depths(emissions: &[Emission]) -> Vec<u64> {
        emissions
            .iter()
            .map(|e| e.detail.custom_properties["scrollDepth"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_eighty_percent_fires_three_thresholds() {
        let mut state = SessionState::new();

        let emissions = evaluate(&mut state, metrics(0.0, 800.0, 1000.0));
        assert_eq!(depths(&emissions), vec![25, 50, 75]);
        for emission in &emissions {
            assert_eq!(emission.signal, EventSignal::ScrollDepth);
            assert_eq!(emission.detail.custom_properties["scrollPercent"], 80);
        }

        let emissions = evaluate(&mut state, metrics(200.0, 800.0, 1000.0));
        assert_eq!(depths(&emissions), vec![100]);
        assert_eq!(emissions[0].detail.custom_properties["scrollPercent"], 100);
    }

    #[test]
    fn test_thresholds_never_fire_twice() {
        let mut state = SessionState::new();
        evaluate(&mut state, metrics(200.0, 800.0, 1000.0));

        assert!(evaluate(&mut state, metrics(200.0, 800.0, 1000.0)).is_empty());
        assert!(evaluate(&mut state, metrics(0.0, 300.0, 1000.0)).is_empty());
        for threshold in SCROLL_THRESHOLDS {
            assert!(state.scroll_thresholds.is_fired(threshold));
        }
    }

    #[test]
    fn test_scroll_to_bottom_fires_all_in_order() {
        let mut state = SessionState::new();
        let emissions = evaluate(&mut state, metrics(4200.0, 800.0, 5000.0));
        assert_eq!(depths(&emissions), vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_thresholds_are_independent() {
        let mut thresholds = ScrollThresholdSet::new();
        thresholds.fired[1] = true;

        assert_eq!(thresholds.fire_up_to(60.0), vec![25]);
        assert_eq!(thresholds.fire_up_to(100.0), vec![75, 100]);
        assert!(!thresholds.is_fired(33));
    }

    #[test]
    fn test_zero_height_document_counts_as_fully_scrolled() {
        let mut state = SessionState::new();
        let emissions = evaluate(&mut state, metrics(0.0, 800.0, 0.0));

        assert_eq!(depths(&emissions), vec![25, 50, 75, 100]);
        assert!(emissions[0].detail.custom_properties["scrollPercent"].is_null());
    }

    #[test]
    fn test_empty_page_without_viewport_fires_nothing() {
        let mut state = SessionState::new();
        assert!(evaluate(&mut state, metrics(0.0, 0.0, 0.0)).is_empty());
        assert!(state.scroll_thresholds.fire_up_to(f64::NAN).is_empty());
    }

    #[test]
    fn test_debounce_waits_for_quiet_period() {
        let start = Instant::now();
        let mut emitter = ScrollEmitter::new();
        let mut state = SessionState::new();
        let bottom = metrics(200.0, 800.0, 1000.0);

        emitter.on_scroll(start);
        assert!(emitter.poll(start + Duration::from_millis(99), &mut state, bottom).is_empty());

        let emissions = emitter.poll(start + Duration::from_millis(100), &mut state, bottom);
        assert_eq!(depths(&emissions), vec![25, 50, 75, 100]);
        assert!(emitter.next_deadline().is_none());
    }

    #[test]
    fn test_new_scroll_resets_pending_timer() {
        let start = Instant::now();
        let mut emitter = ScrollEmitter::new();
        let mut state = SessionState::new();
        let half = metrics(0.0, 500.0, 1000.0);

        emitter.on_scroll(start);
        emitter.on_scroll(start + Duration::from_millis(80));
        assert_eq!(
            emitter.next_deadline(),
            Some(start + Duration::from_millis(180))
        );

        assert!(emitter.poll(start + Duration::from_millis(150), &mut state, half).is_empty());
        let emissions = emitter.poll(start + Duration::from_millis(180), &mut state, half);
        assert_eq!(depths(&emissions), vec![25, 50]);

        // The burst produced exactly one evaluation
        assert!(emitter.poll(start + Duration::from_millis(400), &mut state, half).is_empty());
    }

    #[test]
    fn test_flush_evaluates_pending_scroll() {
        let start = Instant::now();
        let mut emitter = ScrollEmitter::new();
        let mut state = SessionState::new();

        assert!(emitter.flush(&mut state, metrics(0.0, 300.0, 1000.0)).is_empty());

        emitter.on_scroll(start);
        let emissions = emitter.flush(&mut state, metrics(0.0, 300.0, 1000.0));
        assert_eq!(depths(&emissions), vec![25]);
    }
}
