//! Pageview, focus, blur and unload emitters

use super::SessionState;
use crate::types::{Emission, EventSignal};

/// Emitted once when the agent starts
pub fn pageview() -> Emission {
    Emission::new(EventSignal::Pageview)
}

/// Focus is reported even while unloading
pub fn on_focus(_state: &SessionState) -> Option<Emission> {
    Some(Emission::new(EventSignal::PageFocus))
}

/// Blur is dropped once unloading started, so a blur racing the unload
/// does not produce a trailing `page_blur`
pub fn on_blur(state: &SessionState) -> Option<Emission> {
    if state.is_unloading() {
        return None;
    }
    Some(Emission::new(EventSignal::PageBlur))
}

/// Sets the unload flag before producing the emission
pub fn on_unload(state: &mut SessionState) -> Emission {
    state.mark_unloading();
    Emission::new(EventSignal::PageUnload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_before_unload() {
        let state = SessionState::new();
        assert_eq!(on_blur(&state).unwrap().signal, EventSignal::PageBlur);
    }

    #[test]
    fn test_unload_suppresses_later_blur_only() {
        let mut state = SessionState::new();

        let unload = on_unload(&mut state);
        assert_eq!(unload.signal, EventSignal::PageUnload);
        assert!(state.is_unloading());

        assert!(on_blur(&state).is_none());
        assert_eq!(on_focus(&state).unwrap().signal, EventSignal::PageFocus);
    }

    #[test]
    fn test_repeated_unload_still_emits() {
        let mut state = SessionState::new();
        on_unload(&mut state);
        assert_eq!(on_unload(&mut state).signal, EventSignal::PageUnload);
    }
}
