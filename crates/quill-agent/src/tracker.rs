//! Per-turn tool activity indicators.
//!
//! Each announced tool call gets its own indicator keyed by call id, so
//! interleaved calls resolve independently: `tool_call A, tool_call B,
//! tool_result A, tool_result B` leaves both indicators completed. A call
//! without an id gets an unkeyed indicator that no result can resolve; it is
//! swept on the next thinking transition instead.

use std::collections::HashMap;

/// Lifecycle of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Working,
    Done,
}

/// One visible tool-activity indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    pub label: String,
    pub state: IndicatorState,
}

/// Human-readable labels for a tool's working and completed states.
fn labels_for(tool_name: &str) -> (&'static str, &'static str) {
    match tool_name {
        "search_notes" => ("Searching the notes", "Search completed"),
        "create_note" => ("Creating a note", "Note created"),
        "update_note" => ("Updating the note", "Note updated"),
        "delete_note" => ("Deleting the note", "Note deleted"),
        _ => ("Working", "Done"),
    }
}

/// Tracks tool indicators for one conversational turn.
#[derive(Debug, Default)]
pub struct ToolTracker {
    /// Indicators in announcement order.
    entries: Vec<Indicator>,
    /// call_id → index into `entries`.
    keyed: HashMap<String, usize>,
    /// Index of the current unkeyed indicator, if any.
    unkeyed: Option<usize>,
}

impl ToolTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announced tool call. Idempotent per call id.
    pub fn start(&mut self, call_id: Option<&str>, tool_name: &str) {
        let (working, _) = labels_for(tool_name);
        match call_id {
            Some(id) => {
                if self.keyed.contains_key(id) {
                    return;
                }
                self.entries.push(Indicator {
                    label: working.to_string(),
                    state: IndicatorState::Working,
                });
                self.keyed.insert(id.to_string(), self.entries.len() - 1);
            }
            None => {
                // Replace any previous unkeyed indicator rather than stacking.
                if let Some(idx) = self.unkeyed {
                    self.entries[idx] = Indicator {
                        label: working.to_string(),
                        state: IndicatorState::Working,
                    };
                } else {
                    self.entries.push(Indicator {
                        label: working.to_string(),
                        state: IndicatorState::Working,
                    });
                    self.unkeyed = Some(self.entries.len() - 1);
                }
            }
        }
    }

    /// Record a completed tool call. Idempotent; unknown ids are ignored.
    pub fn finish(&mut self, call_id: Option<&str>, tool_name: &str) {
        let Some(id) = call_id else {
            // Results never resolve unkeyed indicators.
            return;
        };
        if let Some(&idx) = self.keyed.get(id) {
            let (_, done) = labels_for(tool_name);
            let entry = &mut self.entries[idx];
            if entry.state == IndicatorState::Working {
                entry.label = done.to_string();
                entry.state = IndicatorState::Done;
            }
        }
    }

    /// Sweep the unkeyed indicator on a thinking transition.
    pub fn sweep_unkeyed(&mut self) {
        if let Some(idx) = self.unkeyed.take() {
            self.entries.remove(idx);
            // Reindex keyed entries that followed the removed one.
            for v in self.keyed.values_mut() {
                if *v > idx {
                    *v -= 1;
                }
            }
        }
    }

    /// Indicators in announcement order.
    pub fn indicators(&self) -> &[Indicator] {
        &self.entries
    }

    /// Whether any indicator is still working.
    pub fn has_pending(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.state == IndicatorState::Working)
    }

    /// Drop all indicators (turn teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keyed.clear();
        self.unkeyed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_calls_resolve_independently() {
        let mut tracker = ToolTracker::new();
        tracker.start(Some("a"), "search_notes");
        tracker.start(Some("b"), "create_note");
        tracker.finish(Some("a"), "search_notes");
        tracker.finish(Some("b"), "create_note");

        let indicators = tracker.indicators();
        assert_eq!(indicators.len(), 2);
        assert!(indicators.iter().all(|i| i.state == IndicatorState::Done));
        assert_eq!(indicators[0].label, "Search completed");
        assert_eq!(indicators[1].label, "Note created");
    }

    #[test]
    fn test_out_of_order_results() {
        let mut tracker = ToolTracker::new();
        tracker.start(Some("a"), "search_notes");
        tracker.start(Some("b"), "search_notes");
        tracker.finish(Some("b"), "search_notes");

        let indicators = tracker.indicators();
        assert_eq!(indicators[0].state, IndicatorState::Working);
        assert_eq!(indicators[1].state, IndicatorState::Done);
    }

    #[test]
    fn test_start_is_idempotent_per_call_id() {
        let mut tracker = ToolTracker::new();
        tracker.start(Some("a"), "search_notes");
        tracker.start(Some("a"), "search_notes");
        assert_eq!(tracker.indicators().len(), 1);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut tracker = ToolTracker::new();
        tracker.start(Some("a"), "search_notes");
        tracker.finish(Some("a"), "search_notes");
        tracker.finish(Some("a"), "search_notes");
        assert_eq!(tracker.indicators().len(), 1);
        assert_eq!(tracker.indicators()[0].state, IndicatorState::Done);
    }

    #[test]
    fn test_unknown_result_is_ignored() {
        let mut tracker = ToolTracker::new();
        tracker.finish(Some("ghost"), "search_notes");
        assert!(tracker.indicators().is_empty());
    }

    #[test]
    fn test_unkeyed_call_is_never_resolved_by_results() {
        let mut tracker = ToolTracker::new();
        tracker.start(None, "search_notes");
        tracker.finish(None, "search_notes");
        assert_eq!(tracker.indicators()[0].state, IndicatorState::Working);
    }

    #[test]
    fn test_unkeyed_replaced_not_stacked() {
        let mut tracker = ToolTracker::new();
        tracker.start(None, "search_notes");
        tracker.start(None, "create_note");
        assert_eq!(tracker.indicators().len(), 1);
        assert_eq!(tracker.indicators()[0].label, "Creating a note");
    }

    #[test]
    fn test_sweep_unkeyed_keeps_keyed_indices_valid() {
        let mut tracker = ToolTracker::new();
        tracker.start(None, "search_notes");
        tracker.start(Some("a"), "create_note");
        tracker.sweep_unkeyed();
        tracker.finish(Some("a"), "create_note");

        assert_eq!(tracker.indicators().len(), 1);
        assert_eq!(tracker.indicators()[0].label, "Note created");
    }

    #[test]
    fn test_has_pending() {
        let mut tracker = ToolTracker::new();
        assert!(!tracker.has_pending());
        tracker.start(Some("a"), "search_notes");
        assert!(tracker.has_pending());
        tracker.finish(Some("a"), "search_notes");
        assert!(!tracker.has_pending());
    }
}
