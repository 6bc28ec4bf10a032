//! Debounce raw per-tick match decisions over a short history

use crate::template_matching::MatchResult;
use std::collections::VecDeque;

/// Rolling window of the latest raw best matches.
///
/// Output rule, applied after each push:
/// - the last `threshold` entries share a name: that name
/// - otherwise the most frequent name in the window, ties going to the
///   one seen most recently
///
/// The returned result is the newest window entry carrying the chosen
/// name, so its confidence and location are that entry's.
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    window: VecDeque<MatchResult>,
    capacity: usize,
    threshold: usize,
}

impl StabilityFilter {
    pub fn new(capacity: usize, threshold: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            threshold: threshold.clamp(1, capacity),
        }
    }

    /// Feed one tick's raw result. A tick without a match leaves the
    /// window untouched and yields nothing.
    pub fn push(&mut self, raw: Option<MatchResult>) -> Option<MatchResult> {
        let raw = raw?;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);

        let name = self.stable_name()?;
        self.window.iter().rev().find(|r| r.name == name).cloned()
    }

    fn stable_name(&self) -> Option<String> {
        let newest = self.window.back()?;

        if self.window.len() >= self.threshold
            && self
                .window
                .iter()
                .rev()
                .take(self.threshold)
                .all(|r| r.name == newest.name)
        {
            return Some(newest.name.clone());
        }

        // (name, count, index of last sighting)
        let mut tally: Vec<(&str, usize, usize)> = Vec::new();
        for (idx, r) in self.window.iter().enumerate() {
            match tally.iter_mut().find(|(name, _, _)| *name == r.name) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 = idx;
                }
                None => tally.push((&r.name, 1, idx)),
            }
        }
        tally
            .into_iter()
            .max_by_key(|&(_, count, last_seen)| (count, last_seen))
            .map(|(name, _, _)| name.to_string())
    }

    pub fn names(&self) -> Vec<&str> {
        self.window.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template_matching::MatchMethod;

    fn raw(name: &str, confidence: f32) -> Option<MatchResult> {
        Some(MatchResult {
            name: name.to_string(),
            confidence,
            location: (0, 0),
            method: MatchMethod::Template,
        })
    }

    fn stable_name(filter: &mut StabilityFilter, name: &str) -> Option<String> {
        filter.push(raw(name, 0.9)).map(|r| r.name)
    }

    #[test]
    fn test_first_entry_passes_through() {
        let mut filter = StabilityFilter::new(3, 2);
        assert_eq!(stable_name(&mut filter, "A").as_deref(), Some("A"));
    }

    #[test]
    fn test_repeated_tail_wins() {
        let mut filter = StabilityFilter::new(3, 2);
        stable_name(&mut filter, "A");
        stable_name(&mut filter, "B");
        // window A,B,B: tail of two identical names
        assert_eq!(stable_name(&mut filter, "B").as_deref(), Some("B"));
    }

    #[test]
    fn test_alternating_uses_most_frequent() {
        let mut filter = StabilityFilter::new(3, 2);
        stable_name(&mut filter, "A");
        stable_name(&mut filter, "B");
        assert_eq!(stable_name(&mut filter, "A").as_deref(), Some("A"));
        // window B,A,B after eviction
        assert_eq!(stable_name(&mut filter, "B").as_deref(), Some("B"));
    }

    #[test]
    fn test_frequency_tie_goes_to_most_recent() {
        let mut filter = StabilityFilter::new(2, 2);
        stable_name(&mut filter, "A");
        // A,B: no identical tail, one each, B seen last
        assert_eq!(stable_name(&mut filter, "B").as_deref(), Some("B"));
    }

    #[test]
    fn test_minority_raw_value_is_overridden() {
        let mut filter = StabilityFilter::new(3, 2);
        stable_name(&mut filter, "A");
        stable_name(&mut filter, "A");
        let out = filter.push(raw("B", 0.99)).unwrap();
        assert_eq!(out.name, "A");
    }

    #[test]
    fn test_output_carries_newest_entry_for_name() {
        let mut filter = StabilityFilter::new(3, 2);
        filter.push(raw("A", 0.81));
        let out = filter.push(raw("A", 0.93)).unwrap();
        assert_eq!(out.confidence, 0.93);
    }

    #[test]
    fn test_no_match_does_not_touch_window() {
        let mut filter = StabilityFilter::new(3, 2);
        filter.push(raw("A", 0.9));
        assert!(filter.push(None).is_none());
        assert_eq!(filter.names(), vec!["A"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut filter = StabilityFilter::new(3, 2);
        for name in ["A", "B", "C", "D"] {
            filter.push(raw(name, 0.9));
        }
        assert_eq!(filter.names(), vec!["B", "C", "D"]);
        filter.clear();
        assert!(filter.is_empty());
    }
}
