//! Intent score table.
//!
//! Maps intent text to per-tool scores learned from execution feedback:
//! - Success adds 1.0
//! - Failure subtracts 0.5, floored at zero
//!
//! Optionally bounded: when more than `max_intents` intents are held, the one updated
//! least recently is forgotten.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::tools::ToolId;

/// Score gained by a successful execution
pub const SUCCESS_REWARD: f64 = 1.0;

/// Score lost by a failed execution
pub const FAILURE_PENALTY: f64 = 0.5;

#[derive(Debug, Default)]
struct IntentScores {
    scores: HashMap<ToolId, f64>,
    /// Logical clock value of the last update
    touched: u64,
}

/// Intent -> tool -> score, mutated only through `record`
#[derive(Debug, Default)]
pub struct IntentScoreTable {
    intents: HashMap<String, IntentScores>,
    max_intents: Option<usize>,
    clock: u64,
}

impl IntentScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of remembered intents
    pub fn with_max_intents(mut self, max_intents: Option<usize>) -> Self {
        self.max_intents = max_intents.filter(|m| *m > 0);
        self
    }

    /// Apply one piece of feedback and return the new score
    pub fn record(&mut self, intent: &str, tool_id: &str, success: bool) -> f64 {
        self.clock += 1;
        let touched = self.clock;

        let entry = self.intents.entry(intent.to_string()).or_default();
        entry.touched = touched;
        let score = entry.scores.entry(tool_id.to_string()).or_insert(0.0);
        *score = if success {
            *score + SUCCESS_REWARD
        } else {
            (*score - FAILURE_PENALTY).max(0.0)
        };
        let updated = *score;

        self.evict_over_capacity();
        updated
    }

    fn evict_over_capacity(&mut self) {
        let Some(max) = self.max_intents else {
            return;
        };
        while self.intents.len() > max {
            let oldest = self
                .intents
                .iter()
                .min_by_key(|(_, scores)| scores.touched)
                .map(|(intent, _)| intent.clone());
            match oldest {
                Some(intent) => {
                    tracing::debug!(intent = %intent, "Evicting least recently updated intent");
                    self.intents.remove(&intent);
                }
                None => break,
            }
        }
    }

    /// Positive scores for an intent, best first. `None` if the intent is unknown.
    ///
    /// Equal scores are ordered by tool id so the result is deterministic.
    pub fn ranked(&self, intent: &str) -> Option<Vec<(ToolId, f64)>> {
        let entry = self.intents.get(intent)?;
        let mut ranked: Vec<(ToolId, f64)> = entry
            .scores
            .iter()
            .filter(|(_, score)| **score > 0.0)
            .map(|(id, score)| (id.clone(), *score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        Some(ranked)
    }

    pub fn score(&self, intent: &str, tool_id: &str) -> Option<f64> {
        self.intents.get(intent)?.scores.get(tool_id).copied()
    }

    /// Known intents, sorted
    pub fn known_intents(&self) -> Vec<String> {
        let mut intents: Vec<String> = self.intents.keys().cloned().collect();
        intents.sort();
        intents
    }

    pub fn contains(&self, intent: &str) -> bool {
        self.intents.contains_key(intent)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_accumulates() {
        let mut table = IntentScoreTable::new();
        assert_eq!(table.record("send email", "t1", true), 1.0);
        assert_eq!(table.record("send email", "t1", true), 2.0);
        assert_eq!(table.record("send email", "t1", true), 3.0);
        assert_eq!(table.record("send email", "t1", false), 2.5);
        assert_eq!(table.score("send email", "t1"), Some(2.5));
    }

    #[test]
    fn test_failure_floors_at_zero() {
        let mut table = IntentScoreTable::new();
        assert_eq!(table.record("x", "t1", false), 0.0);
        table.record("x", "t1", true);
        assert_eq!(table.record("x", "t1", false), 0.5);
        assert_eq!(table.record("x", "t1", false), 0.0);
        assert_eq!(table.record("x", "t1", false), 0.0);
    }

    #[test]
    fn test_ranked_excludes_zero_and_sorts() {
        let mut table = IntentScoreTable::new();
        table.record("x", "low", true);
        table.record("x", "high", true);
        table.record("x", "high", true);
        table.record("x", "zero", false);

        let ranked = table.ranked("x").unwrap();
        assert_eq!(ranked, vec![("high".to_string(), 2.0), ("low".to_string(), 1.0)]);
        assert!(table.ranked("unknown").is_none());
        // Intent with only zero scores is still known
        table.record("y", "t", false);
        assert_eq!(table.ranked("y"), Some(vec![]));
    }

    #[test]
    fn test_ranked_ties_by_id() {
        let mut table = IntentScoreTable::new();
        table.record("x", "b", true);
        table.record("x", "a", true);
        let ids: Vec<String> = table.ranked("x").unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_known_intents_sorted() {
        let mut table = IntentScoreTable::new();
        table.record("zeta", "t", true);
        table.record("alpha", "t", true);
        assert_eq!(table.known_intents(), vec!["alpha", "zeta"]);
        assert_eq!(table.len(), 2);
        assert!(table.contains("alpha"));
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut table = IntentScoreTable::new();
        for i in 0..100 {
            table.record(&format!("intent {}", i), "t", true);
        }
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn test_max_intents_evicts_least_recently_updated() {
        let mut table = IntentScoreTable::new().with_max_intents(Some(2));
        table.record("first", "t", true);
        table.record("second", "t", true);
        // Touch "first" so "second" becomes the oldest
        table.record("first", "t", true);
        table.record("third", "t", true);

        assert_eq!(table.len(), 2);
        assert!(table.contains("first"));
        assert!(table.contains("third"));
        assert!(!table.contains("second"));
    }
}
