//! Per statement execution history

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Value returned by the run
    Result(Value),
    /// Error message of the run
    Error(String),
}

/// One run of a statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementRun {
    /// When the run settled
    pub timestamp: DateTime<Utc>,

    /// Whether the run succeeded
    pub success: bool,

    /// Query that was sent
    pub query: Value,

    /// Result or error
    pub outcome: RunOutcome,
}

/// Runs of a statement
///
/// Runs issued concurrently are all recorded, in settlement order. Entries
/// are only ever appended until [`StatementHistory::clear`] drops them.
#[derive(Debug, Default)]
pub struct StatementHistory {
    runs: Mutex<Vec<StatementRun>>,
}

impl StatementHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StatementRun>> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, run: StatementRun) {
        self.lock().push(run);
    }

    /// Record a successful run
    pub fn record_success(&self, query: Value, result: Value) {
        self.push(StatementRun {
            timestamp: Utc::now(),
            success: true,
            query,
            outcome: RunOutcome::Result(result),
        });
    }

    /// Record a failed run
    pub fn record_failure(&self, query: Value, error: impl ToString) {
        self.push(StatementRun {
            timestamp: Utc::now(),
            success: false,
            query,
            outcome: RunOutcome::Error(error.to_string()),
        });
    }

    /// Snapshot of every run so far
    pub fn runs(&self) -> Vec<StatementRun> {
        self.lock().clone()
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing ran yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every recorded run
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_records_in_order() {
        let history = StatementHistory::new();
        assert!(history.is_empty());

        history.record_success(json!({ "$table": "posts" }), json!({ "rows": [] }));
        history.record_failure(json!({ "$table": "posts" }), "timeout");

        let runs = history.runs();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].success);
        assert_eq!(runs[1].outcome, RunOutcome::Error("timeout".to_string()));
        assert!(runs[0].timestamp <= runs[1].timestamp);
    }

    #[test]
    fn test_clear() {
        let history = StatementHistory::new();
        history.record_success(json!({ "$table": "posts" }), json!({ "rows": [] }));
        history.record_failure(json!({ "$table": "likes" }), "timeout");
        assert_eq!(history.len(), 2);

        history.clear();
        assert!(history.is_empty());
        assert!(history.runs().is_empty());

        history.record_failure(json!({ "$table": "posts" }), "offline");
        assert_eq!(history.len(), 1);
        assert_eq!(history.runs()[0].outcome, RunOutcome::Error("offline".to_string()));
    }

    #[test]
    fn test_clear_survives_poisoning() {
        let history = Arc::new(StatementHistory::new());
        history.record_success(json!({}), json!(1));

        let poisoner = Arc::clone(&history);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.runs.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_concurrent_appends() {
        let history = Arc::new(StatementHistory::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || history.record_success(json!(i), json!(null)))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(history.len(), 8);
    }
}
