//! Key-set diff between the indexed snapshot and the current run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Keys added by the current run and keys no longer present upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDiff {
    /// In current but not in previous
    pub added: Vec<String>,
    /// In previous but not in current; these get deleted
    pub stale: Vec<String>,
}

impl IndexDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.stale.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.stale.len()
    }
}

/// Compare the previously indexed key set with the current one.
///
/// Output vectors are sorted so results are stable across runs.
pub fn calculate_diff(previous: &HashSet<String>, current: &HashSet<String>) -> IndexDiff {
    let mut added: Vec<String> = current.difference(previous).cloned().collect();
    let mut stale: Vec<String> = previous.difference(current).cloned().collect();
    added.sort();
    stale.sort();
    IndexDiff { added, stale }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_changes() {
        let prev = keys(&["A1", "B2"]);
        let diff = calculate_diff(&prev, &prev.clone());
        assert!(!diff.has_changes());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_mixed_changes() {
        let diff = calculate_diff(&keys(&["A", "B", "C"]), &keys(&["A", "C", "D"]));
        assert_eq!(diff.added, vec!["D"]);
        assert_eq!(diff.stale, vec!["B"]);
    }

    #[test]
    fn test_empty_to_full() {
        let diff = calculate_diff(&HashSet::new(), &keys(&["B", "A"]));
        assert_eq!(diff.added, vec!["A", "B"]);
        assert!(diff.stale.is_empty());
    }

    #[test]
    fn test_full_to_empty() {
        let diff = calculate_diff(&keys(&["Z"]), &HashSet::new());
        assert!(diff.added.is_empty());
        assert_eq!(diff.stale, vec!["Z"]);
    }
}
