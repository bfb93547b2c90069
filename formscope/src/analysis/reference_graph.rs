//! Fan-in ranking over the callee → callers map.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanIn {
    pub callee: String,
    /// Distinct known callers
    pub callers: usize,
    /// Referenced only from top-level or anonymous sites
    pub top_level_only: bool,
}

/// Callees ordered by caller count, most-referenced first, ties by name.
#[must_use]
pub fn rank_fan_in(callers: &BTreeMap<String, BTreeSet<String>>) -> Vec<FanIn> {
    let mut ranked: Vec<FanIn> = callers
        .iter()
        .map(|(callee, set)| FanIn {
            callee: callee.clone(),
            callers: set.len(),
            top_level_only: set.is_empty(),
        })
        .collect();
    ranked.sort_by_key(|f| Reverse(f.callers));
    ranked
}

/// Callees referenced from `caller`.
#[must_use]
pub fn callees_of(callers: &BTreeMap<String, BTreeSet<String>>, caller: &str) -> BTreeSet<String> {
    callers
        .iter()
        .filter(|(_, set)| set.contains(caller))
        .map(|(callee, _)| callee.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> BTreeMap<String, BTreeSet<String>> {
        let mut map = BTreeMap::new();
        map.insert("lib/helper".to_string(), ["app/b".to_string(), "app/c".to_string()].into());
        map.insert("app/b".to_string(), ["app/a".to_string()].into());
        map.insert("app/main".to_string(), BTreeSet::new());
        map
    }

    #[test]
    fn test_rank_is_stable_by_name() {
        let ranked = rank_fan_in(&graph());
        let order: Vec<_> = ranked.iter().map(|f| f.callee.as_str()).collect();
        assert_eq!(order, vec!["lib/helper", "app/b", "app/main"]);
        assert!(ranked[2].top_level_only);
    }

    #[test]
    fn test_callees_of() {
        assert_eq!(callees_of(&graph(), "app/b"), ["lib/helper".to_string()].into());
        assert!(callees_of(&graph(), "app/main").is_empty());
    }
}
