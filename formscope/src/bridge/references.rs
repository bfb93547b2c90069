//! Buffer of symbolic reference edges.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use formscope_common::ReferenceEdge;

use crate::bridge::lock;

/// Callee → set of callers. A callee with an empty caller set was referenced
/// only from top-level or anonymous sites.
#[derive(Debug)]
pub struct ReferenceBridge {
    callers: Mutex<BTreeMap<String, BTreeSet<String>>>,
    enabled: AtomicBool,
}

impl Default for ReferenceBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceBridge {
    #[must_use]
    pub fn new() -> Self {
        Self { callers: Mutex::new(BTreeMap::new()), enabled: AtomicBool::new(true) }
    }

    /// Record that `callee` is referenced, from `caller` when known.
    ///
    /// Returns false if the bridge is disabled or `callee` is empty.
    pub fn capture(&self, callee: &str, caller: Option<&str>) -> bool {
        if !self.is_enabled() || callee.is_empty() {
            return false;
        }
        let mut callers = lock(&self.callers);
        let entry = callers.entry(callee.to_string()).or_default();
        if let Some(caller) = caller.filter(|c| !c.is_empty()) {
            entry.insert(caller.to_string());
        }
        true
    }

    /// Snapshot of the callee → callers map.
    pub fn caller_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        lock(&self.callers).clone()
    }

    /// Every callee referenced at least once.
    pub fn references(&self) -> BTreeSet<String> {
        lock(&self.callers).keys().cloned().collect()
    }

    /// Flattened edges; a callee with no known caller yields one edge with
    /// `caller: None`.
    pub fn edges(&self) -> Vec<ReferenceEdge> {
        let callers = lock(&self.callers);
        let mut edges = Vec::with_capacity(callers.len());
        for (callee, set) in callers.iter() {
            if set.is_empty() {
                edges.push(ReferenceEdge { callee: callee.clone(), caller: None });
            }
            edges.extend(
                set.iter()
                    .map(|caller| ReferenceEdge { callee: callee.clone(), caller: Some(caller.clone()) }),
            );
        }
        edges
    }

    /// Number of distinct known callers of `callee`.
    pub fn fan_in(&self, callee: &str) -> usize {
        lock(&self.callers).get(callee).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, callee: &str) -> bool {
        lock(&self.callers).contains_key(callee)
    }

    /// Remove and return the whole map.
    pub fn drain(&self) -> BTreeMap<String, BTreeSet<String>> {
        mem::take(&mut *lock(&self.callers))
    }

    pub fn clear(&self) {
        lock(&self.callers).clear();
    }

    /// Number of distinct callees.
    pub fn len(&self) -> usize {
        lock(&self.callers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.callers).is_empty()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callers_accumulate() {
        let bridge = ReferenceBridge::new();
        bridge.capture("lib/helper", Some("app/b"));
        bridge.capture("lib/helper", Some("app/c"));
        bridge.capture("lib/helper", Some("app/b"));

        assert_eq!(bridge.fan_in("lib/helper"), 2);
        assert_eq!(bridge.len(), 1);
    }

    #[test]
    fn test_top_level_reference_has_empty_caller_set() {
        let bridge = ReferenceBridge::new();
        bridge.capture("app/main", None);

        let map = bridge.caller_map();
        assert!(map["app/main"].is_empty());
        assert_eq!(
            bridge.edges(),
            vec![ReferenceEdge { callee: "app/main".to_string(), caller: None }]
        );
    }

    #[test]
    fn test_empty_callee_ignored() {
        let bridge = ReferenceBridge::new();
        assert!(!bridge.capture("", Some("app/a")));
        assert!(bridge.is_empty());
    }

    #[test]
    fn test_drain_empties() {
        let bridge = ReferenceBridge::new();
        bridge.capture("app/b", Some("app/a"));
        let drained = bridge.drain();
        assert!(drained.contains_key("app/b"));
        assert!(bridge.is_empty());
        assert!(bridge.references().is_empty());
    }
}
