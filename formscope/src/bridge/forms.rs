//! Buffer of captured definition forms.

use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use formscope_common::{FormEvent, FormKey};

use crate::bridge::lock;

/// At most one [`FormEvent`] per `(namespace, symbol_name, phase)`; a later
/// capture for the same key replaces the earlier one.
#[derive(Debug)]
pub struct FormBridge {
    buffer: Mutex<BTreeMap<FormKey, FormEvent>>,
    enabled: AtomicBool,
}

impl Default for FormBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FormBridge {
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Mutex::new(BTreeMap::new()), enabled: AtomicBool::new(true) }
    }

    /// Store `event`, replacing any event with the same key.
    ///
    /// Returns false if the bridge is disabled or the event names no symbol.
    pub fn capture(&self, event: FormEvent) -> bool {
        if !self.is_enabled() || event.symbol_name.is_empty() {
            return false;
        }
        lock(&self.buffer).insert(event.key(), event);
        true
    }

    /// Remove and return every buffered event, ordered by key.
    pub fn drain(&self) -> Vec<FormEvent> {
        let taken = mem::take(&mut *lock(&self.buffer));
        taken.into_values().collect()
    }

    /// Copy of every buffered event, ordered by key. The buffer is untouched.
    pub fn peek(&self) -> Vec<FormEvent> {
        lock(&self.buffer).values().cloned().collect()
    }

    pub fn get(&self, key: &FormKey) -> Option<FormEvent> {
        lock(&self.buffer).get(key).cloned()
    }

    pub fn clear(&self) {
        lock(&self.buffer).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.buffer).is_empty()
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
    use formscope_common::{DefKind, Form, Phase};
    use std::sync::Arc;
    use std::thread;

    fn event(ns: &str, name: &str, phase: Phase, line: u32) -> FormEvent {
        FormEvent {
            phase,
            kind: DefKind::Def,
            namespace: ns.to_string(),
            symbol_name: name.to_string(),
            line: Some(line),
            end_line: None,
            payload: Form::list(vec![Form::symbol("def"), Form::symbol(name)]),
        }
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let bridge = FormBridge::new();
        bridge.capture(event("app", "x", Phase::Raw, 1));
        bridge.capture(event("app", "x", Phase::Raw, 9));
        bridge.capture(event("app", "x", Phase::Expanded, 2));

        let events = bridge.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, Phase::Raw);
        assert_eq!(events[0].line, Some(9));
        assert!(bridge.is_empty());
    }

    #[test]
    fn test_drain_then_drain_is_empty() {
        let bridge = FormBridge::new();
        bridge.capture(event("app", "x", Phase::Raw, 1));
        assert_eq!(bridge.drain().len(), 1);
        assert!(bridge.drain().is_empty());
    }

    #[test]
    fn test_peek_keeps_contents() {
        let bridge = FormBridge::new();
        bridge.capture(event("app", "x", Phase::Raw, 1));
        assert_eq!(bridge.peek().len(), 1);
        assert_eq!(bridge.len(), 1);
    }

    #[test]
    fn test_disabled_bridge_ignores_writes() {
        let bridge = FormBridge::new();
        bridge.set_enabled(false);
        assert!(!bridge.capture(event("app", "x", Phase::Raw, 1)));
        assert!(bridge.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let bridge = Arc::new(FormBridge::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    for i in 0..50 {
                        bridge.capture(event("app", &format!("f{t}_{i}"), Phase::Raw, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bridge.len(), 400);
    }
}
