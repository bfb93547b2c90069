//! Process-wide capture session
//!
//! Owns the three bridges, the self-test state and the optional live feed.
//! The instrumentation writes into [`Session::global`]; tests and embedders
//! can run an isolated session with [`Session::new`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::debug;

use formscope_common::{FormEvent, FormKey, ReferenceEdge, UnitRecord};

use crate::bridge::{lock, FormBridge, ReferenceBridge, UnitBridge};
use crate::detector;
use crate::domain::DetectError;
use crate::host::Host;
use crate::selftest::SelfTest;

/// Lightweight notification pushed to a live subscriber after each capture.
///
/// Carries keys only; the full record stays in its bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureNotice {
    Form(FormKey),
    Reference(ReferenceEdge),
    Unit(String),
}

static GLOBAL_SESSION: OnceLock<Arc<Session>> = OnceLock::new();

#[derive(Debug, Default)]
pub struct Session {
    forms: FormBridge,
    references: ReferenceBridge,
    units: UnitBridge,
    self_test: SelfTest,
    /// Set while a subscriber is attached, to skip the feed lock otherwise
    subscribed: AtomicBool,
    feed: Mutex<Option<Sender<CaptureNotice>>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The session shared by every interception point in this process.
    pub fn global() -> Arc<Session> {
        Arc::clone(GLOBAL_SESSION.get_or_init(|| Arc::new(Session::new())))
    }

    pub fn forms(&self) -> &FormBridge {
        &self.forms
    }

    pub fn references(&self) -> &ReferenceBridge {
        &self.references
    }

    pub fn units(&self) -> &UnitBridge {
        &self.units
    }

    pub fn self_test(&self) -> &SelfTest {
        &self.self_test
    }

    // ------------------------------------------------------------------------
    // Forms
    // ------------------------------------------------------------------------

    pub fn capture_form_event(&self, event: FormEvent) {
        let key = event.key();
        if self.forms.capture(event) {
            self.notify(CaptureNotice::Form(key));
        }
    }

    /// Remove and return every buffered form event.
    pub fn drain_form_events(&self) -> Vec<FormEvent> {
        self.forms.drain()
    }

    pub fn peek_form_events(&self) -> Vec<FormEvent> {
        self.forms.peek()
    }

    pub fn clear_form_events(&self) {
        self.forms.clear();
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    pub fn capture_reference_edge(&self, callee: &str, caller: Option<&str>) {
        if self.references.capture(callee, caller) {
            self.notify(CaptureNotice::Reference(ReferenceEdge {
                callee: callee.to_string(),
                caller: caller.map(str::to_string),
            }));
        }
    }

    /// Snapshot of callee → callers.
    pub fn reference_edges(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.references.caller_map()
    }

    pub fn clear_reference_edges(&self) {
        self.references.clear();
    }

    // ------------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------------

    pub fn capture_loaded_unit(&self, internal_name: &str, bytes: &[u8]) {
        if let Some(record) = self.units.capture(internal_name, bytes) {
            self.notify(CaptureNotice::Unit(record.name));
        }
    }

    pub fn loaded_units(&self) -> Vec<UnitRecord> {
        self.units.units()
    }

    pub fn clear_loaded_units(&self) {
        self.units.clear();
    }

    // ------------------------------------------------------------------------
    // Session-wide
    // ------------------------------------------------------------------------

    /// Defined symbols of `namespaces` never seen as a reference target.
    ///
    /// # Errors
    /// Returns [`DetectError`] if a namespace cannot be enumerated.
    pub fn find_unused_symbols(
        &self,
        host: &dyn Host,
        namespaces: &[&str],
    ) -> Result<BTreeSet<String>, DetectError> {
        self.self_test.ensure_tested(host);
        detector::find_unused_symbols(host, &self.references, namespaces)
    }

    pub fn is_healthy(&self) -> bool {
        self.self_test.is_healthy()
    }

    pub fn set_forms_enabled(&self, enabled: bool) {
        self.forms.set_enabled(enabled);
    }

    pub fn set_references_enabled(&self, enabled: bool) {
        self.references.set_enabled(enabled);
    }

    pub fn set_units_enabled(&self, enabled: bool) {
        self.units.set_enabled(enabled);
    }

    pub fn clear_all(&self) {
        self.clear_form_events();
        self.clear_reference_edges();
        self.clear_loaded_units();
    }

    // ------------------------------------------------------------------------
    // Live feed
    // ------------------------------------------------------------------------

    /// Attach a live subscriber, replacing any previous one.
    ///
    /// Notices are sent with `try_send`: when the channel is full the notice
    /// is dropped, never the compiling thread blocked.
    pub fn subscribe(&self, capacity: usize) -> Receiver<CaptureNotice> {
        let (tx, rx) = bounded(capacity);
        *lock(&self.feed) = Some(tx);
        self.subscribed.store(true, Ordering::Release);
        rx
    }

    pub fn unsubscribe(&self) {
        self.subscribed.store(false, Ordering::Release);
        *lock(&self.feed) = None;
    }

    fn notify(&self, notice: CaptureNotice) {
        if !self.subscribed.load(Ordering::Acquire) {
            return;
        }
        let mut feed = lock(&self.feed);
        let Some(tx) = feed.as_ref() else {
            return;
        };
        match tx.try_send(notice) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                debug!("Live feed subscriber went away, detaching");
                *feed = None;
                self.subscribed.store(false, Ordering::Release);
            }
        }
    }
}
