//! Full capture pipeline against the reference host: installer, all four
//! interception points, bridges and the unused-symbol detector.

use std::collections::BTreeSet;
use std::sync::Arc;

use formscope::config::InstrumentationConfig;
use formscope::bridge::CaptureNotice;
use formscope::instrumentation::depth;
use formscope::sim::SimHost;
use formscope::{Installer, Session};
use formscope_common::{DefKind, Phase};

const LIB: &str = "\
(ns lib.core)
(defn helper [x] (inc x))
(defn unused-helper [] 1)
";

const APP: &str = "\
(ns app.core (:use lib.core))
(def ^:const limit 10)
(defn b [x]
  (helper (+ x limit)))
(defn a [] (b 1))
";

fn instrumented() -> (Arc<SimHost>, Arc<Session>) {
    let host = Arc::new(SimHost::new());
    let session = Arc::new(Session::new());
    let installer = Installer::new(Arc::clone(&session), InstrumentationConfig::default());
    let report = installer.install(&host);
    assert!(report.is_fully_attached());
    assert!(report.healthy);
    (host, session)
}

#[test]
fn test_raw_and_expanded_forms_captured() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str(APP).unwrap();

    let events = session.drain_form_events();
    let keys: Vec<_> = events
        .iter()
        .map(|e| (e.namespace.as_str(), e.symbol_name.as_str(), e.phase))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("app.core", "a", Phase::Raw),
            ("app.core", "a", Phase::Expanded),
            ("app.core", "b", Phase::Raw),
            ("app.core", "b", Phase::Expanded),
            // A plain def expands to itself: RAW only
            ("app.core", "limit", Phase::Raw),
            ("lib.core", "helper", Phase::Raw),
            ("lib.core", "helper", Phase::Expanded),
            ("lib.core", "unused-helper", Phase::Raw),
            ("lib.core", "unused-helper", Phase::Expanded),
        ]
    );

    let b_raw = &events[2];
    assert_eq!(b_raw.kind, DefKind::Defn);
    assert_eq!(b_raw.line, Some(3));
    assert_eq!(b_raw.end_line, Some(4));
    assert_eq!(b_raw.payload.to_string(), "(defn b [x] (helper (+ x limit)))");

    // EXPANDED keeps the RAW identity even though the head is now def
    let b_expanded = &events[3];
    assert_eq!(b_expanded.kind, DefKind::Defn);
    assert_eq!(b_expanded.payload.to_string(), "(def b (fn b [x] (helper (+ x limit))))");

    assert!(session.drain_form_events().is_empty());
    assert_eq!(depth::current(), 0);
}

#[test]
fn test_recompilation_replaces_forms() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str("(ns lib.core)\n\n\n(defn helper [x] (dec x))").unwrap();

    let helper_raw: Vec<_> = session
        .peek_form_events()
        .into_iter()
        .filter(|e| e.symbol_name == "helper" && e.phase == Phase::Raw)
        .collect();
    assert_eq!(helper_raw.len(), 1);
    assert_eq!(helper_raw[0].line, Some(4));
    assert_eq!(helper_raw[0].payload.to_string(), "(defn helper [x] (dec x))");
}

#[test]
fn test_reference_edges_include_inlined_constants() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str(APP).unwrap();

    let edges = session.reference_edges();
    let callers = |callee: &str| -> BTreeSet<&str> {
        edges.get(callee).map(|c| c.iter().map(String::as_str).collect()).unwrap_or_default()
    };

    assert_eq!(callers("lib.core/helper"), BTreeSet::from(["app.core/b"]));
    assert_eq!(callers("app.core/b"), BTreeSet::from(["app.core/a"]));
    // Never constructed as a reference; recovered from symbol analysis
    assert_eq!(callers("app.core/limit"), BTreeSet::from(["app.core/b"]));
    assert_eq!(callers("clojure.core/inc"), BTreeSet::from(["lib.core/helper"]));
    assert!(!edges.contains_key("app.core/a"));
}

#[test]
fn test_top_level_reference_has_no_caller() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str("(ns app.main (:use lib.core))\n(helper 1)").unwrap();

    let edges = session.reference_edges();
    assert_eq!(edges.get("lib.core/helper"), Some(&BTreeSet::new()));

    // A top-level use still counts as a reference
    let unused = session.find_unused_symbols(host.as_ref(), &["lib.core"]).unwrap();
    assert!(!unused.contains("lib.core/helper"));
    assert!(unused.contains("lib.core/unused-helper"));
}

#[test]
fn test_nested_expansions_capture_once() {
    let (host, session) = instrumented();
    let notices = session.subscribe(64);

    host.compile_str("(ns app.core)\n(defn t [x] (when x (-> x inc (+ 1)) (when-not x 0)))")
        .unwrap();

    let forms: Vec<_> = notices
        .try_iter()
        .filter_map(|notice| match notice {
            CaptureNotice::Form(key) => Some((key.symbol_name, key.phase)),
            _ => None,
        })
        .collect();
    assert_eq!(forms, vec![("t".to_string(), Phase::Raw), ("t".to_string(), Phase::Expanded)]);
}

#[test]
fn test_units_captured_from_definition_hook() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str(APP).unwrap();

    let units = session.loaded_units();
    let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["app.core$a", "app.core$b", "lib.core$helper", "lib.core$unused_helper"]);

    let b = &units[1];
    assert!(b.byte_size > 0);
    assert_eq!(b.known_field_count(), Some(2));
    assert!(b.known_instruction_count().unwrap() > 0);
    assert!(b.references.contains("lib.core$helper"));
    assert!(b.references.contains("clojure.core$_PLUS_"));
    assert!(b.references.contains("clojure.lang.AFunction"));
    assert!(!b.references.contains("app.core$b"));
}

#[test]
fn test_find_unused_symbols() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str(APP).unwrap();

    let unused = session.find_unused_symbols(host.as_ref(), &["lib.core", "app.core"]).unwrap();
    assert_eq!(
        unused,
        BTreeSet::from(["app.core/a".to_string(), "lib.core/unused-helper".to_string()])
    );
}

#[test]
fn test_unknown_namespace_fails_detection() {
    let (host, session) = instrumented();
    assert!(session.find_unused_symbols(host.as_ref(), &["no.such.ns"]).is_err());
}

#[test]
fn test_disabled_bridges_capture_nothing() {
    let host = Arc::new(SimHost::new());
    let session = Arc::new(Session::new());
    let config = InstrumentationConfig {
        capture_forms: false,
        capture_references: false,
        ..InstrumentationConfig::default()
    };
    Installer::new(Arc::clone(&session), config).install(&host);

    host.compile_str(LIB).unwrap();
    assert!(session.peek_form_events().is_empty());
    assert!(session.reference_edges().is_empty());
    assert_eq!(session.loaded_units().len(), 2);
    assert_eq!(depth::current(), 0);
}

#[test]
fn test_compilation_on_many_threads() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let host = Arc::clone(&host);
            std::thread::spawn(move || {
                let source = format!("(ns worker{i}.core (:use lib.core))\n(defn run [] (helper {i}))");
                host.compile_str(&source).unwrap();
                depth::current()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }

    let edges = session.reference_edges();
    assert_eq!(edges["lib.core/helper"].len(), 4);
    let raw_runs = session
        .peek_form_events()
        .iter()
        .filter(|e| e.symbol_name == "run" && e.phase == Phase::Raw)
        .count();
    assert_eq!(raw_runs, 4);
}

#[test]
fn test_expansion_never_shrinks_definitions() {
    let (host, session) = instrumented();
    host.compile_str(LIB).unwrap();
    host.compile_str(APP).unwrap();
    host.compile_str("(ns app.more)\n(defn t [x] (-> x inc (+ 1)))").unwrap();

    let summaries = formscope::analysis::summarize_definitions(&session.peek_form_events());
    assert!(!summaries.is_empty());
    for summary in summaries.iter().filter(|s| s.was_expanded()) {
        let raw = summary.raw.as_ref().unwrap();
        let expanded = summary.expanded.as_ref().unwrap();
        assert!(raw.expressions <= expanded.expressions, "{}", summary.qualified_name());
    }
}
