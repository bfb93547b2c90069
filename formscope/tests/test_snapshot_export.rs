use std::sync::Arc;

use formscope::config::InstrumentationConfig;
use formscope::export::SnapshotExporter;
use formscope::sim::SimHost;
use formscope::{Installer, Session};

fn export_json(exporter: &SnapshotExporter) -> serde_json::Value {
    let mut buffer = Vec::new();
    exporter.export(&mut buffer).expect("Failed to export snapshot");
    let text = String::from_utf8(buffer).expect("Invalid UTF-8");
    serde_json::from_str(&text).expect("Invalid JSON")
}

#[test]
fn test_export_session_snapshot() {
    let host = Arc::new(SimHost::new());
    let session = Arc::new(Session::new());
    Installer::new(Arc::clone(&session), InstrumentationConfig::default()).install(&host);
    host.compile_str("(ns app.core)\n(defn f [x] (inc x))\n(defn g [] (f 1))").unwrap();

    let parsed = export_json(&SnapshotExporter::from_session(&session));

    assert_eq!(parsed["healthy"], true);
    let forms = parsed["forms"].as_array().unwrap();
    assert_eq!(forms.len(), 4);
    assert_eq!(forms[0]["symbol_name"], "f");
    assert_eq!(forms[0]["phase"], "raw");
    assert_eq!(forms[0]["form"], "(defn f [x] (inc x))");
    assert_eq!(forms[1]["phase"], "expanded");

    assert_eq!(parsed["references"]["app.core/f"], serde_json::json!(["app.core/g"]));

    let units = parsed["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0]["name"], "app.core$f");
    assert_eq!(parsed["unit_summary"]["unit_count"], 2);

    // Exporting peeks: the session keeps its records
    assert_eq!(session.peek_form_events().len(), 4);
}

#[test]
fn test_export_keeps_unknown_sentinel() {
    let session = Session::new();
    session.capture_loaded_unit("app/Broken", b"junk");

    let parsed = export_json(&SnapshotExporter::from_session(&session));
    let unit = &parsed["units"][0];
    assert_eq!(unit["name"], "app.Broken");
    assert_eq!(unit["byte_size"], 4);
    assert_eq!(unit["field_count"], -1);
    assert_eq!(unit["instruction_count"], -1);
}

#[test]
fn test_top_level_references_export_empty_callers() {
    let mut exporter = SnapshotExporter::new(true);
    exporter.add_reference("app.core/main", None);
    exporter.add_reference("app.core/f", Some("app.core/main"));

    let parsed = export_json(&exporter);
    assert_eq!(parsed["references"]["app.core/main"], serde_json::json!([]));
    assert_eq!(parsed["references"]["app.core/f"], serde_json::json!(["app.core/main"]));
    assert!(parsed["forms"].as_array().unwrap().is_empty());
}
