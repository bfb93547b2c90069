use std::fs;
use std::path::Path;
use std::process::Command;

use formscope::domain::QualifiedName;
use formscope::sim::emitter::{emit_function, ResolvedRef};
use tempfile::TempDir;

fn formscope() -> Command {
    Command::new(env!("CARGO_BIN_EXE_formscope"))
}

/// Lay out `app/core$f.class` and `app/core$g.class` under `dir`.
fn write_units(dir: &Path) {
    let f = QualifiedName::new("app.core", "f");
    let g = QualifiedName::new("app.core", "g");
    let refs = [ResolvedRef { name: f.clone(), constant: false, function: true }];

    let unit_dir = dir.join("app");
    fs::create_dir_all(&unit_dir).unwrap();
    let (_, f_bytes) = emit_function(&f, 1, &[], Some(1));
    let (_, g_bytes) = emit_function(&g, 0, &refs, Some(2));
    fs::write(unit_dir.join("core$f.class"), f_bytes).unwrap();
    fs::write(unit_dir.join("core$g.class"), g_bytes).unwrap();
}

#[test]
fn test_scan_directory_and_export() {
    let dir = TempDir::new().unwrap();
    write_units(dir.path());
    let export = dir.path().join("snapshot.json");

    let output = formscope()
        .arg(dir.path())
        .arg("--export")
        .arg(&export)
        .arg("--references")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("app.core$f"));
    assert!(stdout.contains("→ app.core$f"));
    assert!(stdout.contains("2 units"));

    let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
    let units = parsed["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[1]["name"], "app.core$g");
    assert!(units[1]["references"].as_array().unwrap().contains(&serde_json::json!("app.core$f")));
}

#[test]
fn test_unreadable_unit_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("Broken.class"), b"not a unit").unwrap();

    let output = formscope().arg(dir.path()).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Broken"));
    assert!(stdout.contains("(1 unreadable)"));
}

#[test]
fn test_missing_path_is_usage_error() {
    let output = formscope().arg("/definitely/not/here").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_empty_directory_fails() {
    let dir = TempDir::new().unwrap();
    let output = formscope().arg(dir.path()).arg("-q").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}
