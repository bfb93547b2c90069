//! # formscope - Main Entry Point
//!
//! Scans compiled unit files on disk, runs each through the bytecode visitor
//! and prints the resulting unit records. `--export` writes the same records
//! as a JSON snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::BufWriter;

use formscope::analysis::summarize_units;
use formscope::cli::Args;
use formscope::domain::ScanError;
use formscope::export::SnapshotExporter;
use formscope::scan::{collect_unit_files, load_units};
use formscope::Session;
use formscope_common::UnitRecord;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

/// Bad paths are usage errors; clap itself exits with 2 on bad flags.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    let bad_path = err
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<ScanError>(), Some(ScanError::NotFound(_))));
    if bad_path {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let files = collect_unit_files(&args.paths).context("Failed to collect compiled units")?;
    if files.is_empty() {
        anyhow::bail!("No .class files found under the given paths");
    }

    let session = Session::new();
    let loaded = load_units(&session, &files).context("Failed to load compiled units")?;
    info!("Loaded {loaded} compiled units");

    let units = session.loaded_units();
    if !quiet {
        println!("formscope v{}", env!("CARGO_PKG_VERSION"));
        print_units(&units, args.references);
    }

    let summary = summarize_units(&units);
    println!(
        "{} units, {} bytes, {} instructions ({} unreadable)",
        summary.unit_count, summary.total_bytes, summary.total_instructions, summary.unknown_count
    );
    if !quiet && !summary.shared_dependencies.is_empty() {
        println!("shared dependencies:");
        for (name, count) in summary.shared_dependencies.iter().take(10) {
            println!("  {count:>4}  {name}");
        }
    }

    if let Some(ref export_path) = args.export {
        let file = File::create(export_path)
            .with_context(|| format!("Failed to create {}", export_path.display()))?;
        SnapshotExporter::from_session(&session)
            .export(BufWriter::new(file))
            .context("Failed to write snapshot")?;
        if !quiet {
            println!("export: {}", export_path.display());
        }
    }

    Ok(())
}

fn print_units(units: &[UnitRecord], with_references: bool) {
    let width = units.iter().map(|u| u.name.len()).max().unwrap_or(0).max(4);
    println!("{:<width$}  {:>8}  {:>6}  {:>6}  {:>4}", "unit", "bytes", "fields", "insns", "refs");
    for unit in units {
        println!(
            "{:<width$}  {:>8}  {:>6}  {:>6}  {:>4}",
            unit.name,
            unit.byte_size,
            count_or_unknown(unit.known_field_count()),
            count_or_unknown(unit.known_instruction_count()),
            unit.references.len(),
        );
        if with_references {
            for target in &unit.references {
                println!("    → {target}");
            }
        }
    }
}

fn count_or_unknown(count: Option<u32>) -> String {
    count.map_or_else(|| "?".to_string(), |c| c.to_string())
}
