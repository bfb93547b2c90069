use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use formscope_common::{FormEvent, UnitRecord};

use crate::analysis::{summarize_definitions, summarize_units, DefinitionSummary, UnitSummary};
use crate::bridge::Session;
use crate::domain::ExportError;

/// One captured form. The payload is rendered back to source text.
#[derive(Debug, Serialize)]
struct FormEntry {
    namespace: String,
    symbol_name: String,
    phase: &'static str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_line: Option<u32>,
    form: String,
}

/// One loaded unit. Counts keep the -1 sentinel for "unknown".
#[derive(Debug, Serialize)]
struct UnitEntry {
    name: String,
    byte_size: usize,
    field_count: i32,
    instruction_count: i32,
    references: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SnapshotDocument {
    healthy: bool,
    forms: Vec<FormEntry>,
    definitions: Vec<DefinitionSummary>,
    /// callee → callers; an empty list means top-level references only
    references: BTreeMap<String, Vec<String>>,
    units: Vec<UnitEntry>,
    unit_summary: UnitSummary,
}

/// JSON exporter for a capture snapshot
#[derive(Debug, Default)]
pub struct SnapshotExporter {
    healthy: bool,
    forms: Vec<FormEvent>,
    references: BTreeMap<String, BTreeSet<String>>,
    units: Vec<UnitRecord>,
}

impl SnapshotExporter {
    pub fn new(healthy: bool) -> Self {
        Self { healthy, ..Self::default() }
    }

    /// Copy the current contents of `session` without draining it.
    pub fn from_session(session: &Session) -> Self {
        Self {
            healthy: session.is_healthy(),
            forms: session.peek_form_events(),
            references: session.reference_edges(),
            units: session.loaded_units(),
        }
    }

    pub fn add_form(&mut self, event: FormEvent) {
        self.forms.push(event);
    }

    pub fn add_reference(&mut self, callee: &str, caller: Option<&str>) {
        let callers = self.references.entry(callee.to_string()).or_default();
        if let Some(caller) = caller {
            callers.insert(caller.to_string());
        }
    }

    pub fn add_unit(&mut self, unit: UnitRecord) {
        self.units.push(unit);
    }

    fn document(&self) -> SnapshotDocument {
        let forms = self
            .forms
            .iter()
            .map(|event| FormEntry {
                namespace: event.namespace.clone(),
                symbol_name: event.symbol_name.clone(),
                phase: event.phase.as_str(),
                kind: event.kind.as_str(),
                line: event.line,
                end_line: event.end_line,
                form: event.payload.to_string(),
            })
            .collect();

        let units = self
            .units
            .iter()
            .map(|unit| UnitEntry {
                name: unit.name.clone(),
                byte_size: unit.byte_size,
                field_count: unit.field_count,
                instruction_count: unit.instruction_count,
                references: unit.references.iter().cloned().collect(),
            })
            .collect();

        SnapshotDocument {
            healthy: self.healthy,
            forms,
            definitions: summarize_definitions(&self.forms),
            references: self
                .references
                .iter()
                .map(|(callee, callers)| (callee.clone(), callers.iter().cloned().collect()))
                .collect(),
            units,
            unit_summary: summarize_units(&self.units),
        }
    }

    /// Export the snapshot to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Returns [`ExportError`] if serialization or the write fails.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut writer, &self.document())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
