//! RAW / EXPANDED pairing per definition.

use std::collections::BTreeMap;

use serde::Serialize;

use formscope_common::{FormEvent, Phase};

use crate::analysis::form_metrics::{measure, FormMetrics};

/// One definition with the metrics of each captured phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionSummary {
    pub namespace: String,
    pub symbol_name: String,
    pub kind: String,
    pub line: Option<u32>,
    pub raw: Option<FormMetrics>,
    /// Absent when the transformation left the form unchanged
    pub expanded: Option<FormMetrics>,
}

impl DefinitionSummary {
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.symbol_name)
    }

    #[must_use]
    pub fn was_expanded(&self) -> bool {
        self.expanded.is_some()
    }

    /// Expanded size over raw size, when both phases were captured.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn growth(&self) -> Option<f64> {
        let raw = self.raw?.expressions;
        let expanded = self.expanded?.expressions;
        (raw > 0).then(|| expanded as f64 / raw as f64)
    }
}

/// Group form events by definition, ordered by namespace then name.
#[must_use]
pub fn summarize_definitions(events: &[FormEvent]) -> Vec<DefinitionSummary> {
    let mut grouped: BTreeMap<(&str, &str), DefinitionSummary> = BTreeMap::new();
    for event in events {
        let summary = grouped
            .entry((event.namespace.as_str(), event.symbol_name.as_str()))
            .or_insert_with(|| DefinitionSummary {
                namespace: event.namespace.clone(),
                symbol_name: event.symbol_name.clone(),
                kind: event.kind.to_string(),
                line: event.line,
                raw: None,
                expanded: None,
            });
        let metrics = measure(&event.payload);
        match event.phase {
            Phase::Raw => {
                summary.raw = Some(metrics);
                summary.kind = event.kind.to_string();
                summary.line = event.line.or(summary.line);
            }
            Phase::Expanded => summary.expanded = Some(metrics),
        }
    }
    grouped.into_values().collect()
}
