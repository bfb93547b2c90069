//! Aggregates over loaded units.

use std::collections::BTreeMap;

use serde::Serialize;

use formscope_common::UnitRecord;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UnitSummary {
    pub unit_count: usize,
    pub total_bytes: usize,
    /// Units the visitor could not parse
    pub unknown_count: usize,
    /// Instructions across parsed units only
    pub total_instructions: u64,
    /// Units referenced by at least two others, most-referenced first
    pub shared_dependencies: Vec<(String, usize)>,
}

#[must_use]
pub fn summarize_units(units: &[UnitRecord]) -> UnitSummary {
    let mut incoming: BTreeMap<&str, usize> = BTreeMap::new();
    for unit in units {
        for target in &unit.references {
            *incoming.entry(target.as_str()).or_default() += 1;
        }
    }
    let mut shared: Vec<(String, usize)> = incoming
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    shared.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    UnitSummary {
        unit_count: units.len(),
        total_bytes: units.iter().map(|u| u.byte_size).sum(),
        unknown_count: units.iter().filter(|u| u.known_instruction_count().is_none()).count(),
        total_instructions: units
            .iter()
            .filter_map(UnitRecord::known_instruction_count)
            .map(u64::from)
            .sum(),
        shared_dependencies: shared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formscope_common::UnitMetrics;

    fn unit(name: &str, instructions: i32, refs: &[&str]) -> UnitRecord {
        UnitRecord::new(
            name.to_string(),
            10,
            UnitMetrics {
                field_count: 0,
                instruction_count: instructions,
                references: refs.iter().map(|r| (*r).to_string()).collect(),
            },
        )
    }

    #[test]
    fn test_unknown_counts_excluded_from_totals() {
        let units = [
            unit("a", 5, &["clojure.lang.Var", "b"]),
            unit("b", -1, &[]),
            unit("c", 7, &["clojure.lang.Var"]),
        ];
        let summary = summarize_units(&units);
        assert_eq!(summary.unit_count, 3);
        assert_eq!(summary.total_bytes, 30);
        assert_eq!(summary.unknown_count, 1);
        assert_eq!(summary.total_instructions, 12);
        assert_eq!(summary.shared_dependencies, vec![("clojure.lang.Var".to_string(), 2)]);
    }
}
