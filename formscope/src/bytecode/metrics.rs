//! Per-unit metrics visitor.

use std::collections::BTreeSet;

use formscope_common::{normalize_unit_name, UnitMetrics};

use crate::bytecode::descriptor::referenced_unit;
use crate::bytecode::reader::{ClassHeader, ClassVisitor, Instruction, MemberInfo, Operand};

/// Counts fields and instructions and collects outgoing unit references.
///
/// References come from the super unit, implemented interfaces, field and
/// method owners, and the type operand of `new`, `anewarray`, `checkcast`,
/// `instanceof` and `multianewarray`. The unit itself is never included.
#[derive(Debug, Default)]
pub struct MetricsVisitor {
    this_class: Option<String>,
    field_count: u32,
    instruction_count: u32,
    references: BTreeSet<String>,
}

impl MetricsVisitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_reference(&mut self, internal: &str) {
        let Some(unit) = referenced_unit(internal) else {
            return;
        };
        let dotted = normalize_unit_name(unit);
        if self.this_class.as_deref() != Some(dotted.as_str()) {
            self.references.insert(dotted);
        }
    }

    /// Final counts, saturating at `i32::MAX`.
    #[must_use]
    pub fn finish(self) -> UnitMetrics {
        UnitMetrics {
            field_count: i32::try_from(self.field_count).unwrap_or(i32::MAX),
            instruction_count: i32::try_from(self.instruction_count).unwrap_or(i32::MAX),
            references: self.references,
        }
    }
}

impl ClassVisitor for MetricsVisitor {
    fn visit_header(&mut self, header: &ClassHeader<'_>) {
        self.this_class = Some(normalize_unit_name(header.this_class));
        if let Some(super_class) = header.super_class {
            self.add_reference(super_class);
        }
        for interface in &header.interfaces {
            self.add_reference(interface);
        }
    }

    fn visit_field(&mut self, _field: &MemberInfo<'_>) {
        self.field_count = self.field_count.saturating_add(1);
    }

    fn visit_instruction(&mut self, insn: &Instruction<'_>) {
        self.instruction_count = self.instruction_count.saturating_add(1);
        match insn.operand {
            Operand::Field { owner } | Operand::Method { owner } => self.add_reference(owner),
            Operand::Type { name } => self.add_reference(name),
            Operand::None | Operand::Dynamic => {}
        }
    }
}
