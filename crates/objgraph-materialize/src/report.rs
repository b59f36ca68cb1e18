//! Materialization report: counts and the non-fatal issues of one call.

use std::fmt;

use objgraph_core::graph::node::{NodeId, TypeTag};

/// A pointer the resolution pass skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveIssue {
    /// One endpoint has no instantiated object.
    UnresolvedReference {
        from_node: NodeId,
        to_node: NodeId,
        field: String,
    },
    /// The host model rejected the write-back.
    WriteFailed {
        from_node: NodeId,
        to_node: NodeId,
        field: String,
        reason: String,
    },
    /// The field name does not fit the owner's kind.
    MalformedSlot {
        from_node: NodeId,
        owner: TypeTag,
        field: String,
    },
}

impl fmt::Display for ResolveIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveIssue::UnresolvedReference {
                from_node,
                to_node,
                field,
            } => write!(f, "unresolved: {from_node} -[{field}]-> {to_node}"),
            ResolveIssue::WriteFailed {
                from_node,
                to_node,
                field,
                reason,
            } => write!(f, "write failed: {from_node} -[{field}]-> {to_node}: {reason}"),
            ResolveIssue::MalformedSlot {
                from_node,
                owner,
                field,
            } => write!(f, "malformed slot {field:?} on {owner} node {from_node}"),
        }
    }
}

/// Summary of one materialization call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Objects created by the instantiation pass.
    pub nodes_instantiated: usize,
    /// Reference nodes mapped onto their targets.
    pub references: usize,
    /// Pointers written back successfully.
    pub pointers_resolved: usize,
    pub issues: Vec<ResolveIssue>,
    /// Callables whose defaults could not be decoded.
    pub skipped_defaults: Vec<NodeId>,
}

impl MaterializeReport {
    pub fn unresolved_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, ResolveIssue::UnresolvedReference { .. }))
            .count()
    }

    /// Failed writes plus malformed slots.
    pub fn write_failure_count(&self) -> usize {
        self.issues.len() - self.unresolved_count()
    }

    /// True if every pointer was written back and every default decoded.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.skipped_defaults.is_empty()
    }
}

impl fmt::Display for MaterializeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Materialize Report ===")?;
        writeln!(f, "Objects: {}", self.nodes_instantiated)?;
        writeln!(f, "References: {}", self.references)?;
        writeln!(f, "Pointers resolved: {}", self.pointers_resolved)?;
        if !self.skipped_defaults.is_empty() {
            writeln!(f, "Skipped defaults: {:?}", self.skipped_defaults)?;
        }
        if self.issues.is_empty() {
            writeln!(f, "Issues: none")?;
        } else {
            writeln!(f, "Issues ({}):", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  {issue}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let report = MaterializeReport {
            issues: vec![
                ResolveIssue::UnresolvedReference {
                    from_node: 0,
                    to_node: 7,
                    field: "0".into(),
                },
                ResolveIssue::MalformedSlot {
                    from_node: 0,
                    owner: TypeTag::List,
                    field: "key:a".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(report.unresolved_count(), 1);
        assert_eq!(report.write_failure_count(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn report_display() {
        let report = MaterializeReport {
            nodes_instantiated: 4,
            references: 1,
            pointers_resolved: 3,
            issues: vec![ResolveIssue::WriteFailed {
                from_node: 2,
                to_node: 3,
                field: "x".into(),
                reason: "read-only".into(),
            }],
            skipped_defaults: vec![],
        };
        let output = format!("{report}");
        assert!(output.contains("Materialize Report"));
        assert!(output.contains("Objects: 4"));
        assert!(output.contains("write failed: 2 -[x]-> 3: read-only"));
    }
}
