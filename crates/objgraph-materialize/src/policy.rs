//! Resolve policy: how many non-fatal resolution issues a call tolerates.

use serde::{Deserialize, Serialize};

use crate::error::MaterializeError;
use crate::report::MaterializeReport;

/// Thresholds for the resolution pass. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvePolicy {
    /// Maximum pointers whose endpoints could not be found.
    pub max_unresolved: Option<usize>,
    /// Maximum failed write-backs, malformed slots included.
    pub max_write_failures: Option<usize>,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ResolvePolicy {
    /// Skip every unresolvable edge and failed write.
    pub fn lenient() -> Self {
        Self {
            max_unresolved: None,
            max_write_failures: None,
        }
    }

    /// Abort on the first issue.
    pub fn strict() -> Self {
        Self {
            max_unresolved: Some(0),
            max_write_failures: Some(0),
        }
    }

    /// Fail if the report has crossed either threshold.
    pub fn enforce(&self, report: &MaterializeReport) -> Result<(), MaterializeError> {
        check("unresolved reference", report.unresolved_count(), self.max_unresolved)?;
        check("write failure", report.write_failure_count(), self.max_write_failures)
    }
}

fn check(kind: &'static str, count: usize, limit: Option<usize>) -> Result<(), MaterializeError> {
    match limit {
        Some(limit) if count > limit => {
            Err(MaterializeError::ThresholdExceeded { kind, count, limit })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ResolveIssue;

    fn report_with(issue: ResolveIssue) -> MaterializeReport {
        let mut report = MaterializeReport::default();
        report.issues.push(issue);
        report
    }

    #[test]
    fn lenient_accepts_everything() {
        let report = report_with(ResolveIssue::UnresolvedReference {
            from_node: 0,
            to_node: 9,
            field: "0".into(),
        });
        assert!(ResolvePolicy::lenient().enforce(&report).is_ok());
    }

    #[test]
    fn strict_rejects_first_issue() {
        let report = report_with(ResolveIssue::WriteFailed {
            from_node: 0,
            to_node: 1,
            field: "x".into(),
            reason: "read-only".into(),
        });
        assert!(matches!(
            ResolvePolicy::strict().enforce(&report),
            Err(MaterializeError::ThresholdExceeded {
                kind: "write failure",
                count: 1,
                limit: 0
            })
        ));
        assert!(ResolvePolicy::strict()
            .enforce(&MaterializeReport::default())
            .is_ok());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let policy = ResolvePolicy {
            max_unresolved: Some(1),
            max_write_failures: None,
        };
        let report = report_with(ResolveIssue::UnresolvedReference {
            from_node: 0,
            to_node: 9,
            field: "0".into(),
        });
        assert!(policy.enforce(&report).is_ok());
    }
}
