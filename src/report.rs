//! Hierarchical pass/fail reporting: suite, group, case.
//!
//! Failures are collected, never thrown: one mismatch must not abort the
//! remaining checks of a run. A report also carries a fingerprint over its
//! failure set so a particular set of findings can be referenced stably
//! (in bug reports, CI output, or follow-up runs).

use crate::util::hashing::{encode_digest, hash_field, hash_u64_field};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Failed { detail: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub name: String,
    pub cases: Vec<CaseReport>,
}

impl GroupReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    /// A group that never ran, with a single case recording why.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut group = Self::new(name);
        let reason = reason.into();
        group.cases.push(CaseReport {
            name: "skipped".to_string(),
            outcome: CaseOutcome::Skipped { reason },
        });
        group
    }

    /// Runs one case body and records its outcome. The body reports a
    /// failure by returning `Err` with a human-readable detail; it never
    /// aborts sibling cases.
    pub fn record(&mut self, name: &str, body: impl FnOnce() -> Result<(), String>) {
        let outcome = match body() {
            Ok(()) => CaseOutcome::Passed,
            Err(detail) => {
                debug!("case {}/{} failed: {}", self.name, name, detail);
                CaseOutcome::Failed { detail }
            }
        };
        self.cases.push(CaseReport {
            name: name.to_string(),
            outcome,
        });
    }

    pub fn skip(&mut self, name: &str, reason: impl Into<String>) {
        self.cases.push(CaseReport {
            name: name.to_string(),
            outcome: CaseOutcome::Skipped {
                reason: reason.into(),
            },
        });
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases
            .iter()
            .filter(|c| matches!(c.outcome, CaseOutcome::Failed { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub suite: String,
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            groups: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn case_count(&self) -> usize {
        self.groups.iter().map(|g| g.cases.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.groups.iter().map(|g| g.failed_cases().count()).sum()
    }

    pub fn skip_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.cases.iter())
            .filter(|c| matches!(c.outcome, CaseOutcome::Skipped { .. }))
            .count()
    }

    /// A stable identifier for this report's failure set: group and case
    /// names plus failure details, length-prefixed and hashed. Two runs
    /// that fail in exactly the same way share a fingerprint; a clean run
    /// hashes only the suite name.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, self.suite.as_bytes());
        hash_u64_field(&mut hasher, self.failure_count() as u64);

        for group in &self.groups {
            for case in group.failed_cases() {
                let CaseOutcome::Failed { detail } = &case.outcome else {
                    continue;
                };
                hash_field(&mut hasher, group.name.as_bytes());
                hash_field(&mut hasher, case.name.as_bytes());
                hash_field(&mut hasher, detail.as_bytes());
            }
        }

        encode_digest(hasher)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.suite)?;
        for group in &self.groups {
            let failed = group.failed_cases().count();
            let marker = if failed == 0 { "ok" } else { "FAIL" };
            writeln!(f, "  {:<4} {}", marker, group.name)?;
            for case in &group.cases {
                match &case.outcome {
                    CaseOutcome::Passed => writeln!(f, "    ok   {}", case.name)?,
                    CaseOutcome::Failed { detail } => {
                        writeln!(f, "    FAIL {}: {}", case.name, detail)?
                    }
                    CaseOutcome::Skipped { reason } => {
                        writeln!(f, "    skip {} ({})", case.name, reason)?
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with_failure(detail: &str) -> RunReport {
        let mut report = RunReport::new("baseline");
        let mut group = GroupReport::new("file_ops");
        group.record("passing", || Ok(()));
        group.record("failing", || Err(detail.to_string()));
        report.groups.push(group);
        report
    }

    #[test]
    fn counts_and_cleanliness() {
        let report = report_with_failure("boom");
        assert_eq!(report.case_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(!report.is_clean());

        let mut clean = RunReport::new("baseline");
        let mut group = GroupReport::new("file_ops");
        group.record("passing", || Ok(()));
        group.skip("gated", "capability not declared");
        clean.groups.push(group);
        assert!(clean.is_clean());
        assert_eq!(clean.skip_count(), 1);
    }

    #[test]
    fn skipped_group_is_clean() {
        let mut report = RunReport::new("baseline");
        report
            .groups
            .push(GroupReport::skipped("symlinks", "capability not declared"));
        assert!(report.is_clean());
        assert_eq!(report.skip_count(), 1);
    }

    #[test]
    fn fingerprint_is_stable_for_identical_failures() {
        let a = report_with_failure("boom");
        let b = report_with_failure("boom");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_failure_detail() {
        let a = report_with_failure("boom");
        let b = report_with_failure("bang");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_passes_and_skips() {
        let mut a = report_with_failure("boom");
        let mut extra = GroupReport::new("dir_ops");
        extra.record("passing", || Ok(()));
        extra.skip("gated", "capability not declared");
        a.groups.push(extra);

        let b = report_with_failure("boom");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn display_renders_the_hierarchy() {
        let report = report_with_failure("boom");
        let rendered = report.to_string();
        assert!(rendered.contains("baseline"));
        assert!(rendered.contains("FAIL file_ops"));
        assert!(rendered.contains("FAIL failing: boom"));
        assert!(rendered.contains("ok   passing"));
    }
}
