//! Reduction of per-check outcomes into a run report and overall status.
//!
//! Both [`aggregate`] and [`summarize`] are pure: they only look at their
//! input and are defined for empty input.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CheckError, InventoryError};
use crate::finding::{Finding, FindingKind};

/// Why a check did not produce a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The check returned an error.
    Error,
    /// The check failed because a named object is absent.
    NotFound,
    /// The check's own deadline or the run deadline passed.
    Timeout,
    /// The run was cancelled before the check finished.
    Cancelled,
    /// The check panicked.
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::NotFound => write!(f, "not found"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// A check that ended without a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CheckFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify an error returned by a check body.
    pub fn from_error(err: &CheckError) -> Self {
        let kind = match err {
            CheckError::Inventory(InventoryError::NotFound { .. }) => FailureKind::NotFound,
            CheckError::Inventory(InventoryError::Timeout(_)) => FailureKind::Timeout,
            CheckError::Inventory(InventoryError::Cancelled) => FailureKind::Cancelled,
            CheckError::Inventory(_) | CheckError::Failed(_) => FailureKind::Error,
        };
        Self::new(kind, err.to_string())
    }
}

/// Health signal of a single outcome or of a whole run.
///
/// Ordered so that the worse status compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Failing,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Failing => write!(f, "Failing"),
        }
    }
}

/// What happened to one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckOutcome {
    Completed(Finding),
    Failed(CheckFailure),
}

impl CheckOutcome {
    pub fn status(&self) -> OverallStatus {
        match self {
            Self::Completed(finding) => match finding.kind() {
                FindingKind::Ok => OverallStatus::Healthy,
                FindingKind::Warning => OverallStatus::Degraded,
                FindingKind::Error => OverallStatus::Failing,
            },
            Self::Failed(failure) => match failure.kind {
                FailureKind::NotFound => OverallStatus::Degraded,
                FailureKind::Error
                | FailureKind::Timeout
                | FailureKind::Cancelled
                | FailureKind::Panicked => OverallStatus::Failing,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == OverallStatus::Healthy
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Completed(finding) => finding.message(),
            Self::Failed(failure) => &failure.message,
        }
    }

    pub fn finding(&self) -> Option<&Finding> {
        match self {
            Self::Completed(finding) => Some(finding),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CheckFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Outcome of one check as emitted by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    pub name: String,
    pub outcome: CheckOutcome,
    pub elapsed: Duration,
}

/// One row of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    #[serde(flatten)]
    pub outcome: CheckOutcome,
    pub elapsed_ms: u64,
}

/// Per-check outcomes of one run, ordered by check name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    checks: BTreeMap<String, ReportEntry>,
}

impl RunReport {
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.get(name).map(|entry| &entry.outcome)
    }

    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.checks.get(name)
    }

    /// Entries in lexicographic order of check name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReportEntry)> {
        self.checks.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    /// Number of entries contributing `status`.
    pub fn count(&self, status: OverallStatus) -> usize {
        self.checks
            .values()
            .filter(|entry| entry.outcome.status() == status)
            .count()
    }

    pub fn summarize(&self) -> OverallStatus {
        summarize(self)
    }
}

/// Build a report from outcomes in any order. A later record for a name
/// replaces an earlier one.
pub fn aggregate<I>(records: I) -> RunReport
where
    I: IntoIterator<Item = CheckRecord>,
{
    let checks = records
        .into_iter()
        .map(|record| {
            let elapsed_ms = u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX);
            (
                record.name,
                ReportEntry {
                    outcome: record.outcome,
                    elapsed_ms,
                },
            )
        })
        .collect();
    RunReport { checks }
}

/// Failing dominates Degraded dominates Healthy; an empty report is Healthy.
pub fn summarize(report: &RunReport) -> OverallStatus {
    report
        .checks
        .values()
        .map(|entry| entry.outcome.status())
        .max()
        .unwrap_or(OverallStatus::Healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, outcome: CheckOutcome) -> CheckRecord {
        CheckRecord {
            name: name.to_string(),
            outcome,
            elapsed: Duration::from_millis(3),
        }
    }

    fn ok(name: &str) -> CheckRecord {
        record(name, CheckOutcome::Completed(Finding::ok("fine")))
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = aggregate(Vec::new());
        assert!(report.is_empty());
        assert_eq!(summarize(&report), OverallStatus::Healthy);
    }

    #[test]
    fn test_error_dominates() {
        let report = aggregate(vec![
            ok("CheckA"),
            record("CheckB", CheckOutcome::Completed(Finding::error("broken"))),
        ]);
        assert_eq!(report.summarize(), OverallStatus::Failing);
    }

    #[test]
    fn test_single_warning_degrades() {
        let report = aggregate(vec![
            ok("CheckA"),
            record("CheckB", CheckOutcome::Completed(Finding::warning("low space"))),
            ok("CheckC"),
        ]);
        assert_eq!(report.summarize(), OverallStatus::Degraded);
        assert_eq!(report.count(OverallStatus::Healthy), 2);
    }

    #[test]
    fn test_all_ok_is_healthy() {
        let report = aggregate(vec![ok("CheckA"), ok("CheckB")]);
        assert_eq!(report.summarize(), OverallStatus::Healthy);
    }

    #[test]
    fn test_timeout_fails_and_not_found_degrades() {
        let timeout = CheckOutcome::Failed(CheckFailure::new(FailureKind::Timeout, "slow"));
        let missing = CheckOutcome::Failed(CheckFailure::new(FailureKind::NotFound, "gone"));
        assert_eq!(timeout.status(), OverallStatus::Failing);
        assert_eq!(missing.status(), OverallStatus::Degraded);

        let report = aggregate(vec![record("CheckA", missing), ok("CheckB")]);
        assert_eq!(report.summarize(), OverallStatus::Degraded);
    }

    #[test]
    fn test_order_is_by_name() {
        let report = aggregate(vec![ok("zeta"), ok("alpha"), ok("Mid")]);
        let names: Vec<_> = report.names().collect();
        assert_eq!(names, vec!["Mid", "alpha", "zeta"]);
    }

    #[test]
    fn test_failure_classification() {
        let not_found: CheckError = InventoryError::not_found(
            crate::handle::ResourceKind::Datacenter,
            "DC9",
        )
        .into();
        assert_eq!(CheckFailure::from_error(&not_found).kind, FailureKind::NotFound);

        let denied: CheckError = InventoryError::PermissionDenied("System.Read".into()).into();
        assert_eq!(CheckFailure::from_error(&denied).kind, FailureKind::Error);

        let slow: CheckError = InventoryError::Timeout("find datacenter".into()).into();
        assert_eq!(CheckFailure::from_error(&slow).kind, FailureKind::Timeout);
    }
}
