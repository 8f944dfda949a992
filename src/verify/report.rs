//! Verification report
//!
//! Three independent checks merged into one report. The report is built in
//! memory after every check has finished and carries no wall-clock time, so
//! re-running against an unchanged backend yields an identical report.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::model::Cid;

/// Name of the content-store check
pub const AVAILABILITY: &str = "availability";

/// Name of the pinning-service check
pub const DURABILITY: &str = "durability";

/// Name of the ledger check
pub const ANCHORING: &str = "anchoring";

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// Checked and confirmed
    Pass,
    /// Checked and affirmatively absent or inconsistent
    Fail,
    /// Checked, not conclusive
    Warning,
    /// Could not be checked
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Verified,
    NotVerified,
}

/// A single check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Check {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, message)
    }

    pub fn fail(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, message)
    }

    pub fn warning(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warning, message)
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Error, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Counts over the checks of one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub errors: usize,
    pub overall_status: OverallStatus,
}

impl ReportSummary {
    /// VERIFIED iff no check failed; ERROR and WARNING do not downgrade
    pub fn from_checks(checks: &[Check]) -> Self {
        let count = |status: CheckStatus| checks.iter().filter(|c| c.status == status).count();
        let failed = count(CheckStatus::Fail);

        Self {
            total: checks.len(),
            passed: count(CheckStatus::Pass),
            failed,
            warnings: count(CheckStatus::Warning),
            errors: count(CheckStatus::Error),
            overall_status: if failed == 0 {
                OverallStatus::Verified
            } else {
                OverallStatus::NotVerified
            },
        }
    }
}

/// Complete verification report for one CID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub cid: Cid,
    pub checks: Vec<Check>,
    pub summary: ReportSummary,
}

/// Errors for report persistence
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VerificationReport {
    /// Merge the three check results into a report
    pub fn from_checks(cid: Cid, availability: Check, durability: Check, anchoring: Check) -> Self {
        let checks = vec![availability, durability, anchoring];
        let summary = ReportSummary::from_checks(&checks);
        Self {
            cid,
            checks,
            summary,
        }
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.summary.overall_status
    }

    pub fn is_verified(&self) -> bool {
        self.summary.overall_status == OverallStatus::Verified
    }

    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<CheckStatus> {
        self.check(name).map(|c| c.status)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Persist the whole report as one JSON document
    pub fn write_to_file(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
