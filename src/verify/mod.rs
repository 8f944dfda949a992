//! Independent verification of published CIDs

mod report;
mod verifier;

pub use report::{
    Check, CheckStatus, OverallStatus, ReportError, ReportSummary, VerificationReport, ANCHORING,
    AVAILABILITY, DURABILITY,
};
pub use verifier::Verifier;
