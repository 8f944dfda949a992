//! Fault injection for the memory backends
//!
//! Each backend operation can be configured to fail a fixed number of times
//! (or forever), optionally after letting the first few calls through, so
//! tests can drive every pipeline and verifier error path.

use std::collections::HashMap;
use std::time::Duration;

use super::BackendError;

/// Backend operations that accept injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Get,
    Pin,
    PinStatus,
    Anchor,
    LookupByCid,
    LookupById,
}

/// The behavior substituted for a successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Service unreachable
    Unavailable(String),
    /// Object or record does not exist
    NotFound,
    /// Request refused (ledger revert, pin quota, ...)
    Rejected(String),
    /// Call exceeded the adapter's deadline
    Timeout(Duration),
    /// `get` returns bytes that differ from what was stored
    CorruptRead,
    /// Lookups report absence even though the record exists
    Absent,
    /// `anchor` records the entry but reports failure to the caller
    AppliedButFailed(String),
}

impl Fault {
    /// Error equivalent for faults that surface as a failed call
    pub fn to_error(&self, subject: &str) -> Option<BackendError> {
        match self {
            Fault::Unavailable(msg) => Some(BackendError::Unavailable(msg.clone())),
            Fault::NotFound => Some(BackendError::NotFound(subject.to_string())),
            Fault::Rejected(msg) => Some(BackendError::Rejected(msg.clone())),
            Fault::Timeout(d) => Some(BackendError::Timeout(*d)),
            Fault::AppliedButFailed(msg) => Some(BackendError::Unavailable(msg.clone())),
            Fault::CorruptRead | Fault::Absent => None,
        }
    }
}

/// Fault configuration for an operation
#[derive(Debug, Clone)]
pub struct FaultConfig {
    pub fault: Fault,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
    /// Calls that succeed before the fault takes effect
    pub skip: u32,
}

impl FaultConfig {
    pub fn new(fault: Fault) -> Self {
        Self {
            fault,
            fail_count: None,
            skip: 0,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Fault::Unavailable(message.into()))
    }

    pub fn not_found() -> Self {
        Self::new(Fault::NotFound)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(Fault::Rejected(message.into()))
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(Fault::Timeout(after))
    }

    pub fn corrupt_read() -> Self {
        Self::new(Fault::CorruptRead)
    }

    pub fn absent() -> Self {
        Self::new(Fault::Absent)
    }

    pub fn applied_but_failed(message: impl Into<String>) -> Self {
        Self::new(Fault::AppliedButFailed(message.into()))
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }

    /// Let the first `calls` calls through before faulting
    pub fn after(mut self, calls: u32) -> Self {
        self.skip = calls;
        self
    }
}

/// Per-operation fault injector
#[derive(Debug, Default)]
pub struct FaultInjector {
    configs: HashMap<Operation, FaultConfig>,
    call_counts: HashMap<Operation, u32>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a fault for an operation, resetting its call count
    pub fn inject(&mut self, op: Operation, config: FaultConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    /// Record a call and return the fault to apply, if any
    pub fn check(&mut self, op: Operation) -> Option<Fault> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if *count <= config.skip {
            return None;
        }
        if let Some(limit) = config.fail_count {
            if *count - config.skip > limit {
                return None;
            }
        }

        Some(config.fault.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injector_basic() {
        let mut injector = FaultInjector::new();
        assert!(injector.check(Operation::Put).is_none());

        injector.inject(Operation::Put, FaultConfig::unavailable("store down"));
        assert_eq!(
            injector.check(Operation::Put),
            Some(Fault::Unavailable("store down".to_string()))
        );
        // Other operations are unaffected
        assert!(injector.check(Operation::Get).is_none());
    }

    #[test]
    fn test_injector_fail_count() {
        let mut injector = FaultInjector::new();
        injector.inject(Operation::LookupByCid, FaultConfig::absent().with_fail_count(2));

        assert_eq!(injector.check(Operation::LookupByCid), Some(Fault::Absent));
        assert_eq!(injector.check(Operation::LookupByCid), Some(Fault::Absent));
        assert!(injector.check(Operation::LookupByCid).is_none());
    }

    #[test]
    fn test_injector_after_skips_leading_calls() {
        let mut injector = FaultInjector::new();
        injector.inject(Operation::Put, FaultConfig::rejected("quota").after(2).with_fail_count(1));

        assert!(injector.check(Operation::Put).is_none());
        assert!(injector.check(Operation::Put).is_none());
        assert_eq!(injector.check(Operation::Put), Some(Fault::Rejected("quota".to_string())));
        assert!(injector.check(Operation::Put).is_none());
    }

    #[test]
    fn test_injector_after_without_limit_fails_forever() {
        let mut injector = FaultInjector::new();
        injector.inject(Operation::Anchor, FaultConfig::unavailable("rpc down").after(1));

        assert!(injector.check(Operation::Anchor).is_none());
        for _ in 0..3 {
            assert!(injector.check(Operation::Anchor).is_some());
        }
    }

    #[test]
    fn test_fault_to_error() {
        assert_eq!(
            Fault::NotFound.to_error("f0155"),
            Some(BackendError::NotFound("f0155".to_string()))
        );
        assert!(Fault::CorruptRead.to_error("f0155").is_none());
        assert!(Fault::Absent.to_error("f0155").is_none());
    }
}
