//! Guarded unlock attempts
//!
//! [`PatternGuard`] is the caller-side flow: consult the lockout policy, verify
//! against the store only when attempts are allowed, then feed the result back
//! into the failure counter.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::codec::Cell;
use crate::config::LockConfig;
use crate::error::Result;
use crate::lockout::{AttemptDecision, LockoutPolicy, LockoutState};
use crate::store::{CredentialStore, VerifyOutcome};

/// How an attempt is judged when there is nothing to compare against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Missing, malformed, or unreadable credential unlocks
    #[default]
    FailOpen,
    /// Only a matching digest unlocks
    FailClosed,
}

/// Result of one guarded attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The pattern matched the stored credential
    Unlocked,
    /// Accepted without a comparison under [`FailurePolicy::FailOpen`]
    Unverified(VerifyOutcome),
    /// Refused without a comparison under [`FailurePolicy::FailClosed`]
    Unavailable(VerifyOutcome),
    /// Wrong pattern
    Rejected {
        failed_attempts: u32,
        attempts_before_lockout: u32,
        warn_reset: bool,
    },
    /// Attempts are suspended
    LockedOut { remaining: Duration },
    /// Alternate recovery required
    ResetRequired,
}

impl AttemptOutcome {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked | Self::Unverified(_))
    }
}

/// Store plus lockout policy
pub struct PatternGuard {
    store: CredentialStore,
    lockout: Mutex<LockoutPolicy>,
    failure_policy: FailurePolicy,
}

impl PatternGuard {
    pub fn new(store: CredentialStore, config: &LockConfig) -> Self {
        Self::with_policy(
            store,
            LockoutPolicy::new(config.lockout.clone()),
            config.failure_policy,
        )
    }

    /// Build around an existing lockout policy, e.g. one restored from disk
    pub fn with_policy(
        store: CredentialStore,
        lockout: LockoutPolicy,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            lockout: Mutex::new(lockout),
            failure_policy,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Copy of the current lockout policy
    pub fn lockout(&self) -> LockoutPolicy {
        self.lockout.lock().clone()
    }

    pub fn attempt(&self, pattern: &[Cell]) -> AttemptOutcome {
        self.attempt_at(pattern, Instant::now())
    }

    /// Run an attempt as of `now`
    pub fn attempt_at(&self, pattern: &[Cell], now: Instant) -> AttemptOutcome {
        let mut lockout = self.lockout.lock();

        match lockout.check(now) {
            AttemptDecision::Allowed => {}
            AttemptDecision::LockedOut { remaining } => {
                tracing::debug!("Attempt rejected, locked out for {:?}", remaining);
                return AttemptOutcome::LockedOut { remaining };
            }
            AttemptDecision::ResetRequired => return AttemptOutcome::ResetRequired,
        }

        let verdict = self.store.verify_detailed(pattern);
        tracing::debug!(?verdict, "Pattern verified");

        match (verdict, self.failure_policy) {
            (VerifyOutcome::Match, _) => {
                lockout.record_success();
                AttemptOutcome::Unlocked
            }
            (VerifyOutcome::Mismatch, _) => match lockout.record_failure(now) {
                LockoutState::Idle => AttemptOutcome::Rejected {
                    failed_attempts: lockout.failed_attempts(),
                    attempts_before_lockout: lockout.attempts_before_lockout(),
                    warn_reset: lockout.should_warn(),
                },
                LockoutState::LockedOut { deadline } => AttemptOutcome::LockedOut {
                    remaining: deadline.saturating_duration_since(now),
                },
                LockoutState::ResetRequired => AttemptOutcome::ResetRequired,
            },
            (other, FailurePolicy::FailOpen) => {
                if let VerifyOutcome::Unreadable(kind) = other {
                    tracing::warn!("Credential unreadable ({:?}), accepting attempt", kind);
                }
                lockout.record_success();
                AttemptOutcome::Unverified(other)
            }
            (other, FailurePolicy::FailClosed) => AttemptOutcome::Unavailable(other),
        }
    }

    /// Leave `ResetRequired` once the user proved identity another way.
    ///
    /// Clears both the stored credential and the failure counter.
    pub fn reset_after_recovery(&self) -> Result<()> {
        self.store.clear()?;
        self.lockout.lock().reset();
        tracing::info!("Lock pattern reset after alternate recovery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Pattern;

    fn pattern(coords: &[(u8, u8)]) -> Pattern {
        Pattern::from_coords(coords).unwrap()
    }

    fn guard_with(dir: &std::path::Path, policy: FailurePolicy) -> PatternGuard {
        let config = LockConfig::new().with_failure_policy(policy);
        let store = CredentialStore::open(dir, &config).unwrap();
        PatternGuard::new(store, &config)
    }

    #[test]
    fn test_unlock_and_reject() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard_with(dir.path(), FailurePolicy::FailOpen);
        let good = pattern(&[(0, 0), (0, 1), (0, 2), (1, 2)]);
        guard.store().save(Some(good.cells())).unwrap();

        let bad = pattern(&[(2, 0), (2, 1), (2, 2), (1, 2)]);
        assert_eq!(
            guard.attempt(&bad),
            AttemptOutcome::Rejected {
                failed_attempts: 1,
                attempts_before_lockout: 4,
                warn_reset: false,
            }
        );
        assert_eq!(guard.attempt(&good), AttemptOutcome::Unlocked);
        assert_eq!(guard.lockout().failed_attempts(), 0);
    }

    #[test]
    fn test_lockout_skips_verification() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard_with(dir.path(), FailurePolicy::FailOpen);
        let good = pattern(&[(1, 0), (1, 1), (1, 2), (2, 2)]);
        let bad = pattern(&[(0, 0), (1, 1), (2, 2), (2, 1)]);
        guard.store().save(Some(good.cells())).unwrap();

        let now = Instant::now();
        for _ in 0..4 {
            assert!(matches!(
                guard.attempt_at(&bad, now),
                AttemptOutcome::Rejected { .. }
            ));
        }
        assert_eq!(
            guard.attempt_at(&bad, now),
            AttemptOutcome::LockedOut {
                remaining: Duration::from_secs(30)
            }
        );

        // Even the right pattern is refused until the deadline
        assert!(matches!(
            guard.attempt_at(&good, now + Duration::from_secs(5)),
            AttemptOutcome::LockedOut { .. }
        ));
        assert_eq!(
            guard.attempt_at(&good, now + Duration::from_secs(30)),
            AttemptOutcome::Unlocked
        );
    }

    #[test]
    fn test_reset_required_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard_with(dir.path(), FailurePolicy::FailOpen);
        let good = pattern(&[(0, 0), (1, 0), (2, 0), (2, 1)]);
        let bad = pattern(&[(0, 2), (1, 2), (2, 2), (2, 1)]);
        guard.store().save(Some(good.cells())).unwrap();

        let mut now = Instant::now();
        let mut last = AttemptOutcome::Unlocked;
        for _ in 0..20 {
            last = guard.attempt_at(&bad, now);
            now += Duration::from_secs(31);
        }
        assert_eq!(last, AttemptOutcome::ResetRequired);
        assert_eq!(guard.attempt_at(&good, now), AttemptOutcome::ResetRequired);

        guard.reset_after_recovery().unwrap();
        assert!(!guard.store().exists());
        assert_eq!(guard.lockout().failed_attempts(), 0);
    }

    #[test]
    fn test_fail_open_without_credential() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard_with(dir.path(), FailurePolicy::FailOpen);

        let outcome = guard.attempt(&pattern(&[(0, 0), (0, 1), (0, 2), (1, 1)]));
        assert_eq!(outcome, AttemptOutcome::Unverified(VerifyOutcome::NoCredential));
        assert!(outcome.is_unlocked());
    }

    #[test]
    fn test_fail_closed_without_credential() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard_with(dir.path(), FailurePolicy::FailClosed);

        let outcome = guard.attempt(&pattern(&[(0, 0), (0, 1), (0, 2), (1, 1)]));
        assert_eq!(outcome, AttemptOutcome::Unavailable(VerifyOutcome::NoCredential));
        assert!(!outcome.is_unlocked());
        assert_eq!(guard.lockout().failed_attempts(), 0);
    }

    #[test]
    fn test_warns_near_reset() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard_with(dir.path(), FailurePolicy::FailOpen);
        guard
            .store()
            .save(Some(pattern(&[(0, 0), (1, 1), (2, 2), (2, 1)]).cells()))
            .unwrap();
        let bad = pattern(&[(0, 1), (1, 1), (2, 1), (2, 2)]);

        let mut now = Instant::now();
        for _ in 0..15 {
            guard.attempt_at(&bad, now);
            now += Duration::from_secs(31);
        }
        assert_eq!(
            guard.attempt_at(&bad, now),
            AttemptOutcome::Rejected {
                failed_attempts: 16,
                attempts_before_lockout: 4,
                warn_reset: true,
            }
        );
    }
}
