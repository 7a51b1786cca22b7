//! Failed-attempt lockout policy
//!
//! Rate-limits attempts independently of the credential store. Every
//! `attempts_before_timeout`-th consecutive failure locks attempts out for
//! `timeout`; reaching `attempts_before_reset` failures demands an alternate
//! recovery path. A success resets everything.
//!
//! The policy runs on the monotonic clock and lives in memory. Hosts that need
//! lockout to survive a restart snapshot it into a [`LockoutRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Failures that trigger a timed lockout
pub const FAILED_ATTEMPTS_BEFORE_TIMEOUT: u32 = 5;

/// Failures after which the user must recover through another method
pub const FAILED_ATTEMPTS_BEFORE_RESET: u32 = 20;

/// Length of a lockout
pub const FAILED_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Granularity of the lockout countdown shown to the user
pub const FAILED_ATTEMPT_COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

/// How close to the reset threshold the user starts being warned
pub const FAILED_ATTEMPTS_BEFORE_WIPE_GRACE: u32 = 5;

/// Minimum number of cells in a pattern accepted at enrollment
pub const MIN_PATTERN_LEN: usize = 4;

/// Lockout thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSettings {
    pub attempts_before_timeout: u32,
    pub attempts_before_reset: u32,
    pub timeout_ms: u64,
    pub countdown_interval_ms: u64,
    pub attempts_before_wipe_grace: u32,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            attempts_before_timeout: FAILED_ATTEMPTS_BEFORE_TIMEOUT,
            attempts_before_reset: FAILED_ATTEMPTS_BEFORE_RESET,
            timeout_ms: FAILED_ATTEMPT_TIMEOUT.as_millis() as u64,
            countdown_interval_ms: FAILED_ATTEMPT_COUNTDOWN_INTERVAL.as_millis() as u64,
            attempts_before_wipe_grace: FAILED_ATTEMPTS_BEFORE_WIPE_GRACE,
        }
    }
}

impl LockoutSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    /// Deadline of a lockout starting at `now`
    pub fn deadline_from(&self, now: Instant) -> Instant {
        now + self.timeout()
    }
}

/// Deadline of a lockout starting at `now`, with the default timeout.
///
/// Pure arithmetic on the monotonic clock; nothing is stored.
pub fn compute_lockout_deadline(now: Instant) -> Instant {
    now + FAILED_ATTEMPT_TIMEOUT
}

/// Where the policy currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    /// Attempts allowed
    Idle,
    /// Attempts rejected until the deadline
    LockedOut { deadline: Instant },
    /// Too many failures, an alternate recovery path is required
    ResetRequired,
}

/// Whether an attempt may proceed to hash comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    Allowed,
    LockedOut { remaining: Duration },
    ResetRequired,
}

/// Failure counter plus lockout deadline
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    settings: LockoutSettings,
    failed_attempts: u32,
    deadline: Option<Instant>,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(LockoutSettings::default())
    }
}

impl LockoutPolicy {
    pub fn new(settings: LockoutSettings) -> Self {
        Self {
            settings,
            failed_attempts: 0,
            deadline: None,
        }
    }

    pub fn settings(&self) -> &LockoutSettings {
        &self.settings
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn state(&self, now: Instant) -> LockoutState {
        if self.failed_attempts >= self.settings.attempts_before_reset {
            return LockoutState::ResetRequired;
        }
        match self.deadline {
            Some(deadline) if now < deadline => LockoutState::LockedOut { deadline },
            _ => LockoutState::Idle,
        }
    }

    /// Gate an attempt before any hashing happens
    pub fn check(&self, now: Instant) -> AttemptDecision {
        match self.state(now) {
            LockoutState::Idle => AttemptDecision::Allowed,
            LockoutState::LockedOut { deadline } => AttemptDecision::LockedOut {
                remaining: deadline.saturating_duration_since(now),
            },
            LockoutState::ResetRequired => AttemptDecision::ResetRequired,
        }
    }

    /// Count a failed attempt and return the resulting state
    pub fn record_failure(&mut self, now: Instant) -> LockoutState {
        self.failed_attempts = self.failed_attempts.saturating_add(1);

        if self.failed_attempts >= self.settings.attempts_before_reset {
            self.deadline = None;
            tracing::warn!(
                "{} failed attempts, alternate recovery required",
                self.failed_attempts
            );
        } else if self.settings.attempts_before_timeout > 0
            && self.failed_attempts % self.settings.attempts_before_timeout == 0
        {
            self.deadline = Some(self.settings.deadline_from(now));
            tracing::warn!(
                "{} failed attempts, locked out for {:?}",
                self.failed_attempts,
                self.settings.timeout()
            );
        }

        self.state(now)
    }

    /// A correct pattern clears the counter and any lockout
    pub fn record_success(&mut self) {
        if self.failed_attempts > 0 {
            tracing::debug!("Clearing {} failed attempts", self.failed_attempts);
        }
        self.reset();
    }

    pub fn reset(&mut self) {
        self.failed_attempts = 0;
        self.deadline = None;
    }

    /// Time left in the current lockout, zero when not locked out
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Countdown ticks left, rounded up
    pub fn countdown_ticks(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now).as_millis() as u64;
        let tick = self.settings.countdown_interval_ms.max(1);
        remaining.div_ceil(tick)
    }

    /// Whole seconds left in the current lockout, rounded up
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        self.remaining(now).as_millis().div_ceil(1000) as u64
    }

    pub fn attempts_before_reset(&self) -> u32 {
        self.settings
            .attempts_before_reset
            .saturating_sub(self.failed_attempts)
    }

    /// Failures left until the next timed lockout
    pub fn attempts_before_lockout(&self) -> u32 {
        let per = self.settings.attempts_before_timeout;
        if per == 0 {
            return u32::MAX;
        }
        per - self.failed_attempts % per
    }

    /// Whether the user should be told a reset is getting close
    pub fn should_warn(&self) -> bool {
        let left = self.attempts_before_reset();
        left > 0 && left <= self.settings.attempts_before_wipe_grace
    }

    /// Snapshot with the deadline converted to wall-clock time
    pub fn to_record(&self, now: Instant, wall_now: DateTime<Utc>) -> LockoutRecord {
        let deadline = self
            .deadline
            .filter(|d| *d > now)
            .and_then(|d| chrono::Duration::from_std(d - now).ok())
            .map(|left| wall_now + left);
        LockoutRecord {
            failed_attempts: self.failed_attempts,
            deadline,
        }
    }

    /// Rebuild from a snapshot.
    ///
    /// A deadline already in the past, or further away than one timeout, is
    /// discarded.
    pub fn from_record(
        record: &LockoutRecord,
        settings: LockoutSettings,
        now: Instant,
        wall_now: DateTime<Utc>,
    ) -> Self {
        let timeout = settings.timeout();
        let deadline = record
            .deadline
            .and_then(|d| (d - wall_now).to_std().ok())
            .filter(|left| *left <= timeout)
            .map(|left| now + left);

        Self {
            settings,
            failed_attempts: record.failed_attempts,
            deadline,
        }
    }
}

/// Serializable lockout snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub failed_attempts: u32,
    pub deadline: Option<DateTime<Utc>>,
}

impl LockoutRecord {
    /// Load a snapshot, treating a missing file as a clean slate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_failures_stay_idle() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();

        for _ in 0..4 {
            assert_eq!(policy.record_failure(now), LockoutState::Idle);
        }
        assert_eq!(policy.failed_attempts(), 4);
        assert_eq!(policy.check(now), AttemptDecision::Allowed);
        assert_eq!(policy.attempts_before_lockout(), 1);
    }

    #[test]
    fn test_fifth_failure_locks_out() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();

        for _ in 0..4 {
            policy.record_failure(now);
        }
        let state = policy.record_failure(now);
        assert_eq!(
            state,
            LockoutState::LockedOut {
                deadline: now + Duration::from_secs(30)
            }
        );
        assert_eq!(
            policy.check(now + Duration::from_secs(10)),
            AttemptDecision::LockedOut {
                remaining: Duration::from_secs(20)
            }
        );
        assert_eq!(policy.countdown_ticks(now), 30);
        assert_eq!(policy.countdown_ticks(now + Duration::from_millis(29_001)), 1);
    }

    #[test]
    fn test_remaining_secs_independent_of_tick() {
        let settings = LockoutSettings {
            countdown_interval_ms: 250,
            ..LockoutSettings::default()
        };
        let mut policy = LockoutPolicy::new(settings);
        let now = Instant::now();
        for _ in 0..5 {
            policy.record_failure(now);
        }

        assert_eq!(policy.remaining_secs(now), 30);
        assert_eq!(policy.countdown_ticks(now), 120);
        assert_eq!(policy.remaining_secs(now + Duration::from_millis(29_500)), 1);
        assert_eq!(policy.remaining_secs(now + Duration::from_secs(30)), 0);
    }

    #[test]
    fn test_lockout_expires() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();
        for _ in 0..5 {
            policy.record_failure(now);
        }

        let later = now + FAILED_ATTEMPT_TIMEOUT;
        assert_eq!(policy.state(later), LockoutState::Idle);
        assert_eq!(policy.remaining(later), Duration::ZERO);
        assert_eq!(policy.failed_attempts(), 5);
    }

    #[test]
    fn test_lockout_repeats_every_five() {
        let mut policy = LockoutPolicy::default();
        let mut now = Instant::now();
        for i in 1..=10 {
            let state = policy.record_failure(now);
            let locked = matches!(state, LockoutState::LockedOut { .. });
            assert_eq!(locked, i % 5 == 0, "attempt {}", i);
            now += FAILED_ATTEMPT_TIMEOUT;
        }
    }

    #[test]
    fn test_reset_required_after_twenty() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();
        let mut last = LockoutState::Idle;
        for _ in 0..20 {
            last = policy.record_failure(now);
        }
        assert_eq!(last, LockoutState::ResetRequired);
        assert_eq!(
            policy.check(now + Duration::from_secs(3600)),
            AttemptDecision::ResetRequired
        );
        assert!(!policy.should_warn());
    }

    #[test]
    fn test_success_resets() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();
        for _ in 0..7 {
            policy.record_failure(now);
        }
        policy.record_success();
        assert_eq!(policy.failed_attempts(), 0);
        assert_eq!(policy.state(now), LockoutState::Idle);
        assert!(policy.deadline().is_none());
    }

    #[test]
    fn test_wipe_grace_warning() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();
        for _ in 0..14 {
            policy.record_failure(now);
        }
        assert!(!policy.should_warn());
        policy.record_failure(now);
        assert_eq!(policy.attempts_before_reset(), 5);
        assert!(policy.should_warn());
    }

    #[test]
    fn test_deadline_arithmetic() {
        let settings = LockoutSettings::default();
        let now = Instant::now();
        assert_eq!(settings.deadline_from(now) - now, Duration::from_secs(30));

        assert_eq!(compute_lockout_deadline(now), now + Duration::from_secs(30));
        assert_eq!(compute_lockout_deadline(now), settings.deadline_from(now));
    }

    #[test]
    fn test_record_roundtrip_keeps_lockout() {
        let mut policy = LockoutPolicy::default();
        let now = Instant::now();
        let wall = Utc::now();
        for _ in 0..5 {
            policy.record_failure(now);
        }

        let record = policy.to_record(now + Duration::from_secs(10), wall);
        assert_eq!(record.failed_attempts, 5);
        assert_eq!(record.deadline, Some(wall + chrono::Duration::seconds(20)));

        let restored =
            LockoutPolicy::from_record(&record, LockoutSettings::default(), now, wall);
        assert_eq!(restored.failed_attempts(), 5);
        assert_eq!(restored.remaining(now), Duration::from_secs(20));
    }

    #[test]
    fn test_record_discards_bogus_deadline() {
        let wall = Utc::now();
        let now = Instant::now();

        let stale = LockoutRecord {
            failed_attempts: 5,
            deadline: Some(wall - chrono::Duration::seconds(1)),
        };
        let policy = LockoutPolicy::from_record(&stale, LockoutSettings::default(), now, wall);
        assert_eq!(policy.state(now), LockoutState::Idle);

        let too_far = LockoutRecord {
            failed_attempts: 5,
            deadline: Some(wall + chrono::Duration::seconds(3600)),
        };
        let policy = LockoutPolicy::from_record(&too_far, LockoutSettings::default(), now, wall);
        assert!(policy.deadline().is_none());
    }

    #[test]
    fn test_record_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockout.json");

        assert_eq!(LockoutRecord::load(&path).unwrap(), LockoutRecord::default());

        let record = LockoutRecord {
            failed_attempts: 3,
            deadline: None,
        };
        record.save(&path).unwrap();
        assert_eq!(LockoutRecord::load(&path).unwrap(), record);
    }
}
