//! Two-step pattern enrollment
//!
//! A new pattern is drawn twice: the first draw is checked against the
//! enrollment rules, the second must repeat it exactly before anything is
//! written. Length and distinctness are enforced here, not in the codec or
//! the store.

use crate::codec::{Cell, Pattern};
use crate::error::{PatternLockError, Result};
use crate::store::CredentialStore;

/// Where an enrollment stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStage {
    AwaitingFirst,
    AwaitingConfirm,
    Complete,
}

/// What a submitted draw did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStep {
    /// First draw accepted, draw it again
    ConfirmRequested,
    /// Second draw differed, start over
    Mismatch,
    /// Both draws agreed and the credential was written
    Saved,
}

/// Check a pattern against the enrollment rules
pub fn validate_for_enrollment(pattern: &[Cell], min_len: usize) -> Result<()> {
    if pattern.len() < min_len {
        return Err(PatternLockError::PatternTooShort {
            len: pattern.len(),
            min: min_len,
        });
    }
    Pattern::new(pattern.to_vec()).validate_distinct()
}

/// Enrollment session writing into a store
pub struct Enrollment<'a> {
    store: &'a CredentialStore,
    min_len: usize,
    first: Option<Pattern>,
    complete: bool,
}

impl<'a> Enrollment<'a> {
    pub fn new(store: &'a CredentialStore, min_len: usize) -> Self {
        Self {
            store,
            min_len,
            first: None,
            complete: false,
        }
    }

    pub fn stage(&self) -> EnrollmentStage {
        match (&self.first, self.complete) {
            (_, true) => EnrollmentStage::Complete,
            (Some(_), false) => EnrollmentStage::AwaitingConfirm,
            (None, false) => EnrollmentStage::AwaitingFirst,
        }
    }

    /// Feed one completed draw.
    ///
    /// A draw after completion starts a new enrollment.
    pub fn submit(&mut self, pattern: &[Cell]) -> Result<EnrollmentStep> {
        if self.complete {
            self.reset();
        }

        match self.first.take() {
            None => {
                validate_for_enrollment(pattern, self.min_len)?;
                self.first = Some(Pattern::new(pattern.to_vec()));
                Ok(EnrollmentStep::ConfirmRequested)
            }
            Some(first) if first.cells() == pattern => {
                if let Err(e) = self.store.save(Some(pattern)) {
                    // Keep the first draw so the caller can retry the confirmation
                    self.first = Some(first);
                    return Err(e);
                }
                self.complete = true;
                Ok(EnrollmentStep::Saved)
            }
            Some(_) => {
                tracing::debug!("Confirmation draw differs, restarting enrollment");
                Ok(EnrollmentStep::Mismatch)
            }
        }
    }

    pub fn reset(&mut self) {
        self.first = None;
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockout::MIN_PATTERN_LEN;

    fn pattern(coords: &[(u8, u8)]) -> Pattern {
        Pattern::from_coords(coords).unwrap()
    }

    #[test]
    fn test_enroll_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open_default(dir.path()).unwrap();
        let mut enrollment = Enrollment::new(&store, MIN_PATTERN_LEN);
        let p = pattern(&[(0, 0), (0, 1), (0, 2), (1, 1)]);

        assert_eq!(enrollment.stage(), EnrollmentStage::AwaitingFirst);
        assert_eq!(enrollment.submit(&p).unwrap(), EnrollmentStep::ConfirmRequested);
        assert_eq!(enrollment.stage(), EnrollmentStage::AwaitingConfirm);
        assert!(!store.exists());

        assert_eq!(enrollment.submit(&p).unwrap(), EnrollmentStep::Saved);
        assert_eq!(enrollment.stage(), EnrollmentStage::Complete);
        assert!(store.exists());
        assert!(store.verify_strict(&p));
    }

    #[test]
    fn test_enroll_mismatch_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open_default(dir.path()).unwrap();
        let mut enrollment = Enrollment::new(&store, MIN_PATTERN_LEN);

        enrollment
            .submit(&pattern(&[(0, 0), (0, 1), (0, 2), (1, 1)]))
            .unwrap();
        let step = enrollment
            .submit(&pattern(&[(0, 0), (0, 1), (0, 2), (1, 2)]))
            .unwrap();
        assert_eq!(step, EnrollmentStep::Mismatch);
        assert_eq!(enrollment.stage(), EnrollmentStage::AwaitingFirst);
        assert!(!store.exists());
    }

    #[test]
    fn test_enroll_rejects_short_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open_default(dir.path()).unwrap();
        let mut enrollment = Enrollment::new(&store, MIN_PATTERN_LEN);

        let err = enrollment
            .submit(&pattern(&[(0, 0), (0, 1), (1, 1)]))
            .unwrap_err();
        assert!(matches!(
            err,
            PatternLockError::PatternTooShort { len: 3, min: 4 }
        ));
        assert_eq!(enrollment.stage(), EnrollmentStage::AwaitingFirst);
    }

    #[test]
    fn test_enroll_rejects_repeated_cell() {
        let err = validate_for_enrollment(&pattern(&[(0, 0), (0, 1), (0, 0), (1, 1)]), 4)
            .unwrap_err();
        assert!(matches!(err, PatternLockError::RepeatedCell { .. }));
    }

    #[test]
    fn test_submit_after_complete_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open_default(dir.path()).unwrap();
        let mut enrollment = Enrollment::new(&store, MIN_PATTERN_LEN);
        let p = pattern(&[(2, 2), (1, 1), (0, 0), (0, 1)]);
        enrollment.submit(&p).unwrap();
        enrollment.submit(&p).unwrap();

        assert_eq!(enrollment.submit(&p).unwrap(), EnrollmentStep::ConfirmRequested);
    }
}
