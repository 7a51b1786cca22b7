//! PatternLock Core - local gesture credential verification
//!
//! A user traces a pattern over a 3x3 grid. The pattern is encoded to bytes,
//! hashed, and kept in a single credential file; later attempts are hashed the
//! same way and compared against it, behind a failed-attempt lockout.
//!
//! # Architecture
//!
//! 1. **Codec** (`codec`): pattern <-> bytes, digests. Pure.
//! 2. **Store** (`store`): the credential file and its cached "is set" flag.
//! 3. **Lockout** (`lockout`): failure counting, timed lockouts, reset threshold.
//! 4. **Guard** (`guard`): attempt flow composing store and lockout.
//! 5. **Enrollment** (`enroll`): draw-twice setup of a new pattern.
//!
//! # Quick Start
//!
//! ```no_run
//! use patternlock_core::{CredentialStore, LockConfig, Pattern, PatternGuard};
//!
//! let config = LockConfig::default();
//! let store = CredentialStore::open("/var/lib/patternlock", &config).unwrap();
//!
//! let pattern = Pattern::from_coords(&[(0, 0), (0, 1), (1, 1), (2, 2)]).unwrap();
//! store.save(Some(pattern.cells())).unwrap();
//!
//! let guard = PatternGuard::new(store, &config);
//! assert!(guard.attempt(&pattern).is_unlocked());
//! ```

pub mod codec;
pub mod config;
pub mod enroll;
pub mod error;
pub mod guard;
pub mod lockout;
pub mod store;

pub use codec::{decode, digest, encode, Cell, Digest, DigestAlgorithm, Pattern};
pub use config::LockConfig;
pub use enroll::{validate_for_enrollment, Enrollment, EnrollmentStage, EnrollmentStep};
pub use error::{PatternLockError, Result, ResultExt};
pub use guard::{AttemptOutcome, FailurePolicy, PatternGuard};
pub use lockout::{
    compute_lockout_deadline, AttemptDecision, LockoutPolicy, LockoutRecord, LockoutSettings,
    LockoutState, MIN_PATTERN_LEN,
};
pub use store::{ChangeKind, CredentialStore, VerifyOutcome, DEFAULT_FILE_NAME};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
