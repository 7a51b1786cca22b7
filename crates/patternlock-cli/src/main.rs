//! PatternLock CLI
//!
//! Operator front-end over `patternlock-core`. Patterns are written in their
//! digit form, one digit per cell (`row * 3 + col`), e.g. `0148`.
//!
//! # Usage
//! ```bash
//! patternlock --dir /var/lib/patternlock set 01258 --confirm 01258
//! patternlock --dir /var/lib/patternlock check 01258
//! patternlock --dir /var/lib/patternlock status --json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use patternlock_core::codec::{self, Cell};
use patternlock_core::{
    validate_for_enrollment, AttemptOutcome, CredentialStore, Enrollment, EnrollmentStep,
    LockConfig, LockoutPolicy, LockoutRecord, Pattern, PatternGuard,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Lockout snapshot kept next to the credential file
const LOCKOUT_FILE: &str = "lockout.json";

/// PatternLock - 3x3 gesture credential store
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding the credential file
    #[arg(short, long, value_name = "DIR", default_value = ".patternlock")]
    dir: PathBuf,

    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a new pattern
    Set {
        /// Pattern digits
        pattern: String,

        /// Second draw; the pattern is only saved if both agree
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Attempt an unlock, honouring the lockout state
    Check {
        /// Pattern digits
        pattern: String,
    },

    /// Remove the stored pattern
    Clear,

    /// Clear the pattern and the failure counter after alternate recovery
    Reset,

    /// Show whether a pattern is set and the lockout state
    Status {
        /// Output in JSON format for integrations
        #[arg(long)]
        json: bool,
    },

    /// Encode cells given as row,col into pattern digits
    Encode {
        /// Cells, e.g. 0,0 0,1 1,1
        #[arg(required = true)]
        cells: Vec<String>,
    },

    /// Decode pattern digits into cells
    Decode {
        /// Pattern digits
        digits: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => LockConfig::from_file(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => LockConfig::default(),
    };
    tracing::debug!(?config, dir = %cli.dir.display(), "Configuration loaded");

    match cli.command {
        Commands::Set { pattern, confirm } => set(&cli.dir, &config, &pattern, confirm.as_deref()),
        Commands::Check { pattern } => check(&cli.dir, &config, &pattern),
        Commands::Clear => {
            let store = CredentialStore::open(&cli.dir, &config)?;
            store.clear()?;
            println!("Pattern cleared");
            Ok(())
        }
        Commands::Reset => {
            let guard = open_guard(&cli.dir, &config)?;
            guard.reset_after_recovery()?;
            save_lockout(&cli.dir, &guard)?;
            println!("Pattern and failed attempts reset");
            Ok(())
        }
        Commands::Status { json } => status(&cli.dir, &config, json),
        Commands::Encode { cells } => {
            let pattern = cells
                .iter()
                .map(|c| c.parse::<Cell>())
                .collect::<patternlock_core::Result<Pattern>>()?;
            println!("{}", pattern);
            Ok(())
        }
        Commands::Decode { digits } => {
            let pattern = codec::from_string_form(&digits)?;
            let cells: Vec<String> = pattern.iter().map(ToString::to_string).collect();
            println!("{}", cells.join(" "));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_pattern(digits: &str) -> Result<Pattern> {
    codec::from_string_form(digits).with_context(|| format!("Invalid pattern '{}'", digits))
}

fn set(dir: &Path, config: &LockConfig, pattern: &str, confirm: Option<&str>) -> Result<()> {
    let store = CredentialStore::open(dir, config)?;
    let first = parse_pattern(pattern)?;

    match confirm {
        Some(second) => {
            let second = parse_pattern(second)?;
            let mut enrollment = Enrollment::new(&store, config.min_pattern_len);
            enrollment.submit(&first)?;
            if enrollment.submit(&second)? == EnrollmentStep::Mismatch {
                bail!("Patterns do not match, nothing saved");
            }
        }
        None => {
            validate_for_enrollment(&first, config.min_pattern_len)?;
            store.save(Some(first.cells()))?;
        }
    }

    println!("Pattern saved to {}", store.path().display());
    Ok(())
}

fn check(dir: &Path, config: &LockConfig, digits: &str) -> Result<()> {
    let pattern = parse_pattern(digits)?;
    let guard = open_guard(dir, config)?;
    let outcome = guard.attempt(&pattern);
    save_lockout(dir, &guard)?;

    match outcome {
        AttemptOutcome::Unlocked => println!("Unlocked"),
        AttemptOutcome::Unverified(reason) => {
            println!("Unlocked (no credential checked: {:?})", reason)
        }
        AttemptOutcome::Unavailable(reason) => {
            println!("Refused, credential unavailable: {:?}", reason)
        }
        AttemptOutcome::Rejected {
            failed_attempts,
            attempts_before_lockout,
            warn_reset,
        } => {
            println!(
                "Wrong pattern ({} failed, {} before lockout)",
                failed_attempts, attempts_before_lockout
            );
            if warn_reset {
                println!(
                    "Warning: {} attempts left before alternate recovery is required",
                    guard.lockout().attempts_before_reset()
                );
            }
        }
        AttemptOutcome::LockedOut { remaining } => {
            println!("Locked out, try again in {}s", remaining.as_millis().div_ceil(1000))
        }
        AttemptOutcome::ResetRequired => {
            println!("Too many failed attempts, run 'reset' after alternate recovery")
        }
    }

    if !outcome.is_unlocked() {
        std::process::exit(1);
    }
    Ok(())
}

fn status(dir: &Path, config: &LockConfig, json: bool) -> Result<()> {
    let guard = open_guard(dir, config)?;
    let lockout = guard.lockout();
    let now = Instant::now();
    let store = guard.store();

    if json {
        let value = status_json(store, &lockout, now);
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("CREDENTIAL: {}", if store.exists() { "set" } else { "not set" });
        println!("FILE: {}", store.path().display());
        println!("ALGORITHM: {}", store.algorithm());
        println!("FAILED ATTEMPTS: {}", lockout.failed_attempts());
        let secs = lockout.remaining_secs(now);
        if secs > 0 {
            println!("LOCKED OUT: {}s", secs);
        }
    }
    Ok(())
}

fn status_json(
    store: &CredentialStore,
    lockout: &LockoutPolicy,
    now: Instant,
) -> serde_json::Value {
    serde_json::json!({
        "credential_set": store.exists(),
        "path": store.path(),
        "algorithm": store.algorithm(),
        "failed_attempts": lockout.failed_attempts(),
        "lockout_remaining_secs": lockout.remaining_secs(now),
        "attempts_before_reset": lockout.attempts_before_reset(),
    })
}

fn open_guard(dir: &Path, config: &LockConfig) -> Result<PatternGuard> {
    let store = CredentialStore::open(dir, config)?;
    let record = LockoutRecord::load(dir.join(LOCKOUT_FILE))?;
    let policy = LockoutPolicy::from_record(
        &record,
        config.lockout.clone(),
        Instant::now(),
        chrono::Utc::now(),
    );
    Ok(PatternGuard::with_policy(store, policy, config.failure_policy))
}

fn save_lockout(dir: &Path, guard: &PatternGuard) -> Result<()> {
    guard
        .lockout()
        .to_record(Instant::now(), chrono::Utc::now())
        .save(dir.join(LOCKOUT_FILE))
        .context("Saving lockout state")
}
