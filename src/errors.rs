//! Error types for the veriplay outcome engine.
//!
//! The taxonomy mirrors how failures are handled: contract violations are
//! rejected synchronously and never coerced, state conflicts are retried by
//! the caller, integrity failures are surfaced for manual investigation,
//! and storage failures abort the operation with no partial state change.

use thiserror::Error;

/// Root error type for all engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller supplied malformed or out-of-range input.
    #[error("contract violation: {0}")]
    Contract(#[from] ContractError),

    /// Operation raced with a conflicting state transition.
    #[error("state conflict: {0}")]
    State(#[from] StateError),

    /// Cryptographic commitment or chain link did not check out.
    #[error("integrity failure: {0}")]
    Integrity(#[from] IntegrityError),

    /// Underlying key-value store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Malformed caller input, rejected before any state is touched.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid seed hash '{value}': {reason}")]
    InvalidHash { value: String, reason: String },

    #[error("invalid client seed: {0}")]
    InvalidClientSeed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidParam {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Conflicting or missing lifecycle state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no seed pair or history entry matches commitment {0}")]
    UnknownCommitment(String),

    #[error("crash chain has not been generated")]
    ChainNotGenerated,

    #[error("crash chain exhausted at index {0}")]
    ChainExhausted(u64),
}

/// A recomputed hash disagreed with a stored or published one.
///
/// Never auto-corrected: both hashes are carried so an operator can
/// investigate the exact mismatch.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("revealed seed hashes to {actual}, published commitment is {expected}")]
    CommitmentMismatch { expected: String, actual: String },
}

/// Key-value store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database open failed: {0}")]
    OpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted record at {key}: {reason}")]
    CorruptedData { key: String, reason: String },
}

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
