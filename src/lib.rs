//! Veriplay - Provably Fair Outcome Engine
//!
//! Deterministic, cryptographically-committed outcome generation for
//! casino games, plus the seed commitment lifecycle that makes every
//! outcome publicly auditable.
//!
//! Three properties hold simultaneously:
//! - outcomes are unpredictable before play (secret server seeds, a
//!   pre-generated hash chain, and external block-hash entropy);
//! - outcomes are non-repudiable after play (anyone can recompute them
//!   bit-identically from revealed inputs);
//! - the operator cannot adapt inputs to observed outcomes (every seed's
//!   hash is published before the seed handles its first bet).

pub mod config;
pub mod crash;
pub mod errors;
pub mod games;
pub mod normalizer;
pub mod seeds;
pub mod storage;
pub mod verify;

pub use config::{CrashConfig, EngineConfig};
pub use crash::{chain_metadata, chain_seed, crash_point, generate_chain, ChainMetadata, CrashRound, CrashRounds};
pub use errors::{ContractError, EngineError, EngineResult, IntegrityError, StateError, StorageError};
pub use games::{
    derive_outcome, outcome_digest, GameRequest, GameType, KenoParams, LimboParams, MinesParams,
    Outcome, OutcomeValue, PlinkoParams, PlinkoRisk,
};
pub use normalizer::bytes_to_fraction;
pub use seeds::{
    generate_seed, sha256_hex, ActiveSeedInfo, BetSeed, CommitmentStatus, RotationReceipt,
    SeedHistoryEntry, SeedPair, SeedService, SeedState,
};
pub use storage::{KvStore, MemoryStore, RocksStore};
pub use verify::{
    verify_chain_full, verify_chain_sample, verify_outcome, verify_seed_hash, ChainAudit,
    LinkFailure, SeedHashReport, VerifyReport,
};
