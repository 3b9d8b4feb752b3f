//! Public verification: recompute outcomes and audit commitments.
//!
//! Everything here works from revealed inputs only. A verifier re-derives
//! the claimed outcome with the same pure functions the engine used and
//! compares; chain audits recompute hash links and report the exact
//! failing index rather than correcting anything.

use crate::crash::{chain_metadata, chain_seed};
use crate::errors::{ContractError, EngineResult, IntegrityError, StateError};
use crate::games::{derive_outcome, GameRequest, Outcome, OutcomeValue};
use crate::seeds::{sha256_hex, CommitmentStatus, SeedService};
use crate::storage::KvStore;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tolerance for floating multiplier comparison. Discrete outcomes are
/// compared exactly.
pub const MULTIPLIER_EPSILON: f64 = 0.01;

/// Result of re-deriving a claimed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub is_valid: bool,
    pub recomputed: Outcome,
}

/// Result of a seed-hash lookup: the seed is revealed only once archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedHashReport {
    pub is_active: bool,
    pub revealed_seed: Option<String>,
}

/// One broken chain link, with both sides of the mismatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkFailure {
    pub index: u64,
    pub computed: String,
    pub stored: String,
}

/// Outcome of a chain audit. Failures are collected, never corrected.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainAudit {
    pub checked_links: u64,
    pub link_failures: Vec<LinkFailure>,
    /// `None` when the audit did not include the endpoint checks.
    pub terminating_hash_ok: Option<bool>,
    pub secret_ok: Option<bool>,
}

impl ChainAudit {
    pub fn is_valid(&self) -> bool {
        self.link_failures.is_empty()
            && self.terminating_hash_ok.unwrap_or(true)
            && self.secret_ok.unwrap_or(true)
    }
}

fn validate_hash(hash: &str) -> EngineResult<()> {
    if hash.len() != 64 {
        return Err(ContractError::InvalidHash {
            value: hash.to_string(),
            reason: format!("expected 64 hex characters, got {}", hash.len()),
        }
        .into());
    }
    if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ContractError::InvalidHash {
            value: hash.to_string(),
            reason: "contains non-hex characters".into(),
        }
        .into());
    }
    Ok(())
}

/// Recomputes the outcome for the revealed inputs and compares against
/// the claim.
pub fn verify_outcome(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    request: &GameRequest,
    claimed: &OutcomeValue,
) -> VerifyReport {
    let recomputed = derive_outcome(server_seed, client_seed, nonce, request);
    let is_valid = outcomes_match(&recomputed.value, claimed);
    VerifyReport {
        is_valid,
        recomputed,
    }
}

fn outcomes_match(recomputed: &OutcomeValue, claimed: &OutcomeValue) -> bool {
    match (recomputed, claimed) {
        // Dice rolls live on a 0.01 grid; half a step distinguishes
        // neighbors while absorbing serialization rounding.
        (OutcomeValue::Dice { roll: a }, OutcomeValue::Dice { roll: b }) => (a - b).abs() < 0.005,
        (OutcomeValue::Limbo { multiplier: a }, OutcomeValue::Limbo { multiplier: b }) => {
            (a - b).abs() <= MULTIPLIER_EPSILON
        }
        (OutcomeValue::Roulette { pocket: a }, OutcomeValue::Roulette { pocket: b }) => a == b,
        (OutcomeValue::Plinko { bucket: a }, OutcomeValue::Plinko { bucket: b }) => a == b,
        (OutcomeValue::Mines { positions: a }, OutcomeValue::Mines { positions: b }) => a == b,
        (OutcomeValue::Keno { numbers: a }, OutcomeValue::Keno { numbers: b }) => a == b,
        _ => false,
    }
}

/// Looks up a published commitment hash.
///
/// Archived pairs come back with their revealed seed, re-checked against
/// the commitment; pairs still in use are reported active with no seed.
pub fn verify_seed_hash<S: KvStore>(
    seeds: &SeedService<S>,
    hash: &str,
) -> EngineResult<SeedHashReport> {
    validate_hash(hash)?;

    match seeds.lookup_commitment(hash)? {
        CommitmentStatus::StillActive { .. } => Ok(SeedHashReport {
            is_active: true,
            revealed_seed: None,
        }),
        CommitmentStatus::Revealed(entry) => {
            let actual = sha256_hex(&entry.server_seed);
            if actual != hash {
                return Err(IntegrityError::CommitmentMismatch {
                    expected: hash.to_string(),
                    actual,
                }
                .into());
            }
            Ok(SeedHashReport {
                is_active: false,
                revealed_seed: Some(entry.server_seed),
            })
        }
    }
}

fn check_link<S: KvStore>(store: &S, index: u64, audit: &mut ChainAudit) -> EngineResult<()> {
    let seed = chain_seed(store, index)?
        .ok_or(StateError::ChainExhausted(index))?;
    let prev = chain_seed(store, index - 1)?
        .ok_or(StateError::ChainExhausted(index - 1))?;

    let computed = sha256_hex(&seed);
    audit.checked_links += 1;
    if computed != prev {
        tracing::warn!(index, %computed, stored = %prev, "chain link mismatch");
        audit.link_failures.push(LinkFailure {
            index,
            computed,
            stored: prev,
        });
    }
    Ok(())
}

/// Spot-checks `samples` random links of the generated chain:
/// `SHA256(seed[i])` must equal `seed[i - 1]`.
pub fn verify_chain_sample<S: KvStore>(store: &S, samples: usize) -> EngineResult<ChainAudit> {
    let meta = chain_metadata(store)?.ok_or(StateError::ChainNotGenerated)?;
    let mut audit = ChainAudit::default();
    if meta.length < 2 {
        return Ok(audit);
    }

    let mut rng = rand::thread_rng();
    for _ in 0..samples {
        let index = rng.gen_range(2..=meta.length);
        check_link(store, index, &mut audit)?;
    }
    Ok(audit)
}

/// Full audit: sampled links plus both endpoints — the terminating hash
/// commitment over `seed[1]` and the revealed secret at `seed[N]`.
pub fn verify_chain_full<S: KvStore>(
    store: &S,
    revealed_secret: &str,
    samples: usize,
) -> EngineResult<ChainAudit> {
    let meta = chain_metadata(store)?.ok_or(StateError::ChainNotGenerated)?;
    let mut audit = verify_chain_sample(store, samples)?;

    let first = chain_seed(store, 1)?.ok_or(StateError::ChainExhausted(1))?;
    let computed = sha256_hex(&first);
    if computed != meta.terminating_hash {
        tracing::warn!(%computed, published = %meta.terminating_hash, "terminating hash mismatch");
    }
    audit.terminating_hash_ok = Some(computed == meta.terminating_hash);

    let last = chain_seed(store, meta.length)?.ok_or(StateError::ChainExhausted(meta.length))?;
    audit.secret_ok = Some(last == revealed_secret);

    Ok(audit)
}
