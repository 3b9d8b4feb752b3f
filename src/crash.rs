//! Crash hash chain: offline backward generation, forward consumption.
//!
//! The chain is generated once, from a random secret at index N down to
//! index 1, each entry the SHA-256 of its successor. Play consumes entries
//! in ascending order, so every revealed seed is only a one-way hash of a
//! seed not yet revealed; nobody can project future rounds from past ones.
//! `SHA256(seed[1])` is published as the terminating hash before any round
//! is played, which commits the operator to the entire chain up front.

use crate::config::CrashConfig;
use crate::errors::{ContractError, EngineResult, StateError, StorageError};
use crate::seeds::sha256_hex;
use crate::storage::KvStore;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const SEED_PREFIX: &str = "chain:seed:";
const META_KEY: &[u8] = b"chain:meta";
const CHECKPOINT_KEY: &[u8] = b"chain:checkpoint";
const GAME_STATE_KEY: &[u8] = b"crash:state";

/// Hard cap on the crash multiplier.
pub const MAX_CRASH_POINT: f64 = 1000.0;

/// Published description of a generated chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainMetadata {
    pub length: u64,
    /// SHA-256 of `seed[1]`; public commitment to the whole chain.
    pub terminating_hash: String,
    /// SHA-256 of the generating secret; ties the stored chain to it.
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Durable cursor for an in-progress generation run.
///
/// Generation walks from N down to 1; the checkpoint carries the next
/// index to write and the seed belonging to it, so an aborted run resumes
/// without recomputing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationCheckpoint {
    next_index: u64,
    next_seed: String,
    /// Guards against resuming with a different secret.
    secret_hash: String,
}

/// A resolved crash round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashRound {
    pub index: u64,
    /// The chain seed consumed by this round, revealed at resolution.
    pub server_seed: String,
    pub crash_point: f64,
}

fn seed_key(index: u64) -> Vec<u8> {
    // Zero-padded to ten digits; covers the full 10M-entry production chain.
    format!("{SEED_PREFIX}{index:010}").into_bytes()
}

fn parse_u64_le(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(arr))
}

/// Loads one chain entry.
pub fn chain_seed<S: KvStore>(store: &S, index: u64) -> EngineResult<Option<String>> {
    Ok(store
        .get(&seed_key(index))?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Loads the chain metadata, if a chain has been fully generated.
pub fn chain_metadata<S: KvStore>(store: &S) -> EngineResult<Option<ChainMetadata>> {
    match store.get(META_KEY)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| {
            StorageError::CorruptedData {
                key: "chain:meta".into(),
                reason: e.to_string(),
            }
        })?)),
        None => Ok(None),
    }
}

/// Generates (or resumes generating) the full hash chain.
///
/// Entries are written in fixed-size batches, each batch atomically
/// paired with an updated checkpoint, so an aborted run loses at most one
/// unwritten batch and resumes from the last durable cursor. Returns the
/// metadata with the terminating hash; the caller must publish that hash
/// before any round is played.
pub fn generate_chain<S: KvStore>(
    store: &S,
    secret: &str,
    config: &CrashConfig,
) -> EngineResult<ChainMetadata> {
    if secret.is_empty() {
        return Err(ContractError::InvalidParam {
            field: "secret",
            value: String::new(),
            reason: "must not be empty",
        }
        .into());
    }
    config.validate()?;

    let secret_hash = sha256_hex(secret);
    if let Some(meta) = chain_metadata(store)? {
        if meta.secret_hash != secret_hash {
            return Err(ContractError::InvalidParam {
                field: "secret",
                value: secret_hash,
                reason: "does not match the secret of the stored chain",
            }
            .into());
        }
        tracing::info!(length = meta.length, "chain already generated");
        return Ok(meta);
    }

    let (mut index, mut current) = match store.get(CHECKPOINT_KEY)? {
        Some(bytes) => {
            let cp: GenerationCheckpoint =
                bincode::deserialize(&bytes).map_err(|e| StorageError::CorruptedData {
                    key: "chain:checkpoint".into(),
                    reason: e.to_string(),
                })?;
            if cp.secret_hash != secret_hash {
                return Err(ContractError::InvalidParam {
                    field: "secret",
                    value: secret_hash,
                    reason: "does not match the secret of the interrupted run",
                }
                .into());
            }
            tracing::info!(next_index = cp.next_index, "resuming chain generation");
            (cp.next_index, cp.next_seed)
        }
        None => (config.chain_length, secret.to_string()),
    };

    let mut pending: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(config.batch_size + 1);
    loop {
        pending.push((seed_key(index), current.clone().into_bytes()));

        if index == 1 {
            let meta = ChainMetadata {
                length: config.chain_length,
                terminating_hash: sha256_hex(&current),
                secret_hash,
                created_at: Utc::now(),
            };
            pending.push((
                META_KEY.to_vec(),
                bincode::serialize(&meta).map_err(|e| StorageError::WriteFailed(e.to_string()))?,
            ));
            store.batch_write(&pending)?;
            tracing::info!(
                length = meta.length,
                terminating_hash = %meta.terminating_hash,
                "chain generation complete"
            );
            return Ok(meta);
        }

        current = sha256_hex(&current);
        index -= 1;

        if pending.len() >= config.batch_size {
            let checkpoint = GenerationCheckpoint {
                next_index: index,
                next_seed: current.clone(),
                secret_hash: secret_hash.clone(),
            };
            pending.push((
                CHECKPOINT_KEY.to_vec(),
                bincode::serialize(&checkpoint)
                    .map_err(|e| StorageError::WriteFailed(e.to_string()))?,
            ));
            store.batch_write(&pending)?;
            pending.clear();

            if config.write_throttle_ms > 0 {
                std::thread::sleep(Duration::from_millis(config.write_throttle_ms));
            }
        }
    }
}

/// Crash point for one round: HMAC-SHA256 of the external block hash keyed
/// by the round's chain seed, first four digest bytes normalized to [0, 1].
///
/// A normalized draw below the house edge is an instant crash at 1.00x;
/// otherwise the edge is folded out and the point is `1 / (1 - adjusted)`,
/// clamped to `[1.00, 1000.00]` and rounded to two decimals.
pub fn crash_point(server_seed: &str, block_hash: &str, house_edge: f64) -> f64 {
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(block_hash.as_bytes());
    let digest = mac.finalize().into_bytes();

    let draw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let normalized = draw as f64 / u32::MAX as f64;

    if normalized < house_edge {
        return 1.0;
    }

    let adjusted = ((normalized - house_edge) / (1.0 - house_edge)).clamp(0.0, 0.999_999_999_9);
    let point = (1.0 / (1.0 - adjusted)).clamp(1.0, MAX_CRASH_POINT);
    (point * 100.0).round() / 100.0
}

/// Forward consumer of the generated chain.
///
/// `current_game_index` is the single serialization point for the crash
/// subsystem: exactly one round is current at a time, the index is
/// persisted on every advance, and a restarted process resumes from the
/// last persisted value.
pub struct CrashRounds<S: KvStore> {
    store: Arc<S>,
    house_edge: f64,
    advance: Mutex<()>,
}

impl<S: KvStore> CrashRounds<S> {
    pub fn new(store: Arc<S>, house_edge: f64) -> Self {
        Self {
            store,
            house_edge,
            advance: Mutex::new(()),
        }
    }

    /// Index of the round that will be resolved next. Starts at 1.
    pub fn current_index(&self) -> EngineResult<u64> {
        Ok(self
            .store
            .get(GAME_STATE_KEY)?
            .and_then(|b| parse_u64_le(&b))
            .unwrap_or(1))
    }

    /// Resolves the current round against the externally supplied block
    /// hash, persisting the advanced index before returning.
    pub fn resolve_round(&self, block_hash: &str) -> EngineResult<CrashRound> {
        let _guard = self.advance.lock().expect("crash advance lock poisoned");

        let meta = chain_metadata(self.store.as_ref())?.ok_or(StateError::ChainNotGenerated)?;
        let index = self.current_index()?;
        if index > meta.length {
            return Err(StateError::ChainExhausted(index).into());
        }

        let server_seed = chain_seed(self.store.as_ref(), index)?.ok_or_else(|| {
            StorageError::CorruptedData {
                key: format!("{SEED_PREFIX}{index:010}"),
                reason: "chain entry missing inside generated range".into(),
            }
        })?;

        let point = crash_point(&server_seed, block_hash, self.house_edge);
        self.store
            .put(GAME_STATE_KEY, &(index + 1).to_le_bytes())?;

        tracing::debug!(index, crash_point = point, "resolved crash round");
        Ok(CrashRound {
            index,
            server_seed,
            crash_point: point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const SECRET: &str = "fixed_test_secret_0123456789abcdef";
    const BLOCK_HASH: &str =
        "00000000000000000002c7b1d6a1a2f8bc7e2f4a9d8e1c6b5a4f3e2d1c0b9a87";

    fn small_config() -> CrashConfig {
        CrashConfig {
            chain_length: 10,
            batch_size: 3,
            write_throttle_ms: 0,
            house_edge: 0.01,
        }
    }

    /// Reference chain computed independently of the generator.
    fn reference_chain(secret: &str, length: u64) -> Vec<String> {
        let mut seeds = vec![String::new(); length as usize + 1];
        seeds[length as usize] = secret.to_string();
        for i in (1..length as usize).rev() {
            seeds[i] = sha256_hex(&seeds[i + 1]);
        }
        seeds
    }

    #[test]
    fn test_chain_links_backward() {
        let store = MemoryStore::new();
        let meta = generate_chain(&store, SECRET, &small_config()).unwrap();
        assert_eq!(meta.length, 10);

        // Every stored entry is the hash of its successor.
        for i in 2..=10u64 {
            let seed_i = chain_seed(&store, i).unwrap().unwrap();
            let seed_prev = chain_seed(&store, i - 1).unwrap().unwrap();
            assert_eq!(sha256_hex(&seed_i), seed_prev, "link broken at {i}");
        }

        let seed_1 = chain_seed(&store, 1).unwrap().unwrap();
        assert_eq!(sha256_hex(&seed_1), meta.terminating_hash);
        assert_eq!(chain_seed(&store, 10).unwrap().unwrap(), SECRET);
    }

    #[test]
    fn test_chain_matches_reference() {
        let store = MemoryStore::new();
        generate_chain(&store, SECRET, &small_config()).unwrap();
        let reference = reference_chain(SECRET, 10);

        assert_eq!(
            chain_seed(&store, 4).unwrap().unwrap(),
            reference[4],
        );
        assert_eq!(sha256_hex(&reference[5]), reference[4]);
    }

    #[test]
    fn test_generation_is_idempotent_once_complete() {
        let store = MemoryStore::new();
        let first = generate_chain(&store, SECRET, &small_config()).unwrap();
        let second = generate_chain(&store, SECRET, &small_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_generation_resumes_from_checkpoint() {
        let reference = reference_chain(SECRET, 10);

        // Simulate an aborted run that wrote indices 10..=6 and a durable
        // checkpoint pointing at index 5.
        let store = MemoryStore::new();
        for i in (6..=10u64).rev() {
            store
                .put(&seed_key(i), reference[i as usize].as_bytes())
                .unwrap();
        }
        let checkpoint = GenerationCheckpoint {
            next_index: 5,
            next_seed: reference[5].clone(),
            secret_hash: sha256_hex(SECRET),
        };
        store
            .put(CHECKPOINT_KEY, &bincode::serialize(&checkpoint).unwrap())
            .unwrap();

        let meta = generate_chain(&store, SECRET, &small_config()).unwrap();

        // Resumed run completes the identical chain.
        let fresh = MemoryStore::new();
        let fresh_meta = generate_chain(&fresh, SECRET, &small_config()).unwrap();
        assert_eq!(meta.terminating_hash, fresh_meta.terminating_hash);
        for i in 1..=10u64 {
            assert_eq!(
                chain_seed(&store, i).unwrap(),
                chain_seed(&fresh, i).unwrap(),
                "mismatch at {i}"
            );
        }
    }

    #[test]
    fn test_completed_chain_rejects_different_secret() {
        let store = MemoryStore::new();
        generate_chain(&store, SECRET, &small_config()).unwrap();

        // Rerunning with another secret must not hand back the stored
        // chain as if that secret had produced it.
        match generate_chain(&store, "a different secret", &small_config()) {
            Err(crate::errors::EngineError::Contract(ContractError::InvalidParam {
                field: "secret",
                ..
            })) => {}
            other => panic!("expected a secret mismatch, got {other:?}"),
        }

        // The original secret still gets the metadata back.
        assert!(generate_chain(&store, SECRET, &small_config()).is_ok());
    }

    #[test]
    fn test_resume_rejects_different_secret() {
        let store = MemoryStore::new();
        let checkpoint = GenerationCheckpoint {
            next_index: 5,
            next_seed: "whatever".into(),
            secret_hash: sha256_hex("the original secret"),
        };
        store
            .put(CHECKPOINT_KEY, &bincode::serialize(&checkpoint).unwrap())
            .unwrap();

        assert!(generate_chain(&store, "a different secret", &small_config()).is_err());
    }

    #[test]
    fn test_crash_point_bounds_and_precision() {
        for i in 0..1_000u64 {
            let point = crash_point(&format!("seed{i}"), BLOCK_HASH, 0.01);
            assert!((1.0..=MAX_CRASH_POINT).contains(&point));
            let scaled = point * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-9, "not two decimals: {point}");
        }
    }

    #[test]
    fn test_crash_point_instant_crash_below_edge() {
        // Recompute the normalized draw for a fixed input, then set the
        // edge just above it: the round must be an instant 1.00x.
        let mut mac = HmacSha256::new_from_slice(b"some_seed").unwrap();
        mac.update(BLOCK_HASH.as_bytes());
        let digest = mac.finalize().into_bytes();
        let draw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let normalized = draw as f64 / u32::MAX as f64;

        assert_eq!(
            crash_point("some_seed", BLOCK_HASH, (normalized + 1e-9).min(1.0)),
            1.0
        );
    }

    #[test]
    fn test_crash_point_deterministic() {
        let a = crash_point("seed", BLOCK_HASH, 0.01);
        let b = crash_point("seed", BLOCK_HASH, 0.01);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rounds_consume_forward_and_persist() {
        let store = Arc::new(MemoryStore::new());
        generate_chain(store.as_ref(), SECRET, &small_config()).unwrap();
        let reference = reference_chain(SECRET, 10);

        let rounds = CrashRounds::new(store.clone(), 0.01);
        assert_eq!(rounds.current_index().unwrap(), 1);

        for expected in 1..=3u64 {
            let round = rounds.resolve_round(BLOCK_HASH).unwrap();
            assert_eq!(round.index, expected);
            assert_eq!(round.server_seed, reference[expected as usize]);
        }

        // A restarted consumer resumes at the persisted index.
        let resumed = CrashRounds::new(store, 0.01);
        assert_eq!(resumed.current_index().unwrap(), 4);
    }

    #[test]
    fn test_rounds_require_generated_chain() {
        let rounds = CrashRounds::new(Arc::new(MemoryStore::new()), 0.01);
        assert!(rounds.resolve_round(BLOCK_HASH).is_err());
    }

    #[test]
    fn test_chain_exhaustion_reported() {
        let store = Arc::new(MemoryStore::new());
        let config = CrashConfig {
            chain_length: 2,
            ..small_config()
        };
        generate_chain(store.as_ref(), SECRET, &config).unwrap();

        let rounds = CrashRounds::new(store, 0.01);
        rounds.resolve_round(BLOCK_HASH).unwrap();
        rounds.resolve_round(BLOCK_HASH).unwrap();
        match rounds.resolve_round(BLOCK_HASH) {
            Err(crate::errors::EngineError::State(StateError::ChainExhausted(3))) => {}
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
