//! Seed pair lifecycle: commit, consume, rotate, archive.
//!
//! Every user has exactly one active seed pair. The pair's server seed is
//! secret, but its SHA-256 hash is published before the first nonce is
//! consumed, and a successor seed is staged (hash published) ahead of any
//! rotation. Rotation reveals the old secret, archives it to history, and
//! promotes the staged successor, so the hash a player saw always belongs
//! to the exact seed later revealed to them.

use crate::errors::{ContractError, EngineResult, StateError, StorageError};
use crate::games::{derive_outcome, GameRequest, Outcome};
use crate::storage::KvStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};

const ACTIVE_PREFIX: &str = "seed:active:";
const HISTORY_PREFIX: &str = "seed:history:";
const HASH_INDEX_PREFIX: &str = "seed:hash:";

/// Lifecycle state of a seed pair.
///
/// `Rotating` only exists inside the rotation critical section; persisted
/// active pairs are always `Active` and history entries always `Archived`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeedState {
    Active,
    Rotating,
    Archived,
}

/// A user's committed server/client seed pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedPair {
    pub user_id: String,
    /// Secret until the pair is archived.
    pub server_seed: String,
    /// Published commitment: SHA-256 of `server_seed`, shown to the user
    /// before any nonce is consumed.
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Count of nonces consumed under this pair.
    pub nonce: u64,
    /// Staged successor, generated at creation so its hash is committed
    /// before any rotation is requested.
    pub next_server_seed: String,
    pub next_server_seed_hash: String,
    pub state: SeedState,
    /// How many rotations preceded this pair; doubles as the history
    /// sequence number when the pair is archived.
    pub rotation: u64,
    pub created_at: DateTime<Utc>,
}

/// Archived, revealed seed pair. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedHistoryEntry {
    pub user_id: String,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Nonce count frozen at rotation time.
    pub final_nonce: u64,
    pub rotation: u64,
    pub created_at: DateTime<Utc>,
    pub revealed_at: DateTime<Utc>,
}

/// Public view of the active pair; never contains the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSeedInfo {
    pub server_seed_hash: String,
    pub next_server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Seed material handed to the bet service for one outcome derivation.
#[derive(Debug, Clone)]
pub struct BetSeed {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Result of a rotation: the revealed old secret plus both commitments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationReceipt {
    pub revealed_server_seed: String,
    pub old_server_seed_hash: String,
    pub new_server_seed_hash: String,
    pub final_nonce: u64,
    pub revealed_at: DateTime<Utc>,
}

/// Where a commitment hash currently sits in the lifecycle.
#[derive(Debug, Clone)]
pub enum CommitmentStatus {
    /// The seed is still in use (active or staged) and cannot be revealed.
    StillActive { user_id: String },
    /// The pair was archived; its secret is public.
    Revealed(SeedHistoryEntry),
}

/// Index record mapping a commitment hash to its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HashIndexEntry {
    user_id: String,
    /// Set when the pair is archived; points at the history sequence.
    archived_rotation: Option<u64>,
}

fn active_key(user_id: &str) -> Vec<u8> {
    format!("{ACTIVE_PREFIX}{user_id}").into_bytes()
}

fn history_key(user_id: &str, rotation: u64) -> Vec<u8> {
    // Zero-padded so prefix scans return entries in rotation order.
    format!("{HISTORY_PREFIX}{user_id}:{rotation:08}").into_bytes()
}

fn hash_index_key(hash: &str) -> Vec<u8> {
    format!("{HASH_INDEX_PREFIX}{hash}").into_bytes()
}

fn encode<T: Serialize>(key: &[u8], value: &T) -> EngineResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| {
        StorageError::CorruptedData {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode<T: for<'de> Deserialize<'de>>(key: &[u8], bytes: &[u8]) -> EngineResult<T> {
    bincode::deserialize(bytes).map_err(|e| {
        StorageError::CorruptedData {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Hex-encoded SHA-256 of a string.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32 bytes from the OS RNG, hex-encoded.
pub fn generate_seed() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_client_seed(seed: &str) -> EngineResult<()> {
    if seed.is_empty() {
        return Err(ContractError::InvalidClientSeed("must not be empty".into()).into());
    }
    if seed.len() > 256 {
        return Err(
            ContractError::InvalidClientSeed("must be at most 256 bytes".into()).into(),
        );
    }
    Ok(())
}

/// Manages seed pairs for all users over a shared key-value store.
///
/// A per-user mutex serializes nonce increments against rotations, so no
/// bet can straddle a rotation and no nonce is ever issued twice.
pub struct SeedService<S: KvStore> {
    store: Arc<S>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: KvStore> SeedService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_active(&self, user_id: &str) -> EngineResult<Option<SeedPair>> {
        let key = active_key(user_id);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Creates a fresh pair with a staged successor and commits both
    /// hashes in the same atomic batch as the pair itself.
    fn create_pair(&self, user_id: &str, client_seed: String) -> EngineResult<SeedPair> {
        let server_seed = generate_seed();
        let next_server_seed = generate_seed();
        let pair = SeedPair {
            user_id: user_id.to_string(),
            server_seed_hash: sha256_hex(&server_seed),
            server_seed,
            client_seed,
            nonce: 0,
            next_server_seed_hash: sha256_hex(&next_server_seed),
            next_server_seed,
            state: SeedState::Active,
            rotation: 0,
            created_at: Utc::now(),
        };

        let active = active_key(user_id);
        let index_entry = HashIndexEntry {
            user_id: user_id.to_string(),
            archived_rotation: None,
        };
        let idx_active = hash_index_key(&pair.server_seed_hash);
        let idx_next = hash_index_key(&pair.next_server_seed_hash);
        self.store.batch_write(&[
            (active.clone(), encode(&active, &pair)?),
            (idx_active.clone(), encode(&idx_active, &index_entry)?),
            (idx_next.clone(), encode(&idx_next, &index_entry)?),
        ])?;

        tracing::info!(user_id, hash = %pair.server_seed_hash, "created seed pair");
        Ok(pair)
    }

    /// Returns the active pair, creating one (with a random client seed)
    /// if the user has none.
    pub fn get_or_create(&self, user_id: &str) -> EngineResult<SeedPair> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().expect("seed lock poisoned");
        match self.load_active(user_id)? {
            Some(pair) => Ok(pair),
            None => self.create_pair(user_id, generate_seed()),
        }
    }

    /// Public info for the active pair: commitments, client seed, nonce.
    pub fn active_seed_info(&self, user_id: &str) -> EngineResult<ActiveSeedInfo> {
        let pair = self.get_or_create(user_id)?;
        Ok(ActiveSeedInfo {
            server_seed_hash: pair.server_seed_hash,
            next_server_seed_hash: pair.next_server_seed_hash,
            client_seed: pair.client_seed,
            nonce: pair.nonce,
        })
    }

    /// Atomically increments and persists the active pair's nonce,
    /// returning the seed material for the bet that consumed it.
    ///
    /// Returned nonces for one user form a strictly increasing sequence
    /// starting at 1; no value is ever issued twice.
    pub fn next_nonce(&self, user_id: &str) -> EngineResult<BetSeed> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().expect("seed lock poisoned");

        let mut pair = match self.load_active(user_id)? {
            Some(pair) => pair,
            None => self.create_pair(user_id, generate_seed())?,
        };
        pair.nonce += 1;

        let key = active_key(user_id);
        self.store.put(&key, &encode(&key, &pair)?)?;

        Ok(BetSeed {
            server_seed: pair.server_seed,
            server_seed_hash: pair.server_seed_hash,
            client_seed: pair.client_seed,
            nonce: pair.nonce,
        })
    }

    /// Consumes the next nonce and derives the outcome from the seed
    /// material captured by that increment. The material is snapshotted
    /// atomically with the nonce, so a concurrent rotation cannot change
    /// which seed the outcome is computed against.
    pub fn resolve_bet(
        &self,
        user_id: &str,
        request: &GameRequest,
    ) -> EngineResult<(Outcome, BetSeed)> {
        let seed = self.next_nonce(user_id)?;
        let outcome = derive_outcome(&seed.server_seed, &seed.client_seed, seed.nonce, request);
        Ok((outcome, seed))
    }

    /// Rotates the user's seed pair.
    ///
    /// In one atomic batch: freezes and reveals the old pair into history,
    /// promotes the staged successor with `new_client_seed` and nonce 0,
    /// and stages a fresh successor. On any storage failure nothing is
    /// written and the old pair stays active.
    pub fn rotate(&self, user_id: &str, new_client_seed: &str) -> EngineResult<RotationReceipt> {
        validate_client_seed(new_client_seed)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().expect("seed lock poisoned");

        let mut old = match self.load_active(user_id)? {
            Some(pair) => pair,
            None => self.create_pair(user_id, generate_seed())?,
        };
        old.state = SeedState::Rotating;

        let revealed_at = Utc::now();
        let entry = SeedHistoryEntry {
            user_id: old.user_id.clone(),
            server_seed: old.server_seed.clone(),
            server_seed_hash: old.server_seed_hash.clone(),
            client_seed: old.client_seed.clone(),
            final_nonce: old.nonce,
            rotation: old.rotation,
            created_at: old.created_at,
            revealed_at,
        };

        let successor_seed = generate_seed();
        let promoted = SeedPair {
            user_id: old.user_id.clone(),
            server_seed: old.next_server_seed.clone(),
            server_seed_hash: old.next_server_seed_hash.clone(),
            client_seed: new_client_seed.to_string(),
            nonce: 0,
            next_server_seed_hash: sha256_hex(&successor_seed),
            next_server_seed: successor_seed,
            state: SeedState::Active,
            rotation: old.rotation + 1,
            created_at: revealed_at,
        };

        let active = active_key(user_id);
        let history = history_key(user_id, entry.rotation);
        let idx_old = hash_index_key(&entry.server_seed_hash);
        let idx_next = hash_index_key(&promoted.next_server_seed_hash);
        let archived = HashIndexEntry {
            user_id: user_id.to_string(),
            archived_rotation: Some(entry.rotation),
        };
        let staged = HashIndexEntry {
            user_id: user_id.to_string(),
            archived_rotation: None,
        };

        self.store.batch_write(&[
            (active.clone(), encode(&active, &promoted)?),
            (history.clone(), encode(&history, &entry)?),
            (idx_old.clone(), encode(&idx_old, &archived)?),
            (idx_next.clone(), encode(&idx_next, &staged)?),
        ])?;

        tracing::info!(
            user_id,
            revealed = %entry.server_seed_hash,
            promoted = %promoted.server_seed_hash,
            final_nonce = entry.final_nonce,
            "rotated seed pair"
        );

        Ok(RotationReceipt {
            revealed_server_seed: entry.server_seed,
            old_server_seed_hash: entry.server_seed_hash,
            new_server_seed_hash: promoted.server_seed_hash,
            final_nonce: entry.final_nonce,
            revealed_at,
        })
    }

    /// Archived history for a user, oldest rotation first.
    pub fn seed_history(&self, user_id: &str) -> EngineResult<Vec<SeedHistoryEntry>> {
        let prefix = format!("{HISTORY_PREFIX}{user_id}:").into_bytes();
        let rows = self.store.scan_prefix(&prefix)?;
        rows.iter()
            .map(|(key, value)| decode(key, value))
            .collect()
    }

    /// Resolves a commitment hash to its lifecycle position.
    ///
    /// Seeds still in use (active or staged) are never revealed here; only
    /// archived entries come back with their secret.
    pub fn lookup_commitment(&self, hash: &str) -> EngineResult<CommitmentStatus> {
        let key = hash_index_key(hash);
        let Some(bytes) = self.store.get(&key)? else {
            return Err(StateError::UnknownCommitment(hash.to_string()).into());
        };
        let entry: HashIndexEntry = decode(&key, &bytes)?;

        match entry.archived_rotation {
            Some(rotation) => {
                let hkey = history_key(&entry.user_id, rotation);
                let Some(hbytes) = self.store.get(&hkey)? else {
                    return Err(StateError::UnknownCommitment(hash.to_string()).into());
                };
                Ok(CommitmentStatus::Revealed(decode(&hkey, &hbytes)?))
            }
            None => Ok(CommitmentStatus::StillActive {
                user_id: entry.user_id,
            }),
        }
    }
}
