//! Engine configuration with validated defaults.

use crate::errors::{ContractError, EngineResult};
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// House edge applied by multiplier games (Limbo).
    pub house_edge: f64,
    pub crash: CrashConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            house_edge: 0.01,
            crash: CrashConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        validate_edge("house_edge", self.house_edge)?;
        self.crash.validate()
    }
}

/// Crash subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashConfig {
    /// Number of pre-generated chain entries.
    pub chain_length: u64,
    /// Entries per storage batch during generation.
    pub batch_size: usize,
    /// Pause between generation batches, to bound I/O pressure on a
    /// shared store. Zero disables throttling.
    pub write_throttle_ms: u64,
    pub house_edge: f64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            chain_length: 10_000_000,
            batch_size: 5_000,
            write_throttle_ms: 0,
            house_edge: 0.01,
        }
    }
}

impl CrashConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.chain_length == 0 {
            return Err(ContractError::InvalidParam {
                field: "chain_length",
                value: self.chain_length.to_string(),
                reason: "must be at least 1",
            }
            .into());
        }
        if self.batch_size == 0 {
            return Err(ContractError::InvalidParam {
                field: "batch_size",
                value: self.batch_size.to_string(),
                reason: "must be at least 1",
            }
            .into());
        }
        validate_edge("crash.house_edge", self.house_edge)
    }
}

fn validate_edge(field: &'static str, edge: f64) -> EngineResult<()> {
    if !edge.is_finite() || !(0.0..=0.1).contains(&edge) {
        return Err(ContractError::InvalidParam {
            field,
            value: edge.to_string(),
            reason: "must be a finite fraction between 0 and 0.1",
        }
        .into());
    }
    Ok(())
}
