use crate::errors::{ContractError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported game families driven by the seed/nonce derivation path.
///
/// Crash is not listed here: its entropy comes from the pre-generated hash
/// chain, not from a per-user seed pair (see [`crate::crash`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Dice,
    Limbo,
    Roulette,
    Plinko,
    Mines,
    Keno,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Dice => write!(f, "dice"),
            GameType::Limbo => write!(f, "limbo"),
            GameType::Roulette => write!(f, "roulette"),
            GameType::Plinko => write!(f, "plinko"),
            GameType::Mines => write!(f, "mines"),
            GameType::Keno => write!(f, "keno"),
        }
    }
}

/// Plinko risk level. Selects the per-row left-step probability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlinkoRisk {
    Low,
    Medium,
    High,
}

impl PlinkoRisk {
    /// Probability of stepping left at each peg.
    ///
    /// HIGH is 0.499975, not 0.5: the production tables carry a small
    /// asymmetry at high risk and verification must reproduce it exactly.
    pub fn p_left(self) -> f64 {
        match self {
            PlinkoRisk::Low | PlinkoRisk::Medium => 0.5,
            PlinkoRisk::High => 0.499975,
        }
    }
}

/// Validated Plinko board configuration.
///
/// Fields are private and deserialization runs through the same
/// validation as [`PlinkoParams::new`], so an in-range instance is the
/// only representable one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "PlinkoParamsRaw")]
pub struct PlinkoParams {
    rows: u8,
    risk: PlinkoRisk,
}

#[derive(Deserialize)]
struct PlinkoParamsRaw {
    rows: u8,
    risk: PlinkoRisk,
}

impl TryFrom<PlinkoParamsRaw> for PlinkoParams {
    type Error = crate::errors::EngineError;

    fn try_from(raw: PlinkoParamsRaw) -> EngineResult<Self> {
        Self::new(raw.rows, raw.risk)
    }
}

impl PlinkoParams {
    pub const MIN_ROWS: u8 = 8;
    pub const MAX_ROWS: u8 = 16;

    pub fn new(rows: u8, risk: PlinkoRisk) -> EngineResult<Self> {
        if !(Self::MIN_ROWS..=Self::MAX_ROWS).contains(&rows) {
            return Err(ContractError::InvalidParam {
                field: "rows",
                value: rows.to_string(),
                reason: "must be between 8 and 16",
            }
            .into());
        }
        Ok(Self { rows, risk })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn risk(&self) -> PlinkoRisk {
        self.risk
    }
}

/// Validated Mines configuration: a flat grid with `mines` hidden cells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "MinesParamsRaw")]
pub struct MinesParams {
    grid_size: u8,
    mines: u8,
}

#[derive(Deserialize)]
struct MinesParamsRaw {
    grid_size: u8,
    mines: u8,
}

impl TryFrom<MinesParamsRaw> for MinesParams {
    type Error = crate::errors::EngineError;

    fn try_from(raw: MinesParamsRaw) -> EngineResult<Self> {
        Self::with_grid(raw.grid_size, raw.mines)
    }
}

impl MinesParams {
    pub const GRID_SIZE: u8 = 25;

    pub fn new(mines: u8) -> EngineResult<Self> {
        Self::with_grid(Self::GRID_SIZE, mines)
    }

    pub fn with_grid(grid_size: u8, mines: u8) -> EngineResult<Self> {
        if grid_size < 2 || grid_size > 64 {
            return Err(ContractError::InvalidParam {
                field: "grid_size",
                value: grid_size.to_string(),
                reason: "must be between 2 and 64",
            }
            .into());
        }
        if mines == 0 || mines >= grid_size {
            return Err(ContractError::InvalidParam {
                field: "mines",
                value: mines.to_string(),
                reason: "must be between 1 and grid_size - 1",
            }
            .into());
        }
        Ok(Self { grid_size, mines })
    }

    pub fn grid_size(&self) -> u8 {
        self.grid_size
    }

    pub fn mines(&self) -> u8 {
        self.mines
    }
}

/// Validated Keno configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "KenoParamsRaw")]
pub struct KenoParams {
    grid_size: u8,
    drawn: u8,
}

#[derive(Deserialize)]
struct KenoParamsRaw {
    grid_size: u8,
    drawn: u8,
}

impl TryFrom<KenoParamsRaw> for KenoParams {
    type Error = crate::errors::EngineError;

    fn try_from(raw: KenoParamsRaw) -> EngineResult<Self> {
        Self::new(raw.grid_size, raw.drawn)
    }
}

impl KenoParams {
    pub const GRID_SIZE: u8 = 40;
    pub const DRAWN: u8 = 10;

    pub fn standard() -> Self {
        Self {
            grid_size: Self::GRID_SIZE,
            drawn: Self::DRAWN,
        }
    }

    pub fn new(grid_size: u8, drawn: u8) -> EngineResult<Self> {
        if grid_size < 2 || grid_size > 80 {
            return Err(ContractError::InvalidParam {
                field: "grid_size",
                value: grid_size.to_string(),
                reason: "must be between 2 and 80",
            }
            .into());
        }
        if drawn == 0 || drawn > grid_size {
            return Err(ContractError::InvalidParam {
                field: "drawn",
                value: drawn.to_string(),
                reason: "must be between 1 and grid_size",
            }
            .into());
        }
        Ok(Self { grid_size, drawn })
    }

    pub fn grid_size(&self) -> u8 {
        self.grid_size
    }

    pub fn drawn(&self) -> u8 {
        self.drawn
    }
}

/// Validated Limbo house-edge parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "LimboParamsRaw")]
pub struct LimboParams {
    house_edge: f64,
}

#[derive(Deserialize)]
struct LimboParamsRaw {
    house_edge: f64,
}

impl TryFrom<LimboParamsRaw> for LimboParams {
    type Error = crate::errors::EngineError;

    fn try_from(raw: LimboParamsRaw) -> EngineResult<Self> {
        Self::new(raw.house_edge)
    }
}

impl LimboParams {
    pub fn new(house_edge: f64) -> EngineResult<Self> {
        if !(0.0..=0.1).contains(&house_edge) || !house_edge.is_finite() {
            return Err(ContractError::InvalidParam {
                field: "house_edge",
                value: house_edge.to_string(),
                reason: "must be a finite fraction between 0 and 0.1",
            }
            .into());
        }
        Ok(Self { house_edge })
    }

    pub fn house_edge(&self) -> f64 {
        self.house_edge
    }
}

impl Default for LimboParams {
    fn default() -> Self {
        Self { house_edge: 0.01 }
    }
}

/// A fully-parameterized outcome request for one game.
///
/// Constructed through the validated `*Params` types, so an instance is
/// always in-range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum GameRequest {
    Dice,
    Limbo(LimboParams),
    Roulette,
    Plinko(PlinkoParams),
    Mines(MinesParams),
    Keno(KenoParams),
}

impl GameRequest {
    pub fn game_type(&self) -> GameType {
        match self {
            GameRequest::Dice => GameType::Dice,
            GameRequest::Limbo(_) => GameType::Limbo,
            GameRequest::Roulette => GameType::Roulette,
            GameRequest::Plinko(_) => GameType::Plinko,
            GameRequest::Mines(_) => GameType::Mines,
            GameRequest::Keno(_) => GameType::Keno,
        }
    }
}

/// Game-specific result value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum OutcomeValue {
    /// Roll in [0.00, 100.00] with two decimals.
    Dice { roll: f64 },
    /// Multiplier in [1.00, 1_000_000.00].
    Limbo { multiplier: f64 },
    /// Pocket 0..=36.
    Roulette { pocket: u8 },
    /// Landing bucket 0..=rows.
    Plinko { bucket: u8 },
    /// Mine positions, in shuffle order.
    Mines { positions: Vec<u8> },
    /// Drawn numbers, in shuffle order.
    Keno { numbers: Vec<u8> },
}

/// Derived outcome plus the raw fractions it was computed from.
///
/// The fractions are kept for auditability: a verifier can confirm both
/// the final value and each intermediate step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub value: OutcomeValue,
    pub fractions: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plinko_rows_validated() {
        assert!(PlinkoParams::new(7, PlinkoRisk::Low).is_err());
        assert!(PlinkoParams::new(17, PlinkoRisk::Low).is_err());
        assert!(PlinkoParams::new(8, PlinkoRisk::High).is_ok());
        assert!(PlinkoParams::new(16, PlinkoRisk::Medium).is_ok());
    }

    #[test]
    fn test_mines_count_validated() {
        assert!(MinesParams::new(0).is_err());
        assert!(MinesParams::new(25).is_err());
        assert_eq!(MinesParams::new(24).unwrap().grid_size, 25);
    }

    #[test]
    fn test_limbo_edge_validated() {
        assert!(LimboParams::new(-0.01).is_err());
        assert!(LimboParams::new(0.5).is_err());
        assert!(LimboParams::new(f64::NAN).is_err());
        assert!(LimboParams::new(0.01).is_ok());
    }

    #[test]
    fn test_high_risk_p_left_is_asymmetric() {
        assert_eq!(PlinkoRisk::High.p_left(), 0.499975);
        assert_eq!(PlinkoRisk::Low.p_left(), 0.5);
    }

    #[test]
    fn test_public_record_json_shape() {
        // Outcome records are published to players as JSON; the game tag
        // must survive a round trip.
        let outcome = Outcome {
            value: OutcomeValue::Roulette { pocket: 17 },
            fractions: vec![0.47],
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"game\":\"roulette\""));
        assert!(json.contains("\"pocket\":17"));

        let back: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);

        let request: GameRequest =
            serde_json::from_str(r#"{"game":"plinko","rows":11,"risk":"high"}"#).unwrap();
        assert_eq!(
            request,
            GameRequest::Plinko(PlinkoParams::new(11, PlinkoRisk::High).unwrap())
        );
    }

    #[test]
    fn test_deserialization_cannot_bypass_validation() {
        // Out-of-range values are rejected at the wire boundary, not
        // silently carried into derivation.
        assert!(
            serde_json::from_str::<GameRequest>(r#"{"game":"plinko","rows":50,"risk":"low"}"#)
                .is_err()
        );
        assert!(
            serde_json::from_str::<MinesParams>(r#"{"grid_size":25,"mines":25}"#).is_err()
        );
        assert!(serde_json::from_str::<KenoParams>(r#"{"grid_size":40,"drawn":0}"#).is_err());
        assert!(serde_json::from_str::<LimboParams>(r#"{"house_edge":0.9}"#).is_err());

        // In-range payloads still deserialize.
        let params: MinesParams =
            serde_json::from_str(r#"{"grid_size":25,"mines":3}"#).unwrap();
        assert_eq!(params.mines(), 3);
    }
}
