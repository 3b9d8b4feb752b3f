pub mod derivation;
pub mod types;

pub use derivation::{derive_outcome, outcome_digest};
pub use types::*;
