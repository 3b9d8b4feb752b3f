//! Pure outcome derivation.
//!
//! Maps `(server_seed, client_seed, nonce, game)` to a game outcome via
//! HMAC-SHA512 and the byte-stream normalizer. Everything here is
//! stateless and deterministic: the same inputs always produce the same
//! bit-identical outcome, which is what makes post-reveal verification
//! possible.

use crate::games::types::{GameRequest, LimboParams, Outcome, OutcomeValue, PlinkoParams};
use crate::normalizer::bytes_to_fraction;
use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Fixed derivation tags for single-step games. Multi-step games tag each
/// step with its index instead, so one seed/nonce pair yields one
/// independent fraction per step.
pub const TAG_DICE: &str = "DICE";
pub const TAG_LIMBO: &str = "LIMBO";
pub const TAG_ROULETTE: &str = "ROULETTE";

/// Largest multiplier Limbo will pay.
pub const LIMBO_MAX_MULTIPLIER: f64 = 1_000_000.0;

/// HMAC-SHA512 over `"{client_seed}:{nonce}:{tag}"` keyed by the server
/// seed.
pub fn outcome_digest(server_seed: &str, client_seed: &str, nonce: u64, tag: &str) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(server_seed.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{client_seed}:{nonce}:{tag}").as_bytes());
    mac.finalize().into_bytes().into()
}

fn step_fraction(server_seed: &str, client_seed: &str, nonce: u64, tag: &str) -> f64 {
    bytes_to_fraction(&outcome_digest(server_seed, client_seed, nonce, tag))
}

/// Derives the outcome for one bet.
///
/// `request` is already validated by its params constructors; this
/// function cannot fail and exists as the single entry point the seed
/// service and the verifier both call.
pub fn derive_outcome(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    request: &GameRequest,
) -> Outcome {
    match request {
        GameRequest::Dice => {
            let f = step_fraction(server_seed, client_seed, nonce, TAG_DICE);
            Outcome {
                value: OutcomeValue::Dice { roll: dice_roll(f) },
                fractions: vec![f],
            }
        }
        GameRequest::Limbo(params) => {
            let f = step_fraction(server_seed, client_seed, nonce, TAG_LIMBO);
            Outcome {
                value: OutcomeValue::Limbo {
                    multiplier: limbo_multiplier(f, params),
                },
                fractions: vec![f],
            }
        }
        GameRequest::Roulette => {
            let f = step_fraction(server_seed, client_seed, nonce, TAG_ROULETTE);
            Outcome {
                value: OutcomeValue::Roulette {
                    pocket: roulette_pocket(f),
                },
                fractions: vec![f],
            }
        }
        GameRequest::Plinko(params) => plinko_outcome(server_seed, client_seed, nonce, params),
        GameRequest::Mines(params) => {
            let (positions, fractions) = shuffle_selection(
                server_seed,
                client_seed,
                nonce,
                params.grid_size(),
                params.mines(),
            );
            Outcome {
                value: OutcomeValue::Mines { positions },
                fractions,
            }
        }
        GameRequest::Keno(params) => {
            let (numbers, fractions) = shuffle_selection(
                server_seed,
                client_seed,
                nonce,
                params.grid_size(),
                params.drawn(),
            );
            Outcome {
                value: OutcomeValue::Keno { numbers },
                fractions,
            }
        }
    }
}

/// Dice roll in [0.00, 100.00] with two decimals: `floor(f * 10001) / 100`.
pub fn dice_roll(fraction: f64) -> f64 {
    (fraction * 10001.0).floor() / 100.0
}

/// Limbo multiplier: `(1 - house_edge) / f`, clamped to
/// `[1.00, LIMBO_MAX_MULTIPLIER]`.
///
/// The fraction is clamped away from zero first so the division is always
/// finite.
pub fn limbo_multiplier(fraction: f64, params: &LimboParams) -> f64 {
    let clamped = fraction.clamp(1e-6, 0.999999);
    ((1.0 - params.house_edge()) / clamped).clamp(1.0, LIMBO_MAX_MULTIPLIER)
}

/// Roulette pocket 0..=36: `floor(f * 37)`.
pub fn roulette_pocket(fraction: f64) -> u8 {
    (fraction * 37.0).floor() as u8
}

fn plinko_outcome(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    params: &PlinkoParams,
) -> Outcome {
    let p_left = params.risk().p_left();
    let mut fractions = Vec::with_capacity(params.rows() as usize);
    let mut left_steps = 0u8;

    for row in 0..params.rows() {
        let f = step_fraction(server_seed, client_seed, nonce, &row.to_string());
        if f < p_left {
            left_steps += 1;
        }
        fractions.push(f);
    }

    Outcome {
        value: OutcomeValue::Plinko { bucket: left_steps },
        fractions,
    }
}

/// Fisher-Yates shuffle of `0..grid_size` driven by one fraction per swap
/// step, returning the first `take` elements and the fractions consumed.
///
/// Swap index `i` runs from the top of the deck down to 1 and tags its
/// derivation with `i`, so each step's fraction is independent.
fn shuffle_selection(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    grid_size: u8,
    take: u8,
) -> (Vec<u8>, Vec<f64>) {
    let mut deck: Vec<u8> = (0..grid_size).collect();
    let mut fractions = Vec::with_capacity(grid_size as usize - 1);

    for i in (1..grid_size as usize).rev() {
        let f = step_fraction(server_seed, client_seed, nonce, &i.to_string());
        let j = (f * (i as f64 + 1.0)).floor() as usize;
        deck.swap(i, j);
        fractions.push(f);
    }

    deck.truncate(take as usize);
    (deck, fractions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{KenoParams, MinesParams, PlinkoRisk};

    const SERVER_SEED: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334455667788990aabbccdde56";
    const CLIENT_SEED: &str = "my_client_seed_123";

    #[test]
    fn test_derivation_is_pure() {
        let request = GameRequest::Dice;
        let first = derive_outcome(SERVER_SEED, CLIENT_SEED, 1, &request);
        for _ in 0..5 {
            let again = derive_outcome(SERVER_SEED, CLIENT_SEED, 1, &request);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_digest_changes_with_every_input() {
        let base = outcome_digest(SERVER_SEED, CLIENT_SEED, 1, TAG_DICE);
        assert_ne!(base, outcome_digest(SERVER_SEED, CLIENT_SEED, 2, TAG_DICE));
        assert_ne!(base, outcome_digest(SERVER_SEED, "other", 1, TAG_DICE));
        assert_ne!(base, outcome_digest("other", CLIENT_SEED, 1, TAG_DICE));
        assert_ne!(base, outcome_digest(SERVER_SEED, CLIENT_SEED, 1, TAG_LIMBO));
    }

    #[test]
    fn test_sampled_fractions_stay_below_one() {
        for nonce in 0..10_000u64 {
            let digest = outcome_digest(SERVER_SEED, CLIENT_SEED, nonce, TAG_DICE);
            let f = crate::normalizer::bytes_to_fraction(&digest);
            assert!((0.0..1.0).contains(&f), "fraction {f} out of range");
        }
    }

    #[test]
    fn test_dice_roll_range_and_precision() {
        assert_eq!(dice_roll(0.0), 0.0);
        // The maximum fraction maps to exactly 100.00.
        assert_eq!(dice_roll(0.9999999), 100.0);

        for nonce in 0..1_000u64 {
            let out = derive_outcome(SERVER_SEED, CLIENT_SEED, nonce, &GameRequest::Dice);
            let OutcomeValue::Dice { roll } = out.value else {
                panic!("wrong outcome variant");
            };
            assert!((0.0..=100.0).contains(&roll));
            // Two-decimal grid.
            let scaled = roll * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_limbo_multiplier_bounds() {
        let params = LimboParams::default();
        assert_eq!(limbo_multiplier(0.999999, &params), 1.0);
        assert_eq!(limbo_multiplier(1.0e-9, &params), LIMBO_MAX_MULTIPLIER);
        // Mid-range: 0.099 -> (1 - 0.01) / 0.099 = 10.0
        assert!((limbo_multiplier(0.099, &params) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_roulette_pocket_range() {
        assert_eq!(roulette_pocket(0.0), 0);
        assert_eq!(roulette_pocket(0.9999999), 36);
        for nonce in 0..1_000u64 {
            let out = derive_outcome(SERVER_SEED, CLIENT_SEED, nonce, &GameRequest::Roulette);
            let OutcomeValue::Roulette { pocket } = out.value else {
                panic!("wrong outcome variant");
            };
            assert!(pocket <= 36);
        }
    }

    #[test]
    fn test_plinko_bucket_range_and_fraction_count() {
        let params = PlinkoParams::new(11, PlinkoRisk::High).unwrap();
        for nonce in 0..200u64 {
            let out = derive_outcome(
                SERVER_SEED,
                CLIENT_SEED,
                nonce,
                &GameRequest::Plinko(params),
            );
            let OutcomeValue::Plinko { bucket } = out.value else {
                panic!("wrong outcome variant");
            };
            assert!(bucket <= 11);
            assert_eq!(out.fractions.len(), 11);
        }
    }

    #[test]
    fn test_mines_positions_distinct_and_in_grid() {
        let params = MinesParams::new(5).unwrap();
        let out = derive_outcome(SERVER_SEED, CLIENT_SEED, 7, &GameRequest::Mines(params));
        let OutcomeValue::Mines { positions } = out.value else {
            panic!("wrong outcome variant");
        };

        assert_eq!(positions.len(), 5);
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5, "mine positions must be distinct");
        assert!(positions.iter().all(|&p| p < 25));
    }

    #[test]
    fn test_keno_draw_distinct_and_in_grid() {
        let params = KenoParams::standard();
        let out = derive_outcome(SERVER_SEED, CLIENT_SEED, 3, &GameRequest::Keno(params));
        let OutcomeValue::Keno { numbers } = out.value else {
            panic!("wrong outcome variant");
        };

        assert_eq!(numbers.len(), 10);
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 10);
        assert!(numbers.iter().all(|&n| n < 40));
    }

    /// Sampled binomial check; the exhaustive 1M-trial run lives in
    /// `test_plinko_binomial_full` below.
    #[test]
    fn test_plinko_distribution_sampled() {
        let params = PlinkoParams::new(11, PlinkoRisk::High).unwrap();
        let trials = 20_000u64;
        let mut left_total = 0u64;

        for nonce in 0..trials {
            let out = derive_outcome(
                SERVER_SEED,
                CLIENT_SEED,
                nonce,
                &GameRequest::Plinko(params),
            );
            let OutcomeValue::Plinko { bucket } = out.value else {
                panic!("wrong outcome variant");
            };
            left_total += bucket as u64;
        }

        // Mean left-steps per trial should be close to rows * p_left.
        let mean = left_total as f64 / trials as f64;
        let expected = 11.0 * PlinkoRisk::High.p_left();
        assert!(
            (mean - expected).abs() < 0.1,
            "mean {mean} too far from {expected}"
        );
    }

    #[test]
    #[ignore = "statistical long-run check, ~1M trials"]
    fn test_plinko_binomial_full() {
        let params = PlinkoParams::new(11, PlinkoRisk::High).unwrap();
        let trials = 1_000_000u64;
        let mut buckets = [0u64; 12];

        for nonce in 0..trials {
            let out = derive_outcome(
                SERVER_SEED,
                CLIENT_SEED,
                nonce,
                &GameRequest::Plinko(params),
            );
            let OutcomeValue::Plinko { bucket } = out.value else {
                panic!("wrong outcome variant");
            };
            buckets[bucket as usize] += 1;
        }

        let p = PlinkoRisk::High.p_left();
        for (k, &count) in buckets.iter().enumerate() {
            let expected = binomial_probability(11, k as u32, p) * trials as f64;
            let observed = count as f64;
            // Three-sigma tolerance on each bucket.
            let sigma = (expected * (1.0 - expected / trials as f64)).sqrt().max(1.0);
            assert!(
                (observed - expected).abs() < 3.0 * sigma + 50.0,
                "bucket {k}: observed {observed}, expected {expected}"
            );
        }
    }

    /// Sampled win-rate check; the longer run lives in
    /// `test_limbo_win_rate_full` below.
    #[test]
    fn test_limbo_win_rate_sampled() {
        let params = LimboParams::default();
        let target = 2.0;
        let trials = 20_000u64;
        let mut wins = 0u64;

        for nonce in 0..trials {
            let out = derive_outcome(
                SERVER_SEED,
                CLIENT_SEED,
                nonce,
                &GameRequest::Limbo(params),
            );
            let OutcomeValue::Limbo { multiplier } = out.value else {
                panic!("wrong outcome variant");
            };
            if multiplier >= target {
                wins += 1;
            }
        }

        // Expected rate is (1 - edge) / target; ~4 sigma at 20k trials.
        let rate = wins as f64 / trials as f64;
        let expected = (1.0 - params.house_edge()) / target;
        assert!(
            (rate - expected).abs() < 0.015,
            "win rate {rate}, expected {expected}"
        );
    }

    #[test]
    #[ignore = "statistical long-run check"]
    fn test_limbo_win_rate_full() {
        let params = LimboParams::default();
        let target = 2.0;
        let trials = 200_000u64;
        let mut wins = 0u64;

        for nonce in 0..trials {
            let out = derive_outcome(
                SERVER_SEED,
                CLIENT_SEED,
                nonce,
                &GameRequest::Limbo(params),
            );
            let OutcomeValue::Limbo { multiplier } = out.value else {
                panic!("wrong outcome variant");
            };
            if multiplier >= target {
                wins += 1;
            }
        }

        let rate = wins as f64 / trials as f64;
        let expected = (1.0 - params.house_edge()) / target;
        assert!(
            (rate - expected).abs() < 0.005,
            "win rate {rate}, expected {expected}"
        );
    }

    fn binomial_probability(n: u32, k: u32, p: f64) -> f64 {
        let mut coeff = 1.0;
        for i in 0..k {
            coeff *= (n - i) as f64 / (i + 1) as f64;
        }
        coeff * p.powi(k as i32) * (1.0 - p).powi((n - k) as i32)
    }
}
