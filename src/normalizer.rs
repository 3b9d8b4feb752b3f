//! Digest-to-fraction normalization.
//!
//! Converts the leading bytes of a cryptographic digest into a uniform
//! fixed-point fraction in `[0, 1)`. This is the single point where raw
//! hash output becomes a number games can act on, so every game transform
//! goes through it.

/// Number of digest bytes folded into the fraction.
pub const FRACTION_BYTES: usize = 4;

/// Converts the first four bytes of `bytes` into a fraction in `[0, 1)`.
///
/// `f = b0/256 + b1/256^2 + b2/256^3 + b3/256^4`. The maximum achievable
/// value (all bytes 0xFF) is just under 1.0, so the result is strictly
/// less than 1.
///
/// # Panics
///
/// Panics if `bytes` is shorter than four bytes. Callers always pass full
/// digests; a short input is a programming error, not a runtime condition.
pub fn bytes_to_fraction(bytes: &[u8]) -> f64 {
    assert!(
        bytes.len() >= FRACTION_BYTES,
        "normalizer requires at least {} bytes, got {}",
        FRACTION_BYTES,
        bytes.len()
    );

    let mut fraction = 0.0;
    let mut divisor = 256.0;
    for &byte in &bytes[..FRACTION_BYTES] {
        fraction += byte as f64 / divisor;
        divisor *= 256.0;
    }
    fraction
}
