use alloc::vec::Vec;

use crypto_bigint::{BitOps, NonZero, RandomMod, WrappingAdd, WrappingMul};
use crypto_primes::RandomPrimeWithRng;
use rand_core::CryptoRngCore;

use crate::params::GroupParams;

/// Generates a prime of exactly `bits` bits.
pub(crate) fn random_prime<P: GroupParams>(rng: &mut impl CryptoRngCore, bits: u32) -> P::Uint {
    P::Uint::generate_prime_with_rng(rng, bits)
}

/// Generates a prime of exactly `bits` bits that is not in `taken`.
pub(crate) fn random_distinct_prime<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    bits: u32,
    taken: &[P::Uint],
) -> P::Uint {
    loop {
        let candidate = random_prime::<P>(rng, bits);
        if !taken.contains(&candidate) {
            return candidate;
        }
        tracing::debug!("Duplicate {bits}-bit prime, rolling again");
    }
}

/// Finds a prime $p = 2 k q + 1$ of exactly `bits` bits for a random cofactor $k$.
///
/// `q` must be odd and at least 16 bits shorter than `bits`.
pub(crate) fn random_prime_with_factor<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    q: &P::Uint,
    bits: u32,
) -> P::Uint {
    let one = P::Uint::from(1u64);
    let two_q = q.wrapping_add(q);

    // `k` is taken from `[2^(k_bits-1), 2^k_bits)`, which puts `2 k q`
    // either at `bits` or at `bits - 1` bits; the shorter ones are skipped.
    let k_bits = bits - q.bits_vartime() - 1;
    let k_low = one << (k_bits - 1);
    let k_range: NonZero<P::Uint> =
        Option::from(NonZero::new(k_low)).expect("`k_low` is a power of two and therefore non-zero");

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let k = k_low | P::Uint::random_mod(rng, &k_range);
        let candidate = k.wrapping_mul(&two_q).wrapping_add(&one);
        if candidate.bits_vartime() != bits {
            continue;
        }
        if candidate.is_prime_with_rng(rng) {
            tracing::trace!("Found a {bits}-bit prime with a given factor after {attempts} attempts");
            return candidate;
        }
    }
}

/// Multiplies the factors, returning `None` if the product does not fit.
pub(crate) fn product<P: GroupParams>(factors: &[P::Uint]) -> Option<P::Uint> {
    use crypto_bigint::CheckedMul;

    factors.iter().try_fold(P::Uint::from(1u64), |acc, factor| {
        let product: Option<P::Uint> = acc.checked_mul(factor).into();
        product
    })
}

/// Returns the factors in `factors` with the ones at `skip` left out.
pub(crate) fn without<T: Copy>(factors: &[T], skip: impl Fn(usize) -> bool) -> Vec<T> {
    factors
        .iter()
        .enumerate()
        .filter(|(index, _)| !skip(*index))
        .map(|(_, factor)| *factor)
        .collect()
}
