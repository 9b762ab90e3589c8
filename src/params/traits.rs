use core::{
    fmt::Debug,
    ops::{BitOr, Shl},
};

use crypto_bigint::{
    modular::Retrieve,
    subtle::{ConditionallySelectable, CtOption},
    BitOps, Bounded, Integer, Invert, Monty, PowBoundedExp, RandomMod,
};
use crypto_primes::RandomPrimeWithRng;
use digest::{ExtendableOutput, Update};
use zeroize::Zeroize;

use crate::{tools::hashing::Chain, uint::BoxedEncoding};

/// Sizes and primitive types shared by all the identity schemes.
///
/// One set of parameters covers a whole trust group: the IFF and MV prime moduli,
/// the GQ RSA modulus and the hash used to blind prover commitments.
pub trait GroupParams: 'static + Debug + Clone + Copy + PartialEq + Eq + Send + Sync {
    /// The size of the prime modulus $p$ (IFF, MV) and of the RSA modulus $n$ (GQ).
    const MODULUS_BITS: u32;

    /// The size of the IFF subgroup order $q$.
    const SUBGROUP_BITS: u32;

    /// The smallest allowed size of an MV per-client prime factor.
    const MIN_FACTOR_BITS: u32;

    /// The number of bits of security; the commitment hash is twice as long.
    const SECURITY_BITS: usize;

    /// The extendable output hash used for commitments.
    type Digest: Default + Clone + Update + ExtendableOutput;

    /// An integer that fits any of the moduli.
    type Uint: Integer<Monty = Self::UintMod>
        + Bounded
        + BitOps
        + Copy
        + Ord
        + From<u64>
        + Shl<u32, Output = Self::Uint>
        + BitOr<Output = Self::Uint>
        + RandomMod
        + RandomPrimeWithRng
        + BoxedEncoding
        + Zeroize;

    /// A modulo-residue counterpart of `Uint`.
    type UintMod: Monty<Integer = Self::Uint>
        + Copy
        + ConditionallySelectable
        + PowBoundedExp<Self::Uint>
        + Retrieve<Output = Self::Uint>
        + Invert<Output = CtOption<Self::UintMod>>
        + Zeroize;

    /// Returns `true` if the sizes can be used with the chosen integer type.
    const SELF_CONSISTENT: bool = Self::MODULUS_BITS <= <Self::Uint as Bounded>::BITS
        && Self::MODULUS_BITS % 2 == 0
        && Self::SUBGROUP_BITS >= 16
        && Self::SUBGROUP_BITS + 16 <= Self::MODULUS_BITS
        && Self::MIN_FACTOR_BITS >= 8
        && Self::MIN_FACTOR_BITS + 2 <= Self::MODULUS_BITS
        && Self::SECURITY_BITS > 0;

    /// Returns the size of each of the `factors` MV prime factors,
    /// or `None` if the modulus cannot accommodate that many.
    ///
    /// The product of the factors $q$ has to leave room for $p = 2 q + 1$.
    fn mv_factor_bits(factors: usize) -> Option<u32> {
        let factors = u32::try_from(factors).ok().filter(|factors| *factors > 0)?;
        let bits = (Self::MODULUS_BITS - 2) / factors;
        if bits < Self::MIN_FACTOR_BITS {
            return None;
        }
        Some(bits)
    }
}

pub(crate) fn chain_group_params<P, C>(digest: C) -> C
where
    P: GroupParams,
    C: Chain,
{
    digest
        .chain_bytes(&P::MODULUS_BITS.to_be_bytes())
        .chain_bytes(&P::SUBGROUP_BITS.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::GroupParams;
    use crate::params::TestParams;

    #[test]
    fn mv_factor_bits_leaves_room_for_the_safe_prime() {
        let bits = TestParams::mv_factor_bits(4).unwrap();
        assert!(bits * 4 + 2 <= TestParams::MODULUS_BITS);
    }

    #[test]
    fn mv_factor_bits_rejects_degenerate_client_counts() {
        assert!(TestParams::mv_factor_bits(0).is_none());
        assert!(TestParams::mv_factor_bits(TestParams::MODULUS_BITS as usize).is_none());
    }
}
