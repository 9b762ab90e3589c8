use crypto_bigint::{modular::Retrieve, subtle::CtOption, Invert, Monty, NonZero, Odd, RandomMod};
use rand_core::CryptoRngCore;
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use super::{PublicUint, ToMontgomery};
use crate::params::GroupParams;

/// A public odd modulus together with its precomputed Montgomery parameters.
///
/// Every modulus the identity schemes work with (the IFF and MV primes,
/// the MV factor product and the GQ RSA modulus) is odd.
#[derive(Debug, Clone)]
pub(crate) struct Modulus<P: GroupParams> {
    value: NonZero<P::Uint>,
    monty_params: <P::UintMod as Monty>::Params,
}

impl<P: GroupParams> Modulus<P> {
    /// Returns `None` if `value` is even or smaller than 3.
    pub fn new(value: P::Uint) -> Option<Self> {
        if value < P::Uint::from(3u64) {
            return None;
        }
        let odd: Odd<P::Uint> = Option::from(Odd::new(value))?;
        let nonzero: NonZero<P::Uint> = Option::from(NonZero::new(value))?;
        Some(Self {
            value: nonzero,
            monty_params: P::UintMod::new_params_vartime(odd),
        })
    }

    pub fn value(&self) -> &P::Uint {
        &self.value
    }

    pub fn nonzero(&self) -> &NonZero<P::Uint> {
        &self.value
    }

    pub fn monty_params(&self) -> &<P::UintMod as Monty>::Params {
        &self.monty_params
    }

    /// Returns `true` if `x` is a canonical residue, that is `x < m`.
    pub fn contains(&self, x: &P::Uint) -> bool {
        x < self.value()
    }

    /// Reduces `x` and converts it to the Montgomery form.
    pub fn residue(&self, x: &P::Uint) -> P::UintMod {
        let reduced = *x % self.value.clone();
        reduced.to_montgomery(&self.monty_params)
    }

    pub fn one(&self) -> P::UintMod {
        self.residue(&P::Uint::from(1u64))
    }

    /// Returns `true` if `x` is congruent to 1.
    pub fn is_one(&self, x: &P::UintMod) -> bool {
        x.retrieve() == P::Uint::from(1u64)
    }

    pub fn random_residue(&self, rng: &mut impl CryptoRngCore) -> P::Uint {
        P::Uint::random_mod(rng, &self.value)
    }

    /// Returns a uniformly chosen residue in `[1, m)`.
    pub fn random_nonzero_residue(&self, rng: &mut impl CryptoRngCore) -> P::Uint {
        let zero = P::Uint::from(0u64);
        loop {
            let r = self.random_residue(rng);
            if r != zero {
                return r;
            }
        }
    }

    /// Finds an invertible residue via rejection sampling.
    pub fn random_invertible(&self, rng: &mut impl CryptoRngCore) -> P::Uint {
        loop {
            let r = self.random_nonzero_residue(rng);
            if self.invert(&r).is_some() {
                return r;
            }
        }
    }

    /// Returns the modular inverse of `x`, if it exists.
    pub fn invert(&self, x: &P::Uint) -> Option<P::UintMod> {
        let inverse: CtOption<P::UintMod> = self.residue(x).invert();
        Option::from(inverse)
    }
}

impl<P: GroupParams> PartialEq for Modulus<P> {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl<P: GroupParams> Eq for Modulus<P> {}

impl<P: GroupParams> Serialize for Modulus<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PublicUint::new(*self.value()).serialize(serializer)
    }
}

impl<'de, P: GroupParams> Deserialize<'de> for Modulus<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = PublicUint::<P::Uint>::deserialize(deserializer)?;
        Self::new(value.into_inner()).ok_or_else(|| D::Error::custom("the modulus must be odd and at least 3"))
    }
}
