use alloc::{boxed::Box, format, string::String, vec};

use crypto_bigint::{Bounded, Encoding, Integer, Limb, Monty, PowBoundedExp, Uint};

pub(crate) trait ToMontgomery: Integer {
    fn to_montgomery(self, params: &<Self::Monty as Monty>::Params) -> Self::Monty {
        <Self::Monty as Monty>::new(self, params.clone())
    }
}

impl<T> ToMontgomery for T where T: Integer {}

/// Exponentiation to the power of a full-width integer.
///
/// The running time depends on the width of the exponent type, not on its value,
/// so secret exponents (group keys, ephemeral nonces) are safe to pass here.
// We cannot use the `crypto_bigint::Pow` trait since we cannot implement it for the foreign types
// (namely, `crypto_bigint::modular::MontyForm`).
pub(crate) trait Exponentiable<Exponent> {
    fn pow(&self, exp: &Exponent) -> Self;
}

impl<T, V> Exponentiable<V> for T
where
    T: PowBoundedExp<V>,
    V: Bounded,
{
    fn pow(&self, exp: &V) -> Self {
        self.pow_bounded_exp(exp, V::BITS)
    }
}

/// Fixed-size big-endian encoding of an integer.
pub trait BoxedEncoding: Sized {
    fn to_be_bytes(&self) -> Box<[u8]>;
    fn try_from_be_bytes(bytes: &[u8]) -> Result<Self, String>;
}

impl<const L: usize> BoxedEncoding for Uint<L> {
    fn to_be_bytes(&self) -> Box<[u8]> {
        let mut result = vec![0u8; Self::BYTES];
        // SAFETY:
        // - `rchunks_mut` will not panic as long as `Self::BYTES` is a multiple of `Limb::BYTES`
        // - `copy_from_slice` will not panic as long as `Limb::to_be_bytes()` returns an array of size `Limb::BYTES`
        for (limb, chunk) in self.as_limbs().iter().zip(result.rchunks_exact_mut(Limb::BYTES)) {
            chunk.copy_from_slice(&limb.to_be_bytes());
        }
        result.into()
    }

    fn try_from_be_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != Self::BYTES {
            return Err(format!(
                "Invalid slice length: {}, expected {}",
                bytes.len(),
                Self::BYTES
            ));
        }
        Ok(Self::from_be_slice(bytes))
    }
}

#[cfg(test)]
mod tests {
    use crypto_bigint::{modular::MontyForm, Monty, Odd, U128};

    use super::{BoxedEncoding, Exponentiable, ToMontgomery};

    #[test]
    fn encoding_is_fixed_width_big_endian() {
        let x = U128::from_u64(0x0102);
        let bytes = x.to_be_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[14..], &[1, 2]);
        assert_eq!(U128::try_from_be_bytes(&bytes).unwrap(), x);
    }

    #[test]
    fn decoding_rejects_wrong_length() {
        assert!(U128::try_from_be_bytes(&[0u8; 15]).is_err());
        assert!(U128::try_from_be_bytes(&[0u8; 17]).is_err());
    }

    #[test]
    fn pow_matches_small_arithmetic() {
        let modulus = Odd::new(U128::from_u64(1_000_003)).unwrap();
        let params = MontyForm::new_params_vartime(modulus);
        let base = U128::from_u64(2).to_montgomery(&params);
        let result = base.pow(&U128::from_u64(10));
        assert_eq!(result.retrieve(), U128::from_u64(1024));
    }
}
