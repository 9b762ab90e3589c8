use alloc::boxed::Box;

use digest::{ExtendableOutput, Update, XofReader};
use hashing_serializer::HashingSerializer;
use serde::{Deserialize, Serialize};
use serde_encoded_bytes::{Hex, SliceLike};

use crate::params::{chain_group_params, GroupParams};

/// A digest object that takes byte slices or decomposable ([`Hashable`]) objects.
pub trait Chain: Sized {
    fn as_digest_mut(&mut self) -> &mut impl Update;

    /// Hash raw bytes.
    ///
    /// Note: only for impls in specific types, do not use directly.
    fn chain_raw_bytes(self, bytes: &[u8]) -> Self;

    /// Hash raw bytes in a collision-resistant way.
    fn chain_bytes(self, bytes: &(impl AsRef<[u8]> + ?Sized)) -> Self {
        // Hash the length too to prevent hash conflicts. (e.g. H(AB|CD) == H(ABC|D)).
        // Not strictly necessary for fixed-size arrays, but it's easier to just always do it.
        let len = (bytes.as_ref().len() as u64).to_be_bytes();
        self.chain_raw_bytes(&len).chain_raw_bytes(bytes.as_ref())
    }

    fn chain<T: Hashable>(self, hashable: &T) -> Self {
        hashable.chain(self)
    }
}

/// Wraps an extendable output hash for easier replacement, and standardizes the use of DST.
pub struct Hasher<P: GroupParams>(P::Digest);

impl<P: GroupParams> Chain for Hasher<P> {
    fn as_digest_mut(&mut self) -> &mut impl Update {
        &mut self.0
    }

    fn chain_raw_bytes(self, bytes: &[u8]) -> Self {
        let mut digest = self.0;
        digest.update(bytes);
        Self(digest)
    }
}

impl<P: GroupParams> Hasher<P> {
    fn new() -> Self {
        Self(P::Digest::default())
    }

    /// Creates a hasher bound to a domain separation tag and to the group sizes.
    pub fn new_with_dst(dst: &[u8]) -> Self {
        chain_group_params::<P, _>(Self::new().chain_bytes(dst))
    }

    /// Finalizes into enough bytes to bring the collision probability to what's required by the group's security.
    pub fn finalize(self) -> HashOutput {
        // A common heuristic for hashes is that the log2 of the collision probability is half the output size.
        HashOutput(self.0.finalize_xof().read_boxed((P::SECURITY_BITS * 2).div_ceil(8)))
    }
}

/// A commitment hash as it travels in identity responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashOutput(#[serde(with = "SliceLike::<Hex>")] Box<[u8]>);

impl AsRef<[u8]> for HashOutput {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A trait allowing complex objects to give access to their contents for hashing purposes
/// without the need of a conversion to a new form (e.g. serialization).
pub trait Hashable {
    fn chain<C: Chain>(&self, digest: C) -> C;
}

// Everything we hash already implements `Serialize`,
// so there's no point in implementing `Hashable` for them separately.
// The reproducibility of this hash depends on `serde` not breaking things,
// which we can be quite certain about - it is stable, and if it does break something,
// all the serialization will likely break too.
impl<T: Serialize> Hashable for T {
    fn chain<C: Chain>(&self, digest: C) -> C {
        let mut digest = digest;

        let serializer = HashingSerializer {
            digest: digest.as_digest_mut(),
        };

        // The only way it can return an error is if there is
        // some non-serializable element encountered, which is 100% reproducible
        // and will be caught in tests.
        self.serialize(serializer).expect("The type is serializable");

        digest
    }
}

#[cfg(test)]
mod tests {
    use super::{Chain, Hasher};
    use crate::params::{GroupParams, Ntp512, TestParams};

    #[test]
    fn output_length_follows_security_bits() {
        let h = Hasher::<TestParams>::new_with_dst(b"test").chain(&1u32).finalize();
        assert_eq!(h.as_ref().len(), (TestParams::SECURITY_BITS * 2).div_ceil(8));
    }

    #[test]
    fn domain_separation() {
        let h1 = Hasher::<Ntp512>::new_with_dst(b"a").chain(&1u32).finalize();
        let h2 = Hasher::<Ntp512>::new_with_dst(b"b").chain(&1u32).finalize();
        let h3 = Hasher::<Ntp512>::new_with_dst(b"a").chain(&1u32).finalize();
        assert_ne!(h1, h2);
        assert_eq!(h1, h3);
    }

    #[test]
    fn length_prefix_prevents_concatenation_collisions() {
        let h1 = Hasher::<TestParams>::new_with_dst(b"x").chain_bytes(b"ab").chain_bytes(b"cd").finalize();
        let h2 = Hasher::<TestParams>::new_with_dst(b"x").chain_bytes(b"abc").chain_bytes(b"d").finalize();
        assert_ne!(h1, h2);
    }
}
