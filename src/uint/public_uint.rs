use alloc::boxed::Box;

use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use serde_encoded_bytes::{Hex, SliceLike};

use super::BoxedEncoding;

/// A non-secret integer that travels on the wire or in parameter files.
///
/// Serialized as fixed-width big-endian bytes (hex in human-readable formats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PublicUint<T>(T);

impl<T> PublicUint<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Ord> PublicUint<T> {
    /// Returns the value if it is a residue modulo `bound`, that is `value < bound`.
    pub fn checked_below(&self, bound: &T) -> Option<&T> {
        if &self.0 < bound {
            Some(&self.0)
        } else {
            None
        }
    }
}

impl<T> Serialize for PublicUint<T>
where
    T: BoxedEncoding,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SliceLike::<Hex>::serialize(&self.0.to_be_bytes(), serializer)
    }
}

impl<'de, T> Deserialize<'de> for PublicUint<T>
where
    T: BoxedEncoding,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Box<[u8]> = SliceLike::<Hex>::deserialize(deserializer)?;
        T::try_from_be_bytes(&bytes).map(Self).map_err(D::Error::custom)
    }
}

impl<T> core::ops::Deref for PublicUint<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> From<T> for PublicUint<T> {
    fn from(source: T) -> Self {
        Self(source)
    }
}

#[cfg(test)]
mod tests {
    use crypto_bigint::U64;
    use serde::{Deserialize, Serialize};
    use serde_assert::{Deserializer, Serializer, Token};

    use super::PublicUint;

    #[test]
    fn serializes_as_fixed_width_bytes() {
        let value = PublicUint::new(U64::from_u64(0x0102_0304));

        let serializer = Serializer::builder().is_human_readable(false).build();
        let tokens = value.serialize(&serializer).unwrap();
        assert_eq!(tokens, [Token::Bytes([0, 0, 0, 0, 1, 2, 3, 4].into())]);

        let mut deserializer = Deserializer::builder(tokens).is_human_readable(false).build();
        let restored = PublicUint::<U64>::deserialize(&mut deserializer).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn range_check() {
        let value = PublicUint::new(U64::from_u64(10));
        assert!(value.checked_below(&U64::from_u64(11)).is_some());
        assert!(value.checked_below(&U64::from_u64(10)).is_none());
    }
}
