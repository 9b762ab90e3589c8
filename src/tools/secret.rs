use alloc::boxed::Box;
use core::fmt::Debug;

use crypto_bigint::{Integer, Monty};
use secrecy::{ExposeSecret, SecretBox};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use serde_encoded_bytes::{Hex, SliceLike};
use zeroize::Zeroize;

use crate::uint::{BoxedEncoding, Exponentiable, ToMontgomery};

/// A helper wrapper for managing secret values (group keys, private keys, ephemeral nonces).
///
/// On top of `secrecy::SecretBox` functionality, it provides:
/// - Safe `Clone` implementation (without needing to impl `CloneableSecret`)
/// - Safe `Debug` implementation
/// - Safe serialization/deserialization (down to `serde` API; what happens there we cannot control)
pub(crate) struct Secret<T: Zeroize>(SecretBox<T>);

impl<T> Secret<T>
where
    T: Zeroize,
{
    pub fn expose_secret(&self) -> &T {
        self.0.expose_secret()
    }
}

impl<T> Secret<T>
where
    T: Zeroize + Clone,
{
    pub fn init_with(ctr: impl FnOnce() -> T) -> Self {
        Self(SecretBox::init_with(ctr))
    }

    pub fn try_init_with<E>(ctr: impl FnOnce() -> Result<T, E>) -> Result<Self, E> {
        Ok(Self(SecretBox::try_init_with(ctr)?))
    }
}

impl<T> Clone for Secret<T>
where
    T: Zeroize + Clone,
{
    fn clone(&self) -> Self {
        Self::init_with(|| self.0.expose_secret().clone())
    }
}

impl<T> Serialize for Secret<T>
where
    T: Zeroize + BoxedEncoding,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = SecretBox::<[u8]>::from(self.0.expose_secret().to_be_bytes());
        SliceLike::<Hex>::serialize(&bytes.expose_secret(), serializer)
    }
}

impl<'de, T> Deserialize<'de> for Secret<T>
where
    T: Zeroize + Clone + BoxedEncoding,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Box<[u8]> = SliceLike::<Hex>::deserialize(deserializer)?;
        let bytes = SecretBox::<[u8]>::from(bytes);
        Self::try_init_with(|| T::try_from_be_bytes(bytes.expose_secret())).map_err(D::Error::custom)
    }
}

impl<T> Debug for Secret<T>
where
    T: Zeroize,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Secret<{}>(...)", core::any::type_name::<T>())
    }
}

impl<T> Secret<T>
where
    T: Zeroize + Integer<Monty: Zeroize>,
{
    pub fn to_montgomery(&self, params: &<T::Monty as Monty>::Params) -> Secret<T::Monty> {
        // `self` has to be cloned and passed by value, which means it may be retained on the stack.
        // Can't help it with the current `Monty::new()` signature.
        Secret::init_with(|| self.expose_secret().clone().to_montgomery(params))
    }
}

impl<T> Secret<T>
where
    T: Zeroize + Clone,
{
    /// Raises a public base to this secret power.
    pub fn pow_of<B>(&self, base: &B) -> B
    where
        B: Exponentiable<T>,
    {
        base.pow(self.expose_secret())
    }
}
