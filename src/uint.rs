mod modulus;
mod public_uint;
mod traits;

pub(crate) use modulus::Modulus;
pub(crate) use public_uint::PublicUint;
pub(crate) use traits::{BoxedEncoding, Exponentiable, ToMontgomery};
