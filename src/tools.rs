pub(crate) mod encoding;
pub(crate) mod hashing;
mod secret;

pub(crate) use secret::Secret;
