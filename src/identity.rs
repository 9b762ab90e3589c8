//! Zero-knowledge identity schemes.
//!
//! Each scheme has the same shape: the verifier (Alice, the client) rolls a nonce
//! and sends it as a challenge; the prover (Bob, the server) binds the nonce to his
//! private key with a fresh ephemeral value and returns the response; the verifier
//! recombines the response with public data and her nonce.

mod gq;
mod iff;
mod mv;
mod primes;

use rand_core::CryptoRngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::params::GroupParams;

pub use gq::{Gq, GqChallenge, GqGroup, GqProverKey, GqResponse, GqVerifierKey};
pub use iff::{Iff, IffChallenge, IffGroup, IffProverKey, IffResponse, IffVerifierKey};
pub use mv::{Mv, MvAuthority, MvChallenge, MvClientKey, MvGroup, MvResponse, MvServerKey};

/// The identity schemes known to the Autokey protocol.
#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemeKind {
    /// IFF
    Iff,
    /// GQ
    Gq,
    /// MV
    Mv,
}

impl SchemeKind {
    /// The order in which schemes are tried when more than one is available.
    pub const PREFERENCE: [SchemeKind; 3] = [SchemeKind::Gq, SchemeKind::Iff, SchemeKind::Mv];
}

/// An error raised while generating group parameters or keys.
///
/// These are never retried: a failed self-test means the arithmetic or the
/// randomness source cannot be trusted.
#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationError {
    /// {scheme}: algebraic self-test failed ({check})
    SelfTest {
        /// The scheme being generated.
        scheme: SchemeKind,
        /// The identity that did not hold.
        check: &'static str,
    },
    /// {scheme}: invalid parameters ({reason})
    InvalidParameters {
        /// The scheme being generated.
        scheme: SchemeKind,
        /// What was wrong with them.
        reason: &'static str,
    },
    /// MV: no client with index {0}
    UnknownClient(usize),
}

impl core::error::Error for GenerationError {}

impl GenerationError {
    pub(crate) fn self_test(scheme: SchemeKind, check: &'static str) -> Self {
        tracing::error!("{scheme} self-test failed: {check}");
        Self::SelfTest { scheme, check }
    }

    pub(crate) fn invalid(scheme: SchemeKind, reason: &'static str) -> Self {
        Self::InvalidParameters { scheme, reason }
    }
}

/// The challenge-construct / response-construct / verify triad of an identity scheme.
pub trait IdentityScheme<P: GroupParams> {
    /// The protocol tag of the scheme.
    const KIND: SchemeKind;

    /// The key material of the prover (the server).
    type ProverKey;

    /// The key material of the verifier (the client).
    type VerifierKey;

    /// The nonce sent by the verifier; the verifier keeps a copy until the response arrives.
    type Challenge: Clone + Serialize + DeserializeOwned;

    /// The prover's answer to a challenge.
    type Response: Serialize + DeserializeOwned;

    /// Rolls a fresh nonce.
    fn challenge(rng: &mut impl CryptoRngCore, key: &Self::VerifierKey) -> Self::Challenge;

    /// Answers a challenge.
    ///
    /// Returns `None` if the challenge is not a valid nonce for the prover's group.
    fn respond(
        rng: &mut impl CryptoRngCore,
        key: &Self::ProverKey,
        challenge: &Self::Challenge,
    ) -> Option<Self::Response>;

    /// Returns `true` if the response proves knowledge of the group secret.
    fn verify(key: &Self::VerifierKey, challenge: &Self::Challenge, response: &Self::Response) -> bool;
}

/// Runs one full challenge/response round on freshly generated keys.
pub(crate) fn self_test_round<P, S>(
    rng: &mut impl CryptoRngCore,
    prover: &S::ProverKey,
    verifier: &S::VerifierKey,
) -> Result<(), GenerationError>
where
    P: GroupParams,
    S: IdentityScheme<P>,
{
    let challenge = S::challenge(rng, verifier);
    let verified = S::respond(rng, prover, &challenge)
        .map(|response| S::verify(verifier, &challenge, &response))
        .unwrap_or(false);
    if verified {
        Ok(())
    } else {
        Err(GenerationError::self_test(S::KIND, "challenge/response round"))
    }
}
