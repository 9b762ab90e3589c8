//! Guillou-Quisquater identity scheme (GQ).
//!
//! The trusted authority publishes an RSA modulus $n$ (the factors are discarded)
//! and a group key $b$. Each server rolls its own private key $u$ and publishes
//! $v = (u^{-1})^b \mod n$ in its certificate.
//!
//! - Alice sends a random $r \in [1, n)$.
//! - Bob rolls an invertible $k$ and replies with $y = k u^r \mod n$ and $H(k^b \mod n)$.
//! - Alice accepts if $H(y^b v^r \mod n)$ matches.

use alloc::boxed::Box;

use crypto_bigint::modular::Retrieve;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::{primes, self_test_round, GenerationError, IdentityScheme, SchemeKind};
use crate::{
    params::GroupParams,
    tools::{
        hashing::{Chain, HashOutput, Hasher},
        Secret,
    },
    uint::{BoxedEncoding, Exponentiable, Modulus, PublicUint},
};

const COMMITMENT_DST: &[u8] = b"Autokey-GQ-commitment";

/// The GQ scheme marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gq;

/// GQ group parameters: the modulus $n$ and the group key $b$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GqGroup<P: GroupParams> {
    n: Modulus<P>,
    b: PublicUint<P::Uint>,
}

impl<P: GroupParams> GqGroup<P> {
    /// Generates a fresh modulus and group key.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, GenerationError> {
        let prime_bits = P::MODULUS_BITS / 2;
        let p1 = Secret::init_with(|| primes::random_prime::<P>(rng, prime_bits));
        let p2 = Secret::init_with(|| primes::random_distinct_prime::<P>(rng, prime_bits, &[*p1.expose_secret()]));

        let n = primes::product::<P>(&[*p1.expose_secret(), *p2.expose_secret()])
            .and_then(Modulus::new)
            .ok_or(GenerationError::invalid(SchemeKind::Gq, "n does not fit the integer type"))?;
        let b = n.random_nonzero_residue(rng);

        tracing::debug!("Generated a {}-bit GQ group", P::MODULUS_BITS);
        Ok(Self { n, b: b.into() })
    }
}

/// A server's GQ key: the group parameters, the private key $u$ and the public key $v$.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GqProverKey<P: GroupParams> {
    group: GqGroup<P>,
    u: Secret<P::Uint>,
    v: PublicUint<P::Uint>,
}

impl<P: GroupParams> GqProverKey<P> {
    /// Generates a fresh group and a server key for it.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, GenerationError> {
        let group = GqGroup::generate(rng)?;
        Self::new(rng, group)
    }

    /// Rolls a server key for existing group parameters.
    pub fn new(rng: &mut impl CryptoRngCore, group: GqGroup<P>) -> Result<Self, GenerationError> {
        let u = Secret::init_with(|| group.n.random_invertible(rng));
        let u_inv = Secret::try_init_with(|| {
            group
                .n
                .invert(u.expose_secret())
                .ok_or(GenerationError::invalid(SchemeKind::Gq, "u is not invertible"))
        })?;

        let v = u_inv.expose_secret().pow(&*group.b);
        let u_mod = u.to_montgomery(group.n.monty_params());
        if !group.n.is_one(&(u_mod.expose_secret().pow(&*group.b) * v)) {
            return Err(GenerationError::self_test(SchemeKind::Gq, "u^b (u^-1)^b = 1 (mod n)"));
        }

        let key = Self {
            group,
            u,
            v: v.retrieve().into(),
        };
        self_test_round::<P, Gq>(rng, &key, &key.verifier_key())?;
        Ok(key)
    }

    /// The group parameters.
    pub fn group(&self) -> &GqGroup<P> {
        &self.group
    }

    /// Returns the public key $v$ in the fixed-width form carried by the server certificate.
    pub fn public_key_bytes(&self) -> Box<[u8]> {
        self.v.to_be_bytes()
    }

    /// The client side of this key.
    pub fn verifier_key(&self) -> GqVerifierKey<P> {
        GqVerifierKey {
            group: self.group.clone(),
            v: self.v,
        }
    }
}

/// What a client needs to verify a given GQ server: the group and the server's $v$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GqVerifierKey<P: GroupParams> {
    group: GqGroup<P>,
    v: PublicUint<P::Uint>,
}

impl<P: GroupParams> GqVerifierKey<P> {
    /// Combines the group parameters with a public key taken from a server certificate.
    ///
    /// Returns `None` if the bytes do not encode an invertible residue modulo $n$.
    pub fn from_public_key_bytes(group: GqGroup<P>, bytes: &[u8]) -> Option<Self> {
        let v = P::Uint::try_from_be_bytes(bytes).ok()?;
        if !group.n.contains(&v) || group.n.invert(&v).is_none() {
            return None;
        }
        Some(Self { group, v: v.into() })
    }

    /// The group parameters.
    pub fn group(&self) -> &GqGroup<P> {
        &self.group
    }
}

/// Alice's nonce $r$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GqChallenge<P: GroupParams> {
    r: PublicUint<P::Uint>,
}

/// Bob's reply: $y$ and the hashed commitment $H(k^b)$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GqResponse<P: GroupParams> {
    y: PublicUint<P::Uint>,
    commitment: HashOutput,
}

fn commitment<P: GroupParams>(x: &P::Uint) -> HashOutput {
    Hasher::<P>::new_with_dst(COMMITMENT_DST)
        .chain(&PublicUint::new(*x))
        .finalize()
}

impl<P: GroupParams> IdentityScheme<P> for Gq {
    const KIND: SchemeKind = SchemeKind::Gq;
    type ProverKey = GqProverKey<P>;
    type VerifierKey = GqVerifierKey<P>;
    type Challenge = GqChallenge<P>;
    type Response = GqResponse<P>;

    fn challenge(rng: &mut impl CryptoRngCore, key: &Self::VerifierKey) -> Self::Challenge {
        GqChallenge {
            r: key.group.n.random_nonzero_residue(rng).into(),
        }
    }

    fn respond(
        rng: &mut impl CryptoRngCore,
        key: &Self::ProverKey,
        challenge: &Self::Challenge,
    ) -> Option<Self::Response> {
        let n = &key.group.n;
        let r = challenge.r.checked_below(n.value())?;

        let k = Secret::init_with(|| n.random_invertible(rng));
        let k_mod = k.to_montgomery(n.monty_params());
        let u_mod = key.u.to_montgomery(n.monty_params());

        let y = *k_mod.expose_secret() * u_mod.expose_secret().pow(r);
        let x = k_mod.expose_secret().pow(&*key.group.b);
        Some(GqResponse {
            y: y.retrieve().into(),
            commitment: commitment::<P>(&x.retrieve()),
        })
    }

    fn verify(key: &Self::VerifierKey, challenge: &Self::Challenge, response: &Self::Response) -> bool {
        let n = &key.group.n;
        // $y = 0$ would match the commitment $H(0)$ for any nonce.
        let Some(y) = response.y.checked_below(n.value()).filter(|y| n.invert(y).is_some()) else {
            tracing::trace!("GQ response is not an invertible residue");
            return false;
        };
        let x = n.residue(y).pow(&*key.group.b) * n.residue(&key.v).pow(&*challenge.r);
        commitment::<P>(&x.retrieve()) == response.commitment
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{Gq, GqChallenge, GqGroup, GqProverKey, GqVerifierKey};
    use crate::{
        identity::IdentityScheme,
        params::{GroupParams, TestParams},
        uint::PublicUint,
    };

    type Uint = <TestParams as GroupParams>::Uint;

    #[test_log::test]
    fn server_key_identity() {
        // $u^b (u^{-1})^b = 1 \mod n$ for every generated server key.
        let first = GqProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        for _ in 0..4 {
            let key = GqProverKey::new(&mut OsRng, first.group().clone()).unwrap();
            let n = &key.group.n;
            let u = n.residue(key.u.expose_secret());
            let v = n.residue(&key.v);
            assert!(n.is_one(&(u.pow(&*key.group.b) * v)));
        }
    }

    #[test_log::test]
    fn round_trip() {
        let prover = GqProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        let verifier = prover.verifier_key();

        let challenge = Gq::challenge(&mut OsRng, &verifier);
        let response = Gq::respond(&mut OsRng, &prover, &challenge).unwrap();
        assert!(Gq::verify(&verifier, &challenge, &response));

        let other_challenge = Gq::challenge(&mut OsRng, &verifier);
        assert!(!Gq::verify(&verifier, &other_challenge, &response));
    }

    #[test_log::test]
    fn other_server_key_fails() {
        let prover = GqProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        let impostor = GqProverKey::new(&mut OsRng, prover.group().clone()).unwrap();
        let verifier = prover.verifier_key();

        let challenge = Gq::challenge(&mut OsRng, &verifier);
        let response = Gq::respond(&mut OsRng, &impostor, &challenge).unwrap();
        assert!(!Gq::verify(&verifier, &challenge, &response));
    }

    #[test_log::test]
    fn other_group_key_fails() {
        let prover = GqProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        let genuine = prover.verifier_key();

        // Same modulus and server key, different $b$.
        let n = prover.group.n.clone();
        let b = loop {
            let b = n.random_nonzero_residue(&mut OsRng);
            if b != *prover.group.b {
                break b;
            }
        };
        let verifier = GqVerifierKey {
            group: GqGroup { n, b: b.into() },
            v: genuine.v,
        };

        let challenge = Gq::challenge(&mut OsRng, &verifier);
        let response = Gq::respond(&mut OsRng, &prover, &challenge).unwrap();
        assert!(Gq::verify(&genuine, &challenge, &response));
        assert!(!Gq::verify(&verifier, &challenge, &response));
    }

    #[test_log::test]
    fn public_key_from_certificate() {
        let prover = GqProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        let bytes = prover.public_key_bytes();
        let verifier = GqVerifierKey::from_public_key_bytes(prover.group().clone(), &bytes).unwrap();
        assert_eq!(verifier, prover.verifier_key());

        assert!(GqVerifierKey::from_public_key_bytes(prover.group().clone(), &bytes[1..]).is_none());
        let n_bytes = crate::uint::BoxedEncoding::to_be_bytes(prover.group.n.value());
        assert!(GqVerifierKey::from_public_key_bytes(prover.group().clone(), &n_bytes).is_none());
    }

    #[test_log::test]
    fn degenerate_values_are_rejected() {
        let prover = GqProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        let verifier = prover.verifier_key();

        let challenge = GqChallenge {
            r: PublicUint::new(*prover.group.n.value()),
        };
        assert!(Gq::respond(&mut OsRng, &prover, &challenge).is_none());

        let challenge = Gq::challenge(&mut OsRng, &verifier);
        let mut response = Gq::respond(&mut OsRng, &prover, &challenge).unwrap();
        response.y = PublicUint::new(Uint::ZERO);
        response.commitment = super::commitment::<TestParams>(&Uint::ZERO);
        assert!(!Gq::verify(&verifier, &challenge, &response));
    }
}
