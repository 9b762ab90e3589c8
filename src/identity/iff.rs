//! Schnorr identity scheme (IFF, "Identify Friend or Foe").
//!
//! The trusted authority publishes a prime $p$, a prime $q$ dividing $p - 1$
//! and a generator $g$ of the order-$q$ subgroup of $\mathbb{Z}_p^*$.
//! Servers hold the group key $b$, clients hold $v = g^{q - b} \mod p$.
//!
//! - Alice sends a random $r \in [1, q)$.
//! - Bob rolls $k \in [1, q)$ and replies with $y = k + b r \mod q$ and $H(g^k \mod p)$.
//! - Alice accepts if $H(g^y v^r \mod p)$ matches, since $g^y v^r = g^{k + q r} = g^k$.

use crypto_bigint::{modular::Retrieve, WrappingSub};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::{primes, self_test_round, GenerationError, IdentityScheme, SchemeKind};
use crate::{
    params::GroupParams,
    tools::{
        hashing::{Chain, HashOutput, Hasher},
        Secret,
    },
    uint::{Exponentiable, Modulus, PublicUint},
};

const COMMITMENT_DST: &[u8] = b"Autokey-IFF-commitment";

/// The IFF scheme marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iff;

/// Public IFF group parameters $(p, q, g)$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IffGroup<P: GroupParams> {
    p: Modulus<P>,
    q: Modulus<P>,
    g: PublicUint<P::Uint>,
}

impl<P: GroupParams> IffGroup<P> {
    /// Generates a fresh group.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, GenerationError> {
        let q_value = primes::random_prime::<P>(rng, P::SUBGROUP_BITS);
        let p_value = primes::random_prime_with_factor::<P>(rng, &q_value, P::MODULUS_BITS);

        let q = Modulus::<P>::new(q_value).ok_or(GenerationError::invalid(SchemeKind::Iff, "q is not an odd prime"))?;
        let p = Modulus::<P>::new(p_value).ok_or(GenerationError::invalid(SchemeKind::Iff, "p is not an odd prime"))?;

        // Any $h^{(p-1)/q} \ne 1$ generates the order-$q$ subgroup.
        let cofactor = p_value.wrapping_sub(&P::Uint::from(1u64)) / q.nonzero().clone();
        let g = loop {
            let h = p.residue(&p.random_nonzero_residue(rng));
            let g = h.pow(&cofactor);
            if !p.is_one(&g) {
                break g.retrieve();
            }
        };

        let group = Self { p, q, g: g.into() };
        group.self_test()?;
        tracing::debug!("Generated a {}-bit IFF group", P::MODULUS_BITS);
        Ok(group)
    }

    fn self_test(&self) -> Result<(), GenerationError> {
        if !self.p.is_one(&self.generator().pow(self.q.value())) {
            return Err(GenerationError::self_test(SchemeKind::Iff, "g^q = 1 (mod p)"));
        }
        Ok(())
    }

    fn generator(&self) -> P::UintMod {
        self.p.residue(&self.g)
    }
}

/// The server half of IFF: the group parameters and the group key $b$.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IffProverKey<P: GroupParams> {
    group: IffGroup<P>,
    b: Secret<P::Uint>,
    v: PublicUint<P::Uint>,
}

impl<P: GroupParams> IffProverKey<P> {
    /// Generates a fresh group and a group key for it.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, GenerationError> {
        let group = IffGroup::generate(rng)?;
        Self::new(rng, group)
    }

    /// Rolls a group key for existing group parameters.
    pub fn new(rng: &mut impl CryptoRngCore, group: IffGroup<P>) -> Result<Self, GenerationError> {
        let b = Secret::init_with(|| group.q.random_nonzero_residue(rng));
        let q_minus_b = Secret::init_with(|| group.q.value().wrapping_sub(b.expose_secret()));

        let g = group.generator();
        let v = q_minus_b.pow_of(&g);
        if !group.p.is_one(&(v * b.pow_of(&g))) {
            return Err(GenerationError::self_test(SchemeKind::Iff, "g^(q-b) g^b = 1 (mod p)"));
        }

        let key = Self {
            group,
            b,
            v: v.retrieve().into(),
        };
        self_test_round::<P, Iff>(rng, &key, &key.verifier_key())?;
        Ok(key)
    }

    /// The group parameters.
    pub fn group(&self) -> &IffGroup<P> {
        &self.group
    }

    /// Returns the client key matching this group key.
    pub fn verifier_key(&self) -> IffVerifierKey<P> {
        IffVerifierKey {
            group: self.group.clone(),
            v: self.v,
        }
    }
}

/// The client half of IFF: the group parameters and $v = g^{q - b}$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IffVerifierKey<P: GroupParams> {
    group: IffGroup<P>,
    v: PublicUint<P::Uint>,
}

impl<P: GroupParams> IffVerifierKey<P> {
    /// The group parameters.
    pub fn group(&self) -> &IffGroup<P> {
        &self.group
    }
}

/// Alice's nonce $r$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IffChallenge<P: GroupParams> {
    r: PublicUint<P::Uint>,
}

/// Bob's reply: $y$ and the hashed commitment $H(g^k)$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IffResponse<P: GroupParams> {
    y: PublicUint<P::Uint>,
    commitment: HashOutput,
}

fn commitment<P: GroupParams>(x: &P::Uint) -> HashOutput {
    Hasher::<P>::new_with_dst(COMMITMENT_DST)
        .chain(&PublicUint::new(*x))
        .finalize()
}

impl<P: GroupParams> IdentityScheme<P> for Iff {
    const KIND: SchemeKind = SchemeKind::Iff;
    type ProverKey = IffProverKey<P>;
    type VerifierKey = IffVerifierKey<P>;
    type Challenge = IffChallenge<P>;
    type Response = IffResponse<P>;

    fn challenge(rng: &mut impl CryptoRngCore, key: &Self::VerifierKey) -> Self::Challenge {
        IffChallenge {
            r: key.group.q.random_nonzero_residue(rng).into(),
        }
    }

    fn respond(
        rng: &mut impl CryptoRngCore,
        key: &Self::ProverKey,
        challenge: &Self::Challenge,
    ) -> Option<Self::Response> {
        let group = &key.group;
        let r = challenge.r.checked_below(group.q.value())?;

        let k = Secret::init_with(|| group.q.random_nonzero_residue(rng));
        let k_mod = k.to_montgomery(group.q.monty_params());
        let b_mod = key.b.to_montgomery(group.q.monty_params());
        let y = *k_mod.expose_secret() + *b_mod.expose_secret() * group.q.residue(r);

        let x = k.pow_of(&group.generator());
        Some(IffResponse {
            y: y.retrieve().into(),
            commitment: commitment::<P>(&x.retrieve()),
        })
    }

    fn verify(key: &Self::VerifierKey, challenge: &Self::Challenge, response: &Self::Response) -> bool {
        let group = &key.group;
        let Some(y) = response.y.checked_below(group.q.value()) else {
            tracing::trace!("IFF response out of range");
            return false;
        };
        let v = group.p.residue(&key.v);
        let x = group.generator().pow(y) * v.pow(&*challenge.r);
        commitment::<P>(&x.retrieve()) == response.commitment
    }
}
