//! Mu-Varadharajan broadcast identity scheme (MV) with client key revocation.
//!
//! The trusted authority picks distinct primes $s_j$ whose product $q$ makes $p = 2 q + 1$ prime,
//! a generator $g$ of order $q$, and a root $x_j$ for every client. The roots define the polynomial
//! $\prod_j (x - x_j) = \sum_i a_i x^i \mod q$, published in the exponent as $g_i = g^{a_i}$.
//! Client $j$ gets the decryption key $(\bar{x}_j, \hat{x}_j)$; the server gets
//! $(E, \bar{g}, \hat{g}) = (A^s, g^s, g^{s b})$, where $s$ is the product of the factors
//! of the clients that are still allowed in.
//!
//! - Alice sends a random $r \in [1, p)$.
//! - Bob rolls $k$ and replies with $y = r E^k$, $\bar{g}^k$ and $\hat{g}^k$.
//! - Alice accepts if $y (\bar{g}^k)^{\hat{x}_j} (\hat{g}^k)^{\bar{x}_j} = r \mod p$.
//!
//! The last check recovers $r$ only if $s_j$ divides $s$, so leaving $s_j$ out of $s$
//! and reissuing the server key locks out client $j$ alone.
//!
//! One extra factor is never assigned to a client and never enters $s$:
//! with every client factor in $s$ we would have $s = q$ and a server key of all ones.

use alloc::{collections::BTreeSet, vec, vec::Vec};

use crypto_bigint::{modular::Retrieve, NonZero, WrappingAdd};
use crypto_primes::RandomPrimeWithRng;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::{
    primes::{self, without},
    self_test_round, GenerationError, IdentityScheme, SchemeKind,
};
use crate::{
    params::GroupParams,
    tools::Secret,
    uint::{Exponentiable, Modulus, PublicUint},
};

/// The MV scheme marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mv;

/// Public MV group parameters: the prime $p = 2 q + 1$ and the subgroup order $q$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MvGroup<P: GroupParams> {
    p: Modulus<P>,
    q: Modulus<P>,
}

/// The key generator's state, from which the server key is reissued on every revocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MvAuthority<P: GroupParams> {
    group: MvGroup<P>,
    g: Secret<P::Uint>,
    // One per client, followed by the reserved factor.
    factors: Vec<Secret<P::Uint>>,
    a: Secret<P::Uint>,
    b: Secret<P::Uint>,
    clients: Vec<MvClientKey<P>>,
    revoked: BTreeSet<usize>,
}

/// The server key $(E, \bar{g}, \hat{g})$.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MvServerKey<P: GroupParams> {
    group: MvGroup<P>,
    e: Secret<P::Uint>,
    gbar: PublicUint<P::Uint>,
    ghat: PublicUint<P::Uint>,
}

/// Client `index`'s decryption key $(\bar{x}_j, \hat{x}_j)$.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MvClientKey<P: GroupParams> {
    index: usize,
    group: MvGroup<P>,
    xbar: Secret<P::Uint>,
    xhat: Secret<P::Uint>,
}

/// Finds the client factors and the reserved one such that $2 \prod s_j + 1$ is prime.
fn generate_factors<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    count: usize,
    bits: u32,
) -> Result<(Vec<P::Uint>, P::Uint, P::Uint), GenerationError> {
    let one = P::Uint::from(1u64);

    let mut factors = Vec::with_capacity(count);
    for _ in 0..count {
        let factor = primes::random_distinct_prime::<P>(rng, bits, &factors);
        factors.push(factor);
    }

    // Replace the factors one by one (round robin) until $p$ is prime.
    let mut attempt = 0usize;
    loop {
        let q = primes::product::<P>(&factors)
            .ok_or(GenerationError::invalid(SchemeKind::Mv, "q does not fit the integer type"))?;
        let p = q.wrapping_add(&q).wrapping_add(&one);
        if p.is_prime_with_rng(rng) {
            tracing::debug!("Found the MV prime after {attempt} factor replacements");
            return Ok((factors, q, p));
        }
        let replacement = primes::random_distinct_prime::<P>(rng, bits, &factors);
        if let Some(factor) = factors.get_mut(attempt % count) {
            *factor = replacement;
        }
        attempt += 1;
    }
}

impl<P: GroupParams> MvAuthority<P> {
    /// Generates the group, the private keys and the keys for `clients` clients.
    pub fn generate(rng: &mut impl CryptoRngCore, clients: usize) -> Result<Self, GenerationError> {
        if clients == 0 {
            return Err(GenerationError::invalid(SchemeKind::Mv, "at least one client is required"));
        }
        let factor_count = clients + 1;
        let bits = P::mv_factor_bits(factor_count)
            .ok_or(GenerationError::invalid(SchemeKind::Mv, "too many clients for the modulus size"))?;

        let (factors, q_value, p_value) = generate_factors::<P>(rng, factor_count, bits)?;
        let p = Modulus::<P>::new(p_value).ok_or(GenerationError::invalid(SchemeKind::Mv, "p is not an odd prime"))?;
        let q = Modulus::<P>::new(q_value).ok_or(GenerationError::invalid(SchemeKind::Mv, "q is not odd"))?;
        let zero = P::Uint::from(0u64);

        // $g = h^2$ has order dividing $q$; the order is exactly $q$
        // if no $g^{q / s_j}$ is trivial.
        let cofactors = (0..factor_count)
            .map(|j| {
                primes::product::<P>(&without(&factors, |i| i == j))
                    .ok_or(GenerationError::invalid(SchemeKind::Mv, "q does not fit the integer type"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let g = loop {
            let h = p.residue(&p.random_nonzero_residue(rng));
            let g = h * h;
            if !p.is_one(&g) && cofactors.iter().all(|cofactor| !p.is_one(&g.pow(cofactor))) {
                break g;
            }
        };

        // Client roots, none of them divisible by its own factor.
        let mut roots = Vec::with_capacity(clients);
        for factor in factors.iter().take(clients) {
            let factor: NonZero<P::Uint> = Option::from(NonZero::new(*factor))
                .ok_or(GenerationError::invalid(SchemeKind::Mv, "zero prime factor"))?;
            let root = loop {
                let x = q.random_residue(rng);
                if x % factor.clone() != zero {
                    break Secret::init_with(|| x);
                }
            };
            roots.push(root);
        }

        // Coefficients of $\prod_j (x - x_j)$, highest one last.
        let mut coefficients = vec![q.one(); clients + 1];
        for (j, root) in roots.iter().enumerate() {
            let x = q.residue(root.expose_secret());
            let mut w = q.residue(&zero);
            for coefficient in coefficients.iter_mut().take(j + 1) {
                let u = w - *coefficient * x;
                w = *coefficient;
                *coefficient = u;
            }
        }
        let powers = coefficients
            .iter()
            .map(|a_i| g.pow(&a_i.retrieve()))
            .collect::<Vec<_>>();

        // Every root must zero the polynomial in the exponent; the terms below
        // the leading one accumulate into $A$.
        let mut a = p.one();
        for root in &roots {
            let x = q.residue(root.expose_secret());
            let mut x_i = q.one();
            let mut value = p.one();
            for (i, g_i) in powers.iter().enumerate() {
                let term = g_i.pow(&x_i.retrieve());
                value = value * term;
                if i < clients {
                    a = a * term;
                }
                x_i = x_i * x;
            }
            if !p.is_one(&value) {
                return Err(GenerationError::self_test(SchemeKind::Mv, "prod g_i^(x_j^i) = 1 (mod p)"));
            }
        }

        let b = Secret::init_with(|| q.random_invertible(rng));
        let b_inv = Secret::try_init_with(|| {
            q.invert(b.expose_secret())
                .ok_or(GenerationError::invalid(SchemeKind::Mv, "b is not invertible"))
        })?;

        let degree = P::Uint::from(clients as u64);
        let roots_to_degree = roots
            .iter()
            .map(|root| Secret::init_with(|| q.residue(root.expose_secret()).pow(&degree)))
            .collect::<Vec<_>>();
        let sum = roots_to_degree
            .iter()
            .fold(q.residue(&zero), |acc, x_n| acc + *x_n.expose_secret());

        let group = MvGroup { p, q };
        let client_keys = roots_to_degree
            .iter()
            .zip(cofactors.iter())
            .enumerate()
            .map(|(index, (x_n, cofactor))| {
                let x_n = *x_n.expose_secret();
                let xbar = *b_inv.expose_secret() * (sum - x_n);
                let xhat = x_n * (group.q.residue(cofactor) + group.q.one());
                MvClientKey {
                    index,
                    group: group.clone(),
                    xbar: Secret::init_with(|| xbar.retrieve()),
                    xhat: Secret::init_with(|| xhat.retrieve()),
                }
            })
            .collect::<Vec<_>>();

        let authority = Self {
            group,
            g: Secret::init_with(|| g.retrieve()),
            factors: factors.into_iter().map(|factor| Secret::init_with(|| factor)).collect(),
            a: Secret::init_with(|| a.retrieve()),
            b,
            clients: client_keys,
            revoked: BTreeSet::new(),
        };

        let server_key = authority.server_key()?;
        for client in &authority.clients {
            self_test_round::<P, Mv>(rng, &server_key, client)?;
        }
        tracing::debug!("Generated a {}-bit MV group for {clients} clients", P::MODULUS_BITS);

        Ok(authority)
    }

    /// The group parameters.
    pub fn group(&self) -> &MvGroup<P> {
        &self.group
    }

    /// The number of client keys issued.
    pub fn clients(&self) -> usize {
        self.clients.len()
    }

    /// The key of client `index`, counted from 0.
    pub fn client_key(&self, index: usize) -> Option<&MvClientKey<P>> {
        self.clients.get(index)
    }

    /// Whether client `index` has been revoked.
    pub fn is_revoked(&self, index: usize) -> bool {
        self.revoked.contains(&index)
    }

    /// Issues the server key for the current set of unrevoked clients.
    ///
    /// Fails if any unrevoked client could not decrypt with the new key.
    pub fn server_key(&self) -> Result<MvServerKey<P>, GenerationError> {
        let p = &self.group.p;
        let clients = self.clients.len();

        let factors = self
            .factors
            .iter()
            .map(|factor| *factor.expose_secret())
            .collect::<Vec<_>>();
        let active = without(&factors, |i| i >= clients || self.revoked.contains(&i));
        let s = Secret::try_init_with(|| {
            primes::product::<P>(&active)
                .ok_or(GenerationError::invalid(SchemeKind::Mv, "s does not fit the integer type"))
        })?;

        let e = s.pow_of(&p.residue(self.a.expose_secret()));
        let gbar = s.pow_of(&p.residue(self.g.expose_secret()));
        let ghat = self.b.pow_of(&gbar);

        for client in self.clients.iter().filter(|client| !self.is_revoked(client.index)) {
            let check = e * client.xhat.pow_of(&gbar) * client.xbar.pow_of(&ghat);
            if !p.is_one(&check) {
                return Err(GenerationError::self_test(
                    SchemeKind::Mv,
                    "E gbar^xhat ghat^xbar = 1 (mod p)",
                ));
            }
        }

        Ok(MvServerKey {
            group: self.group.clone(),
            e: Secret::init_with(|| e.retrieve()),
            gbar: gbar.retrieve().into(),
            ghat: ghat.retrieve().into(),
        })
    }

    /// Removes client `index`'s factor and reissues the server key.
    ///
    /// Revoking an already revoked client only reissues the key.
    pub fn revoke(&mut self, index: usize) -> Result<MvServerKey<P>, GenerationError> {
        if index >= self.clients.len() {
            return Err(GenerationError::UnknownClient(index));
        }
        if self.revoked.insert(index) {
            tracing::info!("Revoked MV client {index}");
        }
        self.server_key()
    }
}

impl<P: GroupParams> MvServerKey<P> {
    /// The group parameters.
    pub fn group(&self) -> &MvGroup<P> {
        &self.group
    }
}

impl<P: GroupParams> MvClientKey<P> {
    /// The client index, counted from 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The group parameters.
    pub fn group(&self) -> &MvGroup<P> {
        &self.group
    }
}

/// Alice's nonce $r$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MvChallenge<P: GroupParams> {
    r: PublicUint<P::Uint>,
}

/// Bob's reply: the blinded nonce $y$ and $(\bar{g}^k, \hat{g}^k)$.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MvResponse<P: GroupParams> {
    y: PublicUint<P::Uint>,
    gbar_k: PublicUint<P::Uint>,
    ghat_k: PublicUint<P::Uint>,
}

impl<P: GroupParams> IdentityScheme<P> for Mv {
    const KIND: SchemeKind = SchemeKind::Mv;
    type ProverKey = MvServerKey<P>;
    type VerifierKey = MvClientKey<P>;
    type Challenge = MvChallenge<P>;
    type Response = MvResponse<P>;

    fn challenge(rng: &mut impl CryptoRngCore, key: &Self::VerifierKey) -> Self::Challenge {
        MvChallenge {
            r: key.group.p.random_nonzero_residue(rng).into(),
        }
    }

    fn respond(
        rng: &mut impl CryptoRngCore,
        key: &Self::ProverKey,
        challenge: &Self::Challenge,
    ) -> Option<Self::Response> {
        let MvGroup { p, q } = &key.group;
        let r = challenge.r.checked_below(p.value()).filter(|r| **r != P::Uint::from(0u64))?;

        let k = Secret::init_with(|| q.random_nonzero_residue(rng));
        let y = p.residue(r) * k.pow_of(&p.residue(key.e.expose_secret()));
        let gbar_k = k.pow_of(&p.residue(&key.gbar));
        let ghat_k = k.pow_of(&p.residue(&key.ghat));

        Some(MvResponse {
            y: y.retrieve().into(),
            gbar_k: gbar_k.retrieve().into(),
            ghat_k: ghat_k.retrieve().into(),
        })
    }

    fn verify(key: &Self::VerifierKey, challenge: &Self::Challenge, response: &Self::Response) -> bool {
        let p = &key.group.p;
        let one = P::Uint::from(1u64);
        let zero = P::Uint::from(0u64);

        // Trivial blinding values would let anyone echo the nonce back.
        let usable = |x: &PublicUint<P::Uint>| x.checked_below(p.value()).filter(|x| **x > one).is_some();
        if !(usable(&response.gbar_k) && usable(&response.ghat_k))
            || response.y.checked_below(p.value()).filter(|y| **y != zero).is_none()
        {
            tracing::trace!("MV response out of range");
            return false;
        }

        let recovered = p.residue(&response.y)
            * key.xhat.pow_of(&p.residue(&response.gbar_k))
            * key.xbar.pow_of(&p.residue(&response.ghat_k));
        recovered.retrieve() == *challenge.r
    }
}

#[cfg(test)]
mod tests {
    use crypto_primes::RandomPrimeWithRng;
    use rand_core::OsRng;

    use super::{Mv, MvAuthority, MvClientKey, MvResponse, MvServerKey};
    use crate::{
        identity::{primes, GenerationError, IdentityScheme, SchemeKind},
        params::{GroupParams, TestParams},
        uint::PublicUint,
    };

    type Uint = <TestParams as GroupParams>::Uint;

    fn identifies(server: &MvServerKey<TestParams>, client: &MvClientKey<TestParams>) -> bool {
        let challenge = Mv::challenge(&mut OsRng, client);
        let response = Mv::respond(&mut OsRng, server, &challenge).unwrap();
        Mv::verify(client, &challenge, &response)
    }

    // $E \bar{g}^{\hat{x}_j} \hat{g}^{\bar{x}_j}$, which is 1 if the client can decrypt.
    fn decryption_product(server: &MvServerKey<TestParams>, client: &MvClientKey<TestParams>) -> Uint {
        let p = &server.group.p;
        let product = p.residue(server.e.expose_secret())
            * client.xhat.pow_of(&p.residue(&server.gbar))
            * client.xbar.pow_of(&p.residue(&server.ghat));
        product.retrieve()
    }

    #[test_log::test]
    fn group_structure() {
        let authority = MvAuthority::<TestParams>::generate(&mut OsRng, 3).unwrap();
        let group = authority.group();

        assert_eq!(authority.factors.len(), 4);
        let factors = authority
            .factors
            .iter()
            .map(|factor| *factor.expose_secret())
            .collect::<Vec<_>>();
        assert_eq!(primes::product::<TestParams>(&factors).unwrap(), *group.q.value());

        let q = *group.q.value();
        assert_eq!(q.wrapping_add(&q).wrapping_add(&Uint::ONE), *group.p.value());
        assert!(group.p.value().is_prime_with_rng(&mut OsRng));

        let g = group.p.residue(authority.g.expose_secret());
        assert!(group.p.is_one(&g.pow(group.q.value())));
    }

    #[test_log::test]
    fn all_clients_identify_the_server() {
        let authority = MvAuthority::<TestParams>::generate(&mut OsRng, 3).unwrap();
        let server = authority.server_key().unwrap();
        for index in 0..authority.clients() {
            let client = authority.client_key(index).unwrap();
            assert_eq!(client.index(), index);
            assert_eq!(decryption_product(&server, client), Uint::ONE);
            assert!(identifies(&server, client));
        }
    }

    #[test_log::test]
    fn revocation_affects_only_the_revoked_client() {
        let mut authority = MvAuthority::<TestParams>::generate(&mut OsRng, 3).unwrap();
        let server = authority.revoke(1).unwrap();
        assert!(authority.is_revoked(1));

        let revoked = authority.client_key(1).unwrap();
        assert_ne!(decryption_product(&server, revoked), Uint::ONE);
        assert!(!identifies(&server, revoked));

        for index in [0, 2] {
            let client = authority.client_key(index).unwrap();
            assert_eq!(decryption_product(&server, client), Uint::ONE);
            assert!(identifies(&server, client));
        }

        // Revoking again changes nothing.
        let server = authority.revoke(1).unwrap();
        assert!(!identifies(&server, authority.client_key(1).unwrap()));
        assert!(identifies(&server, authority.client_key(0).unwrap()));
    }

    #[test_log::test]
    fn revoking_an_unknown_client() {
        let mut authority = MvAuthority::<TestParams>::generate(&mut OsRng, 2).unwrap();
        assert_eq!(authority.revoke(2).unwrap_err(), GenerationError::UnknownClient(2));
    }

    #[test]
    fn client_count_limits() {
        let err = MvAuthority::<TestParams>::generate(&mut OsRng, 0).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidParameters { scheme: SchemeKind::Mv, .. }));

        // 256-bit modulus, at least 32 bits per factor.
        let err = MvAuthority::<TestParams>::generate(&mut OsRng, 8).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidParameters { scheme: SchemeKind::Mv, .. }));
    }

    #[test_log::test]
    fn echoed_nonce_is_rejected() {
        let authority = MvAuthority::<TestParams>::generate(&mut OsRng, 2).unwrap();
        let client = authority.client_key(0).unwrap();

        let challenge = Mv::challenge(&mut OsRng, client);
        let forged = MvResponse {
            y: challenge.r,
            gbar_k: PublicUint::new(Uint::ONE),
            ghat_k: PublicUint::new(Uint::ONE),
        };
        assert!(!Mv::verify(client, &challenge, &forged));
    }
}
