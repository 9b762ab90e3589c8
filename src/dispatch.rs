//! Routing of identity extension fields to the negotiated scheme.
//!
//! A host keeps its own keys in an [`IdentityContext`] and one [`Association`] per peer.
//! As a server it answers challenges with [`IdentityContext::respond`]; as a client it
//! negotiates a scheme, sends a challenge and checks the signed response.

use alloc::vec::Vec;

use rand_core::CryptoRngCore;
use signature::{SignatureEncoding, Signer, Verifier};

use crate::{
    exchange::{Exchange, ExchangeError, ExchangeState, Verdict},
    extension::{ExtensionField, Opcode},
    identity::{
        Gq, GqChallenge, GqGroup, GqProverKey, GqVerifierKey, IdentityScheme, Iff, IffChallenge, IffProverKey,
        IffVerifierKey, Mv, MvChallenge, MvClientKey, MvServerKey, SchemeKind,
    },
    keystore::{load_latest, load_value, Filestamp, KeyStore, KeyStoreError, KeyType},
    params::GroupParams,
    tools::encoding::{deserialize_value, serialize_value},
};

/// The identity keys of the local host.
#[derive(Debug, Clone)]
pub struct IdentityContext<P: GroupParams> {
    iff_prover: Option<(IffProverKey<P>, Filestamp)>,
    iff_verifier: Option<IffVerifierKey<P>>,
    gq_prover: Option<(GqProverKey<P>, Filestamp)>,
    gq_group: Option<GqGroup<P>>,
    mv_server: Option<(MvServerKey<P>, Filestamp)>,
    mv_client: Option<MvClientKey<P>>,
}

fn optional<T>(result: Result<T, KeyStoreError>) -> Result<Option<T>, KeyStoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(KeyStoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

impl<P: GroupParams> IdentityContext<P> {
    /// A context without any keys; it can neither prove nor verify identity.
    pub fn new() -> Self {
        Self {
            iff_prover: None,
            iff_verifier: None,
            gq_prover: None,
            gq_group: None,
            mv_server: None,
            mv_client: None,
        }
    }

    /// Loads the latest key files of the trust group `name`, skipping the missing ones.
    ///
    /// Server keys also provide the matching client-side parameters.
    pub fn from_store(store: &(impl KeyStore + ?Sized), name: &str) -> Result<Self, KeyStoreError> {
        let mut context = Self::new();

        if let Some((file, key)) = optional(load_latest::<IffProverKey<P>, _>(store, KeyType::IffPar, name))? {
            context = context.with_iff_prover(key, file.filestamp());
        }
        if let Some((_, key)) = optional(load_latest::<IffVerifierKey<P>, _>(store, KeyType::IffKey, name))? {
            context = context.with_iff_verifier(key);
        }
        if let Some((file, key)) = optional(load_latest::<GqProverKey<P>, _>(store, KeyType::GqPar, name))? {
            context = context.with_gq_prover(key, file.filestamp());
        }
        if let Some((_, group)) = optional(load_latest::<GqGroup<P>, _>(store, KeyType::GqKey, name))? {
            context = context.with_gq_group(group);
        }
        if let Some((file, key)) = optional(load_latest::<MvServerKey<P>, _>(store, KeyType::MvPar, name))? {
            context = context.with_mv_server(key, file.filestamp());
        }

        let mv_client_file = store
            .list()?
            .into_iter()
            .filter(|file| matches!(file.key_type(), KeyType::MvKey(_)) && file.name() == name)
            .max_by_key(|file| file.filestamp());
        if let Some(file) = mv_client_file {
            context = context.with_mv_client(load_value(store, &file)?);
        }

        tracing::debug!("Loaded identity keys for {name}: offering {:?}", context.offered());
        Ok(context)
    }

    /// Adds an IFF server key; its verifier half is used unless an `iffkey` is given.
    pub fn with_iff_prover(self, key: IffProverKey<P>, filestamp: Filestamp) -> Self {
        let iff_verifier = self.iff_verifier.or_else(|| Some(key.verifier_key()));
        Self {
            iff_prover: Some((key, filestamp)),
            iff_verifier,
            ..self
        }
    }

    /// Adds the IFF client parameters.
    pub fn with_iff_verifier(self, key: IffVerifierKey<P>) -> Self {
        Self {
            iff_verifier: Some(key),
            ..self
        }
    }

    /// Adds a GQ server key; its group is used unless one is given.
    pub fn with_gq_prover(self, key: GqProverKey<P>, filestamp: Filestamp) -> Self {
        let gq_group = self.gq_group.or_else(|| Some(key.group().clone()));
        Self {
            gq_prover: Some((key, filestamp)),
            gq_group,
            ..self
        }
    }

    /// Adds the GQ group parameters needed to check GQ servers.
    pub fn with_gq_group(self, group: GqGroup<P>) -> Self {
        Self {
            gq_group: Some(group),
            ..self
        }
    }

    /// Adds an MV server key.
    pub fn with_mv_server(self, key: MvServerKey<P>, filestamp: Filestamp) -> Self {
        Self {
            mv_server: Some((key, filestamp)),
            ..self
        }
    }

    /// Adds an MV client key.
    pub fn with_mv_client(self, key: MvClientKey<P>) -> Self {
        Self {
            mv_client: Some(key),
            ..self
        }
    }

    /// The schemes this host can prove its identity with, in preference order.
    pub fn offered(&self) -> Vec<SchemeKind> {
        SchemeKind::PREFERENCE
            .into_iter()
            .filter(|scheme| match scheme {
                SchemeKind::Iff => self.iff_prover.is_some(),
                SchemeKind::Gq => self.gq_prover.is_some(),
                SchemeKind::Mv => self.mv_server.is_some(),
            })
            .collect()
    }

    /// The GQ public key to embed in this host's certificate, if it is a GQ server.
    pub fn gq_public_key_bytes(&self) -> Option<Vec<u8>> {
        self.gq_prover.as_ref().map(|(key, _)| key.public_key_bytes().into_vec())
    }

    /// Answers an identity request with a signed response.
    ///
    /// Requests for a scheme without a local server key get an error response.
    /// Responses and malformed challenges are dropped.
    pub fn respond<Sig: SignatureEncoding>(
        &self,
        rng: &mut impl CryptoRngCore,
        request: &ExtensionField,
        tstamp: u32,
        signer: &impl Signer<Sig>,
    ) -> Option<ExtensionField> {
        if request.response {
            tracing::trace!("Identity response passed to the responder, dropped");
            return None;
        }

        let outcome = match request.opcode.scheme() {
            SchemeKind::Iff => self
                .iff_prover
                .as_ref()
                .map(|(key, filestamp)| Some((answer::<P, Iff>(rng, key, &request.value)?, *filestamp))),
            SchemeKind::Gq => self
                .gq_prover
                .as_ref()
                .map(|(key, filestamp)| Some((answer::<P, Gq>(rng, key, &request.value)?, *filestamp))),
            SchemeKind::Mv => self
                .mv_server
                .as_ref()
                .map(|(key, filestamp)| Some((answer::<P, Mv>(rng, key, &request.value)?, *filestamp))),
        };

        let mut field = ExtensionField::request(request.opcode, request.associd, Vec::new());
        field.response = true;
        field.tstamp = tstamp;
        match outcome {
            Some(Some((value, filestamp))) => {
                field.value = value;
                field.fstamp = filestamp.0;
            }
            Some(None) => return None,
            None => {
                tracing::debug!("No {} server key, sending an error response", request.opcode);
                field.error = true;
            }
        }

        let signature = match signer.try_sign(&field.signed_bytes()) {
            Ok(signature) => signature,
            Err(err) => {
                tracing::warn!("Failed to sign the identity response: {err}");
                return None;
            }
        };
        field.signature = signature.to_bytes().as_ref().to_vec();
        Some(field)
    }
}

impl<P: GroupParams> Default for IdentityContext<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn answer<P: GroupParams, S: IdentityScheme<P>>(
    rng: &mut impl CryptoRngCore,
    key: &S::ProverKey,
    value: &[u8],
) -> Option<Vec<u8>> {
    let challenge = match deserialize_value::<S::Challenge>(value) {
        Ok(challenge) => challenge,
        Err(err) => {
            tracing::trace!("Malformed {} challenge dropped: {err}", S::KIND);
            return None;
        }
    };
    let Some(response) = S::respond(rng, key, &challenge) else {
        tracing::trace!("Out of range {} challenge dropped", S::KIND);
        return None;
    };
    serialize_value(&response).ok()
}

fn check<P: GroupParams, S: IdentityScheme<P>>(
    key: &S::VerifierKey,
    challenge: &S::Challenge,
    value: &[u8],
) -> Option<bool> {
    match deserialize_value::<S::Response>(value) {
        Ok(response) => Some(S::verify(key, challenge, &response)),
        Err(err) => {
            tracing::trace!("Malformed {} response dropped: {err}", S::KIND);
            None
        }
    }
}

#[derive(Debug, Clone)]
enum PendingChallenge<P: GroupParams> {
    Iff(IffChallenge<P>),
    Gq(GqChallenge<P>),
    Mv(MvChallenge<P>),
}

impl<P: GroupParams> PendingChallenge<P> {
    fn scheme(&self) -> SchemeKind {
        match self {
            Self::Iff(_) => SchemeKind::Iff,
            Self::Gq(_) => SchemeKind::Gq,
            Self::Mv(_) => SchemeKind::Mv,
        }
    }
}

/// The identity state of one peer, as seen by the client side.
#[derive(Debug)]
pub struct Association<P: GroupParams> {
    associd: u32,
    scheme: Option<SchemeKind>,
    certificate_trusted: bool,
    proventic: bool,
    gq_key: Option<GqVerifierKey<P>>,
    exchange: Exchange<PendingChallenge<P>>,
}

impl<P: GroupParams> Association<P> {
    /// Creates an association with an untrusted peer and no negotiated scheme.
    pub fn new(associd: u32) -> Self {
        Self {
            associd,
            scheme: None,
            certificate_trusted: false,
            proventic: false,
            gq_key: None,
            exchange: Exchange::new(),
        }
    }

    /// The local association ID.
    pub fn associd(&self) -> u32 {
        self.associd
    }

    /// Records that the peer's certificate chain has been verified.
    ///
    /// `gq_public_key` is the GQ public key carried by the certificate, if any;
    /// it is only usable if the local context holds the GQ group parameters.
    pub fn certificate_trusted(&mut self, context: &IdentityContext<P>, gq_public_key: Option<&[u8]>) {
        self.certificate_trusted = true;
        self.gq_key = match (&context.gq_group, gq_public_key) {
            (Some(group), Some(bytes)) => {
                let key = GqVerifierKey::from_public_key_bytes(group.clone(), bytes);
                if key.is_none() {
                    tracing::debug!("Association {}: unusable GQ key in the certificate", self.associd);
                }
                key
            }
            _ => None,
        };
    }

    fn can_verify(&self, context: &IdentityContext<P>, scheme: SchemeKind) -> bool {
        match scheme {
            SchemeKind::Iff => context.iff_verifier.is_some(),
            SchemeKind::Gq => self.gq_key.is_some(),
            SchemeKind::Mv => context.mv_client.is_some(),
        }
    }

    /// Picks the most preferred scheme that the peer offers and the local keys can verify.
    pub fn negotiate(&mut self, context: &IdentityContext<P>, offered: &[SchemeKind]) -> Option<SchemeKind> {
        self.scheme = SchemeKind::PREFERENCE
            .into_iter()
            .find(|scheme| offered.contains(scheme) && self.can_verify(context, *scheme));
        match self.scheme {
            Some(scheme) => tracing::debug!("Association {}: using {scheme} identity", self.associd),
            None => tracing::debug!("Association {}: no common identity scheme", self.associd),
        }
        self.scheme
    }

    /// The negotiated scheme, if any.
    pub fn scheme(&self) -> Option<SchemeKind> {
        self.scheme
    }

    /// Rolls a nonce for the negotiated scheme and builds the request carrying it.
    ///
    /// A challenge still outstanding is replaced.
    pub fn challenge(
        &mut self,
        rng: &mut impl CryptoRngCore,
        context: &IdentityContext<P>,
    ) -> Result<ExtensionField, ExchangeError> {
        if let ExchangeState::Concluded(verdict) = self.exchange.state() {
            return Err(ExchangeError::Concluded(verdict));
        }
        let scheme = self.scheme.ok_or(ExchangeError::NoScheme)?;

        let (pending, value) = match scheme {
            SchemeKind::Iff => {
                let key = context.iff_verifier.as_ref().ok_or(ExchangeError::MissingKey)?;
                let challenge = <Iff as IdentityScheme<P>>::challenge(rng, key);
                let value = serialize_value(&challenge);
                (PendingChallenge::Iff(challenge), value)
            }
            SchemeKind::Gq => {
                let key = self.gq_key.as_ref().ok_or(ExchangeError::MissingKey)?;
                let challenge = <Gq as IdentityScheme<P>>::challenge(rng, key);
                let value = serialize_value(&challenge);
                (PendingChallenge::Gq(challenge), value)
            }
            SchemeKind::Mv => {
                let key = context.mv_client.as_ref().ok_or(ExchangeError::MissingKey)?;
                let challenge = <Mv as IdentityScheme<P>>::challenge(rng, key);
                let value = serialize_value(&challenge);
                (PendingChallenge::Mv(challenge), value)
            }
        };
        let value = value.expect("challenges are plain integers and always serialize");

        self.exchange.begin(pending)?;
        tracing::trace!("Association {}: {scheme} challenge sent", self.associd);
        Ok(ExtensionField::request(Opcode::from(scheme), self.associd, value))
    }

    /// Checks a signed identity response from the peer.
    ///
    /// Returns `None` if the response is dropped: unexpected, malformed or with a bad signature.
    pub fn receive_response<Sig: SignatureEncoding>(
        &mut self,
        context: &IdentityContext<P>,
        field: &ExtensionField,
        verifier: &impl Verifier<Sig>,
    ) -> Option<Verdict> {
        let associd = self.associd;
        let dropped = |reason: &str| {
            tracing::trace!("Association {associd}: identity response dropped ({reason})");
            None
        };

        let Some(pending) = self.exchange.outstanding() else {
            return dropped("no challenge outstanding");
        };
        if !field.response || pending.scheme() != field.opcode.scheme() {
            return dropped("not a response to the outstanding challenge");
        }
        if field.associd != associd {
            return dropped("association ID mismatch");
        }
        let Ok(signature) = Sig::try_from(field.signature.as_slice()) else {
            return dropped("malformed signature");
        };
        if verifier.verify(&field.signed_bytes(), &signature).is_err() {
            return dropped("bad signature");
        }
        if field.error {
            return dropped("error response");
        }

        let verified = match pending {
            PendingChallenge::Iff(challenge) => {
                check::<P, Iff>(context.iff_verifier.as_ref()?, challenge, &field.value)?
            }
            PendingChallenge::Gq(challenge) => check::<P, Gq>(self.gq_key.as_ref()?, challenge, &field.value)?,
            PendingChallenge::Mv(challenge) => {
                check::<P, Mv>(context.mv_client.as_ref()?, challenge, &field.value)?
            }
        };

        let verdict = self.exchange.conclude(|_| verified)?;
        match verdict {
            Verdict::Verified => {
                self.proventic = self.certificate_trusted;
                tracing::info!("Association {associd}: {} identity verified", field.opcode);
            }
            Verdict::Failed => {
                self.proventic = false;
                tracing::warn!("Association {associd}: {} identity check failed", field.opcode);
            }
        }
        Some(verdict)
    }

    /// Whether the peer has a trusted certificate and proved its identity.
    pub fn is_proventic(&self) -> bool {
        self.proventic
    }

    /// The state of the identity exchange.
    pub fn state(&self) -> ExchangeState {
        self.exchange.state()
    }

    /// Starts over for the next protocol cycle.
    ///
    /// The negotiated scheme and the certificate decision are kept; the proventic bit is not.
    pub fn reset(&mut self) {
        self.exchange.reset();
        self.proventic = false;
    }
}
