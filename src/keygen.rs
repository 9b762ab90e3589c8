//! Key generation runs producing the server and client key files of a trust group.

use alloc::string::String;

use rand_core::CryptoRngCore;

use crate::{
    identity::{GenerationError, GqGroup, GqProverKey, IffProverKey, MvAuthority, MvServerKey},
    keystore::{load_latest, store_value, Filestamp, KeyFileName, KeyStore, KeyStoreError, KeyType},
    params::GroupParams,
};

/// The number of MV client keys issued unless told otherwise.
pub const DEFAULT_MV_CLIENTS: usize = 4;

/// Errors from a key generation run.
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum KeygenError {
    /// {0}
    Generation(GenerationError),
    /// {0}
    KeyStore(KeyStoreError),
}

impl core::error::Error for KeygenError {}

impl From<GenerationError> for KeygenError {
    fn from(source: GenerationError) -> Self {
        Self::Generation(source)
    }
}

impl From<KeyStoreError> for KeygenError {
    fn from(source: KeyStoreError) -> Self {
        Self::KeyStore(source)
    }
}

/// Runtime knobs of a key generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeygenOptions {
    /// The trust group (or host) name that goes into the file names.
    pub name: String,
    /// The filestamp of the generated files.
    pub filestamp: Filestamp,
    /// How many MV client keys to issue.
    pub mv_clients: usize,
}

impl KeygenOptions {
    /// Options with the default number of MV clients.
    pub fn new(name: &str, filestamp: Filestamp) -> Self {
        Self {
            name: name.into(),
            filestamp,
            mv_clients: DEFAULT_MV_CLIENTS,
        }
    }

    /// Sets the number of MV client keys.
    pub fn with_mv_clients(self, mv_clients: usize) -> Self {
        Self { mv_clients, ..self }
    }

    fn file(&self, key_type: KeyType) -> Result<KeyFileName, KeyStoreError> {
        KeyFileName::new(key_type, &self.name, self.filestamp).ok_or_else(|| KeyStoreError::InvalidName(self.name.clone()))
    }
}

/// Generates IFF parameters and a group key.
///
/// Writes `iffpar` (for servers) and `iffkey` (for clients).
pub fn generate_iff<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    store: &mut (impl KeyStore + ?Sized),
    options: &KeygenOptions,
) -> Result<IffProverKey<P>, KeygenError> {
    let key = IffProverKey::<P>::generate(rng)?;
    store_value(store, &options.file(KeyType::IffPar)?, &key)?;
    store_value(store, &options.file(KeyType::IffKey)?, &key.verifier_key())?;
    tracing::info!("Generated IFF keys for {}", options.name);
    Ok(key)
}

/// Generates GQ group parameters and a first server key.
///
/// Writes `gqkey` (the group, for clients and further servers) and `gqpar` (the server key).
pub fn generate_gq<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    store: &mut (impl KeyStore + ?Sized),
    options: &KeygenOptions,
) -> Result<GqProverKey<P>, KeygenError> {
    let group = GqGroup::<P>::generate(rng)?;
    store_value(store, &options.file(KeyType::GqKey)?, &group)?;
    let key = GqProverKey::new(rng, group)?;
    store_value(store, &options.file(KeyType::GqPar)?, &key)?;
    tracing::info!("Generated GQ keys for {}", options.name);
    Ok(key)
}

/// Rolls a new server key for the latest stored GQ group, writing a new `gqpar`.
pub fn generate_gq_server_key<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    store: &mut (impl KeyStore + ?Sized),
    options: &KeygenOptions,
) -> Result<GqProverKey<P>, KeygenError> {
    let (file, group) = load_latest::<GqGroup<P>, _>(store, KeyType::GqKey, &options.name)?;
    tracing::debug!("Using GQ group from {file}");
    let key = GqProverKey::new(rng, group)?;
    store_value(store, &options.file(KeyType::GqPar)?, &key)?;
    Ok(key)
}

/// Generates MV parameters and `options.mv_clients` client keys.
///
/// Writes `mvpar` (the server key), `mvkey1` to `mvkey<n>` (the client keys)
/// and `mvauth` (the authority state that [`revoke_mv`] picks up later).
/// The `mvauth` file holds every group secret and stays with the trusted authority.
pub fn generate_mv<P: GroupParams>(
    rng: &mut impl CryptoRngCore,
    store: &mut (impl KeyStore + ?Sized),
    options: &KeygenOptions,
) -> Result<MvAuthority<P>, KeygenError> {
    let authority = MvAuthority::<P>::generate(rng, options.mv_clients)?;
    store_value(store, &options.file(KeyType::MvAuth)?, &authority)?;
    store_value(store, &options.file(KeyType::MvPar)?, &authority.server_key()?)?;
    for index in 0..authority.clients() {
        let client = authority.client_key(index).ok_or(GenerationError::UnknownClient(index))?;
        store_value(store, &options.file(mv_client_type(index))?, client)?;
    }
    tracing::info!("Generated MV keys for {} clients of {}", authority.clients(), options.name);
    Ok(authority)
}

/// Revokes MV client `index` (counted from 0) in the latest stored `mvauth`.
///
/// Writes the updated `mvauth` and the reissued `mvpar`.
/// Earlier revocations recorded in `mvauth` stay in effect.
pub fn revoke_mv<P: GroupParams>(
    store: &mut (impl KeyStore + ?Sized),
    options: &KeygenOptions,
    index: usize,
) -> Result<MvServerKey<P>, KeygenError> {
    let (file, mut authority) = load_latest::<MvAuthority<P>, _>(store, KeyType::MvAuth, &options.name)?;
    tracing::debug!("Using MV authority from {file}");
    let key = authority.revoke(index)?;
    store_value(store, &options.file(KeyType::MvAuth)?, &authority)?;
    store_value(store, &options.file(KeyType::MvPar)?, &key)?;
    Ok(key)
}

/// The key type of MV client `index`, counted from 0; the file names count from 1.
pub fn mv_client_type(index: usize) -> KeyType {
    KeyType::MvKey(u32::try_from(index + 1).unwrap_or(u32::MAX))
}
