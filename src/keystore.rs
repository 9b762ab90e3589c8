//! Key files: the `ntpkey_<type>_<name>.<filestamp>` naming convention and an opaque store.

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};
use core::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Serialize};

use crate::tools::encoding::{deserialize_value, serialize_value};

/// Seconds between the NTP era 0 epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const PREFIX: &str = "ntpkey_";

/// Errors from key file naming and storage.
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// invalid key file name `{0}`
    InvalidName(String),
    /// no `{key_type}` key file for `{name}`
    NotFound {
        /// The requested type.
        key_type: KeyType,
        /// The requested host or group name.
        name: String,
    },
    /// key file `{file}` could not be encoded or decoded: {reason}
    Encoding {
        /// The offending file.
        file: String,
        /// What went wrong.
        reason: String,
    },
    /// key store I/O error: {0}
    Io(String),
}

impl core::error::Error for KeyStoreError {}

/// NTP seconds at key generation, truncated to 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Filestamp(pub u32);

impl Filestamp {
    /// Converts Unix seconds to NTP era seconds, wrapping at the era boundary.
    pub fn from_unix_seconds(seconds: u64) -> Self {
        Self(seconds.wrapping_add(NTP_UNIX_OFFSET) as u32)
    }

    /// The filestamp for the current system time.
    #[cfg(feature = "std")]
    pub fn now() -> Self {
        let seconds = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Self::from_unix_seconds(seconds)
    }
}

impl fmt::Display for Filestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of key material a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyType {
    /// IFF client parameters (no group key).
    IffKey,
    /// IFF server parameters (with the group key).
    IffPar,
    /// GQ group parameters for clients.
    GqKey,
    /// GQ server key.
    GqPar,
    /// MV server key.
    MvPar,
    /// MV key generator state, kept by the trusted authority for later revocations.
    MvAuth,
    /// MV client key number `j`, counted from 1.
    MvKey(u32),
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IffKey => f.write_str("iffkey"),
            Self::IffPar => f.write_str("iffpar"),
            Self::GqKey => f.write_str("gqkey"),
            Self::GqPar => f.write_str("gqpar"),
            Self::MvPar => f.write_str("mvpar"),
            Self::MvAuth => f.write_str("mvauth"),
            Self::MvKey(j) => write!(f, "mvkey{j}"),
        }
    }
}

impl FromStr for KeyType {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key_type = match s {
            "iffkey" => Self::IffKey,
            "iffpar" => Self::IffPar,
            "gqkey" => Self::GqKey,
            "gqpar" => Self::GqPar,
            "mvpar" => Self::MvPar,
            "mvauth" => Self::MvAuth,
            _ => {
                let j = s
                    .strip_prefix("mvkey")
                    .filter(|j| !j.is_empty() && j.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|j| j.parse::<u32>().ok())
                    .filter(|j| *j > 0)
                    .ok_or_else(|| KeyStoreError::InvalidName(s.into()))?;
                Self::MvKey(j)
            }
        };
        Ok(key_type)
    }
}

/// A key file name, `ntpkey_<type>_<name>.<filestamp>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyFileName {
    key_type: KeyType,
    name: String,
    filestamp: Filestamp,
}

impl KeyFileName {
    /// Returns `None` if `name` is empty or contains a path separator.
    pub fn new(key_type: KeyType, name: &str, filestamp: Filestamp) -> Option<Self> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return None;
        }
        Some(Self {
            key_type,
            name: name.into(),
            filestamp,
        })
    }

    /// The key type.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// The host or group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The filestamp suffix.
    pub fn filestamp(&self) -> Filestamp {
        self.filestamp
    }
}

impl fmt::Display for KeyFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}_{}.{}", self.key_type, self.name, self.filestamp)
    }
}

impl FromStr for KeyFileName {
    type Err = KeyStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyStoreError::InvalidName(s.into());

        let rest = s.strip_prefix(PREFIX).ok_or_else(invalid)?;
        let (rest, stamp) = rest.rsplit_once('.').ok_or_else(invalid)?;
        if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let filestamp = Filestamp(stamp.parse().map_err(|_| invalid())?);
        let (key_type, name) = rest.split_once('_').ok_or_else(invalid)?;
        let key_type = key_type.parse().map_err(|_| invalid())?;

        Self::new(key_type, name, filestamp).ok_or_else(invalid)
    }
}

/// An opaque store of key file payloads.
pub trait KeyStore {
    /// Stores a payload under the given name, replacing any previous one.
    fn store(&mut self, file: &KeyFileName, payload: &[u8]) -> Result<(), KeyStoreError>;

    /// Returns the payload stored under the given name.
    fn load(&self, file: &KeyFileName) -> Result<Vec<u8>, KeyStoreError>;

    /// Lists the names of all the key files present.
    fn list(&self) -> Result<Vec<KeyFileName>, KeyStoreError>;

    /// Resolves the most recent file of the given type and name.
    fn latest(&self, key_type: KeyType, name: &str) -> Result<KeyFileName, KeyStoreError> {
        self.list()?
            .into_iter()
            .filter(|file| file.key_type == key_type && file.name == name)
            .max_by_key(|file| file.filestamp)
            .ok_or_else(|| KeyStoreError::NotFound {
                key_type,
                name: name.into(),
            })
    }
}

/// Serializes `value` and stores it under `file`.
pub fn store_value<S: KeyStore + ?Sized>(
    store: &mut S,
    file: &KeyFileName,
    value: &impl Serialize,
) -> Result<(), KeyStoreError> {
    let payload = serialize_value(value).map_err(|reason| KeyStoreError::Encoding {
        file: file.to_string(),
        reason,
    })?;
    store.store(file, &payload)?;
    tracing::debug!("Stored key file {file}");
    Ok(())
}

/// Loads and deserializes the value stored under `file`.
pub fn load_value<T: DeserializeOwned, S: KeyStore + ?Sized>(store: &S, file: &KeyFileName) -> Result<T, KeyStoreError> {
    let payload = store.load(file)?;
    deserialize_value(&payload).map_err(|reason| KeyStoreError::Encoding {
        file: file.to_string(),
        reason,
    })
}

/// Loads the most recent value of the given type and name.
pub fn load_latest<T: DeserializeOwned, S: KeyStore + ?Sized>(
    store: &S,
    key_type: KeyType,
    name: &str,
) -> Result<(KeyFileName, T), KeyStoreError> {
    let file = store.latest(key_type, name)?;
    let value = load_value(store, &file)?;
    Ok((file, value))
}

/// A key store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    files: BTreeMap<KeyFileName, Vec<u8>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn store(&mut self, file: &KeyFileName, payload: &[u8]) -> Result<(), KeyStoreError> {
        self.files.insert(file.clone(), payload.to_vec());
        Ok(())
    }

    fn load(&self, file: &KeyFileName) -> Result<Vec<u8>, KeyStoreError> {
        self.files.get(file).cloned().ok_or_else(|| KeyStoreError::NotFound {
            key_type: file.key_type,
            name: file.name.clone(),
        })
    }

    fn list(&self) -> Result<Vec<KeyFileName>, KeyStoreError> {
        Ok(self.files.keys().cloned().collect())
    }
}

/// A key store backed by a directory, one file per key.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct DirKeyStore {
    root: std::path::PathBuf,
}

#[cfg(feature = "std")]
impl DirKeyStore {
    /// Uses an existing directory.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, file: &KeyFileName) -> std::path::PathBuf {
        self.root.join(file.to_string())
    }
}

#[cfg(feature = "std")]
fn io_error(err: std::io::Error) -> KeyStoreError {
    KeyStoreError::Io(err.to_string())
}

#[cfg(feature = "std")]
impl KeyStore for DirKeyStore {
    fn store(&mut self, file: &KeyFileName, payload: &[u8]) -> Result<(), KeyStoreError> {
        std::fs::write(self.path(file), payload).map_err(io_error)
    }

    fn load(&self, file: &KeyFileName) -> Result<Vec<u8>, KeyStoreError> {
        match std::fs::read(self.path(file)) {
            Ok(payload) => Ok(payload),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(KeyStoreError::NotFound {
                key_type: file.key_type,
                name: file.name.clone(),
            }),
            Err(err) => Err(io_error(err)),
        }
    }

    fn list(&self) -> Result<Vec<KeyFileName>, KeyStoreError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            // Anything not following the naming convention is not ours.
            if let Some(file) = entry.file_name().to_str().and_then(|name| name.parse().ok()) {
                files.push(file);
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{
        load_latest, load_value, store_value, Filestamp, KeyFileName, KeyStore, KeyStoreError, KeyType,
        MemoryKeyStore,
    };
    use crate::{
        identity::{IffProverKey, IffVerifierKey},
        params::TestParams,
    };

    #[test]
    fn file_names() {
        let file = KeyFileName::new(KeyType::MvKey(3), "ntp.example.com", Filestamp(3_900_000_000)).unwrap();
        assert_eq!(file.to_string(), "ntpkey_mvkey3_ntp.example.com.3900000000");
        assert_eq!(file.to_string().parse::<KeyFileName>().unwrap(), file);

        for key_type in [
            KeyType::IffKey,
            KeyType::IffPar,
            KeyType::GqKey,
            KeyType::GqPar,
            KeyType::MvPar,
            KeyType::MvAuth,
        ] {
            let file = KeyFileName::new(key_type, "alice", Filestamp(1)).unwrap();
            assert_eq!(file.to_string().parse::<KeyFileName>().unwrap(), file);
        }
    }

    #[test]
    fn malformed_file_names() {
        for name in [
            "ntpkey_iffkey_alice",
            "ntpkey_iffkey_alice.",
            "ntpkey_iffkey_alice.12a",
            "ntpkey_iffkey_.12",
            "ntpkey_mvkey_alice.12",
            "ntpkey_mvkey0_alice.12",
            "ntpkey_rsakey_alice.12",
            "ntpkey_iffkey_alice.99999999999",
            "ntp_iffkey_alice.12",
            "ntpkey_iffkeyalice.12",
        ] {
            assert_eq!(
                name.parse::<KeyFileName>(),
                Err(KeyStoreError::InvalidName(name.into())),
                "{name}"
            );
        }
        assert!(KeyFileName::new(KeyType::IffKey, "../etc", Filestamp(1)).is_none());
    }

    #[test]
    fn filestamps_count_from_1900() {
        assert_eq!(Filestamp::from_unix_seconds(0), Filestamp(2_208_988_800));
        // 2036-02-07, the end of NTP era 0
        assert_eq!(Filestamp::from_unix_seconds(2_085_978_496), Filestamp(0));
    }

    #[test]
    fn latest_resolves_the_newest_file() {
        let mut store = MemoryKeyStore::new();
        for (stamp, payload) in [(100, 1u8), (300, 3), (200, 2)] {
            let file = KeyFileName::new(KeyType::GqKey, "group", Filestamp(stamp)).unwrap();
            store.store(&file, &[payload]).unwrap();
        }
        let other = KeyFileName::new(KeyType::GqKey, "other", Filestamp(400)).unwrap();
        store.store(&other, &[4]).unwrap();

        let latest = store.latest(KeyType::GqKey, "group").unwrap();
        assert_eq!(latest.filestamp(), Filestamp(300));
        assert_eq!(store.load(&latest).unwrap(), [3]);

        assert_eq!(
            store.latest(KeyType::GqPar, "group"),
            Err(KeyStoreError::NotFound {
                key_type: KeyType::GqPar,
                name: "group".into()
            })
        );
    }

    #[test_log::test]
    fn stores_keys() {
        let prover = IffProverKey::<TestParams>::generate(&mut OsRng).unwrap();
        let mut store = MemoryKeyStore::new();
        let file = KeyFileName::new(KeyType::IffKey, "group", Filestamp(1)).unwrap();
        store_value(&mut store, &file, &prover.verifier_key()).unwrap();

        let (latest, key) = load_latest::<IffVerifierKey<TestParams>, _>(&store, KeyType::IffKey, "group").unwrap();
        assert_eq!(latest, file);
        assert_eq!(key, prover.verifier_key());

        store.store(&file, &[1, 2, 3]).unwrap();
        assert!(matches!(
            load_value::<IffVerifierKey<TestParams>, _>(&store, &file),
            Err(KeyStoreError::Encoding { .. })
        ));
    }

    #[cfg(feature = "std")]
    #[test]
    fn directory_store() {
        use super::DirKeyStore;

        let root = std::env::temp_dir().join(format!("autokey-ident-test-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("README"), b"not a key").unwrap();

        let mut store = DirKeyStore::new(&root);
        let older = KeyFileName::new(KeyType::IffPar, "bob", Filestamp(10)).unwrap();
        let newer = KeyFileName::new(KeyType::IffPar, "bob", Filestamp(20)).unwrap();
        store.store(&older, b"old").unwrap();
        store.store(&newer, b"new").unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.latest(KeyType::IffPar, "bob").unwrap(), newer);
        assert_eq!(store.load(&newer).unwrap(), b"new");

        let missing = KeyFileName::new(KeyType::IffPar, "carol", Filestamp(10)).unwrap();
        assert!(matches!(store.load(&missing), Err(KeyStoreError::NotFound { .. })));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
