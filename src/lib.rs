#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(
    clippy::mod_module_files,
    missing_docs,
    missing_copy_implementations,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::indexing_slicing))]

/*!
## Features

`std` (default): the directory-backed [`DirKeyStore`] and `std` support in `bincode` and `tracing`.
Without it the crate is `no_std` (with `alloc`).
*/

extern crate alloc;

mod dispatch;
mod exchange;
mod extension;
mod identity;
mod keygen;
mod keystore;
mod params;
mod tools;
mod uint;

// Re-exported to avoid the need for version-matching
pub use signature;

pub use dispatch::{Association, IdentityContext};
pub use exchange::{Exchange, ExchangeError, ExchangeState, Verdict};
pub use extension::{
    iter_extension_fields, ExtensionField, ExtensionFieldIter, Opcode, WireError, FLAG_ERROR, FLAG_RESPONSE, VERSION,
};
pub use identity::{
    GenerationError, Gq, GqChallenge, GqGroup, GqProverKey, GqResponse, GqVerifierKey, IdentityScheme, Iff,
    IffChallenge, IffGroup, IffProverKey, IffResponse, IffVerifierKey, Mv, MvAuthority, MvChallenge, MvClientKey,
    MvGroup, MvResponse, MvServerKey, SchemeKind,
};
pub use keygen::{
    generate_gq, generate_gq_server_key, generate_iff, generate_mv, mv_client_type, revoke_mv, KeygenError,
    KeygenOptions, DEFAULT_MV_CLIENTS,
};
pub use keystore::{
    load_latest, load_value, store_value, Filestamp, KeyFileName, KeyStore, KeyStoreError, KeyType, MemoryKeyStore,
    NTP_UNIX_OFFSET,
};
pub use params::{GroupParams, Ntp1024, Ntp512, TestParams};

#[cfg(feature = "std")]
pub use keystore::DirKeyStore;
