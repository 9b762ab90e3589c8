//! Parameters matching the sizes `ntp-keygen` uses.

use crypto_bigint::{modular::MontyForm, nlimbs, Uint};
use serde::{Deserialize, Serialize};
use sha3::Shake256;

use super::traits::GroupParams;

/// The `ntp-keygen` defaults: a 512-bit modulus with a 160-bit IFF subgroup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Ntp512;

impl GroupParams for Ntp512 {
    const MODULUS_BITS: u32 = 512;
    const SUBGROUP_BITS: u32 = 160;
    const MIN_FACTOR_BITS: u32 = 32;
    const SECURITY_BITS: usize = 80;
    type Digest = Shake256;
    type Uint = Uint<{ nlimbs!(512) }>;
    type UintMod = MontyForm<{ nlimbs!(512) }>;
}

static_assertions::const_assert!(Ntp512::SELF_CONSISTENT);

/// The largest modulus `ntp-keygen` accepts, with a 256-bit IFF subgroup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Ntp1024;

impl GroupParams for Ntp1024 {
    const MODULUS_BITS: u32 = 1024;
    const SUBGROUP_BITS: u32 = 256;
    const MIN_FACTOR_BITS: u32 = 64;
    const SECURITY_BITS: usize = 128;
    type Digest = Shake256;
    type Uint = Uint<{ nlimbs!(1024) }>;
    type UintMod = MontyForm<{ nlimbs!(1024) }>;
}

static_assertions::const_assert!(Ntp1024::SELF_CONSISTENT);
