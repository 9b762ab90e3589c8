//! Parameters intended for testing, scaled down to small integer sizes.

use crypto_bigint::{modular::MontyForm, nlimbs, Uint};
use serde::{Deserialize, Serialize};
use sha3::Shake256;

use super::traits::GroupParams;

/// Group parameters **for testing purposes only**.
/// Security is weakened to allow for faster execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub struct TestParams;

impl GroupParams for TestParams {
    const MODULUS_BITS: u32 = 256;
    const SUBGROUP_BITS: u32 = 64;
    const MIN_FACTOR_BITS: u32 = 32;
    const SECURITY_BITS: usize = 16;
    type Digest = Shake256;
    type Uint = Uint<{ nlimbs!(256) }>;
    type UintMod = MontyForm<{ nlimbs!(256) }>;
}

static_assertions::const_assert!(TestParams::SELF_CONSISTENT);
