mod dev;
mod ntp;
mod traits;

pub use dev::TestParams;
pub use ntp::{Ntp1024, Ntp512};
pub use traits::GroupParams;

pub(crate) use traits::chain_group_params;
