#![deny(warnings)]
pub mod belief;
pub mod distribution;
pub mod model;
pub mod problems;

pub use belief::{Belief, BeliefError, BeliefMetrics};
pub use distribution::{Distribution, DistributionError, DistributionKind};
pub use model::{ModelError, Pomdp, QuickPomdp, QuickPomdpBuilder, validate};

pub struct KernelInfo;

impl KernelInfo {
    pub const fn name() -> &'static str {
        "pomdp-kit"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
