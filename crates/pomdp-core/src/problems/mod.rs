//! Ready-made problem definitions.

pub mod tiger;

pub use tiger::{Side, TigerAction, TigerConfig, TigerPomdp, TigerState};
