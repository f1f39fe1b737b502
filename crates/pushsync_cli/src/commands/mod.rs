//! CLI command implementations.

pub mod inspect;
pub mod receive;
pub mod sync;
