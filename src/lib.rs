pub mod core;
pub mod learn;

pub use crate::core::shared;
