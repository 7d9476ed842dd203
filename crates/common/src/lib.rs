//! Shared types for the goliath workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
