//! RateBridge Common Types
//!
//! This crate contains the value types shared across RateBridge: validated
//! currency codes and amounts, pivot-relative rates, and the closed error
//! taxonomy that the request-handling boundary maps to transport statuses.

pub mod monetary;
pub mod error;
pub mod time;

pub use monetary::*;
pub use error::*;
pub use time::*;
