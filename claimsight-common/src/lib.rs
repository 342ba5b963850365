//! # Claimsight Common Library
//!
//! Shared code for Claimsight services including:
//! - Record and analysis wire types
//! - Event types (ClaimsightEvent enum) and EventBus
//! - Configuration resolution

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
