//! Shared utilities for drover
//!
//! This crate provides:
//! - Error types
//! - Worker identifiers
//! - The environment contract between a master and the workers it spawns

mod env;
mod error;
mod ids;

pub use env::*;
pub use error::*;
pub use ids::*;
