//! Shared types for drover
//!
//! This crate defines the types every drover process agrees on:
//! - Control messages (master -> worker)
//! - Worker exit status
//! - The lifecycle event log handed in by the embedding application

mod log;
mod messages;
mod status;

pub use log::*;
pub use messages::*;
pub use status::*;
