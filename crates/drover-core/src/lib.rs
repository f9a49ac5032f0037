//! Core of drover
//!
//! This crate is the heart of drover, containing:
//! - The per-process shutdown coordinator (Running -> ShuttingDown -> Terminated)
//! - The worker pool supervisor: sizing, spawning, exit handling, respawn
//! - Respawn backoff with jitter
//! - The signal bridge that turns OS signals into a shutdown
//!
//! Platform code lives behind the [`WorkerSpawner`] and [`SignalSource`] traits.

mod backoff;
mod bridge;
mod exit;
mod mock;
mod pool;
mod shutdown;
mod signal;
mod spawner;

pub use backoff::*;
pub use bridge::*;
pub use exit::*;
pub use mock::*;
pub use pool::*;
pub use shutdown::*;
pub use signal::*;
pub use spawner::*;
