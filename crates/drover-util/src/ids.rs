//! Strongly-typed identifiers for drover

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sequential identifier the master assigns to each worker it spawns.
///
/// Unlike the OS process ID, a worker ID is never reused within one master's
/// lifetime, so log lines for a respawned worker are distinguishable from the
/// worker it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Hands out increasing [`WorkerId`]s, starting at 1
#[derive(Debug)]
pub struct WorkerIdAllocator {
    next: AtomicU64,
}

impl WorkerIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> WorkerId {
        WorkerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WorkerIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
