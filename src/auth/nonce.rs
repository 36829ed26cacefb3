//! Monotonic nonce sequencer

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Strictly increasing nonce source.
///
/// Seeded from the clock so that nonces keep increasing across process
/// restarts, then incremented once per issuance. Share one instance (behind an
/// `Arc`) between clients that sign with the same API key.
#[derive(Debug)]
pub struct NonceSequencer {
    last: AtomicU64,
}

impl NonceSequencer {
    /// Seed with the current time in milliseconds
    pub fn from_clock() -> Self {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        Self::starting_at(now_ms)
    }

    /// The first issued nonce is `seed + 1`
    pub fn starting_at(seed: u64) -> Self {
        Self {
            last: AtomicU64::new(seed),
        }
    }

    /// Issue the next nonce
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Last issued nonce (or the seed)
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

impl Default for NonceSequencer {
    fn default() -> Self {
        Self::from_clock()
    }
}
