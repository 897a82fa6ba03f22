//! Sliding-window accounting for the remote API's rate limit.
//!
//! Google allows roughly one request per second; the bridge keeps a trailing
//! 60 second window of read, write, and exceeded (429) counts and derives an
//! exponential backoff that stretches the poll schedule while 429s remain in
//! the window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub const WINDOW_SECONDS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
    Exceeded,
}

/// Per-minute request totals, used by the variables export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateTotals {
    pub read: u64,
    pub write: u64,
    pub exceeded: u64,
}

#[derive(Debug)]
struct Windows {
    read: VecDeque<u64>,
    write: VecDeque<u64>,
    exceeded: VecDeque<u64>,
}

impl Windows {
    fn new() -> Self {
        let zeroed = || VecDeque::from(vec![0u64; WINDOW_SECONDS]);
        Self {
            read: zeroed(),
            write: zeroed(),
            exceeded: zeroed(),
        }
    }

    fn bucket_mut(&mut self, kind: RequestKind) -> &mut VecDeque<u64> {
        match kind {
            RequestKind::Read => &mut self.read,
            RequestKind::Write => &mut self.write,
            RequestKind::Exceeded => &mut self.exceeded,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<Windows>,
    backoff_ms: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(Windows::new()),
            backoff_ms: AtomicU64::new(0),
        }
    }

    /// Count a request against the newest one-second slot.
    pub fn record(&self, kind: RequestKind) {
        let mut windows = self.windows.lock().unwrap();
        if let Some(slot) = windows.bucket_mut(kind).back_mut() {
            *slot += 1;
        }
    }

    /// Age the window by one second: drop the oldest slot, append a zero.
    ///
    /// Driven by a one-second timer owned by the bridge; the window length is
    /// always exactly [`WINDOW_SECONDS`].
    pub fn rotate(&self) {
        let mut windows = self.windows.lock().unwrap();
        for kind in [RequestKind::Read, RequestKind::Write, RequestKind::Exceeded] {
            let bucket = windows.bucket_mut(kind);
            bucket.pop_front();
            bucket.push_back(0);
        }
    }

    pub fn totals(&self) -> RateTotals {
        let windows = self.windows.lock().unwrap();
        RateTotals {
            read: windows.read.iter().sum(),
            write: windows.write.iter().sum(),
            exceeded: windows.exceeded.iter().sum(),
        }
    }

    /// Recompute the backoff from the exceeded-count window and return it.
    ///
    /// With `k` rate-limit errors in the trailing minute the backoff is
    /// `2^k * 10` milliseconds; it falls back to zero once the errors age out.
    pub fn update_backoff(&self) -> u64 {
        let exceeded = self.totals().exceeded;
        let backoff = match exceeded {
            0 => 0,
            k => 2u64
                .saturating_pow(k.min(u32::MAX as u64) as u32)
                .saturating_mul(10),
        };
        self.backoff_ms.store(backoff, Ordering::Relaxed);
        backoff
    }

    /// Last computed backoff, without recomputing.
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms.load(Ordering::Relaxed)
    }
}
