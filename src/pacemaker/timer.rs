/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::time::{Duration, Instant};

/// Tracks the time since a replica last made progress in its current view.
pub(crate) struct ViewTimer {
    timeout: Duration,
    last_update: Instant,
}

impl ViewTimer {
    /// Start a timer whose last update is now.
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_update: Instant::now(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_update = Instant::now();
    }

    /// Whether more than `timeout` has elapsed since the last update.
    pub(crate) fn is_stale(&self) -> bool {
        self.last_update.elapsed() > self.timeout
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}
