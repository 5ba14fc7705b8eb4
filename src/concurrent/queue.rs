// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An unbounded lock-free multi-producer/multi-consumer queue.
//!
//! Built on `crossbeam_deque::Injector`, a segmented-array primitive used
//! as the hand-off point between producers and a pool of stealing workers:
//! a proven library primitive rather than a hand-rolled hazard-pointer
//! scheme.

use crossbeam_deque::{Injector, Steal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Multi-producer / multi-consumer unbounded FIFO. Ordering contract:
/// per-producer FIFO, no ordering guarantee across producers, and no loss
/// or duplication of enqueued values.
pub struct MpmcQueue<T> {
    injector: Injector<T>,
    // Best-effort length tracking; `Injector` has no native length query.
    len_hint: AtomicUsize,
}

impl<T> Default for MpmcQueue<T> {
    fn default() -> Self {
        MpmcQueue {
            injector: Injector::new(),
            len_hint: AtomicUsize::new(0),
        }
    }
}

impl<T> MpmcQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `value` in. Never blocks, never fails.
    pub fn enqueue(&self, value: T) {
        self.injector.push(value);
        self.len_hint.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `Some(value)` if one was available, else `None`. Never
    /// blocks.
    pub fn try_dequeue(&self) -> Option<T> {
        loop {
            match self.injector.steal() {
                Steal::Success(value) => {
                    self.len_hint.fetch_sub(1, Ordering::Relaxed);
                    return Some(value);
                }
                Steal::Retry => continue,
                Steal::Empty => return None,
            }
        }
    }

    /// As [`Self::try_dequeue`], but may spin/yield/sleep up to `timeout`
    /// before giving up.
    pub fn try_dequeue_timed(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut spins = 0u32;
        loop {
            if let Some(v) = self.try_dequeue() {
                return Some(v);
            }
            if Instant::now() >= deadline {
                return None;
            }
            spins += 1;
            if spins < 64 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Best-effort size; may be stale. Only a scheduling hint.
    pub fn size_approx(&self) -> usize {
        self.len_hint.load(Ordering::Relaxed)
    }
}
