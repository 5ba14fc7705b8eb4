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

//! A fixed-size work-stealing thread pool.
//!
//! Each worker owns a `crossbeam_deque::Worker` local deque (push-back /
//! pop-back by the owner, steal-from-front by siblings), generalizing the
//! ad hoc fan-out pattern this crate's own scoped-thread helpers use into a
//! persistent pool with an adaptive spin/yield/sleep wait.
//!
//! `crossbeam_deque::Worker` is intentionally `!Sync`: only the thread that
//! owns it may push to it. A cross-thread `submit()` therefore cannot write
//! directly into a sibling worker's local deque — this is the same
//! constraint every crossbeam-deque-based pool (rayon included) works
//! around by routing external submissions through a shared queue instead.
//! We do the same: `submit()` called from *within* a running task (the
//! common case of an algorithm fanning out further work) pushes straight
//! onto the calling worker's own local deque; `submit()` called from any
//! other thread falls back to the shared overflow [`MpmcQueue`]. A
//! round-robin submission counter is still maintained and observable via
//! [`ThreadPool::next_worker_hint`], but since the shared queue is already a
//! fair structure all workers drain from, it is bookkeeping rather than a
//! hard routing key.

use crate::concurrent::queue::MpmcQueue;
use crate::error::{Error, ErrorKind, Result};
use crossbeam_deque::{Steal, Stealer, Worker as LocalDeque};
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

const SPIN_ITERS: u32 = 64;
const YIELD_ITERS: u32 = 64;
const MIN_BACKOFF: Duration = Duration::from_micros(1);
const MAX_BACKOFF: Duration = Duration::from_millis(1);

thread_local! {
    static LOCAL_DEQUE: RefCell<Option<LocalDeque<BoxedTask>>> = const { RefCell::new(None) };
}

struct PoolInner {
    stealers: Vec<Stealer<BoxedTask>>,
    overflow: MpmcQueue<BoxedTask>,
    stop: AtomicBool,
    next_worker: AtomicUsize,
}

impl PoolInner {
    /// Bounded spin, then bounded yield, then stealing from siblings,
    /// finally a check of the shared overflow queue, before the caller
    /// decides whether to sleep.
    fn find_task(&self, own_index: usize) -> Option<BoxedTask> {
        for _ in 0..SPIN_ITERS {
            if let Some(t) = Self::pop_local() {
                return Some(t);
            }
            std::hint::spin_loop();
        }
        for _ in 0..YIELD_ITERS {
            if let Some(t) = Self::pop_local() {
                return Some(t);
            }
            std::thread::yield_now();
        }
        let n = self.stealers.len();
        for offset in 1..=n {
            let j = (own_index + offset) % n;
            loop {
                match self.stealers[j].steal() {
                    Steal::Success(t) => return Some(t),
                    Steal::Retry => continue,
                    Steal::Empty => break,
                }
            }
        }
        self.overflow.try_dequeue()
    }

    fn pop_local() -> Option<BoxedTask> {
        LOCAL_DEQUE.with(|cell| cell.borrow().as_ref().and_then(|d| d.pop()))
    }

    fn is_on_worker() -> bool {
        LOCAL_DEQUE.with(|cell| cell.borrow().is_some())
    }

    fn push_local(task: BoxedTask) {
        LOCAL_DEQUE.with(|cell| cell.borrow().as_ref().unwrap().push(task));
    }

    /// Conservative emptiness check used only to decide whether a worker may
    /// stop spinning during shutdown; `submit()` refuses new work once
    /// `stop` is set, so this converges.
    fn looks_drained(&self, own_index: usize) -> bool {
        Self::pop_local().map(|t| self.push_back_after_peek(t)).is_none()
            && self.stealers.iter().enumerate().all(|(j, s)| {
                j == own_index || matches!(s.steal(), Steal::Empty)
            })
            && self.overflow.size_approx() == 0
    }

    fn push_back_after_peek(&self, task: BoxedTask) -> bool {
        Self::push_local(task);
        true
    }
}

/// A one-shot handle to a task's eventual result. Resolved with an error if
/// the task panicked (the pool catches it so one bad task cannot take a
/// worker down) or was dropped before running.
pub struct TaskFuture<R> {
    rx: crossbeam_channel::Receiver<std::thread::Result<R>>,
}

impl<R> TaskFuture<R> {
    /// Blocks until the task completes.
    pub fn get(self) -> Result<R> {
        match self.rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic_payload)) => Err(panic_error(panic_payload)),
            Err(_) => Err(ErrorKind::Channel("task was never executed".into()).into()),
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> Error {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    };
    ErrorKind::Channel(format!("task panicked: {}", msg)).into()
}

/// A fixed-size work-stealing thread pool. Construct with
/// [`ThreadPool::new`], or use [`super::global::GlobalPool`] for a
/// process-wide singleton.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl ThreadPool {
    /// Creates a pool with `worker_count` workers, floored at 1.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let locals: Vec<LocalDeque<BoxedTask>> =
            (0..worker_count).map(|_| LocalDeque::new_fifo()).collect();
        let stealers: Vec<Stealer<BoxedTask>> = locals.iter().map(|d| d.stealer()).collect();

        let inner = Arc::new(PoolInner {
            stealers,
            overflow: MpmcQueue::new(),
            stop: AtomicBool::new(false),
            next_worker: AtomicUsize::new(0),
        });

        let threads = locals
            .into_iter()
            .enumerate()
            .map(|(idx, local)| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("cloud-toolbox-worker-{}", idx))
                    .spawn(move || Self::worker_loop(idx, local, inner))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        ThreadPool {
            inner,
            threads: Mutex::new(threads),
            worker_count,
        }
    }

    /// A pool sized to the host's hardware parallelism, floored at 1.
    pub fn with_hardware_parallelism() -> Self {
        Self::new(num_cpus::get().max(1))
    }

    pub fn get_thread_count(&self) -> usize {
        self.worker_count
    }

    /// Submits `f` for execution, returning a [`TaskFuture`] for its result.
    /// Fails with `ShuttingDown` if the pool has been told to shut down.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskFuture<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.inner.stop.load(Ordering::Acquire) {
            return Err(ErrorKind::ShuttingDown.into());
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let task: BoxedTask = Box::new(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
            let _ = tx.send(result);
        });
        self.inner.next_worker.fetch_add(1, Ordering::Relaxed);
        if PoolInner::is_on_worker() {
            PoolInner::push_local(task);
        } else {
            self.inner.overflow.enqueue(task);
        }
        Ok(TaskFuture { rx })
    }

    /// Submits `f` purely for its side effect, discarding the result.
    pub fn submit_detached<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(f).map(|_| ())
    }

    /// The current value of the round-robin submission counter, exposed
    /// for observability/testing.
    pub fn next_worker_hint(&self) -> usize {
        self.inner.next_worker.load(Ordering::Relaxed) % self.worker_count.max(1)
    }

    /// Sets the stop flag and joins every worker after it has drained its
    /// queues. Idempotent: calling it twice is a no-op the second time.
    pub fn shutdown(&self) {
        self.inner.stop.store(true, Ordering::Release);
        let mut threads = self.threads.lock().expect("thread pool mutex poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    fn worker_loop(index: usize, local: LocalDeque<BoxedTask>, inner: Arc<PoolInner>) {
        LOCAL_DEQUE.with(|cell| *cell.borrow_mut() = Some(local));
        let mut backoff = MIN_BACKOFF;
        loop {
            let task = PoolInner::pop_local().or_else(|| inner.find_task(index));
            match task {
                Some(task) => {
                    backoff = MIN_BACKOFF;
                    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                        let err = panic_error(payload);
                        log::error!("worker {} task panicked: {}", index, err);
                    }
                }
                None => {
                    if inner.stop.load(Ordering::Acquire) && inner.looks_drained(index) {
                        break;
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        LOCAL_DEQUE.with(|cell| *cell.borrow_mut() = None);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4 workers, 10000 tasks each returning its own index, summed.
    #[test]
    fn thread_pool_sum() {
        let pool = ThreadPool::new(4);
        assert_eq!(pool.get_thread_count(), 4);
        let futures: Vec<_> = (0..10_000u64)
            .map(|i| pool.submit(move || i))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let sum: u64 = futures.into_iter().map(|f| f.get().unwrap()).sum();
        assert_eq!(sum, 49_995_000);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let pool = ThreadPool::new(2);
        pool.shutdown();
        let result = pool.submit(|| 1);
        assert!(result.is_err());
    }

    #[test]
    fn panicking_task_resolves_future_with_error_and_pool_survives() {
        let pool = ThreadPool::new(2);
        let panicking = pool.submit(|| -> i32 { panic!("boom") }).unwrap();
        assert!(panicking.get().is_err());
        // the pool must still be usable afterwards
        let ok = pool.submit(|| 7).unwrap();
        assert_eq!(ok.get().unwrap(), 7);
    }

    #[test]
    fn nested_submit_from_within_a_task_works() {
        let pool = Arc::new(ThreadPool::new(4));
        let inner_pool = Arc::clone(&pool);
        let outer = pool
            .submit(move || inner_pool.submit(|| 5).unwrap().get().unwrap())
            .unwrap();
        assert_eq!(outer.get().unwrap(), 5);
    }
}
