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

//! A process-wide thread pool singleton, for components that want to piggy
//! back on one shared pool rather than own theirs. Tests and benches
//! generally prefer a directly-constructed [`ThreadPool`] so they can
//! control its size and shutdown precisely.

use super::pool::ThreadPool;
use std::sync::OnceLock;

static INSTANCE: OnceLock<ThreadPool> = OnceLock::new();

/// Lazily-initialized, process-wide [`ThreadPool`] sized to the host's
/// hardware parallelism.
pub struct GlobalPool;

impl GlobalPool {
    pub fn instance() -> &'static ThreadPool {
        INSTANCE.get_or_init(ThreadPool::with_hardware_parallelism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_is_stable_across_calls() {
        let a = GlobalPool::instance() as *const ThreadPool;
        let b = GlobalPool::instance() as *const ThreadPool;
        assert_eq!(a, b);
    }

    #[test]
    fn instance_runs_tasks() {
        let pool = GlobalPool::instance();
        let f = pool.submit(|| 2 + 2).unwrap();
        assert_eq!(f.get().unwrap(), 4);
    }
}
