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

//! The concurrency substrate: a lock-free MPMC queue, a persistent
//! work-stealing thread pool built on top of it, and the parallel
//! algorithms every higher-level component dispatches through.

pub mod global;
pub mod parallel;
pub mod pool;
pub mod queue;

#[cfg(feature = "rayon-backend")]
pub mod rayon_backend;

pub use global::GlobalPool;
pub use pool::{TaskFuture, ThreadPool};
pub use queue::MpmcQueue;
