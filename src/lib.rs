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

//! A point-cloud processing and registration toolbox: a lock-free MPMC
//! queue and work-stealing thread pool (`concurrent`), the parallel
//! algorithms built on top of them (`concurrent::parallel`), nearest-neighbor
//! backends (`knn`), keypoint extraction and FPFH descriptors (`features`),
//! and rigid registration via RANSAC, 4PCS, and Anderson-accelerated ICP
//! (`registration`).

pub mod concurrent;
pub mod error;
pub mod features;
pub mod geometry;
pub mod knn;
pub mod logging;
pub mod registration;
pub mod rng;

pub use error::{Error, ErrorKind, Result};
