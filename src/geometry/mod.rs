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

//! The data model shared by every component: point clouds, keypoint index
//! sets, labeled clouds, and rigid transforms.

mod cloud;
mod eigen;
mod transform;

pub use cloud::{KeypointIndexSet, LabeledCloud, PointCloud, PointLabel};
pub use eigen::{covariance_of, symmetric_eigen3, Vector3Sorted};
pub use transform::Transform;

pub use nalgebra::{Point3, Vector3};
