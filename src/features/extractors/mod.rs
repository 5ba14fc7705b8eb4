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

//! Keypoint extractors. One struct per algorithm, all implementing the
//! same [`KeypointExtractor`] capability rather than sharing a class
//! hierarchy — the parallel flag is a plain boolean field, not a
//! compile-time parameter.

pub mod agast;
pub mod curvature;
pub mod harris3d;
pub mod iss;
pub mod loam;
pub mod mls;
pub mod sift3d;
pub mod susan;

pub use agast::AgastExtractor;
pub use curvature::CurvatureExtractor;
pub use harris3d::Harris3DExtractor;
pub use iss::IssExtractor;
pub use loam::LoamExtractor;
pub use mls::{MlsExtractor, MlsOrder};
pub use sift3d::Sift3DExtractor;
pub use susan::SusanExtractor;

use crate::error::{ErrorKind, Result};
use crate::geometry::{KeypointIndexSet, Point3, PointCloud, Vector3};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability shared by every extractor in this module.
pub trait KeypointExtractor<T: RealField + Copy> {
    fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()>;
    fn set_knn(&mut self, knn: Arc<dyn NearestNeighbors<T>>) -> Result<()>;
    fn enable_parallel(&mut self, flag: bool);
    fn extract(&self) -> Result<KeypointIndexSet>;
}

/// Confirms both `set_input` and `set_knn` were called and that the KNN
/// backend was bound to the same cloud.
pub(crate) fn bind<T: RealField + Copy>(
    cloud: &Option<Arc<PointCloud<T>>>,
    knn: &Option<Arc<dyn NearestNeighbors<T>>>,
) -> Result<(Arc<PointCloud<T>>, Arc<dyn NearestNeighbors<T>>)> {
    let cloud = cloud
        .clone()
        .ok_or_else(|| Into::<crate::error::Error>::into(ErrorKind::InvalidArgument("set_input was never called".into())))?;
    let knn = knn
        .clone()
        .ok_or_else(|| Into::<crate::error::Error>::into(ErrorKind::InvalidArgument("set_knn was never called".into())))?;
    match knn.bound_cloud() {
        Some(bound) if Arc::ptr_eq(bound, &cloud) => Ok((cloud, knn)),
        _ => Err(ErrorKind::InvalidArgument("knn backend is bound to a different cloud".into()).into()),
    }
}

/// Computes one saliency score per point (`None` marks a point as
/// ineligible, e.g. a degenerate neighborhood), keeps those passing
/// `accept`, then applies non-maximum suppression within `nms_radius`.
pub(crate) fn run_extraction<T, F, A>(
    cloud: &PointCloud<T>,
    knn: &dyn NearestNeighbors<T>,
    parallel: bool,
    concurrency_hint: usize,
    nms_radius: T,
    accept: A,
    saliency: F,
) -> Result<KeypointIndexSet>
where
    T: RealField + Copy + Send,
    F: Fn(usize) -> Option<T> + Sync,
    A: Fn(T) -> bool,
{
    if cloud.is_empty() {
        return Ok(KeypointIndexSet::empty());
    }
    let indices: Vec<usize> = (0..cloud.len()).collect();
    let scores: Vec<Option<T>> = if parallel {
        crate::concurrent::parallel::parallel_transform(&indices, concurrency_hint, |&i| saliency(i))?
    } else {
        indices.iter().map(|&i| saliency(i)).collect()
    };

    let candidates: Vec<(usize, T)> = scores
        .into_iter()
        .enumerate()
        .filter_map(|(i, s)| s.filter(|&v| accept(v)).map(|v| (i, v)))
        .collect();

    let kept = non_max_suppression(cloud, knn, &candidates, nms_radius)?;
    Ok(KeypointIndexSet::new(kept))
}

fn non_max_suppression<T: RealField + Copy>(
    cloud: &PointCloud<T>,
    knn: &dyn NearestNeighbors<T>,
    candidates: &[(usize, T)],
    radius: T,
) -> Result<Vec<usize>> {
    let score_by_index: HashMap<usize, T> = candidates.iter().copied().collect();
    let mut kept = Vec::new();
    for &(idx, score) in candidates {
        let neighbors = knn.radius_search(&cloud.point(idx), radius)?;
        let dominates = neighbors.iter().all(|(j, _)| match score_by_index.get(j) {
            Some(&other) if *j != idx => score >= other,
            _ => true,
        });
        if dominates {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    Ok(kept)
}

/// An arbitrary right-handed orthonormal basis with `normal` as the third
/// axis, used to project a neighborhood into a point's tangent plane.
pub(crate) fn orthonormal_basis<T: RealField + Copy>(normal: Vector3<T>) -> (Vector3<T>, Vector3<T>) {
    let n = normal.normalize();
    let arbitrary = if n.x.abs() < T::from_f64(0.9).unwrap() {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = n.cross(&arbitrary).normalize();
    let v = n.cross(&u);
    (u, v)
}

pub(crate) type Neighborhood<T> = Vec<(usize, T)>;

pub(crate) fn gather_points<T: RealField + Copy>(cloud: &PointCloud<T>, neighbors: &Neighborhood<T>) -> Vec<Point3<T>> {
    neighbors.iter().map(|&(j, _)| cloud.point(j)).collect()
}
