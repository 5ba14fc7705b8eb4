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

use super::{bind, orthonormal_basis, run_extraction, KeypointExtractor};
use crate::error::Result;
use crate::geometry::{KeypointIndexSet, PointCloud, Vector3};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::cmp::Ordering;
use std::sync::Arc;

/// Geometric analogue of the FAST/AGAST corner test: neighbors within
/// `pattern_radius` are ordered angularly around an axis through the query
/// point, an intensity surrogate (color luminance if present, otherwise
/// distance from the point to its neighbor) is compared against the
/// center's own surrogate, and the point is a corner if a contiguous arc of
/// at least `min_arc` neighbors is consistently brighter or darker.
pub struct AgastExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    pattern_radius: T,
    intensity_threshold: T,
    min_arc: usize,
    nms_radius: T,
}

impl<T: RealField + Copy> AgastExtractor<T> {
    pub fn new(pattern_radius: T, intensity_threshold: T, min_arc: usize, nms_radius: T) -> Self {
        AgastExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            pattern_radius,
            intensity_threshold,
            min_arc,
            nms_radius,
        }
    }

    fn surrogate(cloud: &PointCloud<T>, idx: usize, reference: usize) -> T {
        if let Some(colors) = cloud.colors() {
            let c = colors[idx];
            let luma = T::from_f64(0.299).unwrap() * T::from_u8(c[0]).unwrap()
                + T::from_f64(0.587).unwrap() * T::from_u8(c[1]).unwrap()
                + T::from_f64(0.114).unwrap() * T::from_u8(c[2]).unwrap();
            luma
        } else {
            (cloud.point(idx) - cloud.point(reference)).norm()
        }
    }

    fn max_circular_run(flags: &[bool]) -> usize {
        let n = flags.len();
        if n == 0 {
            return 0;
        }
        if flags.iter().all(|&f| f) {
            return n;
        }
        let mut max_run = 0usize;
        let mut cur = 0usize;
        for _ in 0..2 {
            for &f in flags {
                if f {
                    cur += 1;
                    max_run = max_run.max(cur);
                } else {
                    cur = 0;
                }
            }
        }
        max_run.min(n)
    }
}

trait FromU8<T> {
    fn from_u8(v: u8) -> Option<T>;
}

impl<T: RealField + Copy> FromU8<T> for T {
    fn from_u8(v: u8) -> Option<T> {
        T::from_u32(v as u32)
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for AgastExtractor<T> {
    fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()> {
        self.cloud = Some(cloud);
        Ok(())
    }

    fn set_knn(&mut self, knn: Arc<dyn NearestNeighbors<T>>) -> Result<()> {
        self.knn = Some(knn);
        Ok(())
    }

    fn enable_parallel(&mut self, flag: bool) {
        self.parallel = flag;
    }

    fn extract(&self) -> Result<KeypointIndexSet> {
        let (cloud, knn) = bind(&self.cloud, &self.knn)?;
        run_extraction(
            &cloud,
            knn.as_ref(),
            self.parallel,
            self.concurrency_hint,
            self.nms_radius,
            |_v: T| true,
            |i| {
                let p = cloud.point(i);
                let mut neighbors = knn.radius_search(&p, self.pattern_radius).ok()?;
                neighbors.retain(|&(j, _)| j != i);
                if neighbors.len() < self.min_arc {
                    return None;
                }
                let normal = cloud.normal(i).unwrap_or_else(Vector3::z);
                let (u, v) = orthonormal_basis(normal);
                neighbors.sort_by(|&(a, _), &(b, _)| {
                    let da = cloud.point(a) - p;
                    let db = cloud.point(b) - p;
                    let angle_a = da.dot(&u).atan2(da.dot(&v));
                    let angle_b = db.dot(&u).atan2(db.dot(&v));
                    angle_a.partial_cmp(&angle_b).unwrap_or(Ordering::Equal)
                });
                let center_val = if let Some(colors) = cloud.colors() {
                    let c = colors[i];
                    T::from_f64(0.299).unwrap() * T::from_u8(c[0]).unwrap()
                        + T::from_f64(0.587).unwrap() * T::from_u8(c[1]).unwrap()
                        + T::from_f64(0.114).unwrap() * T::from_u8(c[2]).unwrap()
                } else {
                    T::zero()
                };
                let brighter: Vec<bool> = neighbors
                    .iter()
                    .map(|&(j, _)| Self::surrogate(&cloud, j, i) > center_val + self.intensity_threshold)
                    .collect();
                let darker: Vec<bool> = neighbors
                    .iter()
                    .map(|&(j, _)| Self::surrogate(&cloud, j, i) < center_val - self.intensity_threshold)
                    .collect();
                let run = Self::max_circular_run(&brighter).max(Self::max_circular_run(&darker));
                if run >= self.min_arc {
                    Some(T::from_usize(run).unwrap())
                } else {
                    None
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;
    use crate::knn::BruteForce;

    #[test]
    fn empty_cloud_returns_empty() {
        let cloud = Arc::new(PointCloud::new(Vec::new()));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = AgastExtractor::new(1.0, 0.1, 5, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }

    #[test]
    fn sparse_cloud_below_min_arc_returns_empty() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.5, 0.0, 0.0)];
        let cloud = Arc::new(PointCloud::new(points));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = AgastExtractor::new(1.0, 0.1, 6, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }
}
