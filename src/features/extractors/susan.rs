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

use super::{bind, run_extraction, KeypointExtractor};
use crate::error::Result;
use crate::geometry::{KeypointIndexSet, PointCloud};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::sync::Arc;

/// Smallest Univalue Segment Assimilating Nucleus: counts neighbors that are
/// geometrically (and, when normals are present, directionally) similar to
/// the center point. A small USAN fraction means the neighborhood is
/// asymmetric around the center, i.e. a corner.
pub struct SusanExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    radius: T,
    geometric_threshold: T,
    normal_threshold: T,
    usan_fraction: T,
    nms_radius: T,
}

impl<T: RealField + Copy> SusanExtractor<T> {
    pub fn new(radius: T, geometric_threshold: T, normal_threshold: T, usan_fraction: T, nms_radius: T) -> Self {
        SusanExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            radius,
            geometric_threshold,
            normal_threshold,
            usan_fraction,
            nms_radius,
        }
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for SusanExtractor<T> {
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
        let geom2 = self.geometric_threshold * self.geometric_threshold;
        run_extraction(
            &cloud,
            knn.as_ref(),
            self.parallel,
            self.concurrency_hint,
            self.nms_radius,
            |v: T| v >= T::one() - self.usan_fraction,
            |i| {
                let p = cloud.point(i);
                let neighbors = knn.radius_search(&p, self.radius).ok()?;
                let n = neighbors.len();
                if n == 0 {
                    return None;
                }
                let similar = neighbors
                    .iter()
                    .filter(|&&(j, d2)| {
                        let mut ok = d2 <= geom2;
                        if let (Some(ni), Some(nj)) = (cloud.normal(i), cloud.normal(j)) {
                            ok = ok && ni.dot(&nj) >= self.normal_threshold;
                        }
                        ok
                    })
                    .count();
                let fraction = T::from_usize(similar).unwrap() / T::from_usize(n).unwrap();
                Some(T::one() - fraction)
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
        let mut ext = SusanExtractor::new(1.0, 0.2, 0.9, 0.5, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }

    #[test]
    fn corner_of_an_l_shape_is_more_salient_than_its_straight_arms() {
        let mut points = Vec::new();
        for x in 0..10 {
            points.push(Point3::new(x as f64, 0.0, 0.0));
        }
        for y in 1..10 {
            points.push(Point3::new(0.0, y as f64, 0.0));
        }
        let cloud = Arc::new(PointCloud::new(points));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = SusanExtractor::new(2.5, 0.5, 0.9, 0.75, 1.5);
        ext.set_input(Arc::clone(&cloud)).unwrap();
        ext.set_knn(knn).unwrap();
        let keys = ext.extract().unwrap();
        assert!(keys.as_slice().contains(&0));
    }
}
