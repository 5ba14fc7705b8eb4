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

use super::{bind, gather_points, run_extraction, KeypointExtractor};
use crate::error::Result;
use crate::geometry::{covariance_of, symmetric_eigen3, KeypointIndexSet, PointCloud};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::sync::Arc;

/// Saliency is `lambda_min / (lambda_0 + lambda_1 + lambda_2)` of the local
/// covariance: a small value means the neighborhood is close to planar, a
/// large one means it curves sharply in every direction.
pub struct CurvatureExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    radius: T,
    threshold: T,
    nms_radius: T,
}

impl<T: RealField + Copy> CurvatureExtractor<T> {
    pub fn new(radius: T, threshold: T, nms_radius: T) -> Self {
        CurvatureExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            radius,
            threshold,
            nms_radius,
        }
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for CurvatureExtractor<T> {
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
            |v: T| v >= self.threshold,
            |i| {
                let p = cloud.point(i);
                let neighbors = knn.radius_search(&p, self.radius).ok()?;
                if neighbors.len() < 3 {
                    return None;
                }
                let pts = gather_points(&cloud, &neighbors);
                let cov = covariance_of(&pts, p)?;
                let (eig, _) = symmetric_eigen3(cov)?;
                let sum = eig.sum();
                if sum <= T::zero() {
                    return None;
                }
                Some(eig.smallest() / sum)
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
    fn flat_plane_yields_no_keypoints_but_a_bump_does() {
        let mut points: Vec<Point3<f64>> = Vec::new();
        for x in -3..=3 {
            for y in -3..=3 {
                points.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        points.push(Point3::new(0.0, 0.0, 5.0));
        let cloud = Arc::new(PointCloud::new(points));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);

        let mut ext = CurvatureExtractor::new(2.5, 0.2, 1.0);
        ext.set_input(Arc::clone(&cloud)).unwrap();
        ext.set_knn(knn).unwrap();
        let keys = ext.extract().unwrap();
        assert!(keys.as_slice().contains(&(points_len(&cloud) - 1)));
    }

    fn points_len(cloud: &PointCloud<f64>) -> usize {
        cloud.len()
    }

    #[test]
    fn empty_cloud_returns_empty() {
        let cloud = Arc::new(PointCloud::new(Vec::new()));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = CurvatureExtractor::new(1.0, 0.1, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }
}
