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

/// Intrinsic Shape Signatures: a point is salient when both eigenvalue
/// ratios `lambda1/lambda0` and `lambda2/lambda1` of its local covariance
/// stay below their respective thresholds, i.e. the three principal
/// directions are well separated rather than close to equal or degenerate.
pub struct IssExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    radius: T,
    ratio_21: T,
    ratio_32: T,
    nms_radius: T,
}

impl<T: RealField + Copy> IssExtractor<T> {
    pub fn new(radius: T, ratio_21: T, ratio_32: T, nms_radius: T) -> Self {
        IssExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            radius,
            ratio_21,
            ratio_32,
            nms_radius,
        }
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for IssExtractor<T> {
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
                let neighbors = knn.radius_search(&p, self.radius).ok()?;
                if neighbors.len() < 3 {
                    return None;
                }
                let pts = gather_points(&cloud, &neighbors);
                let cov = covariance_of(&pts, p)?;
                let (eig, _) = symmetric_eigen3(cov)?;
                let (l0, l1, l2) = eig.decreasing();
                if l0 <= T::zero() || l1 <= T::zero() {
                    return None;
                }
                let r21 = l1 / l0;
                let r32 = l2 / l1;
                if r21 < self.ratio_21 && r32 < self.ratio_32 {
                    Some(-r32)
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
        let mut ext = IssExtractor::new(1.0, 0.8, 0.8, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }

    #[test]
    fn rejects_mismatched_cloud() {
        let a = Arc::new(PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0)]));
        let b = Arc::new(PointCloud::new(vec![Point3::new(1.0, 0.0, 0.0)]));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&a)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = IssExtractor::new(1.0, 0.8, 0.8, 1.0);
        ext.set_input(b).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().is_err());
    }
}
