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
use crate::geometry::{covariance_of, KeypointIndexSet, PointCloud};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::sync::Arc;

/// 3D Harris response `det(M) - k * trace(M)^2` where `M` is the local
/// covariance matrix, the direct geometric analogue of the 2D image corner
/// response.
pub struct Harris3DExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    radius: T,
    k: T,
    threshold: T,
    nms_radius: T,
}

impl<T: RealField + Copy> Harris3DExtractor<T> {
    pub fn new(radius: T, k: T, threshold: T, nms_radius: T) -> Self {
        Harris3DExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            radius,
            k,
            threshold,
            nms_radius,
        }
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for Harris3DExtractor<T> {
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
                let m = covariance_of(&pts, p)?;
                let det = m.determinant();
                let trace = m.trace();
                Some(det - self.k * trace * trace)
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
        let mut ext = Harris3DExtractor::new(1.0, 0.04, 0.0, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }

    #[test]
    fn missing_knn_errors() {
        let cloud = Arc::new(PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0)]));
        let mut ext = Harris3DExtractor::new(1.0, 0.04, 0.0, 1.0);
        ext.set_input(cloud).unwrap();
        assert!(ext.extract().is_err());
    }
}
