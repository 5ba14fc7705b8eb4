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
use crate::geometry::{covariance_of, symmetric_eigen3, KeypointIndexSet, Point3, PointCloud};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::sync::Arc;

/// Approximates scale-space extrema detection by evaluating a
/// Gaussian-weighted density response at `num_scales` geometrically spaced
/// radii, taking the largest-magnitude difference between adjacent scales
/// as the point's Difference-of-Gaussians response, then rejecting
/// low-contrast and edge-like responses the way the 2D SIFT detector does.
pub struct Sift3DExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    base_radius: T,
    scale_factor: T,
    num_scales: usize,
    contrast_threshold: T,
    edge_ratio_threshold: T,
    nms_radius: T,
}

impl<T: RealField + Copy> Sift3DExtractor<T> {
    pub fn new(
        base_radius: T,
        scale_factor: T,
        num_scales: usize,
        contrast_threshold: T,
        edge_ratio_threshold: T,
        nms_radius: T,
    ) -> Self {
        Sift3DExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            base_radius,
            scale_factor,
            num_scales: num_scales.max(2),
            contrast_threshold,
            edge_ratio_threshold,
            nms_radius,
        }
    }

    fn smoothed_response(cloud: &PointCloud<T>, knn: &dyn NearestNeighbors<T>, p: &Point3<T>, radius: T) -> Option<T> {
        let neighbors = knn.radius_search(p, radius).ok()?;
        if neighbors.len() < 3 {
            return None;
        }
        let sigma2 = radius * radius / T::from_f64(4.0).unwrap();
        let two = T::from_f64(2.0).unwrap();
        let mut num = T::zero();
        let mut den = T::zero();
        for &(_, d2) in &neighbors {
            let w = (-d2 / (two * sigma2)).exp();
            num += w * d2;
            den += w;
        }
        if den <= T::zero() {
            return None;
        }
        Some(num / den)
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for Sift3DExtractor<T> {
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
                let mut responses = Vec::with_capacity(self.num_scales);
                let mut radius = self.base_radius;
                for _ in 0..self.num_scales {
                    responses.push(Self::smoothed_response(&cloud, knn.as_ref(), &p, radius)?);
                    radius = radius * self.scale_factor;
                }
                let mut best: Option<T> = None;
                for w in responses.windows(2) {
                    let dog = w[1] - w[0];
                    if best.map_or(true, |b: T| dog.abs() > b.abs()) {
                        best = Some(dog);
                    }
                }
                let dog = best?;
                if dog.abs() < self.contrast_threshold {
                    return None;
                }
                let neighbors = knn.radius_search(&p, self.base_radius).ok()?;
                if neighbors.len() < 3 {
                    return None;
                }
                let pts = gather_points(&cloud, &neighbors);
                let cov = covariance_of(&pts, p)?;
                let (eig, _) = symmetric_eigen3(cov)?;
                if eig.smallest() <= T::zero() {
                    return None;
                }
                let ratio = eig.largest() / eig.smallest();
                if ratio > self.edge_ratio_threshold {
                    return None;
                }
                Some(dog.abs())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knn::BruteForce;

    #[test]
    fn empty_cloud_returns_empty() {
        let cloud = Arc::new(PointCloud::new(Vec::new()));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = Sift3DExtractor::new(1.0, 1.6, 4, 1e-4, 10.0, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }

    #[test]
    fn sparse_cloud_yields_no_keypoints() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.1, 0.0, 0.0)];
        let cloud = Arc::new(PointCloud::new(points));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = Sift3DExtractor::new(1.0, 1.6, 4, 1e-4, 10.0, 1.0);
        ext.set_input(cloud).unwrap();
        ext.set_knn(knn).unwrap();
        assert!(ext.extract().unwrap().is_empty());
    }
}
