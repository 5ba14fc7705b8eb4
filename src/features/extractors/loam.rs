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

use super::{bind, KeypointExtractor};
use crate::concurrent::parallel::parallel_transform;
use crate::error::Result;
use crate::geometry::{KeypointIndexSet, LabeledCloud, Point3, PointCloud, PointLabel};
use crate::knn::NearestNeighbors;
use nalgebra::{RealField, Vector3};
use std::sync::Arc;

/// Per-point smoothness classification in the style of LOAM's edge/planar
/// feature split: a point's smoothness is the norm of the sum of vectors to
/// its radius neighbors, normalized by neighbor count and distance from the
/// sensor origin. High smoothness marks an edge, low smoothness a planar
/// surface; everything in between is discarded.
pub struct LoamExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    radius: T,
    edge_threshold: T,
    planar_threshold: T,
}

impl<T: RealField + Copy> LoamExtractor<T> {
    pub fn new(radius: T, edge_threshold: T, planar_threshold: T) -> Self {
        LoamExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            radius,
            edge_threshold,
            planar_threshold,
        }
    }

    fn smoothness(cloud: &PointCloud<T>, p: Point3<T>, neighbors: &[(usize, T)]) -> Option<T> {
        if neighbors.is_empty() {
            return None;
        }
        let sum = neighbors
            .iter()
            .fold(Vector3::<T>::zeros(), |acc, &(j, _)| acc + (cloud.point(j) - p));
        let norm_p = p.coords.norm();
        if norm_p <= T::from_f64(1e-9).unwrap() {
            return None;
        }
        Some(sum.norm() / (T::from_usize(neighbors.len()).unwrap() * norm_p))
    }

    /// The full per-point classification, exposing edge/planar/non-feature
    /// labels rather than the flattened index set `extract()` returns.
    pub fn extract_labeled_cloud(&self) -> Result<LabeledCloud<T>> {
        let (cloud, knn) = bind(&self.cloud, &self.knn)?;
        let indices: Vec<usize> = (0..cloud.len()).collect();
        let compute = |i: usize| -> PointLabel {
            let p = cloud.point(i);
            match knn
                .radius_search(&p, self.radius)
                .ok()
                .and_then(|n| Self::smoothness(&cloud, p, &n))
            {
                Some(c) if c > self.edge_threshold => PointLabel::Edge,
                Some(c) if c < self.planar_threshold => PointLabel::Planar,
                _ => PointLabel::NonFeature,
            }
        };
        let labels: Vec<PointLabel> = if self.parallel {
            parallel_transform(&indices, self.concurrency_hint, |&i| compute(i))?
        } else {
            indices.iter().map(|&i| compute(i)).collect()
        };
        LabeledCloud::new(cloud, labels)
    }
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for LoamExtractor<T> {
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
        Ok(self.extract_labeled_cloud()?.keypoint_indices())
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
        let mut ext = LoamExtractor::new(1.0, 0.5, 0.05);
        ext.set_input(Arc::clone(&cloud)).unwrap();
        ext.set_knn(knn).unwrap();
        let labeled = ext.extract_labeled_cloud().unwrap();
        assert_eq!(labeled.labels().len(), 0);
        assert!(ext.extract().unwrap().is_empty());
    }

    #[test]
    fn a_ring_of_points_is_classified_planar_or_non_feature() {
        let mut points = Vec::new();
        for i in 0..36 {
            let angle = (i as f64) * std::f64::consts::PI / 18.0;
            points.push(Point3::new(10.0 * angle.cos(), 10.0 * angle.sin(), 1.0));
        }
        let cloud = Arc::new(PointCloud::new(points));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut ext = LoamExtractor::new(3.0, 0.9, 0.3);
        ext.set_input(Arc::clone(&cloud)).unwrap();
        ext.set_knn(knn).unwrap();
        let labeled = ext.extract_labeled_cloud().unwrap();
        assert!(labeled.edge_indices().is_empty());
    }
}
