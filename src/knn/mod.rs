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

//! Nearest-neighbor search backends sharing one capability: bind a cloud,
//! then ask for k nearest or all-within-radius, always sorted by increasing
//! squared distance.

mod brute_force;
mod kdtree;
mod parallel_brute_force;

pub use brute_force::BruteForce;
pub use kdtree::KdTree;
pub use parallel_brute_force::ParallelBruteForce;

use crate::geometry::{PointCloud, Point3};
use crate::error::Result;
use nalgebra::RealField;
use std::sync::Arc;

/// A bound nearest-neighbor search capability.
pub trait NearestNeighbors<T: RealField + Copy>: Send + Sync {
    /// Binds the cloud to search against, doing any upfront preprocessing
    /// (e.g. tree construction).
    fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()>;

    /// The `k` nearest neighbors of `query`, ascending by squared distance.
    /// Fewer than `k` pairs are returned if the cloud has fewer points.
    fn kneighbors(&self, query: &Point3<T>, k: usize) -> Result<Vec<(usize, T)>>;

    /// All neighbors within `radius` of `query`, ascending by squared
    /// distance.
    fn radius_search(&self, query: &Point3<T>, radius: T) -> Result<Vec<(usize, T)>>;

    /// The cloud bound by the last `set_input` call, if any. Extractors use
    /// this to confirm a KNN backend was bound to the same cloud they were.
    fn bound_cloud(&self) -> Option<&Arc<PointCloud<T>>>;
}

pub(crate) fn squared_distance<T: RealField + Copy>(a: &Point3<T>, b: &Point3<T>) -> T {
    (a - b).norm_squared()
}

#[cfg(test)]
mod agreement_tests {
    use super::*;
    use crate::geometry::PointCloud;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::cmp::Ordering;

    fn random_cloud(n: usize, seed: u64) -> PointCloud<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let points = (0..n)
            .map(|_| Point3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)))
            .collect();
        PointCloud::new(points)
    }

    fn sorted_indices(mut v: Vec<(usize, f64)>) -> Vec<usize> {
        v.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        v.into_iter().map(|(i, _)| i).collect()
    }

    #[test]
    fn kdtree_radius_search_matches_brute_force() {
        let cloud = Arc::new(random_cloud(2_000, 1));
        let mut kd = KdTree::new();
        let mut bf = BruteForce::new();
        kd.set_input(Arc::clone(&cloud)).unwrap();
        bf.set_input(Arc::clone(&cloud)).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..20 {
            let q = Point3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
            let radius = rng.gen_range(0.5..4.0);
            let a = sorted_indices(kd.radius_search(&q, radius).unwrap());
            let b = sorted_indices(bf.radius_search(&q, radius).unwrap());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn kdtree_kneighbors_matches_brute_force() {
        let cloud = Arc::new(random_cloud(1_000, 3));
        let mut kd = KdTree::new();
        let mut bf = BruteForce::new();
        kd.set_input(Arc::clone(&cloud)).unwrap();
        bf.set_input(Arc::clone(&cloud)).unwrap();

        let q = Point3::new(0.3, -1.2, 2.5);
        let a = sorted_indices(kd.kneighbors(&q, 10).unwrap());
        let b = sorted_indices(bf.kneighbors(&q, 10).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_points_all_returned_by_radius_search() {
        let points = vec![Point3::new(0.0, 0.0, 0.0); 5];
        let cloud = Arc::new(PointCloud::new(points));
        let mut kd = KdTree::new();
        kd.set_input(Arc::clone(&cloud)).unwrap();
        let hits = kd.radius_search(&Point3::new(0.0, 0.0, 0.0), 0.01).unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn fewer_than_k_points_returns_all_available() {
        let cloud = Arc::new(random_cloud(3, 4));
        let mut kd = KdTree::new();
        kd.set_input(Arc::clone(&cloud)).unwrap();
        let hits = kd.kneighbors(&Point3::new(0.0, 0.0, 0.0), 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    use proptest::prelude::*;

    proptest! {
        // Universal invariant: radius_search agrees with brute force for any
        // cloud, query, and radius, not just the hand-picked cases above.
        #[test]
        fn kdtree_radius_search_agrees_with_brute_force_for_arbitrary_clouds(
            seed in any::<u64>(),
            n in 1usize..200,
            qx in -10.0f64..10.0,
            qy in -10.0f64..10.0,
            qz in -10.0f64..10.0,
            radius in 0.1f64..8.0,
        ) {
            let cloud = Arc::new(random_cloud(n, seed));
            let mut kd = KdTree::new();
            let mut bf = BruteForce::new();
            kd.set_input(Arc::clone(&cloud)).unwrap();
            bf.set_input(Arc::clone(&cloud)).unwrap();

            let q = Point3::new(qx, qy, qz);
            let a = sorted_indices(kd.radius_search(&q, radius).unwrap());
            let b = sorted_indices(bf.radius_search(&q, radius).unwrap());
            prop_assert_eq!(a, b);
        }
    }
}
