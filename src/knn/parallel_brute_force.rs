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

use super::{squared_distance, NearestNeighbors};
use crate::concurrent::parallel::parallel_transform;
use crate::error::{ErrorKind, Result};
use crate::geometry::{Point3, PointCloud};
use nalgebra::RealField;
use std::cmp::Ordering;
use std::sync::Arc;

/// Brute force, but the per-query distance sweep is dispatched across the
/// data-parallel `parallel_transform` helper rather than run on the calling thread.
#[derive(Debug)]
pub struct ParallelBruteForce<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    concurrency_hint: usize,
}

impl<T: RealField + Copy> Default for ParallelBruteForce<T> {
    fn default() -> Self {
        ParallelBruteForce {
            cloud: None,
            concurrency_hint: num_cpus::get().max(1),
        }
    }
}

impl<T: RealField + Copy> ParallelBruteForce<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency_hint(concurrency_hint: usize) -> Self {
        ParallelBruteForce {
            cloud: None,
            concurrency_hint: concurrency_hint.max(1),
        }
    }

    fn cloud(&self) -> Result<&Arc<PointCloud<T>>> {
        self.cloud
            .as_ref()
            .ok_or_else(|| ErrorKind::InvalidArgument("no input cloud bound".into()).into())
    }
}

impl<T: RealField + Copy> NearestNeighbors<T> for ParallelBruteForce<T> {
    fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()> {
        self.cloud = Some(cloud);
        Ok(())
    }

    fn kneighbors(&self, query: &Point3<T>, k: usize) -> Result<Vec<(usize, T)>> {
        let cloud = self.cloud()?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let distances = parallel_transform(cloud.points(), self.concurrency_hint, |p| squared_distance(p, query))?;
        let mut all: Vec<(usize, T)> = distances.into_iter().enumerate().collect();
        all.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        all.truncate(k);
        Ok(all)
    }

    fn radius_search(&self, query: &Point3<T>, radius: T) -> Result<Vec<(usize, T)>> {
        let cloud = self.cloud()?;
        let r2 = radius * radius;
        let distances = parallel_transform(cloud.points(), self.concurrency_hint, |p| squared_distance(p, query))?;
        let mut hits: Vec<(usize, T)> = distances
            .into_iter()
            .enumerate()
            .filter(|(_, d)| *d <= r2)
            .collect();
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Ok(hits)
    }

    fn bound_cloud(&self) -> Option<&Arc<PointCloud<T>>> {
        self.cloud.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knn::BruteForce;

    #[test]
    fn matches_sequential_brute_force() {
        let points: Vec<_> = (0..500)
            .map(|i| Point3::new(i as f64, (i * 7 % 13) as f64, (i * 3 % 11) as f64))
            .collect();
        let cloud = Arc::new(PointCloud::new(points));
        let mut seq = BruteForce::new();
        let mut par = ParallelBruteForce::with_concurrency_hint(4);
        seq.set_input(Arc::clone(&cloud)).unwrap();
        par.set_input(Arc::clone(&cloud)).unwrap();

        let q = Point3::new(250.0, 3.0, 5.0);
        assert_eq!(seq.kneighbors(&q, 8).unwrap(), par.kneighbors(&q, 8).unwrap());
    }
}
