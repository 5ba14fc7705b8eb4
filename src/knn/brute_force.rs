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
use crate::error::{ErrorKind, Result};
use crate::geometry::{Point3, PointCloud};
use nalgebra::RealField;
use std::cmp::Ordering;
use std::sync::Arc;

/// No preprocessing; every query scans the whole cloud.
#[derive(Debug, Default)]
pub struct BruteForce<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
}

impl<T: RealField + Copy> BruteForce<T> {
    pub fn new() -> Self {
        BruteForce { cloud: None }
    }

    fn cloud(&self) -> Result<&Arc<PointCloud<T>>> {
        self.cloud
            .as_ref()
            .ok_or_else(|| ErrorKind::InvalidArgument("no input cloud bound".into()).into())
    }
}

impl<T: RealField + Copy> NearestNeighbors<T> for BruteForce<T> {
    fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()> {
        self.cloud = Some(cloud);
        Ok(())
    }

    fn kneighbors(&self, query: &Point3<T>, k: usize) -> Result<Vec<(usize, T)>> {
        let cloud = self.cloud()?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut all: Vec<(usize, T)> = cloud
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| (i, squared_distance(p, query)))
            .collect();
        all.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        all.truncate(k);
        Ok(all)
    }

    fn radius_search(&self, query: &Point3<T>, radius: T) -> Result<Vec<(usize, T)>> {
        let cloud = self.cloud()?;
        let r2 = radius * radius;
        let mut hits: Vec<(usize, T)> = cloud
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| (i, squared_distance(p, query)))
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

    #[test]
    fn unbound_backend_errors() {
        let bf: BruteForce<f64> = BruteForce::new();
        assert!(bf.kneighbors(&Point3::new(0.0, 0.0, 0.0), 1).is_err());
    }

    #[test]
    fn kneighbors_sorted_ascending() {
        let mut bf = BruteForce::new();
        bf.set_input(Arc::new(PointCloud::new(vec![
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ])))
        .unwrap();
        let hits = bf.kneighbors(&Point3::new(0.0, 0.0, 0.0), 3).unwrap();
        assert_eq!(hits.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2, 0]);
    }
}
