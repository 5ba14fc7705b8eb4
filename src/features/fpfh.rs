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

//! The 33-bin Fast Point Feature Histogram descriptor.

use super::extractors::bind;
use crate::concurrent::parallel::parallel_transform;
use crate::error::{ErrorKind, Result};
use crate::geometry::{covariance_of, symmetric_eigen3, KeypointIndexSet, Point3, PointCloud, Vector3};
use crate::knn::NearestNeighbors;
use nalgebra::RealField;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const BINS_PER_FEATURE: usize = 11;
const SIGNATURE_LEN: usize = 3 * BINS_PER_FEATURE;

/// A fixed 33-bin histogram. Each of the three 11-bin sub-histograms (alpha,
/// phi, theta) sums to 100 over points with at least one valid neighbor, so
/// the signature as a whole sums to at most 300.
#[derive(Debug, Clone, PartialEq)]
pub struct FpfhSignature<T: RealField + Copy>([T; SIGNATURE_LEN]);

impl<T: RealField + Copy> FpfhSignature<T> {
    /// Builds a signature directly from a 33-bin histogram, e.g. for tests
    /// or for signatures read back from storage.
    pub fn from_array(bins: [T; SIGNATURE_LEN]) -> Self {
        FpfhSignature(bins)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn distance(&self, other: &Self) -> T {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(T::zero(), |acc, (a, b)| acc + (*a - *b) * (*a - *b))
            .sqrt()
    }
}

fn bin_index<T: RealField + Copy>(value: T, min: T, max: T, n_bins: usize) -> usize {
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    let span = max - min;
    if span <= T::zero() {
        return 0;
    }
    let n = T::from_usize(n_bins).unwrap();
    for i in 0..n_bins {
        let hi = min + span * T::from_usize(i + 1).unwrap() / n;
        if clamped <= hi {
            return i;
        }
    }
    n_bins - 1
}

/// The Simplified Point Feature Histogram centered at `idx`: one 33-bin
/// signature built from the angular features between `idx` and each of its
/// radius neighbors. `None` if `idx` (or the whole neighborhood) has no
/// usable normal.
fn spfh<T: RealField + Copy>(
    cloud: &PointCloud<T>,
    knn: &dyn NearestNeighbors<T>,
    normal_at: &dyn Fn(usize) -> Option<Vector3<T>>,
    idx: usize,
    radius: T,
) -> Option<[T; SIGNATURE_LEN]> {
    let p = cloud.point(idx);
    let n_p = normal_at(idx)?;
    let neighbors = knn.radius_search(&p, radius).ok()?;
    let mut hist = [T::zero(); SIGNATURE_LEN];
    let mut count = 0usize;
    let eps = T::from_f64(1e-12).unwrap();
    for &(j, _) in &neighbors {
        if j == idx {
            continue;
        }
        let q = cloud.point(j);
        let n_q = match normal_at(j) {
            Some(n) => n,
            None => continue,
        };
        let d = q - p;
        let dist = d.norm();
        if dist <= eps {
            continue;
        }
        let dir = d / dist;
        let u = n_p;
        let v_raw = u.cross(&dir);
        let v_norm = v_raw.norm();
        if v_norm <= eps {
            continue;
        }
        let v = v_raw / v_norm;
        let w = u.cross(&v);

        let alpha = v.dot(&n_q);
        let phi = u.dot(&dir);
        let theta = w.dot(&n_q).atan2(u.dot(&n_q));

        let ba = bin_index(alpha, -T::one(), T::one(), BINS_PER_FEATURE);
        let bp = bin_index(phi, -T::one(), T::one(), BINS_PER_FEATURE);
        let bt = bin_index(theta, -T::pi(), T::pi(), BINS_PER_FEATURE);

        hist[ba] += T::one();
        hist[BINS_PER_FEATURE + bp] += T::one();
        hist[2 * BINS_PER_FEATURE + bt] += T::one();
        count += 1;
    }
    if count == 0 {
        return Some(hist);
    }
    let scale = T::from_f64(100.0).unwrap() / T::from_usize(count).unwrap();
    for v in hist.iter_mut() {
        *v *= scale;
    }
    Some(hist)
}

/// Computes FPFH signatures for a set of keypoints, bound to a cloud and a
/// KNN capability the way every other descriptor/extractor in this crate
/// is.
pub struct FpfhEstimator<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    radius: T,
    fast: bool,
    parallel: bool,
    concurrency_hint: usize,
}

impl<T: RealField + Copy> FpfhEstimator<T> {
    pub fn new(radius: T) -> Self {
        FpfhEstimator {
            cloud: None,
            knn: None,
            radius,
            fast: false,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
        }
    }

    /// Enables the fast-averaging variant: SPFH at each neighboring point is
    /// computed once and reused across every keypoint that shares it.
    pub fn with_fast_averaging(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()> {
        self.cloud = Some(cloud);
        Ok(())
    }

    pub fn set_knn(&mut self, knn: Arc<dyn NearestNeighbors<T>>) -> Result<()> {
        self.knn = Some(knn);
        Ok(())
    }

    pub fn enable_parallel(&mut self, flag: bool) {
        self.parallel = flag;
    }

    fn normal_at<'a>(
        cloud: &'a PointCloud<T>,
        knn: &'a dyn NearestNeighbors<T>,
        radius: T,
    ) -> impl Fn(usize) -> Option<Vector3<T>> + 'a {
        move |i: usize| -> Option<Vector3<T>> {
            if let Some(n) = cloud.normal(i) {
                return Some(n);
            }
            let p: Point3<T> = cloud.point(i);
            let neighbors = knn.radius_search(&p, radius).ok()?;
            if neighbors.len() < 3 {
                return None;
            }
            let pts: Vec<Point3<T>> = neighbors.iter().map(|&(j, _)| cloud.point(j)).collect();
            let cov = covariance_of(&pts, p)?;
            let (_, vectors) = symmetric_eigen3(cov)?;
            Some(vectors.column(0).into_owned())
        }
    }

    pub fn estimate(&self, keypoints: &KeypointIndexSet) -> Result<Vec<FpfhSignature<T>>> {
        let (cloud, knn) = bind(&self.cloud, &self.knn)?;
        if self.radius <= T::zero() {
            return Err(ErrorKind::InvalidArgument("FPFH search radius must be positive".into()).into());
        }
        if keypoints.is_empty() {
            return Ok(Vec::new());
        }
        let normal_at = Self::normal_at(&cloud, knn.as_ref(), self.radius);

        if !self.fast {
            let idxs: Vec<usize> = keypoints.as_slice().to_vec();
            let hists: Vec<Option<[T; SIGNATURE_LEN]>> = if self.parallel {
                parallel_transform(&idxs, self.concurrency_hint, |&i| {
                    spfh(&cloud, knn.as_ref(), &normal_at, i, self.radius)
                })?
            } else {
                idxs.iter().map(|&i| spfh(&cloud, knn.as_ref(), &normal_at, i, self.radius)).collect()
            };
            return hists
                .into_iter()
                .map(|h| {
                    h.map(FpfhSignature).ok_or_else(|| {
                        ErrorKind::NumericalFailure("could not determine a normal for a keypoint's neighborhood".into()).into()
                    })
                })
                .collect();
        }

        let mut neighbor_sets: Vec<(usize, Vec<(usize, T)>)> = Vec::with_capacity(keypoints.len());
        let mut distinct: HashSet<usize> = HashSet::new();
        for &k in keypoints.as_slice() {
            let p = cloud.point(k);
            let neighbors = knn.radius_search(&p, self.radius)?;
            distinct.insert(k);
            for &(j, _) in &neighbors {
                distinct.insert(j);
            }
            neighbor_sets.push((k, neighbors));
        }
        let distinct_vec: Vec<usize> = distinct.into_iter().collect();
        let spfh_values: Vec<Option<[T; SIGNATURE_LEN]>> = if self.parallel {
            parallel_transform(&distinct_vec, self.concurrency_hint, |&i| {
                spfh(&cloud, knn.as_ref(), &normal_at, i, self.radius)
            })?
        } else {
            distinct_vec
                .iter()
                .map(|&i| spfh(&cloud, knn.as_ref(), &normal_at, i, self.radius))
                .collect()
        };
        let cache: HashMap<usize, [T; SIGNATURE_LEN]> = distinct_vec
            .into_iter()
            .zip(spfh_values)
            .filter_map(|(i, h)| h.map(|h| (i, h)))
            .collect();

        let mut out = Vec::with_capacity(neighbor_sets.len());
        for (k, neighbors) in neighbor_sets {
            let base = *cache
                .get(&k)
                .ok_or_else(|| ErrorKind::NumericalFailure("could not determine a normal for a keypoint".into()))?;
            let valid: Vec<(usize, T)> = neighbors.into_iter().filter(|&(j, _)| j != k && cache.contains_key(&j)).collect();
            if valid.is_empty() {
                out.push(FpfhSignature(base));
                continue;
            }
            let eps = T::from_f64(1e-12).unwrap();
            let k_count = T::from_usize(valid.len()).unwrap();
            let mut acc = [T::zero(); SIGNATURE_LEN];
            for &(j, d2) in &valid {
                let dist = d2.sqrt();
                if dist <= eps {
                    continue;
                }
                let weight = T::one() / dist;
                let neighbor_hist = cache[&j];
                for b in 0..SIGNATURE_LEN {
                    acc[b] += weight * neighbor_hist[b];
                }
            }
            let mut combined = base;
            for b in 0..SIGNATURE_LEN {
                combined[b] += acc[b] / k_count;
            }
            out.push(FpfhSignature(combined));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointCloud;
    use crate::knn::BruteForce;

    fn plane_cloud() -> (Arc<PointCloud<f64>>, KeypointIndexSet) {
        let mut points = Vec::new();
        for x in -4..=4 {
            for y in -4..=4 {
                points.push(Point3::new(x as f64 * 0.2, y as f64 * 0.2, 0.0));
            }
        }
        let normals = vec![Vector3::new(0.0, 0.0, 1.0); points.len()];
        let cloud = Arc::new(PointCloud::with_normals(points, normals).unwrap());
        let keypoints = KeypointIndexSet::new(vec![cloud.len() / 2]);
        (cloud, keypoints)
    }

    #[test]
    fn signature_has_33_bins_and_bounded_sum() {
        let (cloud, keypoints) = plane_cloud();
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut est = FpfhEstimator::new(0.5);
        est.set_input(Arc::clone(&cloud)).unwrap();
        est.set_knn(knn).unwrap();
        let sigs = est.estimate(&keypoints).unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].as_slice().len(), 33);
        assert!(sigs[0].as_slice().iter().all(|&v| v >= 0.0));
        assert!(sigs[0].as_slice().iter().sum::<f64>() <= 300.0 + 1e-6);
    }

    #[test]
    fn fast_averaging_matches_length_and_stays_non_negative() {
        let (cloud, _) = plane_cloud();
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let keypoints = KeypointIndexSet::new((0..cloud.len()).step_by(5).collect());
        let mut est = FpfhEstimator::new(0.5).with_fast_averaging(true);
        est.set_input(Arc::clone(&cloud)).unwrap();
        est.set_knn(knn).unwrap();
        let sigs = est.estimate(&keypoints).unwrap();
        assert_eq!(sigs.len(), keypoints.len());
        for s in &sigs {
            assert_eq!(s.as_slice().len(), 33);
            assert!(s.as_slice().iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn rejects_nonpositive_radius() {
        let (cloud, keypoints) = plane_cloud();
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut est = FpfhEstimator::new(0.0);
        est.set_input(cloud).unwrap();
        est.set_knn(knn).unwrap();
        assert!(est.estimate(&keypoints).is_err());
    }

    #[test]
    fn empty_keypoint_set_returns_empty() {
        let (cloud, _) = plane_cloud();
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&cloud)).unwrap();
        let knn: Arc<dyn NearestNeighbors<f64>> = Arc::new(knn);
        let mut est = FpfhEstimator::new(0.5);
        est.set_input(cloud).unwrap();
        est.set_knn(knn).unwrap();
        assert!(est.estimate(&KeypointIndexSet::empty()).unwrap().is_empty());
    }
}
