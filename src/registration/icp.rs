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

//! The plain point-to-point ICP step that both a standalone iterative
//! aligner and the Anderson-accelerated driver in [`super::aa_icp`] build
//! on: establish nearest-neighbor correspondences under the current
//! estimate, then refit with Kabsch-Umeyama.

use super::kabsch_umeyama;
use crate::error::{ErrorKind, Result};
use crate::geometry::{PointCloud, Point3, Transform};
use crate::knn::NearestNeighbors;

/// Runs one ICP iteration: for each source point, find its nearest
/// neighbor in `target` under `current`, drop pairs further apart than
/// `max_correspondence_distance`, then refit a transform over the
/// survivors. Returns the refit transform, the mean squared residual the
/// refit transform leaves on those pairs, and the matched point pairs
/// themselves (original-frame source points alongside their target
/// matches) so a caller can re-evaluate a different candidate transform
/// against the same correspondence set.
pub fn icp_step(
    source: &[Point3<f64>],
    target: &PointCloud<f64>,
    target_knn: &dyn NearestNeighbors<f64>,
    current: &Transform,
    max_correspondence_distance: f64,
) -> Result<(Transform, f64, Vec<Point3<f64>>, Vec<Point3<f64>>)> {
    let mut src_matched = Vec::new();
    let mut tgt_matched = Vec::new();
    for p in source {
        let query = current.transform_point(p);
        let hits = target_knn.kneighbors(&query, 1)?;
        if let Some(&(j, sq_dist)) = hits.first() {
            if sq_dist.sqrt() <= max_correspondence_distance {
                src_matched.push(*p);
                tgt_matched.push(target.point(j));
            }
        }
    }
    if src_matched.len() < 3 {
        return Err(ErrorKind::NumericalFailure("too few correspondences for an ICP step".into()).into());
    }
    let refit = kabsch_umeyama(&src_matched, &tgt_matched)?;
    let mse = mean_sq_residual(&src_matched, &tgt_matched, &refit);
    Ok((refit, mse, src_matched, tgt_matched))
}

/// The mean squared point-to-point residual a transform leaves on a set of
/// matched pairs, reused to compare the plain ICP step against an
/// extrapolated candidate over the same correspondences.
pub fn mean_sq_residual(src: &[Point3<f64>], tgt: &[Point3<f64>], transform: &Transform) -> f64 {
    if src.is_empty() {
        return f64::INFINITY;
    }
    src.iter()
        .zip(tgt.iter())
        .map(|(s, t)| (transform.transform_point(s) - t).norm_squared())
        .sum::<f64>()
        / src.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointCloud;
    use crate::knn::BruteForce;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::sync::Arc;

    #[test]
    fn one_step_from_a_near_identity_start_reduces_residual() {
        let mut points = Vec::new();
        for i in 0..50 {
            points.push(Point3::new(i as f64 * 0.1, (i as f64).sin() * 0.3, (i as f64 * 0.5).cos() * 0.2));
        }
        let truth = Transform::new(UnitQuaternion::from_euler_angles(0.01, -0.01, 0.02), Vector3::new(0.02, -0.01, 0.01));
        let target_points: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let target_cloud = Arc::new(PointCloud::new(target_points));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&target_cloud)).unwrap();

        let (_, mse_before, _, _) = icp_step(&points, &target_cloud, &knn, &Transform::identity(), 1.0).unwrap();
        let (refit, _, _, _) = icp_step(&points, &target_cloud, &knn, &Transform::identity(), 1.0).unwrap();
        let (_, mse_after, _, _) = icp_step(&points, &target_cloud, &knn, &refit, 1.0).unwrap();
        assert!(mse_after <= mse_before + 1e-9);
    }

    #[test]
    fn too_few_correspondences_errors() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 100.0)];
        let target_cloud = Arc::new(PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0)]));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&target_cloud)).unwrap();
        assert!(icp_step(&points, &target_cloud, &knn, &Transform::identity(), 0.01).is_err());
    }
}
