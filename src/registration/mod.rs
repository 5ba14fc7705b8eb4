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

//! Correspondence generation, RANSAC, 4PCS / Super-4PCS, and
//! Anderson-accelerated ICP. All operate on `f64` clouds, matching
//! [`crate::geometry::Transform`], which is itself not generic over the
//! float type.

pub mod aa_icp;
pub mod correspondence;
pub mod four_pcs;
pub mod icp;
pub mod ransac;

pub use aa_icp::{AaIcpParams, aa_icp_register};
pub use correspondence::generate_correspondences;
pub use four_pcs::{FourPcsParams, four_pcs_register};
pub use icp::icp_step;
pub use ransac::{RansacParams, ransac_register};

use crate::error::{ErrorKind, Result};
use crate::geometry::Transform;
use nalgebra::{Matrix3, Point3};

/// A match between a source keypoint and a target keypoint, with the
/// descriptor-space distance that produced it. Indices are positions within
/// the respective keypoint index sets, not raw cloud indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub src_idx: usize,
    pub dst_idx: usize,
    pub distance: f64,
}

/// One entry of an AA-ICP iteration history.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationIterationState {
    pub iteration: usize,
    pub transform: Transform,
    pub error: f64,
    pub error_change: f64,
    pub correspondence_count: usize,
}

/// The outcome of an aligner: RANSAC, 4PCS, or AA-ICP.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub transform: Transform,
    /// Indices into the correspondence list that were counted as inliers.
    /// Empty for aligners (AA-ICP, the base ICP step) that do not operate
    /// over a discrete correspondence list.
    pub inliers: Vec<usize>,
    pub fitness: f64,
    pub converged: bool,
    pub history: Vec<RegistrationIterationState>,
    pub reason: String,
}

/// Closed-form rigid alignment between two paired point sets via SVD
/// (Kabsch-Umeyama): centroid subtraction, covariance `H`, `H = U*Sigma*V^T`,
/// `R = V * diag(1,1,det(V*U^T)) * U^T`, `t = centroid_tgt - R*centroid_src`.
/// The determinant correction guarantees a proper rotation even when the
/// raw SVD result would reflect.
pub fn kabsch_umeyama(src: &[Point3<f64>], tgt: &[Point3<f64>]) -> Result<Transform> {
    if src.len() != tgt.len() {
        return Err(ErrorKind::InvalidArgument("source and target point counts differ".into()).into());
    }
    if src.len() < 3 {
        return Err(ErrorKind::InvalidArgument("Kabsch-Umeyama needs at least 3 point pairs".into()).into());
    }
    let n = src.len() as f64;
    let centroid_src = src.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let centroid_tgt = tgt.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / n;

    let mut h = Matrix3::<f64>::zeros();
    for (ps, pt) in src.iter().zip(tgt.iter()) {
        let a = ps.coords - centroid_src;
        let b = pt.coords - centroid_tgt;
        h += a * b.transpose();
    }

    let svd = nalgebra::linalg::SVD::new(h, true, true);
    let u = svd.u.ok_or_else(|| ErrorKind::NumericalFailure("SVD of the covariance matrix produced no U".into()))?;
    let v_t = svd.v_t.ok_or_else(|| ErrorKind::NumericalFailure("SVD of the covariance matrix produced no V^T".into()))?;
    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant();
    let correction = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, if d < 0.0 { -1.0 } else { 1.0 });
    let r = v * correction * u.transpose();
    if !r.iter().all(|x| x.is_finite()) {
        return Err(ErrorKind::NumericalFailure("non-finite rotation from Kabsch-Umeyama SVD".into()).into());
    }
    let t = centroid_tgt - r * centroid_src;
    Ok(Transform::from_rotation_matrix(r, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn recovers_a_known_rigid_transform() {
        let rotation = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
        let translation = Vector3::new(1.0, 2.0, -0.5);
        let truth = Transform::new(rotation, translation);

        let src = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let tgt: Vec<_> = src.iter().map(|p| truth.transform_point(p)).collect();

        let recovered = kabsch_umeyama(&src, &tgt).unwrap();
        assert_relative_eq!(recovered.translation(), truth.translation(), epsilon = 1e-9);
        assert_relative_eq!(recovered.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_too_few_points() {
        let src = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let tgt = src.clone();
        assert!(kabsch_umeyama(&src, &tgt).is_err());
    }
}
