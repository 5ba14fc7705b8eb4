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

//! Shared symmetric 3x3 eigendecomposition used by every saliency-based
//! keypoint extractor (curvature, ISS, Harris3D, MLS) and by normal
//! estimation in the FPFH descriptor.

use nalgebra::{linalg::SymmetricEigen, Matrix3, Point3, RealField};

/// The (unbiased) covariance matrix of a neighborhood around `center`.
/// Returns `None` for a neighborhood with fewer than 2 points, since a
/// covariance is not meaningful there.
pub fn covariance_of<T: RealField + Copy>(
    neighbors: &[Point3<T>],
    center: Point3<T>,
) -> Option<Matrix3<T>> {
    if neighbors.len() < 2 {
        return None;
    }
    let mut cov = Matrix3::<T>::zeros();
    for p in neighbors {
        let d = p - center;
        cov += d * d.transpose();
    }
    let n = T::from_usize(neighbors.len()).unwrap();
    Some(cov / n)
}

/// Eigenvalues (ascending) and corresponding eigenvectors (columns, same
/// order) of a symmetric 3x3 matrix. Returns `None` if the decomposition is
/// degenerate (produces non-finite values) — callers should skip the point
/// rather than propagate NaNs.
pub fn symmetric_eigen3<T: RealField + Copy>(m: Matrix3<T>) -> Option<(Vector3Sorted<T>, Matrix3<T>)> {
    let eigen = SymmetricEigen::new(m);
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let values = nalgebra::Vector3::new(
        eigen.eigenvalues[idx[0]],
        eigen.eigenvalues[idx[1]],
        eigen.eigenvalues[idx[2]],
    );
    if !values.iter().all(|v| v.is_finite()) {
        return None;
    }
    let vectors = Matrix3::from_columns(&[
        eigen.eigenvectors.column(idx[0]).into_owned(),
        eigen.eigenvectors.column(idx[1]).into_owned(),
        eigen.eigenvectors.column(idx[2]).into_owned(),
    ]);
    Some((Vector3Sorted(values), vectors))
}

/// Eigenvalues sorted ascending: `.0 <= .1 <= .2`.
#[derive(Debug, Clone, Copy)]
pub struct Vector3Sorted<T: RealField + Copy>(nalgebra::Vector3<T>);

impl<T: RealField + Copy> Vector3Sorted<T> {
    /// Smallest eigenvalue, i.e. `lambda_min`.
    pub fn smallest(&self) -> T {
        self.0.x
    }

    /// Middle eigenvalue.
    pub fn mid(&self) -> T {
        self.0.y
    }

    /// Largest eigenvalue, i.e. `lambda_max`.
    pub fn largest(&self) -> T {
        self.0.z
    }

    /// Eigenvalues in *decreasing* order `(lambda_0, lambda_1, lambda_2)`,
    /// the convention used by the ISS saliency ratio test.
    pub fn decreasing(&self) -> (T, T, T) {
        (self.0.z, self.0.y, self.0.x)
    }

    pub fn sum(&self) -> T {
        self.0.x + self.0.y + self.0.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn planar_neighborhood_has_near_zero_smallest_eigenvalue() {
        let center = Point3::new(0.0_f64, 0.0, 0.0);
        let neighbors = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
        ];
        let cov = covariance_of(&neighbors, center).unwrap();
        let (eig, _) = symmetric_eigen3(cov).unwrap();
        assert_relative_eq!(eig.smallest(), 0.0, epsilon = 1e-9);
        assert!(eig.mid() > 0.0);
        assert!(eig.largest() > 0.0);
    }

    #[test]
    fn single_neighbor_has_no_covariance() {
        let center = Point3::new(0.0_f64, 0.0, 0.0);
        assert!(covariance_of(&[Point3::new(1.0, 0.0, 0.0)], center).is_none());
    }
}
