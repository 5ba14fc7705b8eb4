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

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

/// A 4x4 rigid homogeneous transform: an orthonormal 3x3 rotation of
/// determinant +1, plus a translation.
///
/// Backed by `nalgebra::Isometry3` whose rotation is always a
/// `UnitQuaternion`, so orthonormality and determinant +1 are guaranteed by
/// construction rather than checked after the fact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(Isometry3<f64>);

impl Transform {
    pub fn identity() -> Self {
        Transform(Isometry3::identity())
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Transform(Isometry3::from_parts(Translation3::from(translation), rotation))
    }

    pub fn from_isometry(isometry: Isometry3<f64>) -> Self {
        Transform(isometry)
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.0
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.0.rotation
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.translation.vector
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.0 * p
    }

    pub fn inverse(&self) -> Transform {
        Transform(self.0.inverse())
    }

    pub fn then(&self, other: &Transform) -> Transform {
        Transform(other.0 * self.0)
    }

    /// The 4x4 homogeneous matrix form of this transform.
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        self.0.to_homogeneous()
    }

    pub fn from_matrix4_unchecked(m: &Matrix4<f64>) -> Transform {
        let rotation_block = m.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Transform::from_rotation_matrix(rotation_block, translation)
    }

    /// Builds a `Transform` from a (possibly not-quite-orthonormal) 3x3
    /// rotation block, re-orthonormalizing it via `UnitQuaternion`'s
    /// from-matrix projection.
    pub fn from_rotation_matrix(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Transform {
        let rotation = UnitQuaternion::from_matrix(&rotation);
        Transform::new(rotation, translation)
    }

    /// Orthonormality error `||R^T R - I||_F`, which should stay near zero
    /// for any transform built through this type's constructors.
    pub fn orthonormality_error(&self) -> f64 {
        let r = self.0.rotation.to_rotation_matrix().into_inner();
        (r.transpose() * r - Matrix3::identity()).norm()
    }

    pub fn determinant(&self) -> f64 {
        self.0.rotation.to_rotation_matrix().into_inner().determinant()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_is_orthonormal_with_det_one() {
        let t = Transform::identity();
        assert_relative_eq!(t.orthonormality_error(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(t.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn round_trips_through_matrix4() {
        let rotation = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let translation = Vector3::new(1.0, 2.0, 3.0);
        let t = Transform::new(rotation, translation);
        let m = t.to_matrix4();
        let back = Transform::from_matrix4_unchecked(&m);
        assert_relative_eq!(back.translation(), t.translation(), epsilon = 1e-9);
        assert_relative_eq!(back.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn inverse_undoes_transform() {
        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3);
        let translation = Vector3::new(1.0, -2.0, 0.5);
        let t = Transform::new(rotation, translation);
        let p = Point3::new(3.0, 4.0, 5.0);
        let round_tripped = t.inverse().transform_point(&t.transform_point(&p));
        assert_relative_eq!(round_tripped, p, epsilon = 1e-9);
    }
}
