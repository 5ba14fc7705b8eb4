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

use super::{bind, orthonormal_basis, run_extraction, KeypointExtractor};
use crate::error::{ErrorKind, Result};
use crate::geometry::{KeypointIndexSet, PointCloud};
use crate::knn::NearestNeighbors;
use nalgebra::{Matrix3, RealField, SMatrix, SVector, Vector3};
use std::sync::Arc;

/// Polynomial order used to fit the moving-least-squares surface in a
/// point's tangent plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlsOrder {
    Zero,
    One,
    /// `h = a*u^2 + b*v^2 + c*u*v + d*u + e*v + f`. Saliency adds the
    /// fit's estimated mean curvature `a + b` to the residual variance,
    /// on top of the order-0/1 fit-variation term.
    Two,
}

fn min_neighbors_for(order: MlsOrder, requested: usize) -> usize {
    let floor = if order == MlsOrder::Two { 6 } else { 3 };
    requested.max(floor)
}

/// Fits a low-order surface to the neighborhood projected onto the plane
/// orthogonal to the point's own normal; saliency is the residual variance
/// of that fit, i.e. how far the neighborhood deviates from the fitted
/// surface. Requires normals on the bound cloud.
pub struct MlsExtractor<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    knn: Option<Arc<dyn NearestNeighbors<T>>>,
    parallel: bool,
    concurrency_hint: usize,
    radius: T,
    order: MlsOrder,
    min_neighbors: usize,
    variation_threshold: T,
    nms_radius: T,
}

impl<T: RealField + Copy> MlsExtractor<T> {
    pub fn new(radius: T, order: MlsOrder, min_neighbors: usize, variation_threshold: T, nms_radius: T) -> Self {
        MlsExtractor {
            cloud: None,
            knn: None,
            parallel: false,
            concurrency_hint: num_cpus::get().max(1),
            radius,
            order,
            min_neighbors: min_neighbors_for(order, min_neighbors),
            variation_threshold,
            nms_radius,
        }
    }
}

fn fit_residual_linear<T: RealField + Copy>(samples: &[(T, T, T)]) -> T {
    let n = samples.len();
    let mut ata = Matrix3::<T>::zeros();
    let mut atb = Vector3::<T>::zeros();
    for &(u, v, h) in samples {
        let row = Vector3::new(u, v, T::one());
        ata += row * row.transpose();
        atb += row * h;
    }
    let coeffs = match ata.try_inverse() {
        Some(inv) => inv * atb,
        None => return T::zero(),
    };
    let mut residual = T::zero();
    for &(u, v, h) in samples {
        let pred = coeffs.x * u + coeffs.y * v + coeffs.z;
        residual += (h - pred) * (h - pred);
    }
    residual / T::from_usize(n).unwrap()
}

fn fit_residual_constant<T: RealField + Copy>(samples: &[(T, T, T)]) -> T {
    let n = T::from_usize(samples.len()).unwrap();
    let mean = samples.iter().fold(T::zero(), |acc, s| acc + s.2) / n;
    samples.iter().fold(T::zero(), |acc, s| acc + (s.2 - mean) * (s.2 - mean)) / n
}

/// Fits `h = a*u^2 + b*v^2 + c*u*v + d*u + e*v + f` by least squares and
/// returns `(residual variance, a + b)`, the latter a mean-curvature
/// estimate for a Monge patch with small slope.
fn fit_quadratic<T: RealField + Copy>(samples: &[(T, T, T)]) -> (T, T) {
    let n = samples.len();
    let mut ata = SMatrix::<T, 6, 6>::zeros();
    let mut atb = SVector::<T, 6>::zeros();
    for &(u, v, h) in samples {
        let row = SVector::<T, 6>::new(u * u, v * v, u * v, u, v, T::one());
        ata += row * row.transpose();
        atb += row * h;
    }
    let coeffs = match ata.try_inverse() {
        Some(inv) => inv * atb,
        None => return (T::zero(), T::zero()),
    };
    let mut residual = T::zero();
    for &(u, v, h) in samples {
        let pred = coeffs[0] * u * u + coeffs[1] * v * v + coeffs[2] * u * v + coeffs[3] * u + coeffs[4] * v + coeffs[5];
        residual += (h - pred) * (h - pred);
    }
    (residual / T::from_usize(n).unwrap(), coeffs[0] + coeffs[1])
}

impl<T: RealField + Copy + Send> KeypointExtractor<T> for MlsExtractor<T> {
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
        if !cloud.has_normals() && !cloud.is_empty() {
            return Err(ErrorKind::InvalidArgument("MLS extraction requires normals on the input cloud".into()).into());
        }
        run_extraction(
            &cloud,
            knn.as_ref(),
            self.parallel,
            self.concurrency_hint,
            self.nms_radius,
            |v: T| v >= self.variation_threshold,
            |i| {
                let p = cloud.point(i);
                let normal = cloud.normal(i)?;
                let neighbors = knn.radius_search(&p, self.radius).ok()?;
                if neighbors.len() < self.min_neighbors {
                    return None;
                }
                let (u, v) = orthonormal_basis(normal);
                let samples: Vec<(T, T, T)> = neighbors
                    .iter()
                    .map(|&(j, _)| {
                        let d = cloud.point(j) - p;
                        (d.dot(&u), d.dot(&v), d.dot(&normal))
                    })
                    .collect();
                Some(match self.order {
                    MlsOrder::Zero => fit_residual_constant(&samples),
                    MlsOrder::One => fit_residual_linear(&samples),
                    MlsOrder::Two => {
                        let (residual, curvature) = fit_quadratic(&samples);
                        residual + curvature.abs()
                    }
                })
            },
        )
    }
}
