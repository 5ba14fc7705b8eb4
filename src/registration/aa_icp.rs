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

//! Anderson-accelerated ICP. Treats one plain ICP step as a fixed-point
//! map `F` over the 12 free parameters of a 3x4 affine transform, then
//! extrapolates from a short window of past iterates and residuals the way
//! Anderson acceleration does for any fixed-point iteration, re-projecting
//! the extrapolated affine block back onto SO(3) and falling back to the
//! plain ICP step whenever the extrapolated candidate looks unstable or
//! worse.

use super::icp::{icp_step, mean_sq_residual};
use super::{RegistrationIterationState, RegistrationResult};
use crate::error::{ErrorKind, Result};
use crate::geometry::{PointCloud, Point3, Transform};
use crate::knn::NearestNeighbors;
use nalgebra::Matrix3;

#[derive(Debug, Clone)]
pub struct AaIcpParams {
    /// Anderson memory depth `m`: how many past (iterate, residual) pairs
    /// feed the least-squares extrapolation.
    pub memory: usize,
    pub max_iterations: usize,
    pub max_correspondence_distance: f64,
    pub transform_epsilon: f64,
    pub error_epsilon: f64,
    /// Clamp applied to the extrapolation coefficients' Euclidean norm.
    pub gamma_norm_clamp: f64,
    /// Acceptable range for the extrapolated affine block's Frobenius norm.
    pub finite_norm_band: (f64, f64),
    /// How far the extrapolated affine block's determinant may stray from 1
    /// before the candidate is rejected as unstable.
    pub determinant_tolerance: f64,
    pub translation_norm_bound: f64,
    /// A candidate is rejected in favor of the plain ICP step if its error
    /// exceeds the plain step's error by more than this fraction.
    pub damping_fraction: f64,
    /// Optional fixed convex blend toward the plain ICP result, applied
    /// after the stability safeguards.
    pub damping_beta: Option<f64>,
}

impl Default for AaIcpParams {
    fn default() -> Self {
        AaIcpParams {
            memory: 4,
            max_iterations: 100,
            max_correspondence_distance: 1.0,
            transform_epsilon: 1e-8,
            error_epsilon: 1e-10,
            gamma_norm_clamp: 10.0,
            finite_norm_band: (1e-6, 1e6),
            determinant_tolerance: 0.1,
            translation_norm_bound: 100.0,
            damping_fraction: 0.1,
            damping_beta: None,
        }
    }
}

type X = [f64; 12];

fn transform_to_x(t: &Transform) -> X {
    let r = t.rotation().to_rotation_matrix().into_inner();
    let tr = t.translation();
    [
        r[(0, 0)], r[(0, 1)], r[(0, 2)],
        r[(1, 0)], r[(1, 1)], r[(1, 2)],
        r[(2, 0)], r[(2, 1)], r[(2, 2)],
        tr.x, tr.y, tr.z,
    ]
}

fn x_to_affine(x: &X) -> (Matrix3<f64>, nalgebra::Vector3<f64>) {
    let a = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], x[8]);
    let t = nalgebra::Vector3::new(x[9], x[10], x[11]);
    (a, t)
}

fn add(a: &X, b: &X) -> X {
    let mut out = [0.0; 12];
    for i in 0..12 {
        out[i] = a[i] + b[i];
    }
    out
}

fn sub(a: &X, b: &X) -> X {
    let mut out = [0.0; 12];
    for i in 0..12 {
        out[i] = a[i] - b[i];
    }
    out
}

fn scale(a: &X, s: f64) -> X {
    let mut out = [0.0; 12];
    for i in 0..12 {
        out[i] = a[i] * s;
    }
    out
}

fn dot(a: &X, b: &X) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(a: &X) -> f64 {
    dot(a, a).sqrt()
}

/// Re-projects the affine block of `x` onto SO(3) via SVD, the same
/// determinant-corrected construction [`super::kabsch_umeyama`] uses, and
/// builds the resulting rigid transform.
fn project_to_transform(x: &X) -> Result<Transform> {
    let (a, t) = x_to_affine(x);
    if !a.iter().chain(t.iter()).all(|v| v.is_finite()) {
        return Err(ErrorKind::NumericalFailure("non-finite AA-ICP candidate".into()).into());
    }
    let svd = nalgebra::linalg::SVD::new(a, true, true);
    let u = svd.u.ok_or_else(|| ErrorKind::NumericalFailure("SVD of an AA-ICP candidate produced no U".into()))?;
    let v_t = svd.v_t.ok_or_else(|| ErrorKind::NumericalFailure("SVD of an AA-ICP candidate produced no V^T".into()))?;
    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant();
    let correction = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, if d < 0.0 { -1.0 } else { 1.0 });
    let r = v * correction * u.transpose();
    Ok(Transform::from_rotation_matrix(r, t))
}

fn passes_safeguards(x: &X, params: &AaIcpParams) -> bool {
    if x.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let (a, t) = x_to_affine(x);
    let n = a.norm();
    if n < params.finite_norm_band.0 || n > params.finite_norm_band.1 {
        return false;
    }
    let det = a.determinant();
    if (det - 1.0).abs() > params.determinant_tolerance {
        return false;
    }
    t.norm() <= params.translation_norm_bound
}

/// Minimizes `||sum_i gamma_i * cols[i] + b||^2` over `gamma` via the normal
/// equations, solved by Gaussian elimination with partial pivoting. `cols`
/// is small (bounded by the memory depth), so this is cheap relative to the
/// ICP step itself.
fn solve_least_squares(cols: &[X], b: &X) -> Vec<f64> {
    let m = cols.len();
    let mut a = vec![vec![0.0; m]; m];
    let mut rhs = vec![0.0; m];
    for i in 0..m {
        for j in 0..m {
            a[i][j] = dot(&cols[i], &cols[j]);
        }
        rhs[i] = -dot(&cols[i], b);
    }
    for i in 0..m {
        let mut pivot = i;
        for r in (i + 1)..m {
            if a[r][i].abs() > a[pivot][i].abs() {
                pivot = r;
            }
        }
        a.swap(i, pivot);
        rhs.swap(i, pivot);
        if a[i][i].abs() < 1e-12 {
            continue;
        }
        for r in (i + 1)..m {
            let factor = a[r][i] / a[i][i];
            for c in i..m {
                a[r][c] -= factor * a[i][c];
            }
            rhs[r] -= factor * rhs[i];
        }
    }
    let mut gamma = vec![0.0; m];
    for i in (0..m).rev() {
        if a[i][i].abs() < 1e-12 {
            gamma[i] = 0.0;
            continue;
        }
        let mut sum = rhs[i];
        for c in (i + 1)..m {
            sum -= a[i][c] * gamma[c];
        }
        gamma[i] = sum / a[i][i];
    }
    gamma
}

/// Runs Anderson-accelerated ICP from `initial` until the iteration budget
/// is exhausted or the transform/error change drops below its epsilon.
pub fn aa_icp_register(
    source: &[Point3<f64>],
    target: &PointCloud<f64>,
    target_knn: &dyn NearestNeighbors<f64>,
    initial: Transform,
    params: &AaIcpParams,
) -> Result<RegistrationResult> {
    let mut x = transform_to_x(&initial);
    // (x_k, g_k) pairs, oldest first, truncated to `memory + 1` entries.
    let mut pairs: Vec<(X, X)> = Vec::new();
    let mut history = Vec::new();
    let mut prev_error = f64::INFINITY;
    let mut converged = false;
    let mut reason = "iteration budget exhausted".to_string();

    for iter in 0..params.max_iterations {
        let current_transform = project_to_transform(&x).unwrap_or(Transform::identity());
        let (x_icp_transform, icp_error, src_matched, tgt_matched) =
            icp_step(source, target, target_knn, &current_transform, params.max_correspondence_distance)?;
        let x_icp = transform_to_x(&x_icp_transform);
        let g = sub(&x_icp, &x);

        pairs.push((x, g));
        if pairs.len() > params.memory + 1 {
            pairs.remove(0);
        }
        let l = pairs.len();
        let m_k = (l - 1).min(params.memory);

        let mut candidate = add(&x, &g);
        if m_k > 0 {
            let g_cols: Vec<X> = (0..m_k).map(|i| sub(&g, &pairs[l - 2 - i].1)).collect();
            let mut gamma = solve_least_squares(&g_cols, &g);
            let gnorm = gamma.iter().map(|v| v * v).sum::<f64>().sqrt();
            if gnorm > params.gamma_norm_clamp && gnorm > 0.0 {
                let scale_factor = params.gamma_norm_clamp / gnorm;
                for v in gamma.iter_mut() {
                    *v *= scale_factor;
                }
            }
            for i in 0..m_k {
                let dx = sub(&pairs[l - 1 - i].0, &pairs[l - 2 - i].0);
                let dg = sub(&pairs[l - 1 - i].1, &pairs[l - 2 - i].1);
                let term = add(&dx, &dg);
                candidate = sub(&candidate, &scale(&term, gamma[i]));
            }
        }

        let stable = passes_safeguards(&candidate, params);
        let candidate_transform = if stable { project_to_transform(&candidate).ok() } else { None };
        let candidate_error = candidate_transform.as_ref().map(|t| mean_sq_residual(&src_matched, &tgt_matched, t));

        let (next_x, fell_back) = match candidate_error {
            Some(err) if err <= icp_error * (1.0 + params.damping_fraction) => (candidate, false),
            _ => (x_icp, true),
        };
        if fell_back {
            pairs.clear();
        }

        let next_x = match params.damping_beta {
            Some(beta) => add(&scale(&next_x, 1.0 - beta), &scale(&x_icp, beta)),
            None => next_x,
        };

        let next_transform = project_to_transform(&next_x).unwrap_or(x_icp_transform);
        let final_error = mean_sq_residual(&src_matched, &tgt_matched, &next_transform);
        let error_change = (final_error - prev_error).abs();
        let transform_change = norm(&sub(&next_x, &x));

        history.push(RegistrationIterationState {
            iteration: iter,
            transform: next_transform,
            error: final_error,
            error_change,
            correspondence_count: src_matched.len(),
        });

        x = next_x;
        prev_error = final_error;

        if iter > 0 && transform_change < params.transform_epsilon {
            converged = true;
            reason = "transform change below epsilon".into();
            break;
        }
        if iter > 0 && error_change < params.error_epsilon {
            converged = true;
            reason = "error change below epsilon".into();
            break;
        }
    }

    let final_transform = project_to_transform(&x).unwrap_or(initial);
    Ok(RegistrationResult {
        transform: final_transform,
        inliers: Vec::new(),
        fitness: prev_error,
        converged,
        history,
        reason,
    })
}
