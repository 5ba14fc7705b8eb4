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

//! 4-Points Congruent Sets registration, with an optional voxel-grid index
//! over the target cloud standing in for Super-4PCS's smart indexing of
//! candidate pairs.

use super::{kabsch_umeyama, RegistrationResult};
use crate::error::{ErrorKind, Result};
use crate::geometry::{covariance_of, symmetric_eigen3, Point3, Transform};
use crate::knn::NearestNeighbors;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FourPcsParams {
    /// Tolerance for matching diagonal lengths and intersection points.
    pub delta: f64,
    /// Expected overlap fraction between the two clouds; informs the
    /// inlier-count target used to rank bases but does not bound the
    /// search.
    pub overlap: f64,
    /// Number of source points used to score each candidate transform.
    pub sample_size: usize,
    /// Number of random coplanar bases to try.
    pub num_bases: usize,
    /// Cap on the number of congruent-pair combinations examined per base,
    /// bounding the otherwise quadratic pair-matching search.
    pub max_iterations: usize,
    /// Build a voxel grid over the target cloud (Super-4PCS's smart
    /// indexing) instead of enumerating all target pairs per base.
    pub smart_indexing: bool,
    pub inlier_threshold: f64,
    pub seed: u64,
}

impl Default for FourPcsParams {
    fn default() -> Self {
        FourPcsParams {
            delta: 0.05,
            overlap: 0.5,
            sample_size: 200,
            num_bases: 50,
            max_iterations: 400,
            smart_indexing: true,
            inlier_threshold: 0.05,
            seed: 0,
        }
    }
}

struct VoxelGrid {
    resolution: f64,
    buckets: HashMap<(i64, i64, i64), Vec<usize>>,
}

impl VoxelGrid {
    fn build(points: &[Point3<f64>], resolution: f64) -> Self {
        let mut buckets: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            buckets.entry(Self::key(p, resolution)).or_default().push(i);
        }
        VoxelGrid { resolution, buckets }
    }

    fn key(p: &Point3<f64>, resolution: f64) -> (i64, i64, i64) {
        ((p.x / resolution).floor() as i64, (p.y / resolution).floor() as i64, (p.z / resolution).floor() as i64)
    }

    fn neighbors_within(&self, p: &Point3<f64>, radius: f64) -> Vec<usize> {
        let cell_radius = (radius / self.resolution).ceil() as i64 + 1;
        let (cx, cy, cz) = Self::key(p, self.resolution);
        let mut out = Vec::new();
        for dx in -cell_radius..=cell_radius {
            for dy in -cell_radius..=cell_radius {
                for dz in -cell_radius..=cell_radius {
                    if let Some(v) = self.buckets.get(&(cx + dx, cy + dy, cz + dz)) {
                        out.extend_from_slice(v);
                    }
                }
            }
        }
        out
    }
}

fn candidate_pairs_for_distance(points: &[Point3<f64>], target_dist: f64, delta: f64, grid: Option<&VoxelGrid>) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    match grid {
        Some(g) => {
            for i in 0..points.len() {
                for j in g.neighbors_within(&points[i], target_dist + delta) {
                    if j <= i {
                        continue;
                    }
                    let d = (points[i] - points[j]).norm();
                    if (d - target_dist).abs() <= delta {
                        out.push((i, j));
                    }
                }
            }
        }
        None => {
            for i in 0..points.len() {
                for j in (i + 1)..points.len() {
                    let d = (points[i] - points[j]).norm();
                    if (d - target_dist).abs() <= delta {
                        out.push((i, j));
                    }
                }
            }
        }
    }
    out
}

/// Solves `a + t*(b-a) = c + s*(d-c)` for the 2D segment parameters `t, s`.
fn intersection_params(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> Option<(f64, f64)> {
    let (ux, uy) = (b.0 - a.0, b.1 - a.1);
    let (vx, vy) = (d.0 - c.0, d.1 - c.1);
    let (wx, wy) = (c.0 - a.0, c.1 - a.1);
    let denom = ux * (-vy) - (-vx) * uy;
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = (wx * (-vy) - (-vx) * wy) / denom;
    let s = (ux * wy - uy * wx) / denom;
    Some((t, s))
}

/// Finds 3 random source points that are not near-collinear, then picks
/// whichever remaining source point sits closest to their plane, producing
/// an (approximately) coplanar 4-point base.
fn pick_coplanar_base(rng: &mut impl rand::Rng, source: &[Point3<f64>]) -> Option<[usize; 4]> {
    let n = source.len();
    if n < 4 {
        return None;
    }
    let idx = rand::seq::index::sample(rng, n, 3).into_vec();
    let (i0, i1, i2) = (idx[0], idx[1], idx[2]);
    let (p0, p1, p2) = (source[i0], source[i1], source[i2]);
    let normal = (p1 - p0).cross(&(p2 - p0));
    let norm = normal.norm();
    if norm <= 1e-9 {
        return None;
    }
    let normal = normal / norm;
    let mut best_j = None;
    let mut best_dist = f64::INFINITY;
    for j in 0..n {
        if j == i0 || j == i1 || j == i2 {
            continue;
        }
        let dist = (source[j] - p0).dot(&normal).abs();
        if dist < best_dist {
            best_dist = dist;
            best_j = Some(j);
        }
    }
    best_j.map(|j| [i0, i1, i2, j])
}

/// Projects the 4 base points onto their own best-fit plane, then finds
/// whichever of the three ways to pair 4 points into two diagonals actually
/// crosses, returning the affine ratios along each diagonal and the source
/// indices in `(diag_a_start, diag_a_end, diag_b_start, diag_b_end)` order.
fn diagonal_pairing(base: &[usize; 4], source: &[Point3<f64>]) -> Option<((f64, f64), (usize, usize, usize, usize))> {
    let points: Vec<Point3<f64>> = base.iter().map(|&i| source[i]).collect();
    let centroid = Point3::from(points.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / 4.0);
    let cov = covariance_of(&points, centroid)?;
    let (_, vectors) = symmetric_eigen3(cov)?;
    let u = vectors.column(2).into_owned();
    let v = vectors.column(1).into_owned();
    let proj: Vec<(f64, f64)> = points
        .iter()
        .map(|p| {
            let d = p - centroid;
            (d.dot(&u), d.dot(&v))
        })
        .collect();

    let pairings = [(0usize, 2usize, 1usize, 3usize), (0, 1, 2, 3), (0, 3, 1, 2)];
    for &(da, db, dc, dd) in &pairings {
        if let Some((t, s)) = intersection_params(proj[da], proj[db], proj[dc], proj[dd]) {
            if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&s) {
                return Some(((t, s), (base[da], base[db], base[dc], base[dd])));
            }
        }
    }
    None
}

fn score_transform(
    transform: &Transform,
    source_sample: &[Point3<f64>],
    target_knn: &dyn NearestNeighbors<f64>,
    threshold: f64,
) -> Result<(usize, f64)> {
    let mut inliers = 0usize;
    let mut sum_sq = 0.0;
    for p in source_sample {
        let q = transform.transform_point(p);
        let hits = target_knn.kneighbors(&q, 1)?;
        if let Some(&(_, sq_dist)) = hits.first() {
            if sq_dist.sqrt() <= threshold {
                inliers += 1;
                sum_sq += sq_dist;
            }
        }
    }
    let fitness = if inliers > 0 { sum_sq / inliers as f64 } else { f64::INFINITY };
    Ok((inliers, fitness))
}

/// Searches for a rigid transform aligning `source` onto `target` by
/// matching random near-coplanar 4-point bases in `source` against
/// congruent 4-point sets in `target`, found via matching pairwise
/// distances (the two base diagonals) within `delta` and confirming the
/// affine-ratio intersection points coincide. `target_knn` must be bound to
/// a cloud whose points are `target` in the same order.
pub fn four_pcs_register(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    target_knn: &dyn NearestNeighbors<f64>,
    params: &FourPcsParams,
) -> Result<RegistrationResult> {
    if source.len() < 4 || target.len() < 4 {
        return Err(ErrorKind::NoSolution("need at least 4 points in each cloud".into()).into());
    }

    let grid = if params.smart_indexing { Some(VoxelGrid::build(target, params.delta.max(1e-6))) } else { None };

    let mut scoring_rng = crate::rng::task_rng(params.seed, 0);
    let sample_n = params.sample_size.min(source.len());
    let scoring_sample_idx: Vec<usize> = rand::seq::index::sample(&mut scoring_rng, source.len(), sample_n).into_vec();
    let scoring_sample: Vec<Point3<f64>> = scoring_sample_idx.iter().map(|&i| source[i]).collect();

    let mut best: Option<(Transform, usize, f64)> = None;
    let mut bases_tried = 0usize;
    let mut matches_tried = 0usize;

    'bases: for base_attempt in 0..params.num_bases.max(1) {
        let mut rng = crate::rng::task_rng(params.seed, (base_attempt + 1) as u64);
        let Some(base) = pick_coplanar_base(&mut rng, source) else { continue };
        let Some(((r1, r2), (ia, ib, ic, id))) = diagonal_pairing(&base, source) else { continue };
        bases_tried += 1;

        let (pa, pb, pc, pd) = (source[ia], source[ib], source[ic], source[id]);
        let d_ab = (pa - pb).norm();
        let d_cd = (pc - pd).norm();

        let pairs_ab = candidate_pairs_for_distance(target, d_ab, params.delta, grid.as_ref());
        let pairs_cd = candidate_pairs_for_distance(target, d_cd, params.delta, grid.as_ref());
        if pairs_ab.is_empty() || pairs_cd.is_empty() {
            continue;
        }

        for &(ta0, ta1) in &pairs_ab {
            for &(a_idx, b_idx) in &[(ta0, ta1), (ta1, ta0)] {
                let (ta, tb) = (target[a_idx], target[b_idx]);
                let x1 = ta + (tb - ta) * r1;
                for &(tc0, tc1) in &pairs_cd {
                    for &(c_idx, d_idx) in &[(tc0, tc1), (tc1, tc0)] {
                        if matches_tried >= params.max_iterations {
                            break 'bases;
                        }
                        matches_tried += 1;
                        let (tc, td) = (target[c_idx], target[d_idx]);
                        let x2 = tc + (td - tc) * r2;
                        if (x1 - x2).norm() > params.delta {
                            continue;
                        }

                        let src_pts = [pa, pb, pc, pd];
                        let tgt_pts = [ta, tb, tc, td];
                        let Ok(candidate) = kabsch_umeyama(&src_pts, &tgt_pts) else { continue };
                        let Ok((inliers, fitness)) = score_transform(&candidate, &scoring_sample, target_knn, params.inlier_threshold) else { continue };

                        let better = match &best {
                            None => true,
                            Some((_, best_inliers, best_fitness)) => inliers > *best_inliers || (inliers == *best_inliers && fitness < *best_fitness),
                        };
                        if better {
                            best = Some((candidate, inliers, fitness));
                        }
                    }
                }
            }
        }
    }

    let Some((transform, inliers, fitness)) = best else {
        let reason = if bases_tried == 0 {
            "no coplanar base with intersecting diagonals was found"
        } else {
            "no congruent base in the target cloud matched any sampled base"
        };
        return Err(ErrorKind::NoSolution(reason.into()).into());
    };

    let min_expected = ((params.overlap * scoring_sample.len() as f64) * 0.1).max(1.0) as usize;
    Ok(RegistrationResult {
        transform,
        inliers: (0..inliers).collect(),
        fitness,
        converged: inliers >= min_expected,
        history: Vec::new(),
        reason: format!("best of {bases_tried} bases, {matches_tried} congruent-pair combinations examined"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointCloud;
    use crate::knn::BruteForce;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::sync::Arc;

    fn grid_cloud(n_side: i32) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for x in 0..n_side {
            for y in 0..n_side {
                for z in 0..2 {
                    points.push(Point3::new(x as f64 * 0.3, y as f64 * 0.3, z as f64 * 0.3));
                }
            }
        }
        points
    }

    #[test]
    fn aligns_a_rotated_translated_grid() {
        let source = grid_cloud(12);
        let truth = Transform::new(UnitQuaternion::from_euler_angles(0.1, 0.05, -0.08), Vector3::new(0.4, -0.2, 0.1));
        let target: Vec<Point3<f64>> = source.iter().map(|p| truth.transform_point(p)).collect();
        let target_cloud = Arc::new(PointCloud::new(target.clone()));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&target_cloud)).unwrap();

        let params = FourPcsParams { delta: 0.02, num_bases: 40, max_iterations: 300, sample_size: 100, seed: 7, ..Default::default() };
        let result = four_pcs_register(&source, &target, &knn, &params).unwrap();
        assert!(result.fitness < 0.01);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let source = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let target = source.clone();
        let target_cloud = Arc::new(PointCloud::new(target.clone()));
        let mut knn = BruteForce::new();
        knn.set_input(Arc::clone(&target_cloud)).unwrap();
        let params = FourPcsParams::default();
        assert!(four_pcs_register(&source, &target, &knn, &params).is_err());
    }
}
