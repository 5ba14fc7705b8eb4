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

//! RANSAC rigid registration over a correspondence list, with an adaptive
//! iteration budget and per-iteration task-local RNG.

use super::{kabsch_umeyama, Correspondence, RegistrationResult};
use crate::error::{ErrorKind, Result};
use crate::geometry::{Point3, Transform};

#[derive(Debug, Clone)]
pub struct RansacParams {
    pub max_iterations: usize,
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub confidence: f64,
    pub sample_size: usize,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        RansacParams {
            max_iterations: 2000,
            inlier_threshold: 0.05,
            min_inliers: 3,
            confidence: 0.99,
            sample_size: 3,
            seed: 0,
        }
    }
}

fn score(
    transform: &Transform,
    source_keypoints: &[Point3<f64>],
    target_keypoints: &[Point3<f64>],
    correspondences: &[Correspondence],
    threshold: f64,
) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut sum_sq = 0.0;
    for (k, c) in correspondences.iter().enumerate() {
        let p = transform.transform_point(&source_keypoints[c.src_idx]);
        let residual = (p - target_keypoints[c.dst_idx]).norm();
        if residual <= threshold {
            inliers.push(k);
            sum_sq += residual * residual;
        }
    }
    let fitness = if inliers.is_empty() { f64::INFINITY } else { sum_sq / inliers.len() as f64 };
    (inliers, fitness)
}

fn refit(
    inliers: &[usize],
    source_keypoints: &[Point3<f64>],
    target_keypoints: &[Point3<f64>],
    correspondences: &[Correspondence],
) -> Option<Transform> {
    if inliers.len() < 3 {
        return None;
    }
    let src: Vec<Point3<f64>> = inliers.iter().map(|&k| source_keypoints[correspondences[k].src_idx]).collect();
    let tgt: Vec<Point3<f64>> = inliers.iter().map(|&k| target_keypoints[correspondences[k].dst_idx]).collect();
    kabsch_umeyama(&src, &tgt).ok()
}

/// Samples minimal sets of `sample_size` correspondences, estimates a rigid
/// transform via Kabsch-Umeyama, and keeps the hypothesis with the most
/// inliers (ties broken by lower fitness). The iteration budget shrinks
/// adaptively as `N = log(1 - confidence) / log(1 - w^sample_size)` once a
/// non-trivial inlier ratio `w` is observed. Each sampling round draws its
/// own task-local RNG seeded from `seed` and the round index, so repeated
/// runs with the same seed are reproducible regardless of how rounds are
/// scheduled.
pub fn ransac_register(
    source_keypoints: &[Point3<f64>],
    target_keypoints: &[Point3<f64>],
    correspondences: &[Correspondence],
    params: &RansacParams,
) -> Result<RegistrationResult> {
    if correspondences.len() < params.sample_size {
        return Err(ErrorKind::NoSolution("not enough correspondences to sample a minimal set".into()).into());
    }

    let mut best: Option<(Transform, Vec<usize>, f64)> = None;
    let mut budget = params.max_iterations;
    let mut iter = 0usize;

    while iter < budget {
        let mut rng = crate::rng::task_rng(params.seed, iter as u64);
        let sample: Vec<usize> = rand::seq::index::sample(&mut rng, correspondences.len(), params.sample_size).into_vec();

        let src_pts: Vec<Point3<f64>> = sample.iter().map(|&k| source_keypoints[correspondences[k].src_idx]).collect();
        let tgt_pts: Vec<Point3<f64>> = sample.iter().map(|&k| target_keypoints[correspondences[k].dst_idx]).collect();

        let candidate = match kabsch_umeyama(&src_pts, &tgt_pts) {
            Ok(t) => t,
            Err(_) => {
                iter += 1;
                continue;
            }
        };

        let (inliers, fitness) = score(&candidate, source_keypoints, target_keypoints, correspondences, params.inlier_threshold);
        let better = match &best {
            None => true,
            Some((_, best_inliers, best_fitness)) => {
                inliers.len() > best_inliers.len() || (inliers.len() == best_inliers.len() && fitness < *best_fitness)
            }
        };
        if better {
            let w = inliers.len() as f64 / correspondences.len() as f64;
            best = Some((candidate, inliers, fitness));
            if w > 0.0 && w < 1.0 {
                let denom = (1.0 - w.powf(params.sample_size as f64)).ln();
                if denom < 0.0 {
                    let needed = ((1.0 - params.confidence).ln() / denom).ceil();
                    if needed.is_finite() {
                        let needed = needed.max(1.0) as usize;
                        budget = budget.min(needed);
                    }
                }
            }
        }
        iter += 1;
    }

    let Some((transform, inliers, fitness)) = best else {
        return Err(ErrorKind::NoSolution("RANSAC produced no valid hypothesis".into()).into());
    };
    if inliers.len() < params.min_inliers {
        return Err(ErrorKind::NoSolution("best RANSAC hypothesis did not reach the minimum inlier count".into()).into());
    }

    let refined = refit(&inliers, source_keypoints, target_keypoints, correspondences).unwrap_or(transform);
    let (final_inliers, final_fitness) = score(&refined, source_keypoints, target_keypoints, correspondences, params.inlier_threshold);
    let _ = fitness;

    Ok(RegistrationResult {
        transform: refined,
        inliers: final_inliers,
        fitness: final_fitness,
        converged: true,
        history: Vec::new(),
        reason: "reached the minimum inlier count".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn recovers_a_transform_with_planted_inliers_and_outliers() {
        let truth = Transform::new(UnitQuaternion::from_euler_angles(0.05, 0.02, -0.1), Vector3::new(0.3, -0.1, 0.2));
        let mut source = Vec::new();
        let mut target = Vec::new();
        let mut correspondences = Vec::new();
        for i in 0..30 {
            let p = Point3::new(i as f64 * 0.1, (i as f64 * 0.3).sin(), (i as f64 * 0.2).cos());
            source.push(p);
            target.push(truth.transform_point(&p));
            correspondences.push(Correspondence { src_idx: i, dst_idx: i, distance: 0.0 });
        }
        // plant a handful of outliers by scrambling some target indices
        for i in (0..30).step_by(7) {
            correspondences[i].dst_idx = (i + 15) % 30;
        }

        let params = RansacParams { max_iterations: 500, inlier_threshold: 0.01, min_inliers: 10, confidence: 0.999, sample_size: 3, seed: 42 };
        let result = ransac_register(&source, &target, &correspondences, &params).unwrap();
        assert!(result.inliers.len() >= 20);
        assert!(result.fitness < 1e-6);
    }

    #[test]
    fn too_few_correspondences_is_an_error() {
        let source = vec![Point3::new(0.0, 0.0, 0.0)];
        let target = vec![Point3::new(0.0, 0.0, 0.0)];
        let correspondences = vec![Correspondence { src_idx: 0, dst_idx: 0, distance: 0.0 }];
        let params = RansacParams::default();
        assert!(ransac_register(&source, &target, &correspondences, &params).is_err());
    }
}
