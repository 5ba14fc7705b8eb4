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

//! Turns two sets of FPFH descriptors into candidate point matches via
//! Lowe's ratio test, with an optional mutual-nearest-neighbor cross-check.

use super::Correspondence;
use crate::features::FpfhSignature;

/// For every source descriptor, finds its nearest and second-nearest target
/// descriptor by L2 distance and keeps the match if `d1 / d2 <= ratio`. With
/// `cross_check` set, a match additionally survives only if the target
/// descriptor's own nearest source descriptor is the one proposing the match.
pub fn generate_correspondences(
    source: &[FpfhSignature<f64>],
    target: &[FpfhSignature<f64>],
    ratio: f64,
    cross_check: bool,
) -> Vec<Correspondence> {
    if source.is_empty() || target.is_empty() {
        return Vec::new();
    }

    let nearest_two = |desc: &FpfhSignature<f64>| -> Option<(usize, f64, f64)> {
        let mut best = (usize::MAX, f64::INFINITY);
        let mut second = f64::INFINITY;
        for (j, t) in target.iter().enumerate() {
            let d = desc.distance(t);
            if d < best.1 {
                second = best.1;
                best = (j, d);
            } else if d < second {
                second = d;
            }
        }
        if best.0 == usize::MAX { None } else { Some((best.0, best.1, second)) }
    };

    let reverse_nearest: Vec<usize> = if cross_check {
        target
            .iter()
            .map(|t_desc| {
                source
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.distance(t_desc).partial_cmp(&b.distance(t_desc)).unwrap())
                    .map(|(i, _)| i)
                    .unwrap_or(usize::MAX)
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut out = Vec::new();
    for (i, desc) in source.iter().enumerate() {
        let Some((j, d1, d2)) = nearest_two(desc) else { continue };
        let passes_ratio = !(d2.is_finite() && d2 > 0.0) || d1 / d2 <= ratio;
        if !passes_ratio {
            continue;
        }
        if cross_check && reverse_nearest.get(j).copied() != Some(i) {
            continue;
        }
        out.push(Correspondence { src_idx: i, dst_idx: j, distance: d1 });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(values: [f64; 33]) -> FpfhSignature<f64> {
        FpfhSignature::from_array(values)
    }

    #[test]
    fn empty_inputs_yield_no_correspondences() {
        assert!(generate_correspondences(&[], &[signature([0.0; 33])], 0.8, false).is_empty());
        assert!(generate_correspondences(&[signature([0.0; 33])], &[], 0.8, false).is_empty());
    }

    #[test]
    fn unambiguous_nearest_match_is_kept() {
        let mut a = [0.0; 33];
        a[0] = 10.0;
        let mut b = [0.0; 33];
        b[0] = 10.1;
        let mut far = [0.0; 33];
        far[0] = 90.0;
        let source = vec![signature(a)];
        let target = vec![signature(b), signature(far)];
        let matches = generate_correspondences(&source, &target, 0.8, false);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].dst_idx, 0);
    }

    #[test]
    fn ambiguous_match_fails_the_ratio_test() {
        let mut a = [0.0; 33];
        a[0] = 10.0;
        let mut b = [0.0; 33];
        b[0] = 11.0;
        let mut c = [0.0; 33];
        c[0] = 11.5;
        let source = vec![signature(a)];
        let target = vec![signature(b), signature(c)];
        assert!(generate_correspondences(&source, &target, 0.8, false).is_empty());
    }

    #[test]
    fn cross_check_rejects_a_one_sided_match() {
        let mut a = [0.0; 33];
        a[0] = 10.0;
        let mut b = [0.0; 33];
        b[0] = 10.2;
        let mut other_source = [0.0; 33];
        other_source[0] = 10.1;
        let source = vec![signature(a), signature(other_source)];
        let target = vec![signature(b)];
        // other_source is actually closer to the single target descriptor,
        // so source[0]'s match does not survive cross-checking.
        let matches = generate_correspondences(&source, &target, 1.0, true);
        assert!(matches.iter().all(|c| c.src_idx != 0));
    }
}
