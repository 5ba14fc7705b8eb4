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

use super::{squared_distance, NearestNeighbors};
use crate::error::{ErrorKind, Result};
use crate::geometry::{Point3, PointCloud};
use nalgebra::RealField;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

struct KdNode<T: RealField + Copy> {
    axis: usize,
    index: usize,
    left: Option<Box<KdNode<T>>>,
    right: Option<Box<KdNode<T>>>,
}

/// Splits on the axis of maximum spread at each node; the median is found
/// by `select_nth_unstable_by`, giving an O(n log n) build and O(log n)
/// average query depth.
#[derive(Default)]
pub struct KdTree<T: RealField + Copy> {
    cloud: Option<Arc<PointCloud<T>>>,
    root: Option<Box<KdNode<T>>>,
}

impl<T: RealField + Copy> KdTree<T> {
    pub fn new() -> Self {
        KdTree {
            cloud: None,
            root: None,
        }
    }

    fn cloud(&self) -> Result<&Arc<PointCloud<T>>> {
        self.cloud
            .as_ref()
            .ok_or_else(|| ErrorKind::InvalidArgument("no input cloud bound".into()).into())
    }

    fn axis_of_max_spread(indices: &[usize], points: &[Point3<T>]) -> usize {
        let seed = points[indices[0]];
        let mut min = [seed.x, seed.y, seed.z];
        let mut max = min;
        for &i in indices {
            let p = points[i];
            for axis in 0..3 {
                let v = p[axis];
                if v < min[axis] {
                    min[axis] = v;
                }
                if v > max[axis] {
                    max[axis] = v;
                }
            }
        }
        let spread = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        (0..3)
            .max_by(|&a, &b| spread[a].partial_cmp(&spread[b]).unwrap_or(Ordering::Equal))
            .unwrap()
    }

    fn build(indices: &mut [usize], points: &[Point3<T>]) -> Option<Box<KdNode<T>>> {
        if indices.is_empty() {
            return None;
        }
        let axis = Self::axis_of_max_spread(indices, points);
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            points[a][axis].partial_cmp(&points[b][axis]).unwrap_or(Ordering::Equal)
        });
        let index = indices[mid];
        let (left_part, rest) = indices.split_at_mut(mid);
        let (_, right_part) = rest.split_at_mut(1);
        let left = Self::build(left_part, points);
        let right = Self::build(right_part, points);
        Some(Box::new(KdNode { axis, index, left, right }))
    }

    fn knn_search(
        node: &KdNode<T>,
        points: &[Point3<T>],
        query: &Point3<T>,
        k: usize,
        heap: &mut BinaryHeap<(OrderedFloat<T>, usize)>,
    ) {
        let d = squared_distance(&points[node.index], query);
        if heap.len() < k {
            heap.push((OrderedFloat(d), node.index));
        } else if let Some(&(worst, _)) = heap.peek() {
            if d < worst.into_inner() {
                heap.pop();
                heap.push((OrderedFloat(d), node.index));
            }
        }

        let diff = query[node.axis] - points[node.index][node.axis];
        let (near, far) = if diff < T::zero() {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };
        if let Some(n) = near {
            Self::knn_search(n, points, query, k, heap);
        }
        let plane_dist = diff * diff;
        let must_check_far = heap.len() < k || heap.peek().is_some_and(|&(w, _)| plane_dist < w.into_inner());
        if must_check_far {
            if let Some(n) = far {
                Self::knn_search(n, points, query, k, heap);
            }
        }
    }

    fn radius_recurse(node: &KdNode<T>, points: &[Point3<T>], query: &Point3<T>, r2: T, out: &mut Vec<(usize, T)>) {
        let d = squared_distance(&points[node.index], query);
        if d <= r2 {
            out.push((node.index, d));
        }
        let diff = query[node.axis] - points[node.index][node.axis];
        let (near, far) = if diff < T::zero() {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };
        if let Some(n) = near {
            Self::radius_recurse(n, points, query, r2, out);
        }
        if diff * diff <= r2 {
            if let Some(n) = far {
                Self::radius_recurse(n, points, query, r2, out);
            }
        }
    }
}

impl<T: RealField + Copy> NearestNeighbors<T> for KdTree<T> {
    fn set_input(&mut self, cloud: Arc<PointCloud<T>>) -> Result<()> {
        let mut indices: Vec<usize> = (0..cloud.len()).collect();
        self.root = Self::build(&mut indices, cloud.points());
        self.cloud = Some(cloud);
        Ok(())
    }

    fn kneighbors(&self, query: &Point3<T>, k: usize) -> Result<Vec<(usize, T)>> {
        let cloud = self.cloud()?;
        if k == 0 || cloud.is_empty() {
            return Ok(Vec::new());
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = &self.root {
            Self::knn_search(root, cloud.points(), query, k, &mut heap);
        }
        let mut result: Vec<(usize, T)> = heap.into_iter().map(|(d, i)| (i, d.into_inner())).collect();
        result.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Ok(result)
    }

    fn radius_search(&self, query: &Point3<T>, radius: T) -> Result<Vec<(usize, T)>> {
        let cloud = self.cloud()?;
        let r2 = radius * radius;
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            Self::radius_recurse(root, cloud.points(), query, r2, &mut out);
        }
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Ok(out)
    }

    fn bound_cloud(&self) -> Option<&Arc<PointCloud<T>>> {
        self.cloud.as_ref()
    }
}
