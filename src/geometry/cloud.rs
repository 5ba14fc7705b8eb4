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

use crate::error::{ErrorKind, Result};
use nalgebra::{Point3, RealField, Vector3};
use std::sync::Arc;

/// An ordered sequence of points plus optional equal-length normals and
/// colors. The cloud is the unit of ownership; downstream components only
/// ever borrow it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud<T: RealField + Copy> {
    points: Vec<Point3<T>>,
    normals: Option<Vec<Vector3<T>>>,
    colors: Option<Vec<[u8; 3]>>,
}

impl<T: RealField + Copy> PointCloud<T> {
    pub fn new(points: Vec<Point3<T>>) -> Self {
        PointCloud {
            points,
            normals: None,
            colors: None,
        }
    }

    pub fn with_normals(points: Vec<Point3<T>>, normals: Vec<Vector3<T>>) -> Result<Self> {
        if normals.len() != points.len() {
            return Err(ErrorKind::InvalidArgument(format!(
                "normals length {} does not match point count {}",
                normals.len(),
                points.len()
            ))
            .into());
        }
        Ok(PointCloud {
            points,
            normals: Some(normals),
            colors: None,
        })
    }

    pub fn set_normals(&mut self, normals: Vec<Vector3<T>>) -> Result<()> {
        if normals.len() != self.points.len() {
            return Err(ErrorKind::InvalidArgument(format!(
                "normals length {} does not match point count {}",
                normals.len(),
                self.points.len()
            ))
            .into());
        }
        self.normals = Some(normals);
        Ok(())
    }

    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) -> Result<()> {
        if colors.len() != self.points.len() {
            return Err(ErrorKind::InvalidArgument(format!(
                "colors length {} does not match point count {}",
                colors.len(),
                self.points.len()
            ))
            .into());
        }
        self.colors = Some(colors);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<T>] {
        &self.points
    }

    pub fn point(&self, idx: usize) -> Point3<T> {
        self.points[idx]
    }

    pub fn normals(&self) -> Option<&[Vector3<T>]> {
        self.normals.as_deref()
    }

    pub fn normal(&self, idx: usize) -> Option<Vector3<T>> {
        self.normals.as_ref().map(|n| n[idx])
    }

    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }
}

/// An ordered sequence of indices into a [`PointCloud`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeypointIndexSet(Vec<usize>);

impl KeypointIndexSet {
    pub fn new(indices: Vec<usize>) -> Self {
        KeypointIndexSet(indices)
    }

    pub fn empty() -> Self {
        KeypointIndexSet(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.0.iter()
    }
}

impl IntoIterator for KeypointIndexSet {
    type Item = usize;
    type IntoIter = std::vec::IntoIter<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<usize> for KeypointIndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        KeypointIndexSet(iter.into_iter().collect())
    }
}

/// Per-point classification produced by the LOAM extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLabel {
    Edge,
    Planar,
    NonFeature,
}

/// The input cloud plus a parallel sequence of [`PointLabel`]s, one per
/// point. Produced by the LOAM extractor.
#[derive(Debug, Clone)]
pub struct LabeledCloud<T: RealField + Copy> {
    cloud: Arc<PointCloud<T>>,
    labels: Vec<PointLabel>,
}

impl<T: RealField + Copy> LabeledCloud<T> {
    pub fn new(cloud: Arc<PointCloud<T>>, labels: Vec<PointLabel>) -> Result<Self> {
        if labels.len() != cloud.len() {
            return Err(ErrorKind::InvalidArgument(format!(
                "label count {} does not match point count {}",
                labels.len(),
                cloud.len()
            ))
            .into());
        }
        Ok(LabeledCloud { cloud, labels })
    }

    pub fn cloud(&self) -> &PointCloud<T> {
        &self.cloud
    }

    pub fn labels(&self) -> &[PointLabel] {
        &self.labels
    }

    /// Indices of all points labeled `Edge`, ascending.
    pub fn edge_indices(&self) -> KeypointIndexSet {
        self.indices_with(PointLabel::Edge)
    }

    /// Indices of all points labeled `Planar`, ascending.
    pub fn planar_indices(&self) -> KeypointIndexSet {
        self.indices_with(PointLabel::Planar)
    }

    /// Indices of all points labeled `NonFeature`, ascending.
    pub fn non_feature_indices(&self) -> KeypointIndexSet {
        self.indices_with(PointLabel::NonFeature)
    }

    /// The union of edge and planar indices, ascending: what a caller using
    /// the uniform `extract()` interface on a LOAM extractor receives
    /// (Open Question #3, resolved in DESIGN.md).
    pub fn keypoint_indices(&self) -> KeypointIndexSet {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l != PointLabel::NonFeature)
            .map(|(i, _)| i)
            .collect()
    }

    fn indices_with(&self, label: PointLabel) -> KeypointIndexSet {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == label)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_normals() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let normals = vec![Vector3::new(0.0, 0.0, 1.0)];
        assert!(PointCloud::with_normals(points, normals).is_err());
    }

    #[test]
    fn labeled_cloud_keypoint_union() {
        let cloud = Arc::new(PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]));
        let labels = vec![PointLabel::Edge, PointLabel::NonFeature, PointLabel::Planar];
        let labeled = LabeledCloud::new(cloud, labels).unwrap();
        assert_eq!(labeled.keypoint_indices().as_slice(), &[0, 2]);
        assert_eq!(labeled.edge_indices().as_slice(), &[0]);
        assert_eq!(labeled.planar_indices().as_slice(), &[2]);
        assert_eq!(labeled.non_feature_indices().as_slice(), &[1]);
    }
}
