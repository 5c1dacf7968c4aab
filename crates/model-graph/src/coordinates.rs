//! Output Handles

use crate::GraphError;
use serde::{Deserialize, Serialize};

/// Index of a node in its model
pub type NodeId = usize;

/// One element of one node's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub node: NodeId,
    pub element: usize,
}

impl Coordinate {
    pub fn new(node: NodeId, element: usize) -> Self {
        Self { node, element }
    }
}

/// Elements of a single node laid out as `start + i * stride`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffineRange {
    pub node: NodeId,
    pub start: usize,
    pub stride: isize,
    pub len: usize,
}

/// Ordered list of coordinates, the handle passed between nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateList(Vec<Coordinate>);

impl CoordinateList {
    pub fn new(coordinates: Vec<Coordinate>) -> Self {
        Self(coordinates)
    }

    /// `len` consecutive elements of `node` starting at `start`
    pub fn range(node: NodeId, start: usize, len: usize) -> Self {
        Self((start..start + len).map(|element| Coordinate::new(node, element)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Coordinate> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Coordinate] {
        &self.0
    }

    /// Sub-list `[start, start + len)`
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        self.0.get(start..start + len).map(|c| Self(c.to_vec()))
    }

    /// Append all coordinates of `other`
    pub fn extend(&mut self, other: &CoordinateList) {
        self.0.extend_from_slice(&other.0);
    }

    /// Widen a handle to `width` elements
    ///
    /// A single coordinate is repeated; a handle already `width` wide is
    /// returned unchanged.
    pub fn broadcast(&self, width: usize) -> Result<Self, GraphError> {
        match self.0.as_slice() {
            [single] => Ok(Self(vec![*single; width])),
            coords if coords.len() == width => Ok(self.clone()),
            coords => Err(GraphError::BroadcastMismatch { len: coords.len(), width }),
        }
    }

    /// Describe the list as a strided range over one node, if it is one
    pub fn as_affine(&self) -> Option<AffineRange> {
        let first = *self.0.first()?;
        let stride = match self.0.get(1) {
            Some(second) => second.element as isize - first.element as isize,
            None => 1,
        };
        let affine = self.0.iter().enumerate().all(|(i, c)| {
            c.node == first.node && c.element as isize == first.element as isize + i as isize * stride
        });
        affine.then_some(AffineRange {
            node: first.node,
            start: first.element,
            stride,
            len: self.0.len(),
        })
    }
}

impl FromIterator<Coordinate> for CoordinateList {
    fn from_iter<I: IntoIterator<Item = Coordinate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
