//! Sparse coordinate tensors for accumulating integration results.
//!
//! A [`SparseData`] represents a tensor of arbitrary rank as a list of coordinates and values.
//! Unlisted entries are implicitly zero, and repeated coordinates are *accumulated*: every
//! operation that produces a dense or canonical representation sums colliding entries
//! rather than overwriting them.
//!
//! The intended workflow is to push (possibly overlapping) contributions cheaply, for example
//! one block per finite element, and only canonicalize at the very end with
//! [`SparseData::dedup`] and [`SparseData::prune`], or densify with [`SparseData::to_dense`].

use itertools::izip;
use ndarray::{ArrayD, Dimension, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors produced when sparse data is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SparseError {
    /// The number of index columns does not match the rank of the shape.
    RankMismatch { expected: usize, actual: usize },
    /// An index column and the value array have different lengths.
    LengthMismatch { expected: usize, actual: usize },
    /// An index exceeds the extent of its axis.
    IndexOutOfBounds { axis: usize, index: usize, extent: usize },
}

impl Display for SparseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankMismatch { expected, actual } => {
                write!(f, "expected {expected} index columns but got {actual}")
            }
            Self::LengthMismatch { expected, actual } => {
                write!(f, "index column has {actual} entries, but there are {expected} values")
            }
            Self::IndexOutOfBounds { axis, index, extent } => {
                write!(f, "index {index} out of bounds for axis {axis} with extent {extent}")
            }
        }
    }
}

impl Error for SparseError {}

/// A tensor stored as coordinate/value lists, with duplicates allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseData {
    shape: Vec<usize>,
    // One column of indices per axis, each with the same length as `values`
    indices: Vec<Vec<usize>>,
    values: Vec<f64>,
}

impl SparseData {
    /// Creates an empty (all-zero) tensor with the given shape.
    pub fn new(shape: Vec<usize>) -> Self {
        let indices = vec![Vec::new(); shape.len()];
        Self {
            shape,
            indices,
            values: Vec::new(),
        }
    }

    /// Creates a rank-0 tensor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            indices: Vec::new(),
            values: vec![value],
        }
    }

    /// Creates sparse data from index columns and values, checking consistency.
    pub fn try_from_parts(shape: Vec<usize>, indices: Vec<Vec<usize>>, values: Vec<f64>) -> Result<Self, SparseError> {
        let data = Self { shape, indices, values };
        data.validate()?;
        Ok(data)
    }

    /// Lists every entry of a dense array, zeros included.
    pub fn from_dense(array: &ArrayD<f64>) -> Self {
        let mut data = Self::new(array.shape().to_vec());
        data.values.reserve(array.len());
        for (coordinate, value) in array.indexed_iter() {
            for (column, &index) in data.indices.iter_mut().zip(coordinate.slice()) {
                column.push(index);
            }
            data.values.push(*value);
        }
        data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of stored entries, counting duplicates.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn indices(&self, axis: usize) -> &[usize] {
        &self.indices[axis]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The coordinate of the `k`-th stored entry.
    pub fn coordinate(&self, k: usize) -> Vec<usize> {
        self.indices.iter().map(|column| column[k]).collect()
    }

    /// Iterates over `(coordinate, value)` pairs in storage order.
    pub fn entries(&self) -> impl '_ + Iterator<Item = (Vec<usize>, f64)> {
        (0..self.nnz()).map(move |k| (self.coordinate(k), self.values[k]))
    }

    /// Appends a single entry.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate has the wrong rank or is out of bounds.
    pub fn push(&mut self, coordinate: &[usize], value: f64) {
        assert_eq!(coordinate.len(), self.ndim(), "Coordinate rank must match tensor rank.");
        for (axis, (&index, &extent)) in coordinate.iter().zip(&self.shape).enumerate() {
            assert!(index < extent, "Index {index} out of bounds for axis {axis}.");
        }
        for (column, &index) in self.indices.iter_mut().zip(coordinate) {
            column.push(index);
        }
        self.values.push(value);
    }

    /// Appends all entries of `other`. Since duplicates accumulate, this is addition.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn extend(&mut self, other: &SparseData) {
        assert_eq!(self.shape, other.shape, "Accumulation requires tensors of identical shape.");
        for (column, other_column) in self.indices.iter_mut().zip(&other.indices) {
            column.extend_from_slice(other_column);
        }
        self.values.extend_from_slice(&other.values);
    }

    pub fn negate(&mut self) {
        self.values.iter_mut().for_each(|v| *v = -*v);
    }

    pub fn scale(&mut self, factor: f64) {
        self.values.iter_mut().for_each(|v| *v *= factor);
    }

    /// Maps the indices along `axis` through `mapping`, changing the axis extent to `extent`.
    ///
    /// This scatters the axis into a larger (or differently ordered) index space.
    pub fn reindex_axis(&mut self, axis: usize, mapping: &[usize], extent: usize) -> Result<(), SparseError> {
        if mapping.len() != self.shape[axis] {
            return Err(SparseError::LengthMismatch {
                expected: self.shape[axis],
                actual: mapping.len(),
            });
        }
        if let Some(&index) = mapping.iter().find(|&&index| index >= extent) {
            return Err(SparseError::IndexOutOfBounds { axis, index, extent });
        }
        for index in &mut self.indices[axis] {
            *index = mapping[*index];
        }
        self.shape[axis] = extent;
        Ok(())
    }

    /// Inserts a new axis of extent one at position `axis`.
    pub fn insert_axis(&mut self, axis: usize) {
        self.shape.insert(axis, 1);
        self.indices.insert(axis, vec![0; self.nnz()]);
    }

    /// Sums over `axis`, removing it.
    pub fn sum_axis(mut self, axis: usize) -> Self {
        self.shape.remove(axis);
        self.indices.remove(axis);
        self
    }

    /// Reorders the axes so that axis `i` of the result is axis `axes[i]` of `self`.
    ///
    /// # Panics
    ///
    /// Panics if `axes` is not a permutation of the axes.
    pub fn permute_axes(self, axes: &[usize]) -> Self {
        let mut seen = vec![false; self.ndim()];
        assert_eq!(axes.len(), self.ndim(), "Permutation must have one entry per axis.");
        for &axis in axes {
            assert!(!std::mem::replace(&mut seen[axis], true), "Axis {axis} occurs twice.");
        }
        let mut shape = Vec::with_capacity(axes.len());
        let mut columns: Vec<Option<Vec<usize>>> = self.indices.into_iter().map(Some).collect();
        let mut indices = Vec::with_capacity(axes.len());
        for &axis in axes {
            shape.push(self.shape[axis]);
            indices.push(columns[axis].take().unwrap_or_default());
        }
        Self {
            shape,
            indices,
            values: self.values,
        }
    }

    /// Checks that index columns are consistent with the shape and values.
    pub fn validate(&self) -> Result<(), SparseError> {
        if self.indices.len() != self.shape.len() {
            return Err(SparseError::RankMismatch {
                expected: self.shape.len(),
                actual: self.indices.len(),
            });
        }
        for (axis, (column, &extent)) in self.indices.iter().zip(&self.shape).enumerate() {
            if column.len() != self.values.len() {
                return Err(SparseError::LengthMismatch {
                    expected: self.values.len(),
                    actual: column.len(),
                });
            }
            if let Some(&index) = column.iter().find(|&&index| index >= extent) {
                return Err(SparseError::IndexOutOfBounds { axis, index, extent });
            }
        }
        Ok(())
    }

    /// Converts to a dense array, summing duplicate entries.
    pub fn to_dense(&self) -> ArrayD<f64> {
        let mut result = ArrayD::zeros(IxDyn(&self.shape));
        let mut coordinate = vec![0; self.ndim()];
        for (k, value) in self.values.iter().enumerate() {
            for (c, column) in coordinate.iter_mut().zip(&self.indices) {
                *c = column[k];
            }
            result[IxDyn(&coordinate)] += *value;
        }
        result
    }

    /// Sorts entries lexicographically by coordinate and sums entries with equal coordinates.
    pub fn dedup(self) -> Self {
        let nnz = self.nnz();
        let mut permutation: Vec<usize> = (0..nnz).collect();
        let indices = &self.indices;
        permutation.par_sort_unstable_by(|&a, &b| compare_coordinates(indices, a, b));

        let mut result = Self::new(self.shape.clone());
        let mut i = 0;
        while i < nnz {
            let first = permutation[i];
            let mut combined = self.values[first];
            let mut j = i + 1;
            while j < nnz && compare_coordinates(indices, first, permutation[j]) == Ordering::Equal {
                combined += self.values[permutation[j]];
                j += 1;
            }
            for (column, source) in izip!(&mut result.indices, indices) {
                column.push(source[first]);
            }
            result.values.push(combined);
            i = j;
        }
        result
    }

    /// Removes entries whose value is exactly zero.
    pub fn prune(self) -> Self {
        let keep: Vec<usize> = (0..self.nnz()).filter(|&k| self.values[k] != 0.0).collect();
        let indices = self
            .indices
            .iter()
            .map(|column| keep.iter().map(|&k| column[k]).collect())
            .collect();
        let values = keep.iter().map(|&k| self.values[k]).collect();
        Self {
            shape: self.shape,
            indices,
            values,
        }
    }

    pub fn into_parts(self) -> (Vec<usize>, Vec<Vec<usize>>, Vec<f64>) {
        (self.shape, self.indices, self.values)
    }
}

fn compare_coordinates(indices: &[Vec<usize>], a: usize, b: usize) -> Ordering {
    indices
        .iter()
        .map(|column| column[a].cmp(&column[b]))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
