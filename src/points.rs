//! Point sets on reference elements.
//!
//! All reference elements are unit hypercubes $[0, 1]^d$. A [`Points`] value holds the local
//! coordinates of the points of a single element together with optional integration weights
//! and optional connectivity: `tri` lists the simplices of a triangulation of the element's
//! interior, `hull` the simplices of its boundary. A [`PointsSequence`] holds one point set per
//! element of a sample.
use crate::evaluable::Evaluable;
use fenris_quadrature::univariate;
use itertools::Itertools;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Points on a single reference element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Points {
    coords: Array2<f64>,
    weights: Option<Array1<f64>>,
    tri: Option<Array2<usize>>,
    hull: Option<Array2<usize>>,
}

impl Points {
    /// Points with the given coordinates (one row per point) and no weights or connectivity.
    pub fn new(coords: Array2<f64>) -> Self {
        Self {
            coords,
            weights: None,
            tri: None,
            hull: None,
        }
    }

    /// Assembles a point set from all of its parts, with the checks of the `with_*` methods.
    pub fn from_parts(
        coords: Array2<f64>,
        weights: Option<Array1<f64>>,
        tri: Option<Array2<usize>>,
        hull: Option<Array2<usize>>,
    ) -> Self {
        let mut points = Self::new(coords);
        if let Some(weights) = weights {
            points = points.with_weights(weights);
        }
        if let Some(tri) = tri {
            points = points.with_tri(tri);
        }
        if let Some(hull) = hull {
            points = points.with_hull(hull);
        }
        points
    }

    /// # Panics
    ///
    /// Panics if there is not exactly one weight per point.
    pub fn with_weights(self, weights: Array1<f64>) -> Self {
        assert_eq!(weights.len(), self.npoints(), "Expected one weight per point.");
        Self {
            weights: Some(weights),
            ..self
        }
    }

    /// # Panics
    ///
    /// Panics if a simplex does not have `ndims + 1` vertices or refers to a non-existent point.
    pub fn with_tri(self, tri: Array2<usize>) -> Self {
        assert_eq!(tri.ncols(), self.ndims() + 1, "Interior simplices need ndims + 1 vertices.");
        assert!(tri.iter().all(|&i| i < self.npoints()), "Simplex vertex out of bounds.");
        Self { tri: Some(tri), ..self }
    }

    /// # Panics
    ///
    /// Panics if a simplex does not have `ndims` vertices or refers to a non-existent point.
    pub fn with_hull(self, hull: Array2<usize>) -> Self {
        assert_eq!(hull.ncols(), self.ndims(), "Boundary simplices need ndims vertices.");
        assert!(hull.iter().all(|&i| i < self.npoints()), "Simplex vertex out of bounds.");
        Self {
            hull: Some(hull),
            ..self
        }
    }

    pub fn npoints(&self) -> usize {
        self.coords.nrows()
    }

    pub fn ndims(&self) -> usize {
        self.coords.ncols()
    }

    pub fn coords(&self) -> ArrayView2<f64> {
        self.coords.view()
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    pub fn tri(&self) -> Option<&Array2<usize>> {
        self.tri.as_ref()
    }

    pub fn hull(&self) -> Option<&Array2<usize>> {
        self.hull.as_ref()
    }

    /// Tensor-product Gauss-Legendre points, integrating polynomials of the given degree exactly.
    pub fn gauss(ndims: usize, degree: usize) -> Self {
        let (weights1d, points1d) = unit_interval_gauss(degree / 2 + 1);
        let mut coords = Vec::new();
        let mut weights = Vec::new();
        for multi_index in (0..ndims).map(|_| 0..points1d.len()).multi_cartesian_product_or_unit() {
            coords.extend(multi_index.iter().map(|&i| points1d[i]));
            weights.push(multi_index.iter().map(|&i| weights1d[i]).product::<f64>());
        }
        let npoints = weights.len();
        Self::new(Array2::from_shape_vec((npoints, ndims), coords).expect("Shape is consistent by construction"))
            .with_weights(Array1::from(weights))
    }

    /// A uniform grid of `n` points per dimension, including the end points.
    ///
    /// Triangulation and hull are available for up to two dimensions.
    ///
    /// # Panics
    ///
    /// Panics if `n < 2` for a positive number of dimensions.
    pub fn bezier(ndims: usize, n: usize) -> Self {
        assert!(ndims == 0 || n >= 2, "Bezier points need at least two points per dimension.");
        let n = if ndims == 0 { 1 } else { n };
        let h = 1.0 / (n.max(2) - 1) as f64;
        let mut coords = Vec::new();
        for multi_index in (0..ndims).map(|_| 0..n).multi_cartesian_product_or_unit() {
            coords.extend(multi_index.iter().map(|&i| i as f64 * h));
        }
        let npoints = n.pow(ndims as u32);
        let points =
            Self::new(Array2::from_shape_vec((npoints, ndims), coords).expect("Shape is consistent by construction"));
        match ndims {
            0 => points
                .with_tri(Array2::zeros((1, 1)))
                .with_hull(Array2::zeros((0, 0))),
            1 => {
                let tri = (0..n - 1).flat_map(|i| [i, i + 1]).collect_vec();
                points
                    .with_tri(Array2::from_shape_vec((n - 1, 2), tri).expect("Shape is consistent by construction"))
                    .with_hull(Array2::from_shape_vec((2, 1), vec![0, n - 1]).expect("Shape is consistent by construction"))
            }
            2 => {
                let vertex = |i: usize, j: usize| i * n + j;
                let mut tri = Vec::new();
                for (i, j) in (0..n - 1).cartesian_product(0..n - 1) {
                    tri.extend([vertex(i, j), vertex(i + 1, j), vertex(i, j + 1)]);
                    tri.extend([vertex(i + 1, j), vertex(i + 1, j + 1), vertex(i, j + 1)]);
                }
                let mut hull = Vec::new();
                for k in 0..n - 1 {
                    hull.extend([vertex(k, 0), vertex(k + 1, 0)]);
                    hull.extend([vertex(n - 1, k), vertex(n - 1, k + 1)]);
                    hull.extend([vertex(k + 1, n - 1), vertex(k, n - 1)]);
                    hull.extend([vertex(0, k + 1), vertex(0, k)]);
                }
                let ntri = tri.len() / 3;
                let nhull = hull.len() / 2;
                points
                    .with_tri(Array2::from_shape_vec((ntri, 3), tri).expect("Shape is consistent by construction"))
                    .with_hull(Array2::from_shape_vec((nhull, 2), hull).expect("Shape is consistent by construction"))
            }
            _ => points,
        }
    }

    /// The corners of the reference element.
    pub fn vertex(ndims: usize) -> Self {
        Self::bezier(ndims, 2)
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        self.coords.shape().hash(state);
        self.coords.iter().for_each(|&x| OrderedFloat(x).hash(state));
        if let Some(weights) = &self.weights {
            weights.iter().for_each(|&w| OrderedFloat(w).hash(state));
        }
        for connectivity in [&self.tri, &self.hull] {
            connectivity.as_ref().map(|c| c.shape().to_vec()).hash(state);
            connectivity.iter().flatten().for_each(|i| i.hash(state));
        }
    }
}

/// Iterates a cartesian product of ranges, yielding a single empty item for zero ranges.
trait MultiCartesianProductOrUnit: Iterator<Item = std::ops::Range<usize>> + Sized {
    fn multi_cartesian_product_or_unit(self) -> Box<dyn Iterator<Item = Vec<usize>>> {
        let ranges = self.collect_vec();
        if ranges.is_empty() {
            Box::new(std::iter::once(Vec::new()))
        } else {
            Box::new(ranges.into_iter().multi_cartesian_product())
        }
    }
}

impl<I: Iterator<Item = std::ops::Range<usize>>> MultiCartesianProductOrUnit for I {}

/// Gauss-Legendre weights and ascending points on the unit interval [0, 1].
fn unit_interval_gauss(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let (weights, points) = univariate::gauss(num_points);
    // Roots on [-1, 1] come in descending order
    weights
        .into_iter()
        .zip(points)
        .rev()
        .map(|(w, [x])| (0.5 * w, 0.5 * (x + 1.0)))
        .unzip()
}

struct PointsSequenceData {
    items: Vec<Arc<Points>>,
    npoints: usize,
    hash: u64,
}

/// One point set per element.
///
/// Cloning is cheap. Equality is by content, short-circuited by identity.
#[derive(Clone)]
pub struct PointsSequence {
    data: Arc<PointsSequenceData>,
}

impl PointsSequence {
    pub fn from_points(points: Vec<Points>) -> Self {
        Self::from_shared(points.into_iter().map(Arc::new).collect())
    }

    /// A sequence of `n` elements sharing the same point set.
    pub fn uniform(points: Points, n: usize) -> Self {
        let points = Arc::new(points);
        Self::from_shared(vec![points; n])
    }

    pub fn from_shared(items: Vec<Arc<Points>>) -> Self {
        // Identical point sets are hashed only once
        let mut hashes: FxHashMap<*const Points, u64> = FxHashMap::default();
        let mut hasher = FxHasher::default();
        items.len().hash(&mut hasher);
        for points in &items {
            let hash = *hashes.entry(Arc::as_ptr(points)).or_insert_with(|| {
                let mut hasher = FxHasher::default();
                points.hash_into(&mut hasher);
                hasher.finish()
            });
            hasher.write_u64(hash);
        }
        let npoints = items.iter().map(|points| points.npoints()).sum();
        Self {
            data: Arc::new(PointsSequenceData {
                items,
                npoints,
                hash: hasher.finish(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.data.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.items.is_empty()
    }

    /// Total number of points over all elements.
    pub fn npoints(&self) -> usize {
        self.data.npoints
    }

    /// The number of points per element, if all elements have the same number of points.
    pub fn uniform_npoints(&self) -> Option<usize> {
        let first = self.get(0)?.npoints();
        self.iter().all(|points| points.npoints() == first).then_some(first)
    }

    /// The dimension of the point sets, or `None` for an empty sequence.
    pub fn ndims(&self) -> Option<usize> {
        self.get(0).map(Points::ndims)
    }

    pub fn get(&self, index: usize) -> Option<&Points> {
        self.data.items.get(index).map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = &Points> {
        self.data.items.iter().map(Arc::as_ref)
    }

    pub fn content_hash(&self) -> u64 {
        self.data.hash
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// # Panics
    ///
    /// Panics if a position is out of bounds.
    pub fn take(&self, selection: &[usize]) -> Self {
        Self::from_shared(selection.iter().map(|&i| self.data.items[i].clone()).collect())
    }

    /// Interior triangulation of all elements, with points numbered consecutively per element.
    pub fn tri(&self) -> Option<Array2<usize>> {
        self.concatenate_connectivity(Points::tri)
    }

    /// Boundary triangulation of all elements, with points numbered consecutively per element.
    pub fn hull(&self) -> Option<Array2<usize>> {
        self.concatenate_connectivity(Points::hull)
    }

    fn concatenate_connectivity(&self, get: impl Fn(&Points) -> Option<&Array2<usize>>) -> Option<Array2<usize>> {
        let mut offset = 0;
        let mut blocks = Vec::with_capacity(self.len());
        for points in self.iter() {
            blocks.push(get(points)?.mapv(|i| i + offset));
            offset += points.npoints();
        }
        let views = blocks.iter().map(|block| block.view()).collect_vec();
        concatenate(Axis(0), &views).ok()
    }

    /// Evaluable local coordinates of the element with the given evaluable index.
    pub fn evaluable_coords(&self, ielem: &Evaluable) -> Evaluable {
        Evaluable::element_coords(self.clone(), ielem.clone())
    }

    /// Evaluable integration weights of the element with the given evaluable index.
    pub fn evaluable_weights(&self, ielem: &Evaluable) -> Evaluable {
        Evaluable::element_weights(self.clone(), ielem.clone())
    }
}

impl PartialEq for PointsSequence {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.data.hash == other.data.hash
                && self.len() == other.len()
                && self
                    .data
                    .items
                    .iter()
                    .zip(&other.data.items)
                    .all(|(a, b)| Arc::ptr_eq(a, b) || a == b))
    }
}

impl Eq for PointsSequence {}

impl Hash for PointsSequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.data.hash)
    }
}

impl fmt::Debug for PointsSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointsSequence<{} elements, {} points>", self.len(), self.npoints())
    }
}
