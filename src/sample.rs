//! Point samples on elements.
//!
//! A [`Sample`] is a collection of points distributed over the elements of one or more parallel
//! transform sequences, together with a global numbering of the points. By default, points are
//! numbered consecutively element by element. Alternatively, a custom index assigns every local
//! point an arbitrary global number; points of different elements may then share a number, in
//! which case their contributions to [`Sample::at`] are added.
//!
//! Samples are deduplicated: constructing a sample from arguments equal to those of a sample that
//! is still alive returns the existing sample, including its cached derived data.
use crate::assembly::Assembled;
use crate::error::{LowerError, SampleError};
use crate::evaluable::{Arguments, Data, Evaluable};
use crate::function::{Array, Dtype, Lower, LowerArgs};
use crate::integrate::{eval_integrals_sparse_with_config, eval_integrals_with_config};
use crate::config::EvaluationConfig;
use crate::points::{Points, PointsSequence};
use crate::transform::TransformSequence;
use itertools::Itertools;
use ndarray::{concatenate, Array1, Array2, ArrayD, Axis};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use samplex_sparse::SparseData;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

mod deferred;

pub use deferred::{AtSample, Integral};

/// How the local points of every element map to global point numbers.
#[derive(Debug)]
pub enum SampleIndex {
    /// Element `i` owns the consecutive range starting at the sum of the point counts of the
    /// preceding elements.
    Default { offsets: OnceLock<Vec<usize>> },
    /// Every element lists the global numbers of its points.
    Custom { index: Vec<Vec<usize>> },
}

impl SampleIndex {
    pub fn is_custom(&self) -> bool {
        matches!(self, SampleIndex::Custom { .. })
    }

    fn custom(&self) -> Option<&[Vec<usize>]> {
        match self {
            SampleIndex::Default { .. } => None,
            SampleIndex::Custom { index } => Some(index),
        }
    }
}

struct SampleData {
    transforms: Vec<TransformSequence>,
    points: PointsSequence,
    index: SampleIndex,
    npoints: usize,
    hash: u64,
    allcoords: OnceLock<Array2<f64>>,
    allcoords_data: OnceLock<Data>,
    index_tables: OnceLock<IndexTables>,
}

enum IndexTables {
    Default { counts: Data, offsets: Data },
    Custom { table: Arc<[Data]> },
}

type Registry = Mutex<FxHashMap<u64, Vec<Weak<SampleData>>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

/// Points on elements with a global point numbering.
///
/// Cloning is cheap; clones share all cached data.
#[derive(Clone)]
pub struct Sample(Arc<SampleData>);

impl Sample {
    /// Creates a sample, or returns the live sample constructed from equal arguments.
    ///
    /// Every transform sequence must have one chain per point set, and all point sets must have
    /// the dimension of the first transform sequence. If `index` is given, it must contain, for
    /// every element, one global index below [`PointsSequence::npoints`] per local point.
    pub fn new(
        transforms: Vec<TransformSequence>,
        points: PointsSequence,
        index: Option<Vec<Vec<usize>>>,
    ) -> Result<Self, SampleError> {
        let first = transforms.first().ok_or(SampleError::NoTransforms)?;
        let nelems = points.len();
        for sequence in &transforms {
            if sequence.len() != nelems {
                return Err(SampleError::ElementCountMismatch {
                    expected: nelems,
                    actual: sequence.len(),
                });
            }
        }
        let ndims = first.fromdims();
        for (element, local) in points.iter().enumerate() {
            if local.ndims() != ndims {
                return Err(SampleError::DimensionMismatch {
                    element,
                    expected: ndims,
                    actual: local.ndims(),
                });
            }
        }
        let npoints = points.npoints();
        if let Some(index) = &index {
            validate_custom_index(&points, index)?;
        }

        let mut hasher = FxHasher::default();
        for sequence in &transforms {
            sequence.content_hash().hash(&mut hasher);
        }
        points.content_hash().hash(&mut hasher);
        index.hash(&mut hasher);
        let hash = hasher.finish();

        let mut registry = registry().lock();
        let bucket = registry.entry(hash).or_default();
        bucket.retain(|entry| entry.strong_count() > 0);
        let existing = bucket.iter().filter_map(Weak::upgrade).find(|data| {
            data.transforms == transforms && data.points == points && data.index.custom() == index.as_deref()
        });
        if let Some(data) = existing {
            return Ok(Self(data));
        }

        let index = match index {
            Some(index) => SampleIndex::Custom { index },
            None => SampleIndex::Default {
                offsets: OnceLock::new(),
            },
        };
        let data = Arc::new(SampleData {
            transforms,
            points,
            index,
            npoints,
            hash,
            allcoords: OnceLock::new(),
            allcoords_data: OnceLock::new(),
            index_tables: OnceLock::new(),
        });
        bucket.push(Arc::downgrade(&data));
        Ok(Self(data))
    }

    pub fn transforms(&self) -> &[TransformSequence] {
        &self.0.transforms
    }

    pub fn points(&self) -> &PointsSequence {
        &self.0.points
    }

    pub fn index_kind(&self) -> &SampleIndex {
        &self.0.index
    }

    pub fn ndims(&self) -> usize {
        self.0.transforms[0].fromdims()
    }

    pub fn nelems(&self) -> usize {
        self.0.points.len()
    }

    /// Total number of points, which bounds the global point numbers.
    pub fn npoints(&self) -> usize {
        self.0.npoints
    }

    /// Whether `self` and `other` are the same deduplicated sample.
    pub fn ptr_eq(&self, other: &Sample) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn offsets<'a>(&'a self, cache: &'a OnceLock<Vec<usize>>) -> &'a [usize] {
        cache.get_or_init(|| {
            let mut offsets = Vec::with_capacity(self.nelems() + 1);
            offsets.push(0);
            for points in self.0.points.iter() {
                offsets.push(offsets[offsets.len() - 1] + points.npoints());
            }
            offsets
        })
    }

    /// Global numbers of the points of element `ielem`.
    ///
    /// # Panics
    ///
    /// Panics if `ielem` is out of bounds.
    pub fn getindex(&self, ielem: usize) -> Cow<'_, [usize]> {
        match &self.0.index {
            SampleIndex::Custom { index } => Cow::Borrowed(&index[ielem]),
            SampleIndex::Default { offsets } => {
                let offsets = self.offsets(offsets);
                Cow::Owned((offsets[ielem]..offsets[ielem + 1]).collect())
            }
        }
    }

    /// Global numbers of the points of all elements.
    pub fn index(&self) -> Vec<Vec<usize>> {
        (0..self.nelems()).map(|ielem| self.getindex(ielem).into_owned()).collect()
    }

    fn index_tables(&self) -> &IndexTables {
        self.0.index_tables.get_or_init(|| match &self.0.index {
            SampleIndex::Custom { index } => {
                let table = index
                    .iter()
                    .map(|indices| Array1::from_iter(indices.iter().map(|&i| i as f64)).into_dyn())
                    .collect();
                IndexTables::Custom {
                    table: Data::table(table),
                }
            }
            SampleIndex::Default { offsets } => {
                let offsets = self.offsets(offsets);
                let counts = offsets.windows(2).map(|pair| (pair[1] - pair[0]) as f64);
                IndexTables::Default {
                    counts: Data::new(Array1::from_iter(counts).into_dyn()),
                    offsets: Data::new(Array1::from_iter(offsets.iter().map(|&i| i as f64)).into_dyn()),
                }
            }
        })
    }

    /// Evaluable global numbers of the points of the element with the given evaluable index.
    pub fn evaluable_indices(&self, ielem: &Evaluable) -> Evaluable {
        match self.index_tables() {
            IndexTables::Default { counts, offsets } => {
                let length = match self.0.points.uniform_npoints() {
                    Some(n) => Evaluable::scalar(n as f64),
                    None => Evaluable::take(Evaluable::shared_constant(counts.clone()), ielem.clone(), 0),
                };
                let offset = Evaluable::take(Evaluable::shared_constant(offsets.clone()), ielem.clone(), 0);
                Evaluable::range(length, offset)
            }
            IndexTables::Custom { table } => Evaluable::elemwise(table.clone(), ielem.clone()),
        }
    }

    /// Local coordinates of all points by global number, shape `[npoints, ndims]`.
    ///
    /// Points that share a global number are represented by the last of them.
    pub fn allcoords(&self) -> &Array2<f64> {
        self.0.allcoords.get_or_init(|| {
            let mut allcoords = Array2::zeros((self.npoints(), self.ndims()));
            for (ielem, points) in self.0.points.iter().enumerate() {
                for (&i, coords) in self.getindex(ielem).iter().zip(points.coords().outer_iter()) {
                    allcoords.row_mut(i).assign(&coords);
                }
            }
            allcoords
        })
    }

    fn allcoords_data(&self) -> &Data {
        self.0
            .allcoords_data
            .get_or_init(|| Data::new(self.allcoords().clone().into_dyn()))
    }

    fn connectivity(
        &self,
        what: &'static str,
        local: impl Fn(&Points) -> Option<&Array2<usize>>,
    ) -> Result<Array2<usize>, SampleError> {
        let mut blocks = Vec::with_capacity(self.nelems());
        for (ielem, points) in self.0.points.iter().enumerate() {
            let simplices = local(points).ok_or(SampleError::ConnectivityUnavailable { what })?;
            let index = self.getindex(ielem);
            blocks.push(simplices.mapv(|i| index[i]));
        }
        let views = blocks.iter().map(|block| block.view()).collect_vec();
        concatenate(Axis(0), &views).map_err(|_| SampleError::ConnectivityUnavailable { what })
    }

    /// Simplices of the interior of the sample, in global point numbers.
    pub fn tri(&self) -> Result<Array2<usize>, SampleError> {
        self.connectivity("triangulation", Points::tri)
    }

    /// Simplices of the boundaries of the elements, in global point numbers.
    pub fn hull(&self) -> Result<Array2<usize>, SampleError> {
        self.connectivity("hull", Points::hull)
    }

    /// The sample restricted to the elements that contain a point selected by `mask`.
    ///
    /// The result has a default index. Unselected points of retained elements are kept.
    pub fn subset(&self, mask: &[bool]) -> Result<Sample, SampleError> {
        if mask.len() != self.npoints() {
            return Err(SampleError::MaskLengthMismatch {
                expected: self.npoints(),
                actual: mask.len(),
            });
        }
        let selection = (0..self.nelems())
            .filter(|&ielem| self.getindex(ielem).iter().any(|&i| mask[i]))
            .collect_vec();
        let transforms = self
            .0
            .transforms
            .iter()
            .map(|sequence| sequence.take(&selection))
            .collect();
        Sample::new(transforms, self.0.points.take(&selection), None)
    }

    /// The function that, at every point of the sample, is one for the global number of that
    /// point and zero for all others. Shape `[npoints]`.
    ///
    /// Evaluating it at points that are not part of the sample fails.
    pub fn basis(&self) -> Array {
        Array::from_lower(vec![self.npoints()], Dtype::Float, SampleBasis { sample: self.clone() })
    }

    /// The function that takes the value `data[i]` at the point with global number `i`.
    ///
    /// # Panics
    ///
    /// Panics if the leading extent of `data` is not the number of points.
    pub fn asfunction(&self, data: ArrayD<f64>) -> Array {
        assert_eq!(
            data.shape().first(),
            Some(&self.npoints()),
            "Expected one row of data per sample point."
        );
        self.basis().matmat(&Array::constant(data))
    }

    /// The integral of `func` over the sample.
    pub fn integral(&self, func: &Array) -> Array {
        Integral::new(func.clone(), self.clone()).into()
    }

    /// `func` evaluated at every point of the sample, with a leading axis of extent `npoints`.
    pub fn at(&self, func: &Array) -> Array {
        AtSample::new(func.clone(), self.clone()).into()
    }

    /// Integrates all functions jointly, converting every result by rank.
    pub fn integrate(&self, funcs: &[Array], arguments: &Arguments) -> eyre::Result<Vec<Assembled>> {
        let integrals = funcs.iter().map(|func| self.integral(func)).collect_vec();
        eval_integrals_with_config(&integrals, arguments, EvaluationConfig::global())
    }

    /// Integrates all functions jointly, returning raw sparse results.
    pub fn integrate_sparse(&self, funcs: &[Array], arguments: &Arguments) -> eyre::Result<Vec<SparseData>> {
        let integrals = funcs.iter().map(|func| self.integral(func)).collect_vec();
        eval_integrals_sparse_with_config(&integrals, arguments, EvaluationConfig::global())
    }

    /// Evaluates all functions jointly at the points of the sample, returning dense arrays.
    pub fn eval(&self, funcs: &[Array], arguments: &Arguments) -> eyre::Result<Vec<ArrayD<f64>>> {
        let results = self.eval_sparse(funcs, arguments)?;
        Ok(results.iter().map(SparseData::to_dense).collect())
    }

    /// Evaluates all functions jointly at the points of the sample, returning raw sparse results.
    pub fn eval_sparse(&self, funcs: &[Array], arguments: &Arguments) -> eyre::Result<Vec<SparseData>> {
        let samples = funcs.iter().map(|func| self.at(func)).collect_vec();
        eval_integrals_sparse_with_config(&samples, arguments, EvaluationConfig::global())
    }
}

fn validate_custom_index(points: &PointsSequence, index: &[Vec<usize>]) -> Result<(), SampleError> {
    if index.len() != points.len() {
        return Err(SampleError::IndexCountMismatch {
            expected: points.len(),
            actual: index.len(),
        });
    }
    let npoints = points.npoints();
    for (element, (indices, local)) in index.iter().zip(points.iter()).enumerate() {
        if indices.len() != local.npoints() {
            return Err(SampleError::IndexLengthMismatch {
                element,
                expected: local.npoints(),
                actual: indices.len(),
            });
        }
        if let Some(&i) = indices.iter().find(|&&i| i >= npoints) {
            return Err(SampleError::IndexOutOfBounds {
                element,
                index: i,
                npoints,
            });
        }
    }
    Ok(())
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.transforms == other.0.transforms
                && self.0.points == other.0.points
                && self.0.index.custom() == other.0.index.custom())
    }
}

impl Eq for Sample {}

impl Hash for Sample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sample<{}D, {} elems, {} points>",
            self.ndims(),
            self.nelems(),
            self.npoints()
        )
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug)]
struct SampleBasis {
    sample: Sample,
}

impl Lower for SampleBasis {
    fn lower(&self, args: &LowerArgs) -> Result<Evaluable, LowerError> {
        let (chain, coords) = args.primary("a sample basis")?;
        let transforms = &self.sample.transforms()[0];
        let ielem = Evaluable::transforms_index(transforms.clone(), chain.clone());
        let local = Evaluable::transforms_coords(transforms.clone(), chain.clone(), coords.clone());
        let indices = self.sample.evaluable_indices(&ielem);
        let allcoords = Evaluable::shared_constant(self.sample.allcoords_data().clone());
        let expect = Evaluable::take(allcoords, indices.clone(), 0);
        Ok(Evaluable::inflate(
            Evaluable::sampled(local, expect),
            indices,
            self.sample.npoints(),
            1,
        ))
    }
}
