//! Transform chains and sequences of transform chains.
//!
//! A [`TransformChain`] maps the local coordinate system of an element (or of a sub-entity such
//! as an element face) to the global coordinate system. It is stored as a list of affine
//! [`TransformItem`]s ordered from the root (the outermost, global map) to the leaf. A chain `c`
//! *belongs* to an element `e` of a [`TransformSequence`] when the chain of `e` is a prefix of
//! `c`; the remaining items (the *tail*) map the coordinates of `c` into the element.
use crate::nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView2};
use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHasher};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// An affine map $x \mapsto A x + b$.
#[derive(Debug, Clone)]
pub struct TransformItem {
    linear: DMatrix<f64>,
    offset: DVector<f64>,
}

impl TransformItem {
    /// # Panics
    ///
    /// Panics if the number of rows of `linear` differs from the length of `offset`.
    pub fn new(linear: DMatrix<f64>, offset: DVector<f64>) -> Self {
        assert_eq!(linear.nrows(), offset.len(), "Offset must have one entry per output dimension.");
        Self { linear, offset }
    }

    /// An axis-aligned map $x_i \mapsto s_i x_i + t_i$.
    pub fn scale_and_shift(scale: &[f64], shift: &[f64]) -> Self {
        assert_eq!(scale.len(), shift.len());
        Self::new(
            DMatrix::from_diagonal(&DVector::from_column_slice(scale)),
            DVector::from_column_slice(shift),
        )
    }

    pub fn fromdims(&self) -> usize {
        self.linear.ncols()
    }

    pub fn todims(&self) -> usize {
        self.linear.nrows()
    }

    pub fn linear(&self) -> &DMatrix<f64> {
        &self.linear
    }

    pub fn offset(&self) -> &DVector<f64> {
        &self.offset
    }

    fn apply(&self, coords: ArrayView2<f64>) -> Array2<f64> {
        let (npoints, fromdims) = coords.dim();
        assert_eq!(fromdims, self.fromdims(), "Coordinates do not match transform dimension.");
        Array2::from_shape_fn((npoints, self.todims()), |(p, i)| {
            (0..fromdims).fold(self.offset[i], |acc, j| acc + self.linear[(i, j)] * coords[[p, j]])
        })
    }

    /// Applies `items`, ordered root to leaf, to the rows of `coords`.
    ///
    /// An empty list of items is the identity.
    pub fn apply_all(items: &[TransformItem], coords: ArrayView2<f64>) -> Array2<f64> {
        items
            .iter()
            .rev()
            .fold(coords.to_owned(), |x, item| item.apply(x.view()))
    }
}

impl PartialEq for TransformItem {
    fn eq(&self, other: &Self) -> bool {
        self.linear.shape() == other.linear.shape()
            && self.linear.iter().zip(other.linear.iter()).all(|(a, b)| a.to_bits() == b.to_bits())
            && self.offset.iter().zip(other.offset.iter()).all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for TransformItem {}

impl Hash for TransformItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.linear.shape().hash(state);
        self.linear.iter().for_each(|&x| OrderedFloat(x).hash(state));
        self.offset.iter().for_each(|&x| OrderedFloat(x).hash(state));
    }
}

/// A chain of affine maps, ordered from root to leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformChain {
    items: Arc<[TransformItem]>,
}

impl TransformChain {
    /// # Panics
    ///
    /// Panics if the chain is empty or consecutive items have mismatched dimensions.
    pub fn new(items: Vec<TransformItem>) -> Self {
        assert!(!items.is_empty(), "A transform chain needs at least one item.");
        for pair in items.windows(2) {
            assert_eq!(
                pair[0].fromdims(),
                pair[1].todims(),
                "Consecutive transform items must have matching dimensions."
            );
        }
        Self { items: items.into() }
    }

    pub fn items(&self) -> &[TransformItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn fromdims(&self) -> usize {
        self.items[self.items.len() - 1].fromdims()
    }

    pub fn todims(&self) -> usize {
        self.items[0].todims()
    }

    /// Returns a new chain with `item` appended at the leaf.
    pub fn extended(&self, item: TransformItem) -> Self {
        let mut items = self.items.to_vec();
        items.push(item);
        Self::new(items)
    }

    /// The linear part of the composed map, a `todims x fromdims` matrix.
    pub fn linear(&self) -> DMatrix<f64> {
        self.items
            .iter()
            .skip(1)
            .fold(self.items[0].linear().clone(), |acc, item| acc * item.linear())
    }

    /// Maps every row of `coords` from leaf coordinates to root coordinates.
    pub fn apply(&self, coords: ArrayView2<f64>) -> Array2<f64> {
        TransformItem::apply_all(&self.items, coords)
    }
}

impl Hash for TransformChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with the hash of `[TransformItem]` for `Borrow` lookups
        self.items[..].hash(state)
    }
}

impl Borrow<[TransformItem]> for TransformChain {
    fn borrow(&self) -> &[TransformItem] {
        &self.items
    }
}

struct SequenceData {
    chains: Vec<TransformChain>,
    todims: usize,
    fromdims: usize,
    hash: u64,
    lookup: OnceLock<FxHashMap<TransformChain, usize>>,
}

/// An ordered, shared sequence of transform chains of equal dimensions.
///
/// Cloning is cheap. Equality is by content, short-circuited by identity.
#[derive(Clone)]
pub struct TransformSequence {
    data: Arc<SequenceData>,
}

impl TransformSequence {
    /// # Panics
    ///
    /// Panics if a chain does not map `fromdims` to `todims` dimensions.
    pub fn new(todims: usize, fromdims: usize, chains: Vec<TransformChain>) -> Self {
        for chain in &chains {
            assert_eq!(chain.todims(), todims, "Transform chain has wrong target dimension.");
            assert_eq!(chain.fromdims(), fromdims, "Transform chain has wrong source dimension.");
        }
        let mut hasher = FxHasher::default();
        (todims, fromdims).hash(&mut hasher);
        chains.hash(&mut hasher);
        Self {
            data: Arc::new(SequenceData {
                chains,
                todims,
                fromdims,
                hash: hasher.finish(),
                lookup: OnceLock::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.data.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.chains.is_empty()
    }

    pub fn todims(&self) -> usize {
        self.data.todims
    }

    pub fn fromdims(&self) -> usize {
        self.data.fromdims
    }

    pub fn get(&self, index: usize) -> Option<&TransformChain> {
        self.data.chains.get(index)
    }

    pub fn chains(&self) -> &[TransformChain] {
        &self.data.chains
    }

    pub fn content_hash(&self) -> u64 {
        self.data.hash
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// A new sequence consisting of the chains at the given positions.
    ///
    /// # Panics
    ///
    /// Panics if a position is out of bounds.
    pub fn take(&self, selection: &[usize]) -> Self {
        let chains = selection.iter().map(|&i| self.data.chains[i].clone()).collect();
        Self::new(self.todims(), self.fromdims(), chains)
    }

    /// Finds the element that `chain` belongs to.
    ///
    /// Returns the element index together with the tail of `chain` that maps the coordinates
    /// of `chain` into the local coordinates of the element. The longest matching prefix wins.
    pub fn index_with_tail<'a>(&self, chain: &'a TransformChain) -> Option<(usize, &'a [TransformItem])> {
        let lookup = self.data.lookup.get_or_init(|| {
            self.data
                .chains
                .iter()
                .enumerate()
                .map(|(i, chain)| (chain.clone(), i))
                .collect()
        });
        let items = chain.items();
        (1..=items.len())
            .rev()
            .find_map(|k| lookup.get(&items[..k]).map(|&index| (index, &items[k..])))
    }
}

impl PartialEq for TransformSequence {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.data.hash == other.data.hash
                && self.data.todims == other.data.todims
                && self.data.fromdims == other.data.fromdims
                && self.data.chains == other.data.chains)
    }
}

impl Eq for TransformSequence {}

impl Hash for TransformSequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.data.hash)
    }
}

impl fmt::Debug for TransformSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransformSequence<{}D -> {}D, {} chains>",
            self.fromdims(),
            self.todims(),
            self.len()
        )
    }
}
