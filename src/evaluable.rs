//! Lazy evaluable graphs.
//!
//! An [`Evaluable`] is an immutable node in a directed acyclic graph of array operations.
//! Nodes are compared structurally: two independently constructed nodes with the same operation
//! and the same operands are equal and hash identically, which is what allows an execution
//! [`Session`] to compute shared subgraphs only once. Every node carries a statically inferred
//! shape, where `None` marks an extent that is only known at evaluation time (for example the
//! number of points of an element that is selected by a loop index).
//!
//! Per-element work is expressed with a loop index ([`Evaluable::loop_index`]) and a
//! [`Evaluable::loop_sum`] over it. A node *depends* on a loop if it refers to the loop's index
//! without being enclosed by the corresponding loop sum.
use crate::points::PointsSequence;
use crate::transform::TransformSequence;
use itertools::Itertools;
use ndarray::{arr0, ArrayD};
use ordered_float::OrderedFloat;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

mod optimize;
mod session;
mod value;

pub use session::{Arguments, Session, SessionStats};
pub use value::Value;

/// A shared, immutable array of constant data, compared by bit pattern.
#[derive(Clone)]
pub struct Data(Arc<ArrayD<f64>>);

impl Data {
    pub fn new(array: ArrayD<f64>) -> Self {
        Self(Arc::new(array))
    }

    pub fn array(&self) -> &ArrayD<f64> {
        &self.0
    }

    /// A shared table of per-element data, for use with [`Evaluable::elemwise`].
    pub fn table(arrays: Vec<ArrayD<f64>>) -> Arc<[Data]> {
        arrays.into_iter().map(Data::new).collect()
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.shape() == other.0.shape()
                && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.to_bits() == b.to_bits()))
    }
}

impl Eq for Data {}

impl Hash for Data {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.shape().hash(state);
        self.0.iter().for_each(|&x| OrderedFloat(x).hash(state));
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data{:?}", self.0.shape())
    }
}

/// Identifies a loop: its index name and its length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId {
    name: Arc<str>,
    length: usize,
}

impl LoopId {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// The transform chain at an evaluable position of a transform sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainRef {
    sequence: TransformSequence,
    index: Evaluable,
}

impl ChainRef {
    /// # Panics
    ///
    /// Panics if `index` is not a scalar.
    pub fn new(sequence: TransformSequence, index: Evaluable) -> Self {
        assert_eq!(index.ndim(), 0, "Chain index must be a scalar.");
        Self { sequence, index }
    }

    pub fn sequence(&self) -> &TransformSequence {
        &self.sequence
    }

    pub fn index(&self) -> &Evaluable {
        &self.index
    }

    pub fn todims(&self) -> usize {
        self.sequence.todims()
    }

    pub fn fromdims(&self) -> usize {
        self.sequence.fromdims()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Constant(Data),
    Argument { name: Arc<str>, shape: Vec<usize> },
    LoopIndex(LoopId),
    ElementCoords { points: PointsSequence, index: Evaluable },
    ElementWeights { points: PointsSequence, index: Evaluable },
    ApplyTransforms { chain: ChainRef, coords: Evaluable },
    TransformLinear { chain: ChainRef },
    TransformsIndex { target: TransformSequence, chain: ChainRef },
    TransformsCoords { target: TransformSequence, chain: ChainRef, coords: Evaluable },
    Elemwise { table: Arc<[Data]>, index: Evaluable },
    Range { length: Evaluable, offset: Evaluable },
    SizeOf { array: Evaluable, axis: usize },
    Add(Evaluable, Evaluable),
    Multiply(Evaluable, Evaluable),
    Negative(Evaluable),
    Power(Evaluable, Evaluable),
    Sum { array: Evaluable, axis: usize },
    InsertAxis { array: Evaluable, axis: usize, length: Evaluable },
    Transpose { array: Evaluable, axes: Vec<usize> },
    Take { array: Evaluable, indices: Evaluable, axis: usize },
    VolumeForm(Evaluable),
    Sampled { coords: Evaluable, expect: Evaluable },
    LagrangeShape { coords: Evaluable },
    Inflate { array: Evaluable, indices: Evaluable, length: usize, axis: usize },
    LoopSum { body: Evaluable, index: LoopId },
}

impl Op {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Op::Constant(_) => "Constant",
            Op::Argument { .. } => "Argument",
            Op::LoopIndex(_) => "LoopIndex",
            Op::ElementCoords { .. } => "ElementCoords",
            Op::ElementWeights { .. } => "ElementWeights",
            Op::ApplyTransforms { .. } => "ApplyTransforms",
            Op::TransformLinear { .. } => "TransformLinear",
            Op::TransformsIndex { .. } => "TransformsIndex",
            Op::TransformsCoords { .. } => "TransformsCoords",
            Op::Elemwise { .. } => "Elemwise",
            Op::Range { .. } => "Range",
            Op::SizeOf { .. } => "SizeOf",
            Op::Add(..) => "Add",
            Op::Multiply(..) => "Multiply",
            Op::Negative(_) => "Negative",
            Op::Power(..) => "Power",
            Op::Sum { .. } => "Sum",
            Op::InsertAxis { .. } => "InsertAxis",
            Op::Transpose { .. } => "Transpose",
            Op::Take { .. } => "Take",
            Op::VolumeForm(_) => "VolumeForm",
            Op::Sampled { .. } => "Sampled",
            Op::LagrangeShape { .. } => "LagrangeShape",
            Op::Inflate { .. } => "Inflate",
            Op::LoopSum { .. } => "LoopSum",
        }
    }

    pub(crate) fn children(&self) -> Vec<&Evaluable> {
        match self {
            Op::Constant(_) | Op::Argument { .. } | Op::LoopIndex(_) => vec![],
            Op::ElementCoords { index, .. } | Op::ElementWeights { index, .. } | Op::Elemwise { index, .. } => {
                vec![index]
            }
            Op::ApplyTransforms { chain, coords } => vec![&chain.index, coords],
            Op::TransformLinear { chain } | Op::TransformsIndex { chain, .. } => vec![&chain.index],
            Op::TransformsCoords { chain, coords, .. } => vec![&chain.index, coords],
            Op::Range { length, offset } => vec![length, offset],
            Op::SizeOf { array, .. } | Op::Sum { array, .. } | Op::Transpose { array, .. } => vec![array],
            Op::Add(a, b) | Op::Multiply(a, b) | Op::Power(a, b) => vec![a, b],
            Op::Negative(a) | Op::VolumeForm(a) => vec![a],
            Op::InsertAxis { array, length, .. } => vec![array, length],
            Op::Take { array, indices, .. } | Op::Inflate { array, indices, .. } => vec![array, indices],
            Op::Sampled { coords, expect } => vec![coords, expect],
            Op::LagrangeShape { coords } => vec![coords],
            Op::LoopSum { body, .. } => vec![body],
        }
    }

    /// Rebuilds the operation with every operand replaced by `f(operand)`.
    pub(crate) fn map(&self, mut f: impl FnMut(&Evaluable) -> Evaluable) -> Op {
        fn chain(chain: &ChainRef, f: &mut impl FnMut(&Evaluable) -> Evaluable) -> ChainRef {
            ChainRef::new(chain.sequence.clone(), f(&chain.index))
        }
        match self {
            Op::Constant(_) | Op::Argument { .. } | Op::LoopIndex(_) => self.clone(),
            Op::ElementCoords { points, index } => Op::ElementCoords {
                points: points.clone(),
                index: f(index),
            },
            Op::ElementWeights { points, index } => Op::ElementWeights {
                points: points.clone(),
                index: f(index),
            },
            Op::ApplyTransforms { chain: c, coords } => {
                let c = chain(c, &mut f);
                Op::ApplyTransforms { chain: c, coords: f(coords) }
            }
            Op::TransformLinear { chain: c } => Op::TransformLinear { chain: chain(c, &mut f) },
            Op::TransformsIndex { target, chain: c } => Op::TransformsIndex {
                target: target.clone(),
                chain: chain(c, &mut f),
            },
            Op::TransformsCoords { target, chain: c, coords } => {
                let c = chain(c, &mut f);
                Op::TransformsCoords {
                    target: target.clone(),
                    chain: c,
                    coords: f(coords),
                }
            }
            Op::Elemwise { table, index } => Op::Elemwise {
                table: table.clone(),
                index: f(index),
            },
            Op::Range { length, offset } => Op::Range {
                length: f(length),
                offset: f(offset),
            },
            Op::SizeOf { array, axis } => Op::SizeOf {
                array: f(array),
                axis: *axis,
            },
            Op::Add(a, b) => Op::Add(f(a), f(b)),
            Op::Multiply(a, b) => Op::Multiply(f(a), f(b)),
            Op::Negative(a) => Op::Negative(f(a)),
            Op::Power(a, b) => Op::Power(f(a), f(b)),
            Op::Sum { array, axis } => Op::Sum {
                array: f(array),
                axis: *axis,
            },
            Op::InsertAxis { array, axis, length } => Op::InsertAxis {
                array: f(array),
                axis: *axis,
                length: f(length),
            },
            Op::Transpose { array, axes } => Op::Transpose {
                array: f(array),
                axes: axes.clone(),
            },
            Op::Take { array, indices, axis } => Op::Take {
                array: f(array),
                indices: f(indices),
                axis: *axis,
            },
            Op::VolumeForm(a) => Op::VolumeForm(f(a)),
            Op::Sampled { coords, expect } => Op::Sampled {
                coords: f(coords),
                expect: f(expect),
            },
            Op::LagrangeShape { coords } => Op::LagrangeShape { coords: f(coords) },
            Op::Inflate {
                array,
                indices,
                length,
                axis,
            } => Op::Inflate {
                array: f(array),
                indices: f(indices),
                length: *length,
                axis: *axis,
            },
            Op::LoopSum { body, index } => Op::LoopSum {
                body: f(body),
                index: index.clone(),
            },
        }
    }
}

struct Node {
    op: Op,
    shape: Vec<Option<usize>>,
    loop_deps: Vec<LoopId>,
    hash: u64,
}

/// A node of an evaluable graph.
///
/// Cloning is cheap. Equality and hashing are structural.
#[derive(Clone)]
pub struct Evaluable(Arc<Node>);

fn merge_shapes(operation: &str, a: &[Option<usize>], b: &[Option<usize>]) -> Vec<Option<usize>> {
    assert_eq!(a.len(), b.len(), "Operands of {operation} must have the same number of dimensions.");
    a.iter()
        .zip(b)
        .map(|(&m, &n)| match (m, n) {
            (Some(m), Some(n)) => {
                assert_eq!(m, n, "Operands of {operation} have incompatible shapes {a:?} and {b:?}.");
                Some(m)
            }
            (m, n) => m.or(n),
        })
        .collect()
}

fn infer_shape(op: &Op) -> Vec<Option<usize>> {
    match op {
        Op::Constant(data) => data.array().shape().iter().copied().map(Some).collect(),
        Op::Argument { shape, .. } => shape.iter().copied().map(Some).collect(),
        Op::LoopIndex(_) | Op::TransformsIndex { .. } | Op::SizeOf { .. } | Op::VolumeForm(_) => vec![],
        Op::ElementCoords { points, .. } => vec![points.uniform_npoints(), points.ndims()],
        Op::ElementWeights { points, .. } => vec![points.uniform_npoints()],
        Op::ApplyTransforms { chain, coords } => vec![coords.shape()[0], Some(chain.todims())],
        Op::TransformLinear { chain } => vec![Some(chain.todims()), Some(chain.fromdims())],
        Op::TransformsCoords { target, coords, .. } => vec![coords.shape()[0], Some(target.fromdims())],
        Op::Elemwise { table, .. } => {
            let ndim = table.first().map(|data| data.array().ndim()).unwrap_or(0);
            assert!(
                table.iter().all(|data| data.array().ndim() == ndim),
                "Elemwise data must have a uniform number of dimensions."
            );
            (0..ndim)
                .map(|axis| {
                    let mut extents = table.iter().map(|data| data.array().shape()[axis]);
                    let first = extents.next()?;
                    extents.all(|extent| extent == first).then_some(first)
                })
                .collect()
        }
        Op::Range { length, .. } => vec![length.as_static_usize()],
        Op::Add(a, b) => merge_shapes("Add", a.shape(), b.shape()),
        Op::Multiply(a, b) => merge_shapes("Multiply", a.shape(), b.shape()),
        Op::Power(a, b) => merge_shapes("Power", a.shape(), b.shape()),
        Op::Negative(a) => a.shape().to_vec(),
        Op::Sum { array, axis } => {
            let mut shape = array.shape().to_vec();
            shape.remove(*axis);
            shape
        }
        Op::InsertAxis { array, axis, length } => {
            let mut shape = array.shape().to_vec();
            shape.insert(*axis, length.as_static_usize());
            shape
        }
        Op::Transpose { array, axes } => axes.iter().map(|&axis| array.shape()[axis]).collect(),
        Op::Take { array, indices, axis } => {
            let mut shape = array.shape().to_vec();
            match indices.ndim() {
                0 => {
                    shape.remove(*axis);
                }
                1 => shape[*axis] = indices.shape()[0],
                _ => panic!("Take requires scalar or one-dimensional indices."),
            }
            shape
        }
        Op::Sampled { coords, expect } => vec![coords.shape()[0], expect.shape()[0]],
        Op::LagrangeShape { coords } => {
            let ndims = coords.shape()[1].expect("Lagrange shape functions need a static dimension.");
            vec![coords.shape()[0], Some(1 << ndims)]
        }
        Op::Inflate {
            array, length, axis, ..
        } => {
            let mut shape = array.shape().to_vec();
            shape[*axis] = Some(*length);
            shape
        }
        Op::LoopSum { body, .. } => body.shape().to_vec(),
    }
}

impl Evaluable {
    fn new(op: Op) -> Self {
        let shape = infer_shape(&op);
        let loop_deps = match &op {
            Op::LoopIndex(id) => vec![id.clone()],
            Op::LoopSum { body, index } => body.loop_deps().iter().filter(|&id| id != index).cloned().collect(),
            op => op
                .children()
                .into_iter()
                .flat_map(|child| child.loop_deps().iter().cloned())
                .sorted()
                .dedup()
                .collect(),
        };
        let mut hasher = FxHasher::default();
        op.hash(&mut hasher);
        Self(Arc::new(Node {
            op,
            shape,
            loop_deps,
            hash: hasher.finish(),
        }))
    }

    pub(crate) fn op(&self) -> &Op {
        &self.0.op
    }

    /// Statically inferred shape. `None` marks extents known only at evaluation time.
    pub fn shape(&self) -> &[Option<usize>] {
        &self.0.shape
    }

    pub fn ndim(&self) -> usize {
        self.0.shape.len()
    }

    /// Loops whose index this node refers to without being enclosed by their loop sum.
    pub fn loop_deps(&self) -> &[LoopId] {
        &self.0.loop_deps
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Name of the operation, as reported in [`SessionStats`].
    pub fn op_name(&self) -> &'static str {
        self.0.op.name()
    }

    /// Returns the value of a scalar node if it is known without evaluation.
    pub fn as_static_usize(&self) -> Option<usize> {
        match self.op() {
            Op::Constant(data) if data.array().ndim() == 0 => {
                let value = *data.array().first()?;
                (value >= 0.0 && value.fract() == 0.0).then_some(value as usize)
            }
            Op::SizeOf { array, axis } => array.shape()[*axis],
            _ => None,
        }
    }

    pub fn constant(array: ArrayD<f64>) -> Self {
        Self::new(Op::Constant(Data::new(array)))
    }

    pub fn shared_constant(data: Data) -> Self {
        Self::new(Op::Constant(data))
    }

    pub fn scalar(value: f64) -> Self {
        Self::constant(arr0(value).into_dyn())
    }

    pub fn argument(name: impl Into<Arc<str>>, shape: Vec<usize>) -> Self {
        Self::new(Op::Argument {
            name: name.into(),
            shape,
        })
    }

    pub fn loop_index(name: impl Into<Arc<str>>, length: usize) -> Self {
        Self::new(Op::LoopIndex(LoopId {
            name: name.into(),
            length,
        }))
    }

    /// Local coordinates of the points of element `index`, shape `[npoints, ndims]`.
    pub fn element_coords(points: PointsSequence, index: Evaluable) -> Self {
        Self::new(Op::ElementCoords { points, index })
    }

    /// Integration weights of the points of element `index`, shape `[npoints]`.
    pub fn element_weights(points: PointsSequence, index: Evaluable) -> Self {
        Self::new(Op::ElementWeights { points, index })
    }

    /// Maps local coordinates through a transform chain, shape `[npoints, todims]`.
    pub fn apply_transforms(chain: ChainRef, coords: Evaluable) -> Self {
        Self::new(Op::ApplyTransforms { chain, coords })
    }

    /// The linear part of a transform chain, shape `[todims, fromdims]`.
    pub fn transform_linear(chain: ChainRef) -> Self {
        Self::new(Op::TransformLinear { chain })
    }

    /// Position in `target` of the element that `chain` belongs to.
    pub fn transforms_index(target: TransformSequence, chain: ChainRef) -> Self {
        if chain.sequence == target {
            return chain.index;
        }
        Self::new(Op::TransformsIndex { target, chain })
    }

    /// `coords`, given relative to `chain`, mapped into the element of `target` that `chain`
    /// belongs to.
    pub fn transforms_coords(target: TransformSequence, chain: ChainRef, coords: Evaluable) -> Self {
        if chain.sequence == target {
            return coords;
        }
        Self::new(Op::TransformsCoords { target, chain, coords })
    }

    /// Selects `table[index]`.
    pub fn elemwise(table: Arc<[Data]>, index: Evaluable) -> Self {
        Self::new(Op::Elemwise { table, index })
    }

    /// The integers `offset, offset + 1, ..., offset + length - 1`.
    pub fn range(length: Evaluable, offset: Evaluable) -> Self {
        Self::new(Op::Range { length, offset })
    }

    /// The extent of `array` along `axis`, as a scalar.
    pub fn size_of(array: &Evaluable, axis: usize) -> Self {
        match array.shape()[axis] {
            Some(n) => Self::scalar(n as f64),
            None => Self::new(Op::SizeOf {
                array: array.clone(),
                axis,
            }),
        }
    }

    pub fn add(a: Evaluable, b: Evaluable) -> Self {
        Self::new(Op::Add(a, b))
    }

    pub fn multiply(a: Evaluable, b: Evaluable) -> Self {
        Self::new(Op::Multiply(a, b))
    }

    pub fn negative(a: Evaluable) -> Self {
        Self::new(Op::Negative(a))
    }

    pub fn power(a: Evaluable, b: Evaluable) -> Self {
        Self::new(Op::Power(a, b))
    }

    pub fn sum(array: Evaluable, axis: usize) -> Self {
        assert!(axis < array.ndim(), "Sum axis out of bounds.");
        Self::new(Op::Sum { array, axis })
    }

    /// Inserts an axis at `axis` along which `array` is repeated `length` times.
    pub fn insert_axis(array: Evaluable, axis: usize, length: Evaluable) -> Self {
        assert!(axis <= array.ndim(), "Inserted axis out of bounds.");
        assert_eq!(length.ndim(), 0, "Length of an inserted axis must be a scalar.");
        Self::new(Op::InsertAxis { array, axis, length })
    }

    /// Axis `i` of the result is axis `axes[i]` of `array`.
    pub fn transpose(array: Evaluable, axes: Vec<usize>) -> Self {
        assert!(
            axes.len() == array.ndim() && axes.iter().sorted().copied().eq(0..array.ndim()),
            "Transpose requires a permutation of the axes."
        );
        if axes.iter().enumerate().all(|(i, &axis)| i == axis) {
            return array;
        }
        Self::new(Op::Transpose { array, axes })
    }

    /// Selects entries along `axis`. Scalar indices remove the axis.
    pub fn take(array: Evaluable, indices: Evaluable, axis: usize) -> Self {
        assert!(axis < array.ndim(), "Take axis out of bounds.");
        if let Op::InsertAxis {
            array: inner,
            axis: inserted,
            length,
        } = array.op()
        {
            // Repeated entries are all equal, so taking from them only changes the repetition
            if *inserted == axis {
                return match indices.ndim() {
                    0 => inner.clone(),
                    _ => Self::insert_axis(inner.clone(), axis, Self::size_of(&indices, 0)),
                };
            }
            let inner_axis = if *inserted < axis { axis - 1 } else { axis };
            let taken = Self::take(inner.clone(), indices.clone(), inner_axis);
            let outer_axis = if indices.ndim() == 0 && axis < *inserted {
                inserted - 1
            } else {
                *inserted
            };
            return Self::insert_axis(taken, outer_axis, length.clone());
        }
        Self::new(Op::Take { array, indices, axis })
    }

    /// The volume scaling of a linear map of shape `[todims, fromdims]`.
    pub fn volume_form(jacobian: Evaluable) -> Self {
        assert_eq!(jacobian.ndim(), 2, "Volume form requires a matrix.");
        Self::new(Op::VolumeForm(jacobian))
    }

    /// The identity on the points `expect`, shape `[npoints, nexpect]`.
    ///
    /// Evaluation fails unless `coords` coincide with `expect`.
    pub fn sampled(coords: Evaluable, expect: Evaluable) -> Self {
        Self::new(Op::Sampled { coords, expect })
    }

    /// First-order tensor-product Lagrange shape functions on the unit hypercube.
    pub fn lagrange_shape(coords: Evaluable) -> Self {
        Self::new(Op::LagrangeShape { coords })
    }

    /// Scatters axis `axis` of `array` into an axis of extent `length` at positions `indices`.
    pub fn inflate(array: Evaluable, indices: Evaluable, length: usize, axis: usize) -> Self {
        assert!(axis < array.ndim(), "Inflate axis out of bounds.");
        assert_eq!(indices.ndim(), 1, "Inflate requires one-dimensional indices.");
        Self::new(Op::Inflate {
            array,
            indices,
            length,
            axis,
        })
    }

    /// Sums `body` over all values of the loop index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a loop index.
    pub fn loop_sum(body: Evaluable, index: &Evaluable) -> Self {
        let Op::LoopIndex(index) = index.op() else {
            panic!("Loop sums require a loop index.");
        };
        Self::new(Op::LoopSum {
            body,
            index: index.clone(),
        })
    }

    pub(crate) fn from_op(op: Op) -> Self {
        Self::new(op)
    }
}

impl PartialEq for Evaluable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.hash == other.0.hash && self.0.shape == other.0.shape && self.0.op == other.0.op)
    }
}

impl Eq for Evaluable {}

impl Hash for Evaluable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl fmt::Debug for Evaluable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self
            .shape()
            .iter()
            .map(|n| n.map_or_else(|| "?".to_string(), |n| n.to_string()))
            .join(",");
        write!(f, "{}<{}>", self.op_name(), shape)
    }
}

/// A bundle of evaluables that are executed jointly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    items: Vec<Evaluable>,
}

impl Tuple {
    pub fn new(items: Vec<Evaluable>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Evaluable] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.unique_nodes().len()
    }

    /// All distinct nodes, children before parents.
    pub(crate) fn unique_nodes(&self) -> Vec<Evaluable> {
        let mut visited = rustc_hash::FxHashSet::default();
        let mut order = Vec::new();
        let mut stack: Vec<(Evaluable, bool)> = self.items.iter().rev().map(|item| (item.clone(), false)).collect();
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
            } else if visited.insert(node.clone()) {
                stack.push((node.clone(), true));
                for child in node.op().children().into_iter().rev() {
                    if !visited.contains(child) {
                        stack.push((child.clone(), false));
                    }
                }
            }
        }
        order
    }
}
