//! Array-valued expressions on samples.
//!
//! An [`Array`] is a symbolic expression with a static shape and dtype. It has no value by itself:
//! it is *lowered* into an [`Evaluable`] given the transform chains and local coordinates of the
//! points at which it is to be evaluated ([`LowerArgs`]). A lowering that is bound to points
//! carries one extra leading axis, the point axis.
//!
//! Expressions that are not bound to points (such as an [`Integral`](crate::sample::Integral)
//! or compositions of integrals) can be evaluated directly with [`Array::eval`].
use crate::config::EvaluationConfig;
use crate::error::LowerError;
use crate::evaluable::{Arguments, ChainRef, Data, Evaluable};
use crate::integrate::eval_integrals_sparse_with_config;
use ndarray::{ArrayD, IxDyn};
use std::fmt;
use std::ops;
use std::sync::Arc;

/// Element type of an expression. Values are always computed in floating point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dtype {
    Bool,
    Int,
    Float,
}

/// The points at which an expression is lowered.
#[derive(Debug, Clone, Default)]
pub struct LowerArgs {
    chains: Vec<ChainRef>,
    coordinates: Vec<Evaluable>,
    check_ndim: bool,
}

impl LowerArgs {
    /// Arguments for expressions that are not evaluated at points.
    ///
    /// The dimension check follows the `lower` flag of the global configuration.
    pub fn unbound() -> Self {
        Self::default().with_ndim_check(EvaluationConfig::global().debug.lower)
    }

    /// # Panics
    ///
    /// Panics if there are no chains, or not one set of coordinates per chain.
    pub fn bound(chains: Vec<ChainRef>, coordinates: Vec<Evaluable>) -> Self {
        assert!(!chains.is_empty(), "Bound lowering requires at least one transform chain.");
        assert_eq!(chains.len(), coordinates.len(), "Expected one set of coordinates per chain.");
        Self {
            chains,
            coordinates,
            check_ndim: EvaluationConfig::global().debug.lower,
        }
    }

    /// Whether every lowered evaluable is checked to have the dimension of its expression.
    pub fn with_ndim_check(self, check_ndim: bool) -> Self {
        Self { check_ndim, ..self }
    }

    pub fn checks_ndim(&self) -> bool {
        self.check_ndim
    }

    pub fn is_bound(&self) -> bool {
        !self.chains.is_empty()
    }

    pub fn chains(&self) -> &[ChainRef] {
        &self.chains
    }

    pub fn coordinates(&self) -> &[Evaluable] {
        &self.coordinates
    }

    /// Number of leading axes that lowering adds.
    pub fn point_axes(&self) -> usize {
        usize::from(self.is_bound())
    }

    /// The first chain and its coordinates, or an error naming `what` needs them.
    pub fn primary(&self, what: &'static str) -> Result<(&ChainRef, &Evaluable), LowerError> {
        match (self.chains.first(), self.coordinates.first()) {
            (Some(chain), Some(coords)) => Ok((chain, coords)),
            _ => Err(LowerError::Unbound { what }),
        }
    }

    /// Repeats a point-independent evaluable along a new leading point axis, if bound.
    pub fn broadcast_points(&self, evaluable: Evaluable) -> Evaluable {
        match self.coordinates.first() {
            Some(coords) => Evaluable::insert_axis(evaluable, 0, Evaluable::size_of(coords, 0)),
            None => evaluable,
        }
    }
}

/// Expressions that provide their own lowering.
pub trait Lower: fmt::Debug + Send + Sync {
    fn lower(&self, args: &LowerArgs) -> Result<Evaluable, LowerError>;
}

#[derive(Debug)]
enum FuncOp {
    Constant(Data),
    Argument(Arc<str>),
    Coordinates,
    VolumeForm,
    Add(Array, Array),
    Multiply(Array, Array),
    Negative(Array),
    Power(Array, f64),
    Sum(Array, usize),
    InsertAxis(Array, usize),
    Transpose(Array, Vec<usize>),
    Take(Array, Data, usize),
    Inflate { array: Array, indices: Data, axis: usize },
    Custom(Arc<dyn Lower>),
}

/// A symbolic array.
///
/// Cloning is cheap. Arithmetic between arrays of different shapes is only defined if one of
/// them is a scalar, which is then repeated to the shape of the other.
#[derive(Debug, Clone)]
pub struct Array {
    shape: Vec<usize>,
    dtype: Dtype,
    op: Arc<FuncOp>,
}

fn index_data(indices: &[usize]) -> Data {
    Data::new(ArrayD::from_shape_fn(IxDyn(&[indices.len()]), |i| indices[i[0]] as f64))
}

impl Array {
    fn new(shape: Vec<usize>, dtype: Dtype, op: FuncOp) -> Self {
        Self {
            shape,
            dtype,
            op: Arc::new(op),
        }
    }

    /// An array whose lowering is provided by `lower`.
    pub fn from_lower(shape: Vec<usize>, dtype: Dtype, lower: impl Lower + 'static) -> Self {
        Self::new(shape, dtype, FuncOp::Custom(Arc::new(lower)))
    }

    pub fn constant(data: ArrayD<f64>) -> Self {
        Self::new(data.shape().to_vec(), Dtype::Float, FuncOp::Constant(Data::new(data)))
    }

    pub fn integer(data: ArrayD<i64>) -> Self {
        let shape = data.shape().to_vec();
        Self::new(shape, Dtype::Int, FuncOp::Constant(Data::new(data.mapv(|x| x as f64))))
    }

    pub fn boolean(data: ArrayD<bool>) -> Self {
        let shape = data.shape().to_vec();
        let data = data.mapv(|x| if x { 1.0 } else { 0.0 });
        Self::new(shape, Dtype::Bool, FuncOp::Constant(Data::new(data)))
    }

    pub fn scalar(value: f64) -> Self {
        Self::constant(ndarray::arr0(value).into_dyn())
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::constant(ArrayD::zeros(IxDyn(shape)))
    }

    /// A free parameter, bound by name at evaluation time.
    pub fn argument(name: &str, shape: &[usize]) -> Self {
        Self::new(shape.to_vec(), Dtype::Float, FuncOp::Argument(name.into()))
    }

    /// The global coordinates of the evaluation points.
    pub fn coordinates(ndims: usize) -> Self {
        Self::new(vec![ndims], Dtype::Float, FuncOp::Coordinates)
    }

    /// The volume (or surface) scaling of the map from local to global coordinates.
    pub fn volume_form() -> Self {
        Self::new(vec![], Dtype::Float, FuncOp::VolumeForm)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    fn broadcast_to(&self, shape: &[usize]) -> Array {
        if self.shape == shape {
            return self.clone();
        }
        assert!(
            self.shape.is_empty(),
            "Cannot broadcast an array of shape {:?} to shape {:?}.",
            self.shape,
            shape
        );
        shape
            .iter()
            .enumerate()
            .fold(self.clone(), |array, (axis, &length)| array.insert_axis(axis, length))
    }

    fn binary(&self, other: &Array, operation: &str) -> (Array, Array, Vec<usize>) {
        let shape = if self.shape.is_empty() {
            other.shape.clone()
        } else {
            self.shape.clone()
        };
        assert!(
            other.shape.is_empty() || other.shape == shape,
            "Operands of {operation} have incompatible shapes {:?} and {:?}.",
            self.shape,
            other.shape
        );
        (self.broadcast_to(&shape), other.broadcast_to(&shape), shape)
    }

    /// # Panics
    ///
    /// Panics if the shapes are incompatible.
    pub fn add(&self, other: &Array) -> Array {
        let (a, b, shape) = self.binary(other, "addition");
        let dtype = a.dtype.max(b.dtype).max(Dtype::Int);
        Self::new(shape, dtype, FuncOp::Add(a, b))
    }

    pub fn sub(&self, other: &Array) -> Array {
        self.add(&other.neg())
    }

    /// Elementwise product.
    ///
    /// # Panics
    ///
    /// Panics if the shapes are incompatible.
    pub fn mul(&self, other: &Array) -> Array {
        let (a, b, shape) = self.binary(other, "multiplication");
        let dtype = a.dtype.max(b.dtype);
        Self::new(shape, dtype, FuncOp::Multiply(a, b))
    }

    pub fn neg(&self) -> Array {
        Self::new(self.shape.clone(), self.dtype.max(Dtype::Int), FuncOp::Negative(self.clone()))
    }

    pub fn powf(&self, exponent: f64) -> Array {
        Self::new(self.shape.clone(), Dtype::Float, FuncOp::Power(self.clone(), exponent))
    }

    /// Sums over `axis`, removing it.
    pub fn sum(&self, axis: usize) -> Array {
        assert!(axis < self.ndim(), "Sum axis {axis} out of bounds for shape {:?}.", self.shape);
        let mut shape = self.shape.clone();
        shape.remove(axis);
        Self::new(shape, self.dtype.max(Dtype::Int), FuncOp::Sum(self.clone(), axis))
    }

    /// Inserts a new axis at `axis` along which the array is repeated `length` times.
    pub fn insert_axis(&self, axis: usize, length: usize) -> Array {
        assert!(axis <= self.ndim(), "Inserted axis {axis} out of bounds for shape {:?}.", self.shape);
        let mut shape = self.shape.clone();
        shape.insert(axis, length);
        Self::new(shape, self.dtype, FuncOp::InsertAxis(self.clone(), axis))
    }

    /// Axis `i` of the result is axis `axes[i]` of `self`.
    pub fn transpose(&self, axes: &[usize]) -> Array {
        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        assert!(
            sorted.iter().copied().eq(0..self.ndim()),
            "Transpose requires a permutation of the axes."
        );
        let shape = axes.iter().map(|&axis| self.shape[axis]).collect();
        Self::new(shape, self.dtype, FuncOp::Transpose(self.clone(), axes.to_vec()))
    }

    /// Selects the entries at `indices` along `axis`.
    pub fn take(&self, indices: &[usize], axis: usize) -> Array {
        assert!(axis < self.ndim(), "Take axis {axis} out of bounds for shape {:?}.", self.shape);
        assert!(
            indices.iter().all(|&i| i < self.shape[axis]),
            "Take index out of bounds for extent {}.",
            self.shape[axis]
        );
        let mut shape = self.shape.clone();
        shape[axis] = indices.len();
        Self::new(shape, self.dtype, FuncOp::Take(self.clone(), index_data(indices), axis))
    }

    /// Scatters axis `axis` into an axis of extent `length`, placing entry `i` at `indices[i]`.
    ///
    /// Indices must be distinct.
    pub fn inflate(&self, indices: &[usize], length: usize, axis: usize) -> Array {
        assert!(axis < self.ndim(), "Inflate axis {axis} out of bounds for shape {:?}.", self.shape);
        assert_eq!(indices.len(), self.shape[axis], "Expected one index per entry along the inflated axis.");
        assert!(indices.iter().all(|&i| i < length), "Inflate index out of bounds.");
        let mut shape = self.shape.clone();
        shape[axis] = length;
        let op = FuncOp::Inflate {
            array: self.clone(),
            indices: index_data(indices),
            axis,
        };
        Self::new(shape, self.dtype, op)
    }

    /// Outer product: the result has shape `[*self.shape, *other.shape]`.
    pub fn outer(&self, other: &Array) -> Array {
        let n = self.ndim();
        let a = other
            .shape
            .iter()
            .fold(self.clone(), |a, &length| a.insert_axis(a.ndim(), length));
        let b = self
            .shape
            .iter()
            .enumerate()
            .fold(other.clone(), |b, (axis, &length)| b.insert_axis(axis, length));
        debug_assert_eq!(a.ndim(), n + other.ndim());
        a.mul(&b)
    }

    /// Elementwise product summed over `axis`.
    pub fn dot(&self, other: &Array, axis: usize) -> Array {
        self.mul(other).sum(axis)
    }

    /// Contracts the last axis of `self` with the first axis of `other`.
    ///
    /// # Panics
    ///
    /// Panics if the contracted extents differ.
    pub fn matmat(&self, other: &Array) -> Array {
        let (Some(&n), Some(&m)) = (self.shape.last(), other.shape.first()) else {
            panic!("Matrix products require at least one axis per operand.");
        };
        assert_eq!(n, m, "Contracted axes have different extents.");
        let leading = self.ndim() - 1;
        let a = other.shape[1..]
            .iter()
            .fold(self.clone(), |a, &length| a.insert_axis(a.ndim(), length));
        let b = self.shape[..leading]
            .iter()
            .enumerate()
            .fold(other.clone(), |b, (axis, &length)| b.insert_axis(axis, length));
        a.mul(&b).sum(leading)
    }

    /// Lowers the expression at the points described by `args`.
    pub fn lower(&self, args: &LowerArgs) -> Result<Evaluable, LowerError> {
        let lowered = self.lower_op(args)?;
        if args.checks_ndim() {
            let expected = self.ndim() + args.point_axes();
            if lowered.ndim() != expected {
                return Err(LowerError::ShapeMismatch {
                    expected,
                    actual: lowered.ndim(),
                });
            }
        }
        Ok(lowered)
    }

    fn lower_op(&self, args: &LowerArgs) -> Result<Evaluable, LowerError> {
        let offset = args.point_axes();
        Ok(match self.op.as_ref() {
            FuncOp::Constant(data) => args.broadcast_points(Evaluable::shared_constant(data.clone())),
            FuncOp::Argument(name) => args.broadcast_points(Evaluable::argument(name.clone(), self.shape.clone())),
            FuncOp::Coordinates => {
                let (chain, coords) = args.primary("coordinates")?;
                Evaluable::apply_transforms(chain.clone(), coords.clone())
            }
            FuncOp::VolumeForm => {
                let (chain, _) = args.primary("the volume form")?;
                let jacobian = Evaluable::transform_linear(chain.clone());
                args.broadcast_points(Evaluable::volume_form(jacobian))
            }
            FuncOp::Add(a, b) => Evaluable::add(a.lower(args)?, b.lower(args)?),
            FuncOp::Multiply(a, b) => Evaluable::multiply(a.lower(args)?, b.lower(args)?),
            FuncOp::Negative(a) => Evaluable::negative(a.lower(args)?),
            FuncOp::Power(a, exponent) => {
                let a = a.lower(args)?;
                let exponent = Array::scalar(*exponent).broadcast_to(&self.shape).lower(args)?;
                Evaluable::power(a, exponent)
            }
            FuncOp::Sum(a, axis) => Evaluable::sum(a.lower(args)?, axis + offset),
            FuncOp::InsertAxis(a, axis) => {
                let length = Evaluable::scalar(self.shape[*axis] as f64);
                Evaluable::insert_axis(a.lower(args)?, axis + offset, length)
            }
            FuncOp::Transpose(a, axes) => {
                let axes = (0..offset).chain(axes.iter().map(|axis| axis + offset)).collect();
                Evaluable::transpose(a.lower(args)?, axes)
            }
            FuncOp::Take(a, indices, axis) => {
                Evaluable::take(a.lower(args)?, Evaluable::shared_constant(indices.clone()), axis + offset)
            }
            FuncOp::Inflate { array, indices, axis } => Evaluable::inflate(
                array.lower(args)?,
                Evaluable::shared_constant(indices.clone()),
                self.shape[*axis],
                axis + offset,
            ),
            FuncOp::Custom(lower) => lower.lower(args)?,
        })
    }

    /// The lowering used for joint evaluation: an unbound evaluable producing sparse data.
    pub fn as_evaluable_sparse(&self) -> Result<Evaluable, LowerError> {
        self.as_evaluable_sparse_with_config(EvaluationConfig::global())
    }

    pub fn as_evaluable_sparse_with_config(&self, config: &EvaluationConfig) -> Result<Evaluable, LowerError> {
        self.lower(&LowerArgs::default().with_ndim_check(config.debug.lower))
    }

    /// Evaluates an expression that is not bound to points.
    pub fn eval(&self, arguments: &Arguments) -> eyre::Result<ArrayD<f64>> {
        self.eval_with_config(arguments, EvaluationConfig::global())
    }

    pub fn eval_with_config(&self, arguments: &Arguments, config: &EvaluationConfig) -> eyre::Result<ArrayD<f64>> {
        let mut results = eval_integrals_sparse_with_config(std::slice::from_ref(self), arguments, config)?;
        Ok(results.pop().map(|data| data.to_dense()).unwrap_or_default())
    }
}

impl ops::Add for &Array {
    type Output = Array;

    fn add(self, rhs: &Array) -> Array {
        Array::add(self, rhs)
    }
}

impl ops::Sub for &Array {
    type Output = Array;

    fn sub(self, rhs: &Array) -> Array {
        Array::sub(self, rhs)
    }
}

impl ops::Mul for &Array {
    type Output = Array;

    fn mul(self, rhs: &Array) -> Array {
        Array::mul(self, rhs)
    }
}

impl ops::Neg for &Array {
    type Output = Array;

    fn neg(self) -> Array {
        Array::neg(self)
    }
}
