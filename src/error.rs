//! Error types.
//!
//! Errors are split by the stage at which they are detected: constructing a [`Sample`](crate::sample::Sample)
//! ([`SampleError`]), lowering expressions into an evaluable graph ([`LowerError`]) and executing
//! that graph ([`EvaluationError`]). The evaluation pipeline reports all of them through
//! [`eyre::Report`] without altering them, so callers can recover the typed error with
//! [`eyre::Report::downcast_ref`].
use samplex_sparse::SparseError;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors raised while constructing or deriving samples.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SampleError {
    /// At least one transform sequence is required.
    NoTransforms,
    /// A transform sequence does not have one chain per point set.
    ElementCountMismatch { expected: usize, actual: usize },
    /// A point set does not have the dimension of the sample.
    DimensionMismatch { element: usize, expected: usize, actual: usize },
    /// A custom index does not have one entry per element.
    IndexCountMismatch { expected: usize, actual: usize },
    /// A custom index entry does not have one index per local point.
    IndexLengthMismatch { element: usize, expected: usize, actual: usize },
    /// A custom index refers to a point beyond the total point count.
    IndexOutOfBounds { element: usize, index: usize, npoints: usize },
    /// A selection mask does not have one entry per point.
    MaskLengthMismatch { expected: usize, actual: usize },
    /// The points do not expose the requested connectivity.
    ConnectivityUnavailable { what: &'static str },
}

impl Display for SampleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTransforms => write!(f, "a sample requires at least one transform sequence"),
            Self::ElementCountMismatch { expected, actual } => {
                write!(f, "expected {expected} transform chains (one per point set) but got {actual}")
            }
            Self::DimensionMismatch {
                element,
                expected,
                actual,
            } => write!(
                f,
                "points of element {element} are {actual}-dimensional, expected {expected} dimensions"
            ),
            Self::IndexCountMismatch { expected, actual } => {
                write!(f, "expected an index with {expected} items but got {actual}")
            }
            Self::IndexLengthMismatch {
                element,
                expected,
                actual,
            } => write!(
                f,
                "index of element {element} has length {actual}, but the element has {expected} points"
            ),
            Self::IndexOutOfBounds { element, index, npoints } => write!(
                f,
                "index {index} of element {element} is out of bounds for a sample with {npoints} points"
            ),
            Self::MaskLengthMismatch { expected, actual } => {
                write!(f, "expected a mask with {expected} entries but got {actual}")
            }
            Self::ConnectivityUnavailable { what } => write!(f, "points do not provide {what} connectivity"),
        }
    }
}

impl Error for SampleError {}

/// Errors raised while lowering expressions to evaluables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LowerError {
    /// A sample-bound expression was lowered inside another sample-bound expression.
    NestedSample,
    /// Integration over points that carry no weights.
    MissingWeights,
    /// The expression needs transform chains and coordinates, but none are bound.
    Unbound { what: &'static str },
    /// The lowered evaluable does not have the dimension of the expression.
    ShapeMismatch { expected: usize, actual: usize },
}

impl Display for LowerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NestedSample => write!(f, "nested integrals or samples are not supported"),
            Self::MissingWeights => write!(f, "cannot integrate over points without weights"),
            Self::Unbound { what } => write!(f, "{what} can only be evaluated on a sample"),
            Self::ShapeMismatch { expected, actual } => {
                write!(f, "lowered evaluable has {actual} dimensions, expected {expected}")
            }
        }
    }
}

impl Error for LowerError {}

/// Errors raised while executing an evaluable graph.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EvaluationError {
    /// The graph refers to an argument that was not supplied.
    MissingArgument { name: String },
    /// An argument was supplied that the graph does not refer to.
    UnknownArgument { name: String },
    /// A supplied argument does not have the declared shape.
    ArgumentShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// Operands of an operation have incompatible shapes.
    ShapeMismatch {
        operation: &'static str,
        shapes: Vec<Vec<usize>>,
    },
    /// An index is negative, non-integral or out of bounds.
    InvalidIndex { operation: &'static str, value: f64, extent: usize },
    /// A transform chain is not part of the target transform sequence.
    TransformNotFound,
    /// A sampled function was evaluated at points other than its own.
    SampledPointsMismatch,
    /// A loop index was evaluated outside of its loop.
    UnboundLoopIndex { name: String },
    /// Sparse data produced during evaluation is inconsistent.
    MalformedSparse(SparseError),
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArgument { name } => write!(f, "argument {name:?} is required but was not supplied"),
            Self::UnknownArgument { name } => write!(f, "argument {name:?} is not used by the evaluated expressions"),
            Self::ArgumentShapeMismatch { name, expected, actual } => write!(
                f,
                "argument {name:?} has shape {actual:?}, expected {expected:?}"
            ),
            Self::ShapeMismatch { operation, shapes } => {
                write!(f, "incompatible operand shapes {shapes:?} in {operation}")
            }
            Self::InvalidIndex {
                operation,
                value,
                extent,
            } => write!(f, "invalid index {value} for extent {extent} in {operation}"),
            Self::TransformNotFound => write!(f, "transform chain not found in transform sequence"),
            Self::SampledPointsMismatch => {
                write!(f, "sampled function evaluated at points that differ from the sampled points")
            }
            Self::UnboundLoopIndex { name } => write!(f, "loop index {name:?} evaluated outside of its loop"),
            Self::MalformedSparse(err) => write!(f, "malformed sparse data: {err}"),
        }
    }
}

impl Error for EvaluationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedSparse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SparseError> for EvaluationError {
    fn from(err: SparseError) -> Self {
        Self::MalformedSparse(err)
    }
}
