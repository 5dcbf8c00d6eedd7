//! Runtime values and the kernels that compute them.
use crate::error::EvaluationError;
use crate::nalgebra::DMatrix;
use ndarray::{arr0, Array1, ArrayD, ArrayView2, Axis, Ix2, IxDyn, Zip};
use samplex_sparse::SparseData;
use std::borrow::Cow;

/// The value of an evaluable: a dense array or sparse coordinate data.
///
/// Integer and boolean data are represented by their floating point values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Dense(ArrayD<f64>),
    Sparse(SparseData),
}

impl Value {
    pub fn shape(&self) -> &[usize] {
        match self {
            Value::Dense(array) => array.shape(),
            Value::Sparse(data) => data.shape(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Value::Sparse(_))
    }

    /// Dense view of the value. Sparse values are densified, summing duplicates.
    pub fn dense(&self) -> Cow<'_, ArrayD<f64>> {
        match self {
            Value::Dense(array) => Cow::Borrowed(array),
            Value::Sparse(data) => Cow::Owned(data.to_dense()),
        }
    }

    pub fn into_dense(self) -> ArrayD<f64> {
        match self {
            Value::Dense(array) => array,
            Value::Sparse(data) => data.to_dense(),
        }
    }

    /// Sparse form of the value. Dense values list every entry.
    pub fn into_sparse(self) -> SparseData {
        match self {
            Value::Dense(array) => SparseData::from_dense(&array),
            Value::Sparse(data) => data,
        }
    }

    /// Adds `other` to `self` in place.
    pub(crate) fn accumulate(&mut self, other: &Value) -> Result<(), EvaluationError> {
        check_shapes("accumulation", self.shape(), other.shape())?;
        match (&mut *self, other) {
            (Value::Sparse(data), Value::Sparse(other)) => data.extend(other),
            (Value::Dense(array), other) => *array += &*other.dense(),
            (Value::Sparse(data), Value::Dense(other)) => {
                let mut array = data.to_dense();
                array += other;
                *self = Value::Dense(array);
            }
        }
        Ok(())
    }
}

pub(crate) fn scalar(value: f64) -> Value {
    Value::Dense(arr0(value).into_dyn())
}

fn check_shapes(operation: &'static str, a: &[usize], b: &[usize]) -> Result<(), EvaluationError> {
    if a == b {
        Ok(())
    } else {
        Err(EvaluationError::ShapeMismatch {
            operation,
            shapes: vec![a.to_vec(), b.to_vec()],
        })
    }
}

fn check_ndim(operation: &'static str, value: &Value, ndim: usize) -> Result<(), EvaluationError> {
    if value.shape().len() == ndim {
        Ok(())
    } else {
        Err(EvaluationError::ShapeMismatch {
            operation,
            shapes: vec![value.shape().to_vec()],
        })
    }
}

pub(crate) fn to_index(value: f64, extent: usize, operation: &'static str) -> Result<usize, EvaluationError> {
    if value >= 0.0 && value.fract() == 0.0 && value < extent as f64 {
        Ok(value as usize)
    } else {
        Err(EvaluationError::InvalidIndex {
            operation,
            value,
            extent,
        })
    }
}

pub(crate) fn scalar_index(value: &Value, extent: usize, operation: &'static str) -> Result<usize, EvaluationError> {
    check_ndim(operation, value, 0)?;
    let array = value.dense();
    let first = array.iter().next().copied().unwrap_or(f64::NAN);
    to_index(first, extent, operation)
}

pub(crate) fn index_list(value: &Value, extent: usize, operation: &'static str) -> Result<Vec<usize>, EvaluationError> {
    check_ndim(operation, value, 1)?;
    value
        .dense()
        .iter()
        .map(|&index| to_index(index, extent, operation))
        .collect()
}

fn with_matrix<T>(
    value: &Value,
    operation: &'static str,
    f: impl FnOnce(ArrayView2<f64>) -> T,
) -> Result<T, EvaluationError> {
    check_ndim(operation, value, 2)?;
    let array = value.dense();
    let matrix = array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| EvaluationError::ShapeMismatch {
            operation,
            shapes: vec![array.shape().to_vec()],
        })?;
    Ok(f(matrix))
}

pub(crate) fn add(a: &Value, b: &Value) -> Result<Value, EvaluationError> {
    let mut result = a.clone();
    result
        .accumulate(b)
        .map_err(|_| EvaluationError::ShapeMismatch {
            operation: "Add",
            shapes: vec![a.shape().to_vec(), b.shape().to_vec()],
        })?;
    Ok(result)
}

pub(crate) fn multiply(a: &Value, b: &Value) -> Result<Value, EvaluationError> {
    check_shapes("Multiply", a.shape(), b.shape())?;
    Ok(Value::Dense(&*a.dense() * &*b.dense()))
}

pub(crate) fn power(a: &Value, b: &Value) -> Result<Value, EvaluationError> {
    check_shapes("Power", a.shape(), b.shape())?;
    let mut result = a.dense().into_owned();
    Zip::from(&mut result)
        .and(&*b.dense())
        .for_each(|x, &exponent| *x = x.powf(exponent));
    Ok(Value::Dense(result))
}

pub(crate) fn negative(a: &Value) -> Value {
    match a {
        Value::Dense(array) => Value::Dense(-array),
        Value::Sparse(data) => {
            let mut data = data.clone();
            data.negate();
            Value::Sparse(data)
        }
    }
}

pub(crate) fn sum(a: &Value, axis: usize) -> Result<Value, EvaluationError> {
    if axis >= a.shape().len() {
        return Err(EvaluationError::ShapeMismatch {
            operation: "Sum",
            shapes: vec![a.shape().to_vec()],
        });
    }
    Ok(match a {
        Value::Dense(array) => Value::Dense(array.sum_axis(Axis(axis))),
        Value::Sparse(data) => Value::Sparse(data.clone().sum_axis(axis)),
    })
}

pub(crate) fn insert_axis(a: &Value, axis: usize, length: usize) -> Result<Value, EvaluationError> {
    if let (Value::Sparse(data), 1) = (a, length) {
        let mut data = data.clone();
        data.insert_axis(axis);
        return Ok(Value::Sparse(data));
    }
    let array = a.dense();
    let mut shape = array.shape().to_vec();
    shape.insert(axis, length);
    let expanded = array.view().insert_axis(Axis(axis));
    let broadcast = expanded
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| EvaluationError::ShapeMismatch {
            operation: "InsertAxis",
            shapes: vec![array.shape().to_vec(), shape.clone()],
        })?;
    Ok(Value::Dense(broadcast.to_owned()))
}

pub(crate) fn transpose(a: &Value, axes: &[usize]) -> Value {
    match a {
        Value::Dense(array) => Value::Dense(array.view().permuted_axes(IxDyn(axes)).to_owned()),
        Value::Sparse(data) => Value::Sparse(data.clone().permute_axes(axes)),
    }
}

pub(crate) fn take(a: &Value, indices: &Value, axis: usize) -> Result<Value, EvaluationError> {
    let array = a.dense();
    let extent = array.shape()[axis];
    match indices.shape().len() {
        0 => {
            let index = scalar_index(indices, extent, "Take")?;
            Ok(Value::Dense(array.index_axis(Axis(axis), index).to_owned()))
        }
        _ => {
            let indices = index_list(indices, extent, "Take")?;
            Ok(Value::Dense(array.select(Axis(axis), &indices)))
        }
    }
}

pub(crate) fn range(length: &Value, offset: &Value) -> Result<Value, EvaluationError> {
    let length = scalar_index(length, usize::MAX, "Range")?;
    let offset = scalar_index(offset, usize::MAX, "Range")?;
    let range = Array1::from_iter((offset..offset + length).map(|i| i as f64));
    Ok(Value::Dense(range.into_dyn()))
}

/// The factor by which a linear map of shape `[todims, fromdims]` scales `fromdims`-dimensional
/// volumes.
pub(crate) fn volume_form(jacobian: &Value) -> Result<Value, EvaluationError> {
    with_matrix(jacobian, "VolumeForm", |jacobian| {
        let (todims, fromdims) = jacobian.dim();
        let entries: Vec<f64> = jacobian.iter().copied().collect();
        let j = DMatrix::from_row_slice(todims, fromdims, &entries);
        if fromdims == 0 {
            1.0
        } else if todims == fromdims {
            j.determinant().abs()
        } else {
            (j.transpose() * &j).determinant().sqrt()
        }
    })
    .map(scalar)
}

pub(crate) fn sampled(coords: &Value, expect: &Value) -> Result<Value, EvaluationError> {
    let (coords, expect) = (coords.dense(), expect.dense());
    let matches = coords.shape() == expect.shape()
        && coords
            .iter()
            .zip(expect.iter())
            .all(|(a, b)| (a - b).abs() <= 1e-10 * (1.0 + b.abs()));
    if !matches {
        return Err(EvaluationError::SampledPointsMismatch);
    }
    let n = coords.shape().first().copied().unwrap_or(0);
    Ok(Value::Dense(ArrayD::from_shape_fn(IxDyn(&[n, n]), |index| {
        if index[0] == index[1] {
            1.0
        } else {
            0.0
        }
    })))
}

/// Evaluates the `2^d` first-order tensor-product Lagrange polynomials of the unit hypercube.
///
/// Vertex `v` corresponds to the multi-index given by the binary digits of `v`, most
/// significant digit first.
pub(crate) fn lagrange_shape(coords: &Value) -> Result<Value, EvaluationError> {
    with_matrix(coords, "LagrangeShape", |coords| {
        let (npoints, ndims) = coords.dim();
        ArrayD::from_shape_fn(IxDyn(&[npoints, 1 << ndims]), |index| {
            let (p, vertex) = (index[0], index[1]);
            (0..ndims)
                .map(|a| {
                    let x = coords[[p, a]];
                    if (vertex >> (ndims - 1 - a)) & 1 == 1 {
                        x
                    } else {
                        1.0 - x
                    }
                })
                .product::<f64>()
        })
    })
    .map(Value::Dense)
}

pub(crate) fn inflate(a: &Value, indices: &Value, length: usize, axis: usize) -> Result<Value, EvaluationError> {
    let indices = index_list(indices, length, "Inflate")?;
    let mut data = match a {
        Value::Dense(array) => SparseData::from_dense(array),
        Value::Sparse(data) => data.clone(),
    };
    data.reindex_axis(axis, &indices, length)?;
    Ok(Value::Sparse(data))
}
