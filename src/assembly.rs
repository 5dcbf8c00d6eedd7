//! Conversion of raw sparse results into their natural representation.
use crate::nalgebra::DVector;
use crate::nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::ArrayD;
use samplex_sparse::{SparseData, SparseError};

/// An evaluated result, represented according to its rank.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    Scalar(f64),
    Vector(DVector<f64>),
    Matrix(CsrMatrix<f64>),
    /// Results of rank three and higher, deduplicated and without explicit zeros.
    Sparse(SparseData),
}

impl Assembled {
    pub fn rank(&self) -> usize {
        match self {
            Assembled::Scalar(_) => 0,
            Assembled::Vector(_) => 1,
            Assembled::Matrix(_) => 2,
            Assembled::Sparse(data) => data.ndim(),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Assembled::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&DVector<f64>> {
        match self {
            Assembled::Vector(vector) => Some(vector),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&CsrMatrix<f64>> {
        match self {
            Assembled::Matrix(matrix) => Some(matrix),
            _ => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseData> {
        match self {
            Assembled::Sparse(data) => Some(data),
            _ => None,
        }
    }

    pub fn to_dense(&self) -> ArrayD<f64> {
        match self {
            Assembled::Scalar(value) => ndarray::arr0(*value).into_dyn(),
            Assembled::Vector(vector) => ndarray::Array1::from_iter(vector.iter().copied()).into_dyn(),
            Assembled::Matrix(matrix) => {
                let mut dense = ndarray::Array2::zeros((matrix.nrows(), matrix.ncols()));
                for (i, j, value) in matrix.triplet_iter() {
                    dense[(i, j)] += *value;
                }
                dense.into_dyn()
            }
            Assembled::Sparse(data) => data.to_dense(),
        }
    }
}

/// Converts raw sparse data, summing duplicate entries.
pub fn convert(data: SparseData) -> Result<Assembled, SparseError> {
    data.validate()?;
    Ok(match data.ndim() {
        0 => Assembled::Scalar(data.values().iter().sum()),
        1 => {
            let mut vector = DVector::zeros(data.shape()[0]);
            for (&i, &value) in data.indices(0).iter().zip(data.values()) {
                vector[i] += value;
            }
            Assembled::Vector(vector)
        }
        2 => {
            let mut coo = CooMatrix::new(data.shape()[0], data.shape()[1]);
            for ((&i, &j), &value) in data.indices(0).iter().zip(data.indices(1)).zip(data.values()) {
                coo.push(i, j, value);
            }
            Assembled::Matrix(CsrMatrix::from(&coo))
        }
        _ => Assembled::Sparse(data.dedup().prune()),
    })
}
