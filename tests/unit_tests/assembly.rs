use proptest::prelude::*;
use samplex::nalgebra::DVector;
use samplex::proptest::sparse_data;
use samplex::samplex_sparse::SparseData;
use samplex::{convert, Assembled};
use util::assert_approx_array_eq;

#[test]
fn vector_conversion_sums_duplicates() {
    let mut data = SparseData::new(vec![5]);
    data.push(&[3], 2.0);
    data.push(&[1], 1.0);
    data.push(&[3], 5.0);
    let assembled = convert(data).unwrap();
    assert_eq!(assembled.rank(), 1);
    assert_eq!(
        assembled.as_vector().unwrap(),
        &DVector::from_column_slice(&[0.0, 1.0, 0.0, 7.0, 0.0])
    );
}

#[test]
fn scalar_conversion_sums_all_values() {
    let mut data = SparseData::new(vec![]);
    data.push(&[], 1.5);
    data.push(&[], 2.0);
    assert_eq!(convert(data).unwrap(), Assembled::Scalar(3.5));
}

#[test]
fn higher_rank_conversion_is_canonical() {
    let mut data = SparseData::new(vec![2, 2, 3]);
    data.push(&[1, 0, 0], 2.0);
    data.push(&[0, 1, 2], 1.0);
    data.push(&[0, 1, 2], -1.0);
    data.push(&[1, 0, 0], 0.5);
    data.push(&[0, 0, 1], 4.0);
    let assembled = convert(data).unwrap();
    let sparse = assembled.as_sparse().unwrap();
    assert_eq!(sparse.nnz(), 2);
    assert_eq!(sparse.coordinate(0), vec![0, 0, 1]);
    assert_eq!(sparse.coordinate(1), vec![1, 0, 0]);
    assert_eq!(sparse.values(), &[4.0, 2.5]);
}

#[test]
fn malformed_data_is_rejected() {
    let (shape, indices, values) = SparseData::new(vec![2, 2]).into_parts();
    assert!(SparseData::try_from_parts(shape, indices, vec![1.0]).is_err());
    assert!(values.is_empty());
}

proptest! {
    #[test]
    fn matrix_conversion_matches_manual_accumulation(data in sparse_data(vec![3, 4], 12)) {
        let expected = data.to_dense();
        let assembled = convert(data).unwrap();
        prop_assert!(assembled.as_matrix().is_some());
        assert_approx_array_eq!(assembled.to_dense(), expected, abstol = 1e-12);
    }

    #[test]
    fn conversion_preserves_dense_values(data in sparse_data(vec![2, 3, 2], 12)) {
        let expected = data.to_dense();
        let assembled = convert(data).unwrap();
        prop_assert_eq!(assembled.rank(), 3);
        assert_approx_array_eq!(assembled.to_dense(), expected, abstol = 1e-12);
    }
}
