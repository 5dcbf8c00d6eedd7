use itertools::Itertools;
use proptest::prelude::*;
use samplex::mesh::{RectilinearMesh, SampleKind};
use samplex::points::{Points, PointsSequence};
use samplex::proptest::{point_mask, rectilinear_mesh_strategy};
use samplex::{Array, Dtype, Sample, SampleError};

fn interval_sample(nelems: usize, index: Option<Vec<Vec<usize>>>) -> Result<Sample, SampleError> {
    let mesh = RectilinearMesh::unit(1, nelems);
    let points = PointsSequence::uniform(Points::vertex(1), nelems);
    Sample::new(vec![mesh.transforms().clone()], points, index)
}

#[test]
fn default_index_numbers_points_consecutively() {
    let mesh = RectilinearMesh::unit(1, 4);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    assert_eq!(sample.ndims(), 1);
    assert_eq!(sample.nelems(), 4);
    assert_eq!(sample.npoints(), 8);
    assert_eq!(sample.getindex(0).as_ref(), &[0, 1]);
    assert_eq!(sample.getindex(3).as_ref(), &[6, 7]);
    assert!(!sample.index_kind().is_custom());
}

#[test]
fn custom_index_is_validated() {
    assert_eq!(
        interval_sample(2, Some(vec![vec![0, 1]])).unwrap_err(),
        SampleError::IndexCountMismatch { expected: 2, actual: 1 }
    );
    assert_eq!(
        interval_sample(2, Some(vec![vec![0], vec![1, 2]])).unwrap_err(),
        SampleError::IndexLengthMismatch {
            element: 0,
            expected: 2,
            actual: 1
        }
    );
    assert_eq!(
        interval_sample(2, Some(vec![vec![0, 1], vec![1, 4]])).unwrap_err(),
        SampleError::IndexOutOfBounds {
            element: 1,
            index: 4,
            npoints: 4
        }
    );

    let sample = interval_sample(2, Some(vec![vec![0, 1], vec![1, 2]])).unwrap();
    assert!(sample.index_kind().is_custom());
    assert_eq!(sample.getindex(1).as_ref(), &[1, 2]);
    assert_eq!(sample.npoints(), 4);
}

#[test]
fn construction_rejects_inconsistent_arguments() {
    let mesh = RectilinearMesh::unit(2, 2);
    let points = PointsSequence::uniform(Points::gauss(2, 1), 3);
    assert_eq!(
        Sample::new(vec![mesh.transforms().clone()], points, None).unwrap_err(),
        SampleError::ElementCountMismatch { expected: 3, actual: 4 }
    );
    let points = PointsSequence::uniform(Points::gauss(1, 1), 4);
    assert!(matches!(
        Sample::new(vec![mesh.transforms().clone()], points.clone(), None),
        Err(SampleError::DimensionMismatch { element: 0, .. })
    ));
    assert_eq!(Sample::new(vec![], points, None).unwrap_err(), SampleError::NoTransforms);
}

#[test]
fn equal_arguments_produce_the_same_sample() {
    let mesh = RectilinearMesh::unit(2, 3);
    let a = mesh.sample(SampleKind::Gauss(3)).unwrap();
    let b = mesh.sample(SampleKind::Gauss(3)).unwrap();
    let c = mesh.sample(SampleKind::Gauss(1)).unwrap();
    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&c));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn allcoords_follow_the_global_numbering() {
    let sample = interval_sample(2, Some(vec![vec![3, 0], vec![0, 1]])).unwrap();
    let allcoords = sample.allcoords();
    assert_eq!(allcoords.dim(), (4, 1));
    assert_eq!(allcoords.column(0).to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn connectivity_is_renumbered_globally() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Bezier(2)).unwrap();
    assert_eq!(sample.tri().unwrap().as_slice().unwrap(), &[0, 1, 2, 3]);
    assert_eq!(sample.hull().unwrap().as_slice().unwrap(), &[0, 1, 2, 3]);

    let sample = interval_sample(2, Some(vec![vec![0, 1], vec![1, 2]])).unwrap();
    assert_eq!(sample.tri().unwrap().as_slice().unwrap(), &[0, 1, 1, 2]);

    let gauss = mesh.sample(SampleKind::Gauss(2)).unwrap();
    assert!(matches!(gauss.tri(), Err(SampleError::ConnectivityUnavailable { .. })));
}

#[test]
fn subset_keeps_elements_with_selected_points() {
    let mesh = RectilinearMesh::unit(1, 4);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let mut mask = vec![false; 8];
    mask[2] = true;
    mask[7] = true;
    let subset = sample.subset(&mask).unwrap();
    assert_eq!(subset.nelems(), 2);
    assert_eq!(subset.npoints(), 4);
    let chains = mesh.transforms().chains();
    assert_eq!(subset.transforms()[0].chains(), &[chains[1].clone(), chains[3].clone()]);

    assert_eq!(
        sample.subset(&[true]).unwrap_err(),
        SampleError::MaskLengthMismatch { expected: 8, actual: 1 }
    );
}

#[test]
fn deferred_expressions_keep_their_dtypes() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Gauss(1)).unwrap();
    let integer = Array::integer(ndarray::arr1(&[1, 2, 3]).into_dyn());

    let integral = sample.integral(&integer);
    assert_eq!(integral.dtype(), Dtype::Float);
    assert_eq!(integral.shape(), &[3]);

    let at = sample.at(&integer);
    assert_eq!(at.dtype(), Dtype::Int);
    assert_eq!(at.shape(), &[sample.npoints(), 3]);
}

#[test]
fn display_summarizes_the_sample() {
    let mesh = RectilinearMesh::unit(2, 2);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    insta::assert_snapshot!(sample.to_string(), @"Sample<2D, 4 elems, 16 points>");
}

proptest! {
    #[test]
    fn default_index_partitions_the_points(
        mesh in (1..=3usize).prop_flat_map(|ndims| rectilinear_mesh_strategy(ndims, 8)),
        kind in any::<SampleKind>(),
    ) {
        let sample = mesh.sample(kind).unwrap();
        let numbers = sample.index().concat();
        prop_assert_eq!(numbers, (0..sample.npoints()).collect_vec());
        prop_assert_eq!(sample.nelems(), mesh.nelems());
    }

    #[test]
    fn subset_retains_exactly_the_selected_elements(
        (sample, mask) in rectilinear_mesh_strategy(2, 6)
            .prop_map(|mesh| mesh.sample(SampleKind::Gauss(2)).unwrap())
            .prop_flat_map(|sample| {
                let npoints = sample.npoints();
                (Just(sample), point_mask(npoints))
            })
    ) {
        let subset = sample.subset(&mask).unwrap();
        let selected = (0..sample.nelems())
            .filter(|&ielem| sample.getindex(ielem).iter().any(|&i| mask[i]))
            .collect_vec();
        prop_assert_eq!(subset.nelems(), selected.len());
        let expected_points: usize = selected
            .iter()
            .map(|&ielem| sample.points().get(ielem).unwrap().npoints())
            .sum();
        prop_assert_eq!(subset.npoints(), expected_points);
        prop_assert!(!subset.index_kind().is_custom());
    }
}
