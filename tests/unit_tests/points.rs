use matrixcompare::assert_scalar_eq;
use samplex::points::{Points, PointsSequence};

#[test]
fn gauss_points_integrate_polynomials_of_their_degree() {
    for degree in 0..8 {
        let points = Points::gauss(1, degree);
        let weights = points.weights().unwrap();
        let coords = points.coords();
        let x = coords.column(0);
        assert!(x.iter().zip(x.iter().skip(1)).all(|(a, b)| a < b));
        assert!(x.iter().all(|&x| 0.0 < x && x < 1.0));
        for power in 0..=degree {
            let integral: f64 = points
                .coords()
                .column(0)
                .iter()
                .zip(weights)
                .map(|(x, w)| w * x.powi(power as i32))
                .sum();
            assert_scalar_eq!(integral, 1.0 / (power + 1) as f64, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn tensor_product_gauss_weights_sum_to_one() {
    for ndims in 0..=3 {
        let points = Points::gauss(ndims, 3);
        assert_eq!(points.npoints(), 2usize.pow(ndims as u32));
        assert_eq!(points.ndims(), ndims);
        assert_scalar_eq!(points.weights().unwrap().sum(), 1.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn bezier_connectivity_covers_the_square() {
    let points = Points::bezier(2, 3);
    assert_eq!(points.npoints(), 9);
    let tri = points.tri().unwrap();
    assert_eq!(tri.dim(), (8, 3));
    let hull = points.hull().unwrap();
    assert_eq!(hull.dim(), (8, 2));
    assert!(tri.iter().chain(hull.iter()).all(|&i| i < 9));
}

#[test]
fn points_sequence_offsets_connectivity() {
    let sequence = PointsSequence::uniform(Points::bezier(1, 3), 2);
    assert_eq!(sequence.len(), 2);
    assert_eq!(sequence.npoints(), 6);
    assert_eq!(sequence.uniform_npoints(), Some(3));
    let tri = sequence.tri().unwrap();
    assert_eq!(tri.as_slice().unwrap(), &[0, 1, 1, 2, 3, 4, 4, 5]);
    assert!(PointsSequence::uniform(Points::gauss(1, 2), 2).tri().is_none());
}

#[test]
fn equal_sequences_compare_equal() {
    let a = PointsSequence::uniform(Points::gauss(2, 2), 3);
    let b = PointsSequence::uniform(Points::gauss(2, 2), 3);
    let c = PointsSequence::uniform(Points::gauss(2, 4), 3);
    assert_eq!(a, b);
    assert_eq!(a.content_hash(), b.content_hash());
    assert_ne!(a, c);
}

#[test]
fn points_assembled_from_parts_are_checked() {
    let coords = ndarray::arr2(&[[0.0], [0.5], [1.0]]);
    let weights = ndarray::arr1(&[0.25, 0.5, 0.25]);
    let tri = ndarray::arr2(&[[0, 1], [1, 2]]);
    let points = Points::from_parts(coords.clone(), Some(weights), Some(tri), None);
    assert_eq!(points.npoints(), 3);
    assert!(points.hull().is_none());
    util::assert_panics!(Points::from_parts(coords.clone(), Some(ndarray::arr1(&[1.0])), None, None));
}
