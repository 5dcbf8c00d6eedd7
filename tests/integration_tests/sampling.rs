use ndarray::{arr1, arr2, Array1, Axis};
use samplex::mesh::{interpolate_nodal, RectilinearMesh, SampleKind};
use samplex::points::{Points, PointsSequence};
use samplex::{Arguments, Array, EvaluationError, Sample};
use util::assert_approx_array_eq;

#[test]
fn geometry_at_vertices() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Vertex).unwrap();
    let values = sample.eval(&[mesh.geometry()], &Arguments::new()).unwrap();
    let expected = arr2(&[[0.0], [0.5], [0.5], [1.0]]).into_dyn();
    assert_approx_array_eq!(values[0], expected, abstol = 1e-14);
}

#[test]
fn nodal_interpolation_is_exact_for_bilinear_functions() {
    let mesh = RectilinearMesh::new(vec![vec![0.0, 0.5, 2.0], vec![-1.0, 1.0]]);
    let f = |x: &[f64]| 1.0 + 2.0 * x[0] - x[1] + 0.5 * x[0] * x[1];
    let dofs = Array::constant(interpolate_nodal(&mesh, f));
    let interpolant = mesh.basis().dot(&dofs, 0);

    let sample = mesh.sample(SampleKind::Bezier(3)).unwrap();
    let values = sample.eval(&[interpolant, mesh.geometry()], &Arguments::new()).unwrap();
    let expected = values[1]
        .axis_iter(Axis(0))
        .map(|x| f(x.as_slice().unwrap()))
        .collect::<Array1<f64>>()
        .into_dyn();
    assert_approx_array_eq!(values[0], expected, abstol = 1e-12);
}

#[test]
fn asfunction_reproduces_sampled_data() {
    let mesh = RectilinearMesh::unit(2, 2);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let data = Array1::from_iter((0..sample.npoints()).map(|i| (i * i) as f64 - 3.0)).into_dyn();
    let values = sample
        .eval(&[sample.asfunction(data.clone())], &Arguments::new())
        .unwrap();
    assert_approx_array_eq!(values[0], data, abstol = 1e-14);
}

#[test]
fn sample_basis_integrates_to_point_weights() {
    let mesh = RectilinearMesh::unit(1, 4);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let weights = sample
        .integral(&sample.basis().mul(&Array::volume_form()))
        .eval(&Arguments::new())
        .unwrap();
    assert_approx_array_eq!(weights, Array1::from_elem(8, 0.125).into_dyn(), abstol = 1e-14);
}

#[test]
fn sample_basis_fails_at_foreign_points() {
    let mesh = RectilinearMesh::unit(1, 2);
    let gauss = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let vertices = mesh.sample(SampleKind::Vertex).unwrap();
    let err = vertices.eval(&[gauss.basis()], &Arguments::new()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<EvaluationError>(),
        Some(&EvaluationError::SampledPointsMismatch)
    );
}

#[test]
fn shared_points_accumulate() {
    let mesh = RectilinearMesh::unit(1, 2);
    let points = PointsSequence::uniform(Points::vertex(1), 2);
    let index = vec![vec![0, 1], vec![1, 2]];
    let sample = Sample::new(vec![mesh.transforms().clone()], points, Some(index)).unwrap();
    let values = sample
        .eval(&[Array::scalar(1.0), mesh.geometry()], &Arguments::new())
        .unwrap();
    assert_approx_array_eq!(values[0], arr1(&[1.0, 2.0, 1.0, 0.0]).into_dyn(), abstol = 1e-14);
    assert_approx_array_eq!(values[1], arr2(&[[0.0], [1.0], [1.0], [0.0]]).into_dyn(), abstol = 1e-14);
}

#[test]
fn raw_results_keep_duplicates() {
    let mesh = RectilinearMesh::unit(1, 2);
    let points = PointsSequence::uniform(Points::vertex(1), 2);
    let index = vec![vec![0, 1], vec![1, 2]];
    let sample = Sample::new(vec![mesh.transforms().clone()], points, Some(index)).unwrap();
    let raw = sample
        .eval_sparse(&[Array::scalar(1.0)], &Arguments::new())
        .unwrap();
    assert_eq!(raw[0].shape(), &[4]);
    assert_eq!(raw[0].nnz(), 4);
    assert_eq!(raw[0].indices(0).iter().filter(|&&i| i == 1).count(), 2);
}

#[test]
fn integrating_sampled_values_reproduces_the_integral() {
    let mesh = RectilinearMesh::new(vec![vec![0.0, 0.3, 1.0], vec![0.0, 2.0]]);
    let sample = mesh.sample(SampleKind::Gauss(4)).unwrap();
    let x = mesh.geometry();
    let f = x.mul(&x).sum(0).powf(1.5);

    let values = sample.eval(&[f.clone()], &Arguments::new()).unwrap();
    let g = sample.asfunction(values[0].clone());
    let dv = Array::volume_form();
    let integrals = sample
        .integrate(&[f.mul(&dv), g.mul(&dv)], &Arguments::new())
        .unwrap();
    let (a, b) = (integrals[0].as_scalar().unwrap(), integrals[1].as_scalar().unwrap());
    assert!((a - b).abs() <= 1e-12 * a.abs());
}

#[test]
fn elements_may_carry_different_numbers_of_points() {
    let mesh = RectilinearMesh::unit(1, 3);
    let points = PointsSequence::from_points(vec![Points::gauss(1, 0), Points::gauss(1, 4), Points::gauss(1, 2)]);
    let sample = Sample::new(vec![mesh.transforms().clone()], points, None).unwrap();
    assert_eq!(sample.npoints(), 6);
    assert_eq!(sample.getindex(0).as_ref(), &[0]);
    assert_eq!(sample.getindex(1).as_ref(), &[1, 2, 3]);
    assert_eq!(sample.getindex(2).as_ref(), &[4, 5]);

    let values = sample.eval(&[mesh.geometry()], &Arguments::new()).unwrap();
    assert_eq!(values[0].shape(), &[6, 1]);
    let x = values[0]
        .index_axis(Axis(1), 0)
        .to_owned()
        .into_dimensionality::<ndarray::Ix1>()
        .unwrap();
    assert!(x.iter().zip(x.iter().skip(1)).all(|(a, b)| a < b));
    for (ielem, range) in [(0, 0..1), (1, 1..4), (2, 4..6)] {
        let (lower, upper) = (ielem as f64 / 3.0, (ielem + 1) as f64 / 3.0);
        assert!(x.slice(ndarray::s![range]).iter().all(|&x| lower < x && x < upper));
    }

    let dv = Array::volume_form();
    let integrals = sample
        .integrate(&[dv.clone(), mesh.geometry().sum(0).mul(&dv)], &Arguments::new())
        .unwrap();
    assert!((integrals[0].as_scalar().unwrap() - 1.0).abs() < 1e-12);
    assert!((integrals[1].as_scalar().unwrap() - 0.5).abs() < 1e-12);

    let round_trip = sample
        .integrate(&[sample.asfunction(x.into_dyn()).mul(&dv)], &Arguments::new())
        .unwrap();
    assert!((round_trip[0].as_scalar().unwrap() - 0.5).abs() < 1e-12);
}
