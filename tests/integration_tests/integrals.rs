use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use samplex::mesh::{RectilinearMesh, SampleKind};
use samplex::evaluable::Evaluable;
use samplex::function::{Lower, LowerArgs};
use samplex::nalgebra::DVector;
use samplex::{Arguments, Array, DebugFlags, Dtype, EvaluationConfig, LowerError, Sample};

fn volume_integral(sample: &Sample, func: &Array) -> Array {
    sample.integral(&func.mul(&Array::volume_form()))
}

#[test]
fn unit_interval_has_unit_length() {
    let mesh = RectilinearMesh::unit(1, 4);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let results = sample.integrate(&[Array::volume_form()], &Arguments::new()).unwrap();
    assert_scalar_eq!(results[0].as_scalar().unwrap(), 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn rectangle_area_and_moments() {
    let mesh = RectilinearMesh::new(vec![vec![0.0, 1.0, 3.0], vec![0.0, 0.5, 2.0]]);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let area = volume_integral(&sample, &Array::scalar(1.0));
    let moment = volume_integral(&sample, &mesh.geometry());
    let results = samplex::eval_integrals(&[area, moment], &Arguments::new()).unwrap();
    assert_scalar_eq!(results[0].as_scalar().unwrap(), 6.0, comp = abs, tol = 1e-12);
    let moment = results[1].as_vector().unwrap().clone();
    assert_matrix_eq!(moment, DVector::from_column_slice(&[9.0, 6.0]), comp = abs, tol = 1e-12);
}

#[test]
fn mass_matrix_rows_sum_to_basis_integrals() {
    for ndims in 1..=2 {
        let mesh = RectilinearMesh::unit(ndims, 3);
        let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
        let basis = mesh.basis();
        let results = sample
            .integrate(
                &[
                    basis.mul(&Array::volume_form()),
                    basis.outer(&basis).mul(&Array::volume_form()),
                ],
                &Arguments::new(),
            )
            .unwrap();
        let integrals = results[0].as_vector().unwrap().clone();
        let mass = results[1].as_matrix().unwrap();
        assert_eq!(mass.nrows(), mesh.ndofs());
        assert_eq!(mass.ncols(), mesh.ndofs());

        let row_sums = DVector::from_iterator(mesh.ndofs(), mass.row_iter().map(|row| row.values().iter().sum::<f64>()));
        assert_matrix_eq!(row_sums, integrals, comp = abs, tol = 1e-12);
        assert_scalar_eq!(integrals.sum(), 1.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn linear_mass_matrix_of_a_single_element() {
    let mesh = RectilinearMesh::new(vec![vec![0.0, 2.0]]);
    let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let basis = mesh.basis();
    let mass = volume_integral(&sample, &basis.outer(&basis))
        .eval(&Arguments::new())
        .unwrap();
    let expected = ndarray::arr2(&[[2.0 / 3.0, 1.0 / 3.0], [1.0 / 3.0, 2.0 / 3.0]]).into_dyn();
    util::assert_approx_array_eq!(mass, expected, abstol = 1e-12);
}

#[test]
fn boundary_integrals_use_the_surface_measure() {
    let mesh = RectilinearMesh::unit(2, 3);
    let basis = mesh.basis();
    for name in ["left", "right", "bottom", "top"] {
        let sample = mesh.boundary(name).unwrap().sample(SampleKind::Gauss(2)).unwrap();
        assert_eq!(sample.ndims(), 1);
        let results = sample
            .integrate(&[Array::volume_form(), basis.mul(&Array::volume_form())], &Arguments::new())
            .unwrap();
        assert_scalar_eq!(results[0].as_scalar().unwrap(), 1.0, comp = abs, tol = 1e-12);
        let integrals = results[1].as_vector().unwrap();
        assert_scalar_eq!(integrals.sum(), 1.0, comp = abs, tol = 1e-12);
    }

    let left = mesh.boundary("left").unwrap().sample(SampleKind::Gauss(2)).unwrap();
    let integrals = left
        .integrate(&[basis.mul(&Array::volume_form())], &Arguments::new())
        .unwrap();
    let integrals = integrals[0].as_vector().unwrap().clone();
    let mut expected = DVector::zeros(mesh.ndofs());
    expected.rows_mut(0, 4).copy_from_slice(&[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0]);
    assert_matrix_eq!(integrals, expected, comp = abs, tol = 1e-12);
}

#[test]
fn integrands_may_depend_on_arguments() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Gauss(1)).unwrap();
    let u = Array::argument("u", &[]);
    let integral = volume_integral(&sample, &u.mul(&u));
    let arguments = Arguments::new().with("u", ndarray::arr0(3.0).into_dyn());
    let value = integral.eval(&arguments).unwrap();
    assert_scalar_eq!(value.sum(), 9.0, comp = abs, tol = 1e-12);
}

#[test]
fn integrals_of_integrals_are_rejected() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Gauss(1)).unwrap();
    let inner = sample.integral(&Array::volume_form());
    let outer = sample.integral(&inner);
    let err = outer.eval(&Arguments::new()).unwrap_err();
    assert_eq!(err.downcast_ref::<LowerError>(), Some(&LowerError::NestedSample));
}

#[test]
fn integration_requires_weights() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Vertex).unwrap();
    let err = sample.integrate(&[Array::volume_form()], &Arguments::new()).unwrap_err();
    assert_eq!(err.downcast_ref::<LowerError>(), Some(&LowerError::MissingWeights));
}

#[test]
fn point_functions_need_a_sample() {
    let err = Array::coordinates(1).eval(&Arguments::new()).unwrap_err();
    assert!(matches!(err.downcast_ref::<LowerError>(), Some(LowerError::Unbound { .. })));
}

/// Claims to be a scalar but lowers to a matrix.
#[derive(Debug)]
struct MisshapenLowering;

impl Lower for MisshapenLowering {
    fn lower(&self, _args: &LowerArgs) -> Result<Evaluable, LowerError> {
        Ok(Evaluable::constant(ndarray::arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn()))
    }
}

#[test]
fn lowering_dimension_check_follows_the_explicit_config() {
    let misshapen = Array::from_lower(vec![], Dtype::Float, MisshapenLowering);
    let checked = EvaluationConfig::default().with_debug(DebugFlags {
        lower: true,
        ..DebugFlags::none()
    });
    let unchecked = EvaluationConfig::default().with_debug(DebugFlags::none());

    assert_eq!(
        misshapen.as_evaluable_sparse_with_config(&checked).unwrap_err(),
        LowerError::ShapeMismatch { expected: 0, actual: 2 }
    );
    assert!(misshapen.as_evaluable_sparse_with_config(&unchecked).is_ok());

    // The check carries over into the points of a sample
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Gauss(1)).unwrap();
    let err = sample
        .integral(&misshapen)
        .eval_with_config(&Arguments::new(), &checked)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<LowerError>(),
        Some(&LowerError::ShapeMismatch { expected: 1, actual: 2 })
    );
}
