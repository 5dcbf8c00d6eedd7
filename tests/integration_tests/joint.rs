use proptest::prelude::*;
use samplex::evaluable::{Session, Tuple};
use samplex::integrate::{eval_integrals_sparse_with_config, eval_integrals_with_config};
use samplex::mesh::{RectilinearMesh, SampleKind};
use samplex::proptest::rectilinear_mesh_strategy;
use samplex::{Arguments, Array, EvaluationConfig};
use util::assert_approx_array_eq;

fn mass_and_load(mesh: &RectilinearMesh, kind: SampleKind) -> Vec<Array> {
    let sample = mesh.sample(kind).unwrap();
    let basis = mesh.basis();
    let dv = Array::volume_form();
    let x = mesh.geometry().sum(0);
    vec![
        sample.integral(&basis.outer(&basis).mul(&dv)),
        sample.integral(&basis.mul(&x).mul(&dv)),
        sample.integral(&dv),
        sample.at(&mesh.geometry()),
    ]
}

#[test]
fn element_data_is_computed_once_per_element() {
    let mesh = RectilinearMesh::unit(2, 3);
    let integrals = mass_and_load(&mesh, SampleKind::Gauss(2));
    let items = integrals
        .iter()
        .map(|integral| integral.as_evaluable_sparse().unwrap())
        .collect();
    let tuple = Tuple::new(items).optimized();

    let arguments = Arguments::new();
    let config = EvaluationConfig::default();
    let session = Session::new(&arguments, &config);
    let values = session.execute(&tuple).unwrap();
    assert_eq!(values.len(), 4);

    let stats = session.stats();
    assert_eq!(stats.loop_passes(), 1);
    assert_eq!(stats.iterations(), mesh.nelems());
    assert_eq!(stats.evaluations("ElementCoords"), mesh.nelems());
    assert_eq!(stats.evaluations("LagrangeShape"), mesh.nelems());
    assert_eq!(stats.evaluations("LoopSum"), 0);
}

#[test]
fn samples_with_equal_element_counts_share_one_pass() {
    let mesh = RectilinearMesh::unit(1, 4);
    let coarse = mesh.sample(SampleKind::Gauss(2)).unwrap();
    let fine = mesh.sample(SampleKind::Gauss(6)).unwrap();
    let basis = mesh.basis();
    let dv = Array::volume_form();
    let x5 = mesh.geometry().sum(0).powf(5.0).mul(&dv);
    let integrals = vec![
        coarse.integral(&x5),
        fine.integral(&x5),
        coarse.integral(&basis.outer(&basis).mul(&dv)),
        fine.integral(&basis.outer(&basis).mul(&dv)),
    ];

    let items = integrals
        .iter()
        .map(|integral| integral.as_evaluable_sparse().unwrap())
        .collect();
    let tuple = Tuple::new(items).optimized();
    let arguments = Arguments::new();
    let config = EvaluationConfig::default();
    let session = Session::new(&arguments, &config);
    session.execute(&tuple).unwrap();
    assert_eq!(session.stats().loop_passes(), 1);
    assert_eq!(session.stats().iterations(), mesh.nelems());

    let joint = eval_integrals_sparse_with_config(&integrals, &arguments, &config).unwrap();
    for (integral, joint) in integrals.iter().zip(&joint) {
        let separate = integral.eval_with_config(&arguments, &config).unwrap();
        assert_approx_array_eq!(joint.to_dense(), separate, abstol = 1e-14);
    }
    let fine_x5 = joint[1].to_dense().sum();
    let coarse_x5 = joint[0].to_dense().sum();
    assert!((fine_x5 - 1.0 / 6.0).abs() < 1e-14);
    assert!((coarse_x5 - 1.0 / 6.0).abs() > 1e-6);
}

#[test]
fn batches_fail_as_a_whole() {
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Gauss(1)).unwrap();
    let integrals = [
        sample.integral(&Array::volume_form()),
        sample.integral(&Array::argument("u", &[2])),
    ];
    let config = EvaluationConfig::default();
    assert!(eval_integrals_with_config(&integrals, &Arguments::new(), &config).is_err());
}

#[test]
fn graphs_are_written_when_requested() {
    let directory = std::env::temp_dir().join(format!("samplex-graphviz-{}", std::process::id()));
    let mesh = RectilinearMesh::unit(1, 2);
    let sample = mesh.sample(SampleKind::Gauss(1)).unwrap();
    let config = EvaluationConfig::default().with_graphviz(&directory);
    eval_integrals_sparse_with_config(&[sample.integral(&Array::volume_form())], &Arguments::new(), &config).unwrap();
    let written = std::fs::read_dir(&directory)
        .unwrap()
        .filter_map(Result::ok)
        .any(|entry| entry.path().extension().map_or(false, |ext| ext == "dot"));
    assert!(written);
    std::fs::remove_dir_all(&directory).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn joint_evaluation_matches_separate_evaluation(
        mesh in (1..=2usize).prop_flat_map(|ndims| rectilinear_mesh_strategy(ndims, 6))
    ) {
        let integrals = mass_and_load(&mesh, SampleKind::Gauss(2));
        let config = EvaluationConfig::default();
        let joint = eval_integrals_sparse_with_config(&integrals, &Arguments::new(), &config).unwrap();
        for (integral, joint) in integrals.iter().zip(&joint) {
            let separate = integral.eval_with_config(&Arguments::new(), &config).unwrap();
            assert_approx_array_eq!(joint.to_dense(), separate, abstol = 1e-10);
        }
    }

    #[test]
    fn parallel_evaluation_matches_serial_evaluation(
        mesh in (1..=2usize).prop_flat_map(|ndims| rectilinear_mesh_strategy(ndims, 6))
    ) {
        let integrals = mass_and_load(&mesh, SampleKind::Gauss(2));
        let serial = EvaluationConfig::default();
        let parallel = EvaluationConfig::default().with_parallel(true);
        let a = eval_integrals_with_config(&integrals, &Arguments::new(), &serial).unwrap();
        let b = eval_integrals_with_config(&integrals, &Arguments::new(), &parallel).unwrap();
        for (a, b) in a.iter().zip(&b) {
            prop_assert_eq!(a.rank(), b.rank());
            assert_approx_array_eq!(a.to_dense(), b.to_dense(), abstol = 1e-10);
        }
    }
}
