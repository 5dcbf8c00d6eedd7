use ndarray::{arr0, arr1, ArrayD, IxDyn};
use samplex::evaluable::{Arguments, Evaluable, Session, Tuple, Value};
use samplex::{EvaluationConfig, EvaluationError};

fn execute(items: Vec<Evaluable>, arguments: &Arguments) -> Result<Vec<Value>, EvaluationError> {
    let config = EvaluationConfig::default();
    Session::new(arguments, &config).execute(&Tuple::new(items))
}

#[test]
fn independently_built_nodes_are_equal() {
    let a = Evaluable::add(Evaluable::scalar(1.0), Evaluable::argument("u", vec![]));
    let b = Evaluable::add(Evaluable::scalar(1.0), Evaluable::argument("u", vec![]));
    assert!(!a.ptr_eq(&b));
    assert_eq!(a, b);
    assert_ne!(a, Evaluable::add(Evaluable::scalar(2.0), Evaluable::argument("u", vec![])));
    assert_eq!(Tuple::new(vec![a, b]).node_count(), 3);
}

#[test]
fn static_extents_fold_to_constants() {
    let array = Evaluable::constant(ArrayD::zeros(IxDyn(&[3, 2])));
    let size = Evaluable::size_of(&array, 1);
    assert_eq!(size.op_name(), "Constant");
    assert_eq!(size.as_static_usize(), Some(2));
}

#[test]
fn loop_sum_accumulates_over_the_loop_range() {
    let i = Evaluable::loop_index("i", 5);
    let total = Evaluable::loop_sum(i.clone(), &i);
    assert!(total.loop_deps().is_empty());

    let position = Evaluable::insert_axis(i.clone(), 0, Evaluable::scalar(1.0));
    let ones = Evaluable::constant(arr1(&[1.0]).into_dyn());
    let scattered = Evaluable::loop_sum(Evaluable::inflate(ones, position, 5, 0), &i);
    assert_eq!(scattered.shape(), &[Some(5)]);

    let values = execute(vec![total, scattered], &Arguments::new()).unwrap();
    assert_eq!(values[0].dense().as_ref(), &arr0(10.0).into_dyn());
    assert!(values[1].is_sparse());
    assert_eq!(values[1].dense().as_ref(), &arr1(&[1.0; 5]).into_dyn());
}

#[test]
fn empty_loops_sum_to_zero() {
    let i = Evaluable::loop_index("i", 0);
    let body = Evaluable::insert_axis(i.clone(), 0, Evaluable::scalar(3.0));
    let values = execute(vec![Evaluable::loop_sum(body, &i)], &Arguments::new()).unwrap();
    assert_eq!(values[0].dense().as_ref(), &arr1(&[0.0; 3]).into_dyn());
}

#[test]
fn arguments_are_checked_before_evaluation() {
    let u = Evaluable::argument("u", vec![2]);
    let doubled = Evaluable::add(u.clone(), u);

    let err = execute(vec![doubled.clone()], &Arguments::new()).unwrap_err();
    assert_eq!(err, EvaluationError::MissingArgument { name: "u".to_string() });

    let arguments = Arguments::new().with("u", arr1(&[1.0, 2.0, 3.0]).into_dyn());
    let err = execute(vec![doubled.clone()], &arguments).unwrap_err();
    assert_eq!(
        err,
        EvaluationError::ArgumentShapeMismatch {
            name: "u".to_string(),
            expected: vec![2],
            actual: vec![3]
        }
    );

    let arguments = Arguments::new()
        .with("u", arr1(&[1.0, 2.0]).into_dyn())
        .with("v", arr0(1.0).into_dyn());
    let err = execute(vec![doubled.clone()], &arguments).unwrap_err();
    assert_eq!(err, EvaluationError::UnknownArgument { name: "v".to_string() });

    let arguments = Arguments::new().with("u", arr1(&[1.0, 2.0]).into_dyn());
    let values = execute(vec![doubled], &arguments).unwrap();
    assert_eq!(values[0].dense().as_ref(), &arr1(&[2.0, 4.0]).into_dyn());
}

#[test]
fn out_of_bounds_indices_are_reported() {
    let array = Evaluable::constant(arr1(&[1.0, 2.0]).into_dyn());
    let taken = Evaluable::take(array, Evaluable::scalar(2.0), 0);
    let err = execute(vec![taken], &Arguments::new()).unwrap_err();
    assert!(matches!(err, EvaluationError::InvalidIndex { operation: "Take", extent: 2, .. }));
}

#[test]
fn sessions_count_evaluations_per_operation() {
    let i = Evaluable::loop_index("i", 4);
    let squared = Evaluable::multiply(i.clone(), i.clone());
    let a = Evaluable::loop_sum(squared.clone(), &i);
    let b = Evaluable::loop_sum(Evaluable::add(squared, Evaluable::scalar(1.0)), &i);

    let arguments = Arguments::new();
    let config = EvaluationConfig::default();
    let session = Session::new(&arguments, &config);
    let values = session.execute(&Tuple::new(vec![a, b])).unwrap();
    assert_eq!(values[0].dense().as_ref(), &arr0(14.0).into_dyn());
    assert_eq!(values[1].dense().as_ref(), &arr0(18.0).into_dyn());

    let stats = session.stats();
    assert_eq!(stats.loop_passes(), 1);
    assert_eq!(stats.iterations(), 4);
    assert_eq!(stats.evaluations("Multiply"), 4);
}
