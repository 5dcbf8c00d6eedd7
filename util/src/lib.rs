use ndarray::{ArrayBase, Data, Dimension};

/// Poor man's approx assertion for n-dimensional arrays
#[macro_export]
macro_rules! assert_approx_array_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y) = (&$x, &$y);
        assert_eq!(x.shape(), y.shape(), "Arrays have different shapes.");
        let max_absdiff = $crate::max_abs_diff(x, y);
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", x);
            println!("right: {}", y);
            println!("max absdiff: {:e}", max_absdiff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Largest absolute entrywise difference between two arrays of equal shape.
///
/// Returns zero for empty arrays.
pub fn max_abs_diff<S1, S2, D>(x: &ArrayBase<S1, D>, y: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    assert_eq!(x.shape(), y.shape(), "Arrays must have the same shape.");
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}
