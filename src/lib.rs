//! Point samples on finite element meshes and joint, per-element evaluation of integrals.
//!
//! A [`Sample`] distributes points over the elements of a topology and numbers them globally.
//! Functions ([`Array`]) are integrated over a sample with [`Sample::integral`] or evaluated at
//! its points with [`Sample::at`]. Both produce deferred expressions, which are evaluated
//! together by [`eval_integrals`] so that work shared between them is done once per element.
//!
//! ```
//! use samplex::mesh::{RectilinearMesh, SampleKind};
//! use samplex::{eval_integrals, Arguments};
//!
//! let mesh = RectilinearMesh::unit(1, 4);
//! let sample = mesh.sample(SampleKind::Gauss(2)).unwrap();
//! let basis = mesh.basis();
//! let integrals = [
//!     sample.integral(&samplex::Array::volume_form()),
//!     sample.integral(&basis.outer(&basis).mul(&samplex::Array::volume_form())),
//! ];
//! let results = eval_integrals(&integrals, &Arguments::new()).unwrap();
//! assert!((results[0].as_scalar().unwrap() - 1.0).abs() < 1e-12);
//! assert_eq!(results[1].as_matrix().unwrap().nrows(), 5);
//! ```
pub mod assembly;
pub mod config;
pub mod error;
pub mod evaluable;
pub mod function;
pub mod integrate;
pub mod mesh;
pub mod points;
pub mod sample;
pub mod transform;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use assembly::{convert, Assembled};
pub use config::{DebugFlags, EvaluationConfig};
pub use error::{EvaluationError, LowerError, SampleError};
pub use evaluable::Arguments;
pub use function::{Array, Dtype};
pub use integrate::{eval_integrals, eval_integrals_sparse};
pub use sample::Sample;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate ndarray;
pub extern crate samplex_sparse;
