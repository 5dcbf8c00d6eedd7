//! Structured rectilinear meshes.
//!
//! A [`RectilinearMesh`] is the tensor product of one node list per axis, in one to three
//! dimensions. Elements and nodes are numbered in row-major order: the multi-index
//! `(i_0, ..., i_{d-1})` has number `(i_0 n_1 + i_1) n_2 + ...`, with the first axis varying
//! slowest. Every element is the image of the unit hypercube under a single axis-aligned affine
//! transform. Boundary elements append a second transform that embeds the unit hypercube of one
//! dimension less as a face.
use crate::error::{LowerError, SampleError};
use crate::evaluable::{Data, Evaluable};
use crate::function::{Array, Dtype, Lower, LowerArgs};
use crate::nalgebra::{DMatrix, DVector};
use crate::points::{Points, PointsSequence};
use crate::sample::Sample;
use crate::transform::{TransformChain, TransformItem, TransformSequence};
use itertools::Itertools;
use ndarray::{Array1, ArrayD};
use std::fmt;
use std::sync::Arc;

/// The kind of points placed in every element.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleKind {
    /// Gauss-Legendre quadrature points, exact for polynomials of the given degree.
    Gauss(usize),
    /// A uniform grid of the given number of points per dimension, with connectivity.
    Bezier(usize),
    /// The element corners.
    Vertex,
}

impl SampleKind {
    pub fn points(&self, ndims: usize) -> Points {
        match *self {
            SampleKind::Gauss(degree) => Points::gauss(ndims, degree),
            SampleKind::Bezier(n) => Points::bezier(ndims, n),
            SampleKind::Vertex => Points::vertex(ndims),
        }
    }
}

/// A set of elements sharing one transform sequence, such as a mesh or one of its boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    transforms: TransformSequence,
}

impl Topology {
    pub fn new(transforms: TransformSequence) -> Self {
        Self { transforms }
    }

    pub fn transforms(&self) -> &TransformSequence {
        &self.transforms
    }

    pub fn nelems(&self) -> usize {
        self.transforms.len()
    }

    pub fn ndims(&self) -> usize {
        self.transforms.fromdims()
    }

    /// Places points of the given kind in every element.
    pub fn sample(&self, kind: SampleKind) -> Result<Sample, SampleError> {
        let points = PointsSequence::uniform(kind.points(self.ndims()), self.nelems());
        Sample::new(vec![self.transforms.clone()], points, None)
    }
}

const BOUNDARY_NAMES: [[&str; 2]; 3] = [["left", "right"], ["bottom", "top"], ["front", "back"]];

/// A tensor-product mesh of one to three dimensions.
#[derive(Debug, Clone)]
pub struct RectilinearMesh {
    nodes: Vec<Vec<f64>>,
    interior: Topology,
    boundaries: Vec<(&'static str, Topology)>,
    dofs: Arc<[Data]>,
}

impl RectilinearMesh {
    /// Creates a mesh from the node coordinates along each axis.
    ///
    /// # Panics
    ///
    /// Panics if there are not one to three axes, or if the nodes of an axis are fewer than two
    /// or not strictly increasing.
    pub fn new(nodes: Vec<Vec<f64>>) -> Self {
        assert!(
            (1..=3).contains(&nodes.len()),
            "Rectilinear meshes have one to three dimensions."
        );
        for axis in &nodes {
            assert!(axis.len() >= 2, "Every axis needs at least two nodes.");
            assert!(
                axis.windows(2).all(|pair| pair[0] < pair[1]),
                "Nodes must be strictly increasing."
            );
        }
        let ndims = nodes.len();
        let element_indices = multi_indices(&nodes.iter().map(|axis| axis.len() - 1).collect_vec());

        let element_item = |element: &[usize]| {
            let scale = element
                .iter()
                .zip(&nodes)
                .map(|(&i, axis)| axis[i + 1] - axis[i])
                .collect_vec();
            let shift = element.iter().zip(&nodes).map(|(&i, axis)| axis[i]).collect_vec();
            TransformItem::scale_and_shift(&scale, &shift)
        };
        let chains = element_indices
            .iter()
            .map(|element| TransformChain::new(vec![element_item(element)]))
            .collect();
        let interior = Topology::new(TransformSequence::new(ndims, ndims, chains));

        let mut boundaries = Vec::with_capacity(2 * ndims);
        for axis in 0..ndims {
            let nelems = nodes[axis].len() - 1;
            for side in 0..2 {
                let face = face_item(ndims, axis, side);
                let chains = element_indices
                    .iter()
                    .filter(|element| element[axis] == side * (nelems - 1))
                    .map(|element| TransformChain::new(vec![element_item(element), face.clone()]))
                    .collect();
                let transforms = TransformSequence::new(ndims, ndims - 1, chains);
                boundaries.push((BOUNDARY_NAMES[axis][side], Topology::new(transforms)));
            }
        }

        let node_counts = nodes.iter().map(Vec::len).collect_vec();
        let vertices = multi_indices(&vec![2; ndims]);
        let dofs = element_indices
            .iter()
            .map(|element| {
                let numbers = vertices.iter().map(|vertex| {
                    let node = element.iter().zip(vertex).map(|(e, v)| e + v).collect_vec();
                    row_major(&node, &node_counts) as f64
                });
                Array1::from_iter(numbers).into_dyn()
            })
            .collect();

        Self {
            nodes,
            interior,
            boundaries,
            dofs: Data::table(dofs),
        }
    }

    /// A mesh of the unit hypercube with `nelems` equal elements per axis.
    pub fn unit(ndims: usize, nelems: usize) -> Self {
        let axis = (0..=nelems).map(|i| i as f64 / nelems as f64).collect_vec();
        Self::new(vec![axis; ndims])
    }

    pub fn ndims(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Vec<f64>] {
        &self.nodes
    }

    pub fn nelems(&self) -> usize {
        self.interior.nelems()
    }

    /// Number of nodes, which is the number of degrees of freedom of [`RectilinearMesh::basis`].
    pub fn ndofs(&self) -> usize {
        self.nodes.iter().map(Vec::len).product()
    }

    pub fn topology(&self) -> &Topology {
        &self.interior
    }

    pub fn transforms(&self) -> &TransformSequence {
        self.interior.transforms()
    }

    /// The boundary with the given name: `left`/`right` (first axis), `bottom`/`top` (second
    /// axis) or `front`/`back` (third axis).
    pub fn boundary(&self, name: &str) -> Option<&Topology> {
        self.boundaries
            .iter()
            .find(|(boundary, _)| *boundary == name)
            .map(|(_, topology)| topology)
    }

    pub fn boundary_names(&self) -> impl '_ + Iterator<Item = &'static str> {
        self.boundaries.iter().map(|(name, _)| *name)
    }

    pub fn sample(&self, kind: SampleKind) -> Result<Sample, SampleError> {
        self.interior.sample(kind)
    }

    /// The global coordinates.
    pub fn geometry(&self) -> Array {
        Array::coordinates(self.ndims())
    }

    /// The first-order nodal basis, one function per node.
    pub fn basis(&self) -> Array {
        let basis = NodalBasis {
            transforms: self.interior.transforms().clone(),
            dofs: self.dofs.clone(),
            ndofs: self.ndofs(),
        };
        Array::from_lower(vec![self.ndofs()], Dtype::Float, basis)
    }
}

fn multi_indices(extents: &[usize]) -> Vec<Vec<usize>> {
    extents
        .iter()
        .fold(vec![vec![]], |prefixes, &extent| {
            prefixes
                .into_iter()
                .flat_map(|prefix| {
                    (0..extent).map(move |i| {
                        let mut index = prefix.clone();
                        index.push(i);
                        index
                    })
                })
                .collect()
        })
}

fn row_major(index: &[usize], extents: &[usize]) -> usize {
    index.iter().zip(extents).fold(0, |number, (&i, &n)| number * n + i)
}

/// Embeds the unit hypercube of dimension `ndims - 1` as the face `x[axis] = side`.
fn face_item(ndims: usize, axis: usize, side: usize) -> TransformItem {
    let mut linear = DMatrix::zeros(ndims, ndims - 1);
    for (column, row) in (0..ndims).filter(|&row| row != axis).enumerate() {
        linear[(row, column)] = 1.0;
    }
    let mut offset = DVector::zeros(ndims);
    offset[axis] = side as f64;
    TransformItem::new(linear, offset)
}

struct NodalBasis {
    transforms: TransformSequence,
    dofs: Arc<[Data]>,
    ndofs: usize,
}

impl fmt::Debug for NodalBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodalBasis<{} dofs>", self.ndofs)
    }
}

impl Lower for NodalBasis {
    fn lower(&self, args: &LowerArgs) -> Result<Evaluable, LowerError> {
        let (chain, coords) = args.primary("a nodal basis")?;
        let ielem = Evaluable::transforms_index(self.transforms.clone(), chain.clone());
        let local = Evaluable::transforms_coords(self.transforms.clone(), chain.clone(), coords.clone());
        let dofs = Evaluable::elemwise(self.dofs.clone(), ielem);
        Ok(Evaluable::inflate(Evaluable::lagrange_shape(local), dofs, self.ndofs, 1))
    }
}

/// Dense nodal values of a function given by `f` at the nodes of the mesh.
pub fn interpolate_nodal(mesh: &RectilinearMesh, f: impl Fn(&[f64]) -> f64) -> ArrayD<f64> {
    let counts = mesh.nodes().iter().map(Vec::len).collect_vec();
    let values = multi_indices(&counts)
        .into_iter()
        .map(|index| {
            let x = index.iter().zip(mesh.nodes()).map(|(&i, axis)| axis[i]).collect_vec();
            f(&x)
        })
        .collect_vec();
    Array1::from(values).into_dyn()
}
