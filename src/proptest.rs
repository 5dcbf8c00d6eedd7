use crate::mesh::{RectilinearMesh, SampleKind};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use samplex_sparse::SparseData;
use std::cmp::max;

/// Strictly increasing node coordinates of one axis, with `nelems` elements.
pub fn axis_nodes(nelems: usize) -> impl Strategy<Value = Vec<f64>> {
    // Bounded element lengths keep the geometry well conditioned
    (-10.0..10.0, vec(0.1..2.0, nelems)).prop_map(|(start, lengths)| {
        let mut nodes = Vec::with_capacity(lengths.len() + 1);
        nodes.push(start);
        for length in lengths {
            nodes.push(nodes[nodes.len() - 1] + length);
        }
        nodes
    })
}

// Returns a strategy in which each value is the number of elements per axis
// such that their product is at most max_elements
fn element_distribution_strategy(ndims: usize, max_elements: usize) -> impl Strategy<Value = Vec<usize>> {
    let per_axis = max(1, (max_elements as f64).powf(1.0 / ndims as f64).floor() as usize);
    vec(1..=per_axis, ndims)
}

/// Rectilinear meshes of `ndims` dimensions with at most `max_elements` elements.
pub fn rectilinear_mesh_strategy(ndims: usize, max_elements: usize) -> impl Strategy<Value = RectilinearMesh> {
    element_distribution_strategy(ndims, max_elements)
        .prop_flat_map(|counts| counts.into_iter().map(axis_nodes).collect::<Vec<_>>())
        .prop_map(RectilinearMesh::new)
}

impl Arbitrary for SampleKind {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            (0..6usize).prop_map(SampleKind::Gauss),
            (2..5usize).prop_map(SampleKind::Bezier),
            Just(SampleKind::Vertex),
        ]
        .boxed()
    }
}

/// Point selections of length `npoints`.
pub fn point_mask(npoints: usize) -> impl Strategy<Value = Vec<bool>> {
    vec(any::<bool>(), npoints)
}

/// Sparse data of the given shape with up to `max_entries` entries, duplicates included.
pub fn sparse_data(shape: Vec<usize>, max_entries: usize) -> impl Strategy<Value = SparseData> {
    let empty = shape.iter().any(|&extent| extent == 0);
    let max_entries = if empty { 0 } else { max_entries };
    let coordinate = shape.iter().map(|&extent| 0..max(1, extent)).collect::<Vec<_>>();
    vec((coordinate, -10.0..10.0), 0..=max_entries).prop_map(move |entries| {
        let mut data = SparseData::new(shape.clone());
        for (coordinate, value) in entries {
            data.push(&coordinate, value);
        }
        data
    })
}
