//! Graph rewriting.
//!
//! The only rewrite is *inflate hoisting*: scatter operations are moved outwards past products,
//! sums, axis insertions, transpositions, negations and takes, so that the dense intermediate
//! results of a loop body stay as small as the element-local data they are computed from, and
//! the loop body produces sparse output.
//!
//! Hoisting relies on the indices of an inflation being distinct, so that taking an inflated
//! axis at its own indices recovers the uninflated array.
use super::{Evaluable, Op, Tuple};
use log::debug;
use rustc_hash::FxHashMap;

impl Tuple {
    /// Returns an equivalent tuple in which scatter operations are hoisted out of element-local
    /// computations.
    pub fn optimized(&self) -> Tuple {
        let mut memo = FxHashMap::default();
        let items = self.items.iter().map(|item| hoist(item, &mut memo)).collect();
        let optimized = Tuple::new(items);
        debug!(
            "optimized graph with {} nodes into {} nodes",
            self.node_count(),
            optimized.node_count()
        );
        optimized
    }
}

fn hoist(node: &Evaluable, memo: &mut FxHashMap<Evaluable, Evaluable>) -> Evaluable {
    if let Some(rewritten) = memo.get(node) {
        return rewritten.clone();
    }
    let op = node.op().map(|child| hoist(child, memo));
    let rewritten = match op {
        Op::Multiply(a, b) => multiply(a, b),
        Op::Add(a, b) => add(a, b),
        Op::Negative(a) => negative(a),
        Op::Sum { array, axis } => sum(array, axis),
        Op::InsertAxis { array, axis, length } => insert_axis(array, axis, length),
        Op::Transpose { array, axes } => transpose(array, axes),
        Op::Take { array, indices, axis } => take(array, indices, axis),
        op => Evaluable::from_op(op),
    };
    memo.insert(node.clone(), rewritten.clone());
    rewritten
}

struct Inflation {
    array: Evaluable,
    indices: Evaluable,
    length: usize,
    axis: usize,
}

impl Inflation {
    fn of(evaluable: &Evaluable) -> Option<Self> {
        match evaluable.op() {
            Op::Inflate {
                array,
                indices,
                length,
                axis,
            } => Some(Self {
                array: array.clone(),
                indices: indices.clone(),
                length: *length,
                axis: *axis,
            }),
            _ => None,
        }
    }

    fn wrap(&self, array: Evaluable, axis: usize) -> Evaluable {
        Evaluable::inflate(array, self.indices.clone(), self.length, axis)
    }
}

fn multiply(a: Evaluable, b: Evaluable) -> Evaluable {
    if let Some(inflation) = Inflation::of(&a) {
        let b = take(b, inflation.indices.clone(), inflation.axis);
        inflation.wrap(multiply(inflation.array.clone(), b), inflation.axis)
    } else if let Some(inflation) = Inflation::of(&b) {
        let a = take(a, inflation.indices.clone(), inflation.axis);
        inflation.wrap(multiply(a, inflation.array.clone()), inflation.axis)
    } else {
        Evaluable::multiply(a, b)
    }
}

fn add(a: Evaluable, b: Evaluable) -> Evaluable {
    match (Inflation::of(&a), Inflation::of(&b)) {
        (Some(p), Some(q)) if p.axis == q.axis && p.length == q.length && p.indices == q.indices => {
            p.wrap(add(p.array.clone(), q.array), p.axis)
        }
        _ => Evaluable::add(a, b),
    }
}

fn negative(a: Evaluable) -> Evaluable {
    match Inflation::of(&a) {
        Some(inflation) => inflation.wrap(negative(inflation.array.clone()), inflation.axis),
        None => Evaluable::negative(a),
    }
}

fn sum(array: Evaluable, axis: usize) -> Evaluable {
    match Inflation::of(&array) {
        Some(inflation) if inflation.axis == axis => sum(inflation.array, axis),
        Some(inflation) => {
            let inflated_axis = if axis < inflation.axis {
                inflation.axis - 1
            } else {
                inflation.axis
            };
            inflation.wrap(sum(inflation.array.clone(), axis), inflated_axis)
        }
        None => Evaluable::sum(array, axis),
    }
}

fn insert_axis(array: Evaluable, axis: usize, length: Evaluable) -> Evaluable {
    match Inflation::of(&array) {
        Some(inflation) => {
            let inflated_axis = if axis <= inflation.axis {
                inflation.axis + 1
            } else {
                inflation.axis
            };
            inflation.wrap(insert_axis(inflation.array.clone(), axis, length), inflated_axis)
        }
        None => Evaluable::insert_axis(array, axis, length),
    }
}

fn transpose(array: Evaluable, axes: Vec<usize>) -> Evaluable {
    match Inflation::of(&array) {
        Some(inflation) => {
            let inflated_axis = axes
                .iter()
                .position(|&axis| axis == inflation.axis)
                .expect("Transpose axes form a permutation");
            inflation.wrap(transpose(inflation.array.clone(), axes), inflated_axis)
        }
        None => Evaluable::transpose(array, axes),
    }
}

fn take(array: Evaluable, indices: Evaluable, axis: usize) -> Evaluable {
    match Inflation::of(&array) {
        Some(inflation) if inflation.axis == axis && inflation.indices == indices => inflation.array,
        Some(inflation) if inflation.axis != axis => {
            let inflated_axis = if indices.ndim() == 0 && axis < inflation.axis {
                inflation.axis - 1
            } else {
                inflation.axis
            };
            inflation.wrap(take(inflation.array.clone(), indices, axis), inflated_axis)
        }
        _ => Evaluable::take(array, indices, axis),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Evaluable, Op, Tuple};
    use ndarray::{arr1, arr2};

    #[test]
    fn inflation_is_hoisted_out_of_outer_products() {
        let shape = Evaluable::constant(arr2(&[[0.25, 0.75], [0.75, 0.25]]).into_dyn());
        let dofs = Evaluable::constant(arr1(&[3.0, 4.0]).into_dyn());
        let basis = Evaluable::inflate(shape, dofs, 6, 1);
        let ndofs = Evaluable::scalar(6.0);
        let outer = Evaluable::multiply(
            Evaluable::insert_axis(basis.clone(), 2, ndofs.clone()),
            Evaluable::insert_axis(basis, 1, ndofs),
        );
        let summed = Evaluable::sum(outer, 0);
        let optimized = Tuple::new(vec![summed]).optimized();

        let Op::Inflate { array, axis: 0, length: 6, .. } = optimized.items()[0].op() else {
            panic!("expected an outer inflation, got {:?}", optimized.items()[0]);
        };
        let Op::Inflate { array, axis: 1, .. } = array.op() else {
            panic!("expected an inner inflation, got {array:?}");
        };
        assert!(matches!(array.op(), Op::Sum { axis: 0, .. }));
        assert_eq!(array.shape(), &[Some(2), Some(2)]);
    }
}
