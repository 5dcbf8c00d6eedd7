//! Execution of evaluable graphs.
use super::value::{self, Value};
use super::{Evaluable, LoopId, Op, Tuple};
use crate::config::EvaluationConfig;
use crate::error::EvaluationError;
use crate::transform::TransformItem;
use itertools::Itertools;
use log::{debug, trace, warn};
use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Named argument values bound during execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: FxHashMap<String, ArrayD<f64>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ArrayD<f64>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArrayD<f64>) -> Option<ArrayD<f64>> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl '_ + Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Counters collected while executing graphs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    evaluations: BTreeMap<&'static str, usize>,
    loop_passes: usize,
    iterations: usize,
}

impl SessionStats {
    /// How often an operation with the given name was computed.
    pub fn evaluations(&self, op: &str) -> usize {
        self.evaluations.get(op).copied().unwrap_or(0)
    }

    /// Total number of computed nodes.
    pub fn total_evaluations(&self) -> usize {
        self.evaluations.values().sum()
    }

    /// Number of passes over a loop range. Fused loops count once.
    pub fn loop_passes(&self) -> usize {
        self.loop_passes
    }

    /// Number of loop iterations over all passes.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

type Bindings = Vec<(LoopId, usize)>;

struct Frame {
    bindings: Bindings,
    local: FxHashMap<Evaluable, Arc<Value>>,
}

impl Frame {
    fn unbound() -> Self {
        Self {
            bindings: Vec::new(),
            local: FxHashMap::default(),
        }
    }

    fn nested(bindings: &[(LoopId, usize)], id: &LoopId, i: usize) -> Self {
        let mut bindings = bindings.to_vec();
        bindings.push((id.clone(), i));
        Self {
            bindings,
            local: FxHashMap::default(),
        }
    }
}

/// Accumulated loop sums of one or more loop bodies.
struct Partial {
    sums: Vec<Option<Value>>,
}

impl Partial {
    fn new(n: usize) -> Self {
        Self { sums: vec![None; n] }
    }

    fn add(&mut self, k: usize, value: &Value) -> Result<(), EvaluationError> {
        match &mut self.sums[k] {
            Some(sum) => sum.accumulate(value),
            slot => {
                *slot = Some(value.clone());
                Ok(())
            }
        }
    }

    fn merge(mut self, other: Partial) -> Result<Partial, EvaluationError> {
        for (k, value) in other.sums.into_iter().enumerate() {
            if let Some(value) = value {
                self.add(k, &value)?;
            }
        }
        Ok(self)
    }
}

static GRAPH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Executes evaluable graphs with bound arguments.
///
/// Nodes that do not depend on a loop are computed at most once per session. Nodes that depend on
/// a loop are computed at most once per iteration, regardless of how many loop bodies use them.
pub struct Session<'a> {
    arguments: &'a Arguments,
    config: &'a EvaluationConfig,
    global: Mutex<FxHashMap<Evaluable, Arc<Value>>>,
    stats: Mutex<SessionStats>,
}

impl<'a> Session<'a> {
    pub fn new(arguments: &'a Arguments, config: &'a EvaluationConfig) -> Self {
        Self {
            arguments,
            config,
            global: Mutex::new(FxHashMap::default()),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// Evaluates all items of the tuple.
    ///
    /// Loop sums over the same loop are executed in a single pass over the loop range.
    pub fn execute(&self, tuple: &Tuple) -> Result<Vec<Value>, EvaluationError> {
        let nodes = tuple.unique_nodes();
        self.check_arguments(&nodes)?;
        if let Some(directory) = &self.config.graphviz {
            write_graphviz(directory, tuple, &nodes);
        }

        for (id, bodies) in loop_groups(tuple) {
            debug!(
                "executing {} fused loop bodies over {} iterations of {:?}",
                bodies.len(),
                id.length(),
                id.name()
            );
            let sums = self.run_loop(&[], &id, &bodies)?;
            let mut global = self.global.lock();
            for (body, sum) in bodies.iter().zip(sums) {
                let node = Evaluable::from_op(Op::LoopSum {
                    body: body.clone(),
                    index: id.clone(),
                });
                global.insert(node, Arc::new(sum));
            }
        }

        let mut frame = Frame::unbound();
        tuple
            .items()
            .iter()
            .map(|item| {
                let value = self.evaluate(item, &mut frame)?;
                Ok(Arc::try_unwrap(value).unwrap_or_else(|value| (*value).clone()))
            })
            .collect()
    }

    fn check_arguments(&self, nodes: &[Evaluable]) -> Result<(), EvaluationError> {
        let mut declared = BTreeMap::new();
        for node in nodes {
            if let Op::Argument { name, shape } = node.op() {
                declared.insert(name.as_ref(), shape);
            }
        }
        for (&name, &shape) in &declared {
            let value = self
                .arguments
                .get(name)
                .ok_or_else(|| EvaluationError::MissingArgument { name: name.to_string() })?;
            if value.shape() != shape.as_slice() {
                return Err(EvaluationError::ArgumentShapeMismatch {
                    name: name.to_string(),
                    expected: shape.clone(),
                    actual: value.shape().to_vec(),
                });
            }
        }
        if let Some(name) = self
            .arguments
            .names()
            .sorted()
            .find(|name| !declared.contains_key(name))
        {
            return Err(EvaluationError::UnknownArgument { name: name.to_string() });
        }
        Ok(())
    }

    fn run_loop(&self, outer: &[(LoopId, usize)], id: &LoopId, bodies: &[Evaluable]) -> Result<Vec<Value>, EvaluationError> {
        let iteration = |mut partial: Partial, i: usize| -> Result<Partial, EvaluationError> {
            trace!("iteration {i} of {:?}", id.name());
            let mut frame = Frame::nested(outer, id, i);
            for (k, body) in bodies.iter().enumerate() {
                let value = self.evaluate(body, &mut frame)?;
                partial.add(k, &value)?;
            }
            Ok(partial)
        };
        let partial = if self.config.parallel {
            (0..id.length())
                .into_par_iter()
                .try_fold(|| Partial::new(bodies.len()), iteration)
                .try_reduce(|| Partial::new(bodies.len()), |a, b| a.merge(b))?
        } else {
            (0..id.length()).try_fold(Partial::new(bodies.len()), iteration)?
        };
        {
            let mut stats = self.stats.lock();
            stats.loop_passes += 1;
            stats.iterations += id.length();
        }
        Ok(partial
            .sums
            .into_iter()
            .zip(bodies)
            .map(|(sum, body)| sum.unwrap_or_else(|| zeros_like(body)))
            .collect())
    }

    fn evaluate(&self, node: &Evaluable, frame: &mut Frame) -> Result<Arc<Value>, EvaluationError> {
        if node.loop_deps().is_empty() {
            if let Some(value) = self.global.lock().get(node) {
                return Ok(value.clone());
            }
            let value = Arc::new(self.compute(node, frame)?);
            Ok(self.global.lock().entry(node.clone()).or_insert(value).clone())
        } else {
            if let Some(value) = frame.local.get(node) {
                return Ok(value.clone());
            }
            let value = Arc::new(self.compute(node, frame)?);
            frame.local.insert(node.clone(), value.clone());
            Ok(value)
        }
    }

    fn compute(&self, node: &Evaluable, frame: &mut Frame) -> Result<Value, EvaluationError> {
        let value = match node.op() {
            Op::Constant(data) => Value::Dense(data.array().clone()),
            Op::Argument { name, .. } => Value::Dense(
                self.arguments
                    .get(name)
                    .ok_or_else(|| EvaluationError::MissingArgument { name: name.to_string() })?
                    .clone(),
            ),
            Op::LoopIndex(id) => {
                let (_, i) = frame
                    .bindings
                    .iter()
                    .find(|(bound, _)| bound == id)
                    .ok_or_else(|| EvaluationError::UnboundLoopIndex {
                        name: id.name().to_string(),
                    })?;
                value::scalar(*i as f64)
            }
            Op::ElementCoords { points, index } => {
                let index = self.evaluate(index, frame)?;
                let ielem = value::scalar_index(&index, points.len(), "ElementCoords")?;
                let coords = points.get(ielem).map(|points| points.coords().to_owned().into_dyn());
                Value::Dense(coords.unwrap_or_else(|| ArrayD::zeros(IxDyn(&[0, 0]))))
            }
            Op::ElementWeights { points, index } => {
                let index = self.evaluate(index, frame)?;
                let ielem = value::scalar_index(&index, points.len(), "ElementWeights")?;
                let points = &points.get(ielem).ok_or(EvaluationError::TransformNotFound)?;
                let weights = points
                    .weights()
                    .ok_or_else(|| EvaluationError::ShapeMismatch {
                        operation: "ElementWeights",
                        shapes: vec![vec![points.npoints()]],
                    })?;
                Value::Dense(weights.clone().into_dyn())
            }
            Op::ApplyTransforms { chain, coords } => {
                let index = self.evaluate(chain.index(), frame)?;
                let coords = self.evaluate(coords, frame)?;
                let sequence = chain.sequence();
                let i = value::scalar_index(&index, sequence.len(), "ApplyTransforms")?;
                let chain = sequence.get(i).ok_or(EvaluationError::TransformNotFound)?;
                with_points(&coords, chain.fromdims(), "ApplyTransforms", |coords| chain.apply(coords))?
            }
            Op::TransformLinear { chain } => {
                let index = self.evaluate(chain.index(), frame)?;
                let sequence = chain.sequence();
                let i = value::scalar_index(&index, sequence.len(), "TransformLinear")?;
                let linear = sequence.get(i).ok_or(EvaluationError::TransformNotFound)?.linear();
                Value::Dense(ArrayD::from_shape_fn(IxDyn(&[linear.nrows(), linear.ncols()]), |index| {
                    linear[(index[0], index[1])]
                }))
            }
            Op::TransformsIndex { target, chain } => {
                let index = self.evaluate(chain.index(), frame)?;
                let sequence = chain.sequence();
                let i = value::scalar_index(&index, sequence.len(), "TransformsIndex")?;
                let chain = sequence.get(i).ok_or(EvaluationError::TransformNotFound)?;
                let (ielem, _) = target
                    .index_with_tail(chain)
                    .ok_or(EvaluationError::TransformNotFound)?;
                value::scalar(ielem as f64)
            }
            Op::TransformsCoords { target, chain, coords } => {
                let index = self.evaluate(chain.index(), frame)?;
                let coords = self.evaluate(coords, frame)?;
                let sequence = chain.sequence();
                let i = value::scalar_index(&index, sequence.len(), "TransformsCoords")?;
                let chain = sequence.get(i).ok_or(EvaluationError::TransformNotFound)?;
                let (_, tail) = target
                    .index_with_tail(chain)
                    .ok_or(EvaluationError::TransformNotFound)?;
                with_points(&coords, sequence.fromdims(), "TransformsCoords", |coords| {
                    TransformItem::apply_all(tail, coords)
                })?
            }
            Op::Elemwise { table, index } => {
                let index = self.evaluate(index, frame)?;
                let i = value::scalar_index(&index, table.len(), "Elemwise")?;
                Value::Dense(table[i].array().clone())
            }
            Op::Range { length, offset } => {
                let length = self.evaluate(length, frame)?;
                let offset = self.evaluate(offset, frame)?;
                value::range(&length, &offset)?
            }
            Op::SizeOf { array, axis } => {
                let array = self.evaluate(array, frame)?;
                value::scalar(array.shape()[*axis] as f64)
            }
            Op::Add(a, b) => value::add(&*self.evaluate(a, frame)?, &*self.evaluate(b, frame)?)?,
            Op::Multiply(a, b) => value::multiply(&*self.evaluate(a, frame)?, &*self.evaluate(b, frame)?)?,
            Op::Power(a, b) => value::power(&*self.evaluate(a, frame)?, &*self.evaluate(b, frame)?)?,
            Op::Negative(a) => value::negative(&*self.evaluate(a, frame)?),
            Op::Sum { array, axis } => value::sum(&*self.evaluate(array, frame)?, *axis)?,
            Op::InsertAxis { array, axis, length } => {
                let array = self.evaluate(array, frame)?;
                let length = self.evaluate(length, frame)?;
                let length = value::scalar_index(&length, usize::MAX, "InsertAxis")?;
                value::insert_axis(&array, *axis, length)?
            }
            Op::Transpose { array, axes } => value::transpose(&*self.evaluate(array, frame)?, axes),
            Op::Take { array, indices, axis } => {
                let array = self.evaluate(array, frame)?;
                let indices = self.evaluate(indices, frame)?;
                value::take(&array, &indices, *axis)?
            }
            Op::VolumeForm(jacobian) => value::volume_form(&*self.evaluate(jacobian, frame)?)?,
            Op::Sampled { coords, expect } => {
                let coords = self.evaluate(coords, frame)?;
                let expect = self.evaluate(expect, frame)?;
                value::sampled(&coords, &expect)?
            }
            Op::LagrangeShape { coords } => value::lagrange_shape(&*self.evaluate(coords, frame)?)?,
            Op::Inflate {
                array,
                indices,
                length,
                axis,
            } => {
                let array = self.evaluate(array, frame)?;
                let indices = self.evaluate(indices, frame)?;
                value::inflate(&array, &indices, *length, *axis)?
            }
            Op::LoopSum { body, index } => {
                let mut sums = self.run_loop(&frame.bindings, index, std::slice::from_ref(body))?;
                sums.pop().unwrap_or_else(|| zeros_like(body))
            }
        };

        self.stats.lock().evaluations.entry(node.op_name()).and_modify(|n| *n += 1).or_insert(1);
        if self.config.debug.evalf {
            check_static_shape(node, &value)?;
        }
        Ok(value)
    }
}

fn with_points(
    coords: &Value,
    ndims: usize,
    operation: &'static str,
    f: impl FnOnce(ndarray::ArrayView2<f64>) -> ndarray::Array2<f64>,
) -> Result<Value, EvaluationError> {
    let array = coords.dense();
    let mismatch = || EvaluationError::ShapeMismatch {
        operation,
        shapes: vec![array.shape().to_vec()],
    };
    let view = array
        .view()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|_| mismatch())?;
    if view.ncols() != ndims {
        return Err(mismatch());
    }
    Ok(Value::Dense(f(view).into_dyn()))
}

fn zeros_like(node: &Evaluable) -> Value {
    let shape: Vec<usize> = node.shape().iter().map(|n| n.unwrap_or(0)).collect();
    Value::Dense(ArrayD::zeros(IxDyn(&shape)))
}

fn check_static_shape(node: &Evaluable, value: &Value) -> Result<(), EvaluationError> {
    let consistent = node.ndim() == value.shape().len()
        && node
            .shape()
            .iter()
            .zip(value.shape())
            .all(|(expected, &actual)| expected.map_or(true, |n| n == actual));
    if consistent {
        Ok(())
    } else {
        Err(EvaluationError::ShapeMismatch {
            operation: node.op_name(),
            shapes: vec![
                node.shape().iter().map(|n| n.unwrap_or(0)).collect(),
                value.shape().to_vec(),
            ],
        })
    }
}

/// Loop sums reachable from the tuple outside of other loop sums, grouped by loop in order of
/// first appearance.
fn loop_groups(tuple: &Tuple) -> Vec<(LoopId, Vec<Evaluable>)> {
    let mut groups: Vec<(LoopId, Vec<Evaluable>)> = Vec::new();
    let mut visited = FxHashSet::default();
    let mut stack: Vec<Evaluable> = tuple.items().iter().rev().cloned().collect();
    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Op::LoopSum { body, index } = node.op() {
            match groups.iter_mut().find(|(id, _)| id == index) {
                Some((_, bodies)) => bodies.push(body.clone()),
                None => groups.push((index.clone(), vec![body.clone()])),
            }
        } else {
            stack.extend(node.op().children().into_iter().rev().cloned());
        }
    }
    groups
}

fn write_graphviz(directory: &Path, tuple: &Tuple, nodes: &[Evaluable]) {
    let ids: FxHashMap<&Evaluable, usize> = nodes.iter().enumerate().map(|(i, node)| (node, i)).collect();
    let mut dot = String::from("digraph {\n  node [shape=box];\n");
    for (i, node) in nodes.iter().enumerate() {
        let _ = writeln!(dot, "  n{i} [label=\"{node:?}\"];");
        for child in node.op().children() {
            if let Some(j) = ids.get(child) {
                let _ = writeln!(dot, "  n{j} -> n{i};");
            }
        }
    }
    for (k, item) in tuple.items().iter().enumerate() {
        if let Some(i) = ids.get(item) {
            let _ = writeln!(dot, "  out{k} [shape=oval, label=\"output {k}\"];\n  n{i} -> out{k};");
        }
    }
    dot.push_str("}\n");

    let path = directory.join(format!("samplex-{}.dot", GRAPH_COUNTER.fetch_add(1, Ordering::Relaxed)));
    match fs::create_dir_all(directory).and_then(|_| fs::write(&path, dot)) {
        Ok(()) => debug!("wrote graph to {}", path.display()),
        Err(err) => warn!("failed to write graph to {}: {err}", path.display()),
    }
}
