//! Joint evaluation of integrals and sampled functions.
//!
//! All expressions passed to one call are lowered into a single evaluable graph, which is then
//! executed in one session. Work shared between the expressions, such as element geometry or
//! basis functions, is therefore computed once per element rather than once per expression, and
//! integrals over the same sample share a single pass over its elements.
use crate::assembly::{convert, Assembled};
use crate::config::EvaluationConfig;
use crate::evaluable::{Arguments, Session, Tuple};
use crate::function::Array;
use eyre::WrapErr;
use log::{debug, info};
use samplex_sparse::SparseData;
use std::time::Instant;

/// Evaluates the expressions jointly, returning one raw sparse result per expression.
///
/// The results may contain duplicate coordinates, whose values are to be summed, and explicit
/// zeros. See [`eval_integrals`] for assembled results.
pub fn eval_integrals_sparse(integrals: &[Array], arguments: &Arguments) -> eyre::Result<Vec<SparseData>> {
    eval_integrals_sparse_with_config(integrals, arguments, EvaluationConfig::global())
}

pub fn eval_integrals_sparse_with_config(
    integrals: &[Array],
    arguments: &Arguments,
    config: &EvaluationConfig,
) -> eyre::Result<Vec<SparseData>> {
    if integrals.is_empty() {
        return Ok(Vec::new());
    }
    let start = Instant::now();
    let items = integrals
        .iter()
        .map(|integral| integral.as_evaluable_sparse_with_config(config))
        .collect::<Result<Vec<_>, _>>()?;
    let tuple = Tuple::new(items).optimized();
    debug!(
        "lowered {} expressions to a graph of {} nodes",
        integrals.len(),
        tuple.node_count()
    );

    let session = Session::new(arguments, config);
    let values = session.execute(&tuple)?;

    let mut results = Vec::with_capacity(values.len());
    for (index, (value, integral)) in values.into_iter().zip(integrals).enumerate() {
        let data = value.into_sparse();
        if config.debug.sparse {
            data.validate()
                .wrap_err_with(|| format!("result {index} of the joint evaluation is malformed"))?;
            eyre::ensure!(
                data.shape() == integral.shape(),
                "result {index} has shape {:?}, expected {:?}",
                data.shape(),
                integral.shape()
            );
        }
        results.push(data);
    }
    let stats = session.stats();
    info!(
        "evaluated {} expressions in {:.3?} ({} element iterations in {} loop passes)",
        integrals.len(),
        start.elapsed(),
        stats.iterations(),
        stats.loop_passes()
    );
    Ok(results)
}

/// Evaluates the expressions jointly and converts every result according to its rank.
pub fn eval_integrals(integrals: &[Array], arguments: &Arguments) -> eyre::Result<Vec<Assembled>> {
    eval_integrals_with_config(integrals, arguments, EvaluationConfig::global())
}

pub fn eval_integrals_with_config(
    integrals: &[Array],
    arguments: &Arguments,
    config: &EvaluationConfig,
) -> eyre::Result<Vec<Assembled>> {
    let results = eval_integrals_sparse_with_config(integrals, arguments, config)?;
    let count = results.len();
    results
        .into_iter()
        .enumerate()
        .map(|(index, data)| {
            debug!("assembling {}/{}", index + 1, count);
            convert(data).wrap_err_with(|| format!("failed to assemble result {index}"))
        })
        .collect()
}
