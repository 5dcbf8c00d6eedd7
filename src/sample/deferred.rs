//! Expressions bound to the points of a sample.
use super::Sample;
use crate::error::LowerError;
use crate::evaluable::{ChainRef, Evaluable};
use crate::function::{Array, Dtype, Lower, LowerArgs};
use std::fmt;

const ELEMENT_LOOP: &str = "_ielem";

/// The loop over the elements of `sample`, with the lowering arguments of its points.
fn bind(sample: &Sample, args: &LowerArgs) -> Result<(Evaluable, LowerArgs), LowerError> {
    if args.is_bound() {
        return Err(LowerError::NestedSample);
    }
    let ielem = Evaluable::loop_index(ELEMENT_LOOP, sample.nelems());
    let coords = sample.points().evaluable_coords(&ielem);
    let chains = sample
        .transforms()
        .iter()
        .map(|sequence| ChainRef::new(sequence.clone(), ielem.clone()))
        .collect::<Vec<_>>();
    let coordinates = vec![coords; chains.len()];
    let bound = LowerArgs::bound(chains, coordinates).with_ndim_check(args.checks_ndim());
    Ok((ielem, bound))
}

/// The integral of a function over a sample.
///
/// Lowers to a sum over elements of the weighted sum over the points of each element.
#[derive(Clone)]
pub struct Integral {
    integrand: Array,
    sample: Sample,
}

impl Integral {
    pub fn new(integrand: Array, sample: Sample) -> Self {
        Self { integrand, sample }
    }

    pub fn integrand(&self) -> &Array {
        &self.integrand
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }
}

impl fmt::Debug for Integral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Integral<{:?}>({})", self.integrand.shape(), self.sample)
    }
}

impl Lower for Integral {
    fn lower(&self, args: &LowerArgs) -> Result<Evaluable, LowerError> {
        let (ielem, bound) = bind(&self.sample, args)?;
        if self.sample.points().iter().any(|points| points.weights().is_none()) {
            return Err(LowerError::MissingWeights);
        }
        let integrand = self.integrand.lower(&bound)?;
        let weights = (1..integrand.ndim()).fold(self.sample.points().evaluable_weights(&ielem), |weights, axis| {
            let length = Evaluable::size_of(&integrand, axis);
            Evaluable::insert_axis(weights, axis, length)
        });
        let weighted = Evaluable::sum(Evaluable::multiply(weights, integrand), 0);
        Ok(Evaluable::loop_sum(weighted, &ielem))
    }
}

impl From<Integral> for Array {
    fn from(integral: Integral) -> Self {
        let shape = integral.integrand.shape().to_vec();
        Array::from_lower(shape, Dtype::Float, integral)
    }
}

/// A function evaluated at the points of a sample.
///
/// The result has a leading axis of one entry per global point number. Points that share a
/// number contribute the sum of their values.
#[derive(Clone)]
pub struct AtSample {
    func: Array,
    sample: Sample,
}

impl AtSample {
    pub fn new(func: Array, sample: Sample) -> Self {
        Self { func, sample }
    }

    pub fn func(&self) -> &Array {
        &self.func
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }
}

impl fmt::Debug for AtSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtSample<{:?}>({})", self.func.shape(), self.sample)
    }
}

impl Lower for AtSample {
    fn lower(&self, args: &LowerArgs) -> Result<Evaluable, LowerError> {
        let (ielem, bound) = bind(&self.sample, args)?;
        let func = self.func.lower(&bound)?;
        let indices = self.sample.evaluable_indices(&ielem);
        let inflated = Evaluable::inflate(func, indices, self.sample.npoints(), 0);
        Ok(Evaluable::loop_sum(inflated, &ielem))
    }
}

impl From<AtSample> for Array {
    fn from(at: AtSample) -> Self {
        let shape = std::iter::once(at.sample.npoints())
            .chain(at.func.shape().iter().copied())
            .collect();
        let dtype = at.func.dtype();
        Array::from_lower(shape, dtype, at)
    }
}
