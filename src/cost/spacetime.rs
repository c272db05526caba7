use crate::Cost;
use crate::Error;
use crate::Mass;
use crate::Result;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Zip;
use ndarray::s;

/// Expansion of a square spatial cost matrix across discrete time steps.
///
/// The expanded matrix has `steps × steps` blocks of the spatial matrix's
/// size. Flat index `i` addresses time step `i / stations` at station
/// `i % stations`; rows are prediction slots, columns ground-truth slots.
///
/// Block `(t_pred, t_true)` is the spatial cost floored elementwise by the
/// waiting time between the two steps, so relocating within one station
/// across time still costs the waiting time. Diagonal blocks carry no
/// waiting time and equal the spatial matrix exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTime {
    steps: usize,
    forward: Cost,
    backward: Cost,
}

impl Default for SpaceTime {
    fn default() -> Self {
        Self {
            steps: crate::SPACETIME_STEPS,
            forward: crate::SPACETIME_FORWARD,
            backward: crate::SPACETIME_BACKWARD,
        }
    }
}

impl SpaceTime {
    /// `forward` is the cost per step of using demand that was allocated to
    /// an earlier step; `backward` the cost per step of using demand that
    /// belongs to a later one. Both in the spatial matrix's units (hours).
    pub fn new(steps: usize, forward: Cost, backward: Cost) -> Result<Self> {
        if steps == 0 {
            return Err(Error::Value("space-time expansion needs at least one step".into()));
        }
        if !(forward.is_finite() && forward >= 0.) || !(backward.is_finite() && backward >= 0.) {
            return Err(Error::Value(format!(
                "waiting costs must be non-negative, got forward={forward} backward={backward}"
            )));
        }
        Ok(Self {
            steps,
            forward,
            backward,
        })
    }
    pub fn steps(&self) -> usize {
        self.steps
    }
    /// Waiting-time floor between a prediction step and a ground-truth step.
    pub fn waiting(&self, pred: usize, truth: usize) -> Cost {
        if pred > truth {
            (pred - truth) as Cost * self.backward
        } else {
            (truth - pred) as Cost * self.forward
        }
    }
    /// Builds the `(steps·N) × (steps·N)` space-time cost matrix.
    pub fn expand(&self, space: &Array2<Cost>) -> Result<Array2<Cost>> {
        let (rows, cols) = space.dim();
        if rows != cols {
            return Err(Error::Shape(format!(
                "space-time expansion needs a square matrix, got {rows}x{cols}"
            )));
        }
        let n = rows;
        let mut expanded = Array2::zeros((self.steps * n, self.steps * n));
        for pred in 0..self.steps {
            for truth in 0..self.steps {
                let wait = self.waiting(pred, truth);
                let block = expanded.slice_mut(s![pred * n..(pred + 1) * n, truth * n..(truth + 1) * n]);
                Zip::from(block)
                    .and(space)
                    .for_each(|cell, &cost| *cell = Cost::max(cost, wait));
            }
        }
        log::debug!(
            "expanded {}x{} space cost over {} steps (forward {}, backward {})",
            n,
            n,
            self.steps,
            self.forward,
            self.backward
        );
        Ok(expanded)
    }
    /// Flat index of a station at a time step.
    pub fn index(&self, step: usize, station: usize, stations: usize) -> usize {
        step * stations + station
    }
    /// Time step and station addressed by a flat index.
    pub fn slot(&self, index: usize, stations: usize) -> Result<(usize, usize)> {
        if stations == 0 || index >= self.steps * stations {
            return Err(Error::Value(format!(
                "index {index} outside {} steps of {stations} stations",
                self.steps
            )));
        }
        Ok((index / stations, index % stations))
    }
    /// Flattens per-step demand of shape `(steps, stations)` into the
    /// time-major layout the expanded matrix is indexed by.
    pub fn flatten(&self, demand: ArrayView2<Mass>) -> Result<Array1<Mass>> {
        if demand.nrows() != self.steps {
            return Err(Error::Shape(format!(
                "demand covers {} steps, expansion has {}",
                demand.nrows(),
                self.steps
            )));
        }
        Ok(demand.iter().copied().collect())
    }
}

/// Space-time cost matrix from a square spatial (travel time) matrix.
pub fn spacetime(space: &Array2<Cost>, steps: usize, forward: Cost, backward: Cost) -> Result<Array2<Cost>> {
    SpaceTime::new(steps, forward, backward)?.expand(space)
}
