use super::*;
use crate::Cost;
use crate::Error;
use crate::Mass;
use crate::Result;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use rayon::prelude::*;

/// Transport costs of a batch of distribution pairs.
///
/// One value per batch row. Differentiable backends also report the
/// gradient of every value with respect to its own row of both inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Loss {
    values: Array1<Cost>,
    gradient: Option<Gradient>,
}

/// Row-wise gradients of a [`Loss`] with respect to both inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub mu: Array2<Mass>,
    pub nu: Array2<Mass>,
}

impl Loss {
    pub fn new(values: Array1<Cost>, gradient: Option<Gradient>) -> Self {
        Self { values, gradient }
    }
    pub fn values(&self) -> &Array1<Cost> {
        &self.values
    }
    /// Sum over the batch; the cost itself for a single pair.
    pub fn value(&self) -> Cost {
        self.values.sum()
    }
    pub fn gradient(&self) -> Option<&Gradient> {
        self.gradient.as_ref()
    }
}

/// Balanced transport solver behind a [`PartialTransport`](crate::PartialTransport).
///
/// Chosen once at construction. Both variants take distributions that are
/// already extended to the sink and carry equal mass per row.
///
/// - [`Exact`]: single pair, exact cost and plan, not differentiable
/// - [`Regularized`]: batched, approximate, with gradients
pub trait Backend: Send + Sync {
    /// Sink-extended cost matrix solved against.
    fn matrix(&self) -> &Array2<Cost>;
    /// One cost per batch row of the extended distributions.
    fn evaluate(&self, mu: ArrayView2<Mass>, nu: ArrayView2<Mass>) -> Result<Loss>;
    /// Transport plan for a single extended pair.
    fn plan(&self, _: ArrayView1<Mass>, _: ArrayView1<Mass>) -> Result<Plan> {
        Err(Error::Value("transport plans are only available from the exact solver".into()))
    }
}

/// Exact transportation LP on the extended support.
pub struct Exact {
    matrix: Array2<Cost>,
    mode: Mode,
}

impl Exact {
    pub fn new(matrix: Array2<Cost>, mode: Mode) -> Self {
        Self { matrix, mode }
    }
    /// Rescales the extended pair according to the metric mode.
    ///
    /// In absolute mode the totals already agree after sink padding; the
    /// predicted side is still rescaled onto the true total so rounding in
    /// the padding cannot leave the solver with unequal masses.
    fn prepare(&self, mu: ArrayView1<Mass>, nu: ArrayView1<Mass>) -> (Array1<Mass>, Array1<Mass>) {
        let (a, b) = (mu.sum(), nu.sum());
        match self.mode {
            Mode::Absolute if a == b => (mu.to_owned(), nu.to_owned()),
            Mode::Absolute => {
                log::trace!("rescaling predicted mass {a} onto true mass {b}");
                (mu.mapv(|x| x / a * b), nu.to_owned())
            }
            Mode::Relative => (mu.mapv(|x| x / a), nu.mapv(|x| x / b)),
        }
    }
}

impl Backend for Exact {
    fn matrix(&self) -> &Array2<Cost> {
        &self.matrix
    }
    fn evaluate(&self, mu: ArrayView2<Mass>, nu: ArrayView2<Mass>) -> Result<Loss> {
        if mu.nrows() != 1 || nu.nrows() != 1 {
            return Err(Error::Value(format!(
                "exact transport takes a single distribution pair, got a batch of {}",
                mu.nrows()
            )));
        }
        let plan = self.plan(mu.row(0), nu.row(0))?;
        let cost = plan.cost(self.matrix.view());
        Ok(Loss::new(Array1::from_elem(1, cost), None))
    }
    fn plan(&self, mu: ArrayView1<Mass>, nu: ArrayView1<Mass>) -> Result<Plan> {
        if mu.sum() <= 0. || nu.sum() <= 0. {
            return Ok(Plan::zeros(mu.len(), nu.len()));
        }
        let (ref mu, ref nu) = self.prepare(mu, nu);
        emd(mu.view(), nu.view(), self.matrix.view())
    }
}

/// Debiased Sinkhorn divergence on the extended support.
pub struct Regularized {
    matrix: Array2<Cost>,
    regularization: Regularization,
    spatiotemporal: bool,
}

impl Regularized {
    pub fn new(matrix: Array2<Cost>, regularization: Regularization, spatiotemporal: bool) -> Self {
        Self {
            matrix,
            regularization,
            spatiotemporal,
        }
    }
    /// Divergence and gradients of one extended pair.
    fn solve<'a>(&'a self, mu: ArrayView1<'a, Mass>, nu: ArrayView1<'a, Mass>) -> Result<(Cost, Array1<Mass>, Array1<Mass>)> {
        if mu.sum() <= 0. && nu.sum() <= 0. {
            return Ok((0., Array1::zeros(mu.len()), Array1::zeros(nu.len())));
        }
        let sinkhorn = Sinkhorn::try_from((mu, nu, self.matrix.view()))?
            .regularization(self.regularization)
            .spatiotemporal(self.spatiotemporal)
            .minimize()?;
        let (dmu, dnu) = sinkhorn.gradient();
        Ok((sinkhorn.divergence(), dmu, dnu))
    }
}

impl Backend for Regularized {
    fn matrix(&self) -> &Array2<Cost> {
        &self.matrix
    }
    fn evaluate(&self, mu: ArrayView2<Mass>, nu: ArrayView2<Mass>) -> Result<Loss> {
        let rows = (0..mu.nrows())
            .into_par_iter()
            .map(|r| self.solve(mu.row(r), nu.row(r)))
            .collect::<Result<Vec<_>>>()?;
        let values = rows.iter().map(|(value, _, _)| *value).collect();
        let dmu = Array2::from_shape_fn(mu.dim(), |(r, x)| rows[r].1[x]);
        let dnu = Array2::from_shape_fn(nu.dim(), |(r, y)| rows[r].2[y]);
        Ok(Loss::new(values, Some(Gradient { mu: dmu, nu: dnu })))
    }
}
