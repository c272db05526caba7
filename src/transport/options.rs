use crate::Cost;
use crate::Error;
use crate::Result;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

/// Cost of importing or exporting one unit of mass through the sink.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    /// The largest entry of the cost matrix before extension.
    #[default]
    Max,
    /// A fixed non-negative cost.
    Fixed(Cost),
}

impl Penalty {
    /// Resolves the penalty against the cost matrix it will extend.
    pub fn resolve(&self, cost: &Array2<Cost>) -> Cost {
        match self {
            Penalty::Max => cost.iter().copied().fold(0., Cost::max),
            Penalty::Fixed(c) => *c,
        }
    }
}

/// What the exact solver measures.
///
/// The two modes are different metrics, not different units: comparing
/// values across modes is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Total relocation cost of the actual masses, imbalance included.
    #[default]
    Absolute,
    /// Divergence between the two distributions after scaling each to unit mass.
    Relative,
}

/// Parameters of the entropy-regularized solver.
///
/// With exponent `p`, the solver works at temperature `ε = blur^p` with
/// marginal penalty `ρ = reach^p`, annealing ε geometrically by `scaling^p`.
/// `reach = None` enforces the marginals exactly (balanced transport).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Regularization {
    pub blur: Cost,
    pub reach: Option<Cost>,
    pub scaling: Cost,
}

impl Default for Regularization {
    fn default() -> Self {
        Self {
            blur: crate::SINKHORN_BLUR,
            reach: Some(crate::SINKHORN_REACH),
            scaling: crate::SINKHORN_SCALING,
        }
    }
}

impl Regularization {
    pub fn balanced(blur: Cost) -> Self {
        Self {
            blur,
            reach: None,
            scaling: crate::SINKHORN_SCALING,
        }
    }
    /// Final temperature ε.
    pub fn epsilon(&self) -> Cost {
        self.blur.powi(crate::SINKHORN_EXPONENT)
    }
    /// Marginal penalty ρ, if unbalanced.
    pub fn rho(&self) -> Option<Cost> {
        self.reach.map(|r| r.powi(crate::SINKHORN_EXPONENT))
    }
    pub fn check(&self) -> Result<()> {
        if !(self.blur.is_finite() && self.blur > 0.) {
            return Err(Error::Value(format!("blur must be positive, got {}", self.blur)));
        }
        if let Some(reach) = self.reach {
            if !(reach.is_finite() && reach > 0.) {
                return Err(Error::Value(format!("reach must be positive, got {reach}")));
            }
        }
        if !(self.scaling > 0. && self.scaling < 1.) {
            return Err(Error::Value(format!("scaling must lie in (0, 1), got {}", self.scaling)));
        }
        Ok(())
    }
}

/// Which transport solver backs a [`PartialTransport`](crate::PartialTransport).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    /// Transportation LP. Single distributions, no gradients.
    Exact,
    /// Sinkhorn divergence. Batched, with gradients.
    Regularized(Regularization),
}

impl Default for Solver {
    fn default() -> Self {
        Solver::Regularized(Regularization::default())
    }
}

/// Construction-time configuration of a [`PartialTransport`](crate::PartialTransport).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Cost of routing mass through the sink.
    pub penalty: Penalty,
    /// Rescale the extended cost matrix so its largest entry is 1.
    pub normalize: bool,
    pub mode: Mode,
    pub solver: Solver,
    /// The cost matrix is a space-time expansion; lets the regularized
    /// solver anneal over its wider range of scales.
    pub spatiotemporal: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            penalty: Penalty::default(),
            normalize: true,
            mode: Mode::default(),
            solver: Solver::default(),
            spatiotemporal: false,
        }
    }
}

impl Options {
    pub fn exact() -> Self {
        Self {
            solver: Solver::Exact,
            ..Self::default()
        }
    }
    pub fn regularized(regularization: Regularization) -> Self {
        Self {
            solver: Solver::Regularized(regularization),
            ..Self::default()
        }
    }
    pub fn penalty(self, penalty: Penalty) -> Self {
        Self { penalty, ..self }
    }
    pub fn normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }
    pub fn mode(self, mode: Mode) -> Self {
        Self { mode, ..self }
    }
    pub fn spatiotemporal(self, spatiotemporal: bool) -> Self {
        Self { spatiotemporal, ..self }
    }
    pub fn check(&self) -> Result<()> {
        if let Penalty::Fixed(c) = self.penalty {
            if !(c.is_finite() && c >= 0.) {
                return Err(Error::Value(format!("waste penalty must be non-negative, got {c}")));
            }
        }
        match (self.solver, self.mode) {
            (Solver::Regularized(_), Mode::Relative) => Err(Error::Value(
                "relative mode is only defined for the exact solver".into(),
            )),
            (Solver::Regularized(regularization), Mode::Absolute) => regularization.check(),
            (Solver::Exact, _) => Ok(()),
        }
    }
}
