use super::*;
use crate::Cost;
use crate::Error;
use crate::Mass;
use crate::Point;
use crate::Result;
use crate::SpaceCost;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::s;
use serde::Deserialize;
use serde::Serialize;

/// Transport between two unaligned point sets of possibly different size.
///
/// Each point carries the same mass. The smaller set is padded with
/// fictitious points at `import` until both have `N' = max(len)` points, and
/// every pairing that involves a fictitious point costs `phi` instead of a
/// real distance. The count mismatch is thereby priced as `phi` per missing
/// point, while the remaining points are matched by ordinary balanced
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Unpaired {
    pub import: Point,
    pub phi: Cost,
}

impl Default for Unpaired {
    fn default() -> Self {
        Self {
            import: [0., 0.],
            phi: crate::IMPORT_COST_PHI,
        }
    }
}

impl Unpaired {
    pub fn new(import: Point, phi: Cost) -> Self {
        Self { import, phi }
    }
    /// Padded cost matrix between the two sets, shape `N' × N'`.
    pub fn matrix(&self, pred: &[Point], truth: &[Point]) -> Result<Array2<Cost>> {
        let n = Self::size(pred, truth)?;
        let ref lhs = self.pad(pred, n);
        let ref rhs = self.pad(truth, n);
        let mut matrix = SpaceCost::from(lhs.as_slice()).against(rhs.as_slice()).distances();
        matrix.slice_mut(s![pred.len().., ..]).fill(self.phi);
        matrix.slice_mut(s![.., truth.len()..]).fill(self.phi);
        Ok(matrix)
    }
    /// Optimal plan between the padded sets.
    ///
    /// A supplied cost matrix replaces the padded distances and is used as is.
    pub fn plan(&self, pred: &[Point], truth: &[Point], cost: Option<&Array2<Cost>>) -> Result<Plan> {
        let (_, plan) = self.solve(pred, truth, cost)?;
        Ok(plan)
    }
    /// Total cost of the optimal plan.
    pub fn cost(&self, pred: &[Point], truth: &[Point], cost: Option<&Array2<Cost>>) -> Result<Cost> {
        let (matrix, plan) = self.solve(pred, truth, cost)?;
        Ok(plan.cost(matrix.view()))
    }
    fn solve(&self, pred: &[Point], truth: &[Point], cost: Option<&Array2<Cost>>) -> Result<(Array2<Cost>, Plan)> {
        let n = Self::size(pred, truth)?;
        let matrix = match cost {
            None => self.matrix(pred, truth)?,
            Some(cost) if cost.dim() != (n, n) => {
                return Err(Error::Shape(format!(
                    "expected a {n}x{n} cost matrix for {} and {} points, got {}x{}",
                    pred.len(),
                    truth.len(),
                    cost.nrows(),
                    cost.ncols()
                )));
            }
            Some(cost) if cost.iter().any(|c| !(c.is_finite() && *c >= 0.)) => {
                return Err(Error::Value("cost entries must be finite and non-negative".into()));
            }
            Some(cost) => cost.clone(),
        };
        let ref mass = Array1::from_elem(n, 1. / n as Mass);
        log::debug!("matching {} against {} points ({} padded)", pred.len(), truth.len(), pred.len().abs_diff(truth.len()));
        let plan = emd(mass.view(), mass.view(), matrix.view())?;
        Ok((matrix, plan))
    }
    /// Common size of the padded sets.
    fn size(pred: &[Point], truth: &[Point]) -> Result<usize> {
        match pred.len().max(truth.len()) {
            0 => Err(Error::Value("both point sets are empty".into())),
            n => Ok(n),
        }
    }
    fn pad(&self, points: &[Point], n: usize) -> Vec<Point> {
        points
            .iter()
            .copied()
            .chain(std::iter::repeat(self.import))
            .take(n)
            .collect()
    }
}
