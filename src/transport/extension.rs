use crate::Cost;
use crate::Mass;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::s;

/// Appends the sink row and column to a cost matrix.
///
/// Every sink entry costs `penalty`, except the sink-to-sink corner which is
/// free. With `normalize` the result is divided by its largest entry; an
/// all-zero matrix is returned unscaled.
pub fn extend(cost: &Array2<Cost>, penalty: Cost, normalize: bool) -> Array2<Cost> {
    let (n, m) = cost.dim();
    let mut extended = Array2::from_elem((n + 1, m + 1), penalty);
    extended.slice_mut(s![..n, ..m]).assign(cost);
    extended[[n, m]] = 0.;
    if normalize {
        let max = extended.iter().copied().fold(0., Cost::max);
        if max > 0. {
            extended.mapv_inplace(|c| c / max);
        }
    }
    extended
}

/// Mass imbalance between one predicted and one true distribution.
///
/// The lighter side receives the difference in its sink slot, so both
/// extended distributions carry `max(Σ predicted, Σ true)`. Also carries the
/// chain rule back from gradients on the extended support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance {
    diff: Mass,
}

impl From<(ArrayView1<'_, Mass>, ArrayView1<'_, Mass>)> for Balance {
    fn from((mu, nu): (ArrayView1<'_, Mass>, ArrayView1<'_, Mass>)) -> Self {
        Self {
            diff: mu.sum() - nu.sum(),
        }
    }
}

impl Balance {
    /// Σ predicted − Σ true.
    pub fn diff(&self) -> Mass {
        self.diff
    }
    /// Mass the sink supplies to the predicted side.
    pub fn import(&self) -> Mass {
        Mass::max(0., -self.diff)
    }
    /// Mass the sink absorbs from the predicted side.
    pub fn export(&self) -> Mass {
        Mass::max(0., self.diff)
    }
    /// Both distributions with their sink slots appended.
    pub fn extend(&self, mu: ArrayView1<Mass>, nu: ArrayView1<Mass>) -> (Array1<Mass>, Array1<Mass>) {
        let mu = mu.iter().copied().chain(std::iter::once(self.import())).collect();
        let nu = nu.iter().copied().chain(std::iter::once(self.export())).collect();
        (mu, nu)
    }
    /// Maps gradients on the extended support back to the original inputs.
    ///
    /// The import slot is `relu(Σν − Σμ)` and the export slot `relu(Σμ − Σν)`,
    /// so each sink gradient flows to every input entry with sign ±1 on the
    /// active side of the imbalance.
    pub fn pullback(&self, dmu: ArrayView1<Mass>, dnu: ArrayView1<Mass>) -> (Array1<Mass>, Array1<Mass>) {
        let (n, m) = (dmu.len() - 1, dnu.len() - 1);
        let sink = match self.diff {
            d if d < 0. => dmu[n],
            d if d > 0. => -dnu[m],
            _ => 0.,
        };
        let mu = dmu.slice(s![..n]).mapv(|g| g - sink);
        let nu = dnu.slice(s![..m]).mapv(|g| g + sink);
        (mu, nu)
    }
}
