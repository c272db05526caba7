use super::*;
use crate::Cost;
use crate::Error;
use crate::Mass;
use crate::Result;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;

/// Partial optimal transport over a fixed cost matrix.
///
/// The cost matrix is extended once, at construction, with a sink row and
/// column priced at the waste penalty. Every evaluation pads the lighter
/// distribution through the sink so both sides carry equal mass, then hands
/// the balanced problem to the backend chosen by [`Options::solver`].
///
/// Immutable after construction, so one instance can be shared across
/// threads and evaluated concurrently.
pub struct PartialTransport {
    backend: Box<dyn Backend>,
    penalty: Cost,
    rows: usize,
    cols: usize,
}

impl PartialTransport {
    pub fn new(cost: &Array2<Cost>, options: Options) -> Result<Self> {
        let (rows, cols) = cost.dim();
        if rows == 0 || cols == 0 {
            return Err(Error::Value(format!("cost matrix must be non-empty, got {rows}x{cols}")));
        }
        if cost.iter().any(|c| !(c.is_finite() && *c >= 0.)) {
            return Err(Error::Value("cost entries must be finite and non-negative".into()));
        }
        options.check()?;
        let penalty = options.penalty.resolve(cost);
        let matrix = extend(cost, penalty, options.normalize);
        log::debug!(
            "extended {rows}x{cols} cost matrix with waste penalty {penalty} ({:?} solver)",
            options.solver
        );
        let backend: Box<dyn Backend> = match options.solver {
            Solver::Exact => Box::new(Exact::new(matrix, options.mode)),
            Solver::Regularized(regularization) => {
                Box::new(Regularized::new(matrix, regularization, options.spatiotemporal))
            }
        };
        Ok(Self {
            backend,
            penalty,
            rows,
            cols,
        })
    }
    /// Waste penalty before normalization.
    pub fn penalty(&self) -> Cost {
        self.penalty
    }
    /// Sink-extended, possibly normalized, cost matrix.
    pub fn matrix(&self) -> &Array2<Cost> {
        self.backend.matrix()
    }
    /// Transport cost of every row pair of a batch.
    ///
    /// Gradients, when the backend provides them, are taken with respect to
    /// the inputs as given, sink padding included.
    pub fn evaluate(&self, mu: ArrayView2<Mass>, nu: ArrayView2<Mass>) -> Result<Loss> {
        self.check(mu, nu)?;
        let balances = mu
            .rows()
            .into_iter()
            .zip(nu.rows())
            .map(Balance::from)
            .collect::<Vec<_>>();
        let mut extended_mu = Array2::zeros((mu.nrows(), self.rows + 1));
        let mut extended_nu = Array2::zeros((nu.nrows(), self.cols + 1));
        for (i, balance) in balances.iter().enumerate() {
            let (a, b) = balance.extend(mu.row(i), nu.row(i));
            extended_mu.row_mut(i).assign(&a);
            extended_nu.row_mut(i).assign(&b);
        }
        let loss = self.backend.evaluate(extended_mu.view(), extended_nu.view())?;
        let gradient = loss.gradient().map(|gradient| {
            let mut dmu = Array2::zeros(mu.dim());
            let mut dnu = Array2::zeros(nu.dim());
            for (i, balance) in balances.iter().enumerate() {
                let (a, b) = balance.pullback(gradient.mu.row(i), gradient.nu.row(i));
                dmu.row_mut(i).assign(&a);
                dnu.row_mut(i).assign(&b);
            }
            Gradient { mu: dmu, nu: dnu }
        });
        Ok(Loss::new(loss.values().clone(), gradient))
    }
    /// Transport cost of a single pair.
    pub fn cost(&self, mu: &[Mass], nu: &[Mass]) -> Result<Cost> {
        let mu = ArrayView1::from(mu).insert_axis(Axis(0));
        let nu = ArrayView1::from(nu).insert_axis(Axis(0));
        Ok(self.evaluate(mu, nu)?.value())
    }
    /// Transport plan of a single pair on the sink-extended support.
    ///
    /// Only the exact backend materializes plans.
    pub fn plan(&self, mu: &[Mass], nu: &[Mass]) -> Result<Plan> {
        let mu = ArrayView1::from(mu);
        let nu = ArrayView1::from(nu);
        self.check(mu.insert_axis(Axis(0)), nu.insert_axis(Axis(0)))?;
        let (ref a, ref b) = Balance::from((mu, nu)).extend(mu, nu);
        self.backend.plan(a.view(), b.view())
    }
    fn check(&self, mu: ArrayView2<Mass>, nu: ArrayView2<Mass>) -> Result<()> {
        if mu.nrows() != nu.nrows() {
            return Err(Error::Shape(format!(
                "batch sizes differ: {} predicted against {} true",
                mu.nrows(),
                nu.nrows()
            )));
        }
        if mu.ncols() != self.rows || nu.ncols() != self.cols {
            return Err(Error::Shape(format!(
                "distributions of length {} and {} against a {}x{} cost matrix",
                mu.ncols(),
                nu.ncols(),
                self.rows,
                self.cols
            )));
        }
        Ok(())
    }
}
