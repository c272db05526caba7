use super::*;
use crate::Cost;
use crate::Error;
use crate::Mass;
use crate::Result;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Zip;

/// Entropic, optionally unbalanced, optimal transport via Sinkhorn iteration.
///
/// Works in the log domain on dual potentials, with symmetric (averaged)
/// updates and ε-scaling: the temperature starts at the cost diameter and
/// anneals geometrically down to `blur^p`, then iterates until the
/// potentials settle. With a finite reach, marginals are only softly
/// enforced and every update is damped by `1 / (1 + ε/ρ)`.
///
/// # Debiasing
///
/// On a square cost matrix both distributions share one support, so the
/// self-transport problems are solved alongside and subtracted:
///
/// `S(μ, ν) = OT(μ, ν) − ½ OT(μ, μ) − ½ OT(ν, ν)`
///
/// The cost need not be symmetric (space-time matrices are not), so every
/// self-transport problem carries its own pair of potentials. `S(μ, μ)` is
/// exactly zero. Rectangular problems return the raw regularized cost.
/// Either value may be negative in the unbalanced case; it is a smooth
/// surrogate, not the exact transport cost.
///
/// # Gradients
///
/// Read off the converged potentials by the envelope theorem. In the
/// unbalanced case the value is weighted by `ρ + ε/2` and its gradient by
/// `ρ + ε`.
pub struct Sinkhorn<'a> {
    cost: ArrayView2<'a, Cost>,
    mu: ArrayView1<'a, Mass>,
    nu: ArrayView1<'a, Mass>,
    regularization: Regularization,
    spatiotemporal: bool,
    /// Potentials of OT(μ, ν).
    pair: Dual,
    /// Potentials of OT(μ, μ) and OT(ν, ν), when debiasing.
    selves: Option<(Dual, Dual)>,
    /// Temperature the potentials were last updated at.
    epsilon: Cost,
}

/// Dual potentials of one transport problem.
struct Dual {
    /// Potential on the source (row) support.
    lhs: Array1<Cost>,
    /// Potential on the target (column) support.
    rhs: Array1<Cost>,
}

impl<'a> TryFrom<(ArrayView1<'a, Mass>, ArrayView1<'a, Mass>, ArrayView2<'a, Cost>)> for Sinkhorn<'a> {
    type Error = Error;
    fn try_from(
        (mu, nu, cost): (ArrayView1<'a, Mass>, ArrayView1<'a, Mass>, ArrayView2<'a, Cost>),
    ) -> Result<Self> {
        let (n, m) = cost.dim();
        if mu.len() != n || nu.len() != m {
            return Err(Error::Shape(format!(
                "masses of length {} and {} against a {n}x{m} cost matrix",
                mu.len(),
                nu.len()
            )));
        }
        if mu.iter().chain(nu.iter()).any(|x| !(x.is_finite() && *x >= 0.)) {
            return Err(Error::Value("masses must be finite and non-negative".into()));
        }
        if mu.sum() <= 0. || nu.sum() <= 0. {
            return Err(Error::Value("sinkhorn needs positive total mass on both sides".into()));
        }
        let regularization = Regularization::default();
        Ok(Self {
            cost,
            mu,
            nu,
            regularization,
            spatiotemporal: false,
            pair: Dual {
                lhs: Array1::zeros(n),
                rhs: Array1::zeros(m),
            },
            selves: None,
            epsilon: regularization.epsilon(),
        })
    }
}

impl Sinkhorn<'_> {
    pub fn regularization(mut self, regularization: Regularization) -> Self {
        self.regularization = regularization;
        self.epsilon = regularization.epsilon();
        self
    }
    pub fn spatiotemporal(mut self, spatiotemporal: bool) -> Self {
        self.spatiotemporal = spatiotemporal;
        self
    }
    /// Debiased divergence (square costs) or regularized cost (rectangular).
    pub fn divergence(&self) -> Cost {
        match self.regularization.rho() {
            None => {
                let (pair, selves) = self.scores(|f| f);
                pair - selves.unwrap_or(0.)
            }
            Some(rho) => {
                let weight = rho + self.epsilon / 2.;
                let (pair, selves) = self.scores(|f| (-f / rho).exp());
                match selves {
                    Some(selves) => weight * (selves - pair),
                    None => weight * (self.mu.sum() + self.nu.sum() - pair),
                }
            }
        }
    }
    /// Gradient of [`divergence`](Self::divergence) with respect to μ and ν.
    ///
    /// Balanced gradients are defined up to an additive constant.
    pub fn gradient(&self) -> (Array1<Mass>, Array1<Mass>) {
        let eps = self.epsilon;
        match self.regularization.rho() {
            None => self
                .excess(|f| f)
                .unwrap_or_else(|| (self.pair.lhs.clone(), self.pair.rhs.clone())),
            Some(rho) => {
                let weight = rho + eps;
                match self.excess(|f| (-f / rho).exp()) {
                    Some((dmu, dnu)) => (dmu * -weight, dnu * -weight),
                    None => {
                        let side = |p: &Array1<Cost>| p.mapv(|f| weight * (1. - (-f / rho).exp()) - eps / 2.);
                        (side(&self.pair.lhs), side(&self.pair.rhs))
                    }
                }
            }
        }
    }
    /// Temperatures visited during annealing, ending at `blur^p`.
    pub fn epsilons(&self) -> Vec<Cost> {
        let target = self.regularization.epsilon();
        let start = self.cost.iter().copied().fold(0., Cost::max);
        let ratio = match self.spatiotemporal {
            true => self.regularization.scaling,
            false => self.regularization.scaling.powi(crate::SINKHORN_EXPONENT),
        };
        std::iter::successors(Some(start), |e| Some(e * ratio))
            .take_while(|&e| e > target)
            .chain(std::iter::once(target))
            .collect()
    }
    /// `⟨μ, φ(f)⟩ + ⟨ν, φ(g)⟩` of the pair and, when debiasing, the mean of
    /// the same score over both self-transport problems.
    fn scores(&self, phi: impl Fn(Cost) -> Cost + Copy) -> (Cost, Option<Cost>) {
        let score = |mass: &ArrayView1<Mass>, potential: &Array1<Cost>| mass.dot(&potential.mapv(phi));
        let pair = score(&self.mu, &self.pair.lhs) + score(&self.nu, &self.pair.rhs);
        let selves = self.selves.as_ref().map(|(aa, bb)| {
            let a = score(&self.mu, &aa.lhs) + score(&self.mu, &aa.rhs);
            let b = score(&self.nu, &bb.lhs) + score(&self.nu, &bb.rhs);
            (a + b) / 2.
        });
        (pair, selves)
    }
    /// `φ(f) − ½ (φ(f_aa) + φ(g_aa))` and its ν counterpart, when debiasing.
    fn excess(&self, phi: impl Fn(Cost) -> Cost + Copy) -> Option<(Array1<Cost>, Array1<Cost>)> {
        self.selves.as_ref().map(|(aa, bb)| {
            let side = |p: &Array1<Cost>, s: &Dual| {
                Zip::from(p)
                    .and(&s.lhs)
                    .and(&s.rhs)
                    .map_collect(|&p, &f, &g| phi(p) - (phi(f) + phi(g)) / 2.)
            };
            (side(&self.pair.lhs, aa), side(&self.pair.rhs, bb))
        })
    }
    /// Runs ε-scaling, then iterates at the final temperature.
    fn sinkhorn(&mut self) {
        let ref la = self.mu.mapv(Mass::ln);
        let ref lb = self.nu.mapv(Mass::ln);
        let schedule = self.epsilons();
        let eps = schedule[0];
        self.pair = self.initial(eps, la, lb);
        if self.is_square() {
            self.selves = Some((self.initial(eps, la, la), self.initial(eps, lb, lb)));
        }
        for eps in schedule.iter().copied() {
            self.step(eps, la, lb);
        }
        let eps = self.regularization.epsilon();
        for t in 0..self.iterations() {
            if self.step(eps, la, lb) < self.tolerance() {
                log::trace!("sinkhorn settled after {} iterations at ε = {eps}", t + 1);
                break;
            }
            if t + 1 == self.iterations() {
                log::warn!("sinkhorn potentials still moving after {} iterations", t + 1);
            }
        }
        self.extrapolate(eps, la, lb);
    }
    /// One averaged update of all problems. Returns the largest change.
    fn step(&mut self, eps: Cost, la: &Array1<Cost>, lb: &Array1<Cost>) -> Cost {
        let next = self.update(eps, &self.pair, la, lb);
        let mut delta = Self::average(&mut self.pair, next);
        if let Some((mut aa, mut bb)) = self.selves.take() {
            let next_aa = self.update(eps, &aa, la, la);
            let next_bb = self.update(eps, &bb, lb, lb);
            delta = delta.max(Self::average(&mut aa, next_aa));
            delta = delta.max(Self::average(&mut bb, next_bb));
            self.selves = Some((aa, bb));
        }
        self.epsilon = eps;
        delta
    }
    /// Final unaveraged update, so potentials satisfy the fixed point.
    fn extrapolate(&mut self, eps: Cost, la: &Array1<Cost>, lb: &Array1<Cost>) {
        self.pair = self.settle(eps, &self.pair, la, lb);
        if let Some((aa, bb)) = self.selves.take() {
            self.selves = Some((self.settle(eps, &aa, la, la), self.settle(eps, &bb, lb, lb)));
        }
        self.epsilon = eps;
    }
    /// Potentials at the first temperature, from zero.
    /// `la` and `lb` are the log weights of the source and the target.
    fn initial(&self, eps: Cost, la: &Array1<Cost>, lb: &Array1<Cost>) -> Dual {
        let damp = self.damping(eps);
        Dual {
            lhs: self.rows(eps, lb) * damp,
            rhs: self.cols(eps, la) * damp,
        }
    }
    /// Simultaneous update of both potentials of one problem.
    fn update(&self, eps: Cost, dual: &Dual, la: &Array1<Cost>, lb: &Array1<Cost>) -> Dual {
        let damp = self.damping(eps);
        Dual {
            lhs: self.rows(eps, &(lb + &(&dual.rhs / eps))) * damp,
            rhs: self.cols(eps, &(la + &(&dual.lhs / eps))) * damp,
        }
    }
    /// Target potential first, then the source potential against it, so
    /// the source marginal of the plan holds exactly.
    fn settle(&self, eps: Cost, dual: &Dual, la: &Array1<Cost>, lb: &Array1<Cost>) -> Dual {
        let damp = self.damping(eps);
        let rhs = self.cols(eps, &(la + &(&dual.lhs / eps))) * damp;
        let lhs = self.rows(eps, &(lb + &(&rhs / eps))) * damp;
        Dual { lhs, rhs }
    }
    /// Averages `next` into `prev`, returning the largest change.
    fn average(prev: &mut Dual, next: Dual) -> Cost {
        Self::delta(&mut prev.lhs, next.lhs).max(Self::delta(&mut prev.rhs, next.rhs))
    }
    fn delta(prev: &mut Array1<Cost>, next: Array1<Cost>) -> Cost {
        let mut delta: Cost = 0.;
        Zip::from(prev).and(&next).for_each(|p, &n| {
            let avg = (*p + n) / 2.;
            delta = delta.max((avg - *p).abs());
            *p = avg;
        });
        delta
    }
    /// Soft-min over columns: `−ε log Σ_y exp(h_y − C_xy / ε)` for every x.
    fn rows(&self, eps: Cost, h: &Array1<Cost>) -> Array1<Cost> {
        self.cost
            .rows()
            .into_iter()
            .map(|row| -eps * Self::logsumexp(row.iter().zip(h.iter()).map(|(c, h)| h - c / eps)))
            .collect()
    }
    /// Soft-min over rows: `−ε log Σ_x exp(h_x − C_xy / ε)` for every y.
    fn cols(&self, eps: Cost, h: &Array1<Cost>) -> Array1<Cost> {
        self.cost
            .columns()
            .into_iter()
            .map(|col| -eps * Self::logsumexp(col.iter().zip(h.iter()).map(|(c, h)| h - c / eps)))
            .collect()
    }
    /// Max-stabilized log-sum-exp; −∞ terms (zero mass) drop out.
    fn logsumexp(terms: impl Iterator<Item = Cost> + Clone) -> Cost {
        let max = terms.clone().fold(Cost::NEG_INFINITY, Cost::max);
        if max == Cost::NEG_INFINITY {
            return max;
        }
        max + terms.map(|x| (x - max).exp()).sum::<Cost>().ln()
    }
    /// Marginal relaxation factor `1 / (1 + ε/ρ)`; 1 when balanced.
    fn damping(&self, eps: Cost) -> Cost {
        match self.regularization.rho() {
            Some(rho) => 1. / (1. + eps / rho),
            None => 1.,
        }
    }
    fn is_square(&self) -> bool {
        self.cost.nrows() == self.cost.ncols()
    }
    /// Maximum iteration count at the final temperature.
    const fn iterations(&self) -> usize {
        crate::SINKHORN_ITERATIONS
    }
    /// Convergence tolerance for early stopping.
    const fn tolerance(&self) -> Cost {
        crate::SINKHORN_TOLERANCE
    }
}

impl Coupling for Sinkhorn<'_> {
    fn minimize(mut self) -> Result<Self> {
        self.sinkhorn();
        Ok(self)
    }
    /// Entropic plan `μ_x ν_y exp((f_x + g_y − C_xy) / ε)`.
    fn flow(&self, x: usize, y: usize) -> Mass {
        self.mu[x] * self.nu[y] * ((self.pair.lhs[x] + self.pair.rhs[y] - self.cost[[x, y]]) / self.epsilon).exp()
    }
    fn cost(&self) -> Cost {
        let (n, m) = self.cost.dim();
        (0..n)
            .flat_map(|x| (0..m).map(move |y| (x, y)))
            .map(|(x, y)| self.flow(x, y) * self.cost[[x, y]])
            .inspect(|x| debug_assert!(x.is_finite()))
            .sum::<Cost>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use ndarray::array;

    fn cost() -> Array2<Cost> {
        array![
            [0.0, 0.9166617229649182, 0.8011636143804466, 1.0],
            [0.9166617229649182, 0.0, 0.2901671214052399, 0.5131642591866252],
            [0.8011636143804466, 0.2901671214052399, 0.0, 0.28166962442054133],
            [1.0, 0.5131642591866252, 0.28166962442054133, 0.0],
        ]
    }

    fn solve<'a>(
        mu: &'a Array1<Mass>,
        nu: &'a Array1<Mass>,
        cost: &'a Array2<Cost>,
        regularization: Regularization,
    ) -> Sinkhorn<'a> {
        Sinkhorn::try_from((mu.view(), nu.view(), cost.view()))
            .unwrap()
            .regularization(regularization)
            .minimize()
            .unwrap()
    }

    #[test]
    fn is_sinkhorn_divergence_zero() {
        let ref cost = cost();
        let ref mass = array![1., 2., 3., 4.];
        for regularization in [Regularization::default(), Regularization::balanced(0.1)] {
            let sinkhorn = solve(mass, mass, cost, regularization);
            assert!(sinkhorn.divergence() == 0.);
        }
    }

    #[test]
    fn is_sinkhorn_divergence_positive() {
        let ref cost = cost();
        let ref mu = array![0.1, 0.2, 0.3, 0.4];
        let ref nu = array![0.4, 0.3, 0.2, 0.1];
        let d = solve(mu, nu, cost, Regularization::balanced(0.1)).divergence();
        assert!(d > 0., "{d}");
    }

    #[test]
    fn is_sinkhorn_balanced_symmetric() {
        let ref cost = cost();
        let ref mu = array![0.1, 0.2, 0.3, 0.4];
        let ref nu = array![0.25, 0.25, 0.1, 0.4];
        let d12 = solve(mu, nu, cost, Regularization::balanced(0.1)).divergence();
        let d21 = solve(nu, mu, cost, Regularization::balanced(0.1)).divergence();
        assert_relative_eq!(d12, d21, epsilon = 1e-6);
    }

    #[test]
    fn is_sinkhorn_plan_balanced() {
        let ref cost = cost();
        let ref mu = array![0.1, 0.2, 0.3, 0.4];
        let ref nu = array![0.1, 0.3, 0.2, 0.4];
        let sinkhorn = solve(mu, nu, cost, Regularization::balanced(0.3));
        for x in 0..4 {
            let row = (0..4).map(|y| sinkhorn.flow(x, y)).sum::<Mass>();
            assert_relative_eq!(row, mu[x], epsilon = 1e-6);
        }
    }

    #[test]
    fn is_sinkhorn_cost_approaching_exact() {
        let ref cost = cost();
        let ref mu = array![0.1, 0.2, 0.3, 0.4];
        let ref nu = array![0.1, 0.3, 0.2, 0.4];
        let exact = crate::emd(mu.view(), nu.view(), cost.view()).unwrap().cost(cost.view());
        let coarse = solve(mu, nu, cost, Regularization::balanced(1.)).cost();
        let fine = solve(mu, nu, cost, Regularization::balanced(0.2)).cost();
        assert!((fine - exact).abs() < (coarse - exact).abs());
        assert!((fine - exact).abs() < 0.02, "{fine} {exact}");
    }

    #[test]
    fn is_sinkhorn_gradient_finite_difference() {
        const H: Mass = 1e-4;
        let ref cost = cost();
        let ref mu = array![0.1, 0.2, 0.3, 0.4];
        let ref nu = array![0.3, 0.3, 0.2, 0.2];
        let regularization = Regularization::balanced(0.3);
        let (dmu, _) = solve(mu, nu, cost, regularization).gradient();
        // balanced potentials are defined up to a constant: compare a
        // mass-preserving direction
        let ref up = array![0.1 + H, 0.2 - H, 0.3, 0.4];
        let ref dn = array![0.1 - H, 0.2 + H, 0.3, 0.4];
        let numeric = (solve(up, nu, cost, regularization).divergence()
            - solve(dn, nu, cost, regularization).divergence())
            / (2. * H);
        assert_relative_eq!(numeric, dmu[0] - dmu[1], epsilon = 1e-3);
    }

    #[test]
    fn is_sinkhorn_divergence_zero_asymmetric() {
        // waiting is cheaper than travelling back in time
        let ref cost = array![[0.0, 0.2, 0.9], [0.7, 0.0, 0.3], [1.5, 0.8, 0.0]];
        let ref mass = array![0.5, 2., 1.25];
        for regularization in [Regularization::default(), Regularization::balanced(0.1)] {
            let sinkhorn = solve(mass, mass, cost, regularization);
            assert!(sinkhorn.divergence() == 0.);
        }
    }

    #[test]
    fn is_sinkhorn_unbalanced_gradient_finite_difference() {
        const H: Mass = 1e-4;
        let ref cost = cost();
        let ref nu = array![0.3, 0.3, 0.2, 0.2];
        let ref mu = array![0.1, 0.2, 0.3, 0.4];
        let regularization = Regularization::default();
        let (dmu, dnu) = solve(mu, nu, cost, regularization).gradient();
        for i in 0..4 {
            let mut up = mu.clone();
            let mut dn = mu.clone();
            up[i] += H;
            dn[i] -= H;
            let numeric = (solve(&up, nu, cost, regularization).divergence()
                - solve(&dn, nu, cost, regularization).divergence())
                / (2. * H);
            assert_relative_eq!(numeric, dmu[i], epsilon = 1e-6, max_relative = 1e-2);
        }
        for i in 0..4 {
            let mut up = nu.clone();
            let mut dn = nu.clone();
            up[i] += H;
            dn[i] -= H;
            let numeric = (solve(mu, &up, cost, regularization).divergence()
                - solve(mu, &dn, cost, regularization).divergence())
                / (2. * H);
            assert_relative_eq!(numeric, dnu[i], epsilon = 1e-6, max_relative = 1e-2);
        }
    }

    #[test]
    fn is_rectangular_gradient_finite_difference() {
        const H: Mass = 1e-4;
        let ref cost = array![[0., 1., 2.], [1., 0., 1.]];
        let ref mu = array![0.4, 0.6];
        let ref nu = array![0.3, 0.3, 0.4];
        let regularization = Regularization::default();
        let (dmu, _) = solve(mu, nu, cost, regularization).gradient();
        for i in 0..2 {
            let mut up = mu.clone();
            let mut dn = mu.clone();
            up[i] += H;
            dn[i] -= H;
            let numeric = (solve(&up, nu, cost, regularization).divergence()
                - solve(&dn, nu, cost, regularization).divergence())
                / (2. * H);
            assert_relative_eq!(numeric, dmu[i], epsilon = 1e-5, max_relative = 1e-2);
        }
    }

    #[test]
    fn is_schedule_annealing_to_blur() {
        let ref cost = cost();
        let ref mass = array![1., 1., 1., 1.];
        let sinkhorn = Sinkhorn::try_from((mass.view(), mass.view(), cost.view())).unwrap();
        let schedule = sinkhorn.epsilons();
        assert!(schedule[0] == 1.);
        assert!(*schedule.last().unwrap() == 0.1f64.powi(2));
        assert!(schedule.windows(2).all(|w| w[0] > w[1]));
        let finer = sinkhorn.spatiotemporal(true).epsilons();
        assert!(finer.len() > schedule.len());
    }

    #[test]
    fn is_rectangular_cost_undebiased() {
        let cost = array![[0., 1., 2.], [1., 0., 1.]];
        let mu = array![1., 1.];
        let nu = array![0.5, 1., 0.5];
        let sinkhorn = Sinkhorn::try_from((mu.view(), nu.view(), cost.view()))
            .unwrap()
            .minimize()
            .unwrap();
        assert!(sinkhorn.divergence().is_finite());
    }

    #[test]
    fn is_zero_mass_rejected() {
        let ref cost = cost();
        let ref zero = array![0., 0., 0., 0.];
        let ref mass = array![1., 1., 1., 1.];
        let result = Sinkhorn::try_from((zero.view(), mass.view(), cost.view()));
        assert!(matches!(result, Err(Error::Value(_))));
    }
}
