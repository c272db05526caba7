use super::*;
use crate::Cost;
use crate::Error;
use crate::Mass;
use crate::Result;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

/// Exact discrete optimal transport between two equal-mass distributions.
///
/// Solves the transportation linear program as a min-cost flow on the dense
/// bipartite graph `source → (x) → (y) → sink`, augmenting along shortest
/// paths of the residual graph until every unit of mass is routed.
///
/// # Algorithm
///
/// 1. Keep node potentials so reduced costs stay non-negative
/// 2. Dijkstra from the source over reduced costs (dense, O(V²))
/// 3. Push the bottleneck mass along the shortest augmenting path
/// 4. Repeat until supply or demand is exhausted
///
/// Each augmentation saturates an edge of the path, so the loop terminates
/// after a bounded number of steps; the result is deterministic for a fixed
/// input and optimal up to floating-point rounding.
pub struct Network<'a> {
    cost: ArrayView2<'a, Cost>,
    mu: ArrayView1<'a, Mass>,
    nu: ArrayView1<'a, Mass>,
    flow: Array2<Mass>,
}

/// Residual graph search result: distance and predecessor per node.
struct Search {
    dist: Vec<Cost>,
    prev: Vec<usize>,
}

impl<'a> TryFrom<(ArrayView1<'a, Mass>, ArrayView1<'a, Mass>, ArrayView2<'a, Cost>)> for Network<'a> {
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
        let (a, b) = (mu.sum(), nu.sum());
        if (a - b).abs() > 1e-9 * a.max(b).max(1.) {
            return Err(Error::Value(format!("exact transport needs equal totals, got {a} and {b}")));
        }
        Ok(Self {
            cost,
            mu,
            nu,
            flow: Array2::zeros((n, m)),
        })
    }
}

impl Network<'_> {
    /// Consumes the solved network into its transport plan.
    pub fn plan(self) -> Plan {
        Plan::from(self.flow)
    }
    fn n(&self) -> usize {
        self.cost.nrows()
    }
    fn m(&self) -> usize {
        self.cost.ncols()
    }
    /// Super source node index.
    fn s(&self) -> usize {
        self.n() + self.m()
    }
    /// Super sink node index.
    fn t(&self) -> usize {
        self.n() + self.m() + 1
    }
    /// Upper bound on augmentations before giving up.
    fn iterations(&self) -> usize {
        4 * (self.n() + self.m() + 2).pow(2)
    }
    /// Successive shortest path augmentation.
    fn route(&mut self) -> Result<()> {
        let total = Mass::min(self.mu.sum(), self.nu.sum());
        let tolerance = crate::FLOW_TOLERANCE * total;
        let mut supply = self.mu.to_owned();
        let mut demand = self.nu.to_owned();
        let mut potential = vec![0.; self.t() + 1];
        let mut iterations = 0;
        while supply.iter().any(|&x| x > tolerance) && demand.iter().any(|&y| y > tolerance) {
            if iterations >= self.iterations() {
                return Err(Error::Convergence {
                    iterations,
                    residual: supply.sum(),
                });
            }
            iterations += 1;
            let Search { dist, prev } = self.dijkstra(&supply, &demand, &potential, tolerance);
            let reach = dist[self.t()];
            if !reach.is_finite() {
                return Err(Error::Convergence {
                    iterations,
                    residual: supply.sum(),
                });
            }
            potential
                .iter_mut()
                .zip(dist.iter())
                .for_each(|(p, d)| *p += Cost::min(*d, reach));
            self.augment(&prev, &mut supply, &mut demand);
        }
        log::trace!("routed {total} mass in {iterations} augmentations");
        Ok(())
    }
    /// Dense Dijkstra over reduced costs of the residual graph.
    /// The super sink is never expanded.
    fn dijkstra(&self, supply: &Array1<Mass>, demand: &Array1<Mass>, potential: &[Cost], tolerance: Mass) -> Search {
        let (n, m, s, t) = (self.n(), self.m(), self.s(), self.t());
        let mut dist = vec![Cost::INFINITY; t + 1];
        let mut prev = vec![usize::MAX; t + 1];
        let mut done = vec![false; t + 1];
        dist[s] = 0.;
        while let Some(u) = (0..=t)
            .filter(|&u| !done[u] && dist[u].is_finite())
            .min_by(|&a, &b| dist[a].total_cmp(&dist[b]))
        {
            done[u] = true;
            if u == t {
                break;
            }
            let mut relax = |w: usize, edge: Cost| {
                let reduced = (edge + potential[u] - potential[w]).max(0.);
                if !done[w] && dist[u] + reduced < dist[w] {
                    dist[w] = dist[u] + reduced;
                    prev[w] = u;
                }
            };
            if u == s {
                (0..n).filter(|&x| supply[x] > tolerance).for_each(|x| relax(x, 0.));
            } else if u < n {
                (0..m).for_each(|y| relax(n + y, self.cost[[u, y]]));
            } else {
                let y = u - n;
                (0..n)
                    .filter(|&x| self.flow[[x, y]] > 0.)
                    .for_each(|x| relax(x, -self.cost[[x, y]]));
                if demand[y] > tolerance {
                    relax(t, 0.);
                }
            }
        }
        Search { dist, prev }
    }
    /// Pushes the bottleneck mass along the path ending at the super sink.
    fn augment(&mut self, prev: &[usize], supply: &mut Array1<Mass>, demand: &mut Array1<Mass>) {
        let (n, s, t) = (self.n(), self.s(), self.t());
        let mut path = vec![t];
        let mut u = t;
        while u != s {
            u = prev[u];
            path.push(u);
        }
        path.reverse();
        let first = path[1];
        let last = path[path.len() - 2] - n;
        let delta = path[1..path.len() - 1]
            .windows(2)
            .filter(|w| w[0] >= n)
            .map(|w| self.flow[[w[1], w[0] - n]])
            .fold(Mass::min(supply[first], demand[last]), Mass::min);
        path[1..path.len() - 1].windows(2).for_each(|w| {
            if w[0] < n {
                self.flow[[w[0], w[1] - n]] += delta;
            } else {
                self.flow[[w[1], w[0] - n]] -= delta;
            }
        });
        supply[first] -= delta;
        demand[last] -= delta;
    }
}

impl Coupling for Network<'_> {
    fn minimize(mut self) -> Result<Self> {
        self.route()?;
        Ok(self)
    }
    fn flow(&self, x: usize, y: usize) -> Mass {
        self.flow[[x, y]]
    }
    fn cost(&self) -> Cost {
        (&self.flow * &self.cost).sum()
    }
}

/// Exact transport plan between two equal-mass distributions.
pub fn emd<'a>(mu: ArrayView1<'a, Mass>, nu: ArrayView1<'a, Mass>, cost: ArrayView2<'a, Cost>) -> Result<Plan> {
    Ok(Network::try_from((mu, nu, cost))?.minimize()?.plan())
}
