use crate::Cost;
use crate::Mass;
use crate::Result;

/// A transport plan (coupling) between two discrete mass distributions.
///
/// Rows index the source distribution, columns the target distribution, and
/// the ground cost is a dense matrix over both. The transport cost is the
/// total ground cost under the plan.
///
/// # Algorithm Contract
///
/// Implementations must ensure that after [`minimize`](Coupling::minimize)
/// succeeds, [`cost`](Coupling::cost) returns the cost of the optimized plan.
///
/// - [`Network`](crate::Network): exact, via successive shortest paths
/// - [`Sinkhorn`](crate::Sinkhorn): entropic, via dual potentials
pub trait Coupling: Sized {
    /// Optimizes the coupling to minimize total transport cost.
    fn minimize(self) -> Result<Self>;
    /// Returns the mass transported from source `x` to target `y`.
    fn flow(&self, x: usize, y: usize) -> Mass;
    /// Returns the total transport cost of this coupling.
    ///
    /// This is the sum of `flow(x, y) * cost(x, y)` over all pairs.
    fn cost(&self) -> Cost;
}
