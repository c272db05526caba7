use crate::Cost;
use crate::Mass;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::s;

/// Materialized transport plan.
///
/// Entry `(x, y)` is the mass moved from source `x` to target `y`. Plans
/// produced by [`PartialTransport`](crate::PartialTransport) live on the
/// sink-extended support: the last row holds mass imported from the sink,
/// the last column mass exported to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan(Array2<Mass>);

impl From<Array2<Mass>> for Plan {
    fn from(flow: Array2<Mass>) -> Self {
        Self(flow)
    }
}

impl From<Plan> for Array2<Mass> {
    fn from(plan: Plan) -> Self {
        plan.0
    }
}

impl Plan {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self(Array2::zeros((rows, cols)))
    }
    pub fn matrix(&self) -> &Array2<Mass> {
        &self.0
    }
    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }
    /// Total cost of the plan under a ground cost of the same shape.
    pub fn cost(&self, cost: ArrayView2<Cost>) -> Cost {
        debug_assert!(self.0.dim() == cost.dim(), "plan and cost shapes differ");
        (&self.0 * &cost).sum()
    }
    /// Total transported mass.
    pub fn mass(&self) -> Mass {
        self.0.sum()
    }
    /// Mass leaving each source (row marginal).
    pub fn source(&self) -> Array1<Mass> {
        self.0.sum_axis(Axis(1))
    }
    /// Mass arriving at each target (column marginal).
    pub fn target(&self) -> Array1<Mass> {
        self.0.sum_axis(Axis(0))
    }
    /// Sink-free block: transport between real locations only.
    pub fn inner(&self) -> ArrayView2<'_, Mass> {
        self.0.slice(s![..-1, ..-1])
    }
    /// Mass the sink supplies to each target location.
    pub fn imports(&self) -> ArrayView1<'_, Mass> {
        self.0.slice(s![-1, ..-1])
    }
    /// Mass each source location sends to the sink.
    pub fn exports(&self) -> ArrayView1<'_, Mass> {
        self.0.slice(s![..-1, -1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn is_plan_cost_elementwise() {
        let plan = Plan::from(array![[1., 0.], [0.5, 2.]]);
        let cost = array![[0., 3.], [2., 1.]];
        assert!(plan.cost(cost.view()) == 3.);
        assert!(plan.mass() == 3.5);
    }

    #[test]
    fn is_sink_split() {
        let plan = Plan::from(array![[1., 0., 0.5], [0., 2., 0.], [0.25, 0., 0.]]);
        assert!(plan.inner() == array![[1., 0.], [0., 2.]]);
        assert!(plan.exports() == array![0.5, 0.]);
        assert!(plan.imports() == array![0.25, 0.]);
        assert!(plan.source() == array![1.5, 2., 0.25]);
        assert!(plan.target() == array![1.25, 2., 0.5]);
    }
}
