use super::*;
use crate::Cost;
use crate::Error;
use crate::Point;
use crate::Result;
use ndarray::Array2;

/// Pairwise relocation cost between two ordered coordinate sets.
///
/// Starts from the distance in projected meters, optionally converts it into
/// travel time in hours for a given speed, and optionally applies an
/// elementwise scaling (e.g. squaring, to penalize long detours
/// superlinearly). Rows follow the source set, columns the target set.
///
/// Without a target set the matrix is computed from the source set against
/// itself: symmetric, with a zero diagonal as long as `scale(0) == 0`.
/// That last condition is left to the caller; a violating scale only logs
/// a warning.
pub struct SpaceCost<'a, M = Euclidean> {
    lhs: &'a [Point],
    rhs: Option<&'a [Point]>,
    speed: Option<Cost>,
    scale: Option<Box<dyn Fn(Cost) -> Cost + 'a>>,
    measure: M,
}

impl<'a> From<&'a [Point]> for SpaceCost<'a, Euclidean> {
    fn from(lhs: &'a [Point]) -> Self {
        Self {
            lhs,
            rhs: None,
            speed: None,
            scale: None,
            measure: Euclidean,
        }
    }
}

impl<'a, M> SpaceCost<'a, M>
where
    M: Measure,
{
    /// Target coordinates. Defaults to the source coordinates.
    pub fn against(mut self, rhs: &'a [Point]) -> Self {
        self.rhs = Some(rhs);
        self
    }
    /// Travel speed in km/h, turning meters into hours.
    pub fn speed(mut self, kmh: Cost) -> Self {
        self.speed = Some(kmh);
        self
    }
    /// Elementwise transform applied after the speed conversion.
    pub fn scale<F>(mut self, f: F) -> Self
    where
        F: Fn(Cost) -> Cost + 'a,
    {
        self.scale = Some(Box::new(f));
        self
    }
    /// Replaces the ground metric.
    pub fn measure<N>(self, measure: N) -> SpaceCost<'a, N>
    where
        N: Measure,
    {
        SpaceCost {
            lhs: self.lhs,
            rhs: self.rhs,
            speed: self.speed,
            scale: self.scale,
            measure,
        }
    }
    /// Raw pairwise distances, before speed conversion and scaling.
    pub fn distances(&self) -> Array2<Cost> {
        let rhs = self.rhs.unwrap_or(self.lhs);
        Array2::from_shape_fn((self.lhs.len(), rhs.len()), |(i, j)| {
            self.measure.distance(&self.lhs[i], &rhs[j])
        })
    }
    /// Computes the cost matrix of shape `(len(lhs), len(rhs))`.
    pub fn build(self) -> Result<Array2<Cost>> {
        let mut matrix = self.distances();
        if let Some(kmh) = self.speed {
            if !(kmh.is_finite() && kmh > 0.) {
                return Err(Error::Value(format!("speed must be positive, got {kmh} km/h")));
            }
            matrix.mapv_inplace(|meters| meters / 1000. / kmh);
        }
        if let Some(ref scale) = self.scale {
            if self.rhs.is_none() && scale(0.) != 0. {
                log::warn!("scale function maps 0 to {}, diagonal is no longer zero", scale(0.));
            }
            matrix.mapv_inplace(|x| scale(x));
        }
        log::debug!("built {}x{} space cost matrix", matrix.nrows(), matrix.ncols());
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const STATIONS: [Point; 4] = [[0., 0.], [3000., 0.], [0., 4000.], [3000., 4000.]];

    #[test]
    fn is_self_cost_symmetric() {
        let cost = SpaceCost::from(&STATIONS[..]).build().unwrap();
        assert_eq!(cost.dim(), (4, 4));
        assert!(cost == cost.t());
        assert!(cost.diag().iter().all(|&d| d == 0.));
        assert!(cost[[0, 3]] == 5000.);
    }

    #[test]
    fn is_rectangular_shape_kept() {
        let ref others = [[0., 0.], [6000., 8000.]];
        let cost = SpaceCost::from(&STATIONS[..]).against(others).build().unwrap();
        assert_eq!(cost.dim(), (4, 2));
        assert!(cost[[0, 1]] == 10000.);
        assert!(cost[[3, 1]] == 5000.);
    }

    #[test]
    fn is_speed_converted_to_hours() {
        let cost = SpaceCost::from(&STATIONS[..]).speed(10.).build().unwrap();
        assert_relative_eq!(cost[[0, 1]], 0.3, epsilon = 1e-12);
        assert_relative_eq!(cost[[0, 3]], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn is_scale_applied_after_speed() {
        let cost = SpaceCost::from(&STATIONS[..])
            .speed(10.)
            .scale(|x| x * x)
            .build()
            .unwrap();
        assert_relative_eq!(cost[[0, 3]], 0.25, epsilon = 1e-12);
        assert!(cost.diag().iter().all(|&d| d == 0.));
    }

    #[test]
    fn is_nonzero_scale_origin_tolerated() {
        let cost = SpaceCost::from(&STATIONS[..])
            .scale(|x| x + 1.)
            .build()
            .unwrap();
        assert!(cost.diag().iter().all(|&d| d == 1.));
    }

    #[test]
    fn is_invalid_speed_rejected() {
        for kmh in [0., -5., Cost::NAN] {
            let result = SpaceCost::from(&STATIONS[..]).speed(kmh).build();
            assert!(matches!(result, Err(Error::Value(_))));
        }
    }

    #[test]
    fn is_measure_replaceable() {
        let cost = SpaceCost::from(&STATIONS[..])
            .measure(|x: &Point, y: &Point| (x[0] - y[0]).abs() + (x[1] - y[1]).abs())
            .build()
            .unwrap();
        assert!(cost[[0, 3]] == 7000.);
    }
}
