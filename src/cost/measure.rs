use crate::Cost;
use crate::Point;

/// Ground metric between two planar locations.
///
/// Defines the cost of relocating one unit of mass from a source location to
/// a target location, before any speed conversion or scaling is applied.
///
/// # Implementations
///
/// - [`Euclidean`]: straight-line distance in projected meters
/// - any `Fn(&Point, &Point) -> Cost`, e.g. a lookup into routing distances
pub trait Measure {
    fn distance(&self, x: &Point, y: &Point) -> Cost;
}

/// Straight-line distance in the projected plane.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Euclidean;

impl Measure for Euclidean {
    fn distance(&self, x: &Point, y: &Point) -> Cost {
        (x[0] - y[0]).hypot(x[1] - y[1])
    }
}

impl<F> Measure for F
where
    F: Fn(&Point, &Point) -> Cost,
{
    fn distance(&self, x: &Point, y: &Point) -> Cost {
        self(x, y)
    }
}
