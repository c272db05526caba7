mod measure;
mod space;
mod spacetime;

pub use measure::*;
pub use space::*;
pub use spacetime::*;
