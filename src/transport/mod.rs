mod backend;
mod coupling;
mod extension;
mod network;
mod options;
mod paired;
mod partial;
mod plan;
mod sinkhorn;
mod unpaired;

pub use backend::*;
pub use coupling::*;
pub use extension::*;
pub use network::*;
pub use options::*;
pub use paired::*;
pub use partial::*;
pub use plan::*;
pub use sinkhorn::*;
pub use unpaired::*;
