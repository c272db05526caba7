//! Partial optimal transport between spatial mass distributions.
//!
//! Compares two non-negative mass vectors over a set of locations (for
//! example predicted against observed demand at bike-sharing stations),
//! optionally extended across discrete time steps. The totals need not
//! agree: any imbalance is imported from, or exported to, a virtual sink
//! at a fixed penalty.
//!
//! ## Cost Matrices
//!
//! - [`SpaceCost`] — Pairwise distances (or travel times) between coordinates
//! - [`SpaceTime`] — Block expansion of a spatial matrix over time steps
//! - [`Measure`] — Pluggable point-to-point distance primitive
//!
//! ## Transport
//!
//! - [`PartialTransport`] — Sink-extended cost with an exact or regularized backend
//! - [`Network`] — Exact transportation LP via successive shortest paths
//! - [`Sinkhorn`] — Entropy-regularized divergence with gradients
//! - [`Unpaired`] — Transport between unaligned point sets of unequal size
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geot::*;
//!
//! let ref stations = [[0., 0.], [1200., 0.], [0., 800.]];
//! let cost = SpaceCost::from(&stations[..]).speed(15.).build()?;
//! let ot = PartialTransport::new(&cost, Options::exact())?;
//! let relocation = ot.cost(&[4., 1., 0.], &[2., 2., 2.])?;
//! ```
mod cost;
mod error;
mod transport;

pub use cost::*;
pub use error::*;
pub use transport::*;

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Transport costs, distances, travel times, and penalties.
pub type Cost = f64;
/// Demand, supply, and transported mass.
pub type Mass = f64;
/// Projected planar coordinate in meters.
pub type Point = [f64; 2];

// ============================================================================
// SPACE-TIME EXPANSION
// Waiting-time floor between time steps, in hours per step of separation.
// ============================================================================
/// Number of time steps a spatial matrix is expanded over.
pub const SPACETIME_STEPS: usize = 3;
/// Cost for serving demand from an earlier step with a later prediction.
pub const SPACETIME_FORWARD: Cost = 0.;
/// Cost for serving demand with a prediction made for a later step.
pub const SPACETIME_BACKWARD: Cost = 1.;

// ============================================================================
// SINKHORN OPTIMAL TRANSPORT
// Debiased, unbalanced, log-domain Sinkhorn with epsilon-scaling.
// ε = blur^p, ρ = reach^p, annealing ratio = scaling^p.
// ============================================================================
/// Target length scale of the entropic blur. Lower = closer to exact transport.
pub const SINKHORN_BLUR: Cost = 0.1;
/// Length scale of the marginal relaxation. Larger = closer to balanced transport.
pub const SINKHORN_REACH: Cost = 0.01;
/// Geometric ratio between consecutive blur scales during annealing.
pub const SINKHORN_SCALING: Cost = 0.1;
/// Exponent p relating blur and reach to the temperature ε and penalty ρ.
pub const SINKHORN_EXPONENT: i32 = 2;
/// Maximum iterations at the final temperature before stopping.
pub const SINKHORN_ITERATIONS: usize = 256;
/// Early stopping threshold on the largest change of a dual potential.
pub const SINKHORN_TOLERANCE: Cost = 1e-9;

// ============================================================================
// EXACT TRANSPORT
// ============================================================================
/// Relative tolerance under which residual mass counts as fully routed.
pub const FLOW_TOLERANCE: Mass = 1e-12;

// ============================================================================
// UNPAIRED RELOCATION
// ============================================================================
/// Cost charged for matching a point against a padded import location.
pub const IMPORT_COST_PHI: Cost = 0.;

// ============================================================================
// RUNTIME UTILITIES
// ============================================================================
/// Initialize dual logging (terminal + file) with timestamped log files.
/// Creates `logs/` directory and writes DEBUG level to file, INFO to terminal.
#[cfg(feature = "logging")]
pub fn log() -> anyhow::Result<()> {
    use anyhow::Context;
    std::fs::create_dir_all("logs").context("create logs directory")?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("time moves slow")?
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).context("create log file")?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).context("initialize logger")
}
