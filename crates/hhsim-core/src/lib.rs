//! Conductance-based single-compartment neuron simulator
//!
//! This crate integrates Hodgkin–Huxley style membrane models: a membrane
//! capacitance, a set of voltage-gated and leak channel species, and an
//! injected current protocol. It produces time series of the membrane
//! potential and every gating variable, and is free of side effects apart
//! from `log` records.
//!
//! ```no_run
//! use hhsim_core::{simulate, MembraneModel, SimulationParams, Stimulus};
//!
//! let model = MembraneModel::hodgkin_huxley();
//! let rest = model.resting_state()?;
//! let params = SimulationParams::new(0.0, 100.0, 0.01)?;
//! let result = simulate(&model, &Stimulus::step(5.0, 95.0, 15.0), &rest, &params)?;
//! println!("{} samples", result.len());
//! # Ok::<(), hhsim_core::SimError>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod analysis;
pub mod channel;
pub mod error;
pub mod integrator;
pub mod registry;
pub mod simulation;
pub mod squid;
pub mod state;
pub mod stimulus;
pub mod sweep;

// Re-export essential types
pub use analysis::{FiringPattern, PassiveMembrane, SpikeDetector, SpikeTrain};
pub use channel::{ChannelKind, ChannelSpecies, Gate, GateKinetics, GateRates, GateValues, RateFunction};
pub use error::{DivergenceCause, Result, SimError};
pub use integrator::IntegrationMethod;
pub use registry::{ChannelRegistry, DomainPolicy, VoltageDomain};
pub use simulation::{
    simulate, PerfReport, RunOutcome, RunPhase, Sample, Simulation, SimulationParams, SimulationResult,
};
pub use state::{MembraneModel, MembraneState, StateDerivative};
pub use stimulus::Stimulus;
pub use sweep::{amplitude_sweep, fi_curve, run_batch, FiPoint, RunConfig};

/// Core crate version for compatibility checking
pub const CORE_VERSION: u32 = 1;

/// Default integration step (ms)
pub const DEFAULT_DT_MS: f64 = 0.01;

/// Default |V_m| sanity bound (mV)
pub const DEFAULT_DIVERGENCE_BOUND_MV: f64 = 1000.0;

/// Lower end of the default operating voltage range (mV)
pub const DEFAULT_DOMAIN_MIN_MV: f64 = -100.0;

/// Upper end of the default operating voltage range (mV)
pub const DEFAULT_DOMAIN_MAX_MV: f64 = 60.0;

/// Default spike detection threshold (mV)
pub const DEFAULT_SPIKE_THRESHOLD_MV: f64 = 0.0;
