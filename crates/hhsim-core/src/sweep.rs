//! Batches of independent runs
//!
//! Runs share nothing mutable, so a batch is distributed over the rayon
//! pool when the `parallel` feature is enabled. Results always come back in
//! input order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::analysis::{FiringPattern, SpikeDetector};
use crate::error::Result;
use crate::simulation::{simulate, RunPhase, SimulationParams, SimulationResult};
use crate::state::{MembraneModel, MembraneState};
use crate::stimulus::Stimulus;

/// Everything one run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Membrane model
    pub model: MembraneModel,
    /// Injected current
    pub stimulus: Stimulus,
    /// Initial condition
    pub initial: MembraneState,
    /// Horizon and integration settings
    pub params: SimulationParams,
}

impl RunConfig {
    /// Bundle a run configuration
    pub fn new(model: MembraneModel, stimulus: Stimulus, initial: MembraneState, params: SimulationParams) -> Self {
        Self {
            model,
            stimulus,
            initial,
            params,
        }
    }

    /// Configure and execute
    pub fn run(&self) -> Result<SimulationResult> {
        simulate(&self.model, &self.stimulus, &self.initial, &self.params)
    }
}

/// Execute every configuration; output order matches input order
pub fn run_batch(configs: &[RunConfig]) -> Vec<Result<SimulationResult>> {
    run_batch_with(configs, || {})
}

/// Like [`run_batch`], calling `on_done` after each run finishes
pub fn run_batch_with<F>(configs: &[RunConfig], on_done: F) -> Vec<Result<SimulationResult>>
where
    F: Fn() + Sync + Send,
{
    log::info!("Running batch of {} simulations", configs.len());

    #[cfg(feature = "parallel")]
    let results: Vec<_> = configs
        .par_iter()
        .map(|config| {
            let result = config.run();
            on_done();
            result
        })
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = configs
        .iter()
        .map(|config| {
            let result = config.run();
            on_done();
            result
        })
        .collect();

    results
}

/// Step-current runs for each amplitude, all other settings shared
pub fn amplitude_sweep(
    model: &MembraneModel,
    initial: &MembraneState,
    params: &SimulationParams,
    onset: f64,
    offset: f64,
    amplitudes: &[f64],
) -> Vec<RunConfig> {
    amplitudes
        .iter()
        .map(|&amplitude| {
            RunConfig::new(
                model.clone(),
                Stimulus::step(onset, offset, amplitude),
                initial.clone(),
                params.clone(),
            )
        })
        .collect()
}

/// One point of a frequency–current curve
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FiPoint {
    /// Step amplitude (µA/cm²)
    pub amplitude: f64,
    /// Spikes over the run
    pub spike_count: usize,
    /// Mean rate over the stimulation window (Hz)
    pub rate_hz: f64,
    /// Firing pattern over the run
    pub pattern: FiringPattern,
    /// Terminal phase of the run
    pub phase: RunPhase,
}

impl FiPoint {
    /// Reduce one step-current run
    pub fn from_result(
        amplitude: f64,
        result: &SimulationResult,
        detector: &SpikeDetector,
        onset: f64,
        offset: f64,
    ) -> Self {
        let train = detector.spike_train(result);
        let stimulated = train.window(onset, offset.min(train.end));
        Self {
            amplitude,
            spike_count: train.count(),
            rate_hz: stimulated.mean_rate_hz(),
            pattern: train.pattern(),
            phase: result.outcome.phase(),
        }
    }
}

/// Run an amplitude sweep and reduce it to an f–I curve
///
/// Configuration errors abort the whole sweep; diverged or aborted runs
/// are reported through [`FiPoint::phase`].
pub fn fi_curve(
    model: &MembraneModel,
    initial: &MembraneState,
    params: &SimulationParams,
    onset: f64,
    offset: f64,
    amplitudes: &[f64],
    detector: &SpikeDetector,
) -> Result<Vec<FiPoint>> {
    let configs = amplitude_sweep(model, initial, params, onset, offset, amplitudes);
    run_batch(&configs)
        .into_iter()
        .zip(amplitudes)
        .map(|(result, &amplitude)| {
            result.map(|r| FiPoint::from_result(amplitude, &r, detector, onset, offset))
        })
        .collect()
}
