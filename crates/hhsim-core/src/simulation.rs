//! Simulation driver for a single membrane run

use std::fmt;
use std::time::Instant;

use smallvec::SmallVec;

use crate::error::{DivergenceCause, Result, SimError};
use crate::integrator::{adaptive_step, IntegrationMethod};
use crate::registry::DomainPolicy;
use crate::state::{MembraneModel, MembraneState};
use crate::stimulus::Stimulus;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationParams {
    /// Start of the horizon (ms)
    pub t0: f64,
    /// End of the horizon (ms)
    pub t1: f64,
    /// Step size; the maximum step for adaptive integration (ms)
    pub dt: f64,
    /// Integration method
    pub method: IntegrationMethod,
    /// |V_m| above this ends the run as diverged (mV)
    pub divergence_bound: f64,
    /// Keep every n-th step; the first and last sample are always kept
    pub record_every: usize,
    /// Enable per-step timing
    pub perf_enabled: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t1: 100.0,
            dt: crate::DEFAULT_DT_MS,
            method: IntegrationMethod::default(),
            divergence_bound: crate::DEFAULT_DIVERGENCE_BOUND_MV,
            record_every: 1,
            perf_enabled: false,
        }
    }
}

impl SimulationParams {
    /// Create new simulation parameters with validation
    pub fn new(t0: f64, t1: f64, dt: f64) -> Result<Self> {
        let params = Self {
            t0,
            t1,
            dt,
            ..Default::default()
        };
        params.validate()?;
        Ok(params)
    }

    /// Set the integration method
    pub fn with_method(mut self, method: IntegrationMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the divergence sanity bound (mV)
    pub fn with_divergence_bound(mut self, bound: f64) -> Self {
        self.divergence_bound = bound;
        self
    }

    /// Keep only every n-th step in the result
    pub fn with_record_every(mut self, every: usize) -> Self {
        self.record_every = every;
        self
    }

    /// Enable or disable performance sampling
    pub fn with_perf(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    /// Length of the horizon (ms)
    pub fn duration(&self) -> f64 {
        self.t1 - self.t0
    }

    /// Number of fixed steps needed to cover the horizon
    pub fn num_steps(&self) -> usize {
        let ratio = self.duration() / self.dt;
        (ratio - 1e-9 * ratio.max(1.0)).ceil().max(1.0) as usize
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.t0.is_finite() && self.t1.is_finite()) {
            return Err(SimError::invalid_parameter(
                "horizon",
                format!("[{}, {}]", self.t0, self.t1),
                "finite bounds",
            ));
        }
        if self.t1 <= self.t0 {
            return Err(SimError::invalid_parameter(
                "t1",
                format!("{} (with t0={})", self.t1, self.t0),
                "> t0",
            ));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::invalid_parameter("dt", self.dt.to_string(), "> 0.0"));
        }
        if !(self.divergence_bound.is_finite() && self.divergence_bound > 0.0) {
            return Err(SimError::invalid_parameter(
                "divergence_bound",
                self.divergence_bound.to_string(),
                "> 0.0",
            ));
        }
        if self.record_every == 0 {
            return Err(SimError::invalid_parameter("record_every", "0", ">= 1"));
        }
        self.method.validate()
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RunPhase {
    /// Validated and ready to run
    Configured,
    /// Inside the integration loop
    Running,
    /// Reached the end of the horizon
    Completed,
    /// Left the sane region of state space
    Diverged,
    /// Stopped on an out-of-domain rate evaluation
    Aborted,
}

impl RunPhase {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Diverged | Self::Aborted)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Diverged => "diverged",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "status", rename_all = "snake_case"))]
pub enum RunOutcome {
    /// The whole horizon was integrated
    Completed,
    /// The run stopped on a divergence check
    Diverged {
        /// Time of the failing step (ms)
        time_ms: f64,
        /// Offending membrane potential (mV)
        v_m: f64,
        /// What tripped the check
        cause: DivergenceCause,
    },
    /// A rate law was requested outside the operating domain under [`DomainPolicy::Abort`]
    OutOfDomain {
        /// Time of the failing step (ms)
        time_ms: f64,
        /// Channel whose rates were requested
        species: String,
        /// Offending membrane potential (mV)
        v_m: f64,
        /// Lower bound of the domain (mV)
        min_mv: f64,
        /// Upper bound of the domain (mV)
        max_mv: f64,
    },
}

impl RunOutcome {
    /// Terminal phase matching this outcome
    pub fn phase(&self) -> RunPhase {
        match self {
            Self::Completed => RunPhase::Completed,
            Self::Diverged { .. } => RunPhase::Diverged,
            Self::OutOfDomain { .. } => RunPhase::Aborted,
        }
    }

    /// The error equivalent of a non-completed outcome
    pub fn to_error(&self) -> Option<SimError> {
        match self {
            Self::Completed => None,
            Self::Diverged { time_ms, v_m, cause } => Some(SimError::divergence(*time_ms, *v_m, *cause)),
            Self::OutOfDomain {
                species,
                v_m,
                min_mv,
                max_mv,
                ..
            } => Some(SimError::out_of_domain(species.clone(), *v_m, *min_mv, *max_mv)),
        }
    }
}

/// One recorded point of the trajectory
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sample {
    /// Simulated time (ms)
    pub time: f64,
    /// State at `time`
    pub state: MembraneState,
}

/// Performance metrics collected during simulation steps.
/// Present when `SimulationParams::with_perf(true)` is used.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PerfReport {
    /// Average step time in nanoseconds
    pub avg_step_ns: u64,
    /// Max step time in nanoseconds
    pub max_step_ns: u64,
    /// Steps sampled
    pub steps: usize,
}

/// Simulation results
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimulationResult {
    /// Species ids in state order
    pub species: Vec<String>,
    /// Gate labels per species
    pub gate_names: Vec<SmallVec<[String; 2]>>,
    /// Recorded samples in time order
    pub samples: Vec<Sample>,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Method used
    pub method: IntegrationMethod,
    /// Number of accepted steps
    pub steps_executed: usize,
    /// Adaptive trial steps that were rejected
    pub rejected_steps: usize,
    /// Gating variables pulled back into [0, 1]
    pub clamp_events: usize,
    /// Optional performance report
    pub perf: Option<PerfReport>,
}

impl SimulationResult {
    fn new(model: &MembraneModel, method: IntegrationMethod) -> Self {
        Self {
            species: model.species_ids(),
            gate_names: model.gate_names(),
            samples: Vec::new(),
            outcome: RunOutcome::Completed,
            method,
            steps_executed: 0,
            rejected_steps: 0,
            clamp_events: 0,
            perf: None,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the full horizon was integrated
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Sample times (ms)
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Membrane potential trace (mV)
    pub fn voltages(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.state.v_m).collect()
    }

    /// Trace of one gating variable, looked up by species id and gate label
    pub fn gate_trace(&self, species: &str, gate: &str) -> Option<Vec<f64>> {
        let s_idx = self.species.iter().position(|id| id == species)?;
        let g_idx = self.gate_names.get(s_idx)?.iter().position(|name| name == gate)?;
        self.samples.iter().map(|s| s.state.gate(s_idx, g_idx)).collect()
    }

    /// Last recorded state
    pub fn final_state(&self) -> Option<&MembraneState> {
        self.samples.last().map(|s| &s.state)
    }

    /// Time of the last sample (ms)
    pub fn end_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }

    /// `Ok(self)` for a completed run, otherwise the matching error
    pub fn into_result(self) -> Result<Self> {
        match self.outcome.to_error() {
            None => Ok(self),
            Some(err) => Err(err),
        }
    }
}

/// A single run: configured once, run once
#[derive(Debug)]
pub struct Simulation {
    model: MembraneModel,
    stimulus: Stimulus,
    initial: MembraneState,
    params: SimulationParams,
    phase: RunPhase,
}

impl Simulation {
    /// Validate the configuration; errors here mean the run never starts
    pub fn new(model: MembraneModel, stimulus: Stimulus, initial: MembraneState, params: SimulationParams) -> Result<Self> {
        params.validate()?;
        stimulus.validate()?;
        model.check_state(&initial)?;
        Ok(Self {
            model,
            stimulus,
            initial,
            params,
            phase: RunPhase::Configured,
        })
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Membrane model
    pub fn model(&self) -> &MembraneModel {
        &self.model
    }

    /// Simulation parameters
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Integrate the horizon
    ///
    /// Divergence and out-of-domain aborts are not errors here: they end the
    /// run early and are reported on the returned result together with the
    /// samples recorded so far.
    pub fn run(&mut self) -> Result<SimulationResult> {
        if self.phase != RunPhase::Configured {
            return Err(SimError::InvalidRunState {
                phase: self.phase.to_string(),
            });
        }
        self.phase = RunPhase::Running;
        log::info!(
            "Starting simulation: [{}, {}] ms, dt {} ms, method {}",
            self.params.t0,
            self.params.t1,
            self.params.dt,
            self.params.method
        );

        let mut recorder = Recorder::new(&self.model, &self.params);
        let result = match self.params.method {
            IntegrationMethod::Adaptive { rtol, atol } => self.run_adaptive(&mut recorder, rtol, atol),
            method => self.run_fixed(&mut recorder, method),
        };
        let outcome = match result {
            Ok(()) => RunOutcome::Completed,
            Err(err) => match recorder.outcome_for(err) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.phase = RunPhase::Aborted;
                    return Err(err);
                }
            },
        };

        self.phase = outcome.phase();
        let result = recorder.finish(outcome);
        match &result.outcome {
            RunOutcome::Completed => log::info!(
                "Simulation completed: {} steps, {} samples, {} gate clamps",
                result.steps_executed,
                result.len(),
                result.clamp_events
            ),
            RunOutcome::Diverged { time_ms, v_m, cause } => {
                log::warn!("Simulation diverged at {} ms (V_m = {} mV): {}", time_ms, v_m, cause)
            }
            RunOutcome::OutOfDomain { time_ms, species, v_m, .. } => log::warn!(
                "Simulation aborted at {} ms: channel {} evaluated at {} mV",
                time_ms,
                species,
                v_m
            ),
        }
        Ok(result)
    }

    fn run_fixed(&self, recorder: &mut Recorder, method: IntegrationMethod) -> Result<()> {
        let p = &self.params;
        let num_steps = p.num_steps();
        let mut state = self.initial.clone();
        recorder.start(p.t0, &state);

        for step in 0..num_steps {
            let t = p.t0 + step as f64 * p.dt;
            let t_next = if step + 1 == num_steps {
                p.t1
            } else {
                p.t0 + (step + 1) as f64 * p.dt
            };
            recorder.at = t;
            let step_start = Instant::now();
            let next = method.step(&self.model, &self.stimulus, &state, t, t_next - t)?;
            state = recorder.accept(next, t_next)?;
            recorder.time_step(step_start);
        }
        Ok(())
    }

    fn run_adaptive(&self, recorder: &mut Recorder, rtol: f64, atol: f64) -> Result<()> {
        let p = &self.params;
        let mut state = self.initial.clone();
        let mut t = p.t0;
        let mut h = p.dt;
        recorder.start(t, &state);

        while p.t1 - t > 1e-12 * p.t1.abs().max(1.0) {
            recorder.at = t;
            let step_start = Instant::now();
            let h_max = p.dt.min(p.t1 - t);
            let step = adaptive_step(&self.model, &self.stimulus, &state, t, h, h_max, rtol, atol)?;
            let t_next = if p.t1 - (t + step.h_used) <= 1e-12 * p.t1.abs().max(1.0) {
                p.t1
            } else {
                t + step.h_used
            };
            recorder.rejected += step.rejected;
            state = recorder.accept(step.state, t_next)?;
            recorder.time_step(step_start);
            t = t_next;
            h = step.h_next;
        }
        Ok(())
    }
}

/// Bookkeeping shared by the fixed and adaptive loops
struct Recorder {
    result: SimulationResult,
    bound: f64,
    record_every: usize,
    perf_enabled: bool,
    perf_samples: Vec<u64>,
    policy: DomainPolicy,
    domain: crate::registry::VoltageDomain,
    extrapolation_warned: bool,
    rejected: usize,
    /// Start time of the step in progress
    at: f64,
    last: Option<Sample>,
    last_recorded: bool,
    t0: f64,
    progress_every: f64,
    next_progress: f64,
}

impl Recorder {
    fn new(model: &MembraneModel, params: &SimulationParams) -> Self {
        let progress_every = params.duration() / 10.0;
        Self {
            result: SimulationResult::new(model, params.method),
            bound: params.divergence_bound,
            record_every: params.record_every,
            perf_enabled: params.perf_enabled,
            perf_samples: Vec::new(),
            policy: model.registry().policy(),
            domain: *model.registry().domain(),
            extrapolation_warned: false,
            rejected: 0,
            at: params.t0,
            last: None,
            last_recorded: true,
            t0: params.t0,
            progress_every,
            next_progress: params.t0 + progress_every,
        }
    }

    fn start(&mut self, t: f64, state: &MembraneState) {
        self.result.samples.push(Sample {
            time: t,
            state: state.clone(),
        });
    }

    /// Check, clamp and record a freshly integrated state
    fn accept(&mut self, mut next: MembraneState, t_next: f64) -> Result<MembraneState> {
        if !next.is_finite() {
            return Err(SimError::divergence(t_next, next.v_m, DivergenceCause::NonFinite));
        }
        if next.v_m.abs() > self.bound {
            return Err(SimError::divergence(t_next, next.v_m, DivergenceCause::SanityBound));
        }
        let clamped = next.clamp_gates();
        if clamped > 0 {
            log::trace!("Clamped {} gating variables at t = {} ms", clamped, t_next);
            self.result.clamp_events += clamped;
        }
        if self.policy == DomainPolicy::Extrapolate && !self.extrapolation_warned && !self.domain.contains(next.v_m) {
            log::warn!(
                "V_m = {} mV at t = {} ms is outside [{}, {}] mV; rate laws extrapolated",
                next.v_m,
                t_next,
                self.domain.min_mv,
                self.domain.max_mv
            );
            self.extrapolation_warned = true;
        }

        self.result.steps_executed += 1;
        let sample = Sample {
            time: t_next,
            state: next.clone(),
        };
        if self.result.steps_executed % self.record_every == 0 {
            self.result.samples.push(sample);
            self.last = None;
            self.last_recorded = true;
        } else {
            self.last = Some(sample);
            self.last_recorded = false;
        }

        if t_next >= self.next_progress {
            let progress = (t_next - self.t0) / (self.progress_every * 10.0) * 100.0;
            log::debug!("Simulation progress: {:.1}%", progress);
            self.next_progress += self.progress_every;
        }
        Ok(next)
    }

    fn time_step(&mut self, start: Instant) {
        if self.perf_enabled {
            self.perf_samples.push(start.elapsed().as_nanos() as u64);
        }
    }

    /// Map an integration error onto a terminal outcome; configuration
    /// errors pass through
    fn outcome_for(&self, err: SimError) -> Result<RunOutcome> {
        match err {
            SimError::Divergence { time_ms, voltage_mv, cause } => Ok(RunOutcome::Diverged {
                time_ms,
                v_m: voltage_mv,
                cause,
            }),
            SimError::Numerical { .. } => Ok(RunOutcome::Diverged {
                time_ms: self.at,
                v_m: self.last_voltage(),
                cause: DivergenceCause::NonFinite,
            }),
            SimError::OutOfDomain {
                species,
                voltage_mv,
                min_mv,
                max_mv,
            } => Ok(RunOutcome::OutOfDomain {
                time_ms: self.at,
                species,
                v_m: voltage_mv,
                min_mv,
                max_mv,
            }),
            other => Err(other),
        }
    }

    fn last_voltage(&self) -> f64 {
        self.last
            .as_ref()
            .or(self.result.samples.last())
            .map(|s| s.state.v_m)
            .unwrap_or(f64::NAN)
    }

    fn finish(mut self, outcome: RunOutcome) -> SimulationResult {
        if !self.last_recorded {
            if let Some(sample) = self.last.take() {
                self.result.samples.push(sample);
            }
        }
        self.result.outcome = outcome;
        self.result.rejected_steps = self.rejected;

        if self.perf_enabled && !self.perf_samples.is_empty() {
            let steps = self.perf_samples.len();
            let sum: u128 = self.perf_samples.iter().map(|v| *v as u128).sum();
            let avg = (sum / steps as u128) as u64;
            let max = *self.perf_samples.iter().max().unwrap_or(&0);
            self.result.perf = Some(PerfReport {
                avg_step_ns: avg,
                max_step_ns: max,
                steps,
            });
        }
        self.result
    }
}

/// Configure and run in one call
pub fn simulate(
    model: &MembraneModel,
    stimulus: &Stimulus,
    initial: &MembraneState,
    params: &SimulationParams,
) -> Result<SimulationResult> {
    let mut sim = Simulation::new(model.clone(), stimulus.clone(), initial.clone(), params.clone())?;
    sim.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelRegistry;

    fn passive_setup() -> (MembraneModel, MembraneState) {
        let model = MembraneModel::passive(1.0, 0.3, -54.4).unwrap();
        let initial = model.steady_state(-54.4).unwrap();
        (model, initial)
    }

    #[test]
    fn test_simulation_params_default() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.num_steps(), 10_000);
        assert_eq!(params.method, IntegrationMethod::ExponentialEuler);
    }

    #[test]
    fn test_simulation_params_validation() {
        assert!(SimulationParams::new(0.0, 20.0, 0.01).is_ok());
        assert!(SimulationParams::new(10.0, 10.0, 0.01).is_err());
        assert!(SimulationParams::new(10.0, 5.0, 0.01).is_err());
        assert!(SimulationParams::new(0.0, 20.0, 0.0).is_err());
        assert!(SimulationParams::new(0.0, 20.0, f64::NAN).is_err());
        let params = SimulationParams::default().with_record_every(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_num_steps_lands_on_horizon() {
        let params = SimulationParams::new(0.0, 20.0, 0.01).unwrap();
        assert_eq!(params.num_steps(), 2000);
        let params = SimulationParams::new(0.0, 1.05, 0.1).unwrap();
        assert_eq!(params.num_steps(), 11);
    }

    #[test]
    fn test_run_records_whole_horizon() {
        let (model, initial) = passive_setup();
        let params = SimulationParams::new(0.0, 1.05, 0.1).unwrap();
        let result = simulate(&model, &Stimulus::Zero, &initial, &params).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.steps_executed, 11);
        assert_eq!(result.len(), 12);
        assert_eq!(result.end_time(), Some(1.05));
        assert_eq!(result.species, vec!["leak".to_string()]);
    }

    #[test]
    fn test_record_every_keeps_first_and_last() {
        let (model, initial) = passive_setup();
        let params = SimulationParams::new(0.0, 1.0, 0.1).unwrap().with_record_every(3);
        let result = simulate(&model, &Stimulus::Zero, &initial, &params).unwrap();
        let times = result.times();
        assert_eq!(times.first(), Some(&0.0));
        assert_eq!(times.last(), Some(&1.0));
        // steps 3, 6, 9 plus the start and the final step
        assert_eq!(times.len(), 5);
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let (model, initial) = passive_setup();
        let params = SimulationParams::new(0.0, 1.0, 0.1).unwrap();
        let mut sim = Simulation::new(model, Stimulus::Zero, initial, params).unwrap();
        assert_eq!(sim.phase(), RunPhase::Configured);
        sim.run().unwrap();
        assert_eq!(sim.phase(), RunPhase::Completed);
        let err = sim.run().unwrap_err();
        assert!(matches!(err, SimError::InvalidRunState { .. }));
    }

    #[test]
    fn test_invalid_initial_state_rejected() {
        let model = MembraneModel::hodgkin_huxley();
        let mut initial = model.steady_state(-65.0).unwrap();
        initial.gating[1][0] = -0.5;
        let params = SimulationParams::new(0.0, 1.0, 0.01).unwrap();
        let err = Simulation::new(model, Stimulus::Zero, initial, params).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_gate_trace_lookup() {
        let model = MembraneModel::hodgkin_huxley();
        let initial = model.resting_state().unwrap();
        let params = SimulationParams::new(0.0, 1.0, 0.01).unwrap();
        let result = simulate(&model, &Stimulus::Zero, &initial, &params).unwrap();
        let n = result.gate_trace("k", "n").unwrap();
        assert_eq!(n.len(), result.len());
        assert!(result.gate_trace("k", "m").is_none());
        assert!(result.gate_trace("ca", "m").is_none());
    }

    #[test]
    fn test_out_of_domain_aborts_with_partial_result() {
        let registry = ChannelRegistry::hodgkin_huxley();
        let model = MembraneModel::new(1.0, registry).unwrap();
        let initial = model.resting_state().unwrap();
        // a hard depolarising kick drives V_m past +60 mV
        let stim = Stimulus::step(1.0, 50.0, 400.0);
        let params = SimulationParams::new(0.0, 50.0, 0.01).unwrap();
        let mut sim = Simulation::new(model, stim, initial, params).unwrap();
        let result = sim.run().unwrap();
        assert_eq!(sim.phase(), RunPhase::Aborted);
        assert!(matches!(result.outcome, RunOutcome::OutOfDomain { .. }));
        assert!(result.end_time().unwrap() < 50.0);
        assert!(matches!(result.into_result(), Err(SimError::OutOfDomain { .. })));
    }

    #[test]
    fn test_perf_report() {
        let (model, initial) = passive_setup();
        let params = SimulationParams::new(0.0, 1.0, 0.1).unwrap().with_perf(true);
        let result = simulate(&model, &Stimulus::Zero, &initial, &params).unwrap();
        let perf = result.perf.unwrap();
        assert_eq!(perf.steps, 10);
        assert!(perf.max_step_ns >= perf.avg_step_ns);
    }

    #[test]
    fn test_adaptive_run_lands_on_horizon() {
        let (model, initial) = passive_setup();
        let params = SimulationParams::new(0.0, 20.0, 0.5)
            .unwrap()
            .with_method(IntegrationMethod::adaptive());
        let result = simulate(&model, &Stimulus::step(5.0, 15.0, 10.0), &initial, &params).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.end_time(), Some(20.0));
        assert!(result.times().windows(2).all(|w| w[1] - w[0] <= 0.5 + 1e-12));
    }
}
