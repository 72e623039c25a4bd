//! Time-stepping schemes for the membrane ODE
//!
//! Every scheme advances a [`MembraneState`] from `t` to `t + h` without
//! touching the input state. Gate clamping and divergence checks on
//! accepted states are left to the simulation driver.
//!
//! Intermediate stages of RK4 and Bogacki–Shampine are trial states. A
//! stage that leaves the voltage domain or turns non-finite makes the whole
//! step a divergence, whatever the domain policy.

use std::fmt;
use std::str::FromStr;

use crate::error::{DivergenceCause, Result, SimError};
use crate::state::{MembraneModel, MembraneState, StateDerivative};
use crate::stimulus::Stimulus;

/// Smallest step the adaptive controller will try (ms)
pub const MIN_ADAPTIVE_STEP: f64 = 1e-10;
/// Below this total conductance the voltage update falls back to forward Euler
const MIN_CONDUCTANCE: f64 = 1e-12;

const SAFETY: f64 = 0.9;
const MAX_GROWTH: f64 = 5.0;
const MIN_SHRINK: f64 = 0.2;

/// Numerical integration method
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum IntegrationMethod {
    /// Explicit forward Euler
    Euler,
    /// Classical fourth-order Runge–Kutta
    RungeKutta4,
    /// Exponential Euler: gates relax exactly over the step with rates frozen
    /// at the start, the voltage follows the exact linear solution
    #[default]
    ExponentialEuler,
    /// Embedded Bogacki–Shampine 3(2) pair with error control
    Adaptive {
        /// Relative tolerance
        rtol: f64,
        /// Absolute tolerance
        atol: f64,
    },
}

impl IntegrationMethod {
    /// Adaptive stepping with default tolerances
    pub fn adaptive() -> Self {
        Self::Adaptive {
            rtol: 1e-6,
            atol: 1e-8,
        }
    }

    /// Short name used in configuration files and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::RungeKutta4 => "rk4",
            Self::ExponentialEuler => "exponential_euler",
            Self::Adaptive { .. } => "adaptive",
        }
    }

    /// Whether the step size is chosen by error control
    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive { .. })
    }

    /// Check tolerances
    pub fn validate(&self) -> Result<()> {
        if let Self::Adaptive { rtol, atol } = *self {
            if !(rtol.is_finite() && rtol > 0.0) {
                return Err(SimError::invalid_parameter("rtol", rtol.to_string(), "> 0.0"));
            }
            if !(atol.is_finite() && atol > 0.0) {
                return Err(SimError::invalid_parameter("atol", atol.to_string(), "> 0.0"));
            }
        }
        Ok(())
    }

    /// Advance `state` by one fixed step of length `h`
    ///
    /// For [`IntegrationMethod::Adaptive`] this takes a single step of the
    /// higher-order formula without error control.
    pub fn step(
        &self,
        model: &MembraneModel,
        stimulus: &Stimulus,
        state: &MembraneState,
        t: f64,
        h: f64,
    ) -> Result<MembraneState> {
        match self {
            Self::Euler => euler_step(model, stimulus, state, t, h),
            Self::RungeKutta4 => rk4_step(model, stimulus, state, t, h),
            Self::ExponentialEuler => exponential_euler_step(model, stimulus, state, t, h),
            Self::Adaptive { .. } => bogacki_shampine(model, stimulus, state, t, h).map(|(next, _)| next),
        }
    }
}

impl fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adaptive { rtol, atol } => write!(f, "adaptive (rtol {}, atol {})", rtol, atol),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl FromStr for IntegrationMethod {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euler" => Ok(Self::Euler),
            "rk4" | "runge_kutta4" | "runge-kutta4" => Ok(Self::RungeKutta4),
            "exponential_euler" | "exp_euler" | "exponential-euler" => Ok(Self::ExponentialEuler),
            "adaptive" => Ok(Self::adaptive()),
            other => Err(SimError::invalid_parameter(
                "method",
                other,
                "one of euler, rk4, exponential_euler, adaptive",
            )),
        }
    }
}

/// y + h·f(t, y)
pub fn euler_step(
    model: &MembraneModel,
    stimulus: &Stimulus,
    state: &MembraneState,
    t: f64,
    h: f64,
) -> Result<MembraneState> {
    let k1 = model.derivative(state, t, stimulus)?;
    Ok(state.advanced(&[(h, &k1)]))
}

/// Classical RK4
pub fn rk4_step(
    model: &MembraneModel,
    stimulus: &Stimulus,
    state: &MembraneState,
    t: f64,
    h: f64,
) -> Result<MembraneState> {
    let half = 0.5 * h;
    let k1 = model.derivative(state, t, stimulus)?;
    let k2 = stage(model, stimulus, &state.advanced(&[(half, &k1)]), t + half)?;
    let k3 = stage(model, stimulus, &state.advanced(&[(half, &k2)]), t + half)?;
    let k4 = stage(model, stimulus, &state.advanced(&[(h, &k3)]), t + h)?;
    let sixth = h / 6.0;
    Ok(state.advanced(&[(sixth, &k1), (2.0 * sixth, &k2), (2.0 * sixth, &k3), (sixth, &k4)]))
}

/// Exponential Euler
///
/// With the gates frozen the voltage equation is linear,
/// `C dV/dt = -G (V - V∞)` with `G = Σ g_j` and `V∞ = (Σ g_j E_j + I) / G`,
/// and is solved exactly. The injected current is sampled at the step
/// midpoint, which makes the scheme exact for a passive membrane under
/// piecewise-constant input aligned to the step grid.
pub fn exponential_euler_step(
    model: &MembraneModel,
    stimulus: &Stimulus,
    state: &MembraneState,
    t: f64,
    h: f64,
) -> Result<MembraneState> {
    model.check_layout(state)?;
    let registry = model.registry();
    let c_m = model.capacitance();
    let v = state.v_m;

    let (g_total, ge_sum) = model.conductance_sums(state);
    let i_inj = stimulus.current_at(t + 0.5 * h);
    let v_next = if g_total > MIN_CONDUCTANCE {
        let v_inf = (ge_sum + i_inj) / g_total;
        v_inf + (v - v_inf) * (-h * g_total / c_m).exp()
    } else {
        v + h * (ge_sum + i_inj - g_total * v) / c_m
    };

    let mut next = state.clone();
    next.v_m = v_next;
    for (idx, gates) in next.gating.iter_mut().enumerate() {
        for (gate, x) in gates.iter_mut().enumerate() {
            let rates = registry.gate_rates(idx, gate, v)?;
            *x = rates.relax(*x, h);
        }
    }
    Ok(next)
}

/// Derivative at an intermediate stage; domain and non-finite failures
/// become divergences at the stage time
fn stage(
    model: &MembraneModel,
    stimulus: &Stimulus,
    state: &MembraneState,
    t: f64,
) -> Result<StateDerivative> {
    model.derivative(state, t, stimulus).map_err(|err| match err {
        SimError::OutOfDomain { voltage_mv, .. } => {
            SimError::divergence(t, voltage_mv, DivergenceCause::StageOutOfDomain)
        }
        SimError::Numerical { .. } => SimError::divergence(t, state.v_m, DivergenceCause::NonFinite),
        other => other,
    })
}

/// One Bogacki–Shampine step: third-order solution and the max-norm of the
/// difference to the embedded second-order one
fn bogacki_shampine(
    model: &MembraneModel,
    stimulus: &Stimulus,
    state: &MembraneState,
    t: f64,
    h: f64,
) -> Result<(MembraneState, MembraneState)> {
    let k1 = model.derivative(state, t, stimulus)?;
    let k2 = stage(model, stimulus, &state.advanced(&[(0.5 * h, &k1)]), t + 0.5 * h)?;
    let k3 = stage(model, stimulus, &state.advanced(&[(0.75 * h, &k2)]), t + 0.75 * h)?;
    let high = state.advanced(&[(2.0 / 9.0 * h, &k1), (h / 3.0, &k2), (4.0 / 9.0 * h, &k3)]);
    let k4 = stage(model, stimulus, &high, t + h)?;
    let low = state.advanced(&[
        (7.0 / 24.0 * h, &k1),
        (0.25 * h, &k2),
        (h / 3.0, &k3),
        (0.125 * h, &k4),
    ]);
    Ok((high, low))
}

/// Scaled max-norm of the local error estimate
fn error_norm(start: &MembraneState, high: &MembraneState, low: &MembraneState, rtol: f64, atol: f64) -> f64 {
    let scaled = |y0: f64, y1: f64, z: f64| (y1 - z).abs() / (atol + rtol * y0.abs().max(y1.abs()));
    let mut norm = scaled(start.v_m, high.v_m, low.v_m);
    for ((x0, x1), z) in start.gates().zip(high.gates()).zip(low.gates()) {
        norm = norm.max(scaled(x0, x1, z));
    }
    norm
}

/// Outcome of one accepted adaptive step
#[derive(Debug, Clone)]
pub struct AdaptiveStep {
    /// State at `t + h_used`
    pub state: MembraneState,
    /// Length of the accepted step (ms)
    pub h_used: f64,
    /// Suggested length of the next step (ms)
    pub h_next: f64,
    /// Trial steps rejected before acceptance
    pub rejected: usize,
}

/// Take one error-controlled step starting with a trial of `h_try`,
/// never longer than `h_max`
///
/// Rejected trials shrink the step. A trial is rejected when its error is
/// too large, non-finite, or one of its stages fails. A step below
/// [`MIN_ADAPTIVE_STEP`] fails with a step-underflow divergence.
#[allow(clippy::too_many_arguments)]
pub fn adaptive_step(
    model: &MembraneModel,
    stimulus: &Stimulus,
    state: &MembraneState,
    t: f64,
    h_try: f64,
    h_max: f64,
    rtol: f64,
    atol: f64,
) -> Result<AdaptiveStep> {
    let mut h = h_try.min(h_max);
    let mut rejected = 0;
    loop {
        if h < MIN_ADAPTIVE_STEP {
            return Err(SimError::divergence(t, state.v_m, DivergenceCause::StepUnderflow));
        }
        let (high, low) = match bogacki_shampine(model, stimulus, state, t, h) {
            Ok(pair) => pair,
            Err(SimError::Divergence { .. }) => {
                rejected += 1;
                h *= MIN_SHRINK;
                continue;
            }
            Err(err) => return Err(err),
        };
        let norm = error_norm(state, &high, &low, rtol, atol);

        if !norm.is_finite() {
            rejected += 1;
            h *= MIN_SHRINK;
            continue;
        }
        let factor = if norm == 0.0 {
            MAX_GROWTH
        } else {
            (SAFETY * norm.powf(-1.0 / 3.0)).clamp(MIN_SHRINK, MAX_GROWTH)
        };
        if norm <= 1.0 {
            return Ok(AdaptiveStep {
                state: high,
                h_used: h,
                h_next: (h * factor).min(h_max),
                rejected,
            });
        }
        rejected += 1;
        h *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passive() -> (MembraneModel, MembraneState) {
        let model = MembraneModel::passive(1.0, 0.3, -54.4).unwrap();
        let state = model.steady_state(-54.4).unwrap();
        (model, state)
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("rk4".parse::<IntegrationMethod>().unwrap(), IntegrationMethod::RungeKutta4);
        assert_eq!(
            "Exponential_Euler".parse::<IntegrationMethod>().unwrap(),
            IntegrationMethod::ExponentialEuler
        );
        assert!("leapfrog".parse::<IntegrationMethod>().is_err());
        assert_eq!(IntegrationMethod::default(), IntegrationMethod::ExponentialEuler);
    }

    #[test]
    fn test_tolerance_validation() {
        assert!(IntegrationMethod::adaptive().validate().is_ok());
        let bad = IntegrationMethod::Adaptive { rtol: 0.0, atol: 1e-8 };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_exponential_euler_is_exact_for_passive_membrane() {
        let (model, state) = passive();
        let stim = Stimulus::Constant { amplitude: 10.0 };
        let next = exponential_euler_step(&model, &stim, &state, 0.0, 2.0).unwrap();
        let v_inf = -54.4 + 10.0 / 0.3;
        let expected = v_inf + (-54.4 - v_inf) * (-0.6f64).exp();
        assert!((next.v_m - expected).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_steps_agree_on_small_step() {
        let model = MembraneModel::hodgkin_huxley();
        let state = model.steady_state(-60.0).unwrap();
        let stim = Stimulus::Zero;
        let h = 1e-3;
        let euler = euler_step(&model, &stim, &state, 0.0, h).unwrap();
        let rk4 = rk4_step(&model, &stim, &state, 0.0, h).unwrap();
        let expo = exponential_euler_step(&model, &stim, &state, 0.0, h).unwrap();
        assert!((euler.v_m - rk4.v_m).abs() < 1e-5);
        assert!((expo.v_m - rk4.v_m).abs() < 1e-5);
    }

    #[test]
    fn test_step_leaves_input_untouched() {
        let model = MembraneModel::hodgkin_huxley();
        let state = model.steady_state(-60.0).unwrap();
        let before = state.clone();
        for method in [
            IntegrationMethod::Euler,
            IntegrationMethod::RungeKutta4,
            IntegrationMethod::ExponentialEuler,
            IntegrationMethod::adaptive(),
        ] {
            let _ = method.step(&model, &Stimulus::Zero, &state, 0.0, 0.01).unwrap();
            assert_eq!(state, before);
        }
    }

    #[test]
    fn test_adaptive_step_respects_cap() {
        let (model, state) = passive();
        let stim = Stimulus::Zero;
        let step = adaptive_step(&model, &stim, &state, 0.0, 1.0, 0.05, 1e-6, 1e-8).unwrap();
        assert!(step.h_used <= 0.05);
        assert!(step.h_next <= 0.05);
    }

    #[test]
    fn test_adaptive_step_shrinks_on_fast_dynamics() {
        let registry = crate::registry::ChannelRegistry::hodgkin_huxley()
            .with_policy(crate::registry::DomainPolicy::Extrapolate);
        let model = MembraneModel::new(1.0, registry).unwrap();
        let state = model.steady_state(-20.0).unwrap();
        let step = adaptive_step(&model, &Stimulus::Zero, &state, 0.0, 1.0, 1.0, 1e-6, 1e-8).unwrap();
        assert!(step.h_used < 1.0);
        assert!(step.rejected > 0);
    }

    #[test]
    fn test_stage_leaving_domain_is_divergence() {
        let model = MembraneModel::hodgkin_huxley();
        let rest = model.resting_state().unwrap();
        let stim = Stimulus::Constant { amplitude: 100.0 };
        for method in [IntegrationMethod::RungeKutta4, IntegrationMethod::adaptive()] {
            let err = method.step(&model, &stim, &rest, 0.0, 5.0).unwrap_err();
            match err {
                SimError::Divergence { voltage_mv, cause, .. } => {
                    assert_eq!(cause, DivergenceCause::StageOutOfDomain);
                    assert!(voltage_mv > 60.0);
                }
                other => panic!("{}: expected divergence, got {:?}", method, other),
            }
        }
    }

    #[test]
    fn test_adaptive_step_underflows_on_non_finite_input() {
        let model = MembraneModel::hodgkin_huxley();
        let rest = model.resting_state().unwrap();
        let stim = Stimulus::waveform(|t| if t >= 2.0 { f64::NAN } else { 0.0 });
        let err = adaptive_step(&model, &stim, &rest, 2.0, 0.01, 0.01, 1e-6, 1e-8).unwrap_err();
        assert!(matches!(
            err,
            SimError::Divergence {
                cause: DivergenceCause::StepUnderflow,
                ..
            }
        ));
    }
}
