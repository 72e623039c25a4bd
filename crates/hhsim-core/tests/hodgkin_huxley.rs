use hhsim_core::{
    fi_curve, simulate, ChannelRegistry, DivergenceCause, DomainPolicy, FiringPattern, IntegrationMethod,
    MembraneModel, RunOutcome, RunPhase, SimError, Simulation, SimulationParams, SpikeDetector, Stimulus,
};

fn step_run(amplitude: f64, method: IntegrationMethod) -> hhsim_core::SimulationResult {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();
    let params = SimulationParams::new(0.0, 100.0, 0.01).unwrap().with_method(method);
    simulate(&model, &Stimulus::step(5.0, 95.0, amplitude), &rest, &params).unwrap()
}

#[test]
fn resting_state_is_self_sustaining() {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();
    assert!((rest.v_m + 65.0).abs() < 0.1);

    for method in [
        IntegrationMethod::ExponentialEuler,
        IntegrationMethod::Euler,
        IntegrationMethod::RungeKutta4,
        IntegrationMethod::adaptive(),
    ] {
        let params = SimulationParams::new(0.0, 50.0, 0.01).unwrap().with_method(method);
        let result = simulate(&model, &Stimulus::Zero, &rest, &params).unwrap();
        assert!(result.is_complete());
        let drift = result
            .voltages()
            .iter()
            .map(|v| (v - rest.v_m).abs())
            .fold(0.0, f64::max);
        assert!(drift < 1e-6, "{} drifted {} mV", method, drift);
    }
}

#[test]
fn spike_count_grows_with_stimulus() {
    let detector = SpikeDetector::default();
    let counts: Vec<usize> = [1.0, 4.0, 15.0]
        .iter()
        .map(|&amp| detector.spike_train(&step_run(amp, IntegrationMethod::ExponentialEuler)).count())
        .collect();
    assert_eq!(counts[0], 0);
    assert_eq!(counts[1], 1);
    assert!(counts[2] > 1);
}

#[test]
fn excitability_holds_for_explicit_methods() {
    let detector = SpikeDetector::default();
    for method in [IntegrationMethod::Euler, IntegrationMethod::RungeKutta4] {
        let quiet = detector.spike_train(&step_run(1.0, method)).count();
        let single = detector.spike_train(&step_run(4.0, method)).count();
        let tonic = detector.spike_train(&step_run(15.0, method)).count();
        assert_eq!((quiet, single), (0, 1), "{}", method);
        assert!(tonic > 1, "{}", method);
    }
}

#[test]
fn firing_patterns_are_classified() {
    let detector = SpikeDetector::default();
    let pattern = |amp| detector.spike_train(&step_run(amp, IntegrationMethod::ExponentialEuler)).pattern();
    assert_eq!(pattern(1.0), FiringPattern::Quiescent);
    assert_eq!(pattern(4.0), FiringPattern::SingleSpike);
    assert_eq!(pattern(15.0), FiringPattern::Tonic);
}

#[test]
fn fi_curve_is_monotonic_away_from_thresholds() {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();
    let params = SimulationParams::new(0.0, 100.0, 0.01).unwrap();
    let amplitudes = [0.0, 1.0, 4.0, 10.0, 15.0, 20.0];
    let curve = fi_curve(&model, &rest, &params, 5.0, 95.0, &amplitudes, &SpikeDetector::default()).unwrap();

    assert_eq!(curve.len(), amplitudes.len());
    for (point, amp) in curve.iter().zip(amplitudes) {
        assert_eq!(point.amplitude, amp);
        assert_eq!(point.phase, RunPhase::Completed);
    }
    assert!(curve.windows(2).all(|w| w[1].spike_count >= w[0].spike_count));
    assert!(curve.windows(2).all(|w| w[1].rate_hz >= w[0].rate_hz));
}

#[test]
fn coarse_euler_step_diverges_before_horizon() {
    let registry = ChannelRegistry::hodgkin_huxley().with_policy(DomainPolicy::Extrapolate);
    let model = MembraneModel::new(1.0, registry).unwrap();
    let rest = model.resting_state().unwrap();
    let params = SimulationParams::new(0.0, 50.0, 1.0)
        .unwrap()
        .with_method(IntegrationMethod::Euler);
    let mut sim = Simulation::new(model, Stimulus::step(1.0, 50.0, 30.0), rest, params).unwrap();
    let result = sim.run().unwrap();

    assert_eq!(sim.phase(), RunPhase::Diverged);
    match result.outcome {
        RunOutcome::Diverged { time_ms, cause, .. } => {
            assert!(time_ms < 50.0);
            assert!(matches!(cause, DivergenceCause::SanityBound | DivergenceCause::NonFinite));
        }
        ref other => panic!("expected divergence, got {:?}", other),
    }
    // partial series up to the failing step
    assert!(!result.is_empty());
    assert!(result.end_time().unwrap() < 50.0);
    assert!(result.voltages().iter().all(|v| v.is_finite() && v.abs() <= 1000.0));
    assert!(matches!(result.into_result(), Err(SimError::Divergence { .. })));
}

#[test]
fn coarse_steps_under_default_policy_diverge() {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();
    let cases = [
        (IntegrationMethod::RungeKutta4, 0.5),
        (IntegrationMethod::RungeKutta4, 1.0),
        (IntegrationMethod::RungeKutta4, 2.0),
        (IntegrationMethod::Euler, 1.0),
    ];
    for (method, dt) in cases {
        let params = SimulationParams::new(0.0, 50.0, dt).unwrap().with_method(method);
        let result = simulate(&model, &Stimulus::step(1.0, 50.0, 30.0), &rest, &params).unwrap();
        assert_eq!(
            result.outcome.phase(),
            RunPhase::Diverged,
            "{} at dt = {}: {:?}",
            method,
            dt,
            result.outcome
        );
        assert!(result.voltages().iter().all(|v| v.is_finite()));
        let err = result.into_result().unwrap_err();
        assert!(err.is_recoverable());
    }
}

#[test]
fn non_finite_input_diverges_under_default_policy() {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();
    let stim = Stimulus::waveform(|t| if t >= 2.0 { f64::NAN } else { 0.0 });

    for method in [
        IntegrationMethod::Euler,
        IntegrationMethod::RungeKutta4,
        IntegrationMethod::ExponentialEuler,
    ] {
        let params = SimulationParams::new(0.0, 5.0, 0.01).unwrap().with_method(method);
        let result = simulate(&model, &stim, &rest, &params).unwrap();
        match result.outcome {
            RunOutcome::Diverged { cause, .. } => assert_eq!(cause, DivergenceCause::NonFinite, "{}", method),
            ref other => panic!("{}: expected divergence, got {:?}", method, other),
        }
    }

    // the controller keeps shrinking towards the discontinuity until it gives up
    let params = SimulationParams::new(0.0, 5.0, 0.1)
        .unwrap()
        .with_method(IntegrationMethod::adaptive());
    let result = simulate(&model, &stim, &rest, &params).unwrap();
    match result.outcome {
        RunOutcome::Diverged { time_ms, cause, .. } => {
            assert_eq!(cause, DivergenceCause::StepUnderflow);
            assert!(time_ms <= 2.0);
        }
        ref other => panic!("expected step underflow, got {:?}", other),
    }
    assert!(result.end_time().unwrap() <= 2.0);
}
