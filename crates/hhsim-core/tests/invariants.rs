use hhsim_core::{
    simulate, ChannelRegistry, ChannelSpecies, DomainPolicy, IntegrationMethod, MembraneModel, SimError,
    Simulation, SimulationParams, Stimulus,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn gating_stays_in_unit_interval(amplitude in -10.0f64..40.0, dt in 0.005f64..0.05) {
        let registry = ChannelRegistry::hodgkin_huxley().with_policy(DomainPolicy::Extrapolate);
        let model = MembraneModel::new(1.0, registry).unwrap();
        let rest = model.resting_state().unwrap();
        let params = SimulationParams::new(0.0, 20.0, dt).unwrap();
        let result = simulate(&model, &Stimulus::step(2.0, 18.0, amplitude), &rest, &params).unwrap();
        prop_assert!(result.is_complete());
        for sample in &result.samples {
            prop_assert!(sample.state.gates_in_unit_interval());
        }
    }

    #[test]
    fn euler_gating_is_clamped(dt in 0.05f64..0.3) {
        let registry = ChannelRegistry::hodgkin_huxley().with_policy(DomainPolicy::Extrapolate);
        let model = MembraneModel::new(1.0, registry).unwrap();
        let rest = model.resting_state().unwrap();
        let params = SimulationParams::new(0.0, 20.0, dt)
            .unwrap()
            .with_method(IntegrationMethod::Euler);
        let result = simulate(&model, &Stimulus::step(2.0, 18.0, 20.0), &rest, &params).unwrap();
        // diverged or not, every recorded sample honours the bounds
        for sample in &result.samples {
            prop_assert!(sample.state.gates_in_unit_interval());
        }
    }
}

#[test]
fn repeated_runs_are_identical() {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();
    let stimulus = Stimulus::Sum(vec![
        Stimulus::step(5.0, 45.0, 8.0),
        Stimulus::Noise {
            mean: 0.0,
            amplitude: 2.0,
            correlation: 0.5,
            seed: 7,
        },
    ]);
    for method in [IntegrationMethod::ExponentialEuler, IntegrationMethod::adaptive()] {
        let params = SimulationParams::new(0.0, 50.0, 0.01).unwrap().with_method(method);
        let first = simulate(&model, &stimulus, &rest, &params).unwrap();
        let second = simulate(&model, &stimulus, &rest, &params).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn configuration_errors_prevent_the_run() {
    let model = MembraneModel::hodgkin_huxley();
    let rest = model.resting_state().unwrap();

    let err = SimulationParams::new(10.0, 10.0, 0.01).unwrap_err();
    assert!(err.is_configuration());

    let bad_params = SimulationParams {
        t1: -1.0,
        ..SimulationParams::default()
    };
    let err = Simulation::new(model.clone(), Stimulus::Zero, rest.clone(), bad_params).unwrap_err();
    assert!(err.is_configuration());

    let err = Simulation::new(
        model,
        Stimulus::step(10.0, 5.0, 1.0),
        rest,
        SimulationParams::default(),
    )
    .unwrap_err();
    assert!(err.is_configuration());

    let registry = ChannelRegistry::new().with_species(ChannelSpecies::leak("leak", 0.0, -54.4));
    assert!(matches!(
        MembraneModel::new(1.0, registry),
        Err(SimError::InvalidParameter { .. })
    ));

    let registry = ChannelRegistry::new().with_species(ChannelSpecies::hodgkin_huxley_na("na", -120.0, 50.0));
    assert!(MembraneModel::new(1.0, registry).unwrap_err().is_configuration());
}
