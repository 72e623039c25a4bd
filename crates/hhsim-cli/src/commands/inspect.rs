//! Print what an experiment file resolves to

use clap::Args;
use std::path::PathBuf;

use hhsim_core::{ChannelKind, MembraneModel};

use crate::error::CliResult;
use crate::experiment::Experiment;

/// Describe an experiment without running it
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Experiment file (.toml)
    pub experiment: PathBuf,

    /// Tabulate x∞ and τ of every gate across the operating domain
    #[arg(long)]
    pub rates: bool,
}

impl InspectCommand {
    pub fn execute(self) -> CliResult<()> {
        let experiment = Experiment::load(&self.experiment)?;
        let model = experiment.model()?;
        let registry = model.registry();
        let domain = registry.domain();

        println!("Experiment: {}", experiment.name.as_deref().unwrap_or("(unnamed)"));
        println!("  C_m:     {} µF/cm²", model.capacitance());
        println!("  Domain:  [{}, {}] mV ({:?})", domain.min_mv, domain.max_mv, registry.policy());
        println!();
        println!("  {:<10} {:<10} {:>9} {:>9} {:>3} {:>3}  gates", "species", "kind", "g_max", "e_rev", "p", "q");
        for species in registry.species() {
            println!(
                "  {:<10} {:<10} {:>9.3} {:>9.3} {:>3} {:>3}  {}",
                species.id(),
                kind_name(species.kind()),
                species.max_conductance(),
                species.reversal_potential(),
                species.activation_exponent(),
                species.inactivation_exponent(),
                species.gate_names().join(",")
            );
        }
        println!();

        match model.resting_state() {
            Ok(rest) => println!("  Resting potential: {:.3} mV", rest.v_m),
            Err(_) => println!("  Resting potential: none within the domain"),
        }
        let initial = experiment.initial_state(&model)?;
        println!("  Initial potential: {:.3} mV", initial.v_m);
        println!("  Stimulus: {:?}", experiment.stimulus);

        let params = experiment.params()?;
        println!(
            "  Simulation: [{}, {}] ms, dt {} ms, {} ({} steps)",
            params.t0,
            params.t1,
            params.dt,
            params.method,
            params.num_steps()
        );

        if self.rates {
            println!();
            print_rates(&model);
        }
        Ok(())
    }
}

fn kind_name(kind: &ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Leak => "leak",
        ChannelKind::HodgkinHuxleyNa => "hh_na",
        ChannelKind::HodgkinHuxleyK => "hh_k",
        ChannelKind::Custom { .. } => "custom",
    }
}

fn print_rates(model: &MembraneModel) {
    let registry = model.registry();
    let domain = registry.domain();
    let step = ((domain.max_mv - domain.min_mv) / 8.0).max(1.0);

    for (idx, species) in registry.species().iter().enumerate() {
        for (gate, name) in species.gate_names().iter().enumerate() {
            println!("  {}.{}", species.id(), name);
            println!("    {:>8} {:>10} {:>10}", "V (mV)", "x_inf", "tau (ms)");
            for v in domain.grid(step) {
                match registry.gate_rates(idx, gate, v) {
                    Ok(r) => println!("    {:>8.1} {:>10.5} {:>10.4}", v, r.x_inf, r.tau),
                    Err(e) => println!("    {:>8.1} {}", v, e),
                }
            }
        }
    }
}
