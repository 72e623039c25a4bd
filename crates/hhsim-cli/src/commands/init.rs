//! Template experiment files

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::error::{CliError, CliResult};

/// Passive RC membrane driven by a current step
pub const PASSIVE_TEMPLATE: &str = r#"# Passive RC membrane: one leak channel driven by a current step
name = "passive_rc"

[membrane]
c_m = 1.0             # µF/cm²

[[channel]]
id = "leak"
kind = "leak"
g_max = 0.3           # mS/cm²
e_rev = -54.4         # mV

[initial]
v_m = -54.4           # mV

[stimulus.step]
onset = 5.0           # ms
offset = 15.0         # ms, exclusive
amplitude = 10.0      # µA/cm²

[simulation]
t0 = 0.0
t1 = 20.0
dt = 0.01
method = "exponential_euler"

[output]
format = "csv"
path = "passive.csv"
"#;

/// Squid giant axon under a long current step
pub const HODGKIN_HUXLEY_TEMPLATE: &str = r#"# Hodgkin-Huxley squid giant axon (modern convention, rest near -65 mV)
name = "squid_axon"

[membrane]
c_m = 1.0             # µF/cm²

[[channel]]
id = "na"
kind = "hh_na"        # m^3 h
g_max = 120.0         # mS/cm²
e_rev = 50.0          # mV

[[channel]]
id = "k"
kind = "hh_k"         # n^4
g_max = 36.0
e_rev = -77.0

[[channel]]
id = "leak"
kind = "leak"
g_max = 0.3
e_rev = -54.387

# Gates can also be given explicitly:
#
# [[channel]]
# id = "kdr"
# kind = "custom"
# g_max = 36.0
# e_rev = -77.0
# p = 4
# [channel.activation]
# name = "n"
# [channel.activation.kinetics.alpha_beta]
# alpha = { linoid = { rate = 0.01, v_half = -55.0, slope = 10.0 } }
# beta = { exponential = { rate = 0.125, v_half = -65.0, slope = -80.0 } }

[domain]
min_mv = -100.0
max_mv = 60.0
policy = "abort"      # or "extrapolate"

# Empty: start from the resting state. Set v_m or i_hold to override.
[initial]

[stimulus.step]
onset = 5.0
offset = 95.0
amplitude = 10.0

[simulation]
t0 = 0.0
t1 = 100.0
dt = 0.01
method = "exponential_euler"   # euler, rk4, exponential_euler, adaptive
record_every = 10

[output]
format = "csv"
path = "hodgkin_huxley.csv"
spike_threshold_mv = 0.0
"#;

/// Write template experiment files
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Target directory (created if missing)
    pub dir: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn execute(self) -> CliResult<()> {
        info!("Writing experiment templates to {}", self.dir.display());
        std::fs::create_dir_all(&self.dir)?;

        let files = [
            ("passive.toml", PASSIVE_TEMPLATE),
            ("hodgkin_huxley.toml", HODGKIN_HUXLEY_TEMPLATE),
        ];
        for (name, _) in &files {
            let path = self.dir.join(name);
            if path.exists() && !self.force {
                return Err(CliError::invalid_args(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
        }
        for (name, content) in &files {
            std::fs::write(self.dir.join(name), content)?;
            info!("Created {}", name);
        }

        info!("Run 'hhsim run {}' to try it", self.dir.join("hodgkin_huxley.toml").display());
        Ok(())
    }
}
