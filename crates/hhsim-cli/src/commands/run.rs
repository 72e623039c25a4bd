//! Single experiment run

use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use hhsim_core::SpikeDetector;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::experiment::Experiment;
use crate::output::{with_output, write_result, OutputFormat};

/// Run one experiment and write its time series
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Experiment file (.toml)
    pub experiment: PathBuf,

    /// Output file (stdout when neither this nor [output].path is set)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Override the step size (ms)
    #[arg(long)]
    pub dt: Option<f64>,

    /// Override the end time (ms)
    #[arg(long)]
    pub t1: Option<f64>,

    /// Override the integration method
    #[arg(long)]
    pub method: Option<String>,
}

impl RunCommand {
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        info!("Loading experiment {}", self.experiment.display());
        let mut experiment = Experiment::load(&self.experiment)?;
        if let Some(dt) = self.dt {
            experiment.simulation.dt = dt;
        }
        if let Some(t1) = self.t1 {
            experiment.simulation.t1 = t1;
        }
        if let Some(method) = &self.method {
            experiment.simulation.method = method.clone();
        }

        let run = experiment.run_config()?;
        let result = run.run()?;

        let (path, format) = self.destination(&experiment, config);
        with_output(path.as_deref(), |out| write_result(out, &result, format))?;
        if let Some(p) = &path {
            info!("Wrote {} samples to {}", result.len(), p.display());
        }

        let threshold = experiment
            .output
            .spike_threshold_mv
            .unwrap_or(config.preferences.spike_threshold_mv);
        let train = SpikeDetector::new(threshold).spike_train(&result);
        info!(
            "{} steps, {} spikes ({}), {:.1} Hz",
            result.steps_executed,
            train.count(),
            train.pattern(),
            train.mean_rate_hz()
        );
        if result.clamp_events > 0 {
            info!("{} gating values clamped to [0, 1]", result.clamp_events);
        }

        match result.outcome.to_error() {
            None => Ok(()),
            Some(err) => {
                warn!("Partial series written up to t = {:?} ms", result.end_time());
                Err(CliError::RunTerminated {
                    phase: result.outcome.phase().to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    fn destination(&self, experiment: &Experiment, config: &CliConfig) -> (Option<PathBuf>, OutputFormat) {
        let from_file = experiment.output.path.as_ref().map(|p| relative_to(&self.experiment, p));
        let format = self
            .format
            .or_else(|| self.output.as_deref().and_then(OutputFormat::from_path))
            .or(experiment.output.format)
            .or_else(|| from_file.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(config.preferences.output_format);
        (self.output.clone().or(from_file), format)
    }
}

/// Resolve `path` against the directory holding `experiment`
pub(crate) fn relative_to(experiment: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match experiment.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}
