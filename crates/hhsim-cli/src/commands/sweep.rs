//! Amplitude sweeps producing f-I tables

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, warn};

use hhsim_core::sweep::run_batch_with;
use hhsim_core::{amplitude_sweep, FiPoint, RunPhase, SpikeDetector, Stimulus};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::experiment::Experiment;
use crate::output::{with_output, write_fi_curve, OutputFormat};

/// Sweep step amplitudes and write an f-I table
#[derive(Args, Debug)]
pub struct SweepCommand {
    /// Experiment file (.toml); its stimulus is replaced by the swept step
    pub experiment: PathBuf,

    /// Explicit amplitudes (µA/cm²), comma separated
    #[arg(
        long,
        value_delimiter = ',',
        num_args = 1..,
        allow_negative_numbers = true,
        conflicts_with_all = ["from", "to", "steps"]
    )]
    pub amplitudes: Vec<f64>,

    /// First amplitude of an evenly spaced range
    #[arg(long, requires_all = ["to", "steps"], allow_negative_numbers = true)]
    pub from: Option<f64>,

    /// Last amplitude of the range
    #[arg(long, requires_all = ["from", "steps"], allow_negative_numbers = true)]
    pub to: Option<f64>,

    /// Number of amplitudes in the range
    #[arg(long, requires_all = ["from", "to"])]
    pub steps: Option<usize>,

    /// Step onset (ms); defaults to the experiment's step stimulus
    #[arg(long)]
    pub onset: Option<f64>,

    /// Step offset (ms); defaults to the experiment's step stimulus
    #[arg(long)]
    pub offset: Option<f64>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl SweepCommand {
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        let amplitudes = self.amplitudes()?;
        let experiment = Experiment::load(&self.experiment)?;
        let (onset, offset) = self.window(&experiment.stimulus)?;
        let base = experiment.run_config()?;
        info!(
            "Sweeping {} amplitudes on [{}, {}) ms",
            amplitudes.len(),
            onset,
            offset
        );

        let configs = amplitude_sweep(&base.model, &base.initial, &base.params, onset, offset, &amplitudes);
        let progress = if config.preferences.show_progress {
            let bar = ProgressBar::new(configs.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} runs")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let results = match self.jobs.or(config.default_jobs) {
            Some(0) => return Err(CliError::invalid_args("--jobs must be at least 1")),
            Some(jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build()
                    .map_err(|e| CliError::Generic(anyhow::anyhow!(e)))?;
                pool.install(|| run_batch_with(&configs, || progress.inc(1)))
            }
            None => run_batch_with(&configs, || progress.inc(1)),
        };
        progress.finish_and_clear();

        let threshold = experiment
            .output
            .spike_threshold_mv
            .unwrap_or(config.preferences.spike_threshold_mv);
        let detector = SpikeDetector::new(threshold);
        let points = results
            .into_iter()
            .zip(&amplitudes)
            .map(|(result, &amplitude)| {
                result.map(|r| FiPoint::from_result(amplitude, &r, &detector, onset, offset))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let failed = points.iter().filter(|p| p.phase != RunPhase::Completed).count();
        if failed > 0 {
            warn!("{} of {} runs ended before the horizon", failed, points.len());
        }

        let format = self
            .format
            .or_else(|| self.output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(config.preferences.output_format);
        with_output(self.output.as_deref(), |out| write_fi_curve(out, &points, format))?;
        Ok(())
    }

    fn amplitudes(&self) -> CliResult<Vec<f64>> {
        if !self.amplitudes.is_empty() {
            return Ok(self.amplitudes.clone());
        }
        match (self.from, self.to, self.steps) {
            (Some(from), Some(_), Some(1)) => Ok(vec![from]),
            (Some(from), Some(to), Some(n)) if n > 1 => {
                let step = (to - from) / (n - 1) as f64;
                Ok((0..n).map(|i| from + step * i as f64).collect())
            }
            (Some(_), Some(_), Some(_)) => Err(CliError::invalid_args("--steps must be at least 1")),
            _ => Err(CliError::invalid_args(
                "give either --amplitudes or --from, --to and --steps",
            )),
        }
    }

    fn window(&self, stimulus: &Stimulus) -> CliResult<(f64, f64)> {
        let (onset, offset) = match stimulus {
            Stimulus::Step { onset, offset, .. } => (Some(*onset), Some(*offset)),
            _ => (None, None),
        };
        match (self.onset.or(onset), self.offset.or(offset)) {
            (Some(on), Some(off)) => Ok((on, off)),
            _ => Err(CliError::invalid_args(
                "the experiment has no step stimulus; pass --onset and --offset",
            )),
        }
    }
}
