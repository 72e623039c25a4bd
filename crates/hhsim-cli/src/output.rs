//! Writing results as CSV or JSON

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use hhsim_core::{FiPoint, SimulationResult};

use crate::error::CliResult;

/// Output file format
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated table, one row per sample
    Csv,
    /// Full result as pretty-printed JSON
    Json,
}

impl OutputFormat {
    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Write the time series of `result`
pub fn write_result<W: Write + ?Sized>(out: &mut W, result: &SimulationResult, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Csv => {
            let mut header = vec!["time_ms".to_string(), "v_mv".to_string()];
            for (species, gates) in result.species.iter().zip(result.gate_names.iter()) {
                header.extend(gates.iter().map(|g| format!("{}.{}", species, g)));
            }
            writeln!(out, "{}", header.join(","))?;
            for sample in &result.samples {
                write!(out, "{},{}", sample.time, sample.state.v_m)?;
                for x in sample.state.gates() {
                    write!(out, ",{}", x)?;
                }
                writeln!(out)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Write an f–I table
pub fn write_fi_curve<W: Write + ?Sized>(out: &mut W, points: &[FiPoint], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Csv => {
            writeln!(out, "amplitude,spike_count,rate_hz,pattern,phase")?;
            for p in points {
                writeln!(
                    out,
                    "{},{},{},{},{}",
                    p.amplitude, p.spike_count, p.rate_hz, p.pattern, p.phase
                )?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, points)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Run `write` against a file, or stdout when no path is given
pub fn with_output<F>(path: Option<&Path>, write: F) -> CliResult<()>
where
    F: FnOnce(&mut dyn Write) -> CliResult<()>,
{
    match path {
        Some(p) => {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::io::BufWriter::new(std::fs::File::create(p)?);
            write(&mut file)?;
            file.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write(&mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}
