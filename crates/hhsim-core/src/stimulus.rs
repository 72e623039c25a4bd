//! Injected-current protocols
//!
//! A protocol is a pure function of time. Integrators probe intermediate and
//! out-of-order times, so no protocol keeps state between calls.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SimError};

/// Caller-supplied current waveform, time (ms) to current (µA/cm²)
pub type WaveformFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Injected current I_inj(t) in µA/cm²
#[derive(Clone, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Stimulus {
    /// No injected current
    #[default]
    Zero,
    /// Holding current for the whole run
    Constant {
        /// Current (µA/cm²)
        amplitude: f64,
    },
    /// Rectangular pulse on `[onset, offset)`
    Step {
        /// Start time (ms)
        onset: f64,
        /// End time (ms), exclusive
        offset: f64,
        /// Current (µA/cm²)
        amplitude: f64,
    },
    /// Linear ramp from `from` to `to` on `[onset, offset)`, zero elsewhere
    Ramp {
        /// Start time (ms)
        onset: f64,
        /// End time (ms), exclusive
        offset: f64,
        /// Current at onset (µA/cm²)
        from: f64,
        /// Current reached at offset (µA/cm²)
        to: f64,
    },
    /// `count` rectangular pulses of `width` every `period`
    PulseTrain {
        /// Start of the first pulse (ms)
        onset: f64,
        /// Pulse width (ms)
        width: f64,
        /// Pulse period (ms)
        period: f64,
        /// Number of pulses
        count: u32,
        /// Current (µA/cm²)
        amplitude: f64,
    },
    /// Piecewise-linear table, held constant before the first and after the last point
    Sampled {
        /// Strictly increasing sample times (ms)
        times: Vec<f64>,
        /// Current at each sample time (µA/cm²)
        values: Vec<f64>,
    },
    /// Frozen uniform noise, piecewise constant over windows of `correlation` ms
    Noise {
        /// Mean current (µA/cm²)
        mean: f64,
        /// Half-width of the uniform distribution (µA/cm²)
        amplitude: f64,
        /// Window length (ms)
        correlation: f64,
        /// Seed; the same seed always yields the same waveform
        seed: u64,
    },
    /// Superposition of protocols
    Sum(Vec<Stimulus>),
    /// Arbitrary caller function
    #[cfg_attr(feature = "serde", serde(skip))]
    Waveform(WaveformFn),
}

impl Stimulus {
    /// Rectangular step of `amplitude` on `[onset, offset)`
    pub fn step(onset: f64, offset: f64, amplitude: f64) -> Self {
        Stimulus::Step {
            onset,
            offset,
            amplitude,
        }
    }

    /// Wrap a closure as a protocol
    pub fn waveform<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Stimulus::Waveform(Arc::new(f))
    }

    /// Injected current at time `t` (ms)
    pub fn current_at(&self, t: f64) -> f64 {
        match self {
            Stimulus::Zero => 0.0,
            Stimulus::Constant { amplitude } => *amplitude,
            Stimulus::Step {
                onset,
                offset,
                amplitude,
            } => {
                if t >= *onset && t < *offset {
                    *amplitude
                } else {
                    0.0
                }
            }
            Stimulus::Ramp {
                onset,
                offset,
                from,
                to,
            } => {
                if t >= *onset && t < *offset {
                    from + (to - from) * (t - onset) / (offset - onset)
                } else {
                    0.0
                }
            }
            Stimulus::PulseTrain {
                onset,
                width,
                period,
                count,
                amplitude,
            } => {
                if t < *onset {
                    return 0.0;
                }
                let since = t - onset;
                let index = (since / period).floor();
                if index >= *count as f64 {
                    return 0.0;
                }
                if since - index * period < *width {
                    *amplitude
                } else {
                    0.0
                }
            }
            Stimulus::Sampled { times, values } => interpolate(times, values, t),
            Stimulus::Noise {
                mean,
                amplitude,
                correlation,
                seed,
            } => {
                let window = (t / correlation).floor() as i64;
                let mut rng = ChaCha8Rng::seed_from_u64(noise_seed(*seed, window));
                mean + amplitude * rng.gen_range(-1.0..=1.0)
            }
            Stimulus::Sum(parts) => parts.iter().map(|p| p.current_at(t)).sum(),
            Stimulus::Waveform(f) => f(t),
        }
    }

    /// Check protocol parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Stimulus::Zero | Stimulus::Waveform(_) => Ok(()),
            Stimulus::Constant { amplitude } => finite("stimulus.amplitude", *amplitude),
            Stimulus::Step {
                onset,
                offset,
                amplitude,
            } => {
                finite("stimulus.onset", *onset)?;
                finite("stimulus.offset", *offset)?;
                finite("stimulus.amplitude", *amplitude)?;
                ordered(*onset, *offset)
            }
            Stimulus::Ramp {
                onset,
                offset,
                from,
                to,
            } => {
                finite("stimulus.onset", *onset)?;
                finite("stimulus.offset", *offset)?;
                finite("stimulus.from", *from)?;
                finite("stimulus.to", *to)?;
                ordered(*onset, *offset)
            }
            Stimulus::PulseTrain {
                onset,
                width,
                period,
                amplitude,
                ..
            } => {
                finite("stimulus.onset", *onset)?;
                finite("stimulus.amplitude", *amplitude)?;
                positive("stimulus.width", *width)?;
                positive("stimulus.period", *period)?;
                if width > period {
                    return Err(SimError::invalid_parameter(
                        "stimulus.width",
                        width.to_string(),
                        format!("<= period ({})", period),
                    ));
                }
                Ok(())
            }
            Stimulus::Sampled { times, values } => {
                if times.is_empty() || times.len() != values.len() {
                    return Err(SimError::invalid_config(format!(
                        "sampled stimulus needs matching, non-empty tables (times: {}, values: {})",
                        times.len(),
                        values.len()
                    )));
                }
                for v in times.iter().chain(values.iter()) {
                    finite("stimulus.sample", *v)?;
                }
                if times.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(SimError::invalid_config(
                        "sampled stimulus times must be strictly increasing",
                    ));
                }
                Ok(())
            }
            Stimulus::Noise {
                mean,
                amplitude,
                correlation,
                ..
            } => {
                finite("stimulus.mean", *mean)?;
                finite("stimulus.amplitude", *amplitude)?;
                positive("stimulus.correlation", *correlation)
            }
            Stimulus::Sum(parts) => parts.iter().try_for_each(Stimulus::validate),
        }
    }
}

fn interpolate(times: &[f64], values: &[f64], t: f64) -> f64 {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return 0.0;
    };
    if t <= first {
        return values[0];
    }
    if t >= last {
        return values[values.len() - 1];
    }
    // first index with times[i] > t; guaranteed in 1..len
    let i = times.partition_point(|&x| x <= t);
    let (t0, t1) = (times[i - 1], times[i]);
    let (v0, v1) = (values[i - 1], values[i]);
    v0 + (v1 - v0) * (t - t0) / (t1 - t0)
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(name, value.to_string(), "finite"))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(name, value.to_string(), "> 0.0"))
    }
}

fn ordered(onset: f64, offset: f64) -> Result<()> {
    if offset > onset {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(
            "stimulus.offset",
            offset.to_string(),
            format!("> onset ({})", onset),
        ))
    }
}

/// Per-window seed of the noise generator
fn noise_seed(seed: u64, window: i64) -> u64 {
    seed ^ (window as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl fmt::Debug for Stimulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stimulus::Zero => f.write_str("Zero"),
            Stimulus::Constant { amplitude } => f.debug_struct("Constant").field("amplitude", amplitude).finish(),
            Stimulus::Step {
                onset,
                offset,
                amplitude,
            } => f
                .debug_struct("Step")
                .field("onset", onset)
                .field("offset", offset)
                .field("amplitude", amplitude)
                .finish(),
            Stimulus::Ramp {
                onset,
                offset,
                from,
                to,
            } => f
                .debug_struct("Ramp")
                .field("onset", onset)
                .field("offset", offset)
                .field("from", from)
                .field("to", to)
                .finish(),
            Stimulus::PulseTrain {
                onset,
                width,
                period,
                count,
                amplitude,
            } => f
                .debug_struct("PulseTrain")
                .field("onset", onset)
                .field("width", width)
                .field("period", period)
                .field("count", count)
                .field("amplitude", amplitude)
                .finish(),
            Stimulus::Sampled { times, values } => f
                .debug_struct("Sampled")
                .field("points", &times.len())
                .field("values", &values.len())
                .finish(),
            Stimulus::Noise {
                mean,
                amplitude,
                correlation,
                seed,
            } => f
                .debug_struct("Noise")
                .field("mean", mean)
                .field("amplitude", amplitude)
                .field("correlation", correlation)
                .field("seed", seed)
                .finish(),
            Stimulus::Sum(parts) => f.debug_tuple("Sum").field(parts).finish(),
            Stimulus::Waveform(_) => f.write_str("Waveform(<fn>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_is_half_open() {
        let s = Stimulus::step(5.0, 15.0, 10.0);
        assert_eq!(s.current_at(4.999), 0.0);
        assert_eq!(s.current_at(5.0), 10.0);
        assert_eq!(s.current_at(14.999), 10.0);
        assert_eq!(s.current_at(15.0), 0.0);
        // out-of-order queries give the same answers
        assert_eq!(s.current_at(10.0), 10.0);
        assert_eq!(s.current_at(1.0), 0.0);
        assert!(s.validate().is_ok());
        assert!(Stimulus::step(5.0, 5.0, 1.0).validate().is_err());
    }

    #[test]
    fn test_ramp_and_pulse_train() {
        let ramp = Stimulus::Ramp { onset: 0.0, offset: 10.0, from: 0.0, to: 5.0 };
        assert!((ramp.current_at(4.0) - 2.0).abs() < 1e-12);
        assert_eq!(ramp.current_at(10.0), 0.0);

        let train = Stimulus::PulseTrain { onset: 1.0, width: 0.5, period: 2.0, count: 2, amplitude: 3.0 };
        assert_eq!(train.current_at(1.2), 3.0);
        assert_eq!(train.current_at(1.7), 0.0);
        assert_eq!(train.current_at(3.2), 3.0);
        assert_eq!(train.current_at(5.2), 0.0);
        assert!(train.validate().is_ok());
    }

    #[test]
    fn test_sampled_interpolation() {
        let s = Stimulus::Sampled { times: vec![0.0, 10.0, 20.0], values: vec![0.0, 10.0, 0.0] };
        assert!(s.validate().is_ok());
        assert_eq!(s.current_at(-1.0), 0.0);
        assert!((s.current_at(5.0) - 5.0).abs() < 1e-12);
        assert!((s.current_at(15.0) - 5.0).abs() < 1e-12);
        assert_eq!(s.current_at(10.0), 10.0);
        assert_eq!(s.current_at(25.0), 0.0);

        let bad = Stimulus::Sampled { times: vec![0.0, 0.0], values: vec![1.0, 2.0] };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_noise_is_frozen() {
        let s = Stimulus::Noise { mean: 1.0, amplitude: 0.5, correlation: 1.0, seed: 7 };
        let a = s.current_at(3.3);
        let _ = s.current_at(100.0);
        assert_eq!(a, s.current_at(3.7));
        assert!((0.5..=1.5).contains(&a));
    }

    #[test]
    fn test_noise_follows_seeded_chacha_stream() {
        let s = Stimulus::Noise { mean: 0.0, amplitude: 2.0, correlation: 0.5, seed: 42 };
        for (t, window) in [(0.1, 0), (0.7, 1), (12.26, 24), (-0.2, -1)] {
            let mut rng = ChaCha8Rng::seed_from_u64(noise_seed(42, window));
            let expected = 2.0 * rng.gen_range(-1.0..=1.0);
            assert_eq!(s.current_at(t), expected);
        }
        let other = Stimulus::Noise { mean: 0.0, amplitude: 2.0, correlation: 0.5, seed: 43 };
        assert_ne!(s.current_at(0.1), other.current_at(0.1));
    }

    #[test]
    fn test_sum_and_waveform() {
        let s = Stimulus::Sum(vec![
            Stimulus::Constant { amplitude: 1.0 },
            Stimulus::waveform(|t| t * 2.0),
        ]);
        assert!((s.current_at(3.0) - 7.0).abs() < 1e-12);
        assert!(s.validate().is_ok());
        assert_eq!(Stimulus::default().current_at(1.0), 0.0);
    }
}
