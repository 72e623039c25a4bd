//! Post-run analysis: spike detection, firing patterns and the passive RC reference

use crate::error::{Result, SimError};
use crate::simulation::SimulationResult;

/// Threshold detector with re-arming hysteresis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpikeDetector {
    /// Upward crossing of this potential marks a spike (mV)
    pub threshold_mv: f64,
    /// The detector re-arms once V_m falls below this potential (mV)
    pub rearm_mv: f64,
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(crate::DEFAULT_SPIKE_THRESHOLD_MV)
    }
}

impl SpikeDetector {
    /// Detector that re-arms at its own threshold
    pub fn new(threshold_mv: f64) -> Self {
        Self {
            threshold_mv,
            rearm_mv: threshold_mv,
        }
    }

    /// Re-arm only below `rearm_mv`; must not exceed the threshold
    pub fn with_rearm(mut self, rearm_mv: f64) -> Result<Self> {
        if !(rearm_mv.is_finite() && rearm_mv <= self.threshold_mv) {
            return Err(SimError::invalid_parameter(
                "rearm_mv",
                rearm_mv.to_string(),
                format!("<= threshold ({})", self.threshold_mv),
            ));
        }
        self.rearm_mv = rearm_mv;
        Ok(self)
    }

    /// Spike times from a sampled trace, linearly interpolated between samples
    ///
    /// A trace that starts above threshold is not counted until it has
    /// dropped below the re-arm level.
    pub fn detect(&self, times: &[f64], voltages: &[f64]) -> Vec<f64> {
        let mut spikes = Vec::new();
        let mut armed = voltages.first().map_or(true, |&v| v < self.rearm_mv);
        for i in 1..times.len().min(voltages.len()) {
            let (v0, v1) = (voltages[i - 1], voltages[i]);
            if armed && v1 >= self.threshold_mv {
                let (t0, t1) = (times[i - 1], times[i]);
                let t = if v1 > v0 {
                    let frac = ((self.threshold_mv - v0) / (v1 - v0)).clamp(0.0, 1.0);
                    t0 + frac * (t1 - t0)
                } else {
                    t1
                };
                spikes.push(t);
                armed = false;
            } else if !armed && v1 < self.rearm_mv {
                armed = true;
            }
        }
        spikes
    }

    /// Spike train of a whole run
    pub fn spike_train(&self, result: &SimulationResult) -> SpikeTrain {
        let times = result.times();
        let voltages = result.voltages();
        let start = times.first().copied().unwrap_or(0.0);
        let end = times.last().copied().unwrap_or(start);
        SpikeTrain::new(self.detect(&times, &voltages), start, end)
    }
}

/// Qualitative response of a membrane to a stimulus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FiringPattern {
    /// No spikes
    Quiescent,
    /// Exactly one action potential
    SingleSpike,
    /// A finite train that stops well before the end of the window
    Phasic,
    /// Repetitive spiking sustained to the end of the window
    Tonic,
}

impl std::fmt::Display for FiringPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Quiescent => "quiescent",
            Self::SingleSpike => "single",
            Self::Phasic => "phasic",
            Self::Tonic => "tonic",
        };
        write!(f, "{}", name)
    }
}

/// Spike times observed over an analysis window
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpikeTrain {
    /// Spike times (ms), increasing
    pub times: Vec<f64>,
    /// Window start (ms)
    pub start: f64,
    /// Window end (ms)
    pub end: f64,
}

impl SpikeTrain {
    /// Spikes inside `[start, end]`; times outside the window are dropped
    pub fn new(mut times: Vec<f64>, start: f64, end: f64) -> Self {
        times.retain(|&t| t >= start && t <= end);
        Self { times, start, end }
    }

    /// Restrict to spikes inside `[start, end]`
    pub fn window(&self, start: f64, end: f64) -> Self {
        Self::new(self.times.clone(), start, end)
    }

    /// Number of spikes
    pub fn count(&self) -> usize {
        self.times.len()
    }

    /// Inter-spike intervals (ms)
    pub fn intervals(&self) -> Vec<f64> {
        self.times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Mean inter-spike interval (ms)
    pub fn mean_interval(&self) -> Option<f64> {
        let isis = self.intervals();
        if isis.is_empty() {
            None
        } else {
            Some(isis.iter().sum::<f64>() / isis.len() as f64)
        }
    }

    /// Spikes per second over the window
    pub fn mean_rate_hz(&self) -> f64 {
        let duration_s = (self.end - self.start) / 1000.0;
        if duration_s > 0.0 {
            self.count() as f64 / duration_s
        } else {
            0.0
        }
    }

    /// Classify the train
    ///
    /// Two or more spikes count as tonic when the silence after the last
    /// spike is no longer than twice the longest inter-spike interval.
    pub fn pattern(&self) -> FiringPattern {
        match self.count() {
            0 => FiringPattern::Quiescent,
            1 => FiringPattern::SingleSpike,
            _ => {
                let max_isi = self.intervals().into_iter().fold(0.0, f64::max);
                let last = self.times[self.times.len() - 1];
                if self.end - last <= 2.0 * max_isi {
                    FiringPattern::Tonic
                } else {
                    FiringPattern::Phasic
                }
            }
        }
    }
}

/// Closed-form response of a single-leak membrane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassiveMembrane {
    c_m: f64,
    g_leak: f64,
    e_leak: f64,
}

impl PassiveMembrane {
    /// Create a validated RC membrane
    pub fn new(c_m: f64, g_leak: f64, e_leak: f64) -> Result<Self> {
        if !(c_m.is_finite() && c_m > 0.0) {
            return Err(SimError::invalid_parameter("c_m", c_m.to_string(), "> 0.0"));
        }
        if !(g_leak.is_finite() && g_leak > 0.0) {
            return Err(SimError::invalid_parameter("g_leak", g_leak.to_string(), "> 0.0"));
        }
        if !e_leak.is_finite() {
            return Err(SimError::invalid_parameter("e_leak", e_leak.to_string(), "finite"));
        }
        Ok(Self { c_m, g_leak, e_leak })
    }

    /// τ = C_m / g_leak (ms)
    pub fn tau(&self) -> f64 {
        self.c_m / self.g_leak
    }

    /// Asymptote under constant current `i`
    pub fn v_inf(&self, i: f64) -> f64 {
        self.e_leak + i / self.g_leak
    }

    /// Potential `dt` after starting at `v` under constant current `i`
    pub fn relax(&self, v: f64, i: f64, dt: f64) -> f64 {
        let v_inf = self.v_inf(i);
        v_inf + (v - v_inf) * (-dt / self.tau()).exp()
    }

    /// Potential at `t` for a rectangular pulse on `[onset, offset)`,
    /// starting from `v0` at `t0`
    pub fn step_response(&self, v0: f64, t0: f64, onset: f64, offset: f64, amplitude: f64, t: f64) -> f64 {
        let segments = [(t0, onset, 0.0), (onset, offset, amplitude), (offset, f64::INFINITY, 0.0)];
        let mut v = v0;
        let mut cursor = t0;
        for (start, end, i) in segments {
            let from = start.max(cursor);
            let to = end.min(t);
            if to > from {
                v = self.relax(v, i, to - from);
                cursor = to;
            }
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_interpolates_crossing() {
        let detector = SpikeDetector::new(0.0);
        let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let volts = [-60.0, -20.0, 20.0, -70.0, 10.0, 30.0];
        let spikes = detector.detect(&times, &volts);
        assert_eq!(spikes.len(), 2);
        assert!((spikes[0] - 1.5).abs() < 1e-12);
        assert!((spikes[1] - (3.0 + 70.0 / 80.0)).abs() < 1e-12);
    }

    #[test]
    fn test_hysteresis_suppresses_chatter() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let volts = [-60.0, 5.0, -5.0, 5.0, -60.0];
        assert_eq!(SpikeDetector::new(0.0).detect(&times, &volts).len(), 2);
        let sticky = SpikeDetector::new(0.0).with_rearm(-30.0).unwrap();
        assert_eq!(sticky.detect(&times, &volts).len(), 1);
        assert!(SpikeDetector::new(0.0).with_rearm(10.0).is_err());
    }

    #[test]
    fn test_trace_starting_above_threshold() {
        let detector = SpikeDetector::default();
        let spikes = detector.detect(&[0.0, 1.0, 2.0, 3.0], &[20.0, -70.0, 10.0, -70.0]);
        assert_eq!(spikes.len(), 1);
    }

    #[test]
    fn test_pattern_classification() {
        assert_eq!(SpikeTrain::new(vec![], 0.0, 100.0).pattern(), FiringPattern::Quiescent);
        assert_eq!(SpikeTrain::new(vec![12.0], 0.0, 100.0).pattern(), FiringPattern::SingleSpike);
        let phasic = SpikeTrain::new(vec![10.0, 20.0, 30.0], 0.0, 100.0);
        assert_eq!(phasic.pattern(), FiringPattern::Phasic);
        let tonic = SpikeTrain::new(vec![10.0, 25.0, 40.0, 55.0, 70.0, 85.0], 0.0, 100.0);
        assert_eq!(tonic.pattern(), FiringPattern::Tonic);
        assert_eq!(tonic.mean_interval(), Some(15.0));
        assert!((tonic.mean_rate_hz() - 60.0).abs() < 1e-9);
        assert_eq!(tonic.window(20.0, 60.0).count(), 3);
    }

    #[test]
    fn test_train_keeps_only_window() {
        let train = SpikeTrain::new(vec![1.0, 10.0, 20.0, 30.0], 5.0, 20.0);
        assert_eq!(train.times, vec![10.0, 20.0]);
        assert_eq!(train.window(15.0, 40.0).times, vec![20.0]);
        assert!((train.mean_rate_hz() - 2.0 / 0.015).abs() < 1e-9);
    }

    #[test]
    fn test_passive_membrane_step_response() {
        let rc = PassiveMembrane::new(1.0, 0.3, -54.4).unwrap();
        assert!((rc.tau() - 1.0 / 0.3).abs() < 1e-12);
        assert_eq!(rc.step_response(-54.4, 0.0, 5.0, 15.0, 10.0, 4.0), -54.4);
        let v_inf = rc.v_inf(10.0);
        let at_end = rc.step_response(-54.4, 0.0, 5.0, 15.0, 10.0, 15.0);
        let expected = v_inf + (-54.4 - v_inf) * (-10.0 / rc.tau()).exp();
        assert!((at_end - expected).abs() < 1e-12);
        let later = rc.step_response(-54.4, 0.0, 5.0, 15.0, 10.0, 20.0);
        assert!(later < at_end && later > -54.4);
        assert!(PassiveMembrane::new(1.0, 0.0, -54.4).is_err());
    }
}
