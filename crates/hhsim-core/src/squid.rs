//! Hodgkin & Huxley (1952) squid giant axon parameters
//!
//! Voltages follow the modern convention with the resting potential near
//! -65 mV rather than the original 0 mV reference. Units: mV, ms, µF/cm²,
//! mS/cm², µA/cm².

use crate::channel::{exponential, linoid, sigmoid, Gate, RateFunction};

/// Membrane capacitance (µF/cm²)
pub const C_M: f64 = 1.0;
/// Maximal sodium conductance (mS/cm²)
pub const G_NA: f64 = 120.0;
/// Maximal potassium conductance (mS/cm²)
pub const G_K: f64 = 36.0;
/// Leak conductance (mS/cm²)
pub const G_L: f64 = 0.3;
/// Sodium reversal potential (mV)
pub const E_NA: f64 = 50.0;
/// Potassium reversal potential (mV)
pub const E_K: f64 = -77.0;
/// Leak reversal potential (mV), chosen so that rest sits at about -65 mV
pub const E_L: f64 = -54.387;

/// Sodium activation opening rate
#[inline]
pub fn alpha_m(v: f64) -> f64 {
    linoid(0.1, -40.0, 10.0, v)
}

/// Sodium activation closing rate
#[inline]
pub fn beta_m(v: f64) -> f64 {
    exponential(4.0, -65.0, -18.0, v)
}

/// Sodium inactivation opening rate
#[inline]
pub fn alpha_h(v: f64) -> f64 {
    exponential(0.07, -65.0, -20.0, v)
}

/// Sodium inactivation closing rate
#[inline]
pub fn beta_h(v: f64) -> f64 {
    sigmoid(1.0, -35.0, 10.0, v)
}

/// Potassium activation opening rate
#[inline]
pub fn alpha_n(v: f64) -> f64 {
    linoid(0.01, -55.0, 10.0, v)
}

/// Potassium activation closing rate
#[inline]
pub fn beta_n(v: f64) -> f64 {
    exponential(0.125, -65.0, -80.0, v)
}

/// The `m` gate as a parametric [`Gate`], for building modified channels
pub fn m_gate() -> Gate {
    Gate::alpha_beta(
        "m",
        RateFunction::Linoid { rate: 0.1, v_half: -40.0, slope: 10.0 },
        RateFunction::Exponential { rate: 4.0, v_half: -65.0, slope: -18.0 },
    )
}

/// The `h` gate as a parametric [`Gate`]
pub fn h_gate() -> Gate {
    Gate::alpha_beta(
        "h",
        RateFunction::Exponential { rate: 0.07, v_half: -65.0, slope: -20.0 },
        RateFunction::Sigmoid { rate: 1.0, v_half: -35.0, slope: 10.0 },
    )
}

/// The `n` gate as a parametric [`Gate`]
pub fn n_gate() -> Gate {
    Gate::alpha_beta(
        "n",
        RateFunction::Linoid { rate: 0.01, v_half: -55.0, slope: 10.0 },
        RateFunction::Exponential { rate: 0.125, v_half: -65.0, slope: -80.0 },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_gates_match_builtin_rates() {
        for v in [-100.0, -65.0, -40.0, -35.0, 0.0, 60.0] {
            let m = m_gate();
            let h = h_gate();
            let n = n_gate();
            if let crate::channel::GateKinetics::AlphaBeta { alpha, beta } = &m.kinetics {
                assert_eq!(alpha.eval(v), alpha_m(v));
                assert_eq!(beta.eval(v), beta_m(v));
            }
            if let crate::channel::GateKinetics::AlphaBeta { alpha, beta } = &h.kinetics {
                assert_eq!(alpha.eval(v), alpha_h(v));
                assert_eq!(beta.eval(v), beta_h(v));
            }
            if let crate::channel::GateKinetics::AlphaBeta { alpha, beta } = &n.kinetics {
                assert_eq!(alpha.eval(v), alpha_n(v));
                assert_eq!(beta.eval(v), beta_n(v));
            }
        }
    }

    #[test]
    fn test_textbook_values_at_rest() {
        // α_m(-65) = 0.1 · 25 / (1 - e^-2.5)
        let expected = 2.5 / (1.0 - (-2.5f64).exp());
        assert!((alpha_m(-65.0) - expected).abs() < 1e-12);
        assert!((beta_n(-65.0) - 0.125).abs() < 1e-12);
        assert!((alpha_h(-65.0) - 0.07).abs() < 1e-12);
    }
}
