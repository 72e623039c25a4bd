//! Membrane state and the right-hand side of the model ODE
//!
//! `C_m dV/dt = -(Σ_j g_j(V)(V - E_j) - I_inj(t))`, and every gating
//! variable relaxes as `dx/dt = (x∞(V) - x) / τ(V)`.

use smallvec::SmallVec;

use crate::channel::GateValues;
use crate::error::{Result, SimError};
use crate::registry::ChannelRegistry;
use crate::squid;
use crate::stimulus::Stimulus;

/// Grid used when scanning for fixed points (mV)
const FIXED_POINT_SCAN_STEP: f64 = 0.5;
/// Bisection stops once the bracket is narrower than this (mV)
const FIXED_POINT_TOLERANCE: f64 = 1e-10;

/// Membrane potential plus one tuple of gating variables per species
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MembraneState {
    /// Membrane potential (mV)
    pub v_m: f64,
    /// Gating variables, indexed like the registry's species
    pub gating: Vec<GateValues>,
}

impl MembraneState {
    /// Create a state from its parts
    pub fn new(v_m: f64, gating: Vec<GateValues>) -> Self {
        Self { v_m, gating }
    }

    /// Gate `gate` of species `species`
    pub fn gate(&self, species: usize, gate: usize) -> Option<f64> {
        self.gating.get(species).and_then(|g| g.get(gate)).copied()
    }

    /// All gating variables in state order
    pub fn gates(&self) -> impl Iterator<Item = f64> + '_ {
        self.gating.iter().flat_map(|g| g.iter().copied())
    }

    /// Whether every gating variable lies in [0, 1]
    pub fn gates_in_unit_interval(&self) -> bool {
        self.gates().all(|x| (0.0..=1.0).contains(&x))
    }

    /// Whether the potential and every gate are finite
    pub fn is_finite(&self) -> bool {
        self.v_m.is_finite() && self.gates().all(f64::is_finite)
    }

    /// Pull gating variables back into [0, 1]; returns how many were moved
    pub fn clamp_gates(&mut self) -> usize {
        let mut clamped = 0;
        for x in self.gating.iter_mut().flat_map(|g| g.iter_mut()) {
            if *x < 0.0 {
                *x = 0.0;
                clamped += 1;
            } else if *x > 1.0 {
                *x = 1.0;
                clamped += 1;
            }
        }
        clamped
    }

    /// `self + Σ c_i · k_i`
    pub(crate) fn advanced(&self, terms: &[(f64, &StateDerivative)]) -> MembraneState {
        let mut next = self.clone();
        for (c, k) in terms {
            next.v_m += c * k.dv_dt;
            for (xs, dxs) in next.gating.iter_mut().zip(k.gating.iter()) {
                for (x, dx) in xs.iter_mut().zip(dxs.iter()) {
                    *x += c * dx;
                }
            }
        }
        next
    }
}

/// Time derivative of a [`MembraneState`]
#[derive(Debug, Clone, PartialEq)]
pub struct StateDerivative {
    /// dV/dt (mV/ms)
    pub dv_dt: f64,
    /// dx/dt for every gate (1/ms)
    pub gating: Vec<GateValues>,
}

/// Single-compartment membrane: capacitance plus channel species
#[derive(Debug, Clone)]
pub struct MembraneModel {
    c_m: f64,
    registry: ChannelRegistry,
}

impl MembraneModel {
    /// Create a validated model; capacitance in µF/cm²
    pub fn new(c_m: f64, registry: ChannelRegistry) -> Result<Self> {
        if !(c_m.is_finite() && c_m > 0.0) {
            return Err(SimError::invalid_parameter("c_m", c_m.to_string(), "> 0.0"));
        }
        registry.validate()?;
        Ok(Self { c_m, registry })
    }

    /// Squid giant axon with the 1952 parameters
    pub fn hodgkin_huxley() -> Self {
        Self {
            c_m: squid::C_M,
            registry: ChannelRegistry::hodgkin_huxley(),
        }
    }

    /// RC membrane with a single leak
    pub fn passive(c_m: f64, g_leak: f64, e_leak: f64) -> Result<Self> {
        Self::new(c_m, ChannelRegistry::passive(g_leak, e_leak))
    }

    /// Membrane capacitance (µF/cm²)
    pub fn capacitance(&self) -> f64 {
        self.c_m
    }

    /// Channel species
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Species ids in state order
    pub fn species_ids(&self) -> Vec<String> {
        self.registry.species().iter().map(|s| s.id().to_string()).collect()
    }

    /// Gate labels per species in state order
    pub fn gate_names(&self) -> Vec<SmallVec<[String; 2]>> {
        self.registry.species().iter().map(|s| s.gate_names()).collect()
    }

    /// State at potential `v` with every gate at its steady state
    pub fn steady_state(&self, v: f64) -> Result<MembraneState> {
        let gating = self
            .registry
            .species()
            .iter()
            .enumerate()
            .map(|(idx, species)| {
                (0..species.gate_count())
                    .map(|gate| {
                        self.registry
                            .gate_rates(idx, gate, v)
                            .map(|r| r.x_inf.clamp(0.0, 1.0))
                    })
                    .collect::<Result<GateValues>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MembraneState::new(v, gating))
    }

    /// Σ_j g_j (V - E_j) (µA/cm²)
    pub fn ionic_current(&self, state: &MembraneState) -> f64 {
        self.registry
            .species()
            .iter()
            .zip(state.gating.iter())
            .map(|(species, gates)| species.current(state.v_m, gates))
            .sum()
    }

    /// I_m = Σ_j g_j (V - E_j) - I_inj
    pub fn membrane_current(&self, state: &MembraneState, i_inj: f64) -> f64 {
        self.ionic_current(state) - i_inj
    }

    /// Total conductance G and the weighted reversal sum Σ g_j E_j
    pub fn conductance_sums(&self, state: &MembraneState) -> (f64, f64) {
        self.registry
            .species()
            .iter()
            .zip(state.gating.iter())
            .fold((0.0, 0.0), |(g_sum, ge_sum), (species, gates)| {
                let g = species.conductance(gates);
                (g_sum + g, ge_sum + g * species.reversal_potential())
            })
    }

    /// Reject states whose layout does not match the registry
    pub fn check_layout(&self, state: &MembraneState) -> Result<()> {
        if state.gating.len() != self.registry.len() {
            return Err(SimError::invalid_config(format!(
                "state carries {} species, model has {}",
                state.gating.len(),
                self.registry.len()
            )));
        }
        for (species, gates) in self.registry.species().iter().zip(state.gating.iter()) {
            if gates.len() != species.gate_count() {
                return Err(SimError::invalid_config(format!(
                    "species {} expects {} gates, state has {}",
                    species.id(),
                    species.gate_count(),
                    gates.len()
                )));
            }
        }
        Ok(())
    }

    /// Full check of an initial condition
    pub fn check_state(&self, state: &MembraneState) -> Result<()> {
        self.check_layout(state)?;
        if !state.v_m.is_finite() {
            return Err(SimError::invalid_parameter("v_m", state.v_m.to_string(), "finite"));
        }
        if let Some(x) = state.gates().find(|x| !(0.0..=1.0).contains(x)) {
            return Err(SimError::invalid_parameter("gating", x.to_string(), "within [0, 1]"));
        }
        Ok(())
    }

    /// Right-hand side of the ODE at `(state, t)`; pure
    pub fn derivative(&self, state: &MembraneState, t: f64, stimulus: &Stimulus) -> Result<StateDerivative> {
        self.check_layout(state)?;
        let i_inj = stimulus.current_at(t);
        let mut i_ion = 0.0;
        let mut gating = Vec::with_capacity(self.registry.len());
        for (idx, (species, gates)) in self.registry.species().iter().zip(state.gating.iter()).enumerate() {
            i_ion += species.current(state.v_m, gates);
            let mut d = GateValues::new();
            for (gate, &x) in gates.iter().enumerate() {
                let rates = self.registry.gate_rates(idx, gate, state.v_m)?;
                d.push(rates.derivative(x));
            }
            gating.push(d);
        }
        Ok(StateDerivative {
            dv_dt: -(i_ion - i_inj) / self.c_m,
            gating,
        })
    }

    /// Ionic current with every gate at its steady state for `v`
    pub fn steady_state_current(&self, v: f64) -> Result<f64> {
        Ok(self.ionic_current(&self.steady_state(v)?))
    }

    /// Fixed point under a constant holding current
    ///
    /// Scans the operating domain for a zero crossing of the steady-state
    /// I-V curve with positive slope and refines it by bisection. Such a
    /// point is stable for the reduced system with instantaneous gates. The
    /// full system may still be unstable there, e.g. a Hodgkin-Huxley
    /// membrane held above its repetitive-firing threshold.
    pub fn fixed_point(&self, i_hold: f64) -> Result<MembraneState> {
        let f = |v: f64| -> Result<f64> { Ok(self.steady_state_current(v)? - i_hold) };
        let domain = *self.registry.domain();
        let grid: Vec<f64> = domain.grid(FIXED_POINT_SCAN_STEP).collect();

        let mut f_lo = f(grid[0])?;
        for pair in grid.windows(2) {
            let f_hi = f(pair[1])?;
            let crosses = (f_lo < 0.0 && f_hi >= 0.0) || (f_lo == 0.0 && f_hi > 0.0);
            if crosses {
                let (mut lo, mut hi) = (pair[0], pair[1]);
                while hi - lo > FIXED_POINT_TOLERANCE {
                    let mid = 0.5 * (lo + hi);
                    if f(mid)? < 0.0 {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                let v = 0.5 * (lo + hi);
                log::debug!("Fixed point for I_hold = {} at {:.6} mV", i_hold, v);
                return self.steady_state(v);
            }
            f_lo = f_hi;
        }

        Err(SimError::invalid_config(format!(
            "no stable fixed point for I_hold = {} within [{}, {}] mV",
            i_hold, domain.min_mv, domain.max_mv
        )))
    }

    /// Resting state: the fixed point without injected current
    pub fn resting_state(&self) -> Result<MembraneState> {
        self.fixed_point(0.0)
    }
}
