//! TOML experiment files
//!
//! An experiment names the membrane, its channel species, the initial
//! condition, the stimulus and the integration settings. Everything is
//! checked before a run starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use hhsim_core::{
    ChannelRegistry, ChannelSpecies, DomainPolicy, Gate, IntegrationMethod, MembraneModel, MembraneState, RunConfig,
    SimError, SimulationParams, Stimulus, VoltageDomain,
};

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// A complete experiment description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
    /// Free-form label
    #[serde(default)]
    pub name: Option<String>,
    /// Capacitance and optional preset channel set
    #[serde(default)]
    pub membrane: MembraneSection,
    /// Channel species, in state order
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelSpec>,
    /// Operating voltage range of the rate laws
    #[serde(default)]
    pub domain: DomainSection,
    /// Initial condition
    #[serde(default)]
    pub initial: InitialSection,
    /// Injected current
    #[serde(default)]
    pub stimulus: Stimulus,
    /// Horizon and integration settings
    #[serde(default)]
    pub simulation: SimulationSection,
    /// Where and how to write results
    #[serde(default)]
    pub output: OutputSection,
}

/// `[membrane]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MembraneSection {
    /// Capacitance (µF/cm²)
    #[serde(default = "default_c_m")]
    pub c_m: f64,
    /// `hodgkin_huxley` fills in the squid-axon channels when no `[[channel]]` is given
    #[serde(default)]
    pub preset: Option<String>,
}

impl Default for MembraneSection {
    fn default() -> Self {
        Self {
            c_m: default_c_m(),
            preset: None,
        }
    }
}

fn default_c_m() -> f64 {
    hhsim_core::squid::C_M
}

/// `[[channel]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSpec {
    /// Unique species id
    pub id: String,
    /// `leak`, `hh_na`, `hh_k` or `custom`
    pub kind: String,
    /// Maximal conductance (mS/cm²)
    pub g_max: f64,
    /// Reversal potential (mV)
    pub e_rev: f64,
    /// Activation exponent; read as signed so negative values are reported, not truncated
    #[serde(default)]
    pub p: Option<i64>,
    /// Inactivation exponent
    #[serde(default)]
    pub q: Option<i64>,
    /// Activation gate of a custom channel
    #[serde(default)]
    pub activation: Option<Gate>,
    /// Inactivation gate of a custom channel
    #[serde(default)]
    pub inactivation: Option<Gate>,
}

/// `[domain]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainSection {
    /// Lower bound (mV)
    #[serde(default = "default_min_mv")]
    pub min_mv: f64,
    /// Upper bound (mV)
    #[serde(default = "default_max_mv")]
    pub max_mv: f64,
    /// `abort` or `extrapolate`
    #[serde(default)]
    pub policy: DomainPolicy,
}

impl Default for DomainSection {
    fn default() -> Self {
        Self {
            min_mv: default_min_mv(),
            max_mv: default_max_mv(),
            policy: DomainPolicy::default(),
        }
    }
}

fn default_min_mv() -> f64 {
    hhsim_core::DEFAULT_DOMAIN_MIN_MV
}

fn default_max_mv() -> f64 {
    hhsim_core::DEFAULT_DOMAIN_MAX_MV
}

/// `[initial]`: either a voltage with gates at steady state, or the fixed
/// point under a holding current (the resting state when both are absent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitialSection {
    /// Initial membrane potential (mV)
    #[serde(default)]
    pub v_m: Option<f64>,
    /// Holding current whose fixed point is the initial state (µA/cm²)
    #[serde(default)]
    pub i_hold: Option<f64>,
}

/// `[simulation]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Start time (ms)
    #[serde(default)]
    pub t0: f64,
    /// End time (ms)
    #[serde(default = "default_t1")]
    pub t1: f64,
    /// Step, or maximum step for `adaptive` (ms)
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// `euler`, `rk4`, `exponential_euler` or `adaptive`
    #[serde(default = "default_method")]
    pub method: String,
    /// Relative tolerance for `adaptive`
    #[serde(default)]
    pub rtol: Option<f64>,
    /// Absolute tolerance for `adaptive`
    #[serde(default)]
    pub atol: Option<f64>,
    /// |V_m| sanity bound (mV)
    #[serde(default)]
    pub divergence_bound: Option<f64>,
    /// Keep every n-th step
    #[serde(default)]
    pub record_every: Option<usize>,
    /// Collect per-step timings
    #[serde(default)]
    pub perf: bool,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t1: default_t1(),
            dt: default_dt(),
            method: default_method(),
            rtol: None,
            atol: None,
            divergence_bound: None,
            record_every: None,
            perf: false,
        }
    }
}

fn default_t1() -> f64 {
    100.0
}

fn default_dt() -> f64 {
    hhsim_core::DEFAULT_DT_MS
}

fn default_method() -> String {
    IntegrationMethod::default().name().to_string()
}

/// `[output]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// File format
    #[serde(default)]
    pub format: Option<OutputFormat>,
    /// Output path, relative to the experiment file
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Spike detection threshold (mV)
    #[serde(default)]
    pub spike_threshold_mv: Option<f64>,
}

impl Experiment {
    /// Parse an experiment file
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Err(CliError::missing_resource(format!(
                "experiment file {} not found",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| CliError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse experiment text
    pub fn parse(text: &str) -> CliResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Channel registry with domain and policy applied
    pub fn registry(&self) -> CliResult<ChannelRegistry> {
        let domain = VoltageDomain::new(self.domain.min_mv, self.domain.max_mv)?;
        let mut registry = if self.channels.is_empty() {
            match self.membrane.preset.as_deref() {
                Some("hodgkin_huxley") | Some("hh") => ChannelRegistry::hodgkin_huxley(),
                Some(other) => {
                    return Err(CliError::config(format!("unknown membrane preset '{}'", other)));
                }
                None => {
                    return Err(CliError::config(
                        "no [[channel]] entries and no membrane preset",
                    ));
                }
            }
        } else {
            if self.membrane.preset.is_some() {
                warn!("Membrane preset ignored: explicit [[channel]] entries given");
            }
            let mut registry = ChannelRegistry::new();
            for spec in &self.channels {
                registry.register(spec.to_species()?)?;
            }
            registry
        };
        registry = registry.with_domain(domain).with_policy(self.domain.policy);
        Ok(registry)
    }

    /// Validated membrane model
    pub fn model(&self) -> CliResult<MembraneModel> {
        Ok(MembraneModel::new(self.membrane.c_m, self.registry()?)?)
    }

    /// Initial state for `model`
    pub fn initial_state(&self, model: &MembraneModel) -> CliResult<MembraneState> {
        match (self.initial.v_m, self.initial.i_hold) {
            (Some(_), Some(_)) => Err(CliError::config("[initial] takes either v_m or i_hold, not both")),
            (Some(v), None) => Ok(model.steady_state(v)?),
            (None, Some(i)) => Ok(model.fixed_point(i)?),
            (None, None) => Ok(model.resting_state()?),
        }
    }

    /// Simulation parameters
    pub fn params(&self) -> CliResult<SimulationParams> {
        let s = &self.simulation;
        let method = match s.method.parse::<IntegrationMethod>()? {
            IntegrationMethod::Adaptive { rtol, atol } => IntegrationMethod::Adaptive {
                rtol: s.rtol.unwrap_or(rtol),
                atol: s.atol.unwrap_or(atol),
            },
            other => {
                if s.rtol.is_some() || s.atol.is_some() {
                    warn!("rtol/atol only apply to the adaptive method; ignored for {}", other);
                }
                other
            }
        };
        let mut params = SimulationParams {
            t0: s.t0,
            t1: s.t1,
            dt: s.dt,
            ..SimulationParams::default()
        }
        .with_method(method)
        .with_perf(s.perf);
        if let Some(bound) = s.divergence_bound {
            params = params.with_divergence_bound(bound);
        }
        if let Some(every) = s.record_every {
            params = params.with_record_every(every);
        }
        params.validate()?;
        Ok(params)
    }

    /// Everything needed to run
    pub fn run_config(&self) -> CliResult<RunConfig> {
        let model = self.model()?;
        let initial = self.initial_state(&model)?;
        let params = self.params()?;
        self.stimulus.validate()?;
        Ok(RunConfig::new(model, self.stimulus.clone(), initial, params))
    }
}

impl ChannelSpec {
    /// Build the core species
    pub fn to_species(&self) -> CliResult<ChannelSpecies> {
        let p = exponent(&self.id, "p", self.p)?;
        let q = exponent(&self.id, "q", self.q)?;
        let has_gates = self.activation.is_some() || self.inactivation.is_some();

        match self.kind.as_str() {
            "leak" => {
                if p.unwrap_or(0) != 0 || q.unwrap_or(0) != 0 || has_gates {
                    return Err(CliError::config(format!(
                        "leak channel {} cannot have gates or non-zero exponents",
                        self.id
                    )));
                }
                Ok(ChannelSpecies::leak(&self.id, self.g_max, self.e_rev))
            }
            "hh_na" | "hodgkin_huxley_na" => {
                self.fixed_gating(p, q, 3, 1)?;
                Ok(ChannelSpecies::hodgkin_huxley_na(&self.id, self.g_max, self.e_rev))
            }
            "hh_k" | "hodgkin_huxley_k" => {
                self.fixed_gating(p, q, 4, 0)?;
                Ok(ChannelSpecies::hodgkin_huxley_k(&self.id, self.g_max, self.e_rev))
            }
            "custom" => {
                let activation = with_exponent(&self.id, "p", self.activation.clone(), p)?;
                let inactivation = with_exponent(&self.id, "q", self.inactivation.clone(), q)?;
                Ok(ChannelSpecies::custom(
                    &self.id,
                    self.g_max,
                    self.e_rev,
                    activation,
                    inactivation,
                ))
            }
            other => Err(CliError::config(format!(
                "unknown channel kind '{}' for {} (expected leak, hh_na, hh_k or custom)",
                other, self.id
            ))),
        }
    }

    fn fixed_gating(&self, p: Option<u32>, q: Option<u32>, p_fixed: u32, q_fixed: u32) -> CliResult<()> {
        if self.activation.is_some() || self.inactivation.is_some() {
            return Err(CliError::config(format!(
                "channel {} of kind {} has built-in gates; use kind = \"custom\" to supply your own",
                self.id, self.kind
            )));
        }
        if p.is_some_and(|p| p != p_fixed) || q.is_some_and(|q| q != q_fixed) {
            return Err(CliError::config(format!(
                "channel {} of kind {} has fixed exponents p = {}, q = {}",
                self.id, self.kind, p_fixed, q_fixed
            )));
        }
        Ok(())
    }
}

fn exponent(id: &str, name: &str, value: Option<i64>) -> CliResult<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) => u32::try_from(v).map(Some).map_err(|_| {
            SimError::invalid_parameter(format!("{}.{}", id, name), v.to_string(), "non-negative integer").into()
        }),
    }
}

fn with_exponent(id: &str, name: &str, gate: Option<Gate>, exp: Option<u32>) -> CliResult<Option<(Gate, u32)>> {
    match (gate, exp) {
        (Some(gate), exp) => Ok(Some((gate, exp.unwrap_or(1)))),
        (None, None) | (None, Some(0)) => Ok(None),
        (None, Some(n)) => Err(CliError::config(format!(
            "channel {} sets {} = {} but defines no matching gate",
            id, name, n
        ))),
    }
}
