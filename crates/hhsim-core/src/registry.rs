//! Channel model registry
//!
//! Holds the immutable set of channel species of a membrane together with the
//! voltage range their rate laws are trusted on, and decides what happens when
//! the integrator asks for rates outside that range.

use crate::channel::{ChannelSpecies, GateRates};
use crate::error::{Result, SimError};

/// Voltage range over which rate laws are known to be well defined
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoltageDomain {
    /// Lower bound (mV)
    pub min_mv: f64,
    /// Upper bound (mV)
    pub max_mv: f64,
}

impl Default for VoltageDomain {
    fn default() -> Self {
        Self {
            min_mv: crate::DEFAULT_DOMAIN_MIN_MV,
            max_mv: crate::DEFAULT_DOMAIN_MAX_MV,
        }
    }
}

impl VoltageDomain {
    /// Create a validated domain
    pub fn new(min_mv: f64, max_mv: f64) -> Result<Self> {
        if !(min_mv.is_finite() && max_mv.is_finite()) || max_mv <= min_mv {
            return Err(SimError::invalid_parameter(
                "voltage_domain",
                format!("[{}, {}]", min_mv, max_mv),
                "finite bounds with min < max",
            ));
        }
        Ok(Self { min_mv, max_mv })
    }

    /// Whether `v` lies inside the closed range
    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min_mv && v <= self.max_mv
    }

    /// Nearest voltage inside the range
    #[inline]
    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min_mv, self.max_mv)
    }

    /// Evenly spaced voltages covering the range, both ends included,
    /// spaced no further apart than `step`
    pub fn grid(&self, step: f64) -> impl Iterator<Item = f64> {
        let span = self.max_mv - self.min_mv;
        let n = (span / step).ceil().max(1.0) as usize;
        let min = self.min_mv;
        (0..=n).map(move |i| min + span * i as f64 / n as f64)
    }
}

/// What to do when a rate law is requested outside the operating domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum DomainPolicy {
    /// Stop the run with an out-of-domain outcome
    #[default]
    Abort,
    /// Evaluate at the nearest voltage inside the domain and carry on
    Extrapolate,
}

/// The set of channel species making up one membrane
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    species: Vec<ChannelSpecies>,
    domain: VoltageDomain,
    policy: DomainPolicy,
}

impl ChannelRegistry {
    /// Empty registry with the default domain and policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Squid-axon sodium, potassium and leak channels
    pub fn hodgkin_huxley() -> Self {
        Self::new()
            .with_species(ChannelSpecies::hh_sodium())
            .with_species(ChannelSpecies::hh_potassium())
            .with_species(ChannelSpecies::hh_leak())
    }

    /// A single leak channel
    pub fn passive(g_leak: f64, e_leak: f64) -> Self {
        Self::new().with_species(ChannelSpecies::leak("leak", g_leak, e_leak))
    }

    /// Add a species (duplicates are reported by [`validate`](Self::validate))
    pub fn with_species(mut self, species: ChannelSpecies) -> Self {
        self.species.push(species);
        self
    }

    /// Set the operating voltage domain
    pub fn with_domain(mut self, domain: VoltageDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Set the out-of-domain policy
    pub fn with_policy(mut self, policy: DomainPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a species, rejecting duplicate ids immediately
    pub fn register(&mut self, species: ChannelSpecies) -> Result<()> {
        if self.index_of(species.id()).is_some() {
            return Err(SimError::invalid_config(format!(
                "channel species {} registered twice",
                species.id()
            )));
        }
        self.species.push(species);
        Ok(())
    }

    /// Validate every species against the domain
    pub fn validate(&self) -> Result<()> {
        if self.species.is_empty() {
            return Err(SimError::invalid_config("at least one channel species is required"));
        }
        for (i, species) in self.species.iter().enumerate() {
            if self.species[..i].iter().any(|s| s.id() == species.id()) {
                return Err(SimError::invalid_config(format!(
                    "channel species {} registered twice",
                    species.id()
                )));
            }
            species.validate(&self.domain)?;
        }
        Ok(())
    }

    /// All species in state order
    pub fn species(&self) -> &[ChannelSpecies] {
        &self.species
    }

    /// Number of species
    pub fn len(&self) -> usize {
        self.species.len()
    }

    /// Whether no species are registered
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    /// Look up a species by id
    pub fn get(&self, id: &str) -> Option<&ChannelSpecies> {
        self.species.iter().find(|s| s.id() == id)
    }

    /// Position of a species in state order
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.species.iter().position(|s| s.id() == id)
    }

    /// Operating voltage domain
    pub fn domain(&self) -> &VoltageDomain {
        &self.domain
    }

    /// Out-of-domain policy
    pub fn policy(&self) -> DomainPolicy {
        self.policy
    }

    /// Voltage at which rate laws of species `idx` are actually evaluated
    #[inline]
    pub fn effective_voltage(&self, idx: usize, v: f64) -> Result<f64> {
        if !v.is_finite() {
            return Err(SimError::numerical(format!(
                "channel {} evaluated at {} mV",
                self.species[idx].id(),
                v
            )));
        }
        if self.domain.contains(v) {
            return Ok(v);
        }
        match self.policy {
            DomainPolicy::Abort => Err(SimError::out_of_domain(
                self.species[idx].id(),
                v,
                self.domain.min_mv,
                self.domain.max_mv,
            )),
            DomainPolicy::Extrapolate => Ok(self.domain.clamp(v)),
        }
    }

    /// x∞ and τ for gate `gate` of species `idx`, honouring the domain policy
    #[inline]
    pub fn gate_rates(&self, idx: usize, gate: usize, v: f64) -> Result<GateRates> {
        let v_eval = self.effective_voltage(idx, v)?;
        self.species[idx].gate_rates(gate, v_eval)
    }
}
