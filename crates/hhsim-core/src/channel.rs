//! Channel species and their voltage-dependent gating kinetics
//!
//! A species contributes `g(V) = ḡ · m^p · h^q` to the membrane conductance,
//! where `m` and `h` are gating variables relaxing towards voltage-dependent
//! steady states. Rate laws are pure functions of voltage; dispatch over the
//! species kind is a plain `match`, so the built-in Hodgkin-Huxley channels
//! never go through a function pointer in the inner loop.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Result, SimError};
use crate::registry::VoltageDomain;
use crate::squid;

/// Gating-variable values of one species, activation first
pub type GateValues = SmallVec<[f64; 2]>;

/// Caller-supplied pure function of membrane potential (mV)
pub type VoltageFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Below this distance from `v_half` the linoid form switches to its series limit
const LINOID_EPS: f64 = 1e-6;

/// Tolerance when checking that steady states lie in [0, 1]
const UNIT_TOLERANCE: f64 = 1e-12;

/// `rate · exp((v - v_half) / slope)`
pub(crate) fn exponential(rate: f64, v_half: f64, slope: f64, v: f64) -> f64 {
    rate * ((v - v_half) / slope).exp()
}

/// `rate · (v - v_half) / (1 - exp(-(v - v_half) / slope))`
pub(crate) fn linoid(rate: f64, v_half: f64, slope: f64, v: f64) -> f64 {
    let x = (v - v_half) / slope;
    if x.abs() < LINOID_EPS {
        rate * slope * (1.0 + 0.5 * x)
    } else {
        rate * (v - v_half) / (1.0 - (-x).exp())
    }
}

/// `rate / (1 + exp(-(v - v_half) / slope))`
pub(crate) fn sigmoid(rate: f64, v_half: f64, slope: f64, v: f64) -> f64 {
    rate / (1.0 + (-(v - v_half) / slope).exp())
}

/// A voltage-dependent rate law (ms⁻¹ for α/β, ms for τ, unitless for x∞)
#[derive(Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum RateFunction {
    /// Voltage independent
    Constant {
        /// Value returned for every voltage
        value: f64,
    },
    /// `rate · exp((V - v_half) / slope)`
    Exponential {
        /// Amplitude
        rate: f64,
        /// Reference voltage (mV)
        v_half: f64,
        /// e-fold voltage (mV); negative for decaying laws
        slope: f64,
    },
    /// `rate · (V - v_half) / (1 - exp(-(V - v_half) / slope))`
    Linoid {
        /// Amplitude
        rate: f64,
        /// Voltage of the removable singularity (mV)
        v_half: f64,
        /// e-fold voltage (mV)
        slope: f64,
    },
    /// `rate / (1 + exp(-(V - v_half) / slope))`
    Sigmoid {
        /// Upper asymptote
        rate: f64,
        /// Half-activation voltage (mV)
        v_half: f64,
        /// Slope factor (mV); negative for decreasing curves
        slope: f64,
    },
    /// Arbitrary pure function of voltage
    #[cfg_attr(feature = "serde", serde(skip))]
    Custom(VoltageFn),
}

impl RateFunction {
    /// Wrap a closure as a rate law
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        RateFunction::Custom(Arc::new(f))
    }

    /// Evaluate at membrane potential `v` (mV)
    #[inline]
    pub fn eval(&self, v: f64) -> f64 {
        match self {
            RateFunction::Constant { value } => *value,
            RateFunction::Exponential { rate, v_half, slope } => exponential(*rate, *v_half, *slope, v),
            RateFunction::Linoid { rate, v_half, slope } => linoid(*rate, *v_half, *slope, v),
            RateFunction::Sigmoid { rate, v_half, slope } => sigmoid(*rate, *v_half, *slope, v),
            RateFunction::Custom(f) => f(v),
        }
    }

    /// Check the shape parameters (a zero slope makes every form undefined)
    pub fn validate(&self, name: &str) -> Result<()> {
        match self {
            RateFunction::Constant { value } => check_finite(name, "value", *value),
            RateFunction::Exponential { rate, v_half, slope }
            | RateFunction::Linoid { rate, v_half, slope }
            | RateFunction::Sigmoid { rate, v_half, slope } => {
                check_finite(name, "rate", *rate)?;
                check_finite(name, "v_half", *v_half)?;
                check_finite(name, "slope", *slope)?;
                if *slope == 0.0 {
                    return Err(SimError::invalid_parameter(
                        format!("{}.slope", name),
                        "0",
                        "!= 0.0",
                    ));
                }
                Ok(())
            }
            RateFunction::Custom(_) => Ok(()),
        }
    }
}

fn check_finite(name: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(
            format!("{}.{}", name, field),
            value.to_string(),
            "finite",
        ))
    }
}

impl fmt::Debug for RateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateFunction::Constant { value } => f.debug_struct("Constant").field("value", value).finish(),
            RateFunction::Exponential { rate, v_half, slope } => f
                .debug_struct("Exponential")
                .field("rate", rate)
                .field("v_half", v_half)
                .field("slope", slope)
                .finish(),
            RateFunction::Linoid { rate, v_half, slope } => f
                .debug_struct("Linoid")
                .field("rate", rate)
                .field("v_half", v_half)
                .field("slope", slope)
                .finish(),
            RateFunction::Sigmoid { rate, v_half, slope } => f
                .debug_struct("Sigmoid")
                .field("rate", rate)
                .field("v_half", v_half)
                .field("slope", slope)
                .finish(),
            RateFunction::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Steady state and time constant of one gate at a fixed voltage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateRates {
    /// Steady-state open fraction x∞(V)
    pub x_inf: f64,
    /// Relaxation time constant τ(V) (ms)
    pub tau: f64,
}

impl GateRates {
    /// Convert opening/closing rates; `None` when α + β is not a positive finite number
    pub fn from_alpha_beta(alpha: f64, beta: f64) -> Option<Self> {
        let sum = alpha + beta;
        if !(sum.is_finite() && sum > 0.0) {
            return None;
        }
        Some(Self {
            x_inf: alpha / sum,
            tau: 1.0 / sum,
        })
    }

    /// dx/dt = (x∞ - x) / τ
    #[inline]
    pub fn derivative(&self, x: f64) -> f64 {
        (self.x_inf - x) / self.tau
    }

    /// Exact solution after `h` ms with x∞ and τ held fixed
    #[inline]
    pub fn relax(&self, x: f64, h: f64) -> f64 {
        self.x_inf + (x - self.x_inf) * (-h / self.tau).exp()
    }

    fn is_well_formed(&self) -> bool {
        self.x_inf.is_finite()
            && self.tau.is_finite()
            && self.tau > 0.0
            && self.x_inf >= -UNIT_TOLERANCE
            && self.x_inf <= 1.0 + UNIT_TOLERANCE
    }
}

/// How a gate's kinetics are parameterised
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum GateKinetics {
    /// dx/dt = α(V)(1 - x) - β(V)x
    AlphaBeta {
        /// Opening rate (ms⁻¹)
        alpha: RateFunction,
        /// Closing rate (ms⁻¹)
        beta: RateFunction,
    },
    /// dx/dt = (x∞(V) - x) / τ(V)
    SteadyState {
        /// Steady-state open fraction
        x_inf: RateFunction,
        /// Time constant (ms)
        tau: RateFunction,
    },
}

impl GateKinetics {
    /// Steady state and time constant at `v`
    pub fn rates(&self, v: f64) -> Option<GateRates> {
        match self {
            GateKinetics::AlphaBeta { alpha, beta } => {
                let a = alpha.eval(v);
                let b = beta.eval(v);
                if a < 0.0 || b < 0.0 {
                    return None;
                }
                GateRates::from_alpha_beta(a, b)
            }
            GateKinetics::SteadyState { x_inf, tau } => {
                let rates = GateRates {
                    x_inf: x_inf.eval(v),
                    tau: tau.eval(v),
                };
                rates.is_well_formed().then_some(rates)
            }
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        match self {
            GateKinetics::AlphaBeta { alpha, beta } => {
                alpha.validate(&format!("{}.alpha", name))?;
                beta.validate(&format!("{}.beta", name))
            }
            GateKinetics::SteadyState { x_inf, tau } => {
                x_inf.validate(&format!("{}.x_inf", name))?;
                tau.validate(&format!("{}.tau", name))
            }
        }
    }
}

/// A named gating mechanism
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gate {
    /// Label used in result traces (`m`, `h`, `n`, ...)
    pub name: String,
    /// Voltage dependence
    pub kinetics: GateKinetics,
}

impl Gate {
    /// Gate described by opening and closing rates
    pub fn alpha_beta(name: impl Into<String>, alpha: RateFunction, beta: RateFunction) -> Self {
        Self {
            name: name.into(),
            kinetics: GateKinetics::AlphaBeta { alpha, beta },
        }
    }

    /// Gate described by steady state and time constant
    pub fn steady_state(name: impl Into<String>, x_inf: RateFunction, tau: RateFunction) -> Self {
        Self {
            name: name.into(),
            kinetics: GateKinetics::SteadyState { x_inf, tau },
        }
    }
}

/// Behavioural variant of a channel species
#[derive(Debug, Clone)]
pub enum ChannelKind {
    /// Passive conductance, p = q = 0
    Leak,
    /// Squid-axon fast sodium channel, m³h
    HodgkinHuxleyNa,
    /// Squid-axon delayed-rectifier potassium channel, n⁴
    HodgkinHuxleyK,
    /// User-defined gates
    Custom {
        /// Activation gate, raised to p
        activation: Option<Gate>,
        /// Inactivation gate, raised to q
        inactivation: Option<Gate>,
    },
}

/// One ion-channel species of the membrane
#[derive(Debug, Clone)]
pub struct ChannelSpecies {
    id: String,
    g_max: f64,
    e_rev: f64,
    p: u32,
    q: u32,
    kind: ChannelKind,
}

impl ChannelSpecies {
    /// Passive leak conductance (mS/cm²) with reversal potential (mV)
    pub fn leak(id: impl Into<String>, g_max: f64, e_rev: f64) -> Self {
        Self {
            id: id.into(),
            g_max,
            e_rev,
            p: 0,
            q: 0,
            kind: ChannelKind::Leak,
        }
    }

    /// Hodgkin-Huxley sodium channel with custom ḡ and E
    pub fn hodgkin_huxley_na(id: impl Into<String>, g_max: f64, e_rev: f64) -> Self {
        Self {
            id: id.into(),
            g_max,
            e_rev,
            p: 3,
            q: 1,
            kind: ChannelKind::HodgkinHuxleyNa,
        }
    }

    /// Hodgkin-Huxley potassium channel with custom ḡ and E
    pub fn hodgkin_huxley_k(id: impl Into<String>, g_max: f64, e_rev: f64) -> Self {
        Self {
            id: id.into(),
            g_max,
            e_rev,
            p: 4,
            q: 0,
            kind: ChannelKind::HodgkinHuxleyK,
        }
    }

    /// Squid-axon sodium channel, id `na`
    pub fn hh_sodium() -> Self {
        Self::hodgkin_huxley_na("na", squid::G_NA, squid::E_NA)
    }

    /// Squid-axon potassium channel, id `k`
    pub fn hh_potassium() -> Self {
        Self::hodgkin_huxley_k("k", squid::G_K, squid::E_K)
    }

    /// Squid-axon leak, id `leak`
    pub fn hh_leak() -> Self {
        Self::leak("leak", squid::G_L, squid::E_L)
    }

    /// Species with caller-defined gates; each gate comes with its exponent
    pub fn custom(
        id: impl Into<String>,
        g_max: f64,
        e_rev: f64,
        activation: Option<(Gate, u32)>,
        inactivation: Option<(Gate, u32)>,
    ) -> Self {
        let (activation, p) = match activation {
            Some((gate, p)) => (Some(gate), p),
            None => (None, 0),
        };
        let (inactivation, q) = match inactivation {
            Some((gate, q)) => (Some(gate), q),
            None => (None, 0),
        };
        Self {
            id: id.into(),
            g_max,
            e_rev,
            p,
            q,
            kind: ChannelKind::Custom {
                activation,
                inactivation,
            },
        }
    }

    /// Species identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// ḡ (mS/cm²)
    pub fn max_conductance(&self) -> f64 {
        self.g_max
    }

    /// E (mV)
    pub fn reversal_potential(&self) -> f64 {
        self.e_rev
    }

    /// p
    pub fn activation_exponent(&self) -> u32 {
        self.p
    }

    /// q
    pub fn inactivation_exponent(&self) -> u32 {
        self.q
    }

    /// Behavioural variant
    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    fn has_activation(&self) -> bool {
        match &self.kind {
            ChannelKind::Leak => false,
            ChannelKind::HodgkinHuxleyNa | ChannelKind::HodgkinHuxleyK => true,
            ChannelKind::Custom { activation, .. } => activation.is_some(),
        }
    }

    fn has_inactivation(&self) -> bool {
        match &self.kind {
            ChannelKind::Leak | ChannelKind::HodgkinHuxleyK => false,
            ChannelKind::HodgkinHuxleyNa => true,
            ChannelKind::Custom { inactivation, .. } => inactivation.is_some(),
        }
    }

    /// Number of gating variables carried in the state
    pub fn gate_count(&self) -> usize {
        self.has_activation() as usize + self.has_inactivation() as usize
    }

    /// Gate labels in state order
    pub fn gate_names(&self) -> SmallVec<[String; 2]> {
        let mut names = SmallVec::new();
        match &self.kind {
            ChannelKind::Leak => {}
            ChannelKind::HodgkinHuxleyNa => {
                names.push("m".to_string());
                names.push("h".to_string());
            }
            ChannelKind::HodgkinHuxleyK => names.push("n".to_string()),
            ChannelKind::Custom {
                activation,
                inactivation,
            } => {
                if let Some(gate) = activation {
                    names.push(gate.name.clone());
                }
                if let Some(gate) = inactivation {
                    names.push(gate.name.clone());
                }
            }
        }
        names
    }

    /// x∞ and τ of gate `gate` at `v`
    #[inline]
    pub fn gate_rates(&self, gate: usize, v: f64) -> Result<GateRates> {
        let rates = match (&self.kind, gate) {
            (ChannelKind::HodgkinHuxleyNa, 0) => GateRates::from_alpha_beta(squid::alpha_m(v), squid::beta_m(v)),
            (ChannelKind::HodgkinHuxleyNa, 1) => GateRates::from_alpha_beta(squid::alpha_h(v), squid::beta_h(v)),
            (ChannelKind::HodgkinHuxleyK, 0) => GateRates::from_alpha_beta(squid::alpha_n(v), squid::beta_n(v)),
            (
                ChannelKind::Custom {
                    activation,
                    inactivation,
                },
                _,
            ) => {
                let gate_ref = match (activation, gate) {
                    (Some(a), 0) => Some(a),
                    (Some(_), 1) => inactivation.as_ref(),
                    (None, 0) => inactivation.as_ref(),
                    _ => None,
                };
                match gate_ref {
                    Some(g) => g.kinetics.rates(v),
                    None => return Err(self.missing_gate(gate)),
                }
            }
            _ => return Err(self.missing_gate(gate)),
        };
        rates.ok_or_else(|| {
            SimError::numerical(format!(
                "channel {} gate {} has undefined kinetics at {} mV",
                self.id, gate, v
            ))
        })
    }

    fn missing_gate(&self, gate: usize) -> SimError {
        SimError::invalid_config(format!("channel {} has no gate {}", self.id, gate))
    }

    /// g = ḡ · m^p · h^q for the given gate values
    #[inline]
    pub fn conductance(&self, gates: &[f64]) -> f64 {
        let mut g = self.g_max;
        let mut idx = 0;
        if self.has_activation() {
            g *= gates[idx].powi(self.p as i32);
            idx += 1;
        }
        if self.has_inactivation() {
            g *= gates[idx].powi(self.q as i32);
        }
        g
    }

    /// Ohmic current g · (V - E) (µA/cm²)
    #[inline]
    pub fn current(&self, v: f64, gates: &[f64]) -> f64 {
        self.conductance(gates) * (v - self.e_rev)
    }

    /// Gate values at their steady state for voltage `v`
    pub fn steady_state(&self, v: f64) -> Result<GateValues> {
        (0..self.gate_count())
            .map(|gate| self.gate_rates(gate, v).map(|r| r.x_inf.clamp(0.0, 1.0)))
            .collect()
    }

    /// Check parameters and sample every gate across `domain`
    pub fn validate(&self, domain: &VoltageDomain) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SimError::invalid_config("channel species id must not be empty"));
        }
        if !(self.g_max.is_finite() && self.g_max > 0.0) {
            return Err(SimError::invalid_parameter(
                format!("{}.g_max", self.id),
                self.g_max.to_string(),
                "> 0.0",
            ));
        }
        if !self.e_rev.is_finite() {
            return Err(SimError::invalid_parameter(
                format!("{}.e_rev", self.id),
                self.e_rev.to_string(),
                "finite",
            ));
        }

        if let ChannelKind::Custom {
            activation,
            inactivation,
        } = &self.kind
        {
            if activation.is_some() != (self.p > 0) {
                return Err(SimError::invalid_parameter(
                    format!("{}.p", self.id),
                    self.p.to_string(),
                    ">= 1 exactly when an activation gate is given",
                ));
            }
            if inactivation.is_some() != (self.q > 0) {
                return Err(SimError::invalid_parameter(
                    format!("{}.q", self.id),
                    self.q.to_string(),
                    ">= 1 exactly when an inactivation gate is given",
                ));
            }
            for gate in activation.iter().chain(inactivation.iter()) {
                gate.kinetics.validate(&format!("{}.{}", self.id, gate.name))?;
            }
        }

        for gate in 0..self.gate_count() {
            for v in domain.grid(1.0) {
                self.gate_rates(gate, v).map_err(|_| {
                    SimError::invalid_config(format!(
                        "channel {} gate {} is not well defined at {} mV",
                        self.id, gate, v
                    ))
                })?;
            }
        }
        Ok(())
    }
}
