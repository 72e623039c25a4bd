//! Error types for the simulator

use thiserror::Error;

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Why a run was declared numerically divergent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DivergenceCause {
    /// |V_m| exceeded the configured sanity bound
    SanityBound,
    /// The state picked up a NaN or infinity
    NonFinite,
    /// The adaptive controller could not find an acceptable step
    StepUnderflow,
    /// An intermediate stage of a multi-stage step left the voltage domain
    StageOutOfDomain,
}

impl std::fmt::Display for DivergenceCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DivergenceCause::SanityBound => "membrane potential exceeded sanity bound",
            DivergenceCause::NonFinite => "non-finite state",
            DivergenceCause::StepUnderflow => "step size underflow",
            DivergenceCause::StageOutOfDomain => "intermediate stage left the voltage domain",
        };
        write!(f, "{}", msg)
    }
}

/// Errors that can occur while configuring or running a simulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Inconsistent model or run configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A rate function was evaluated outside the operating voltage range
    #[error("Channel {species} evaluated at {voltage_mv} mV, outside [{min_mv}, {max_mv}] mV")]
    OutOfDomain {
        /// Channel species id
        species: String,
        /// Offending membrane potential (mV)
        voltage_mv: f64,
        /// Lower bound of the operating range (mV)
        min_mv: f64,
        /// Upper bound of the operating range (mV)
        max_mv: f64,
    },

    /// Integration blew up
    #[error("Run diverged at t = {time_ms} ms (V_m = {voltage_mv} mV): {cause}")]
    Divergence {
        /// Simulated time of the failing step (ms)
        time_ms: f64,
        /// Membrane potential at the failing step (mV)
        voltage_mv: f64,
        /// What tripped the check
        cause: DivergenceCause,
    },

    /// Numerical computation error outside of the integration loop
    #[error("Numerical error: {reason}")]
    Numerical {
        /// Reason for numerical error
        reason: String,
    },

    /// A run was asked to start from a phase other than `Configured`
    #[error("Run cannot start from phase {phase}")]
    InvalidRunState {
        /// Phase the run was in
        phase: String,
    },
}

impl SimError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an out-of-domain error
    pub fn out_of_domain(species: impl Into<String>, voltage_mv: f64, min_mv: f64, max_mv: f64) -> Self {
        Self::OutOfDomain {
            species: species.into(),
            voltage_mv,
            min_mv,
            max_mv,
        }
    }

    /// Create a divergence error
    pub fn divergence(time_ms: f64, voltage_mv: f64, cause: DivergenceCause) -> Self {
        Self::Divergence {
            time_ms,
            voltage_mv,
            cause,
        }
    }

    /// Create a numerical error
    pub fn numerical(reason: impl Into<String>) -> Self {
        Self::Numerical {
            reason: reason.into(),
        }
    }

    /// True for errors raised before a run starts; these are never retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SimError::InvalidConfiguration { .. } | SimError::InvalidParameter { .. }
        )
    }

    /// True for errors a caller may recover from by reconfiguring and starting a new run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SimError::OutOfDomain { .. } | SimError::Divergence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SimError::invalid_config("no channel species");
        assert!(matches!(err, SimError::InvalidConfiguration { .. }));
        assert!(err.is_configuration());
        assert!(!err.is_recoverable());

        let err = SimError::invalid_parameter("g_max", "0", "> 0.0");
        assert!(matches!(err, SimError::InvalidParameter { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_error_display() {
        let err = SimError::out_of_domain("na", 75.0, -100.0, 60.0);
        let msg = format!("{}", err);
        assert!(msg.contains("Channel na"));
        assert!(msg.contains("75"));
        assert!(err.is_recoverable());

        let err = SimError::divergence(4.0, 1500.0, DivergenceCause::SanityBound);
        assert!(format!("{}", err).contains("sanity bound"));
        assert!(err.is_recoverable());
    }
}
