use thiserror::Error;

/// Fatal or recoverable failure raised by the core or its runtime collaborators.
///
/// Every fatal variant is expected to carry enough context (domain id, step)
/// for the propagation policy in the error handling design: the message is
/// logged, open output handles are flushed by the caller, and the process
/// exits non-zero. `NumericalAnomaly` is the one recoverable kind — callers
/// reset state to a floor value and continue instead of aborting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StratflowError {
    #[error("[domain {domain}] config error: {message}")]
    Config { domain: usize, message: String },

    #[error("[domain {domain}] io error: {message}")]
    Io { domain: usize, message: String },

    #[error("[domain {domain} step {step}] domain error: {message}")]
    Domain {
        domain: usize,
        step: u64,
        message: String,
    },

    #[error("[domain {domain} step {step}] capacity error: total_vol={total_vol:.6}, bound={bound:.6}")]
    Capacity {
        domain: usize,
        step: u64,
        total_vol: f64,
        bound: f64,
    },

    #[error("[domain {domain} step {step}] CFL violation: configured dt={configured_dt:.6} exceeds stable bound dt_max={dt_max:.6}")]
    Cfl {
        domain: usize,
        step: u64,
        configured_dt: f64,
        dt_max: f64,
    },

    #[error("mesh error at confluence between domains {domain_a} and {domain_b}: {message}")]
    Mesh {
        domain_a: usize,
        domain_b: usize,
        message: String,
    },

    #[error("[domain {domain} step {step}] numerical anomaly (recoverable): {message}")]
    NumericalAnomaly {
        domain: usize,
        step: u64,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, StratflowError>;

impl StratflowError {
    /// `domain=0` is the "no domain" sentinel, matching the convention of the
    /// other variants' plain `usize` domain fields (domains are 1-indexed).
    pub fn config(message: impl Into<String>) -> Self {
        StratflowError::Config {
            domain: 0,
            message: message.into(),
        }
    }

    pub fn config_for(domain: usize, message: impl Into<String>) -> Self {
        StratflowError::Config {
            domain,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        StratflowError::Io {
            domain: 0,
            message: message.into(),
        }
    }

    pub fn domain(domain: usize, step: u64, message: impl Into<String>) -> Self {
        StratflowError::Domain {
            domain,
            step,
            message: message.into(),
        }
    }

    /// True for the one recoverable error kind; callers use this to decide
    /// between resetting state and propagating a fatal abort.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StratflowError::NumericalAnomaly { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_domain_and_step_context() {
        let err = StratflowError::domain(2, 17, "surface out of mesh range");
        let msg = err.to_string();
        assert!(msg.contains("domain 2"));
        assert!(msg.contains("step 17"));
    }

    #[test]
    fn numerical_anomaly_is_recoverable_others_are_not() {
        let anomaly = StratflowError::NumericalAnomaly {
            domain: 0,
            step: 0,
            message: "tke <= 0".into(),
        };
        assert!(anomaly.is_recoverable());
        assert!(!StratflowError::config("bad").is_recoverable());
    }
}
