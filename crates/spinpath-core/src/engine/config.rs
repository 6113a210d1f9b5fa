use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Which snapshots `save_current` writes, each gated independently.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Snapshot before the first iteration.
    pub save_initial: bool,
    /// Snapshot after termination.
    pub save_final: bool,
    /// Appended trajectory archive at every step boundary.
    pub save_archive: bool,
    /// Per-step single-snapshot overwrite.
    pub save_single: bool,
    /// Energy time series (header written once).
    pub save_energy: bool,
}

impl OutputConfig {
    pub fn any(&self) -> bool {
        self.save_initial
            || self.save_final
            || self.save_archive
            || self.save_single
            || self.save_energy
    }
}

/// Parameters common to every method's iteration loop.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MethodConfig {
    /// Convergence threshold on the maximum absolute tangential force
    /// component.
    pub force_convergence: f64,
    /// Iteration budget.
    pub n_iterations: u64,
    /// Iterations per outer step; step boundaries log and snapshot.
    pub n_iterations_log: u64,
    /// Advisory wall-clock budget in whole seconds.
    #[serde(default)]
    pub max_walltime_secs: Option<u64>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl MethodConfig {
    pub fn builder() -> MethodConfigBuilder {
        MethodConfigBuilder::default()
    }

    pub fn max_walltime(&self) -> Option<Duration> {
        self.max_walltime_secs.map(Duration::from_secs)
    }

    /// Same checks the builder enforces, for configurations that arrive
    /// through deserialization instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.force_convergence <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "force_convergence",
                reason: "must be positive".into(),
            });
        }
        if self.n_iterations_log == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "n_iterations_log",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Default)]
pub struct MethodConfigBuilder {
    force_convergence: Option<f64>,
    n_iterations: Option<u64>,
    n_iterations_log: Option<u64>,
    max_walltime_secs: Option<u64>,
    output: OutputConfig,
}

impl MethodConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_convergence(mut self, threshold: f64) -> Self {
        self.force_convergence = Some(threshold);
        self
    }

    pub fn n_iterations(mut self, n: u64) -> Self {
        self.n_iterations = Some(n);
        self
    }

    pub fn n_iterations_log(mut self, n: u64) -> Self {
        self.n_iterations_log = Some(n);
        self
    }

    pub fn max_walltime_secs(mut self, seconds: u64) -> Self {
        self.max_walltime_secs = Some(seconds);
        self
    }

    pub fn output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<MethodConfig, ConfigError> {
        let force_convergence = self
            .force_convergence
            .ok_or(ConfigError::MissingParameter("force_convergence"))?;
        if force_convergence <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "force_convergence",
                reason: "must be positive".into(),
            });
        }
        let n_iterations_log = self
            .n_iterations_log
            .ok_or(ConfigError::MissingParameter("n_iterations_log"))?;
        if n_iterations_log == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "n_iterations_log",
                reason: "must be at least 1".into(),
            });
        }
        Ok(MethodConfig {
            force_convergence,
            n_iterations: self
                .n_iterations
                .ok_or(ConfigError::MissingParameter("n_iterations"))?,
            n_iterations_log,
            max_walltime_secs: self.max_walltime_secs,
            output: self.output,
        })
    }
}

/// GNEB parameters on top of the common loop configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GnebConfig {
    pub method: MethodConfig,
    /// Spring constant coupling neighboring images along the tangent.
    pub spring_constant: f64,
    /// Samples per segment of the interpolated energy curve.
    #[serde(default = "default_energy_interpolations")]
    pub n_energy_interpolations: usize,
}

fn default_energy_interpolations() -> usize {
    10
}

impl GnebConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.method.validate()?;
        if self.spring_constant <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "spring_constant",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// MMF parameters on top of the common loop configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MmfConfig {
    pub method: MethodConfig,
    /// Iterations between Hessian/eigenmode refreshes.
    #[serde(default = "default_hessian_interval")]
    pub hessian_update_interval: u64,
    /// Step of the central finite difference building the Hessian.
    #[serde(default = "default_finite_difference_step")]
    pub finite_difference_step: f64,
    /// Minimum |overlap| between consecutive modes before tracking is
    /// declared unstable.
    #[serde(default = "default_overlap_threshold")]
    pub mode_overlap_threshold: f64,
}

fn default_hessian_interval() -> u64 {
    10
}

fn default_finite_difference_step() -> f64 {
    1e-5
}

fn default_overlap_threshold() -> f64 {
    0.5
}

impl MmfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.method.validate()?;
        if self.hessian_update_interval == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "hessian_update_interval",
                reason: "must be at least 1".into(),
            });
        }
        if self.finite_difference_step <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "finite_difference_step",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
