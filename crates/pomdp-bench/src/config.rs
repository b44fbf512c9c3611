use pomdp_core::problems::TigerConfig;
use pomdp_solver::SolverConfig;
use pomdp_solver::sim::DEFAULT_MAX_STEPS;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

const DEFAULT_RUNS: usize = 100;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root evaluation configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EvaluationConfig {
    pub run_id: String,
    pub problem: ProblemConfig,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EvaluationConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: EvaluationConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.problem.validate()?;
        self.solver.validate()?;
        self.simulation.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve `{run_id}` placeholders in output templates.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
        }
    }
}

/// Which model to evaluate, with its parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProblemConfig {
    Tiger(TigerConfig),
}

impl ProblemConfig {
    pub fn label(&self) -> &'static str {
        match self {
            ProblemConfig::Tiger(_) => "tiger",
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ProblemConfig::Tiger(tiger) => {
                tiger
                    .validate()
                    .map_err(|err| ValidationError::InvalidField {
                        field: "problem".to_string(),
                        message: err.to_string(),
                    })
            }
        }
    }
}

/// QMDP stopping rules. Fields left out of the YAML fall back to the `QMDP_*`
/// environment variables, then to the solver defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SolverSettings {
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub time_cap_ms: Option<u64>,
}

impl SolverSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_iterations == Some(0) {
            return Err(ValidationError::InvalidField {
                field: "solver.max_iterations".to_string(),
                message: "at least one sweep is required".to_string(),
            });
        }

        if let Some(tolerance) = self
            .tolerance
            .filter(|tolerance| !tolerance.is_finite() || *tolerance <= 0.0)
        {
            return Err(ValidationError::InvalidField {
                field: "solver.tolerance".to_string(),
                message: format!("tolerance must be finite and positive, got {tolerance}"),
            });
        }

        Ok(())
    }

    pub fn to_solver_config(&self) -> SolverConfig {
        self.layered_on(SolverConfig::from_env())
    }

    /// Apply the settings present in the YAML on top of `base`.
    pub fn layered_on(&self, base: SolverConfig) -> SolverConfig {
        let mut config = base;
        if let Some(max_iterations) = self.max_iterations {
            config = config.with_max_iterations(max_iterations);
        }
        if let Some(tolerance) = self.tolerance {
            config = config.with_tolerance(tolerance);
        }
        if let Some(ms) = self.time_cap_ms {
            config = config.with_time_cap(Duration::from_millis(ms));
        }
        config
    }
}

/// How many runs to simulate and how long each may be.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationSettings {
    #[serde(default = "default_runs")]
    pub runs: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            max_steps: DEFAULT_MAX_STEPS,
            seed: None,
        }
    }
}

impl SimulationSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.runs == 0 {
            return Err(ValidationError::InvalidField {
                field: "simulation.runs".to_string(),
                message: "number of runs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn default_runs() -> usize {
    DEFAULT_RUNS
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }

        if self.jsonl == self.summary_md {
            return Err(ValidationError::InvalidField {
                field: "outputs".to_string(),
                message: "jsonl and summary_md must point at different files".to_string(),
            });
        }
        Ok(())
    }
}

/// Structured logging is off unless enabled.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    PathBuf::from(template.replace("{run_id}", run_id))
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
