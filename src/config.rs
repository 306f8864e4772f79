use std::path::{Path, PathBuf};
use std::time::Duration;

use facet::Facet;

use crate::classify::{DEFAULT_TRANSIENT_WORDS, TransientVocabulary};
use crate::error::OrbError;
use crate::executor::ProcessExecutor;
use crate::normalize::{CommandNormalizer, ElevationConfig};
use crate::paths;
use crate::retry::{DEFAULT_PROGRAM, RetryEngine, RetryPolicy};
use crate::timeout::TimeoutPolicy;
use crate::util::parse_duration;

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct CliConfig {
    #[facet(default = "orbctl")]
    pub program: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct RetryConfig {
    #[facet(default = 4)]
    pub max_attempts: u32,
    #[facet(default = 2000)]
    pub base_delay_ms: u64,
    #[facet(default = 2)]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 2000,
            multiplier: 2,
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct TimeoutsConfig {
    /// Creation, cloning and import.
    #[facet(default = "180s")]
    pub long: String,
    /// Deletion.
    #[facet(default = "60s")]
    pub medium: String,
    #[facet(default = "30s")]
    pub default: String,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            long: "180s".into(),
            medium: "60s".into(),
            default: "30s".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct ClassifierConfig {
    /// Replaces the built-in transient vocabulary when set.
    pub transient: Option<Vec<String>>,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ElevationSection {
    #[facet(default = "sudo")]
    pub command: String,
    /// Defaults to `["-H", "-n"]`.
    pub args: Option<Vec<String>>,
    #[facet(default = "bash")]
    pub shell: String,
}

impl Default for ElevationSection {
    fn default() -> Self {
        Self {
            command: "sudo".into(),
            args: None,
            shell: "bash".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct LoggingConfig {
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default)]
    pub cli: CliConfig,
    #[facet(default)]
    pub retry: RetryConfig,
    #[facet(default)]
    pub timeouts: TimeoutsConfig,
    #[facet(default)]
    pub classifier: ClassifierConfig,
    #[facet(default)]
    pub elevation: ElevationSection,
    #[facet(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn timeout_policy(&self) -> Result<TimeoutPolicy, OrbError> {
        let field = |name: &str, value: &str| {
            parse_duration(value).map_err(|e| OrbError::Validation {
                message: format!("timeouts.{name}: {e}"),
            })
        };
        Ok(TimeoutPolicy::tiered(
            field("long", &self.timeouts.long)?,
            field("medium", &self.timeouts.medium)?,
            field("default", &self.timeouts.default)?,
        ))
    }

    pub fn vocabulary(&self) -> TransientVocabulary {
        match &self.classifier.transient {
            Some(words) => TransientVocabulary::new(words),
            None => TransientVocabulary::new(DEFAULT_TRANSIENT_WORDS.iter().copied()),
        }
    }

    pub fn elevation(&self) -> ElevationConfig {
        ElevationConfig {
            command: self.elevation.command.clone(),
            args: self
                .elevation
                .args
                .clone()
                .unwrap_or_else(|| ElevationConfig::default().args),
            shell: self.elevation.shell.clone(),
        }
    }

    /// Assemble a fully configured engine around `executor`.
    pub fn engine<E: ProcessExecutor>(&self, executor: E) -> Result<RetryEngine<E>, OrbError> {
        Ok(RetryEngine::new(executor)
            .with_program(self.cli.program.clone())
            .with_policy(self.retry_policy())
            .with_timeouts(self.timeout_policy()?)
            .with_classifier(self.vocabulary())
            .with_normalizer(CommandNormalizer::new(self.elevation())))
    }
}

fn validate_config(config: &Config) -> Result<(), OrbError> {
    if config.cli.program.trim().is_empty() {
        return Err(OrbError::Validation {
            message: "cli.program cannot be empty".into(),
        });
    }
    if config.retry.max_attempts < 1 {
        return Err(OrbError::Validation {
            message: "retry.max_attempts must be at least 1".into(),
        });
    }
    if config.retry.multiplier < 1 {
        return Err(OrbError::Validation {
            message: "retry.multiplier must be at least 1".into(),
        });
    }
    if config.elevation.command.trim().is_empty() {
        return Err(OrbError::Validation {
            message: "elevation.command cannot be empty".into(),
        });
    }
    if config.elevation.shell.trim().is_empty() {
        return Err(OrbError::Validation {
            message: "elevation.shell cannot be empty".into(),
        });
    }
    config.timeout_policy()?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config, OrbError> {
    let contents = std::fs::read_to_string(path).map_err(|source| OrbError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = facet_toml::from_str(&contents).map_err(|e| OrbError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    validate_config(&config)?;
    Ok(config)
}

/// Load the explicit config, else the first implicit one that exists, else
/// built-in defaults. Returns the path actually used.
pub fn resolve_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), OrbError> {
    if let Some(path) = explicit {
        return Ok((load_config(path)?, Some(path.to_path_buf())));
    }
    for candidate in paths::config_candidates() {
        if candidate.is_file() {
            let config = load_config(&candidate)?;
            tracing::debug!(path = %candidate.display(), "loaded config");
            return Ok((config, Some(candidate)));
        }
    }
    Ok((Config::default(), None))
}
