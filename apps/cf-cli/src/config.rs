//! YAML configuration for the step-loop demo.

use std::path::Path;

use cf_core::{Real, Tolerances, ensure_finite};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// `x = start; while x < limit: x += step`, differentiated w.r.t. `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub frame_name: String,
    pub start: Real,
    pub limit: Real,
    pub step: Real,
    /// Gradient fed into the loop's exit value.
    pub upstream_gradient: Real,
    pub max_iterations: u32,
    /// Used to compare the computed gradient against the expected one.
    pub tolerances: Tolerances,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frame_name: "step_loop".to_string(),
            start: 0.0,
            limit: 5.0,
            step: 2.0,
            upstream_gradient: 1.0,
            max_iterations: 10_000,
            tolerances: Tolerances::default(),
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> CliResult<()> {
        ensure_finite(self.start, "start")?;
        ensure_finite(self.limit, "limit")?;
        ensure_finite(self.step, "step")?;
        ensure_finite(self.upstream_gradient, "upstream_gradient")?;
        Tolerances::new(self.tolerances.abs, self.tolerances.rel)?;
        if self.step <= 0.0 {
            return Err(CliError::Config {
                what: format!("step must be positive, got {}", self.step),
            });
        }
        if self.frame_name.is_empty() {
            return Err(CliError::Config {
                what: "frame_name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Load and validate a config; `None` gives the defaults.
pub fn load(path: Option<&Path>) -> CliResult<DemoConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        }
        None => DemoConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

pub fn save(path: &Path, config: &DemoConfig) -> CliResult<()> {
    config.validate()?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: DemoConfig = serde_yaml::from_str("limit: 9.0\nstep: 3.0\n").unwrap();
        assert_eq!(config.limit, 9.0);
        assert_eq!(config.step, 3.0);
        assert_eq!(config.frame_name, "step_loop");
        assert_eq!(config.tolerances, Tolerances::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_step_rejected() {
        let config = DemoConfig {
            step: 0.0,
            ..DemoConfig::default()
        };
        assert!(matches!(config.validate(), Err(CliError::Config { .. })));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("cf-cli-config-{}.yaml", std::process::id()));
        let config = DemoConfig {
            start: 1.0,
            ..DemoConfig::default()
        };
        save(&path, &config).unwrap();
        let loaded = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
