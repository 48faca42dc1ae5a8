//! Optional TOML configuration for the terminal front end.

use std::{fs, path::Path, time::Duration};

use anima_core::{session::SessionConfig, solver::CommandSolver};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Top-level config file. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub solver: Option<SolverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolverConfig {
    /// Program followed by its arguments, e.g. `["anima-solve", "--fast"]`.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl SolverConfig {
    /// Builds a solver config from a whitespace-separated command line.
    pub fn from_command_line(line: &str) -> Self {
        Self {
            command: line.split_whitespace().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn to_solver(&self) -> Result<CommandSolver> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("solver.command must be a non-empty array"))?;
        Ok(CommandSolver::new(
            program.clone(),
            args.to_vec(),
            Duration::from_secs(self.timeout_secs),
        ))
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session.reset_step_ms == 0 {
            return Err(anyhow!("session.reset_step_ms must be > 0"));
        }
        if let Some(solver) = &self.solver {
            if solver.command.is_empty() || solver.command[0].trim().is_empty() {
                return Err(anyhow!("solver.command must be a non-empty array"));
            }
            if solver.timeout_secs == 0 {
                return Err(anyhow!("solver.timeout_secs must be > 0"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
