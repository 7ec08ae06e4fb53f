//! Run Configuration
//!
//! Where the effective style and policy come from. `ConfigAuthority` keeps
//! the provenance in one place instead of if/else chains at every use site.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compliance::{PolicyError, RulePolicy};
use crate::schema::SchemaLimits;
use crate::style::{StyleError, StyleTemplate};

/// Source of a style template or rule policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigAuthority {
    /// Embedded defaults
    #[default]
    Builtin,
    /// Loaded from a file named in the run config
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub work_dir: PathBuf,
    pub style_path: Option<PathBuf>,
    pub policy_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub limits: SchemaLimits,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp"),
            style_path: None,
            policy_path: None,
            poll_interval_ms: 2000,
            limits: SchemaLimits::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Effective style and policy with their provenance.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub style: StyleTemplate,
    pub style_authority: ConfigAuthority,
    pub policy: RulePolicy,
    pub policy_authority: ConfigAuthority,
}

impl RunConfig {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let content = fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
                Ok(serde_json::from_str(&content)?)
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn resolve(&self) -> Result<Resolved, ConfigError> {
        let (style, style_authority) = match &self.style_path {
            Some(path) => (StyleTemplate::load(path)?, ConfigAuthority::File),
            None => (StyleTemplate::builtin()?, ConfigAuthority::Builtin),
        };
        let (policy, policy_authority) = match &self.policy_path {
            Some(path) => (RulePolicy::load(path)?, ConfigAuthority::File),
            None => (RulePolicy::builtin()?, ConfigAuthority::Builtin),
        };
        Ok(Resolved { style, style_authority, policy, policy_authority })
    }
}
