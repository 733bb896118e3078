//! swarm.toml configuration parser.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub swarm: SwarmSection,
    /// Handlers in registration order: the last one listed sees each
    /// message first.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSection {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Registry key of the handler.
    pub name: String,
    /// Free-form `key=value` arguments passed to the handler factory.
    #[serde(default)]
    pub args: Vec<String>,
}

impl HandlerConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }
}

impl SwarmConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config with a catch-all echo, logging, and a permissive
    /// auth double on top.
    pub fn scaffold(name: &str) -> Self {
        SwarmConfig {
            swarm: SwarmSection {
                name: name.to_string(),
                description: None,
            },
            handlers: vec![
                HandlerConfig::new("echo"),
                HandlerConfig {
                    name: "log".to_string(),
                    args: vec![format!("prefix={name}")],
                },
                HandlerConfig::new("auth-pass"),
            ],
        }
    }
}

impl FromStr for SwarmConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Ok(toml::from_str(s)?)
    }
}
