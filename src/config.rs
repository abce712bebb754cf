use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// default number of symbolic hops `resolve` follows before giving up
pub const DEFAULT_SYMREF_MAX_HOPS: usize = 5;

/// repository configuration stored in config.toml
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// identity used when callers don't pass one
    #[serde(default)]
    pub user: UserConfig,
    /// storage and ref behaviour
    #[serde(default)]
    pub core: CoreConfig,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// author string in `Name <email>` form
    pub fn author(&self) -> String {
        match &self.user.email {
            Some(email) => format!("{} <{}>", self.user.name, email),
            None => self.user.name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: "cairn".to_string(),
            email: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// zstd level for stored objects
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// symbolic ref hops before `ReferenceCycle`
    #[serde(default = "default_symref_max_hops")]
    pub symref_max_hops: usize,
    /// branch HEAD points at after init
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            symref_max_hops: default_symref_max_hops(),
            default_branch: default_branch(),
        }
    }
}

fn default_compression_level() -> i32 {
    3
}

fn default_symref_max_hops() -> usize {
    DEFAULT_SYMREF_MAX_HOPS
}

fn default_branch() -> String {
    "main".to_string()
}
