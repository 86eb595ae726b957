use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Symbol of the well-known program entry.
pub const DEFAULT_ENTRY_SYMBOL: &str = "main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "toml-config")]
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config files require the `toml-config` feature")]
    TomlDisabled,

    #[error("unknown profile `{0}` (expected `baseline` or `heatmap`)")]
    UnknownProfile(String),

    #[error("unknown analysis feature `{0}`")]
    UnknownFeature(String),
}

/// Which functions the host-facing pass walks at the top level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Only the function named by the entry symbol.
    #[default]
    Entry,
    /// Every function with a body.
    AllFunctions,
}

/// Named option presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Callee bodies only.
    Baseline,
    /// Adds argument use-chains and global operand attribution.
    #[default]
    Heatmap,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Baseline => "baseline",
            Profile::Heatmap => "heatmap",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" | "skeleton" => Ok(Profile::Baseline),
            "heatmap" => Ok(Profile::Heatmap),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Analysis options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub entry_symbol: String,
    pub scope: Scope,
    /// Visit the users of every argument passed at a call site.
    pub traverse_argument_uses: bool,
    /// Attribute an index operand that names a global to the global's
    /// declared structure type.
    pub attribute_global_operands: bool,
    /// Classify each instruction at most once per top-level walk.
    pub deduplicate: bool,
}

impl AnalysisOptions {
    pub const ARGUMENT_USES: &'static str = "argument_uses";
    pub const GLOBAL_OPERANDS: &'static str = "global_operands";
    pub const DEDUPLICATE: &'static str = "deduplicate";

    pub fn baseline() -> Self {
        Self {
            entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
            scope: Scope::Entry,
            traverse_argument_uses: false,
            attribute_global_operands: false,
            deduplicate: true,
        }
    }

    pub fn heatmap() -> Self {
        Self {
            traverse_argument_uses: true,
            attribute_global_operands: true,
            ..Self::baseline()
        }
    }

    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Baseline => Self::baseline(),
            Profile::Heatmap => Self::heatmap(),
        }
    }

    /// Resets the precision flags to the preset, keeping entry, scope and
    /// de-duplication.
    pub fn apply_profile(&mut self, profile: Profile) {
        let preset = Self::for_profile(profile);
        self.traverse_argument_uses = preset.traverse_argument_uses;
        self.attribute_global_operands = preset.attribute_global_operands;
    }

    pub fn set_feature(&mut self, feature: &str, enabled: bool) -> Result<(), ConfigError> {
        match feature {
            Self::ARGUMENT_USES => self.traverse_argument_uses = enabled,
            Self::GLOBAL_OPERANDS => self.attribute_global_operands = enabled,
            Self::DEDUPLICATE => self.deduplicate = enabled,
            _ => return Err(ConfigError::UnknownFeature(feature.to_string())),
        }
        Ok(())
    }

    pub fn walks_all_functions(&self) -> bool {
        self.scope == Scope::AllFunctions
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::heatmap()
    }
}

/// Reads options from a TOML file. Missing keys keep their defaults.
#[cfg(feature = "toml-config")]
pub fn load_options(path: &Path) -> Result<AnalysisOptions, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_options(&source).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(feature = "toml-config"))]
pub fn load_options(path: &Path) -> Result<AnalysisOptions, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }
    Err(ConfigError::TomlDisabled)
}

#[cfg(feature = "toml-config")]
pub fn parse_options(source: &str) -> Result<AnalysisOptions, toml::de::Error> {
    toml::from_str(source)
}
