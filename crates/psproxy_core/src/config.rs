//! Registration configuration.
//!
//! # Responsibility
//! - Hold the component contract constants a registrar relies on.
//! - Validate caller overrides before any OS state is touched.
//!
//! # Invariants
//! - `RegistrationConfig::default()` always validates.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Descriptor export every MIDL-generated proxy DLL provides.
pub const DEFAULT_ENTRY_POINT: &str = "GetProxyDllInfo";
/// `ISOLATIONAWARE_MANIFEST_RESOURCE_ID`.
pub const DEFAULT_MANIFEST_RESOURCE_ID: u16 = 2;
/// `INFINITE`: let the broker pick when to unload unused libraries.
pub const DEFAULT_FREE_UNUSED_LIBRARIES_DELAY_MS: u32 = u32::MAX;

/// Tunables for `ProxyRegistrar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// Exported symbol yielding the descriptor table and class id.
    pub entry_point: String,
    /// Resource id of the embedded isolation manifest.
    pub manifest_resource_id: u16,
    /// Delay passed to the free-unused-libraries call after a revoke.
    pub free_unused_libraries_delay_ms: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            manifest_resource_id: DEFAULT_MANIFEST_RESOURCE_ID,
            free_unused_libraries_delay_ms: DEFAULT_FREE_UNUSED_LIBRARIES_DELAY_MS,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let entry_point = self.entry_point.trim();
        if entry_point.is_empty() {
            return Err(ConfigError::EmptyEntryPoint);
        }
        if !is_symbol_name(entry_point) || entry_point != self.entry_point {
            return Err(ConfigError::InvalidEntryPoint(self.entry_point.clone()));
        }
        if self.manifest_resource_id == 0 {
            return Err(ConfigError::ZeroManifestResourceId);
        }
        Ok(())
    }
}

fn is_symbol_name(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyEntryPoint,
    InvalidEntryPoint(String),
    ZeroManifestResourceId,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEntryPoint => write!(f, "entry point must not be empty"),
            Self::InvalidEntryPoint(value) => {
                write!(f, "entry point is not a valid export name: {value}")
            }
            Self::ZeroManifestResourceId => write!(f, "manifest resource id must be non-zero"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RegistrationConfig};

    #[test]
    fn default_config_validates() {
        RegistrationConfig::default()
            .validate()
            .expect("default config should be valid");
    }

    #[test]
    fn rejects_empty_or_malformed_entry_point() {
        let mut config = RegistrationConfig {
            entry_point: "   ".to_string(),
            ..RegistrationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyEntryPoint));

        config.entry_point = "Get Proxy".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEntryPoint(_))
        ));

        config.entry_point = " GetProxyDllInfo".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEntryPoint(_))
        ));
    }

    #[test]
    fn rejects_zero_manifest_resource_id() {
        let config = RegistrationConfig {
            manifest_resource_id: 0,
            ..RegistrationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroManifestResourceId));
    }
}
