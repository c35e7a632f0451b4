//! Registration failure taxonomy.

use crate::config::ConfigError;
use crate::model::guid::Guid;
use crate::runtime::OsError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Hard failure of `ProxyRegistrar::register`.
///
/// Every variant means no class registration is left behind and no proxy/stub
/// mapping was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    ModuleLoad {
        path: PathBuf,
        source: OsError,
    },
    EntryPointMissing {
        path: PathBuf,
        entry_point: String,
        source: OsError,
    },
    DescriptorUnavailable {
        path: PathBuf,
    },
    ContextCreate {
        path: PathBuf,
        source: OsError,
    },
    ContextActivate {
        path: PathBuf,
        source: OsError,
    },
    ClassResolution {
        path: PathBuf,
        class_id: Guid,
        source: OsError,
    },
    ClassRegistration {
        path: PathBuf,
        class_id: Guid,
        source: OsError,
    },
    AlreadyRegistered {
        path: PathBuf,
        class_id: Guid,
    },
    InvalidConfig(ConfigError),
}

impl RegistrationError {
    /// Stable code used in `error_code=` log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ModuleLoad { .. } => "module_load_failed",
            Self::EntryPointMissing { .. } => "entry_point_missing",
            Self::DescriptorUnavailable { .. } => "descriptor_unavailable",
            Self::ContextCreate { .. } => "context_create_failed",
            Self::ContextActivate { .. } => "context_activate_failed",
            Self::ClassResolution { .. } => "class_resolution_failed",
            Self::ClassRegistration { .. } => "class_registration_failed",
            Self::AlreadyRegistered { .. } => "already_registered",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl Display for RegistrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModuleLoad { path, source } => {
                write!(f, "failed to load {}: {source}", path.display())
            }
            Self::EntryPointMissing {
                path, entry_point, ..
            } => write!(
                f,
                "{entry_point} function not found in {}",
                path.display()
            ),
            Self::DescriptorUnavailable { path } => write!(
                f,
                "could not fetch proxy information from {}",
                path.display()
            ),
            Self::ContextCreate { path, source } => write!(
                f,
                "could not create activation context for {}: {source}",
                path.display()
            ),
            Self::ContextActivate { path, source } => write!(
                f,
                "could not activate activation context for {}: {source}",
                path.display()
            ),
            Self::ClassResolution {
                path,
                class_id,
                source,
            } => write!(
                f,
                "could not fetch class object {class_id} for {}: {source}",
                path.display()
            ),
            Self::ClassRegistration {
                path,
                class_id,
                source,
            } => write!(
                f,
                "could not register class object {class_id} for {}: {source}",
                path.display()
            ),
            Self::AlreadyRegistered { path, class_id } => write!(
                f,
                "class {class_id} from {} is already registered",
                path.display()
            ),
            Self::InvalidConfig(err) => write!(f, "invalid registration config: {err}"),
        }
    }
}

impl Error for RegistrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ModuleLoad { source, .. }
            | Self::EntryPointMissing { source, .. }
            | Self::ContextCreate { source, .. }
            | Self::ContextActivate { source, .. }
            | Self::ClassResolution { source, .. }
            | Self::ClassRegistration { source, .. } => Some(source),
            Self::InvalidConfig(err) => Some(err),
            Self::DescriptorUnavailable { .. } | Self::AlreadyRegistered { .. } => None,
        }
    }
}

impl From<ConfigError> for RegistrationError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

#[cfg(test)]
mod tests {
    use super::RegistrationError;
    use crate::runtime::OsError;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn exposes_os_error_as_source() {
        let err = RegistrationError::ModuleLoad {
            path: PathBuf::from("proxy.dll"),
            source: OsError::new(126, "module not found"),
        };
        assert_eq!(err.error_code(), "module_load_failed");
        let source = err.source().expect("load failure should carry a source");
        assert!(source.to_string().contains("module not found"));
    }

    #[test]
    fn descriptor_failure_has_no_source() {
        let err = RegistrationError::DescriptorUnavailable {
            path: PathBuf::from("proxy.dll"),
        };
        assert!(err.source().is_none());
        assert!(err.to_string().contains("proxy.dll"));
    }
}
