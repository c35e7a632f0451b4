//! Temporary COM proxy/stub registration.
//! Registers a proxy DLL's class object and interface mappings process-wide
//! and restores the prior state on unregistration.

pub mod config;
pub mod logging;
pub mod model;
pub mod registration;
pub mod runtime;

pub use config::{ConfigError, RegistrationConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::descriptor::{
    InterfaceDescriptor, ProxyDescriptorTable, ProxyDllInfo, ProxyFileEntry,
};
pub use model::guid::Guid;
pub use registration::error::{RegistrationError, RegistrationResult};
pub use registration::record::{
    PSClsidBackup, RegistrationRecord, RegistrationSummary, RemapFailure,
};
pub use registration::service::ProxyRegistrar;
pub use runtime::in_memory::{Fault, InMemoryComponent, InMemoryRuntime};
#[cfg(windows)]
pub use runtime::win32::Win32Runtime;
pub use runtime::{ActivationCookie, ClassRegistrationToken, ComRuntime, OsError, OsResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
