//! OS broker capability boundary.
//!
//! # Responsibility
//! - Define every interaction the registration core has with process-wide OS
//!   state: module loading, activation contexts, class objects and the
//!   proxy/stub class mapping.
//! - Keep registration logic testable against a substitute runtime.
//!
//! # Invariants
//! - Handles returned by `acquire`-style calls are handed back exactly once
//!   through their matching release call; the registration layer enforces this
//!   with drop guards.
//! - Implementations never log on behalf of the core; errors are returned.

use crate::model::descriptor::ProxyDllInfo;
use crate::model::guid::Guid;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub mod in_memory;
#[cfg(windows)]
pub mod win32;

pub type OsResult<T> = Result<T, OsError>;

/// Error reported by the OS (or a substitute runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsError {
    /// HRESULT or Win32 error code widened to `i32`.
    pub code: i32,
    pub message: String,
}

impl OsError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for OsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // HRESULTs read best as unsigned hex, e.g. 0x80040154.
        write!(f, "{} (code 0x{:08X})", self.message, self.code as u32)
    }
}

impl Error for OsError {}

/// Cookie returned by activating an activation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationCookie(pub usize);

/// Broker-assigned token for one global class object registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRegistrationToken(pub u32);

/// Process-wide component broker operations used by proxy registration.
///
/// Every method is a synchronous call into process-global state; callers must
/// serialize use across threads.
pub trait ComRuntime {
    /// Loaded module handle.
    type Module;
    /// Created (not necessarily active) activation context.
    type ActivationContext;
    /// Local reference to a class factory.
    type ClassObject;

    fn load_module(&self, path: &Path) -> OsResult<Self::Module>;

    fn unload_module(&self, module: Self::Module);

    /// Calls the module's descriptor export.
    ///
    /// Returns `Err` when the export is missing and `Ok(None)` when the export
    /// yields a null table or a null class id.
    fn proxy_dll_info(
        &self,
        module: &Self::Module,
        entry_point: &str,
    ) -> OsResult<Option<ProxyDllInfo>>;

    /// Creates an activation context from a manifest resource in `module`.
    fn create_activation_context(
        &self,
        module: &Self::Module,
        resource_id: u16,
    ) -> OsResult<Self::ActivationContext>;

    fn activate_context(&self, context: &Self::ActivationContext) -> OsResult<ActivationCookie>;

    fn deactivate_context(&self, cookie: ActivationCookie) -> OsResult<()>;

    fn release_activation_context(&self, context: Self::ActivationContext);

    /// Resolves the factory for `class_id` as an in-process server.
    fn get_class_object(&self, class_id: Guid) -> OsResult<Self::ClassObject>;

    /// Registers `object` globally as a multi-use in-process server.
    fn register_class_object(
        &self,
        class_id: Guid,
        object: &Self::ClassObject,
    ) -> OsResult<ClassRegistrationToken>;

    fn release_class_object(&self, object: Self::ClassObject);

    fn revoke_class_object(&self, token: ClassRegistrationToken) -> OsResult<()>;

    /// Best-effort unload of in-process libraries nobody references anymore.
    fn free_unused_libraries(&self, delay_ms: u32);

    /// Returns the current proxy/stub class mapped for `iid`.
    ///
    /// An error means no mapping is set.
    fn get_ps_clsid(&self, iid: Guid) -> OsResult<Guid>;

    /// Maps `iid` to `class_id`; `None` clears the mapping.
    fn register_ps_clsid(&self, iid: Guid, class_id: Option<Guid>) -> OsResult<()>;
}
