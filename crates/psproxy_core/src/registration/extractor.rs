//! Proxy module loading and descriptor extraction.
//!
//! # Responsibility
//! - Load a proxy component and read its interface table and class id.
//! - Own the load handle until the broker takes over the component lifetime.
//!
//! # Invariants
//! - The module is unloaded exactly once, when its `ModuleGuard` drops.
//! - Loading the same path concurrently is not guarded here.

use crate::model::descriptor::ProxyDllInfo;
use crate::registration::error::{RegistrationError, RegistrationResult};
use crate::runtime::ComRuntime;
use log::debug;
use std::path::{Path, PathBuf};

/// Scoped load handle; unloads the module on drop.
pub struct ModuleGuard<'r, R: ComRuntime> {
    runtime: &'r R,
    module: Option<R::Module>,
    path: PathBuf,
}

impl<'r, R: ComRuntime> ModuleGuard<'r, R> {
    /// Loads `path` through `runtime`.
    pub fn load(runtime: &'r R, path: &Path) -> RegistrationResult<Self> {
        let module = runtime
            .load_module(path)
            .map_err(|source| RegistrationError::ModuleLoad {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            runtime,
            module: Some(module),
            path: path.to_path_buf(),
        })
    }

    pub fn module(&self) -> &R::Module {
        // Only `drop` takes the module out.
        self.module
            .as_ref()
            .unwrap_or_else(|| unreachable!("module taken before drop"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<R: ComRuntime> Drop for ModuleGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            self.runtime.unload_module(module);
            debug!(
                "event=module_unload module=extractor status=ok path={}",
                self.path.display()
            );
        }
    }
}

/// Loads `path` and calls its descriptor export.
///
/// On success the module stays loaded inside the returned guard.
///
/// # Errors
/// - `ModuleLoad` when the module cannot be loaded.
/// - `EntryPointMissing` when `entry_point` is not exported.
/// - `DescriptorUnavailable` when the export yields a null table or class id.
pub fn extract<'r, R: ComRuntime>(
    runtime: &'r R,
    path: &Path,
    entry_point: &str,
) -> RegistrationResult<(ModuleGuard<'r, R>, ProxyDllInfo)> {
    let guard = ModuleGuard::load(runtime, path)?;
    let info = runtime
        .proxy_dll_info(guard.module(), entry_point)
        .map_err(|source| RegistrationError::EntryPointMissing {
            path: path.to_path_buf(),
            entry_point: entry_point.to_string(),
            source,
        })?
        .ok_or_else(|| RegistrationError::DescriptorUnavailable {
            path: path.to_path_buf(),
        })?;
    debug!(
        "event=descriptor_extract module=extractor status=ok path={} class_id={} interfaces={}",
        path.display(),
        info.class_id,
        info.table.interface_count()
    );
    Ok((guard, info))
}
