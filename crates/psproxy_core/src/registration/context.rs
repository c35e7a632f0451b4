//! Isolated activation context scope.
//!
//! # Responsibility
//! - Build a private, non-persistent activation context from the manifest
//!   resource embedded in a proxy module.
//! - Keep it active for exactly one wrapped call.
//!
//! # Invariants
//! - Deactivation happens before release, on every exit path.
//! - A context that fails to activate is still released.

use crate::registration::error::{RegistrationError, RegistrationResult};
use crate::runtime::{ActivationCookie, ComRuntime};
use log::{debug, error};
use std::path::{Path, PathBuf};

/// Active isolated context; deactivates and releases on drop.
pub struct IsolatedContext<'r, R: ComRuntime> {
    runtime: &'r R,
    context: Option<R::ActivationContext>,
    cookie: Option<ActivationCookie>,
    path: PathBuf,
}

impl<'r, R: ComRuntime> IsolatedContext<'r, R> {
    /// Creates and activates the context for `module`.
    ///
    /// # Errors
    /// - `ContextCreate` when the manifest resource is missing or malformed.
    /// - `ContextActivate` when the OS refuses activation.
    pub fn acquire(
        runtime: &'r R,
        module: &R::Module,
        resource_id: u16,
        path: &Path,
    ) -> RegistrationResult<Self> {
        let context = runtime
            .create_activation_context(module, resource_id)
            .map_err(|source| RegistrationError::ContextCreate {
                path: path.to_path_buf(),
                source,
            })?;
        let activation = runtime.activate_context(&context);
        // The guard owns the context before the activation result is checked,
        // so a refused activation still releases it.
        let mut scope = Self {
            runtime,
            context: Some(context),
            cookie: None,
            path: path.to_path_buf(),
        };
        let cookie = activation.map_err(|source| RegistrationError::ContextActivate {
            path: path.to_path_buf(),
            source,
        })?;
        scope.cookie = Some(cookie);
        debug!(
            "event=actctx_activate module=context status=ok path={} resource_id={}",
            path.display(),
            resource_id
        );
        Ok(scope)
    }

    /// Runs `f` with the context active, then tears the context down.
    pub fn scoped<T>(self, f: impl FnOnce() -> T) -> T {
        let result = f();
        drop(self);
        result
    }
}

impl<R: ComRuntime> Drop for IsolatedContext<'_, R> {
    fn drop(&mut self) {
        if let Some(cookie) = self.cookie.take() {
            if let Err(err) = self.runtime.deactivate_context(cookie) {
                error!(
                    "event=actctx_deactivate module=context status=error path={} error={}",
                    self.path.display(),
                    err
                );
            }
        }
        if let Some(context) = self.context.take() {
            self.runtime.release_activation_context(context);
            debug!(
                "event=actctx_release module=context status=ok path={}",
                self.path.display()
            );
        }
    }
}
