//! Two-phase class object registration.
//!
//! # Responsibility
//! - Resolve the component's class factory while its isolated context is
//!   active.
//! - Register that factory with the broker after the context is gone.
//!
//! # Invariants
//! - The isolated context is torn down before phase 2 starts and before any
//!   phase 1 error is returned.
//! - The local factory reference is released on every path; the broker keeps
//!   its own reference after a successful registration.

use crate::model::guid::Guid;
use crate::registration::context::IsolatedContext;
use crate::registration::error::{RegistrationError, RegistrationResult};
use crate::runtime::{ClassRegistrationToken, ComRuntime};
use log::info;
use std::path::Path;

/// Scoped factory reference; released on drop.
pub struct ClassObjectRef<'r, R: ComRuntime> {
    runtime: &'r R,
    object: Option<R::ClassObject>,
}

impl<'r, R: ComRuntime> ClassObjectRef<'r, R> {
    pub fn new(runtime: &'r R, object: R::ClassObject) -> Self {
        Self {
            runtime,
            object: Some(object),
        }
    }

    pub fn get(&self) -> &R::ClassObject {
        self.object
            .as_ref()
            .unwrap_or_else(|| unreachable!("class object taken before drop"))
    }
}

impl<R: ComRuntime> Drop for ClassObjectRef<'_, R> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.runtime.release_class_object(object);
        }
    }
}

/// Resolves `class_id` inside the module's isolated context, then registers
/// it globally as a multi-use in-process server.
///
/// # Errors
/// - `ContextCreate` / `ContextActivate` from the isolated context.
/// - `ClassResolution` when the factory cannot be fetched.
/// - `ClassRegistration` when the broker rejects the global registration.
pub fn register_class_object<R: ComRuntime>(
    runtime: &R,
    module: &R::Module,
    class_id: Guid,
    manifest_resource_id: u16,
    path: &Path,
) -> RegistrationResult<ClassRegistrationToken> {
    let context = IsolatedContext::acquire(runtime, module, manifest_resource_id, path)?;
    let resolved = context.scoped(|| runtime.get_class_object(class_id));
    let factory = ClassObjectRef::new(
        runtime,
        resolved.map_err(|source| RegistrationError::ClassResolution {
            path: path.to_path_buf(),
            class_id,
            source,
        })?,
    );

    let token = runtime
        .register_class_object(class_id, factory.get())
        .map_err(|source| RegistrationError::ClassRegistration {
            path: path.to_path_buf(),
            class_id,
            source,
        })?;
    info!(
        "event=class_register module=registrar status=ok path={} class_id={} token={}",
        path.display(),
        class_id,
        token.0
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::register_class_object;
    use crate::model::descriptor::ProxyDescriptorTable;
    use crate::model::guid::Guid;
    use crate::registration::error::RegistrationError;
    use crate::registration::extractor::ModuleGuard;
    use crate::runtime::in_memory::{Fault, InMemoryComponent, InMemoryRuntime};
    use std::path::Path;

    const CLASS: Guid = Guid::from_fields(0xC1, 0, 0, [0; 8]);

    fn runtime() -> InMemoryRuntime {
        let runtime = InMemoryRuntime::new();
        runtime.install(
            "proxy.dll",
            InMemoryComponent::new(CLASS, ProxyDescriptorTable::default()),
        );
        runtime
    }

    #[test]
    fn registers_class_and_releases_local_reference() {
        let runtime = runtime();
        let path = Path::new("proxy.dll");
        let module = ModuleGuard::load(&runtime, path).expect("module should load");

        register_class_object(&runtime, module.module(), CLASS, 2, path)
            .expect("registration should succeed");

        assert!(runtime.is_class_registered(CLASS));
        assert_eq!(runtime.live_class_objects(), 0);
        assert_eq!(runtime.live_contexts(), 0);
    }

    #[test]
    fn resolution_failure_tears_context_down() {
        let runtime = runtime();
        runtime.inject(Fault::ResolveClass);
        let path = Path::new("proxy.dll");
        let module = ModuleGuard::load(&runtime, path).expect("module should load");

        let err = register_class_object(&runtime, module.module(), CLASS, 2, path)
            .expect_err("resolution failure must fail registration");
        assert!(matches!(err, RegistrationError::ClassResolution { .. }));
        assert_eq!(runtime.live_contexts(), 0);
        assert_eq!(runtime.active_contexts(), 0);
    }

    #[test]
    fn registration_failure_releases_factory() {
        let runtime = runtime();
        runtime.inject(Fault::RegisterClass);
        let path = Path::new("proxy.dll");
        let module = ModuleGuard::load(&runtime, path).expect("module should load");

        let err = register_class_object(&runtime, module.module(), CLASS, 2, path)
            .expect_err("broker rejection must fail registration");
        assert!(matches!(err, RegistrationError::ClassRegistration { .. }));
        assert!(!runtime.is_class_registered(CLASS));
        assert_eq!(runtime.live_class_objects(), 0);
    }
}
