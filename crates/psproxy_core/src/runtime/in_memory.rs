//! In-process emulation of the component broker.
//!
//! # Responsibility
//! - Provide a `ComRuntime` with the same observable rules as the OS broker
//!   for the operations proxy registration uses.
//! - Let callers install fake proxy components, inject broker rejections and
//!   inspect global state and call counts.
//!
//! # Invariants
//! - A component's class object resolves only while an activation context
//!   created from that component is active, or after the class was registered
//!   globally.
//! - Activation contexts deactivate in LIFO order.
//! - Inspection helpers (`ps_clsid`, `live_contexts`, ...) do not count as
//!   runtime calls.

use crate::model::descriptor::{ProxyDescriptorTable, ProxyDllInfo};
use crate::model::guid::Guid;
use crate::runtime::{ActivationCookie, ClassRegistrationToken, ComRuntime, OsError, OsResult};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const E_FAIL: i32 = 0x8000_4005_u32 as i32;
const E_ACCESSDENIED: i32 = 0x8007_0005_u32 as i32;
const REGDB_E_CLASSNOTREG: i32 = 0x8004_0154_u32 as i32;
const REGDB_E_IIDNOTREG: i32 = 0x8004_0155_u32 as i32;
const CO_E_OBJNOTREG: i32 = 0x8004_01FB_u32 as i32;
const HRESULT_MOD_NOT_FOUND: i32 = 0x8007_007E_u32 as i32;
const HRESULT_PROC_NOT_FOUND: i32 = 0x8007_007F_u32 as i32;
const HRESULT_RESOURCE_TYPE_NOT_FOUND: i32 = 0x8007_0715_u32 as i32;
const HRESULT_SXS_CANT_GEN_ACTCTX: i32 = 0x8007_36B1_u32 as i32;

/// Fake proxy component installed at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryComponent {
    pub class_id: Guid,
    pub table: ProxyDescriptorTable,
    /// Name of the descriptor export; `None` means the export is missing.
    pub entry_point: Option<String>,
    /// `false` emulates an export that yields null pointers.
    pub descriptor_available: bool,
    /// Manifest resource ids embedded in the module.
    pub manifest_resources: BTreeSet<u16>,
}

impl InMemoryComponent {
    /// Component exporting `GetProxyDllInfo` with an isolation manifest at id 2.
    pub fn new(class_id: Guid, table: ProxyDescriptorTable) -> Self {
        Self {
            class_id,
            table,
            entry_point: Some(crate::config::DEFAULT_ENTRY_POINT.to_string()),
            descriptor_available: true,
            manifest_resources: BTreeSet::from([crate::config::DEFAULT_MANIFEST_RESOURCE_ID]),
        }
    }

    pub fn without_entry_point(mut self) -> Self {
        self.entry_point = None;
        self
    }

    pub fn with_null_descriptor(mut self) -> Self {
        self.descriptor_available = false;
        self
    }

    pub fn without_manifest(mut self) -> Self {
        self.manifest_resources.clear();
        self
    }
}

/// Broker rejection that can be injected into an `InMemoryRuntime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fault {
    ActivateContext,
    ResolveClass,
    RegisterClass,
    RevokeClass,
    /// Rejects every `register_ps_clsid` call for this interface.
    PsClsidUpdate(Guid),
}

/// Loaded fake module.
#[derive(Debug, PartialEq, Eq)]
pub struct InMemoryModule {
    path: PathBuf,
}

/// Created fake activation context.
#[derive(Debug, PartialEq, Eq)]
pub struct InMemoryActivationContext {
    id: u64,
    class_id: Guid,
}

/// Local fake factory reference.
#[derive(Debug, PartialEq, Eq)]
pub struct InMemoryClassObject {
    class_id: Guid,
}

#[derive(Debug, Default)]
struct BrokerState {
    components: BTreeMap<PathBuf, InMemoryComponent>,
    loaded: BTreeMap<PathBuf, usize>,
    ps_clsids: BTreeMap<Guid, Guid>,
    class_registrations: BTreeMap<u32, Guid>,
    next_token: u32,
    live_contexts: BTreeMap<u64, Guid>,
    next_context_id: u64,
    active_stack: Vec<(usize, u64)>,
    next_cookie: usize,
    live_class_objects: usize,
    free_unused_calls: usize,
    faults: BTreeSet<Fault>,
}

/// Process-local `ComRuntime` implementation.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    state: RefCell<BrokerState>,
    calls: Cell<usize>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `component` loadable from `path`.
    pub fn install(&self, path: impl Into<PathBuf>, component: InMemoryComponent) {
        self.state
            .borrow_mut()
            .components
            .insert(path.into(), component);
    }

    pub fn inject(&self, fault: Fault) {
        self.state.borrow_mut().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.state.borrow_mut().faults.remove(&fault);
    }

    /// Seeds a pre-existing proxy/stub mapping without counting a call.
    pub fn seed_ps_clsid(&self, iid: Guid, class_id: Guid) {
        self.state.borrow_mut().ps_clsids.insert(iid, class_id);
    }

    /// Current proxy/stub mapping for `iid`.
    pub fn ps_clsid(&self, iid: Guid) -> Option<Guid> {
        self.state.borrow().ps_clsids.get(&iid).copied()
    }

    /// Snapshot of every proxy/stub mapping.
    pub fn ps_clsid_snapshot(&self) -> BTreeMap<Guid, Guid> {
        self.state.borrow().ps_clsids.clone()
    }

    /// Number of `ComRuntime` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn is_class_registered(&self, class_id: Guid) -> bool {
        self.state
            .borrow()
            .class_registrations
            .values()
            .any(|registered| *registered == class_id)
    }

    pub fn class_registration_count(&self) -> usize {
        self.state.borrow().class_registrations.len()
    }

    /// Activation contexts created and not yet released.
    pub fn live_contexts(&self) -> usize {
        self.state.borrow().live_contexts.len()
    }

    /// Activation contexts currently on the activation stack.
    pub fn active_contexts(&self) -> usize {
        self.state.borrow().active_stack.len()
    }

    /// Outstanding load count for `path`.
    pub fn load_count(&self, path: impl AsRef<Path>) -> usize {
        self.state
            .borrow()
            .loaded
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Local factory references not yet released.
    pub fn live_class_objects(&self) -> usize {
        self.state.borrow().live_class_objects
    }

    pub fn free_unused_library_calls(&self) -> usize {
        self.state.borrow().free_unused_calls
    }

    fn record_call(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn component_for(&self, module: &InMemoryModule) -> OsResult<InMemoryComponent> {
        self.state
            .borrow()
            .components
            .get(&module.path)
            .cloned()
            .ok_or_else(|| OsError::new(HRESULT_MOD_NOT_FOUND, "module is no longer installed"))
    }

    fn has_fault(&self, fault: Fault) -> bool {
        self.state.borrow().faults.contains(&fault)
    }
}

impl ComRuntime for InMemoryRuntime {
    type Module = InMemoryModule;
    type ActivationContext = InMemoryActivationContext;
    type ClassObject = InMemoryClassObject;

    fn load_module(&self, path: &Path) -> OsResult<Self::Module> {
        self.record_call();
        let mut state = self.state.borrow_mut();
        if !state.components.contains_key(path) {
            return Err(OsError::new(
                HRESULT_MOD_NOT_FOUND,
                "the specified module could not be found",
            ));
        }
        *state.loaded.entry(path.to_path_buf()).or_default() += 1;
        Ok(InMemoryModule {
            path: path.to_path_buf(),
        })
    }

    fn unload_module(&self, module: Self::Module) {
        self.record_call();
        let mut state = self.state.borrow_mut();
        let remaining = match state.loaded.get_mut(&module.path) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return,
        };
        if remaining == 0 {
            state.loaded.remove(&module.path);
        }
    }

    fn proxy_dll_info(
        &self,
        module: &Self::Module,
        entry_point: &str,
    ) -> OsResult<Option<ProxyDllInfo>> {
        self.record_call();
        let component = self.component_for(module)?;
        if component.entry_point.as_deref() != Some(entry_point) {
            return Err(OsError::new(
                HRESULT_PROC_NOT_FOUND,
                "the specified procedure could not be found",
            ));
        }
        if !component.descriptor_available {
            return Ok(None);
        }
        Ok(Some(ProxyDllInfo {
            class_id: component.class_id,
            table: component.table,
        }))
    }

    fn create_activation_context(
        &self,
        module: &Self::Module,
        resource_id: u16,
    ) -> OsResult<Self::ActivationContext> {
        self.record_call();
        let component = self.component_for(module)?;
        if !component.manifest_resources.contains(&resource_id) {
            return Err(OsError::new(
                HRESULT_RESOURCE_TYPE_NOT_FOUND,
                "the specified resource type cannot be found in the image file",
            ));
        }
        let mut state = self.state.borrow_mut();
        state.next_context_id += 1;
        let id = state.next_context_id;
        state.live_contexts.insert(id, component.class_id);
        Ok(InMemoryActivationContext {
            id,
            class_id: component.class_id,
        })
    }

    fn activate_context(&self, context: &Self::ActivationContext) -> OsResult<ActivationCookie> {
        self.record_call();
        if self.has_fault(Fault::ActivateContext) {
            return Err(OsError::new(
                HRESULT_SXS_CANT_GEN_ACTCTX,
                "activation context could not be activated",
            ));
        }
        let mut state = self.state.borrow_mut();
        if !state.live_contexts.contains_key(&context.id) {
            return Err(OsError::new(E_FAIL, "activation context was released"));
        }
        state.next_cookie += 1;
        let cookie = state.next_cookie;
        state.active_stack.push((cookie, context.id));
        Ok(ActivationCookie(cookie))
    }

    fn deactivate_context(&self, cookie: ActivationCookie) -> OsResult<()> {
        self.record_call();
        let mut state = self.state.borrow_mut();
        let is_top = state
            .active_stack
            .last()
            .is_some_and(|(top, _)| *top == cookie.0);
        if !is_top {
            return Err(OsError::new(
                E_FAIL,
                "activation cookie is not the active frame",
            ));
        }
        state.active_stack.pop();
        Ok(())
    }

    fn release_activation_context(&self, context: Self::ActivationContext) {
        self.record_call();
        self.state.borrow_mut().live_contexts.remove(&context.id);
    }

    fn get_class_object(&self, class_id: Guid) -> OsResult<Self::ClassObject> {
        self.record_call();
        if self.has_fault(Fault::ResolveClass) {
            return Err(OsError::new(E_FAIL, "class factory creation failed"));
        }
        let mut state = self.state.borrow_mut();
        let in_active_context = state
            .active_stack
            .last()
            .and_then(|(_, id)| state.live_contexts.get(id))
            .is_some_and(|active_class| *active_class == class_id);
        let globally_registered = state
            .class_registrations
            .values()
            .any(|registered| *registered == class_id);
        if !in_active_context && !globally_registered {
            return Err(OsError::new(REGDB_E_CLASSNOTREG, "class not registered"));
        }
        state.live_class_objects += 1;
        Ok(InMemoryClassObject { class_id })
    }

    fn register_class_object(
        &self,
        class_id: Guid,
        object: &Self::ClassObject,
    ) -> OsResult<ClassRegistrationToken> {
        self.record_call();
        if self.has_fault(Fault::RegisterClass) || object.class_id != class_id {
            return Err(OsError::new(
                E_ACCESSDENIED,
                "class object registration was rejected",
            ));
        }
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let token = state.next_token;
        state.class_registrations.insert(token, class_id);
        Ok(ClassRegistrationToken(token))
    }

    fn release_class_object(&self, _object: Self::ClassObject) {
        self.record_call();
        let mut state = self.state.borrow_mut();
        state.live_class_objects = state.live_class_objects.saturating_sub(1);
    }

    fn revoke_class_object(&self, token: ClassRegistrationToken) -> OsResult<()> {
        self.record_call();
        if self.has_fault(Fault::RevokeClass) {
            return Err(OsError::new(E_ACCESSDENIED, "class revocation was rejected"));
        }
        match self.state.borrow_mut().class_registrations.remove(&token.0) {
            Some(_) => Ok(()),
            None => Err(OsError::new(
                CO_E_OBJNOTREG,
                "object is not registered",
            )),
        }
    }

    fn free_unused_libraries(&self, _delay_ms: u32) {
        self.record_call();
        self.state.borrow_mut().free_unused_calls += 1;
    }

    fn get_ps_clsid(&self, iid: Guid) -> OsResult<Guid> {
        self.record_call();
        self.state
            .borrow()
            .ps_clsids
            .get(&iid)
            .copied()
            .ok_or_else(|| OsError::new(REGDB_E_IIDNOTREG, "interface not registered"))
    }

    fn register_ps_clsid(&self, iid: Guid, class_id: Option<Guid>) -> OsResult<()> {
        self.record_call();
        if self.has_fault(Fault::PsClsidUpdate(iid)) {
            return Err(OsError::new(
                E_ACCESSDENIED,
                "proxy/stub class update was rejected",
            ));
        }
        let mut state = self.state.borrow_mut();
        match class_id {
            Some(class_id) if !class_id.is_null() => {
                state.ps_clsids.insert(iid, class_id);
            }
            _ => {
                state.ps_clsids.remove(&iid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Fault, InMemoryComponent, InMemoryRuntime};
    use crate::model::descriptor::{ProxyDescriptorTable, ProxyFileEntry};
    use crate::model::guid::Guid;
    use crate::runtime::ComRuntime;
    use std::path::Path;

    const CLASS: Guid = Guid::from_fields(0xC1, 0, 0, [0; 8]);
    const IID_A: Guid = Guid::from_fields(0xA, 0, 0, [0; 8]);

    fn runtime_with_sample() -> InMemoryRuntime {
        let runtime = InMemoryRuntime::new();
        runtime.install(
            "sample.dll",
            InMemoryComponent::new(
                CLASS,
                ProxyDescriptorTable::new(vec![ProxyFileEntry::from_pairs([(IID_A, "IA")])]),
            ),
        );
        runtime
    }

    #[test]
    fn class_resolves_only_inside_component_context() {
        let runtime = runtime_with_sample();
        let module = runtime
            .load_module(Path::new("sample.dll"))
            .expect("module should load");

        let err = runtime
            .get_class_object(CLASS)
            .expect_err("class must not resolve outside context");
        assert_eq!(err.code, super::REGDB_E_CLASSNOTREG);

        let context = runtime
            .create_activation_context(&module, 2)
            .expect("context should be created");
        let cookie = runtime.activate_context(&context).expect("activation");
        let object = runtime.get_class_object(CLASS).expect("class resolves");
        runtime.deactivate_context(cookie).expect("deactivation");
        runtime.release_activation_context(context);
        runtime.release_class_object(object);
        runtime.unload_module(module);

        assert_eq!(runtime.live_contexts(), 0);
        assert_eq!(runtime.live_class_objects(), 0);
        assert_eq!(runtime.load_count("sample.dll"), 0);
    }

    #[test]
    fn deactivation_must_match_top_of_stack() {
        let runtime = runtime_with_sample();
        let module = runtime
            .load_module(Path::new("sample.dll"))
            .expect("module should load");
        let outer = runtime.create_activation_context(&module, 2).expect("outer");
        let inner = runtime.create_activation_context(&module, 2).expect("inner");
        let outer_cookie = runtime.activate_context(&outer).expect("outer activation");
        let inner_cookie = runtime.activate_context(&inner).expect("inner activation");

        assert!(runtime.deactivate_context(outer_cookie).is_err());
        runtime.deactivate_context(inner_cookie).expect("inner first");
        runtime.deactivate_context(outer_cookie).expect("then outer");
        assert_eq!(runtime.active_contexts(), 0);
    }

    #[test]
    fn injected_fault_rejects_only_target_interface() {
        let runtime = InMemoryRuntime::new();
        runtime.inject(Fault::PsClsidUpdate(IID_A));
        assert!(runtime.register_ps_clsid(IID_A, Some(CLASS)).is_err());
        runtime.clear_fault(Fault::PsClsidUpdate(IID_A));
        runtime
            .register_ps_clsid(IID_A, Some(CLASS))
            .expect("update should pass after clearing fault");
        assert_eq!(runtime.ps_clsid(IID_A), Some(CLASS));

        runtime
            .register_ps_clsid(IID_A, None)
            .expect("clearing a mapping should succeed");
        assert_eq!(runtime.ps_clsid(IID_A), None);
    }

    #[test]
    fn inspection_helpers_do_not_count_as_calls() {
        let runtime = runtime_with_sample();
        let _ = runtime.ps_clsid(IID_A);
        let _ = runtime.live_contexts();
        let _ = runtime.is_class_registered(CLASS);
        assert_eq!(runtime.calls(), 0);
    }
}
