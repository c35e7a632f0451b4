//! Win32 implementation of the broker boundary.
//!
//! # Responsibility
//! - Map `ComRuntime` calls onto `LoadLibraryW`, activation context APIs and
//!   the COM class/PSClsid registries.
//!
//! # Invariants
//! - COM must already be initialized on the calling thread.
//! - Descriptor tables are copied out before the module can be unloaded.

mod ffi;

use crate::model::descriptor::ProxyDllInfo;
use crate::model::guid::Guid;
use crate::runtime::{ActivationCookie, ClassRegistrationToken, ComRuntime, OsError, OsResult};
use ffi::{guid_from_native, guid_to_native, read_descriptor_table, GetProxyDllInfoFn};
use std::ffi::CString;
use std::path::Path;
use windows::core::{IUnknown, GUID, HSTRING, PCSTR, PCWSTR};
use windows::Win32::Foundation::{FreeLibrary, HANDLE, HMODULE};
use windows::Win32::System::ApplicationInstallationAndServicing::{
    ActivateActCtx, CreateActCtxW, DeactivateActCtx, ReleaseActCtx, ACTCTXW,
    ACTCTX_FLAG_HMODULE_VALID, ACTCTX_FLAG_RESOURCE_NAME_VALID,
};
use windows::Win32::System::Com::{
    CoFreeUnusedLibrariesEx, CoGetClassObject, CoGetPSClsid, CoRegisterClassObject,
    CoRegisterPSClsid, CoRevokeClassObject, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE,
};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

const E_INVALIDARG: i32 = 0x8007_0057_u32 as i32;

impl From<windows::core::Error> for OsError {
    fn from(value: windows::core::Error) -> Self {
        OsError::new(value.code().0, value.message())
    }
}

/// Loaded proxy DLL.
#[derive(Debug)]
pub struct Win32Module(HMODULE);

/// Created activation context.
#[derive(Debug)]
pub struct Win32ActivationContext(HANDLE);

/// Production runtime backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Runtime;

impl Win32Runtime {
    pub fn new() -> Self {
        Self
    }
}

impl ComRuntime for Win32Runtime {
    type Module = Win32Module;
    type ActivationContext = Win32ActivationContext;
    type ClassObject = IUnknown;

    fn load_module(&self, path: &Path) -> OsResult<Self::Module> {
        let wide = HSTRING::from(path);
        // SAFETY: `wide` is a valid nul-terminated string for the call duration.
        let handle = unsafe { LoadLibraryW(&wide) }?;
        Ok(Win32Module(handle))
    }

    fn unload_module(&self, module: Self::Module) {
        // SAFETY: handle came from `LoadLibraryW` and is released once.
        let _ = unsafe { FreeLibrary(module.0) };
    }

    fn proxy_dll_info(
        &self,
        module: &Self::Module,
        entry_point: &str,
    ) -> OsResult<Option<ProxyDllInfo>> {
        let symbol = CString::new(entry_point)
            .map_err(|_| OsError::new(E_INVALIDARG, "entry point contains a nul byte"))?;
        // SAFETY: `symbol` is nul-terminated and `module` is loaded.
        let proc = unsafe { GetProcAddress(module.0, PCSTR(symbol.as_ptr().cast())) }
            .ok_or_else(|| OsError::from(windows::core::Error::from_win32()))?;
        // SAFETY: the MIDL proxy contract fixes the export's signature.
        let get_info: GetProxyDllInfoFn = unsafe { std::mem::transmute(proc) };

        let mut files = std::ptr::null();
        let mut class_id: *const GUID = std::ptr::null();
        // SAFETY: both out-pointers are valid for writes.
        unsafe { get_info(&mut files, &mut class_id) };
        if files.is_null() || class_id.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null pointers from the export stay valid while the module is loaded.
        let (class_id, table) =
            unsafe { (guid_from_native(&*class_id), read_descriptor_table(files)) };
        Ok(Some(ProxyDllInfo { class_id, table }))
    }

    fn create_activation_context(
        &self,
        module: &Self::Module,
        resource_id: u16,
    ) -> OsResult<Self::ActivationContext> {
        let request = ACTCTXW {
            cbSize: std::mem::size_of::<ACTCTXW>() as u32,
            dwFlags: ACTCTX_FLAG_HMODULE_VALID | ACTCTX_FLAG_RESOURCE_NAME_VALID,
            // MAKEINTRESOURCE
            lpResourceName: PCWSTR(usize::from(resource_id) as *const u16),
            hModule: module.0,
            ..Default::default()
        };
        // SAFETY: `request` is fully initialized and outlives the call.
        let handle = unsafe { CreateActCtxW(&request) }?;
        Ok(Win32ActivationContext(handle))
    }

    fn activate_context(&self, context: &Self::ActivationContext) -> OsResult<ActivationCookie> {
        let mut cookie = 0usize;
        // SAFETY: handle is live until `release_activation_context`.
        unsafe { ActivateActCtx(context.0, &mut cookie) }?;
        Ok(ActivationCookie(cookie))
    }

    fn deactivate_context(&self, cookie: ActivationCookie) -> OsResult<()> {
        // SAFETY: cookie came from `ActivateActCtx` on this thread.
        unsafe { DeactivateActCtx(0, cookie.0) }?;
        Ok(())
    }

    fn release_activation_context(&self, context: Self::ActivationContext) {
        // SAFETY: handle came from `CreateActCtxW` and is released once.
        unsafe { ReleaseActCtx(context.0) };
    }

    fn get_class_object(&self, class_id: Guid) -> OsResult<Self::ClassObject> {
        let clsid = guid_to_native(class_id);
        // SAFETY: `clsid` outlives the call.
        let object = unsafe { CoGetClassObject::<IUnknown>(&clsid, CLSCTX_INPROC_SERVER, None) }?;
        Ok(object)
    }

    fn register_class_object(
        &self,
        class_id: Guid,
        object: &Self::ClassObject,
    ) -> OsResult<ClassRegistrationToken> {
        let clsid = guid_to_native(class_id);
        // SAFETY: `clsid` outlives the call; COM adds its own reference to `object`.
        let cookie = unsafe {
            CoRegisterClassObject(&clsid, object, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE)
        }?;
        Ok(ClassRegistrationToken(cookie))
    }

    fn release_class_object(&self, object: Self::ClassObject) {
        drop(object);
    }

    fn revoke_class_object(&self, token: ClassRegistrationToken) -> OsResult<()> {
        // SAFETY: plain value call.
        unsafe { CoRevokeClassObject(token.0) }?;
        Ok(())
    }

    fn free_unused_libraries(&self, delay_ms: u32) {
        // SAFETY: plain value call.
        unsafe { CoFreeUnusedLibrariesEx(delay_ms, 0) };
    }

    fn get_ps_clsid(&self, iid: Guid) -> OsResult<Guid> {
        let iid = guid_to_native(iid);
        // SAFETY: `iid` outlives the call.
        let clsid = unsafe { CoGetPSClsid(&iid) }?;
        Ok(guid_from_native(&clsid))
    }

    fn register_ps_clsid(&self, iid: Guid, class_id: Option<Guid>) -> OsResult<()> {
        let iid = guid_to_native(iid);
        let clsid = guid_to_native(class_id.unwrap_or(Guid::NULL));
        // SAFETY: both GUIDs outlive the call.
        unsafe { CoRegisterPSClsid(&iid, &clsid) }?;
        Ok(())
    }
}
