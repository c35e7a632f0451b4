//! C ABI for native hosts.
//!
//! # Responsibility
//! - Expose register/unregister as a pointer-in, pointer-out pair.
//! - Keep one process-wide registrar so duplicate registrations are detected
//!   across callers.
//!
//! # Invariants
//! - Exported functions never unwind across the boundary.
//! - A null registration handle is rejected without touching the broker.
//! - Each non-null handle is consumed by exactly one `unregister_com_proxy`.

use psproxy_core::{ComRuntime, ProxyRegistrar, RegistrationRecord};
use std::path::Path;

/// Opaque registration handle owned by the C caller.
pub struct ProxyRegistration {
    record: RegistrationRecord,
}

impl ProxyRegistration {
    pub fn record(&self) -> &RegistrationRecord {
        &self.record
    }
}

/// Registers `path` and boxes the record for a C caller.
///
/// Returns null on any registration failure; the failure is already logged.
pub fn register_into_raw<R: ComRuntime>(
    registrar: &mut ProxyRegistrar<R>,
    path: &Path,
) -> *mut ProxyRegistration {
    match registrar.register(path) {
        Ok(record) => Box::into_raw(Box::new(ProxyRegistration { record })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Unregisters and frees a handle from `register_into_raw`.
///
/// # Safety
/// `handle` must be null or a pointer returned by `register_into_raw` that has
/// not been passed here before.
pub unsafe fn unregister_from_raw<R: ComRuntime>(
    registrar: &mut ProxyRegistrar<R>,
    handle: *mut ProxyRegistration,
) -> bool {
    if handle.is_null() {
        return registrar.unregister(None);
    }
    // SAFETY: non-null handles come from `Box::into_raw` above and are
    // consumed once per the caller contract.
    let registration = unsafe { Box::from_raw(handle) };
    registrar.unregister(registration.record)
}

#[cfg(windows)]
mod exports {
    use super::{register_into_raw, unregister_from_raw, ProxyRegistration};
    use log::error;
    use once_cell::sync::Lazy;
    use psproxy_core::{ProxyRegistrar, Win32Runtime};
    use std::ffi::{c_char, CStr, OsString};
    use std::os::windows::ffi::OsStringExt;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};
    use windows::core::PCWSTR;

    static REGISTRAR: Lazy<Mutex<ProxyRegistrar<Win32Runtime>>> =
        Lazy::new(|| Mutex::new(ProxyRegistrar::new(Win32Runtime::new())));

    fn registrar() -> MutexGuard<'static, ProxyRegistrar<Win32Runtime>> {
        REGISTRAR
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    unsafe fn wide_to_path(value: *const u16) -> PathBuf {
        // SAFETY: caller passes a non-null, nul-terminated wide string.
        let wide = PCWSTR(value);
        let units = unsafe { wide.as_wide() };
        PathBuf::from(OsString::from_wide(units))
    }

    /// Registers the proxy DLL at `dll_path`; returns null on failure.
    ///
    /// # Safety
    /// `dll_path` must be null or a nul-terminated UTF-16 string. COM must be
    /// initialized on the calling thread.
    #[no_mangle]
    pub unsafe extern "C" fn register_com_proxy(dll_path: *const u16) -> *mut ProxyRegistration {
        if dll_path.is_null() {
            error!("event=ffi_register module=ffi status=error error_code=null_path");
            return std::ptr::null_mut();
        }
        // SAFETY: checked non-null; caller guarantees termination.
        let path = unsafe { wide_to_path(dll_path) };
        catch_unwind(AssertUnwindSafe(|| {
            let mut guard = registrar();
            register_into_raw(&mut *guard, &path)
        }))
        .unwrap_or_else(|_| {
            error!("event=ffi_register module=ffi status=error error_code=panic");
            std::ptr::null_mut()
        })
    }

    /// Unregisters and frees a handle from `register_com_proxy`.
    ///
    /// # Safety
    /// `registration` must be null or an unconsumed handle from
    /// `register_com_proxy`.
    #[no_mangle]
    pub unsafe extern "C" fn unregister_com_proxy(registration: *mut ProxyRegistration) -> bool {
        catch_unwind(AssertUnwindSafe(|| {
            let mut guard = registrar();
            // SAFETY: forwarded caller contract.
            unsafe { unregister_from_raw(&mut *guard, registration) }
        }))
        .unwrap_or_else(|_| {
            error!("event=ffi_unregister module=ffi status=error error_code=panic");
            false
        })
    }

    /// Starts core file logging; returns false on failure.
    ///
    /// # Safety
    /// Both arguments must be null or nul-terminated UTF-8 strings.
    #[no_mangle]
    pub unsafe extern "C" fn init_com_proxy_logging(
        level: *const c_char,
        log_dir: *const c_char,
    ) -> bool {
        if level.is_null() || log_dir.is_null() {
            return false;
        }
        // SAFETY: checked non-null; caller guarantees termination.
        let (level, log_dir) = unsafe { (CStr::from_ptr(level), CStr::from_ptr(log_dir)) };
        match (level.to_str(), log_dir.to_str()) {
            (Ok(level), Ok(log_dir)) => psproxy_core::init_logging(level, log_dir).is_ok(),
            _ => false,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::{register_com_proxy, unregister_com_proxy, wide_to_path};
        use std::path::Path;

        fn wide(value: &str) -> Vec<u16> {
            value.encode_utf16().chain(std::iter::once(0)).collect()
        }

        #[test]
        fn wide_path_stops_at_terminator() {
            let units = wide(r"C:\proxies\sample.dll");
            let path = unsafe { wide_to_path(units.as_ptr()) };
            assert_eq!(path, Path::new(r"C:\proxies\sample.dll"));

            let empty = wide("");
            assert_eq!(unsafe { wide_to_path(empty.as_ptr()) }, Path::new(""));
        }

        #[test]
        fn null_pointers_are_rejected_at_the_boundary() {
            assert!(unsafe { register_com_proxy(std::ptr::null()) }.is_null());
            assert!(!unsafe { unregister_com_proxy(std::ptr::null_mut()) });
        }
    }
}
