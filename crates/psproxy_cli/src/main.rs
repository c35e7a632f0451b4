//! CLI smoke entry point.
//!
//! # Responsibility
//! - Print the core version to verify `psproxy_core` linkage.
//! - On Windows, register then unregister one proxy DLL and report each step.
//!
//! Usage: `psproxy_cli [proxy.dll]`. Set `PSPROXY_LOG_DIR` to an absolute
//! directory to enable file logging.

use std::process::ExitCode;

fn main() -> ExitCode {
    println!("psproxy_core version={}", psproxy_core::core_version());

    if let Ok(log_dir) = std::env::var("PSPROXY_LOG_DIR") {
        if let Err(err) = psproxy_core::init_logging(psproxy_core::default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match std::env::args_os().nth(1) {
        Some(path) => probe(std::path::Path::new(&path)),
        None => ExitCode::SUCCESS,
    }
}

#[cfg(windows)]
fn probe(path: &std::path::Path) -> ExitCode {
    use psproxy_core::{ProxyRegistrar, Win32Runtime};
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};

    // SAFETY: paired with `CoUninitialize` below on the same thread.
    if let Err(err) = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok() {
        eprintln!("CoInitializeEx failed: {err}");
        return ExitCode::FAILURE;
    }

    let mut registrar = ProxyRegistrar::new(Win32Runtime::new());
    let code = match registrar.register(path) {
        Ok(record) => {
            println!("registered class_id={}", record.class_id());
            for backup in record.backups() {
                let previous = backup
                    .previous
                    .map(|guid| guid.to_string())
                    .unwrap_or_else(|| "none".to_string());
                println!("  {} {} previous={}", backup.iid, backup.name, previous);
            }
            for failure in record.remap_failures() {
                println!("  remap failed {}: {}", failure.name, failure.error);
            }
            let revoked = registrar.unregister(record);
            println!("unregistered revoked={revoked}");
            if revoked {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("register failed [{}]: {err}", err.error_code());
            ExitCode::FAILURE
        }
    };

    // SAFETY: matches the successful `CoInitializeEx` above.
    unsafe { CoUninitialize() };
    code
}

#[cfg(not(windows))]
fn probe(path: &std::path::Path) -> ExitCode {
    eprintln!(
        "cannot register {}: proxy registration requires Windows",
        path.display()
    );
    ExitCode::from(2)
}
