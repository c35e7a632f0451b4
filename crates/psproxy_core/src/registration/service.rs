//! Proxy registration use-case service.
//!
//! # Responsibility
//! - Drive extractor, isolated context, class registrar and remapper in order.
//! - Reverse a registration from its record alone.
//!
//! # Invariants
//! - `register` returns `Ok` only after the class object is registered
//!   globally; any earlier failure leaves no OS state behind.
//! - A class id is registered at most once per registrar until its record is
//!   passed to `unregister`.
//! - `unregister` always attempts every restore and the revoke, and always
//!   consumes the record.

use crate::config::RegistrationConfig;
use crate::model::guid::Guid;
use crate::registration::error::{RegistrationError, RegistrationResult};
use crate::registration::extractor::extract;
use crate::registration::record::RegistrationRecord;
use crate::registration::registrar::register_class_object;
use crate::registration::remapper::remap_interfaces;
use crate::runtime::ComRuntime;
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

/// Registers proxy components with the broker and rolls them back.
///
/// Methods take `&mut self`; share a registrar across threads only behind a
/// lock.
pub struct ProxyRegistrar<R: ComRuntime> {
    runtime: R,
    config: RegistrationConfig,
    active_classes: BTreeSet<Guid>,
}

impl<R: ComRuntime> ProxyRegistrar<R> {
    /// Creates a registrar with the default component contract.
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            config: RegistrationConfig::default(),
            active_classes: BTreeSet::new(),
        }
    }

    /// Creates a registrar after validating `config`.
    pub fn with_config(runtime: R, config: RegistrationConfig) -> RegistrationResult<Self> {
        config.validate()?;
        Ok(Self {
            runtime,
            config,
            active_classes: BTreeSet::new(),
        })
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Returns whether this registrar holds a live registration for `class_id`.
    pub fn is_registered(&self, class_id: Guid) -> bool {
        self.active_classes.contains(&class_id)
    }

    /// Registers the proxy component at `path`.
    ///
    /// Interfaces the broker refuses to remap are logged and listed in
    /// `RegistrationRecord::remap_failures`; they do not fail the call.
    ///
    /// # Errors
    /// Any `RegistrationError`; no class registration or mapping change
    /// survives an error.
    pub fn register(&mut self, path: impl AsRef<Path>) -> RegistrationResult<RegistrationRecord> {
        let path = path.as_ref();
        let started_at = Instant::now();
        info!(
            "event=proxy_register module=service status=start path={}",
            path.display()
        );

        match self.register_inner(path) {
            Ok(record) => {
                info!(
                    "event=proxy_register module=service status=ok path={} class_id={} interfaces={} remap_failures={} duration_ms={}",
                    path.display(),
                    record.class_id(),
                    record.backups().len(),
                    record.remap_failures().len(),
                    started_at.elapsed().as_millis()
                );
                Ok(record)
            }
            Err(err) => {
                error!(
                    "event=proxy_register module=service status=error path={} duration_ms={} error_code={} error={}",
                    path.display(),
                    started_at.elapsed().as_millis(),
                    err.error_code(),
                    err
                );
                Err(err)
            }
        }
    }

    fn register_inner(&mut self, path: &Path) -> RegistrationResult<RegistrationRecord> {
        let (module, dll_info) = extract(&self.runtime, path, &self.config.entry_point)?;
        if self.active_classes.contains(&dll_info.class_id) {
            return Err(RegistrationError::AlreadyRegistered {
                path: path.to_path_buf(),
                class_id: dll_info.class_id,
            });
        }

        let token = register_class_object(
            &self.runtime,
            module.module(),
            dll_info.class_id,
            self.config.manifest_resource_id,
            path,
        )?;
        // The broker keeps the component loaded (or reloads it) from here on.
        drop(module);

        let outcome = remap_interfaces(&self.runtime, &dll_info.table, dll_info.class_id, path);
        self.active_classes.insert(dll_info.class_id);
        Ok(RegistrationRecord::new(
            path.to_path_buf(),
            dll_info.class_id,
            token,
            outcome.backups,
            outcome.failures,
        ))
    }

    /// Restores captured mappings and revokes the class registration.
    ///
    /// Passing `None` returns `false` without touching the runtime. Otherwise
    /// the result reports whether the revoke succeeded; restore failures are
    /// logged only.
    pub fn unregister(&mut self, record: impl Into<Option<RegistrationRecord>>) -> bool {
        let Some(record) = record.into() else {
            warn!("event=proxy_unregister module=service status=skipped reason=no_record");
            return false;
        };
        let started_at = Instant::now();
        let (path, class_id, token, backups) = record.into_parts();

        let mut restore_failures = 0usize;
        for backup in &backups {
            if let Err(err) = self.runtime.register_ps_clsid(backup.iid, backup.previous) {
                restore_failures += 1;
                error!(
                    "event=ps_clsid_restore module=service status=error interface={} path={} error={}",
                    backup.name,
                    path.display(),
                    err
                );
            }
        }

        let revoked = match self.runtime.revoke_class_object(token) {
            Ok(()) => {
                self.runtime
                    .free_unused_libraries(self.config.free_unused_libraries_delay_ms);
                true
            }
            Err(err) => {
                error!(
                    "event=class_revoke module=service status=error path={} class_id={} error={}",
                    path.display(),
                    class_id,
                    err
                );
                false
            }
        };
        self.active_classes.remove(&class_id);

        info!(
            "event=proxy_unregister module=service status={} path={} restored={} restore_failures={} duration_ms={}",
            if revoked { "ok" } else { "error" },
            path.display(),
            backups.len() - restore_failures,
            restore_failures,
            started_at.elapsed().as_millis()
        );
        revoked
    }
}
