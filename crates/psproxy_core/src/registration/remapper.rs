//! Proxy/stub class remapping.
//!
//! # Responsibility
//! - Point every advertised interface at the newly registered class id.
//! - Capture the prior mapping first so it can be restored later.
//!
//! # Invariants
//! - A backup is captured before the remap is attempted, whatever the remap
//!   outcome.
//! - One interface failing never stops the remaining interfaces.
//! - Each iid is visited once per table.

use crate::model::descriptor::ProxyDescriptorTable;
use crate::model::guid::Guid;
use crate::registration::record::{PSClsidBackup, RemapFailure};
use crate::runtime::ComRuntime;
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::path::Path;

/// Backups and failures produced by one remap pass.
#[derive(Debug, Default)]
pub struct RemapOutcome {
    pub backups: Vec<PSClsidBackup>,
    pub failures: Vec<RemapFailure>,
}

/// Remaps every interface in `table` to `class_id`, in table order.
pub fn remap_interfaces<R: ComRuntime>(
    runtime: &R,
    table: &ProxyDescriptorTable,
    class_id: Guid,
    path: &Path,
) -> RemapOutcome {
    let mut outcome = RemapOutcome::default();
    let mut visited = BTreeSet::new();

    for descriptor in table.interfaces() {
        if !visited.insert(descriptor.iid) {
            warn!(
                "event=ps_clsid_remap module=remapper status=skipped reason=duplicate_iid interface={} iid={} path={}",
                descriptor.name,
                descriptor.iid,
                path.display()
            );
            continue;
        }

        let previous = match runtime.get_ps_clsid(descriptor.iid) {
            Ok(previous) if !previous.is_null() => Some(previous),
            Ok(_) => None,
            Err(err) => {
                info!(
                    "event=ps_clsid_lookup module=remapper status=none interface={} path={} error={}",
                    descriptor.name,
                    path.display(),
                    err
                );
                None
            }
        };
        outcome.backups.push(PSClsidBackup {
            iid: descriptor.iid,
            name: descriptor.name.clone(),
            previous,
        });

        if let Err(err) = runtime.register_ps_clsid(descriptor.iid, Some(class_id)) {
            error!(
                "event=ps_clsid_remap module=remapper status=error interface={} path={} error={}",
                descriptor.name,
                path.display(),
                err
            );
            outcome.failures.push(RemapFailure {
                iid: descriptor.iid,
                name: descriptor.name.clone(),
                error: err,
            });
        }
    }

    outcome
}
