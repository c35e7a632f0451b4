//! Registration record and backup entries.
//!
//! # Responsibility
//! - Bundle everything `unregister` needs to restore prior state without the
//!   proxy module.
//!
//! # Invariants
//! - A record exists only while its class registration token is valid.
//! - Backups keep capture order and hold each interface at most once.
//! - Records are neither `Clone` nor `Copy`; one `unregister` consumes one
//!   record.

use crate::model::guid::Guid;
use crate::runtime::{ClassRegistrationToken, OsError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Proxy/stub mapping captured before remapping one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PSClsidBackup {
    pub iid: Guid,
    pub name: String,
    /// `None` when no mapping was set.
    pub previous: Option<Guid>,
}

/// Interface whose remap the broker rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapFailure {
    pub iid: Guid,
    pub name: String,
    pub error: OsError,
}

/// Live registration of one proxy component.
#[derive(Debug)]
#[must_use = "dropping a record leaks the class registration; pass it to unregister"]
pub struct RegistrationRecord {
    path: PathBuf,
    class_id: Guid,
    token: ClassRegistrationToken,
    backups: Vec<PSClsidBackup>,
    remap_failures: Vec<RemapFailure>,
}

impl RegistrationRecord {
    pub(crate) fn new(
        path: PathBuf,
        class_id: Guid,
        token: ClassRegistrationToken,
        backups: Vec<PSClsidBackup>,
        remap_failures: Vec<RemapFailure>,
    ) -> Self {
        Self {
            path,
            class_id,
            token,
            backups,
            remap_failures,
        }
    }

    /// Component path, for diagnostics only.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn class_id(&self) -> Guid {
        self.class_id
    }

    pub fn token(&self) -> ClassRegistrationToken {
        self.token
    }

    /// Backups in capture order.
    pub fn backups(&self) -> &[PSClsidBackup] {
        &self.backups
    }

    pub fn remap_failures(&self) -> &[RemapFailure] {
        &self.remap_failures
    }

    /// Returns whether every advertised interface was remapped.
    pub fn is_complete(&self) -> bool {
        self.remap_failures.is_empty()
    }

    pub fn summary(&self) -> RegistrationSummary {
        RegistrationSummary {
            path: self.path.display().to_string(),
            class_id: self.class_id,
            interfaces: self.backups.clone(),
            failed_interfaces: self
                .remap_failures
                .iter()
                .map(|failure| failure.name.clone())
                .collect(),
        }
    }

    pub(crate) fn into_parts(self) -> (PathBuf, Guid, ClassRegistrationToken, Vec<PSClsidBackup>) {
        (self.path, self.class_id, self.token, self.backups)
    }
}

/// Serializable diagnostic snapshot of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    pub path: String,
    pub class_id: Guid,
    pub interfaces: Vec<PSClsidBackup>,
    pub failed_interfaces: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::{PSClsidBackup, RegistrationRecord, RemapFailure};
    use crate::model::guid::Guid;
    use crate::runtime::{ClassRegistrationToken, OsError};
    use std::path::PathBuf;

    #[test]
    fn summary_lists_backups_and_failed_names() {
        let iid = Guid::from_fields(0xA, 0, 0, [0; 8]);
        let record = RegistrationRecord::new(
            PathBuf::from("proxy.dll"),
            Guid::from_fields(0xC1, 0, 0, [0; 8]),
            ClassRegistrationToken(7),
            vec![PSClsidBackup {
                iid,
                name: "IA".to_string(),
                previous: None,
            }],
            vec![RemapFailure {
                iid,
                name: "IA".to_string(),
                error: OsError::new(5, "denied"),
            }],
        );

        assert!(!record.is_complete());
        let summary = record.summary();
        assert_eq!(summary.path, "proxy.dll");
        assert_eq!(summary.interfaces.len(), 1);
        assert_eq!(summary.failed_interfaces, vec!["IA".to_string()]);

        let (_, _, token, backups) = record.into_parts();
        assert_eq!(token, ClassRegistrationToken(7));
        assert_eq!(backups.len(), 1);
    }
}
