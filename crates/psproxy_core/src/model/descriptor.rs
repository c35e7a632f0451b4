//! Proxy component descriptor model.
//!
//! # Responsibility
//! - Hold the interface table a proxy component advertises, as owned data.
//! - Preserve file order and table order for remap/backup sequencing.
//!
//! # Invariants
//! - Descriptors never borrow memory of the loaded module; they stay valid
//!   after the module is unloaded.
//! - `ProxyDescriptorTable::interfaces` yields file order, then table order.

use crate::model::guid::Guid;
use serde::Serialize;

/// One interface advertised by a proxy component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDescriptor {
    /// Interface id (IID).
    pub iid: Guid,
    /// Interface name as declared in the IDL.
    pub name: String,
    /// Position within the owning file entry.
    pub index: u16,
}

impl InterfaceDescriptor {
    pub fn new(iid: Guid, name: impl Into<String>, index: u16) -> Self {
        Self {
            iid,
            name: name.into(),
            index,
        }
    }
}

/// Interfaces contributed by one MIDL-generated proxy file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyFileEntry {
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl ProxyFileEntry {
    /// Builds an entry from `(iid, name)` pairs, assigning table indexes in order.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Guid, S)>,
        S: Into<String>,
    {
        let interfaces = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (iid, name))| {
                InterfaceDescriptor::new(iid, name, u16::try_from(index).unwrap_or(u16::MAX))
            })
            .collect();
        Self { interfaces }
    }
}

/// Ordered view over every file entry of a proxy component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyDescriptorTable {
    pub files: Vec<ProxyFileEntry>,
}

impl ProxyDescriptorTable {
    pub fn new(files: Vec<ProxyFileEntry>) -> Self {
        Self { files }
    }

    /// Iterates all interfaces in file order, then table order.
    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceDescriptor> {
        self.files.iter().flat_map(|file| file.interfaces.iter())
    }

    pub fn interface_count(&self) -> usize {
        self.files.iter().map(|file| file.interfaces.len()).sum()
    }
}

/// Result of the component's descriptor export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyDllInfo {
    /// Class id of the component's proxy/stub factory.
    pub class_id: Guid,
    pub table: ProxyDescriptorTable,
}

#[cfg(test)]
mod tests {
    use super::{ProxyDescriptorTable, ProxyFileEntry};
    use crate::model::guid::Guid;

    fn iid(n: u32) -> Guid {
        Guid::from_fields(n, 0, 0, [0; 8])
    }

    #[test]
    fn interfaces_follow_file_then_table_order() {
        let table = ProxyDescriptorTable::new(vec![
            ProxyFileEntry::from_pairs([(iid(1), "IFirst"), (iid(2), "ISecond")]),
            ProxyFileEntry::default(),
            ProxyFileEntry::from_pairs([(iid(3), "IThird")]),
        ]);

        let names: Vec<&str> = table.interfaces().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["IFirst", "ISecond", "IThird"]);
        assert_eq!(table.interface_count(), 3);
    }

    #[test]
    fn from_pairs_assigns_table_indexes() {
        let entry = ProxyFileEntry::from_pairs([(iid(7), "IA"), (iid(8), "IB")]);
        assert_eq!(entry.interfaces[0].index, 0);
        assert_eq!(entry.interfaces[1].index, 1);
    }
}
