//! Temporary proxy/stub registration with the component broker.
//!
//! # Responsibility
//! - Register a proxy DLL's class object and interface mappings process-wide.
//! - Restore the exact prior state on unregistration.
//!
//! # Invariants
//! - Register flow: extractor → isolated context → class registrar →
//!   remapper → record.
//! - Unregister needs only the record, never the module.

pub mod context;
pub mod error;
pub mod extractor;
pub mod record;
pub mod registrar;
pub mod remapper;
pub mod service;
