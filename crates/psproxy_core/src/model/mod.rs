//! Identifier and descriptor model for proxy components.
//!
//! # Responsibility
//! - Define OS-independent data shared by the runtime and registration layers.
//!
//! # Invariants
//! - Model types are plain owned data; no OS handles live here.

pub mod descriptor;
pub mod guid;
