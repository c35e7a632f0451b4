//! COM identifier value type.
//!
//! # Responsibility
//! - Represent IIDs and CLSIDs independently of any OS binding.
//! - Render the registry form `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
//!
//! # Invariants
//! - Field layout matches the COM `GUID` struct (`data1`..`data4`), so
//!   conversion to and from native GUIDs is lossless.

use serde::Serialize;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Interface or class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Guid(Uuid);

impl Guid {
    /// All-zero identifier (`GUID_NULL`).
    pub const NULL: Guid = Guid(Uuid::nil());

    /// Builds an identifier from the COM `GUID` field layout.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self(Uuid::from_fields(data1, data2, data3, &data4))
    }

    /// Returns the COM `GUID` field layout.
    pub fn to_fields(self) -> (u32, u16, u16, [u8; 8]) {
        let (data1, data2, data3, data4) = self.0.as_fields();
        (data1, data2, data3, *data4)
    }

    /// Returns whether this is `GUID_NULL`.
    pub fn is_null(self) -> bool {
        self.0.is_nil()
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.hyphenated().encode_upper(&mut Uuid::encode_buffer()))
    }
}
