//! Diagnostic trouble code models

use serde::{Deserialize, Serialize};

/// A diagnostic trouble code as reported by a bus node
///
/// Identity is `code`; two reports with the same code describe the same fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dtc {
    /// Fault identifier (bus-specific encoding)
    pub code: u64,
    /// Occurrence count as last reported by the node
    pub occurrence_count: u32,
    /// Number of bytes the code occupied in the bus message (2 or 3 typically)
    pub encoded_length: u8,
}

impl Dtc {
    pub fn new(code: u64, occurrence_count: u32, encoded_length: u8) -> Self {
        Self {
            code,
            occurrence_count,
            encoded_length,
        }
    }
}

/// Outcome of handing a DTC snapshot to the controller
///
/// Counts are relative to the controller's own record of current codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtcChangeSummary {
    /// Codes that became current with this snapshot
    pub added: u32,
    /// Codes that were dropped from the current set with this snapshot
    pub removed: u32,
}

impl DtcChangeSummary {
    pub fn new(added: u32, removed: u32) -> Self {
        Self { added, removed }
    }

    /// Whether the snapshot changed the controller's current set
    pub fn is_change(&self) -> bool {
        self.added > 0 || self.removed > 0
    }

    /// Packed `0xAADD` form: added count in the high byte, removed in the low
    /// byte, each saturated at 255
    pub fn packed(&self) -> u16 {
        let added = self.added.min(0xFF) as u16;
        let removed = self.removed.min(0xFF) as u16;
        (added << 8) | removed
    }
}
