//! BusController trait - the callback contract between bus monitors and the engine

use crate::models::{BusType, DtcChangeSummary};

/// Consumer of bus liveness transitions and DTC snapshots
///
/// Implementations must tolerate repeated identical notifications: a monitor
/// reports every status it is given and does not suppress duplicates.
pub trait BusController: Send + Sync {
    /// The given bus is communicating
    fn set_bus_communicating(&self, bus: BusType);

    /// The given bus is no longer communicating
    fn clear_bus_communicating(&self, bus: BusType);

    /// Take a complete snapshot of the codes currently reported on a bus
    ///
    /// The list must cover every node on the bus, not just one, since codes
    /// missing from it are candidates for removal.
    fn check_dtcs(&self, bus: BusType, codes: &[u64]) -> DtcChangeSummary;
}
