//! Vehicle bus identity and status models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Vehicle bus a monitor is attached to
///
/// The raw values double as bit positions in the controller's
/// "buses communicating" mask, which is why `J1587` skips 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    /// Not attached to a real bus; monitors of this type never notify the controller
    #[default]
    None,
    /// SAE J1939 at 250 kbit/s
    #[serde(rename = "j1939_250")]
    J1939At250k,
    /// SAE J1939 at 500 kbit/s
    #[serde(rename = "j1939_500")]
    J1939At500k,
    /// SAE J1587 / J1708
    J1587,
}

impl BusType {
    /// Raw identifier, as carried in fault code event data
    pub fn raw(self) -> u8 {
        match self {
            BusType::None => 0,
            BusType::J1939At250k => 1,
            BusType::J1939At500k => 2,
            BusType::J1587 => 4,
        }
    }

    /// Bit used for this bus in a communicating/detected mask
    pub fn mask(self) -> u8 {
        self.raw()
    }

    /// Short display name used in logs and reports
    pub fn name(self) -> &'static str {
        match self {
            BusType::None => "NONE",
            BusType::J1939At250k => "J1939-250",
            BusType::J1939At500k => "J1939-500",
            BusType::J1587 => "J1587",
        }
    }

    /// Every bus type, in raw-value order
    pub fn all() -> [BusType; 4] {
        [
            BusType::None,
            BusType::J1939At250k,
            BusType::J1939At500k,
            BusType::J1587,
        ]
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for BusType {
    type Error = CoreError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(BusType::None),
            1 => Ok(BusType::J1939At250k),
            2 => Ok(BusType::J1939At500k),
            4 => Ok(BusType::J1587),
            other => Err(CoreError::UnknownBusType(other)),
        }
    }
}

impl FromStr for BusType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BusType::None),
            "j1939-250" | "j1939_250" | "j1939" => Ok(BusType::J1939At250k),
            "j1939-500" | "j1939_500" => Ok(BusType::J1939At500k),
            "j1587" => Ok(BusType::J1587),
            _ => Err(CoreError::InvalidBusName(s.to_string())),
        }
    }
}

/// Link state of one monitored bus
///
/// `Up` is the only state in which the bus counts as communicating.
/// `UpNoComm` is entered only from `Up` when a liveness period passes with no
/// receive activity, and left again on the next activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusStatus {
    /// Bus is off
    #[default]
    Idle,
    /// Looking for the presence of a bus
    Discovering,
    /// Claiming an address on the bus
    ClaimingAddress,
    /// Communicating normally
    Up,
    /// Believed up, but nothing was received in the last liveness period
    UpNoComm,
    /// Could not bring the bus up (e.g. no address could be claimed)
    Failed,
}

impl BusStatus {
    /// Whether a bus in this state is considered communicating
    pub fn is_communicating(self) -> bool {
        self == BusStatus::Up
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusStatus::Idle => "idle",
            BusStatus::Discovering => "discovering",
            BusStatus::ClaimingAddress => "claiming_address",
            BusStatus::Up => "up",
            BusStatus::UpNoComm => "up_no_comm",
            BusStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BusStatus::Idle, false)]
    #[case(BusStatus::Discovering, false)]
    #[case(BusStatus::ClaimingAddress, false)]
    #[case(BusStatus::Up, true)]
    #[case(BusStatus::UpNoComm, false)]
    #[case(BusStatus::Failed, false)]
    fn test_only_up_is_communicating(#[case] status: BusStatus, #[case] expected: bool) {
        assert_eq!(status.is_communicating(), expected);
    }

    #[test]
    fn test_bus_type_raw_values_are_mask_bits() {
        let mut seen = 0u8;
        for bus in BusType::all().into_iter().skip(1) {
            assert_eq!(seen & bus.mask(), 0, "{} overlaps another bus", bus);
            seen |= bus.mask();
        }
        assert_eq!(seen, 0b0111);
    }

    #[test]
    fn test_bus_type_from_raw() {
        assert_eq!(BusType::try_from(4).unwrap(), BusType::J1587);
        assert_eq!(
            BusType::try_from(3).unwrap_err(),
            CoreError::UnknownBusType(3)
        );
    }

    #[test]
    fn test_bus_type_parse() {
        assert_eq!("J1939-500".parse::<BusType>().unwrap(), BusType::J1939At500k);
        assert_eq!("j1939".parse::<BusType>().unwrap(), BusType::J1939At250k);
        assert!("can0".parse::<BusType>().is_err());
    }

    #[test]
    fn test_bus_type_serde_names() {
        let json = serde_json::to_string(&BusType::J1939At250k).unwrap();
        assert_eq!(json, "\"j1939_250\"");
        let bus: BusType = serde_json::from_str("\"j1587\"").unwrap();
        assert_eq!(bus, BusType::J1587);
    }
}
