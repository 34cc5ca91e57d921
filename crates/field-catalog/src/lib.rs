use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

mod descriptors;
mod projection;

pub use descriptors::{descriptor, DeviceClass, FieldDescriptor, StateClass, DESCRIPTORS};
pub use projection::{project, ProjectionError, PublishedData};

/// Field that must be present in the first read before a device is accepted.
pub const CANONICAL_FIELD: Field = Field::GridVoltage;

/// The telemetry fields this collector understands and publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    RunningState,
    TotalYield,
    TotalActivePower,
    GridVoltage,
    InternalAirTemperature,
    TotalGridRunningTime,
    DailyPowerYield,
    BusVoltage,
    ArrayInsulationImpedance,
    TotalDcPower,
    TotalReactivePower,
    TotalApparentPower,
    TotalPowerFactor,
    GridFrequency,
    FragmentRunType1,
    MeasuringPointAfd,
    MaximumApparentPower,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::RunningState,
        Field::TotalYield,
        Field::TotalActivePower,
        Field::GridVoltage,
        Field::InternalAirTemperature,
        Field::TotalGridRunningTime,
        Field::DailyPowerYield,
        Field::BusVoltage,
        Field::ArrayInsulationImpedance,
        Field::TotalDcPower,
        Field::TotalReactivePower,
        Field::TotalApparentPower,
        Field::TotalPowerFactor,
        Field::GridFrequency,
        Field::FragmentRunType1,
        Field::MeasuringPointAfd,
        Field::MaximumApparentPower,
    ];

    /// Key of the field in a telemetry snapshot.
    pub const fn as_str(self) -> &'static str {
        match self {
            Field::RunningState => "running_state",
            Field::TotalYield => "total_yield",
            Field::TotalActivePower => "total_active_power",
            Field::GridVoltage => "commonua",
            Field::InternalAirTemperature => "air_tem_inside_machine",
            Field::TotalGridRunningTime => "total_grid_running_time",
            Field::DailyPowerYield => "daily_power_yield",
            Field::BusVoltage => "bus_voltage",
            Field::ArrayInsulationImpedance => "square_array_insulation_impedance",
            Field::TotalDcPower => "total_dcpower",
            Field::TotalReactivePower => "total_reactive_power",
            Field::TotalApparentPower => "total_apparent_power",
            Field::TotalPowerFactor => "total_power_factor",
            Field::GridFrequency => "grid_frequency",
            Field::FragmentRunType1 => "fragment_run_type1",
            Field::MeasuringPointAfd => "measuring_point_afd",
            Field::MaximumApparentPower => "maximum_apparent_power_siwhfgqy",
        }
    }

    pub fn descriptor(self) -> &'static FieldDescriptor {
        descriptor(self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown field {0:?}")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| UnknownField(value.to_string()))
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn keys_are_unique_and_parse_back() {
        let keys: HashSet<&str> = Field::ALL.iter().map(|field| field.as_str()).collect();
        assert_eq!(keys.len(), Field::ALL.len());
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>(), Ok(field));
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert_eq!(
            "pv_voltage".parse::<Field>(),
            Err(UnknownField("pv_voltage".to_string()))
        );
    }

    #[test]
    fn serializes_as_snapshot_key() {
        let json = serde_json::to_string(&Field::GridVoltage).expect("serialize");
        assert_eq!(json, "\"commonua\"");
        let field: Field = serde_json::from_str("\"total_dcpower\"").expect("deserialize");
        assert_eq!(field, Field::TotalDcPower);
    }
}
