use serde::Serialize;

use crate::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Energy,
    Power,
    Voltage,
    Temperature,
    Duration,
    ReactivePower,
    ApparentPower,
    PowerFactor,
    Frequency,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

/// Static display metadata for one published field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub field: Field,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub icon: &'static str,
    pub enabled_by_default: bool,
}

const fn entry(
    field: Field,
    name: &'static str,
    unit: Option<&'static str>,
    device_class: Option<DeviceClass>,
    state_class: Option<StateClass>,
    icon: &'static str,
) -> FieldDescriptor {
    FieldDescriptor {
        field,
        name,
        unit,
        device_class,
        state_class,
        icon,
        enabled_by_default: true,
    }
}

/// One entry per [`Field`], in [`Field::ALL`] order.
pub static DESCRIPTORS: [FieldDescriptor; 17] = [
    FieldDescriptor {
        enabled_by_default: false,
        ..entry(
            Field::RunningState,
            "Running state",
            None,
            None,
            None,
            "mdi:cog-outline",
        )
    },
    entry(
        Field::TotalYield,
        "Total yield",
        Some("kWh"),
        Some(DeviceClass::Energy),
        Some(StateClass::TotalIncreasing),
        "mdi:solar-power",
    ),
    entry(
        Field::TotalActivePower,
        "Total active power",
        Some("kW"),
        Some(DeviceClass::Power),
        Some(StateClass::Measurement),
        "mdi:solar-power",
    ),
    entry(
        Field::GridVoltage,
        "Grid voltage",
        Some("V"),
        Some(DeviceClass::Voltage),
        Some(StateClass::Measurement),
        "mdi:sine-wave",
    ),
    entry(
        Field::InternalAirTemperature,
        "Internal air temperature",
        Some("°C"),
        Some(DeviceClass::Temperature),
        Some(StateClass::Measurement),
        "mdi:thermometer",
    ),
    entry(
        Field::TotalGridRunningTime,
        "Total on-grid running time",
        Some("h"),
        Some(DeviceClass::Duration),
        Some(StateClass::TotalIncreasing),
        "mdi:timer-cog-outline",
    ),
    entry(
        Field::DailyPowerYield,
        "Daily yield",
        Some("kWh"),
        Some(DeviceClass::Energy),
        Some(StateClass::Total),
        "mdi:solar-power",
    ),
    entry(
        Field::BusVoltage,
        "Bus voltage",
        Some("V"),
        Some(DeviceClass::Voltage),
        Some(StateClass::Measurement),
        "mdi:flash-triangle-outline",
    ),
    entry(
        Field::ArrayInsulationImpedance,
        "Array insulation resistance",
        None,
        None,
        Some(StateClass::Measurement),
        "mdi:resistor",
    ),
    entry(
        Field::TotalDcPower,
        "Total DC power",
        Some("kW"),
        Some(DeviceClass::Power),
        Some(StateClass::Measurement),
        "mdi:solar-power",
    ),
    entry(
        Field::TotalReactivePower,
        "Total reactive power",
        Some("kvar"),
        Some(DeviceClass::ReactivePower),
        Some(StateClass::Measurement),
        "mdi:solar-power",
    ),
    entry(
        Field::TotalApparentPower,
        "Total apparent power",
        Some("kVA"),
        Some(DeviceClass::ApparentPower),
        Some(StateClass::Measurement),
        "mdi:solar-power",
    ),
    entry(
        Field::TotalPowerFactor,
        "Total power factor",
        None,
        Some(DeviceClass::PowerFactor),
        Some(StateClass::Measurement),
        "mdi:angle-acute",
    ),
    entry(
        Field::GridFrequency,
        "Grid frequency",
        Some("Hz"),
        Some(DeviceClass::Frequency),
        Some(StateClass::Measurement),
        "mdi:sine-wave",
    ),
    entry(
        Field::FragmentRunType1,
        "Output current",
        Some("A"),
        Some(DeviceClass::Current),
        Some(StateClass::Measurement),
        "mdi:solar-power",
    ),
    entry(
        Field::MeasuringPointAfd,
        "AFD measuring point",
        None,
        None,
        Some(StateClass::Measurement),
        "mdi:note-alert-outline",
    ),
    entry(
        Field::MaximumApparentPower,
        "Maximum apparent power",
        Some("kVA"),
        Some(DeviceClass::ApparentPower),
        Some(StateClass::Measurement),
        "mdi:solar-power",
    ),
];

pub fn descriptor(field: Field) -> &'static FieldDescriptor {
    // DESCRIPTORS mirrors Field::ALL, which mirrors declaration order.
    &DESCRIPTORS[field as usize]
}
