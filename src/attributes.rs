use serde_json::Value;
use tracing::warn;

use crate::snapshot::{Entity, Snapshot};
use crate::types::EntityKind;

const CONSUMPTION_PREFIX: &str = "consumptionData.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Bar,
    KilowattHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Measurement,
    /// Monotonic over the day.
    Total,
    Timestamp,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<Unit>,
    pub kind: AttributeKind,
    pub enabled_by_default: bool,
}

const fn sensor(key: &'static str, name: &'static str, unit: Unit) -> AttributeDescriptor {
    AttributeDescriptor {
        key,
        name,
        unit: Some(unit),
        kind: AttributeKind::Measurement,
        enabled_by_default: true,
    }
}

const fn energy(key: &'static str, name: &'static str) -> AttributeDescriptor {
    AttributeDescriptor {
        key,
        name,
        unit: Some(Unit::KilowattHour),
        kind: AttributeKind::Total,
        enabled_by_default: false,
    }
}

pub const APPLIANCE_ATTRIBUTES: &[AttributeDescriptor] = &[
    sensor("waterPressure", "Water Pressure", Unit::Bar),
    sensor(
        "outdoorTemperatureInformation.applianceOutdoorTemperature",
        "Outdoor Temperature",
        Unit::Celsius,
    ),
    AttributeDescriptor {
        enabled_by_default: false,
        ..sensor(
            "outdoorTemperatureInformation.cloudOutdoorTemperature",
            "Cloud Outdoor Temperature",
            Unit::Celsius,
        )
    },
];

pub const CONSUMPTION_ATTRIBUTES: &[AttributeDescriptor] = &[
    energy("consumptionData.heatingEnergyConsumed", "Heating Energy Consumed"),
    energy("consumptionData.hotWaterEnergyConsumed", "Hot Water Energy Consumed"),
    energy("consumptionData.coolingEnergyConsumed", "Cooling Energy Consumed"),
    energy("consumptionData.heatingEnergyDelivered", "Heating Energy Delivered"),
    energy("consumptionData.hotWaterEnergyDelivered", "Hot Water Energy Delivered"),
    energy("consumptionData.coolingEnergyDelivered", "Cooling Energy Delivered"),
    energy("consumptionData.energyConsumptionCHElectric", "Electric Heating Energy Consumed"),
    energy("consumptionData.energyConsumptionDHWElectric", "Electric Hot Water Energy Consumed"),
    energy("consumptionData.energyConsumptionCoolingElectric", "Electric Cooling Energy Consumed"),
    energy("consumptionData.energyConsumptionTotalElectric", "Total Electric Energy Consumed"),
    energy("consumptionData.energyProductionCHElectric", "Electric Heating Energy Produced"),
    energy("consumptionData.energyProductionDHWElectric", "Electric Hot Water Energy Produced"),
    energy("consumptionData.energyProductionCoolingElectric", "Electric Cooling Energy Produced"),
    energy("consumptionData.energyProductionTotalElectric", "Total Electric Energy Produced"),
    energy("consumptionData.energyConsumptionCHNaturalGas", "Natural Gas Heating Energy Consumed"),
    energy("consumptionData.energyConsumptionDHWNaturalGas", "Natural Gas Hot Water Energy Consumed"),
    energy("consumptionData.energyConsumptionCoolingNaturalGas", "Natural Gas Cooling Energy Consumed"),
    energy("consumptionData.energyConsumptionTotalNaturalGas", "Total Natural Gas Energy Consumed"),
    energy("consumptionData.energyProductionCHNaturalGas", "Natural Gas Heating Energy Produced"),
    energy("consumptionData.energyProductionDHWNaturalGas", "Natural Gas Hot Water Energy Produced"),
    energy("consumptionData.energyProductionCoolingNaturalGas", "Natural Gas Cooling Energy Produced"),
    energy("consumptionData.energyProductionTotalNaturalGas", "Total Natural Gas Energy Produced"),
    AttributeDescriptor {
        unit: None,
        kind: AttributeKind::Measurement,
        ..energy("consumptionData.seasonalEfficiencyElectric", "Electric Seasonal Efficiency")
    },
];

pub const CLIMATE_ZONE_ATTRIBUTES: &[AttributeDescriptor] = &[
    sensor("nextSetpoint", "Next Setpoint", Unit::Celsius),
    AttributeDescriptor {
        key: "nextSwitchTime",
        name: "Next Setpoint Time",
        unit: None,
        kind: AttributeKind::Timestamp,
        enabled_by_default: true,
    },
    sensor("currentScheduleSetPoint", "Current Schedule Setpoint", Unit::Celsius),
    AttributeDescriptor {
        key: "activeComfortDemand",
        name: "Status",
        unit: None,
        kind: AttributeKind::Text,
        enabled_by_default: false,
    },
];

pub const HOT_WATER_ZONE_ATTRIBUTES: &[AttributeDescriptor] = &[
    sensor("dhwTemperature", "Water Temperature", Unit::Celsius),
    AttributeDescriptor {
        key: "dhwStatus",
        name: "Status",
        unit: None,
        kind: AttributeKind::Text,
        enabled_by_default: false,
    },
];

/// Descriptors backed by the raw payload of an entity of `kind`.
pub fn descriptors_for(kind: EntityKind) -> &'static [AttributeDescriptor] {
    match kind {
        EntityKind::Appliance => APPLIANCE_ATTRIBUTES,
        EntityKind::ClimateZone => CLIMATE_ZONE_ATTRIBUTES,
        EntityKind::HotWaterZone => HOT_WATER_ZONE_ATTRIBUTES,
        EntityKind::Producer => &[],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Walk `value` along a `.`-separated key.
pub fn resolve_path<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |node, part| node.get(part))
}

/// Current value of `key` on `entity`. `None` when the path is missing or null.
///
/// Keys are dotted paths into the raw JSON the entity was parsed from, except
/// `consumptionData.*` on appliances, which reads the merged consumption record.
pub fn read(entity: &Entity, key: &str) -> Option<AttributeValue> {
    match entity {
        Entity::Appliance(appliance) if key.starts_with(CONSUMPTION_PREFIX) => {
            let counter = &key[CONSUMPTION_PREFIX.len()..];
            appliance.consumption.get(counter).map(AttributeValue::Number)
        }
        Entity::Producer(producer) => producer.counters.get(key).copied().map(AttributeValue::Number),
        _ => match resolve_path(entity.raw()?, key)? {
            Value::Number(n) => n.as_f64().map(AttributeValue::Number),
            Value::String(s) => Some(AttributeValue::Text(s.clone())),
            Value::Bool(b) => Some(AttributeValue::Bool(*b)),
            _ => None,
        },
    }
}

impl Entity {
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        read(self, key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAttribute {
    pub entity_id: String,
    pub key: &'static str,
}

/// Check every descriptor path against the payloads in `snapshot`, logging
/// and returning the ones the vendor did not send.
pub fn validate(snapshot: &Snapshot) -> Vec<MissingAttribute> {
    let mut missing = Vec::new();
    for entity in snapshot.entities() {
        let Some(raw) = entity.raw() else { continue };
        for descriptor in descriptors_for(entity.kind()) {
            if resolve_path(raw, descriptor.key).is_none() {
                warn!(
                    entity = %entity.id(),
                    key = descriptor.key,
                    "attribute path missing from payload"
                );
                missing.push(MissingAttribute {
                    entity_id: entity.id().to_string(),
                    key: descriptor.key,
                });
            }
        }
    }
    missing
}
