use serde_json::Value;

use crate::snapshot::{Entity, Snapshot};
use crate::types::*;

pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_json(&Value::Object(serde_json::Map::new()), curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Typed events for everything that differs between two published snapshots.
pub(crate) fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<Event> {
    let mut events = Vec::new();
    for entity in current.entities() {
        match (previous.entity(entity.id()), entity) {
            (None, _) => events.push(Event::EntityDiscovered {
                id: entity.id().to_string(),
                kind: entity.kind(),
            }),
            (Some(Entity::ClimateZone(prev)), Entity::ClimateZone(curr)) => {
                climate_zone_events(prev, curr, &mut events)
            }
            (Some(Entity::HotWaterZone(prev)), Entity::HotWaterZone(curr)) => {
                hot_water_events(prev, curr, &mut events)
            }
            (Some(Entity::Appliance(prev)), Entity::Appliance(curr)) => {
                appliance_events(prev, curr, &mut events)
            }
            _ => {}
        }
    }
    events
}

fn climate_zone_events(prev: &ClimateZone, curr: &ClimateZone, events: &mut Vec<Event>) {
    let zone_id = || curr.id.clone();
    let name = || curr.name.clone();

    if prev.mode != curr.mode {
        events.push(Event::ZoneModeChanged {
            zone_id: zone_id(),
            name: name(),
            mode: curr.mode.clone(),
        });
    }
    if prev.room_temperature != curr.room_temperature
        && let Some(temperature) = curr.room_temperature
    {
        events.push(Event::ZoneTemperatureChanged {
            zone_id: zone_id(),
            name: name(),
            temperature,
        });
    }
    if prev.setpoint != curr.setpoint
        && let Some(setpoint) = curr.setpoint
    {
        events.push(Event::ZoneSetpointChanged {
            zone_id: zone_id(),
            name: name(),
            setpoint,
        });
    }
    if prev.comfort_demand != curr.comfort_demand {
        events.push(Event::ZoneComfortDemandChanged {
            zone_id: zone_id(),
            name: name(),
            demand: curr.comfort_demand.clone(),
        });
    }
    if prev.fireplace_mode != curr.fireplace_mode {
        events.push(Event::FireplaceModeChanged {
            zone_id: zone_id(),
            name: name(),
            active: curr.fireplace_mode,
        });
    }
}

fn hot_water_events(prev: &HotWaterZone, curr: &HotWaterZone, events: &mut Vec<Event>) {
    if prev.temperature != curr.temperature
        && let Some(temperature) = curr.temperature
    {
        events.push(Event::HotWaterTemperatureChanged {
            zone_id: curr.id.clone(),
            name: curr.name.clone(),
            temperature,
        });
    }
    if prev.status != curr.status {
        events.push(Event::HotWaterStatusChanged {
            zone_id: curr.id.clone(),
            name: curr.name.clone(),
            status: curr.status.clone(),
        });
    }
    if prev.dhw_mode != curr.dhw_mode {
        events.push(Event::HotWaterModeChanged {
            zone_id: curr.id.clone(),
            name: curr.name.clone(),
            mode: curr.dhw_mode.clone(),
        });
    }
}

fn appliance_events(prev: &Appliance, curr: &Appliance, events: &mut Vec<Event>) {
    if prev.outdoor_temperature != curr.outdoor_temperature
        && let Some(temperature) = curr.outdoor_temperature
    {
        events.push(Event::OutdoorTemperatureChanged {
            appliance_id: curr.id.clone(),
            temperature,
        });
    }
    if prev.consumption != curr.consumption {
        events.push(Event::ConsumptionUpdated {
            appliance_id: curr.id.clone(),
        });
    }
}
