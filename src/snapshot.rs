use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::*;

/// One addressable record in the snapshot.
#[derive(Debug, Clone)]
pub enum Entity {
    Appliance(Appliance),
    ClimateZone(ClimateZone),
    HotWaterZone(HotWaterZone),
    Producer(Producer),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Appliance(a) => &a.id,
            Entity::ClimateZone(z) => &z.id,
            Entity::HotWaterZone(z) => &z.id,
            Entity::Producer(p) => &p.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Appliance(_) => EntityKind::Appliance,
            Entity::ClimateZone(_) => EntityKind::ClimateZone,
            Entity::HotWaterZone(_) => EntityKind::HotWaterZone,
            Entity::Producer(_) => EntityKind::Producer,
        }
    }

    /// Vendor JSON the entity was normalized from. Producers have none.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Entity::Appliance(a) => Some(&a.raw),
            Entity::ClimateZone(z) => Some(&z.raw),
            Entity::HotWaterZone(z) => Some(&z.raw),
            Entity::Producer(_) => None,
        }
    }

    pub fn as_appliance(&self) -> Option<&Appliance> {
        match self {
            Entity::Appliance(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_climate_zone(&self) -> Option<&ClimateZone> {
        match self {
            Entity::ClimateZone(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_hot_water_zone(&self) -> Option<&HotWaterZone> {
        match self {
            Entity::HotWaterZone(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_producer(&self) -> Option<&Producer> {
        match self {
            Entity::Producer(p) => Some(p),
            _ => None,
        }
    }
}

/// Read side consumed by presentation adapters.
pub trait SnapshotQuery {
    fn get_snapshot_entry(&self, id: &str) -> Option<Entity>;
    fn get_device_descriptor(&self, id: &str) -> Option<DeviceInfo>;
}

/// Merged view of every entity the coordinator knows about. Published
/// snapshots are never mutated; the coordinator swaps in a new one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub(crate) entities: BTreeMap<String, Entity>,
    pub(crate) devices: BTreeMap<String, DeviceInfo>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceInfo> {
        self.devices.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Time of the last successful merge.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn appliances(&self) -> impl Iterator<Item = &Appliance> {
        self.entities.values().filter_map(Entity::as_appliance)
    }

    pub fn climate_zone(&self, id: &str) -> Option<&ClimateZone> {
        self.entity(id).and_then(Entity::as_climate_zone)
    }

    pub fn hot_water_zone(&self, id: &str) -> Option<&HotWaterZone> {
        self.entity(id).and_then(Entity::as_hot_water_zone)
    }

    pub(crate) fn insert(&mut self, entity: Entity, device: DeviceInfo) {
        self.devices.insert(entity.id().to_string(), device);
        self.entities.insert(entity.id().to_string(), entity);
    }

    /// Patch a climate zone and the copy nested in its appliance.
    pub(crate) fn patch_climate_zone(&mut self, id: &str, patch: impl Fn(&mut ClimateZone)) -> bool {
        let Some(Entity::ClimateZone(zone)) = self.entities.get_mut(id) else {
            return false;
        };
        patch(zone);
        let appliance_id = zone.appliance_id.clone();
        if let Some(Entity::Appliance(appliance)) = self.entities.get_mut(&appliance_id)
            && let Some(nested) = appliance.climate_zones.iter_mut().find(|z| z.id == id)
        {
            patch(nested);
        }
        true
    }

    pub(crate) fn patch_hot_water_zone(&mut self, id: &str, patch: impl Fn(&mut HotWaterZone)) -> bool {
        let Some(Entity::HotWaterZone(zone)) = self.entities.get_mut(id) else {
            return false;
        };
        patch(zone);
        let appliance_id = zone.appliance_id.clone();
        if let Some(Entity::Appliance(appliance)) = self.entities.get_mut(&appliance_id)
            && let Some(nested) = appliance.hot_water_zones.iter_mut().find(|z| z.id == id)
        {
            patch(nested);
        }
        true
    }
}

impl SnapshotQuery for Snapshot {
    fn get_snapshot_entry(&self, id: &str) -> Option<Entity> {
        self.entities.get(id).cloned()
    }

    fn get_device_descriptor(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(id).cloned()
    }
}
