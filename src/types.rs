use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde_json::Value;

pub const MANUFACTURER: &str = "Remeha";

/// Time programs the vendor exposes per climate zone.
pub const TIME_PROGRAMS: [u8; 3] = [1, 2, 3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneMode {
    Scheduling,
    TemporaryOverride,
    Manual,
    FrostProtection,
    Unrecognized(String),
}

impl ZoneMode {
    pub fn as_remeha_str(&self) -> &str {
        match self {
            ZoneMode::Scheduling => "Scheduling",
            ZoneMode::TemporaryOverride => "TemporaryOverride",
            ZoneMode::Manual => "Manual",
            ZoneMode::FrostProtection => "FrostProtection",
            ZoneMode::Unrecognized(s) => s,
        }
    }

    pub fn from_remeha_str(s: &str) -> Self {
        match s {
            "Scheduling" => ZoneMode::Scheduling,
            "TemporaryOverride" => ZoneMode::TemporaryOverride,
            "Manual" => ZoneMode::Manual,
            "FrostProtection" => ZoneMode::FrostProtection,
            other => ZoneMode::Unrecognized(other.to_string()),
        }
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        match self {
            ZoneMode::Scheduling | ZoneMode::TemporaryOverride => Some(HvacMode::Auto),
            ZoneMode::Manual => Some(HvacMode::Heat),
            ZoneMode::FrostProtection => Some(HvacMode::Off),
            ZoneMode::Unrecognized(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Auto,
    Heat,
    Off,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Auto => "auto",
            HvacMode::Heat => "heat",
            HvacMode::Off => "off",
        }
    }

    /// The zone mode the vendor reports once this mode has been applied.
    pub fn zone_mode(&self) -> ZoneMode {
        match self {
            HvacMode::Auto => ZoneMode::Scheduling,
            HvacMode::Heat => ZoneMode::Manual,
            HvacMode::Off => ZoneMode::FrostProtection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacAction {
    Heating,
    Idle,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ComfortDemand {
    #[default]
    Idle,
    RequestingHeat,
    ProducingHeat,
    Unrecognized(String),
}

impl ComfortDemand {
    pub fn from_remeha_str(s: &str) -> Self {
        match s {
            "Idle" => ComfortDemand::Idle,
            "RequestingHeat" => ComfortDemand::RequestingHeat,
            "ProducingHeat" => ComfortDemand::ProducingHeat,
            other => ComfortDemand::Unrecognized(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ComfortDemand::RequestingHeat | ComfortDemand::ProducingHeat)
    }
}

/// Presets offered on a climate zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    ClockProgram(u8),
    Manual,
    AntiFrost,
}

impl Preset {
    pub fn name(&self) -> String {
        match self {
            Preset::ClockProgram(n) => format!("clock_program_{n}"),
            Preset::Manual => "manual".to_string(),
            Preset::AntiFrost => "anti_frost".to_string(),
        }
    }

    /// Only clock programs can be selected; `manual`/`anti_frost` follow from the hvac mode.
    pub fn selectable(name: &str) -> Option<Self> {
        let n: u8 = name.strip_prefix("clock_program_")?.parse().ok()?;
        TIME_PROGRAMS.contains(&n).then_some(Preset::ClockProgram(n))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DhwStatus {
    #[default]
    Idle,
    ProducingHeat,
    Unrecognized(String),
}

impl DhwStatus {
    pub fn from_remeha_str(s: &str) -> Self {
        match s {
            "Idle" => DhwStatus::Idle,
            "ProducingHeat" => DhwStatus::ProducingHeat,
            other => DhwStatus::Unrecognized(other.to_string()),
        }
    }

    pub fn is_heating(&self) -> bool {
        matches!(self, DhwStatus::ProducingHeat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhwMode {
    Schedule,
    ContinuousComfort,
    AntiFrost,
    Unrecognized(String),
}

impl DhwMode {
    pub fn from_remeha_str(s: &str) -> Self {
        match s {
            "Schedule" | "Scheduling" => DhwMode::Schedule,
            "ContinuousComfort" => DhwMode::ContinuousComfort,
            "AntiFrost" | "FrostProtection" => DhwMode::AntiFrost,
            other => DhwMode::Unrecognized(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnergyType {
    Electric,
    NaturalGas,
    Other(String),
}

impl EnergyType {
    pub fn from_remeha_str(s: &str) -> Self {
        match s {
            "Electric" | "Electricity" => EnergyType::Electric,
            "NaturalGas" => EnergyType::NaturalGas,
            other => EnergyType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClimateZone {
    pub id: String,
    pub appliance_id: String,
    pub name: String,
    pub room_temperature: Option<f64>,
    pub setpoint: Option<f64>,
    pub setpoint_min: Option<f64>,
    pub setpoint_max: Option<f64>,
    pub mode: ZoneMode,
    pub comfort_demand: ComfortDemand,
    pub active_program: Option<u8>,
    pub fireplace_mode: bool,
    pub next_setpoint: Option<f64>,
    pub next_switch_time: Option<NaiveDateTime>,
    pub current_schedule_setpoint: Option<f64>,
    pub raw: Value,
}

impl ClimateZone {
    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.mode.hvac_mode()
    }

    pub fn hvac_action(&self) -> Option<HvacAction> {
        if self.hvac_mode() == Some(HvacMode::Off) {
            return Some(HvacAction::Off);
        }
        match self.comfort_demand {
            ComfortDemand::RequestingHeat | ComfortDemand::ProducingHeat => Some(HvacAction::Heating),
            ComfortDemand::Idle => Some(HvacAction::Idle),
            ComfortDemand::Unrecognized(_) => None,
        }
    }

    /// Setpoint as shown to users: hidden while the zone is off.
    pub fn target_temperature(&self) -> Option<f64> {
        if self.hvac_mode() == Some(HvacMode::Off) {
            return None;
        }
        self.setpoint
    }

    pub fn preset(&self) -> Option<Preset> {
        match self.hvac_mode()? {
            HvacMode::Off => Some(Preset::AntiFrost),
            HvacMode::Heat => Some(Preset::Manual),
            HvacMode::Auto => self
                .active_program
                .filter(|n| TIME_PROGRAMS.contains(n))
                .map(Preset::ClockProgram),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HotWaterZone {
    pub id: String,
    pub appliance_id: String,
    pub name: String,
    pub temperature: Option<f64>,
    pub status: DhwStatus,
    pub dhw_mode: DhwMode,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct Appliance {
    pub id: String,
    pub house_name: String,
    pub water_pressure: Option<f64>,
    pub outdoor_temperature: Option<f64>,
    pub cloud_outdoor_temperature: Option<f64>,
    pub gas_calorific_value: Option<f64>,
    pub climate_zones: Vec<ClimateZone>,
    pub hot_water_zones: Vec<HotWaterZone>,
    pub consumption: ConsumptionRecord,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInfo {
    pub name: String,
    pub hardware_version: String,
    pub software_version: String,
}

impl GatewayInfo {
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            hardware_version: "Unknown".to_string(),
            software_version: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechnicalInfo {
    pub appliance_name: String,
    pub gateways: Vec<GatewayInfo>,
}

/// Daily counters the vendor reports per appliance. Every one of these is
/// always present on a [`ConsumptionRecord`].
pub const CONSUMPTION_COUNTERS: &[&str] = &[
    "heatingEnergyConsumed",
    "hotWaterEnergyConsumed",
    "coolingEnergyConsumed",
    "heatingEnergyDelivered",
    "hotWaterEnergyDelivered",
    "coolingEnergyDelivered",
    "energyConsumptionCHElectric",
    "energyConsumptionDHWElectric",
    "energyConsumptionCoolingElectric",
    "energyConsumptionTotalElectric",
    "energyProductionCHElectric",
    "energyProductionDHWElectric",
    "energyProductionCoolingElectric",
    "energyProductionTotalElectric",
    "energyConsumptionCHNaturalGas",
    "energyConsumptionDHWNaturalGas",
    "energyConsumptionCoolingNaturalGas",
    "energyConsumptionTotalNaturalGas",
    "energyProductionCHNaturalGas",
    "energyProductionDHWNaturalGas",
    "energyProductionCoolingNaturalGas",
    "energyProductionTotalNaturalGas",
    "seasonalEfficiencyElectric",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionRecord {
    pub counters: BTreeMap<String, f64>,
    pub producers: Vec<Producer>,
}

impl Default for ConsumptionRecord {
    fn default() -> Self {
        Self {
            counters: CONSUMPTION_COUNTERS
                .iter()
                .map(|k| (k.to_string(), 0.0))
                .collect(),
            producers: Vec::new(),
        }
    }
}

impl ConsumptionRecord {
    pub fn get(&self, counter: &str) -> Option<f64> {
        self.counters.get(counter).copied()
    }

    pub fn heating_energy_consumed(&self) -> f64 {
        self.get("heatingEnergyConsumed").unwrap_or_default()
    }

    pub fn hot_water_energy_consumed(&self) -> f64 {
        self.get("hotWaterEnergyConsumed").unwrap_or_default()
    }

    pub fn cooling_energy_consumed(&self) -> f64 {
        self.get("coolingEnergyConsumed").unwrap_or_default()
    }

    pub fn heating_energy_delivered(&self) -> f64 {
        self.get("heatingEnergyDelivered").unwrap_or_default()
    }

    pub fn hot_water_energy_delivered(&self) -> f64 {
        self.get("hotWaterEnergyDelivered").unwrap_or_default()
    }

    pub fn cooling_energy_delivered(&self) -> f64 {
        self.get("coolingEnergyDelivered").unwrap_or_default()
    }
}

/// One heat producer within an appliance (boiler, heat pump, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Producer {
    /// `{applianceId}_{instanceWithinDevice}`
    pub id: String,
    pub appliance_id: String,
    pub producer_type: String,
    pub instance: u32,
    pub energy_type: EnergyType,
    pub counters: BTreeMap<String, f64>,
}

impl Producer {
    pub fn display_name(&self) -> String {
        format!("{}_{}", self.producer_type, self.instance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub hw_version: Option<String>,
    pub sw_version: Option<String>,
    pub via_device: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Appliance,
    ClimateZone,
    HotWaterZone,
    Producer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Refreshing,
    /// Polling halted until re-authentication.
    AuthFailed,
    /// Last refresh failed; the previous snapshot is still served.
    Degraded,
}

/// Events emitted by the coordinator when a published snapshot differs from the last one.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EntityDiscovered { id: String, kind: EntityKind },
    ZoneModeChanged { zone_id: String, name: String, mode: ZoneMode },
    ZoneTemperatureChanged { zone_id: String, name: String, temperature: f64 },
    ZoneSetpointChanged { zone_id: String, name: String, setpoint: f64 },
    ZoneComfortDemandChanged { zone_id: String, name: String, demand: ComfortDemand },
    FireplaceModeChanged { zone_id: String, name: String, active: bool },
    HotWaterTemperatureChanged { zone_id: String, name: String, temperature: f64 },
    HotWaterStatusChanged { zone_id: String, name: String, status: DhwStatus },
    HotWaterModeChanged { zone_id: String, name: String, mode: DhwMode },
    OutdoorTemperatureChanged { appliance_id: String, temperature: f64 },
    ConsumptionUpdated { appliance_id: String },
    StateChanged { from: CoordinatorState, to: CoordinatorState },
}
