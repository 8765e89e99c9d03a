use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Value, json};
use tracing::warn;

use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.bdrthermea.net/Mobile/api";
pub const SUBSCRIPTION_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const SUBSCRIPTION_KEY: &str = "df605c5470d846fc91e848b1cc653ddf";

const CONSUMPTION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6fZ";

pub fn dashboard_path() -> &'static str {
    "/homes/dashboard"
}

pub fn manual_path(zone_id: &str) -> String {
    format!("/climate-zones/{zone_id}/modes/manual")
}

pub fn schedule_path(zone_id: &str) -> String {
    format!("/climate-zones/{zone_id}/modes/schedule")
}

pub fn temporary_override_path(zone_id: &str) -> String {
    format!("/climate-zones/{zone_id}/modes/temporary-override")
}

pub fn anti_frost_path(zone_id: &str) -> String {
    format!("/climate-zones/{zone_id}/modes/anti-frost")
}

pub fn fireplace_path(zone_id: &str) -> String {
    format!("/climate-zones/{zone_id}/modes/fireplacemode")
}

pub fn activate_program_path(zone_id: &str, program_id: u8) -> String {
    format!("/climate-zones/{zone_id}/time-programs/heating/{program_id}/activate")
}

pub fn dhw_mode_path(zone_id: &str, continuous_comfort: bool) -> String {
    let mode = if continuous_comfort { "continuous-comfort" } else { "schedule" };
    format!("/hot-water-zones/{zone_id}/modes/{mode}")
}

pub fn technical_details_path(appliance_id: &str) -> String {
    format!("/appliances/{appliance_id}/technicaldetails")
}

pub fn daily_consumption_path(appliance_id: &str) -> String {
    format!("/appliances/{appliance_id}/energyconsumption/daily")
}

pub fn setpoint_body(setpoint: f64) -> Value {
    json!({ "roomTemperatureSetPoint": setpoint })
}

pub fn schedule_body(program_id: u8) -> Value {
    json!({ "heatingProgramId": program_id })
}

pub fn fireplace_body(enabled: bool) -> Value {
    json!({ "fireplaceModeActive": enabled })
}

/// `startDate`/`endDate` covering `day` from midnight to one second before
/// the next midnight.
pub fn consumption_window(day: NaiveDate) -> (String, String) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = day.and_hms_opt(23, 59, 59).unwrap_or_default();
    (
        start.format(CONSUMPTION_TIME_FORMAT).to_string(),
        end.format(CONSUMPTION_TIME_FORMAT).to_string(),
    )
}

/// How natural-gas figures are turned back from kWh into gas volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasConversion {
    Off,
    /// Only natural-gas producer records.
    #[default]
    Producers,
    /// Producer records plus the appliance-level `*NaturalGas` consumption counters.
    ProducersAndTotals,
}

impl FromStr for GasConversion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(GasConversion::Off),
            "producers" => Ok(GasConversion::Producers),
            "producers_and_totals" | "all" => Ok(GasConversion::ProducersAndTotals),
            other => Err(Error::Config(format!("unknown gas conversion: {other}"))),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn convert_natural_gas(record: &mut ConsumptionRecord, calorific_value: Option<f64>, mode: GasConversion) {
    if mode == GasConversion::Off {
        return;
    }
    let needs_conversion = record
        .producers
        .iter()
        .any(|p| p.energy_type == EnergyType::NaturalGas)
        || mode == GasConversion::ProducersAndTotals;
    if !needs_conversion {
        return;
    }
    let cv = match calorific_value {
        Some(cv) if cv.is_finite() && cv > 0.0 => cv,
        other => {
            warn!(calorific_value = ?other, "no usable gas calorific value, leaving energy figures in kWh");
            return;
        }
    };

    for producer in &mut record.producers {
        if producer.energy_type != EnergyType::NaturalGas {
            continue;
        }
        for (field, value) in producer.counters.iter_mut() {
            if field.starts_with("energyConsumption") || field.starts_with("energyDelivered") {
                *value = round2(*value / cv);
            }
        }
    }

    if mode == GasConversion::ProducersAndTotals {
        for (field, value) in record.counters.iter_mut() {
            if field.starts_with("energyConsumption") && field.ends_with("NaturalGas") {
                *value = round2(*value / cv);
            }
        }
    }
}

/// Vendor numbers occasionally arrive as strings.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn f64_at(v: &Value, pointer: &str) -> Option<f64> {
    v.pointer(pointer).and_then(number)
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

fn required_id(v: &Value, field: &str) -> Result<String> {
    match v.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::MalformedResponse(format!("missing {field}"))),
    }
}

fn datetime_at(v: &Value, pointer: &str) -> Option<NaiveDateTime> {
    let s = str_at(v, pointer)?;
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local()))
}

pub fn parse_dashboard(body: &Value) -> Result<Vec<Appliance>> {
    let appliances = body
        .get("appliances")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedResponse("dashboard has no appliances array".into()))?;

    Ok(appliances
        .iter()
        .filter_map(|data| match parse_appliance(data) {
            Ok(appliance) => Some(appliance),
            Err(e) => {
                warn!(error = %e, "skipping appliance");
                None
            }
        })
        .collect())
}

pub fn parse_appliance(data: &Value) -> Result<Appliance> {
    let id = required_id(data, "applianceId")?;

    let climate_zones = data
        .get("climateZones")
        .and_then(Value::as_array)
        .map(|zones| {
            zones
                .iter()
                .filter_map(|z| match parse_climate_zone(z, &id) {
                    Ok(zone) => Some(zone),
                    Err(e) => {
                        warn!(appliance = %id, error = %e, "skipping climate zone");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let hot_water_zones = data
        .get("hotWaterZones")
        .and_then(Value::as_array)
        .map(|zones| {
            zones
                .iter()
                .filter_map(|z| match parse_hot_water_zone(z, &id) {
                    Ok(zone) => Some(zone),
                    Err(e) => {
                        warn!(appliance = %id, error = %e, "skipping hot water zone");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Appliance {
        house_name: str_at(data, "/houseName").unwrap_or_default().to_string(),
        water_pressure: f64_at(data, "/waterPressure"),
        outdoor_temperature: f64_at(data, "/outdoorTemperatureInformation/applianceOutdoorTemperature"),
        cloud_outdoor_temperature: f64_at(data, "/outdoorTemperatureInformation/cloudOutdoorTemperature"),
        gas_calorific_value: f64_at(data, "/gasCalorificValue"),
        climate_zones,
        hot_water_zones,
        consumption: ConsumptionRecord::default(),
        raw: data.clone(),
        id,
    })
}

pub fn parse_climate_zone(data: &Value, appliance_id: &str) -> Result<ClimateZone> {
    let id = required_id(data, "climateZoneId")?;
    let mode = match str_at(data, "/zoneMode") {
        Some(s) => ZoneMode::from_remeha_str(s),
        None => {
            warn!(zone = %id, "climate zone has no zoneMode");
            ZoneMode::Unrecognized(String::new())
        }
    };

    Ok(ClimateZone {
        appliance_id: appliance_id.to_string(),
        name: str_at(data, "/name").unwrap_or_default().to_string(),
        room_temperature: f64_at(data, "/roomTemperature"),
        setpoint: f64_at(data, "/setPoint"),
        setpoint_min: f64_at(data, "/setPointMin"),
        setpoint_max: f64_at(data, "/setPointMax"),
        mode,
        comfort_demand: str_at(data, "/activeComfortDemand")
            .map(ComfortDemand::from_remeha_str)
            .unwrap_or_default(),
        active_program: data
            .get("activeHeatingClimateTimeProgramNumber")
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok()),
        fireplace_mode: data
            .get("firePlaceModeActive")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        next_setpoint: f64_at(data, "/nextSetpoint"),
        next_switch_time: datetime_at(data, "/nextSwitchTime"),
        current_schedule_setpoint: f64_at(data, "/currentScheduleSetPoint"),
        raw: data.clone(),
        id,
    })
}

pub fn parse_hot_water_zone(data: &Value, appliance_id: &str) -> Result<HotWaterZone> {
    let id = required_id(data, "hotWaterZoneId")?;
    Ok(HotWaterZone {
        appliance_id: appliance_id.to_string(),
        name: str_at(data, "/name").unwrap_or_default().to_string(),
        temperature: f64_at(data, "/dhwTemperature"),
        status: str_at(data, "/dhwStatus")
            .map(DhwStatus::from_remeha_str)
            .unwrap_or_default(),
        dhw_mode: DhwMode::from_remeha_str(str_at(data, "/dhwZoneMode").unwrap_or_default()),
        raw: data.clone(),
        id,
    })
}

pub fn parse_technical_info(data: &Value) -> Result<TechnicalInfo> {
    if !data.is_object() {
        return Err(Error::MalformedResponse("technical details is not an object".into()));
    }
    let appliance_name = match str_at(data, "/applianceName") {
        Some(name) => name.to_string(),
        None => {
            warn!("technical details have no applianceName");
            "Unknown".to_string()
        }
    };
    let gateways = data
        .get("internetConnectedGateways")
        .and_then(Value::as_array)
        .map(|gws| {
            gws.iter()
                .map(|gw| GatewayInfo {
                    name: str_at(gw, "/name").unwrap_or("Unknown").to_string(),
                    hardware_version: str_at(gw, "/hardwareVersion").unwrap_or("Unknown").to_string(),
                    software_version: str_at(gw, "/softwareVersion").unwrap_or("Unknown").to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(TechnicalInfo {
        appliance_name,
        gateways,
    })
}

pub fn parse_consumption(body: &Value, appliance_id: &str) -> Result<Vec<ConsumptionRecord>> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedResponse("consumption response has no data array".into()))?;
    Ok(data
        .iter()
        .map(|point| parse_consumption_record(point, appliance_id))
        .collect())
}

fn parse_consumption_record(data: &Value, appliance_id: &str) -> ConsumptionRecord {
    let mut record = ConsumptionRecord::default();
    for counter in CONSUMPTION_COUNTERS {
        if let Some(value) = data.get(*counter).and_then(number) {
            record.counters.insert(counter.to_string(), value);
        }
    }
    if let Some(Value::Array(producers)) = data.pointer("/producerPerformanceStatistics/producers") {
        record.producers = producers
            .iter()
            .filter_map(|p| parse_producer(p, appliance_id))
            .collect();
    }
    record
}

/// Non-negative integer that fits a `u32`, as a number or numeric string.
fn instance_number(v: &Value) -> Option<u32> {
    let n = match v {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok()
}

fn parse_producer(data: &Value, appliance_id: &str) -> Option<Producer> {
    let Some(raw) = data.get("instanceWithinDevice") else {
        warn!(appliance = %appliance_id, "producer without instanceWithinDevice");
        return None;
    };
    let Some(instance) = instance_number(raw) else {
        warn!(appliance = %appliance_id, instance = %raw, "producer with invalid instanceWithinDevice");
        return None;
    };
    let counters = data
        .as_object()?
        .iter()
        .filter(|(k, _)| k.as_str() != "instanceWithinDevice")
        .filter_map(|(k, v)| number(v).map(|n| (k.clone(), n)))
        .collect();

    Some(Producer {
        id: format!("{appliance_id}_{instance}"),
        appliance_id: appliance_id.to_string(),
        producer_type: str_at(data, "/producerType").unwrap_or("Producer").to_string(),
        instance,
        energy_type: EnergyType::from_remeha_str(str_at(data, "/energyType").unwrap_or_default()),
        counters,
    })
}
