#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use remeha_home::{ApiClient, Token, TokenProvider};
use serde_json::{Value, json};
use wiremock::MockServer;

pub const APPLIANCE: &str = "appliance-1";
pub const ZONE: &str = "zone-1";
pub const HOT_WATER: &str = "dhw-1";

pub fn fresh_token() -> Token {
    Token {
        access_token: "access-1".into(),
        refresh_token: "refresh-1".into(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub fn tokens(server: &MockServer) -> Arc<TokenProvider> {
    Arc::new(
        TokenProvider::builder()
            .login_base(server.uri())
            .token(fresh_token())
            .build()
            .expect("provider should build"),
    )
}

pub fn api(server: &MockServer) -> ApiClient {
    ApiClient::builder(tokens(server))
        .base_url(server.uri())
        .build()
        .expect("client should build")
}

pub fn dashboard(room_temperature: f64, zone_mode: &str) -> Value {
    json!({
        "appliances": [{
            "applianceId": APPLIANCE,
            "houseName": "Home",
            "waterPressure": 1.8,
            "gasCalorificValue": 9.77,
            "outdoorTemperatureInformation": {
                "applianceOutdoorTemperature": 6.5,
                "cloudOutdoorTemperature": 7.0
            },
            "climateZones": [{
                "climateZoneId": ZONE,
                "name": "Living room",
                "roomTemperature": room_temperature,
                "setPoint": 20.5,
                "setPointMin": 5.0,
                "setPointMax": 30.0,
                "zoneMode": zone_mode,
                "activeComfortDemand": "ProducingHeat",
                "activeHeatingClimateTimeProgramNumber": 2,
                "firePlaceModeActive": false,
                "nextSetpoint": 18.0,
                "nextSwitchTime": "2026-10-17T22:00:00",
                "currentScheduleSetPoint": 20.5
            }],
            "hotWaterZones": [{
                "hotWaterZoneId": HOT_WATER,
                "name": "Hot water",
                "dhwTemperature": 52.5,
                "dhwStatus": "Idle",
                "dhwZoneMode": "Scheduling"
            }]
        }]
    })
}

pub fn technical_details() -> Value {
    json!({
        "applianceName": "Elga Ace",
        "internetConnectedGateways": [{
            "name": "eTwist",
            "hardwareVersion": "2.1",
            "softwareVersion": "4.7.0"
        }]
    })
}

pub fn consumption(heating: f64, producers: Value) -> Value {
    json!({
        "data": [{
            "heatingEnergyConsumed": heating,
            "hotWaterEnergyConsumed": 1.25,
            "producerPerformanceStatistics": { "producers": producers }
        }]
    })
}
