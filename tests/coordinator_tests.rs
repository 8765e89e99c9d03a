mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use remeha_home::{
    ApiClient, CONSUMPTION_COUNTERS, Coordinator, CoordinatorState, Credentials, Entity,
    EntityKind, Error, Event, GasConversion, HvacMode, SnapshotQuery, ZoneMode,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

fn dashboard_path() -> &'static str {
    "/homes/dashboard"
}

fn technical_path() -> String {
    format!("/appliances/{APPLIANCE}/technicaldetails")
}

fn consumption_path() -> String {
    format!("/appliances/{APPLIANCE}/energyconsumption/daily")
}

async fn mount_dashboard(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_dashboard_once(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
}

async fn mount_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(technical_details()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(consumption_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(consumption(3.5, json!([]))))
        .mount(server)
        .await;
}

fn coordinator(server: &MockServer) -> Coordinator {
    Coordinator::builder(api(server))
        .refresh_interval(Duration::ZERO)
        .build()
}

fn manual_dashboard(setpoint: f64) -> Value {
    let mut body = dashboard(19.5, "Manual");
    body["appliances"][0]["climateZones"][0]["setPoint"] = json!(setpoint);
    body
}

fn zone_of(coordinator: &Coordinator) -> remeha_home::ClimateZone {
    match coordinator.get_snapshot_entry(ZONE) {
        Some(Entity::ClimateZone(zone)) => zone,
        other => panic!("expected climate zone, got {other:?}"),
    }
}

#[tokio::test]
async fn every_dashboard_entry_gets_entity_and_descriptor() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Idle);

    for id in [APPLIANCE, ZONE, HOT_WATER] {
        assert!(coordinator.get_snapshot_entry(id).is_some(), "{id} missing");
        assert!(coordinator.get_device_descriptor(id).is_some(), "{id} has no device");
    }

    let appliance_device = coordinator.get_device_descriptor(APPLIANCE).unwrap();
    assert_eq!(appliance_device.model, "Elga Ace");
    assert_eq!(appliance_device.manufacturer, "Remeha");

    let zone_device = coordinator.get_device_descriptor(ZONE).unwrap();
    assert_eq!(zone_device.model, "eTwist");
    assert_eq!(zone_device.sw_version.as_deref(), Some("4.7.0"));
    assert_eq!(zone_device.via_device.as_deref(), Some(APPLIANCE));

    assert!(coordinator.snapshot().updated_at().is_some());
}

#[tokio::test]
async fn manual_zone_end_to_end() {
    let server = MockServer::start().await;
    mount_dashboard(&server, manual_dashboard(21.5)).await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();

    let zone = zone_of(&coordinator);
    assert_eq!(zone.setpoint, Some(21.5));
    assert_eq!(zone.mode, ZoneMode::Manual);
    assert_eq!(zone.hvac_mode(), Some(HvacMode::Heat));
}

#[tokio::test]
async fn set_off_is_reflected_after_refresh() {
    let server = MockServer::start().await;
    mount_dashboard_once(&server, manual_dashboard(21.5)).await;
    mount_dashboard(&server, dashboard(19.5, "FrostProtection")).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/modes/anti-frost")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    assert_eq!(zone_of(&coordinator).mode, ZoneMode::Manual);

    coordinator.api().set_off(ZONE).await.unwrap();
    coordinator.request_immediate_refresh().await.unwrap();

    let zone = zone_of(&coordinator);
    assert_eq!(zone.mode, ZoneMode::FrostProtection);
    assert_eq!(zone.target_temperature(), None);
}

#[tokio::test]
async fn consumption_is_fetched_once_per_window() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(technical_details()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(consumption_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(consumption(3.5, json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.request_immediate_refresh().await.unwrap();

    let snapshot = coordinator.snapshot();
    let appliance = snapshot.appliances().next().unwrap();
    assert_eq!(appliance.consumption.heating_energy_consumed(), 3.5);
}

#[tokio::test]
async fn consumption_is_refetched_once_window_elapses() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(technical_details()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(consumption_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(consumption(3.5, json!([]))))
        .expect(2)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(api(&server))
        .refresh_interval(Duration::ZERO)
        .consumption_interval(Duration::ZERO)
        .build();
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.request_immediate_refresh().await.unwrap();
}

#[tokio::test]
async fn empty_consumption_yields_zeroed_record() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(technical_details()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(consumption_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    // An empty answer still counts as fetched.
    coordinator.request_immediate_refresh().await.unwrap();

    let entity = coordinator.get_snapshot_entry(APPLIANCE).unwrap();
    for counter in CONSUMPTION_COUNTERS {
        let key = format!("consumptionData.{counter}");
        assert_eq!(
            entity.attribute(&key).and_then(|v| v.as_f64()),
            Some(0.0),
            "{key}"
        );
    }
}

#[tokio::test]
async fn failed_consumption_fetch_is_retried_next_cycle() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(technical_details()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(consumption_path()))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    coordinator.request_immediate_refresh().await.unwrap();

    let snapshot = coordinator.snapshot();
    let appliance = snapshot.appliances().next().unwrap();
    assert_eq!(appliance.consumption.heating_energy_consumed(), 0.0);
}

#[tokio::test]
async fn natural_gas_producers_are_converted() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(technical_details()))
        .mount(&server)
        .await;
    let producers = json!([
        {
            "producerType": "Boiler",
            "instanceWithinDevice": 1,
            "energyType": "NaturalGas",
            "energyConsumptionCH": 100.0
        },
        {
            "producerType": "HeatPump",
            "instanceWithinDevice": 2,
            "energyType": "Electric",
            "energyConsumptionCH": 5.0
        }
    ]);
    Mock::given(method("GET"))
        .and(path(consumption_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(consumption(3.5, producers)))
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(api(&server))
        .refresh_interval(Duration::ZERO)
        .gas_conversion(GasConversion::Producers)
        .build();
    coordinator.request_immediate_refresh().await.unwrap();

    let boiler = match coordinator.get_snapshot_entry(&format!("{APPLIANCE}_1")) {
        Some(Entity::Producer(p)) => p,
        other => panic!("expected producer, got {other:?}"),
    };
    assert_eq!(boiler.counters.get("energyConsumptionCH"), Some(&10.24));

    let heat_pump = coordinator.get_snapshot_entry(&format!("{APPLIANCE}_2")).unwrap();
    assert_eq!(
        heat_pump.attribute("energyConsumptionCH").and_then(|v| v.as_f64()),
        Some(5.0)
    );
    let device = coordinator.get_device_descriptor(&format!("{APPLIANCE}_2")).unwrap();
    assert_eq!(device.name, "HeatPump_2");
    assert_eq!(device.via_device.as_deref(), Some(APPLIANCE));
}

#[tokio::test]
async fn unauthorized_dashboard_halts_polling() {
    let server = MockServer::start().await;
    mount_dashboard_once(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    let before = coordinator.snapshot();

    let err = coordinator.request_immediate_refresh().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }), "{err:?}");
    assert_eq!(coordinator.state(), CoordinatorState::AuthFailed);
    assert!(Arc::ptr_eq(&before, &coordinator.snapshot()));

    // Nothing polls until re-authentication.
    assert!(!coordinator.scheduled_refresh().await);
    assert!(matches!(
        coordinator.request_immediate_refresh().await,
        Err(Error::AuthRequired)
    ));
}

#[tokio::test]
async fn refresh_queued_behind_auth_failure_is_not_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(dashboard(19.5, "Scheduling")))
        .expect(0)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_immediate_refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.state(), CoordinatorState::Refreshing);

    // Waits for the lock held by the failing cycle.
    let second = coordinator.request_immediate_refresh().await;
    let first = first.await.unwrap();

    assert!(matches!(first, Err(Error::Unauthorized { .. })), "{first:?}");
    assert!(matches!(second, Err(Error::AuthRequired)), "{second:?}");
    assert_eq!(coordinator.state(), CoordinatorState::AuthFailed);
    assert!(!coordinator.scheduled_refresh().await);
    assert!(coordinator.snapshot().is_empty());
}

#[tokio::test]
async fn reauthentication_resumes_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    assert!(coordinator.request_immediate_refresh().await.is_err());
    assert_eq!(coordinator.state(), CoordinatorState::AuthFailed);

    coordinator
        .reauthenticate(&Credentials::RefreshToken("refresh-1".into()))
        .await
        .unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    coordinator.request_immediate_refresh().await.unwrap();
    assert!(coordinator.get_snapshot_entry(ZONE).is_some());
}

#[tokio::test]
async fn scheduled_failure_degrades_and_keeps_snapshot() {
    let server = MockServer::start().await;
    mount_dashboard_once(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    assert!(coordinator.scheduled_refresh().await);
    let before = coordinator.snapshot();

    // The failure stays inside the scheduler.
    assert!(coordinator.scheduled_refresh().await);
    assert_eq!(coordinator.state(), CoordinatorState::Degraded);
    assert!(Arc::ptr_eq(&before, &coordinator.snapshot()));
    assert_eq!(zone_of(&coordinator).room_temperature, Some(19.5));
}

#[tokio::test]
async fn scheduled_timeout_degrades_and_keeps_snapshot() {
    let server = MockServer::start().await;
    mount_dashboard_once(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(dashboard(21.0, "Scheduling"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    mount_details(&server).await;

    let api = ApiClient::builder(tokens(&server))
        .base_url(server.uri())
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let coordinator = Coordinator::builder(api)
        .refresh_interval(Duration::ZERO)
        .build();
    assert!(coordinator.scheduled_refresh().await);
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    let before = coordinator.snapshot();

    assert!(coordinator.scheduled_refresh().await);
    assert_eq!(coordinator.state(), CoordinatorState::Degraded);
    assert!(Arc::ptr_eq(&before, &coordinator.snapshot()));
    assert_eq!(zone_of(&coordinator).room_temperature, Some(19.5));

    let err = coordinator.request_immediate_refresh().await.unwrap_err();
    assert!(matches!(err, Error::Timeout), "{err:?}");
}

#[tokio::test]
async fn unreachable_api_degrades() {
    let server = MockServer::start().await;
    // Nothing listens on port 1.
    let api = ApiClient::builder(tokens(&server))
        .base_url("http://127.0.0.1:1")
        .build()
        .unwrap();
    let coordinator = Coordinator::builder(api)
        .refresh_interval(Duration::ZERO)
        .build();
    let before = coordinator.snapshot();

    assert!(coordinator.scheduled_refresh().await);
    assert_eq!(coordinator.state(), CoordinatorState::Degraded);
    assert!(Arc::ptr_eq(&before, &coordinator.snapshot()));

    let err = coordinator.request_immediate_refresh().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn technical_info_failure_is_retried_next_cycle() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    Mock::given(method("GET"))
        .and(path(technical_path()))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    assert!(coordinator.request_immediate_refresh().await.is_err());
    assert_eq!(coordinator.state(), CoordinatorState::Degraded);
    assert!(coordinator.snapshot().is_empty());

    coordinator.request_immediate_refresh().await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert_eq!(coordinator.get_device_descriptor(APPLIANCE).unwrap().model, "Elga Ace");
}

#[tokio::test]
async fn scheduled_tick_is_skipped_while_cycle_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(dashboard(19.5, "Scheduling"))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_immediate_refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(coordinator.state(), CoordinatorState::Refreshing);
    assert!(!coordinator.scheduled_refresh().await);

    running.await.unwrap().unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
}

#[tokio::test]
async fn shutdown_abandons_in_flight_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(dashboard(19.5, "Scheduling"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = coordinator(&server);
    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_immediate_refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.shutdown().await;

    let result = running.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");
    assert!(coordinator.snapshot().is_empty());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert!(matches!(
        coordinator.request_immediate_refresh().await,
        Err(Error::Cancelled)
    ));
}

#[tokio::test]
async fn background_task_polls_until_shutdown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(dashboard_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(dashboard(19.5, "Scheduling")))
        .expect(2..)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let coordinator = Coordinator::builder(api(&server))
        .refresh_interval(Duration::from_millis(50))
        .build();
    coordinator.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    coordinator.shutdown().await;

    assert!(coordinator.get_snapshot_entry(ZONE).is_some());
}

#[tokio::test]
async fn change_events_follow_snapshot_differences() {
    let server = MockServer::start().await;
    mount_dashboard_once(&server, dashboard(19.5, "Scheduling")).await;
    mount_dashboard(&server, dashboard(20.0, "Scheduling")).await;
    mount_details(&server).await;

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let snapshots = Arc::new(Mutex::new(0usize));
    let coordinator = {
        let events = events.clone();
        let snapshots = snapshots.clone();
        Coordinator::builder(api(&server))
            .refresh_interval(Duration::ZERO)
            .on_event(move |e| events.lock().unwrap().push(e.clone()))
            .on_snapshot(move |_| *snapshots.lock().unwrap() += 1)
            .build()
    };

    coordinator.request_immediate_refresh().await.unwrap();
    {
        let events = events.lock().unwrap();
        let discovered: Vec<EntityKind> = events
            .iter()
            .filter_map(|e| match e {
                Event::EntityDiscovered { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(discovered.len(), 3);
        assert!(discovered.contains(&EntityKind::ClimateZone));
        assert!(events.contains(&Event::StateChanged {
            from: CoordinatorState::Idle,
            to: CoordinatorState::Refreshing,
        }));
    }
    events.lock().unwrap().clear();

    coordinator.request_immediate_refresh().await.unwrap();
    let events = events.lock().unwrap();
    assert!(events.contains(&Event::ZoneTemperatureChanged {
        zone_id: ZONE.into(),
        name: "Living room".into(),
        temperature: 20.0,
    }));
    assert!(!events.iter().any(|e| matches!(e, Event::EntityDiscovered { .. })));
    assert_eq!(*snapshots.lock().unwrap(), 2);
}

#[tokio::test]
async fn optimistic_setpoint_is_replaced_by_next_fetch() {
    let server = MockServer::start().await;
    mount_dashboard(&server, manual_dashboard(20.5)).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/modes/manual")))
        .and(body_json(json!({"roomTemperatureSetPoint": 23.0})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let coordinator = {
        let seen = seen.clone();
        Coordinator::builder(api(&server))
            .refresh_interval(Duration::ZERO)
            .on_snapshot(move |s| {
                let setpoint = s.climate_zone(ZONE).and_then(|z| z.setpoint);
                seen.lock().unwrap().push(setpoint);
            })
            .build()
    };
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.set_temperature(ZONE, 23.0).await.unwrap();

    // Initial fetch, optimistic patch, then the vendor's (unchanged) value.
    assert_eq!(*seen.lock().unwrap(), vec![Some(20.5), Some(23.0), Some(20.5)]);
    assert_eq!(zone_of(&coordinator).setpoint, Some(20.5));
}

#[tokio::test]
async fn temperature_in_schedule_uses_temporary_override() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/modes/temporary-override")))
        .and(body_json(json!({"roomTemperatureSetPoint": 22.0})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.set_temperature(ZONE, 22.0).await.unwrap();
}

#[tokio::test]
async fn temperature_is_ignored_when_off() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "FrostProtection")).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.set_temperature(ZONE, 22.0).await.unwrap();
}

#[tokio::test]
async fn hvac_auto_resumes_active_program() {
    let server = MockServer::start().await;
    mount_dashboard(&server, manual_dashboard(21.0)).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/modes/schedule")))
        .and(body_json(json!({"heatingProgramId": 2})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.set_hvac_mode(ZONE, HvacMode::Auto).await.unwrap();
}

#[tokio::test]
async fn preset_from_manual_activates_program_and_schedule() {
    let server = MockServer::start().await;
    mount_dashboard(&server, manual_dashboard(21.0)).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/time-programs/heating/3/activate")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/modes/schedule")))
        .and(body_json(json!({"heatingProgramId": 3})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.set_preset(ZONE, "clock_program_3").await.unwrap();
}

#[tokio::test]
async fn invalid_commands_send_nothing() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();

    let err = coordinator.set_preset(ZONE, "clock_program_9").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPreset(ref p) if p == "clock_program_9"));
    let err = coordinator.set_preset(ZONE, "anti_frost").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPreset(_)));
    let err = coordinator.set_temperature("no-such-zone", 20.0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidZone(_)));
    let err = coordinator.set_dhw_mode(ZONE, true).await.unwrap_err();
    assert!(matches!(err, Error::InvalidZone(_)));
}

#[tokio::test]
async fn hot_water_and_fireplace_commands() {
    let server = MockServer::start().await;
    mount_dashboard(&server, dashboard(19.5, "Scheduling")).await;
    mount_details(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/hot-water-zones/{HOT_WATER}/modes/schedule")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/climate-zones/{ZONE}/modes/fireplacemode")))
        .and(body_json(json!({"fireplaceModeActive": true})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.request_immediate_refresh().await.unwrap();
    coordinator.set_dhw_mode(HOT_WATER, false).await.unwrap();
    coordinator.set_fireplace_mode(ZONE, true).await.unwrap();
}
