use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::api::ApiClient;
use crate::auth::Credentials;
use crate::diff::diff_snapshots;
use crate::protocol::{GasConversion, convert_natural_gas};
use crate::snapshot::{Entity, Snapshot, SnapshotQuery};
use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Just under the vendor's 15 minute aggregation period.
pub const DEFAULT_CONSUMPTION_INTERVAL: Duration = Duration::from_secs(14 * 60 + 45);

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&Snapshot) + Send + Sync>;

pub struct CoordinatorBuilder {
    api: ApiClient,
    refresh_interval: Duration,
    consumption_interval: Duration,
    gas_conversion: GasConversion,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl CoordinatorBuilder {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            consumption_interval: DEFAULT_CONSUMPTION_INTERVAL,
            gas_conversion: GasConversion::default(),
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
        }
    }

    /// Zero disables the background task; refreshes then only happen on demand.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn consumption_interval(mut self, interval: Duration) -> Self {
        self.consumption_interval = interval;
        self
    }

    pub fn gas_conversion(mut self, mode: GasConversion) -> Self {
        self.gas_conversion = mode;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&Snapshot) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> Coordinator {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Coordinator {
            inner: Arc::new(CoordinatorInner {
                api: self.api,
                refresh_interval: self.refresh_interval,
                consumption_interval: self.consumption_interval,
                gas_conversion: self.gas_conversion,
                snapshot: ArcSwap::from_pointee(Snapshot::default()),
                state,
                cycle: Mutex::new(CycleCache::default()),
                event_callbacks: self.event_callbacks,
                snapshot_callbacks: self.snapshot_callbacks,
                cancel: CancellationToken::new(),
                task: std::sync::Mutex::new(None),
            }),
        }
    }
}

/// Keeps a merged [`Snapshot`] of one account current.
///
/// Cheaply cloneable. A cycle fetches the dashboard, technical details for
/// appliances not seen before, and consumption when its window has elapsed,
/// then publishes the result atomically. Only one cycle runs at a time.
///
/// Authentication failures move the coordinator to
/// [`CoordinatorState::AuthFailed`]; scheduled polling stops until
/// [`reauthenticate`](Self::reauthenticate) succeeds. Any other failure
/// moves it to [`CoordinatorState::Degraded`] and keeps serving the last
/// good snapshot.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    api: ApiClient,
    refresh_interval: Duration,
    consumption_interval: Duration,
    gas_conversion: GasConversion,
    snapshot: ArcSwap<Snapshot>,
    state: watch::Sender<CoordinatorState>,
    cycle: Mutex<CycleCache>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Data that outlives a single cycle.
#[derive(Default)]
struct CycleCache {
    technical_info: HashMap<String, TechnicalInfo>,
    consumption: HashMap<String, ConsumptionRecord>,
    consumption_fetched_at: HashMap<String, Instant>,
}

impl Coordinator {
    pub fn builder(api: ApiClient) -> CoordinatorBuilder {
        CoordinatorBuilder::new(api)
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// The last published snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    pub fn state(&self) -> CoordinatorState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state.subscribe()
    }

    // -- Lifecycle --

    /// Spawn the periodic refresh task. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if self.inner.refresh_interval.is_zero() {
            debug!("refresh interval is zero, not scheduling refreshes");
            return;
        }
        let Ok(mut task) = self.inner.task.lock() else {
            return;
        };
        if task.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }
        *task = Some(tokio::spawn(refresh_task(
            self.clone(),
            self.inner.refresh_interval,
            self.inner.cancel.clone(),
        )));
        debug!(interval_secs = self.inner.refresh_interval.as_secs(), "refresh task started");
    }

    /// Stop the background task and abandon any in-flight cycle. The last
    /// published snapshot stays readable.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("coordinator stopped");
    }

    // -- Refresh --

    /// Run a cycle now, waiting for a running one to finish first.
    pub async fn request_immediate_refresh(&self) -> Result<()> {
        if self.state() == CoordinatorState::AuthFailed {
            return Err(Error::AuthRequired);
        }
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut cache = self.inner.cycle.lock().await;
        // The cycle we waited on may have ended in an auth failure.
        if self.state() == CoordinatorState::AuthFailed {
            debug!("authentication failed while waiting, refresh not run");
            return Err(Error::AuthRequired);
        }
        self.run_cycle(&mut cache).await
    }

    /// What the background task does on every tick. Returns `false` when the
    /// tick was skipped because a cycle is already running or polling is
    /// halted.
    pub async fn scheduled_refresh(&self) -> bool {
        if self.state() == CoordinatorState::AuthFailed {
            trace!("waiting for re-authentication, tick skipped");
            return false;
        }
        let Ok(mut cache) = self.inner.cycle.try_lock() else {
            debug!("refresh already running, tick skipped");
            return false;
        };
        if self.state() == CoordinatorState::AuthFailed {
            return false;
        }
        // Failures are logged and reflected in the state.
        let _ = self.run_cycle(&mut cache).await;
        true
    }

    /// Log in again and resume polling.
    pub async fn reauthenticate(&self, credentials: &Credentials) -> Result<()> {
        self.inner.api.tokens().login(credentials).await?;
        info!("re-authenticated, polling resumed");
        self.set_state(CoordinatorState::Idle);
        Ok(())
    }

    async fn run_cycle(&self, cache: &mut CycleCache) -> Result<()> {
        let before = self.state();
        self.set_state(CoordinatorState::Refreshing);
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(Error::Cancelled),
            result = self.collect(cache) => result,
        };

        match outcome {
            Ok(appliances) => {
                self.publish(&appliances, cache);
                debug!(
                    appliances = appliances.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "refresh complete"
                );
                self.set_state(CoordinatorState::Idle);
                Ok(())
            }
            Err(Error::Cancelled) => {
                debug!("refresh abandoned");
                self.set_state(before);
                Err(Error::Cancelled)
            }
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "authentication failed, polling halted until re-authentication");
                self.set_state(CoordinatorState::AuthFailed);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "refresh failed, keeping last snapshot");
                self.set_state(CoordinatorState::Degraded);
                Err(e)
            }
        }
    }

    async fn collect(&self, cache: &mut CycleCache) -> Result<Vec<Appliance>> {
        let api = &self.inner.api;
        let mut appliances = api.get_dashboard().await?;
        trace!(count = appliances.len(), "dashboard fetched");

        for appliance in &mut appliances {
            if !cache.technical_info.contains_key(&appliance.id) {
                let info = api.get_technical_info(&appliance.id).await?;
                match info.gateways.len() {
                    0 => warn!(appliance = %appliance.id, "no gateway reported, zone devices will be Unknown"),
                    1 => {}
                    n => warn!(appliance = %appliance.id, gateways = n, "several gateways reported, using the first"),
                }
                debug!(appliance = %appliance.id, model = %info.appliance_name, "technical info cached");
                cache.technical_info.insert(appliance.id.clone(), info);
            }

            self.refresh_consumption(appliance, cache).await?;
            if let Some(record) = cache.consumption.get(&appliance.id) {
                appliance.consumption = record.clone();
            }
        }
        Ok(appliances)
    }

    async fn refresh_consumption(&self, appliance: &Appliance, cache: &mut CycleCache) -> Result<()> {
        let due = cache
            .consumption_fetched_at
            .get(&appliance.id)
            .is_none_or(|at| at.elapsed() >= self.inner.consumption_interval);
        if !due {
            return Ok(());
        }

        match self.inner.api.get_consumption_today(&appliance.id).await {
            Ok(records) => {
                let mut record = match records.into_iter().next() {
                    Some(record) => record,
                    None => {
                        warn!(appliance = %appliance.id, "no consumption data for today, using zeroes");
                        ConsumptionRecord::default()
                    }
                };
                convert_natural_gas(&mut record, appliance.gas_calorific_value, self.inner.gas_conversion);
                cache.consumption.insert(appliance.id.clone(), record);
                cache
                    .consumption_fetched_at
                    .insert(appliance.id.clone(), Instant::now());
                Ok(())
            }
            Err(e) if e.is_auth_failure() => Err(e),
            Err(e) => {
                warn!(appliance = %appliance.id, error = %e, "consumption fetch failed, keeping previous values");
                Ok(())
            }
        }
    }

    fn publish(&self, appliances: &[Appliance], cache: &CycleCache) {
        let entries = build_entries(appliances, &cache.technical_info);
        let now = Utc::now();

        let mut published = None;
        let previous = self.inner.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            for (entity, device) in &entries {
                next.insert(entity.clone(), device.clone());
            }
            next.updated_at = Some(now);
            let next = Arc::new(next);
            published = Some(next.clone());
            next
        });

        if let Some(next) = published {
            self.notify(&previous, &next);
        }
    }

    fn notify(&self, previous: &Snapshot, next: &Snapshot) {
        if !self.inner.event_callbacks.is_empty() {
            for event in diff_snapshots(previous, next) {
                self.emit(&event);
            }
        }
        for cb in &self.inner.snapshot_callbacks {
            cb(next);
        }
    }

    fn emit(&self, event: &Event) {
        for cb in &self.inner.event_callbacks {
            cb(event);
        }
    }

    fn set_state(&self, next: CoordinatorState) {
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            trace!(?previous, ?next, "coordinator state");
            self.emit(&Event::StateChanged { from: previous, to: next });
        }
    }

    // -- Command methods --

    /// Switch a climate zone between schedule, manual and frost protection.
    pub async fn set_hvac_mode(&self, zone_id: &str, mode: HvacMode) -> Result<()> {
        let zone = self.climate_zone(zone_id)?;
        let api = &self.inner.api;
        match mode {
            HvacMode::Auto => {
                let program = zone.active_program.unwrap_or_default();
                api.set_schedule(zone_id, program).await?;
            }
            HvacMode::Heat => {
                let setpoint = zone
                    .setpoint
                    .ok_or_else(|| Error::MalformedResponse(format!("zone {zone_id} has no setpoint")))?;
                api.set_manual(zone_id, setpoint).await?;
            }
            HvacMode::Off => api.set_off(zone_id).await?,
        }
        self.patch_climate_zone(zone_id, |z| z.mode = mode.zone_mode());
        self.refresh_after_command().await;
        Ok(())
    }

    /// Change the target temperature the way the zone's current mode allows:
    /// a temporary override while scheduling, the manual setpoint otherwise.
    /// Zones in frost protection ignore the request.
    pub async fn set_temperature(&self, zone_id: &str, temperature: f64) -> Result<()> {
        let zone = self.climate_zone(zone_id)?;
        match zone.hvac_mode() {
            Some(HvacMode::Auto) => {
                self.inner.api.set_temporary_override(zone_id, temperature).await?;
                self.patch_climate_zone(zone_id, |z| {
                    z.mode = ZoneMode::TemporaryOverride;
                    z.setpoint = Some(temperature);
                });
            }
            Some(HvacMode::Heat) => {
                self.inner.api.set_manual(zone_id, temperature).await?;
                self.patch_climate_zone(zone_id, |z| z.setpoint = Some(temperature));
            }
            Some(HvacMode::Off) => {
                debug!(zone = %zone_id, "zone is off, temperature unchanged");
                return Ok(());
            }
            None => {
                warn!(zone = %zone_id, mode = %zone.mode.as_remeha_str(), "unknown zone mode, temperature unchanged");
                return Ok(());
            }
        }
        self.refresh_after_command().await;
        Ok(())
    }

    /// Select `clock_program_N`, returning the zone to its schedule if needed.
    pub async fn set_preset(&self, zone_id: &str, preset: &str) -> Result<()> {
        let Some(Preset::ClockProgram(program)) = Preset::selectable(preset) else {
            warn!(zone = %zone_id, preset, "preset cannot be selected");
            return Err(Error::InvalidPreset(preset.to_string()));
        };
        let zone = self.climate_zone(zone_id)?;
        let api = &self.inner.api;

        api.activate_time_program(zone_id, program).await?;
        if zone.hvac_mode() != Some(HvacMode::Auto) {
            api.set_schedule(zone_id, program).await?;
        }
        self.patch_climate_zone(zone_id, |z| {
            z.mode = ZoneMode::Scheduling;
            z.active_program = Some(program);
        });
        self.refresh_after_command().await;
        Ok(())
    }

    pub async fn set_fireplace_mode(&self, zone_id: &str, enabled: bool) -> Result<()> {
        self.climate_zone(zone_id)?;
        self.inner.api.set_fireplace_mode(zone_id, enabled).await?;
        self.patch_climate_zone(zone_id, |z| z.fireplace_mode = enabled);
        self.refresh_after_command().await;
        Ok(())
    }

    pub async fn set_dhw_mode(&self, zone_id: &str, continuous_comfort: bool) -> Result<()> {
        if self.snapshot().hot_water_zone(zone_id).is_none() {
            return Err(Error::InvalidZone(zone_id.to_string()));
        }
        self.inner.api.set_dhw_mode(zone_id, continuous_comfort).await?;
        let mode = if continuous_comfort {
            DhwMode::ContinuousComfort
        } else {
            DhwMode::Schedule
        };
        self.patch_snapshot(|snapshot| snapshot.patch_hot_water_zone(zone_id, |z| z.dhw_mode = mode.clone()));
        self.refresh_after_command().await;
        Ok(())
    }

    // -- Helpers --

    fn climate_zone(&self, zone_id: &str) -> Result<ClimateZone> {
        self.snapshot()
            .climate_zone(zone_id)
            .cloned()
            .ok_or_else(|| Error::InvalidZone(zone_id.to_string()))
    }

    /// Show the commanded value until the next fetch replaces it.
    fn patch_climate_zone(&self, zone_id: &str, patch: impl Fn(&mut ClimateZone)) {
        self.patch_snapshot(|snapshot| snapshot.patch_climate_zone(zone_id, &patch));
    }

    fn patch_snapshot(&self, patch: impl Fn(&mut Snapshot) -> bool) {
        let mut published = None;
        let previous = self.inner.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            if patch(&mut next) {
                let next = Arc::new(next);
                published = Some(next.clone());
                next
            } else {
                published = None;
                Arc::clone(current)
            }
        });
        if let Some(next) = published {
            self.notify(&previous, &next);
        }
    }

    async fn refresh_after_command(&self) {
        if let Err(e) = self.request_immediate_refresh().await {
            debug!(error = %e, "refresh after command failed");
        }
    }
}

impl SnapshotQuery for Coordinator {
    fn get_snapshot_entry(&self, id: &str) -> Option<Entity> {
        self.inner.snapshot.load().get_snapshot_entry(id)
    }

    fn get_device_descriptor(&self, id: &str) -> Option<DeviceInfo> {
        self.inner.snapshot.load().get_device_descriptor(id)
    }
}

/// Entities and device descriptors for every fetched appliance.
fn build_entries(
    appliances: &[Appliance],
    technical_info: &HashMap<String, TechnicalInfo>,
) -> Vec<(Entity, DeviceInfo)> {
    let mut entries = Vec::new();
    for appliance in appliances {
        let info = technical_info.get(&appliance.id);
        let gateway = info
            .and_then(|i| i.gateways.first().cloned())
            .unwrap_or_else(GatewayInfo::unknown);

        for zone in &appliance.climate_zones {
            let device = DeviceInfo {
                id: zone.id.clone(),
                name: zone.name.clone(),
                manufacturer: MANUFACTURER.to_string(),
                model: gateway.name.clone(),
                hw_version: Some(gateway.hardware_version.clone()),
                sw_version: Some(gateway.software_version.clone()),
                via_device: Some(appliance.id.clone()),
            };
            entries.push((Entity::ClimateZone(zone.clone()), device));
        }

        for zone in &appliance.hot_water_zones {
            let device = DeviceInfo {
                id: zone.id.clone(),
                name: zone.name.clone(),
                manufacturer: MANUFACTURER.to_string(),
                model: "Hot Water Zone".to_string(),
                hw_version: None,
                sw_version: None,
                via_device: Some(appliance.id.clone()),
            };
            entries.push((Entity::HotWaterZone(zone.clone()), device));
        }

        let producers = &appliance.consumption.producers;
        if producers.len() > 1 {
            for producer in producers {
                let device = DeviceInfo {
                    id: producer.id.clone(),
                    name: producer.display_name(),
                    manufacturer: MANUFACTURER.to_string(),
                    model: producer.producer_type.clone(),
                    hw_version: None,
                    sw_version: None,
                    via_device: Some(appliance.id.clone()),
                };
                entries.push((Entity::Producer(producer.clone()), device));
            }
        }

        let device = DeviceInfo {
            id: appliance.id.clone(),
            name: appliance.house_name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model: info
                .map(|i| i.appliance_name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            hw_version: None,
            sw_version: None,
            via_device: None,
        };
        entries.push((Entity::Appliance(appliance.clone()), device));
    }
    entries
}

/// Periodically refresh until cancelled.
async fn refresh_task(coordinator: Coordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                coordinator.scheduled_refresh().await;
            }
        }
    }
}
