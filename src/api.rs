use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use reqwest::{Method, Response};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::auth::TokenProvider;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{self, DEFAULT_BASE_URL, SUBSCRIPTION_HEADER, SUBSCRIPTION_KEY};
use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ApiClientBuilder {
    tokens: Arc<TokenProvider>,
    base_url: String,
    subscription_key: String,
    timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl ApiClientBuilder {
    pub fn new(tokens: Arc<TokenProvider>) -> Self {
        Self {
            tokens,
            base_url: DEFAULT_BASE_URL.to_string(),
            subscription_key: SUBSCRIPTION_KEY.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Arc::new(Mutex::new(MessageLogger::new(mode, &path)?))),
            _ => None,
        };

        Ok(ApiClient {
            http,
            base_url: self.base_url,
            subscription_key: self.subscription_key,
            tokens: self.tokens,
            logger,
        })
    }
}

/// Authenticated access to the Remeha Home mobile API.
///
/// Every call asks the [`TokenProvider`] for a valid access token first, so
/// an expired token is refreshed transparently. A 401 from the API surfaces
/// as [`Error::Unauthorized`]; other non-success statuses as [`Error::Http`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    subscription_key: String,
    tokens: Arc<TokenProvider>,
    logger: Option<Arc<Mutex<MessageLogger>>>,
}

impl ApiClient {
    pub fn builder(tokens: Arc<TokenProvider>) -> ApiClientBuilder {
        ApiClientBuilder::new(tokens)
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    pub async fn get_dashboard(&self) -> Result<Vec<Appliance>> {
        let body = self.get_json(protocol::dashboard_path(), &[]).await?;
        protocol::parse_dashboard(&body)
    }

    pub async fn get_technical_info(&self, appliance_id: &str) -> Result<TechnicalInfo> {
        let body = self
            .get_json(&protocol::technical_details_path(appliance_id), &[])
            .await?;
        protocol::parse_technical_info(&body)
    }

    /// Consumption for the current local calendar day.
    pub async fn get_consumption_today(&self, appliance_id: &str) -> Result<Vec<ConsumptionRecord>> {
        self.get_consumption(appliance_id, Local::now().date_naive()).await
    }

    pub async fn get_consumption(&self, appliance_id: &str, day: NaiveDate) -> Result<Vec<ConsumptionRecord>> {
        let (start, end) = protocol::consumption_window(day);
        let body = self
            .get_json(
                &protocol::daily_consumption_path(appliance_id),
                &[("startDate", start), ("endDate", end)],
            )
            .await?;
        protocol::parse_consumption(&body, appliance_id)
    }

    // -- Command methods --

    /// Put the zone in manual mode at `setpoint`.
    pub async fn set_manual(&self, zone_id: &str, setpoint: f64) -> Result<()> {
        self.post_command(
            "set_manual",
            zone_id,
            &protocol::manual_path(zone_id),
            Some(protocol::setpoint_body(setpoint)),
        )
        .await
    }

    /// Return the zone to its schedule, running time program `program_id`.
    pub async fn set_schedule(&self, zone_id: &str, program_id: u8) -> Result<()> {
        check_program(zone_id, program_id)?;
        self.post_command(
            "set_schedule",
            zone_id,
            &protocol::schedule_path(zone_id),
            Some(protocol::schedule_body(program_id)),
        )
        .await
    }

    /// Override the scheduled setpoint until the next switch time.
    pub async fn set_temporary_override(&self, zone_id: &str, setpoint: f64) -> Result<()> {
        self.post_command(
            "set_temporary_override",
            zone_id,
            &protocol::temporary_override_path(zone_id),
            Some(protocol::setpoint_body(setpoint)),
        )
        .await
    }

    /// Frost protection.
    pub async fn set_off(&self, zone_id: &str) -> Result<()> {
        self.post_command("set_off", zone_id, &protocol::anti_frost_path(zone_id), None)
            .await
    }

    pub async fn set_fireplace_mode(&self, zone_id: &str, enabled: bool) -> Result<()> {
        self.post_command(
            "set_fireplace_mode",
            zone_id,
            &protocol::fireplace_path(zone_id),
            Some(protocol::fireplace_body(enabled)),
        )
        .await
    }

    pub async fn activate_time_program(&self, zone_id: &str, program_id: u8) -> Result<()> {
        check_program(zone_id, program_id)?;
        self.post_command(
            "activate_time_program",
            zone_id,
            &protocol::activate_program_path(zone_id, program_id),
            None,
        )
        .await
    }

    /// Switch a hot water zone between continuous comfort and its schedule.
    pub async fn set_dhw_mode(&self, zone_id: &str, continuous_comfort: bool) -> Result<()> {
        self.post_command(
            "set_dhw_mode",
            zone_id,
            &protocol::dhw_mode_path(zone_id, continuous_comfort),
            None,
        )
        .await
    }

    // -- Helpers --

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self.send(Method::GET, path, query, None).await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("{path}: {e}")))?;
        trace!(%path, "response received");
        self.with_logger(|logger| logger.log_response(path, status, &body));
        Ok(body)
    }

    async fn post_command(&self, action: &str, zone_id: &str, path: &str, body: Option<Value>) -> Result<()> {
        debug!(action, zone = %zone_id, "sending command");
        self.with_logger(|logger| logger.log_command(action, Some(zone_id), body.as_ref()));
        self.send(Method::POST, path, &[], body.as_ref()).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let token = self.tokens.get_valid_access_token().await?;
        let url = format!("{}{}", self.base_url, path);
        self.with_logger(|logger| logger.log_request(method.as_str(), path, body));

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .header(SUBSCRIPTION_HEADER, &self.subscription_key);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        self.with_logger(|logger| logger.log_error(path, status.as_u16(), &text));
        if status.as_u16() == 401 {
            warn!(%path, "API rejected access token");
            Err(Error::Unauthorized { body: text })
        } else {
            debug!(%path, status = status.as_u16(), "API request failed");
            Err(Error::Http {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut logger);
        }
    }
}

fn check_program(zone_id: &str, program_id: u8) -> Result<()> {
    if TIME_PROGRAMS.contains(&program_id) {
        Ok(())
    } else {
        warn!(zone = %zone_id, program_id, "unknown time program, command not sent");
        Err(Error::InvalidProgram(program_id))
    }
}
