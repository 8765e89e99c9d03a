use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::DEFAULT_REQUEST_TIMEOUT;
use crate::auth::{Credentials, DEFAULT_LOGIN_BASE, DEFAULT_LOGIN_TIMEOUT};
use crate::coordinator::{DEFAULT_CONSUMPTION_INTERVAL, DEFAULT_REFRESH_INTERVAL};
use crate::logger::MessageLogMode;
use crate::protocol::{DEFAULT_BASE_URL, GasConversion};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub api_base: String,
    pub login_base: String,
    pub refresh_interval: Duration,
    pub consumption_interval: Duration,
    pub request_timeout: Duration,
    pub login_timeout: Duration,
    pub gas_conversion: GasConversion,
    /// Tokens are persisted here and reused across restarts.
    pub token_file: Option<PathBuf>,
    pub message_log: Option<(MessageLogMode, PathBuf)>,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api_base: DEFAULT_BASE_URL.to_string(),
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            consumption_interval: DEFAULT_CONSUMPTION_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            gas_conversion: GasConversion::default(),
            token_file: None,
            message_log: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let credentials = match (get("REMEHA_EMAIL"), get("REMEHA_PASSWORD"), get("REMEHA_REFRESH_TOKEN")) {
            (Some(email), Some(password), _) => Credentials::Password { email, password },
            (_, _, Some(refresh)) => Credentials::RefreshToken(refresh),
            _ => {
                return Err(Error::Config(
                    "set REMEHA_EMAIL and REMEHA_PASSWORD, or REMEHA_REFRESH_TOKEN".to_string(),
                ));
            }
        };

        let mut config = Config::new(credentials);
        if let Some(url) = get("REMEHA_API_BASE") {
            config.api_base = url;
        }
        if let Some(url) = get("REMEHA_LOGIN_BASE") {
            config.login_base = url;
        }
        if let Some(secs) = get("REMEHA_REFRESH_INTERVAL_SECS") {
            config.refresh_interval = Duration::from_secs(parse("REMEHA_REFRESH_INTERVAL_SECS", &secs)?);
        }
        if let Some(secs) = get("REMEHA_CONSUMPTION_INTERVAL_SECS") {
            config.consumption_interval = Duration::from_secs(parse("REMEHA_CONSUMPTION_INTERVAL_SECS", &secs)?);
        }
        if let Some(secs) = get("REMEHA_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse("REMEHA_REQUEST_TIMEOUT_SECS", &secs)?);
        }
        if let Some(mode) = get("REMEHA_GAS_CONVERSION") {
            config.gas_conversion = mode.parse()?;
        }
        config.token_file = get("REMEHA_TOKEN_FILE").map(PathBuf::from);
        if let Some(path) = get("REMEHA_MESSAGE_LOG") {
            let mode = match get("REMEHA_MESSAGE_LOG_MODE") {
                Some(mode) => mode.parse()?,
                None => MessageLogMode::Full,
            };
            config.message_log = Some((mode, PathBuf::from(path)));
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} is not a valid number: {value}")))
}
