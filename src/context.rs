use std::sync::Arc;

use tracing::{info, warn};

use crate::api::ApiClient;
use crate::attributes;
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorBuilder};
use crate::Result;

/// Everything one configured account needs: token provider, API client and
/// coordinator, wired together and running.
pub struct AccountContext {
    config: Config,
    tokens: Arc<TokenProvider>,
    api: ApiClient,
    coordinator: Coordinator,
}

impl AccountContext {
    pub async fn connect(config: Config) -> Result<Self> {
        Self::connect_with(config, |builder| builder).await
    }

    /// Like [`connect`](Self::connect), with a hook to register callbacks on
    /// the coordinator before it is built.
    ///
    /// Logs in unless a stored token is available, runs the first refresh,
    /// checks the payload against the attribute tables and starts polling.
    pub async fn connect_with(
        config: Config,
        configure: impl FnOnce(CoordinatorBuilder) -> CoordinatorBuilder,
    ) -> Result<Self> {
        let mut tokens = TokenProvider::builder()
            .login_base(&config.login_base)
            .token_timeout(config.request_timeout)
            .login_timeout(config.login_timeout);
        if let Some(path) = &config.token_file {
            tokens = tokens.token_file(path);
        }
        let tokens = Arc::new(tokens.build()?);
        if !tokens.has_token().await {
            tokens.login(&config.credentials).await?;
        }

        let mut api = ApiClient::builder(tokens.clone())
            .base_url(&config.api_base)
            .timeout(config.request_timeout);
        if let Some((mode, path)) = &config.message_log {
            api = api.message_log(*mode, path);
        }
        let api = api.build()?;

        let coordinator = configure(
            Coordinator::builder(api.clone())
                .refresh_interval(config.refresh_interval)
                .consumption_interval(config.consumption_interval)
                .gas_conversion(config.gas_conversion),
        )
        .build();

        match coordinator.request_immediate_refresh().await {
            Ok(()) => {}
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "stored token rejected, logging in again");
                coordinator.reauthenticate(&config.credentials).await?;
                coordinator.request_immediate_refresh().await?;
            }
            Err(e) => return Err(e),
        }

        attributes::validate(&coordinator.snapshot());
        coordinator.start();
        info!(entities = coordinator.snapshot().len(), "Remeha Home account connected");

        Ok(Self {
            config,
            tokens,
            api,
            coordinator,
        })
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Log in again with the configured credentials after an auth failure.
    pub async fn reauthenticate(&self) -> Result<()> {
        self.coordinator.reauthenticate(&self.config.credentials).await?;
        self.coordinator.request_immediate_refresh().await
    }

    pub async fn shutdown(self) {
        self.coordinator.shutdown().await;
    }
}
