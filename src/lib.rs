mod api;
pub mod attributes;
mod auth;
mod config;
mod context;
mod coordinator;
mod diff;
mod error;
mod logger;
mod pkce;
pub mod protocol;
mod snapshot;
mod types;

pub use api::{ApiClient, ApiClientBuilder, DEFAULT_REQUEST_TIMEOUT};
pub use attributes::{AttributeDescriptor, AttributeValue};
pub use auth::{Credentials, Token, TokenProvider, TokenProviderBuilder};
pub use config::Config;
pub use context::AccountContext;
pub use coordinator::{
    Coordinator, CoordinatorBuilder, DEFAULT_CONSUMPTION_INTERVAL, DEFAULT_REFRESH_INTERVAL,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::GasConversion;
pub use snapshot::{Entity, Snapshot, SnapshotQuery};
pub use types::*;
