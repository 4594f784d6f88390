//! Endpoint configuration.
//!
//! Addresses are read once, when a [`Stub`](crate::stub::Stub) is built.
//! Unset or blank environment variables fall back to [`DEFAULT_ADDRESS`].

use serde::{Deserialize, Serialize};

/// Address used for every service group unless overridden.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:50051";

pub const CATALOG_ADDR_ENV: &str = "PROTOSTUB_CATALOG_ADDR";
pub const AUTH_ADDR_ENV: &str = "PROTOSTUB_AUTH_ADDR";
pub const LAMBDA_ADDR_ENV: &str = "PROTOSTUB_LAMBDA_ADDR";

/// Address of each service group.
///
/// Groups that share an address share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    pub catalog: String,
    /// Serves both the authentication and the policy service.
    pub auth: String,
    pub lambda: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::uniform(DEFAULT_ADDRESS)
    }
}

impl Endpoints {
    /// Every group at the same address.
    pub fn uniform(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            catalog: addr.clone(),
            auth: addr.clone(),
            lambda: addr,
        }
    }

    /// Defaults overridden by `PROTOSTUB_*_ADDR` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    /// name.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
        };
        Self {
            catalog: read(CATALOG_ADDR_ENV),
            auth: read(AUTH_ADDR_ENV),
            lambda: read(LAMBDA_ADDR_ENV),
        }
    }
}
