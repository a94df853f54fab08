//! Backend endpoint and approval prompt configuration.
//!
//! Defaults point at the public PureStake endpoints. Environment variables
//! override individual entries; a JSON document can replace the whole table.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::approval::Dimensions;
use crate::error::{RequestError, Result};
use crate::types::{Ledger, Service};

/// Header carrying the backend API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Environment variable holding the backend API key.
pub const ENV_API_KEY: &str = "GATEKEEPER_API_KEY";

/// View loaded into the approval prompt.
pub const AUTHORIZE_VIEW: &str = "index.html#/authorize";

/// Approval prompt size, content plus window chrome.
pub const AUTHORIZE_WIDTH: u32 = 400 + 12;
pub const AUTHORIZE_HEIGHT: u32 = 550 + 34;

/// Resolved connection to one backend service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConnection {
    pub url: String,
    #[serde(default)]
    pub port: String,
    /// Headers attached to every request (API key).
    #[serde(default)]
    pub api_key: HashMap<String, String>,
}

impl BackendConnection {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            port: String::new(),
            api_key: HashMap::new(),
        }
    }

    /// URL with the port appended when one is configured.
    pub fn base_url(&self) -> String {
        if self.port.is_empty() {
            self.url.clone()
        } else {
            format!("{}:{}", self.url, self.port)
        }
    }
}

/// Algod and indexer connections for one ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBackends {
    pub algod: BackendConnection,
    pub indexer: BackendConnection,
}

/// Backend-settings resolver: `(ledger, service) -> connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    backends: HashMap<Ledger, LedgerBackends>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        let mut backends = HashMap::new();
        backends.insert(
            Ledger::TestNet,
            LedgerBackends {
                algod: BackendConnection::new("https://testnet-algorand.api.purestake.io/ps2"),
                indexer: BackendConnection::new("https://testnet-algorand.api.purestake.io/idx2"),
            },
        );
        backends.insert(
            Ledger::MainNet,
            LedgerBackends {
                algod: BackendConnection::new("https://mainnet-algorand.api.purestake.io/ps2"),
                indexer: BackendConnection::new("https://mainnet-algorand.api.purestake.io/idx2"),
            },
        );
        Self { backends }
    }
}

impl BackendSettings {
    /// Defaults overridden by environment variables.
    ///
    /// `GATEKEEPER_<LEDGER>_<SERVICE>_URL` and `..._PORT` replace single
    /// entries, e.g. `GATEKEEPER_TESTNET_ALGOD_URL`. `GATEKEEPER_API_KEY` is
    /// attached to every connection.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        let api_key = env::var(ENV_API_KEY).ok();

        for ledger in Ledger::ALL {
            for service in [Service::Algod, Service::Indexer] {
                let Some(conn) = settings.resolve_mut(ledger, service) else {
                    continue;
                };
                let prefix = format!(
                    "GATEKEEPER_{}_{}",
                    ledger.as_str().to_ascii_uppercase(),
                    service.to_string().to_ascii_uppercase()
                );
                if let Ok(url) = env::var(format!("{}_URL", prefix)) {
                    conn.url = url;
                }
                if let Ok(port) = env::var(format!("{}_PORT", prefix)) {
                    conn.port = port;
                }
                if let Some(key) = &api_key {
                    conn.api_key.insert(API_KEY_HEADER.to_string(), key.clone());
                }
            }
        }

        settings
    }

    /// Load a full settings table from JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| RequestError::Internal(format!("Invalid backend settings: {}", e)))
    }

    /// Replace the connection for one ledger/service pair.
    pub fn set(&mut self, ledger: Ledger, service: Service, conn: BackendConnection) {
        let backends = self.backends.entry(ledger).or_insert_with(|| LedgerBackends {
            algod: conn.clone(),
            indexer: conn.clone(),
        });
        match service {
            Service::Algod => backends.algod = conn,
            Service::Indexer => backends.indexer = conn,
        }
    }

    pub fn resolve(&self, ledger: Ledger, service: Service) -> Option<&BackendConnection> {
        self.backends.get(&ledger).map(|b| match service {
            Service::Algod => &b.algod,
            Service::Indexer => &b.indexer,
        })
    }

    fn resolve_mut(&mut self, ledger: Ledger, service: Service) -> Option<&mut BackendConnection> {
        self.backends.get_mut(&ledger).map(|b| match service {
            Service::Algod => &mut b.algod,
            Service::Indexer => &mut b.indexer,
        })
    }
}

/// Approval prompt target view and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    pub view: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            view: AUTHORIZE_VIEW.to_string(),
            width: AUTHORIZE_WIDTH,
            height: AUTHORIZE_HEIGHT,
        }
    }
}

impl ApprovalSettings {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}

/// Configuration for the [`Gatekeeper`](crate::runtime::Gatekeeper).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub backends: BackendSettings,
    pub approval: ApprovalSettings,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            backends: BackendSettings::from_env(),
            approval: ApprovalSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolves_every_pair() {
        let settings = BackendSettings::default();
        for ledger in Ledger::ALL {
            assert!(settings.resolve(ledger, Service::Algod).is_some());
            assert!(settings.resolve(ledger, Service::Indexer).is_some());
        }
    }

    #[test]
    fn test_base_url_port() {
        let mut conn = BackendConnection::new("http://localhost");
        assert_eq!(conn.base_url(), "http://localhost");
        conn.port = "4001".into();
        assert_eq!(conn.base_url(), "http://localhost:4001");
    }

    #[test]
    fn test_from_json() {
        let raw = r#"{
            "backends": {
                "TestNet": {
                    "algod": { "url": "http://127.0.0.1", "port": "4001", "api_key": { "X-Algo-API-Token": "aaaa" } },
                    "indexer": { "url": "http://127.0.0.1", "port": "8980" }
                }
            }
        }"#;
        let settings = BackendSettings::from_json(raw).unwrap();
        let algod = settings.resolve(Ledger::TestNet, Service::Algod).unwrap();
        assert_eq!(algod.base_url(), "http://127.0.0.1:4001");
        assert_eq!(algod.api_key.get("X-Algo-API-Token").map(String::as_str), Some("aaaa"));
        assert!(settings.resolve(Ledger::MainNet, Service::Algod).is_none());
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("GATEKEEPER_MAINNET_INDEXER_URL", "http://indexer.local");
        env::set_var("GATEKEEPER_MAINNET_INDEXER_PORT", "8980");
        env::set_var(ENV_API_KEY, "env-secret");

        let settings = BackendSettings::from_env();

        env::remove_var("GATEKEEPER_MAINNET_INDEXER_URL");
        env::remove_var("GATEKEEPER_MAINNET_INDEXER_PORT");
        env::remove_var(ENV_API_KEY);

        let indexer = settings.resolve(Ledger::MainNet, Service::Indexer).unwrap();
        assert_eq!(indexer.base_url(), "http://indexer.local:8980");

        // Untouched entries keep their defaults but still carry the key
        let defaults = BackendSettings::default();
        for ledger in Ledger::ALL {
            for service in [Service::Algod, Service::Indexer] {
                let conn = settings.resolve(ledger, service).unwrap();
                assert_eq!(conn.api_key.get(API_KEY_HEADER).map(String::as_str), Some("env-secret"));
                if (ledger, service) != (Ledger::MainNet, Service::Indexer) {
                    assert_eq!(conn.url, defaults.resolve(ledger, service).unwrap().url);
                }
            }
        }
    }

    #[test]
    fn test_approval_dimensions() {
        let dims = ApprovalSettings::default().dimensions();
        assert_eq!(dims.width, 412);
        assert_eq!(dims.height, 584);
    }
}
