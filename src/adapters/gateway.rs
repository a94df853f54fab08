//! Outbound chain queries.
//!
//! [`HttpGateway`] talks to ledger nodes and indexers over HTTP. Requests are
//! sent once: no retry, no timeout, no path validation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::transaction::{NetworkParams, VALIDITY_WINDOW};
use crate::types::Ledger;

/// Path of the suggested-parameters endpoint on a ledger node.
pub const TRANSACTION_PARAMS_PATH: &str = "/v2/transactions/params";

/// Errors raised by a chain gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("Malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("No backend configured for {ledger}")]
    Unconfigured { ledger: Ledger },
}

/// Outbound network calls to ledger/indexer backends.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Current fee, validity window and genesis identifiers for `ledger`.
    async fn network_params(&self, ledger: Ledger) -> Result<NetworkParams, GatewayError>;

    /// GET `url` with `headers` attached and parse the body as JSON.
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<Value, GatewayError>;
}

/// Map a suggested-parameters response onto [`NetworkParams`].
///
/// The window opens at the node's last round and stays valid for
/// [`VALIDITY_WINDOW`] rounds.
pub fn parse_network_params(url: &str, body: &Value) -> Result<NetworkParams, GatewayError> {
    let field = |name: &str| {
        body.get(name).ok_or_else(|| GatewayError::Decode {
            url: url.to_string(),
            reason: format!("missing field '{}'", name),
        })
    };
    let number = |name: &str| {
        field(name)?.as_u64().ok_or_else(|| GatewayError::Decode {
            url: url.to_string(),
            reason: format!("field '{}' is not an unsigned integer", name),
        })
    };
    let text = |name: &str| {
        field(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Decode {
                url: url.to_string(),
                reason: format!("field '{}' is not a string", name),
            })
    };

    let last_round = number("last-round")?;
    Ok(NetworkParams {
        fee: number("fee")?,
        first_round: last_round,
        last_round: last_round.saturating_add(VALIDITY_WINDOW),
        genesis_id: text("genesis-id")?,
        genesis_hash: text("genesis-hash")?,
    })
}

#[cfg(feature = "http-gateway")]
pub use http::HttpGateway;

#[cfg(feature = "http-gateway")]
mod http {
    use super::*;
    use crate::config::BackendSettings;
    use crate::types::Service;
    use tracing::debug;

    /// HTTP gateway resolving endpoints through [`BackendSettings`].
    pub struct HttpGateway {
        http_client: reqwest::Client,
        settings: BackendSettings,
    }

    impl HttpGateway {
        pub fn new(settings: BackendSettings) -> Self {
            Self {
                http_client: reqwest::Client::new(),
                settings,
            }
        }
    }

    #[async_trait]
    impl ChainGateway for HttpGateway {
        async fn network_params(&self, ledger: Ledger) -> Result<NetworkParams, GatewayError> {
            let conn = self
                .settings
                .resolve(ledger, Service::Algod)
                .ok_or(GatewayError::Unconfigured { ledger })?;
            let url = format!("{}{}", conn.base_url(), TRANSACTION_PARAMS_PATH);

            let body = self.fetch(&url, &conn.api_key).await?;
            parse_network_params(&url, &body)
        }

        async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<Value, GatewayError> {
            debug!(%url, "outbound chain query");

            let mut request = self.http_client.get(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await.map_err(|e| GatewayError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

            response.json::<Value>().await.map_err(|e| GatewayError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
        }
    }
}
