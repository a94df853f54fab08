//! Error types for request authorization and dispatch.
//!
//! Every failure a requesting origin can observe is a [`RequestError`]. Adapter
//! errors (vault, gateway) are carried through unchanged so the origin sees
//! the collaborator's own message.

use thiserror::Error;

use crate::adapters::gateway::GatewayError;
use crate::adapters::vault::VaultError;
use crate::types::Ledger;

/// Errors that can occur while authorizing or dispatching a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    /// The user denied the origin, or the origin has not been granted access.
    #[error("The extension user does not authorize the request.")]
    NotAuthorized,
    /// No handler is wired for this method in the selected partition.
    #[error("Method '{method}' is not supported.")]
    MethodNotFound { method: String },
    /// Request parameters could not be decoded.
    #[error("Invalid request parameters: {reason}")]
    InvalidParams { reason: String },
    /// Vault unlock failure, passed through verbatim.
    #[error(transparent)]
    Vault(#[from] VaultError),
    /// Outbound transport failure, passed through verbatim.
    #[error("{reason}")]
    Network { reason: String },
    /// The unlocked vault holds no account for the requested sender.
    #[error("No account with address {address} on {ledger}")]
    AccountNotFound { address: String, ledger: Ledger },
    /// The account's recovery phrase did not yield a usable signing key.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation { reason: String },
    /// An allow/deny decision arrived while no authorization was parked.
    #[error("No authorization request is awaiting a decision")]
    NoPendingAuthorization,
    /// The approval surface could not be opened.
    #[error("The approval prompt could not be opened.")]
    ApprovalUnavailable,
    /// A newer authorization request replaced this one before the user decided.
    #[error("The authorization request was replaced by a newer request.")]
    Superseded,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Stable wire code written into the envelope's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthorized => "NotAuthorized",
            Self::MethodNotFound { .. } => "MethodNotFound",
            Self::InvalidParams { .. } => "InvalidParams",
            Self::Vault(_) => "VaultError",
            Self::Network { .. } => "NetworkError",
            Self::AccountNotFound { .. } => "AccountNotFound",
            Self::KeyDerivation { .. } => "KeyDerivation",
            Self::NoPendingAuthorization => "NoPendingAuthorization",
            Self::ApprovalUnavailable => "ApprovalUnavailable",
            Self::Superseded => "Superseded",
            Self::Internal(_) => "InternalError",
        }
    }

    pub(crate) fn invalid_params(reason: impl core::fmt::Display) -> Self {
        Self::InvalidParams {
            reason: reason.to_string(),
        }
    }
}

impl From<GatewayError> for RequestError {
    fn from(err: GatewayError) -> Self {
        Self::Network {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for request handling.
pub type Result<T> = core::result::Result<T, RequestError>;
