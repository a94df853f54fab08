//! Core data types flowing through dispatch.
//!
//! An [`Envelope`] is created by the message transport, settled exactly once
//! (response or error, never both), and handed back to the transport.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RequestError, Result};

/// Identity string of a requesting web context.
pub type Origin = String;

/// Target blockchain network.
///
/// Names are matched case-insensitively, on the wire and in [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Ledger {
    TestNet,
    MainNet,
}

impl Ledger {
    pub const ALL: [Ledger; 2] = [Ledger::TestNet, Ledger::MainNet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ledger::TestNet => "TestNet",
            Ledger::MainNet => "MainNet",
        }
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ledger {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        Ledger::try_from(s.to_string()).map_err(RequestError::invalid_params)
    }
}

impl TryFrom<String> for Ledger {
    type Error = String;

    fn try_from(s: String) -> core::result::Result<Self, Self::Error> {
        Ledger::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(&s))
            .ok_or_else(|| format!("unknown ledger '{}'", s))
    }
}

/// Backend service on a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    /// Ledger node API.
    Algod,
    /// Indexer API.
    Indexer,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Algod => f.write_str("Algod"),
            Service::Indexer => f.write_str("Indexer"),
        }
    }
}

/// Where an inbound envelope came from. Selects the method partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// An untrusted web page.
    Page,
    /// The transient approval prompt.
    ApprovalSurface,
    /// The extension's own UI.
    Extension,
}

/// Method name and parameters of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Error payload written back to the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl From<&RequestError> for WireError {
    fn from(err: &RequestError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One request/response unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: Origin,
    pub body: RequestBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Envelope {
    pub fn new(origin: impl Into<Origin>, method: impl Into<String>, params: Value) -> Self {
        Self {
            origin: origin.into(),
            body: RequestBody {
                method: method.into(),
                params,
            },
            response: None,
            error: None,
        }
    }

    pub fn method(&self) -> &str {
        &self.body.method
    }

    pub fn params(&self) -> &Value {
        &self.body.params
    }

    /// Fill the result slot with a success payload, clearing any error.
    pub fn complete(&mut self, payload: Value) {
        self.error = None;
        self.response = Some(payload);
    }

    /// Fill the result slot with an error, clearing any response.
    pub fn fail(&mut self, err: &RequestError) {
        self.response = None;
        self.error = Some(WireError::from(err));
    }

    pub fn settle(&mut self, outcome: Result<Value>) {
        match outcome {
            Ok(payload) => self.complete(payload),
            Err(err) => self.fail(&err),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }

    /// Error code if the envelope was settled with an error.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
