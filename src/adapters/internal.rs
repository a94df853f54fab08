//! Extension-internal account and session operations.
//!
//! The gatekeeper only routes these by method name; their behavior lives
//! entirely behind [`InternalMethods`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::runtime::JsonRpcMethod;
use crate::types::Envelope;

/// Handler for methods in the extension partition.
#[async_trait]
pub trait InternalMethods: Send + Sync {
    /// Run `method` for `envelope` and return its response payload.
    async fn call(&self, method: JsonRpcMethod, envelope: &Envelope) -> Result<Value>;
}
