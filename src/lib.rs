//! # dApp Gatekeeper
//!
//! Authorization and dispatch core of a browser wallet extension.
//!
//! Untrusted pages talk to the wallet through a small public method set.
//! An origin must pass a one-time, user-approved handshake before any other
//! public method is served; the handshake parks the request behind an
//! approval surface and resumes it when the user allows or denies.
//!
//! ## Features
//!
//! - **Partitioned dispatch**: public, approval-only and extension-only
//!   method sets, selected by transport context
//! - **Scoped unlock**: the encrypted vault is opened per signing request
//!   and its secrets are zeroized on drop
//! - **Live network parameters**: fee, validity rounds and genesis always
//!   come from the ledger node
//!
//! ## Quick Start
//!
//! In-memory collaborators live in [`testing`] (feature `testing`).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dapp_gatekeeper::testing::{sealed_vault, Harness};
//! use dapp_gatekeeper::approval::Decision;
//! use dapp_gatekeeper::{Envelope, Ledger};
//! use serde_json::json;
//!
//! # async fn demo() -> dapp_gatekeeper::Result<()> {
//! let (vault, _addresses) = sealed_vault("pw", Ledger::TestNet, &[])?;
//! let mut harness = Harness::new(Arc::new(vault))?;
//!
//! let gatekeeper = harness.gatekeeper.clone();
//! let handshake = tokio::spawn(async move {
//!     gatekeeper
//!         .dispatch(Envelope::new("https://dapp.example", "authorization", json!({})))
//!         .await
//! });
//!
//! harness.next_broadcast().await;
//! if let Some(surface) = harness.gatekeeper.pending_surface() {
//!     harness.controller().decide(Decision::Allow, surface).await?;
//! }
//! assert!(handshake.await.is_ok_and(|e| e.error.is_none()));
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod approval;
pub mod config;
pub mod error;
pub mod keys;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transaction;
pub mod transport;
pub mod types;

pub use config::EngineConfig;
pub use error::{RequestError, Result};
pub use runtime::{Collaborators, Gatekeeper, JsonRpcMethod};
pub use types::{Context, Envelope, Ledger, Origin};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber honoring `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
