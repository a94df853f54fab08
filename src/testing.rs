//! In-memory collaborators for tests, benches and local tooling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::adapters::{
    AccountRecord, ChainGateway, EncryptedVault, GatewayError, InternalMethods, SecureVault, SessionAccountStore,
    VaultError, VaultRecords,
};
use crate::approval::{ApprovalController, ApprovalSurface, Dimensions, SurfaceHandle};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::keys::SigningIdentity;
use crate::runtime::{Collaborators, Gatekeeper, JsonRpcMethod};
use crate::transaction::NetworkParams;
use crate::transport::{ChannelTransport, Outbound};
use crate::types::{Envelope, Ledger};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Seal a vault holding one account per recovery phrase on `ledger`.
///
/// Uses a single key-stretching round. Returns the vault and the account
/// addresses in phrase order.
pub fn sealed_vault(passphrase: &str, ledger: Ledger, phrases: &[&str]) -> Result<(EncryptedVault, Vec<String>)> {
    let mut accounts = Vec::with_capacity(phrases.len());
    let mut addresses = Vec::with_capacity(phrases.len());
    for (i, phrase) in phrases.iter().enumerate() {
        let address = SigningIdentity::from_mnemonic(phrase)?.address().to_string();
        accounts.push(AccountRecord {
            name: format!("account-{}", i),
            address: address.clone(),
            mnemonic: phrase.to_string(),
        });
        addresses.push(address);
    }

    let mut records = VaultRecords::new();
    records.insert(ledger, accounts);
    let sealed = EncryptedVault::seal(passphrase.as_bytes(), &records, 1).map_err(crate::error::RequestError::from)?;
    Ok((EncryptedVault::from_bytes(sealed), addresses))
}

/// Approval surface that records opens and closes.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    next: AtomicU64,
    fail_open: AtomicBool,
    opened: Mutex<Vec<(String, Dimensions, SurfaceHandle)>>,
    closed: Mutex<Vec<SurfaceHandle>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface whose `open` always fails.
    pub fn failing() -> Self {
        let surface = Self::default();
        surface.fail_open.store(true, Ordering::SeqCst);
        surface
    }

    pub fn opened(&self) -> Vec<(String, Dimensions, SurfaceHandle)> {
        locked(&self.opened).clone()
    }

    pub fn closed(&self) -> Vec<SurfaceHandle> {
        locked(&self.closed).clone()
    }
}

#[async_trait]
impl ApprovalSurface for RecordingSurface {
    async fn open(&self, view: &str, dimensions: Dimensions) -> Option<SurfaceHandle> {
        if self.fail_open.load(Ordering::SeqCst) {
            return None;
        }
        let handle = SurfaceHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        locked(&self.opened).push((view.to_string(), dimensions, handle));
        Some(handle)
    }

    async fn close(&self, handle: SurfaceHandle) {
        locked(&self.closed).push(handle);
    }
}

/// A call observed by [`StaticGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    NetworkParams(Ledger),
    Fetch { url: String, headers: HashMap<String, String> },
}

/// Gateway answering from canned parameters and per-URL responses.
#[derive(Debug, Default)]
pub struct StaticGateway {
    params: Mutex<HashMap<Ledger, NetworkParams>>,
    responses: Mutex<HashMap<String, core::result::Result<Value, GatewayError>>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl StaticGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_params(&self, ledger: Ledger, params: NetworkParams) {
        locked(&self.params).insert(ledger, params);
    }

    pub fn respond(&self, url: impl Into<String>, response: core::result::Result<Value, GatewayError>) {
        locked(&self.responses).insert(url.into(), response);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl ChainGateway for StaticGateway {
    async fn network_params(&self, ledger: Ledger) -> core::result::Result<NetworkParams, GatewayError> {
        locked(&self.calls).push(GatewayCall::NetworkParams(ledger));
        locked(&self.params)
            .get(&ledger)
            .cloned()
            .ok_or(GatewayError::Unconfigured { ledger })
    }

    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> core::result::Result<Value, GatewayError> {
        locked(&self.calls).push(GatewayCall::Fetch {
            url: url.to_string(),
            headers: headers.clone(),
        });
        locked(&self.responses).get(url).cloned().unwrap_or_else(|| {
            Err(GatewayError::Transport {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        })
    }
}

/// Vault whose unlock always fails with the given error.
#[derive(Debug)]
pub struct FailingVault(pub VaultError);

#[async_trait]
impl SecureVault for FailingVault {
    async fn unlock(&self, _passphrase: &[u8]) -> core::result::Result<crate::adapters::UnlockedVault, VaultError> {
        Err(self.0.clone())
    }
}

/// Internal methods that echo the method name and params.
#[derive(Debug, Default)]
pub struct EchoInternalMethods {
    calls: Mutex<Vec<JsonRpcMethod>>,
}

impl EchoInternalMethods {
    pub fn calls(&self) -> Vec<JsonRpcMethod> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl InternalMethods for EchoInternalMethods {
    async fn call(&self, method: JsonRpcMethod, envelope: &Envelope) -> Result<Value> {
        locked(&self.calls).push(method);
        Ok(json!({ "method": method.as_str(), "params": envelope.params() }))
    }
}

/// A gatekeeper wired to in-memory collaborators.
pub struct Harness {
    pub gatekeeper: Arc<Gatekeeper>,
    pub surface: Arc<RecordingSurface>,
    pub gateway: Arc<StaticGateway>,
    pub accounts: Arc<SessionAccountStore>,
    pub internal: Arc<EchoInternalMethods>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl Harness {
    pub fn new(vault: Arc<dyn SecureVault>) -> Result<Self> {
        Self::with_config(vault, EngineConfig::default(), RecordingSurface::new())
    }

    pub fn with_surface(vault: Arc<dyn SecureVault>, surface: RecordingSurface) -> Result<Self> {
        Self::with_config(vault, EngineConfig::default(), surface)
    }

    /// Harness running under `config` instead of the built-in defaults.
    pub fn with_config(vault: Arc<dyn SecureVault>, config: EngineConfig, surface: RecordingSurface) -> Result<Self> {
        let surface = Arc::new(surface);
        let gateway = Arc::new(StaticGateway::new());
        let accounts = Arc::new(SessionAccountStore::new());
        let internal = Arc::new(EchoInternalMethods::default());
        let (transport, outbound) = ChannelTransport::new();

        let gatekeeper = Gatekeeper::new(
            config,
            Collaborators {
                vault,
                accounts: accounts.clone(),
                gateway: gateway.clone(),
                surface: surface.clone(),
                transport: Arc::new(transport),
                internal: internal.clone(),
            },
        )?;

        Ok(Self {
            gatekeeper: Arc::new(gatekeeper),
            surface,
            gateway,
            accounts,
            internal,
            outbound,
        })
    }

    pub fn controller(&self) -> ApprovalController {
        ApprovalController::new(self.gatekeeper.clone())
    }

    /// Next outbound message, if the transport is still open.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Next broadcast envelope, skipping responses.
    pub async fn next_broadcast(&mut self) -> Option<Envelope> {
        while let Some(message) = self.outbound.recv().await {
            if let Outbound::Broadcast(envelope) = message {
                return Some(envelope);
            }
        }
        None
    }
}
