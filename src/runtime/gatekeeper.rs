//! The authorization and dispatch engine.
//!
//! Owns the granted-origin set and the pending-authorization slot, routes
//! each envelope through the partition its transport context selects, and
//! suspends first-contact handshakes until the user decides.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::{AccountStore, ChainGateway, InternalMethods, SecureVault};
use crate::approval::{ApprovalSurface, SurfaceHandle};
use crate::config::EngineConfig;
use crate::error::{RequestError, Result};
use crate::runtime::handlers;
use crate::runtime::methods::{JsonRpcMethod, MethodTable, Partition, PrivateHandler, PublicHandler};
use crate::runtime::pending::{AuthorizationState, PendingAuthorization};
use crate::transport::MessageTransport;
use crate::types::{Context, Envelope, Origin};

/// External collaborators, shared with the rest of the extension.
#[derive(Clone)]
pub struct Collaborators {
    pub vault: Arc<dyn SecureVault>,
    pub accounts: Arc<dyn AccountStore>,
    pub gateway: Arc<dyn ChainGateway>,
    pub surface: Arc<dyn ApprovalSurface>,
    pub transport: Arc<dyn MessageTransport>,
    pub internal: Arc<dyn InternalMethods>,
}

/// Authorization & dispatch engine. Construct once and share behind an `Arc`.
pub struct Gatekeeper {
    config: EngineConfig,
    table: MethodTable,
    state: AuthorizationState,
    vault: Arc<dyn SecureVault>,
    accounts: Arc<dyn AccountStore>,
    gateway: Arc<dyn ChainGateway>,
    surface: Arc<dyn ApprovalSurface>,
    transport: Arc<dyn MessageTransport>,
    internal: Arc<dyn InternalMethods>,
}

impl Gatekeeper {
    /// Build the engine, validating the method table.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        let table = MethodTable::build()?;
        Ok(Self {
            config,
            table,
            state: AuthorizationState::new(),
            vault: collaborators.vault,
            accounts: collaborators.accounts,
            gateway: collaborators.gateway,
            surface: collaborators.surface,
            transport: collaborators.transport,
            internal: collaborators.internal,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn methods(&self) -> &MethodTable {
        &self.table
    }

    /// Membership test against the granted-origin set.
    pub fn is_authorized(&self, origin: &str) -> bool {
        self.state.is_authorized(origin)
    }

    pub fn authorized_origins(&self) -> Vec<Origin> {
        self.state.authorized_origins()
    }

    /// Surface of the authorization currently awaiting a decision.
    pub fn pending_surface(&self) -> Option<SurfaceHandle> {
        self.state.pending_surface()
    }

    /// Origin of the authorization currently awaiting a decision.
    pub fn pending_origin(&self) -> Option<Origin> {
        self.state.pending_origin()
    }

    /// Dispatch an inbound envelope from `context` and send the settled
    /// envelope back through the transport.
    ///
    /// A first-contact handshake does not return until the user decides, so
    /// transports should run each inbound message on its own task.
    pub async fn handle(&self, context: Context, envelope: Envelope) {
        let settled = match context {
            Context::Page => self.dispatch(envelope).await,
            Context::Extension => self.dispatch_extension(envelope).await,
            Context::ApprovalSurface => {
                let mut envelope = envelope;
                let outcome = match handlers::decision_surface(envelope.params()) {
                    Ok(surface) => self
                        .dispatch_private(envelope.method(), surface)
                        .await
                        .map(|()| json!({})),
                    Err(err) => Err(err),
                };
                envelope.settle(outcome);
                envelope
            }
        };
        self.transport.send(settled).await;
    }

    /// Dispatch through the public partition and settle the envelope.
    pub async fn dispatch(&self, mut envelope: Envelope) -> Envelope {
        let outcome = self.route_public(&envelope).await;
        if let Err(err) = &outcome {
            debug!(origin = %envelope.origin, method = envelope.method(), code = err.code(), "request failed");
        }
        envelope.settle(outcome);
        envelope
    }

    async fn route_public(&self, envelope: &Envelope) -> Result<Value> {
        let (method, handler) = self.table.public(envelope.method())?;

        // Everything except the handshake needs a prior grant.
        if handler != PublicHandler::Handshake && !self.is_authorized(&envelope.origin) {
            warn!(origin = %envelope.origin, %method, "unauthorized origin");
            return Err(RequestError::NotAuthorized);
        }

        debug!(origin = %envelope.origin, %method, "dispatching");
        match handler {
            PublicHandler::Handshake => self.authorize(envelope).await,
            PublicHandler::SignTransaction => {
                handlers::sign_transaction(self.vault.as_ref(), self.gateway.as_ref(), envelope.params()).await
            }
            PublicHandler::Query(service) => {
                handlers::relay_query(
                    &self.config.backends,
                    self.gateway.as_ref(),
                    service,
                    envelope.params(),
                )
                .await
            }
            PublicHandler::Accounts => handlers::list_accounts(self.accounts.as_ref(), envelope.params()),
        }
    }

    /// Dispatch a decision made in `surface` through the private partition
    /// (approval surface only).
    ///
    /// The decision applies only to the authorization shown in `surface`;
    /// anything else is `NoPendingAuthorization`.
    pub async fn dispatch_private(&self, method: &str, surface: SurfaceHandle) -> Result<()> {
        let (method, handler) = self.table.private(method)?;
        debug!(%method, surface = surface.0, "approval decision");
        match handler {
            PrivateHandler::Allow => self.allow(surface).await,
            PrivateHandler::Deny => self.deny(surface).await,
        }
    }

    /// Dispatch through the extension partition and settle the envelope.
    pub async fn dispatch_extension(&self, mut envelope: Envelope) -> Envelope {
        let outcome = match self.table.extension(envelope.method()) {
            Ok(method) => self.internal.call(method, &envelope).await,
            Err(err) => Err(err),
        };
        envelope.settle(outcome);
        envelope
    }

    /// Handshake: succeed at once for granted origins, otherwise park the
    /// envelope behind a fresh approval surface until the user decides.
    async fn authorize(&self, envelope: &Envelope) -> Result<Value> {
        if self.is_authorized(&envelope.origin) {
            return Ok(json!({}));
        }

        let approval = &self.config.approval;
        let Some(surface) = self.surface.open(&approval.view, approval.dimensions()).await else {
            warn!(origin = %envelope.origin, "approval surface failed to open");
            return Err(RequestError::ApprovalUnavailable);
        };

        let (pending, decision) = PendingAuthorization::new(surface, envelope.clone());
        if let Some(displaced) = self.state.park(pending) {
            warn!(
                displaced = displaced.origin(),
                origin = %envelope.origin,
                "pending authorization superseded"
            );
            self.surface.close(displaced.surface()).await;
            displaced.resolve(Err(RequestError::Superseded));
        }
        info!(origin = %envelope.origin, surface = surface.0, "awaiting user approval");

        // Let the approval view learn which origin is asking.
        self.transport.broadcast(envelope.clone()).await;

        decision
            .await
            .unwrap_or_else(|_| Err(RequestError::Internal("authorization decision dropped".into())))
    }

    async fn allow(&self, surface: SurfaceHandle) -> Result<()> {
        let Some(pending) = self.state.take_pending_for(surface) else {
            warn!(surface = surface.0, "decision for a surface with nothing pending");
            return Err(RequestError::NoPendingAuthorization);
        };

        self.surface.close(pending.surface()).await;
        self.state.grant(pending.origin());
        info!(origin = pending.origin(), "origin authorized");

        if !pending.resolve(Ok(json!({}))) {
            debug!("authorized origin no longer waiting for a reply");
        }
        Ok(())
    }

    async fn deny(&self, surface: SurfaceHandle) -> Result<()> {
        let Some(pending) = self.state.take_pending_for(surface) else {
            warn!(surface = surface.0, "decision for a surface with nothing pending");
            return Err(RequestError::NoPendingAuthorization);
        };

        self.surface.close(pending.surface()).await;
        info!(origin = pending.origin(), "origin denied");

        if !pending.resolve(Err(RequestError::NotAuthorized)) {
            debug!("denied origin no longer waiting for a reply");
        }
        Ok(())
    }

    /// The user closed `handle` without deciding: treated as a deny.
    ///
    /// Stale handles (already decided or superseded) are ignored.
    pub async fn surface_dismissed(&self, handle: SurfaceHandle) -> Result<()> {
        match self.state.take_pending_for(handle) {
            Some(pending) => {
                info!(origin = pending.origin(), surface = handle.0, "approval dismissed");
                pending.resolve(Err(RequestError::NotAuthorized));
            }
            None => debug!(surface = handle.0, "dismissal for a surface with nothing pending"),
        }
        Ok(())
    }

    /// Methods reachable from `context`.
    pub fn methods_for(&self, context: Context) -> Vec<JsonRpcMethod> {
        self.table.methods(Partition::from(context))
    }
}
