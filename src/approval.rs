//! Approval surface lifecycle and user decisions.
//!
//! The surface is the transient prompt that asks the user to allow or deny
//! an origin. [`ApprovalSurface::close`] resolves only once the host reports
//! the surface fully closed, so the gatekeeper never answers an origin while
//! the prompt is still on screen.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::Result;
use crate::runtime::{Gatekeeper, JsonRpcMethod};

/// Opaque identifier of an open approval surface (e.g. a window id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

/// Surface size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Creates and destroys approval surfaces.
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    /// Open `view` as a focused popup. `None` if the host could not open it.
    async fn open(&self, view: &str, dimensions: Dimensions) -> Option<SurfaceHandle>;

    /// Close the surface, resolving once it is fully closed.
    async fn close(&self, handle: SurfaceHandle);
}

/// Command sent to the UI host that owns the windows.
#[derive(Debug)]
pub enum SurfaceCommand {
    Open {
        view: String,
        dimensions: Dimensions,
        reply: oneshot::Sender<Option<SurfaceHandle>>,
    },
    Close {
        handle: SurfaceHandle,
        closed: oneshot::Sender<()>,
    },
}

/// Channel-backed surface: forwards commands to a UI host and awaits its acks.
#[derive(Debug, Clone)]
pub struct WindowSurface {
    commands: mpsc::Sender<SurfaceCommand>,
}

impl WindowSurface {
    /// Create the surface and the receiver the UI host drains.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<SurfaceCommand>) {
        let (commands, rx) = mpsc::channel(buffer);
        (Self { commands }, rx)
    }
}

#[async_trait]
impl ApprovalSurface for WindowSurface {
    async fn open(&self, view: &str, dimensions: Dimensions) -> Option<SurfaceHandle> {
        let (reply, opened) = oneshot::channel();
        let command = SurfaceCommand::Open {
            view: view.to_string(),
            dimensions,
            reply,
        };
        if self.commands.send(command).await.is_err() {
            warn!("approval host is gone, cannot open surface");
            return None;
        }
        opened.await.ok().flatten()
    }

    async fn close(&self, handle: SurfaceHandle) {
        let (closed, done) = oneshot::channel();
        if self.commands.send(SurfaceCommand::Close { handle, closed }).await.is_err() {
            warn!(handle = handle.0, "approval host is gone, surface considered closed");
            return;
        }
        if done.await.is_err() {
            debug!(handle = handle.0, "host dropped close ack");
        }
    }
}

/// The user's answer in the approval surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Private-partition method carrying this decision.
    pub fn method(self) -> JsonRpcMethod {
        match self {
            Decision::Allow => JsonRpcMethod::AuthorizationAllow,
            Decision::Deny => JsonRpcMethod::AuthorizationDeny,
        }
    }
}

/// Relays approval-surface events into the gatekeeper's private partition.
#[derive(Clone)]
pub struct ApprovalController {
    gatekeeper: Arc<Gatekeeper>,
}

impl ApprovalController {
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }

    /// Report the user's allow/deny decision, made in `handle`.
    pub async fn decide(&self, decision: Decision, handle: SurfaceHandle) -> Result<()> {
        self.gatekeeper.dispatch_private(decision.method().as_str(), handle).await
    }

    /// Report that the user closed the surface without deciding.
    pub async fn dismissed(&self, handle: SurfaceHandle) -> Result<()> {
        self.gatekeeper.surface_dismissed(handle).await
    }
}
