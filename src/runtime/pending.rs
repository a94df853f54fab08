//! Authorization state: granted origins and the single pending request.
//!
//! Locks are held only for the map/slot operation itself, never across an
//! await, so a decision can never observe a half-updated slot.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::approval::SurfaceHandle;
use crate::error::Result;
use crate::types::{Envelope, Origin};

/// A parked envelope waiting for the user's decision.
#[derive(Debug)]
pub struct PendingAuthorization {
    surface: SurfaceHandle,
    envelope: Envelope,
    resolver: oneshot::Sender<Result<Value>>,
}

impl PendingAuthorization {
    /// Park `envelope` behind `surface`. The receiver yields the outcome.
    pub fn new(surface: SurfaceHandle, envelope: Envelope) -> (Self, oneshot::Receiver<Result<Value>>) {
        let (resolver, outcome) = oneshot::channel();
        (
            Self {
                surface,
                envelope,
                resolver,
            },
            outcome,
        )
    }

    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn origin(&self) -> &str {
        &self.envelope.origin
    }

    /// Complete the parked request. Returns `false` if its caller went away.
    pub fn resolve(self, outcome: Result<Value>) -> bool {
        self.resolver.send(outcome).is_ok()
    }
}

/// Granted origins (append-only) plus the single pending-authorization slot.
#[derive(Debug, Default)]
pub struct AuthorizationState {
    authorized: RwLock<HashSet<Origin>>,
    pending: Mutex<Option<PendingAuthorization>>,
}

impl AuthorizationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authorized(&self, origin: &str) -> bool {
        self.authorized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(origin)
    }

    /// Add `origin` to the granted set. Returns `false` if already present.
    pub fn grant(&self, origin: &str) -> bool {
        self.authorized
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.to_string())
    }

    pub fn authorized_origins(&self) -> Vec<Origin> {
        let mut origins: Vec<Origin> = self
            .authorized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        origins.sort();
        origins
    }

    /// Store `pending`, returning any record it displaced (last write wins).
    pub fn park(&self, pending: PendingAuthorization) -> Option<PendingAuthorization> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pending)
    }

    /// Clear the slot only if it belongs to `surface`.
    pub fn take_pending_for(&self, surface: SurfaceHandle) -> Option<PendingAuthorization> {
        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(PendingAuthorization::surface) == Some(surface) {
            slot.take()
        } else {
            None
        }
    }

    pub fn pending_surface(&self) -> Option<SurfaceHandle> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(PendingAuthorization::surface)
    }

    pub fn pending_origin(&self) -> Option<Origin> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|p| p.origin().to_string())
    }
}
