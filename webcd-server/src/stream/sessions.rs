//! Single active stream session per device
//!
//! Every pipeline launch (HTTP stream or controlled playback) registers a session
//! for its device. Registering a new one cancels whatever was running there
//! before, so two readers never contend for the same drive. A launch first takes
//! a [`PendingSession`] and only activates it once its stages are running; a
//! launch that fails leaves the current session alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

type SessionMap = HashMap<String, (Uuid, CancellationToken)>;

/// Device → cancellation token of the most recently started session
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve a session on a device without touching the current one
    pub fn prepare(&self, device: &str) -> PendingSession {
        PendingSession {
            id: Uuid::new_v4(),
            device: device.to_string(),
            token: CancellationToken::new(),
            registry: self.clone(),
        }
    }

    /// Start a session on a device, cancelling the previous one
    pub fn begin(&self, device: &str) -> SessionHandle {
        self.prepare(device).activate()
    }

    /// Cancel the session on a device; returns whether one was active
    pub fn cancel_device(&self, device: &str) -> bool {
        match self.lock().remove(device) {
            Some((id, token)) => {
                info!(device = %device, session = %id, "Cancelling stream session");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (device, (id, token)) in self.lock().drain() {
            debug!(device = %device, session = %id, "Cancelling stream session");
            token.cancel();
        }
    }

    pub fn is_active(&self, device: &str) -> bool {
        self.lock().contains_key(device)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn finish(&self, device: &str, id: Uuid) {
        let mut sessions = self.lock();
        if sessions.get(device).is_some_and(|(current, _)| *current == id) {
            sessions.remove(device);
        }
    }
}

/// A session that has not yet displaced the device's current one
pub struct PendingSession {
    id: Uuid,
    device: String,
    token: CancellationToken,
    registry: SessionRegistry,
}

impl PendingSession {
    /// Token the launched stages watch
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register as the device's session, preempting the previous one
    pub fn activate(self) -> SessionHandle {
        let previous = self
            .registry
            .lock()
            .insert(self.device.clone(), (self.id, self.token.clone()));
        if let Some((old_id, old_token)) = previous {
            info!(device = %self.device, session = %old_id, "Preempting active stream session");
            old_token.cancel();
        }

        debug!(device = %self.device, session = %self.id, "Stream session started");
        SessionHandle {
            id: self.id,
            device: self.device,
            token: self.token,
            registry: self.registry,
        }
    }
}

/// Membership in the registry; dropping it ends the session
pub struct SessionHandle {
    id: Uuid,
    device: String,
    token: CancellationToken,
    registry: SessionRegistry,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.registry.finish(&self.device, self.id);
        debug!(device = %self.device, session = %self.id, "Stream session ended");
    }
}
