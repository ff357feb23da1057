//! Transient preview handles for images that are not yet persisted.
//!
//! A [`PreviewRegistry`] keeps the bytes behind every live [`PreviewHandle`]
//! so a caller can display an image before it has a public URL. Each handle
//! must be revoked once: after a successful upload replaces it with a URL,
//! when the user drops the pending image, or when an edit session is
//! abandoned. Revoking twice, or revoking a handle this registry never
//! issued, does nothing.
//!
//! [`PreviewGuard`] revokes on drop, so early returns, errors and
//! cancellation inside a pipeline call cannot leak a handle.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Opaque reference to a registered preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(u64);

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview:{}", self.0)
    }
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    live: Mutex<HashMap<PreviewHandle, Bytes>>,
}

/// Shared registry of live previews. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Inner>,
}

impl fmt::Debug for PreviewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> MutexGuard<'_, HashMap<PreviewHandle, Bytes>> {
        // A panic while holding the lock cannot leave the map half-written
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `payload` and return a new handle to it.
    pub fn create_preview(&self, payload: Bytes) -> PreviewHandle {
        let handle = PreviewHandle(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        trace!(%handle, bytes = payload.len(), "preview created");
        self.live().insert(handle, payload);
        handle
    }

    /// Register `payload` behind a guard that revokes it on drop.
    pub fn create_guarded(&self, payload: Bytes) -> PreviewGuard {
        PreviewGuard {
            registry: self.clone(),
            handle: Some(self.create_preview(payload)),
        }
    }

    /// Release `handle`. Returns whether anything was released.
    pub fn revoke_preview(&self, handle: PreviewHandle) -> bool {
        let removed = self.live().remove(&handle).is_some();
        if removed {
            trace!(%handle, "preview revoked");
        }
        removed
    }

    /// Bytes behind a live handle.
    pub fn get(&self, handle: PreviewHandle) -> Option<Bytes> {
        self.live().get(&handle).cloned()
    }

    pub fn is_live(&self, handle: PreviewHandle) -> bool {
        self.live().contains_key(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    /// Revoke every live handle. Returns how many were released.
    pub fn revoke_all(&self) -> usize {
        let mut live = self.live();
        let count = live.len();
        live.clear();
        if count > 0 {
            debug!(count, "revoked all previews");
        }
        count
    }
}

/// Owns one preview handle and revokes it when dropped.
#[must_use = "dropping the guard revokes the preview immediately"]
pub struct PreviewGuard {
    registry: PreviewRegistry,
    handle: Option<PreviewHandle>,
}

impl PreviewGuard {
    /// The guarded handle. `None` once released with [`into_handle`](Self::into_handle).
    pub fn handle(&self) -> Option<PreviewHandle> {
        self.handle
    }

    /// Stop guarding and hand the handle to the caller, who becomes
    /// responsible for revoking it.
    pub fn into_handle(mut self) -> Option<PreviewHandle> {
        self.handle.take()
    }

    /// Revoke now instead of at drop.
    pub fn revoke(mut self) {
        if let Some(handle) = self.handle.take() {
            self.registry.revoke_preview(handle);
        }
    }
}

impl Drop for PreviewGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.registry.revoke_preview(handle);
        }
    }
}

impl fmt::Debug for PreviewGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewGuard")
            .field("handle", &self.handle)
            .finish()
    }
}
