//! Listener registry with snapshot fan-out

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::{CameraError, Result};

/// Id handed out by [`CallbackRegistry::add`]
pub type ListenerId = u32;

/// Registered listener. User context travels inside the callback.
pub struct Listener<F: ?Sized> {
    pub id: ListenerId,
    pub callback: Arc<F>,
}

impl<F: ?Sized> Clone for Listener<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Ordered set of listeners.
///
/// Readers take a lock-free snapshot; writers swap in a new list, so a
/// dispatch that already holds a snapshot never observes a later add or
/// remove.
pub struct CallbackRegistry<F: ?Sized> {
    listeners: ArcSwap<Vec<Listener<F>>>,
    write: Mutex<()>,
    next_id: AtomicU32,
}

impl<F: ?Sized> CallbackRegistry<F> {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            write: Mutex::new(()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Registers `callback` and returns its id. Ids are never reused.
    pub fn add(&self, callback: Arc<F>) -> Result<ListenerId> {
        let _guard = self.write.lock()?;
        // the counter saturates instead of wrapping, so ids stay unique
        let id = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map_err(|_| CameraError::OutOfMemory)?;

        let current = self.listeners.load();
        let mut next = Vec::new();
        next.try_reserve_exact(current.len() + 1)?;
        next.extend(current.iter().cloned());
        next.push(Listener { id, callback });
        self.listeners.store(Arc::new(next));

        debug!(id, "listener added");
        Ok(id)
    }

    pub fn remove(&self, id: ListenerId) -> Result<()> {
        let _guard = self.write.lock()?;
        let current = self.listeners.load();
        let pos = current
            .iter()
            .position(|l| l.id == id)
            .ok_or(CameraError::InvalidParameter)?;

        let mut next = Vec::new();
        next.try_reserve_exact(current.len() - 1)?;
        next.extend(current[..pos].iter().cloned());
        next.extend(current[pos + 1..].iter().cloned());
        self.listeners.store(Arc::new(next));

        debug!(id, "listener removed");
        Ok(())
    }

    pub fn clear(&self) {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        self.listeners.store(Arc::new(Vec::new()));
    }

    /// Stable view of the listeners in registration order.
    pub fn snapshot(&self) -> Arc<Vec<Listener<F>>> {
        self.listeners.load_full()
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized> Default for CallbackRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}
