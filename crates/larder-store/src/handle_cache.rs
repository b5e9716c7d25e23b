//! Per-channel cache of store handles with a single owning context.
//!
//! The owning context (normally the bot's main loop) holds an [`OwnerToken`].
//! Presenting it lets a caller reuse the cached handle for a channel; every
//! other caller gets a freshly opened handle that never enters the cache, so
//! no handle instance is ever used from two threads at once.

use larder_util::ChannelKey;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::{Store, StoreCapabilities, StoreError, StoreFactory, StoreResult};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Capability held by the context that owns a [`KeyedHandleCache`].
///
/// The token is neither `Send` nor `Sync`, so it cannot leave the thread
/// that created it.
#[derive(Debug)]
pub struct OwnerToken {
    id: u64,
    _not_send: PhantomData<*const ()>,
}

impl OwnerToken {
    pub fn new() -> Self {
        Self {
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

/// How a caller reaches the cache
#[derive(Debug, Clone, Copy)]
pub enum Access<'a> {
    /// The owning context: cached handles are shared
    Owner(&'a OwnerToken),
    /// Any other context: always a private, uncached handle
    Detached,
}

/// Maps channel keys to one lazily opened store handle each
pub struct KeyedHandleCache<F: StoreFactory> {
    factory: F,
    owner_id: u64,
    cached: Mutex<HashMap<ChannelKey, Arc<F::Store>>>,
}

impl<F: StoreFactory> KeyedHandleCache<F> {
    /// Create a cache owned by the holder of `owner`
    pub fn new(factory: F, owner: &OwnerToken) -> Self {
        Self {
            factory,
            owner_id: owner.id(),
            cached: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Get a handle for `key` with autocommit switched on.
    ///
    /// Factory failures are returned as-is; nothing is cached on failure.
    pub fn get(&self, key: &ChannelKey, access: Access<'_>) -> StoreResult<Arc<F::Store>> {
        let handle = match access {
            Access::Owner(token) if token.id() == self.owner_id => self.get_cached(key)?,
            Access::Owner(token) => {
                warn!(
                    channel = %key,
                    token = token.id(),
                    owner = self.owner_id,
                    "Foreign owner token, opening an uncached handle"
                );
                self.open_detached(key)?
            }
            Access::Detached => self.open_detached(key)?,
        };

        handle.set_autocommit(true)?;
        Ok(handle)
    }

    /// Number of cached handles
    pub fn len(&self) -> usize {
        self.cached.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush and close every cached handle, then empty the cache.
    ///
    /// Stores lacking a capability are skipped for that step. Every handle
    /// is attempted; the first real failure is returned afterwards.
    pub fn close_all(&self, owner: &OwnerToken) -> StoreResult<()> {
        if owner.id() != self.owner_id {
            warn!(
                token = owner.id(),
                owner = self.owner_id,
                "Refusing to close handle cache with a foreign owner token"
            );
            return Ok(());
        }

        let handles = {
            let mut cached = self.cached.lock().map_err(|_| StoreError::Poisoned)?;
            std::mem::take(&mut *cached)
        };

        let count = handles.len();
        let mut first_error = None;
        for (key, store) in handles {
            let caps = store.capabilities();

            if caps.contains(StoreCapabilities::FLUSH) {
                if let Err(e) = store.flush() {
                    warn!(channel = %key, error = %e, "Failed to flush store");
                    first_error.get_or_insert(e);
                }
            } else {
                debug!(channel = %key, "Store has no flush, skipping");
            }

            if caps.contains(StoreCapabilities::CLOSE) {
                if let Err(e) = store.close() {
                    warn!(channel = %key, error = %e, "Failed to close store");
                    first_error.get_or_insert(e);
                }
            } else {
                debug!(channel = %key, "Store has no close, skipping");
            }
        }

        info!(count, "Handle cache closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn get_cached(&self, key: &ChannelKey) -> StoreResult<Arc<F::Store>> {
        let mut cached = self.cached.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(store) = cached.get(key) {
            return Ok(store.clone());
        }

        let store = Arc::new(self.factory.make_store(key)?);
        debug!(channel = %key, "Store opened and cached");
        cached.insert(key.clone(), store.clone());
        Ok(store)
    }

    fn open_detached(&self, key: &ChannelKey) -> StoreResult<Arc<F::Store>> {
        let store = self.factory.make_store(key)?;
        debug!(channel = %key, "Opened uncached store");
        Ok(Arc::new(store))
    }
}
