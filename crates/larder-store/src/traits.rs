//! Store trait definitions

use bitflags::bitflags;
use larder_util::ChannelKey;

use crate::{StoreError, StoreResult};

bitflags! {
    /// Optional operations a store supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StoreCapabilities: u8 {
        /// Pending writes can be committed with `flush`
        const FLUSH = 1 << 0;
        /// The handle can be released with `close`
        const CLOSE = 1 << 1;
    }
}

/// An open, persistent key-value handle
pub trait Store: Send + Sync {
    /// Which of `flush` / `close` this store implements
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::empty()
    }

    /// Switch autocommit on or off. Stores without transactions are always
    /// autocommitting and ignore this.
    fn set_autocommit(&self, _enabled: bool) -> StoreResult<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Remove a key, returning whether it existed
    fn remove(&self, key: &str) -> StoreResult<bool>;

    /// All keys, in ascending order
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Commit pending writes
    fn flush(&self) -> StoreResult<()> {
        Err(StoreError::Unsupported("flush"))
    }

    /// Release the handle. Closing twice is not an error.
    fn close(&self) -> StoreResult<()> {
        Err(StoreError::Unsupported("close"))
    }
}

/// Opens the store backing one channel
pub trait StoreFactory: Send + Sync {
    type Store: Store;

    fn make_store(&self, key: &ChannelKey) -> StoreResult<Self::Store>;
}

impl<S, F> StoreFactory for F
where
    S: Store,
    F: Fn(&ChannelKey) -> StoreResult<S> + Send + Sync,
{
    type Store = S;

    fn make_store(&self, key: &ChannelKey) -> StoreResult<S> {
        self(key)
    }
}
