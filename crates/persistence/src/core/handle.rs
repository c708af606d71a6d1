//! Lazily created, shared store handles.
//!
//! A [`SharedStore`] creates its backend client on first use. Creation is
//! serialized so that concurrent first callers share one client; after that
//! the handle is read-only and cloned freely.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::store::RecordStore;
use crate::compiler::Dialect;
use crate::error::DalResult;

/// Creates backend clients.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// The dialect of the stores this connector creates.
    fn dialect(&self) -> Dialect;

    /// Establishes a client.
    async fn connect(&self) -> DalResult<Arc<dyn RecordStore>>;
}

/// A singleton store handle, created on first use.
#[derive(Clone)]
pub struct SharedStore {
    connector: Arc<dyn StoreConnector>,
    cell: Arc<OnceCell<Arc<dyn RecordStore>>>,
}

impl SharedStore {
    /// Creates an unconnected handle.
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Wraps an already connected store.
    pub fn connected(store: Arc<dyn RecordStore>) -> Self {
        let dialect = store.dialect();
        Self {
            connector: Arc::new(Ready {
                dialect,
                store: store.clone(),
            }),
            cell: Arc::new(OnceCell::new_with(Some(store))),
        }
    }

    /// The dialect of the underlying store.
    pub fn dialect(&self) -> Dialect {
        self.connector.dialect()
    }

    /// Returns the store, connecting on first call.
    ///
    /// A failed connection attempt leaves the handle unconnected; the next
    /// call retries.
    pub async fn get(&self) -> DalResult<Arc<dyn RecordStore>> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                tracing::debug!(dialect = %self.connector.dialect(), "Connecting record store");
                self.connector.connect().await
            })
            .await?;
        Ok(store.clone())
    }

    /// Returns `true` once a client exists.
    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }
}

impl fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStore")
            .field("dialect", &self.dialect())
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct Ready {
    dialect: Dialect,
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl StoreConnector for Ready {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> DalResult<Arc<dyn RecordStore>> {
        Ok(self.store.clone())
    }
}
