use crate::{
    connection::StoreDescriptor,
    error::Result,
    record::Entity,
    store::{MemoryStore, StoreAdapter, StoreError, VersionToken, Versioned, WriteOutcome},
};

#[cfg(feature = "file-store")]
use crate::store::FileStore;

/// A store chosen at runtime from a [`StoreDescriptor`].
pub enum ConfiguredStore {
    Memory(MemoryStore),
    #[cfg_attr(docsrs, doc(cfg(feature = "file-store")))]
    #[cfg(feature = "file-store")]
    File(FileStore),
}

impl ConfiguredStore {
    /// Opens the store a descriptor points at.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misconfigured`](crate::Error::Misconfigured) if the descriptor names a backend this
    /// build was compiled without, and [`Error::Store`](crate::Error::Store) if the backend fails
    /// to open.
    pub async fn open(descriptor: &StoreDescriptor) -> Result<Self> {
        match descriptor {
            StoreDescriptor::Memory => Ok(Self::Memory(MemoryStore::new())),
            #[cfg(feature = "file-store")]
            StoreDescriptor::File(path) => Ok(Self::File(FileStore::open(path).await?)),
            #[cfg(not(feature = "file-store"))]
            StoreDescriptor::File(path) => Err(crate::Error::Misconfigured {
                reason: format!(
                    "file store '{}' requested but the `file-store` feature is disabled",
                    path.display()
                ),
            }),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "file-store")]
            Self::File(_) => "file",
        }
    }
}

impl StoreAdapter for ConfiguredStore {
    async fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Versioned<Entity>>, StoreError> {
        match self {
            Self::Memory(store) => store.get(partition_key, row_key).await,
            #[cfg(feature = "file-store")]
            Self::File(store) => store.get(partition_key, row_key).await,
        }
    }

    async fn insert_if_absent(&self, entity: Entity) -> Result<WriteOutcome, StoreError> {
        match self {
            Self::Memory(store) => store.insert_if_absent(entity).await,
            #[cfg(feature = "file-store")]
            Self::File(store) => store.insert_if_absent(entity).await,
        }
    }

    async fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        match self {
            Self::Memory(store) => store.replace_if_unchanged(entity, version).await,
            #[cfg(feature = "file-store")]
            Self::File(store) => store.replace_if_unchanged(entity, version).await,
        }
    }
}
