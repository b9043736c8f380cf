use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    record::Entity,
    store::{StoreAdapter, StoreError, VersionToken, Versioned, WriteOutcome},
};

#[derive(Clone, Default, Serialize, Deserialize)]
struct Document {
    next_etag: u64,
    rows: Vec<Row>,
}

#[derive(Clone, Serialize, Deserialize)]
struct Row {
    etag: u64,
    entity: Entity,
}

struct State {
    next_etag: u64,
    rows: BTreeMap<(String, String), Row>,
}

impl State {
    fn document(&self) -> Document {
        Document {
            next_etag: self.next_etag,
            rows: self.rows.values().cloned().collect(),
        }
    }
}

fn etag(version: u64) -> VersionToken {
    VersionToken::new(format!("W/\"{version}\""))
}

/// A table persisted as a single JSON document.
///
/// Every successful write rewrites the file through a temporary sibling and
/// an atomic rename, so a crash leaves either the old or the new document
/// behind. Conditional writes are serialized by an async mutex, which makes
/// the store safe for any number of allocators **within one process**. Two
/// processes must not share the same file.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Malformed`] if it is not a valid store document.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Document>(&bytes)
                .map_err(|e| StoreError::Malformed(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => return Err(e.into()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Opened file store {} with {} rows",
            path.display(),
            document.rows.len()
        );

        let rows = document
            .rows
            .into_iter()
            .map(|row| {
                let key = (row.entity.partition_key.clone(), row.entity.row_key.clone());
                (key, row)
            })
            .collect();

        Ok(Self {
            path,
            state: Mutex::new(State {
                next_etag: document.next_etag,
                rows,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling the document is staged in before the rename: the full file
    /// name plus `.tmp`, so it never collides with the store itself.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn persist(&self, document: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Applies `entity` with a fresh ETag, persisting before the in-memory
    /// state changes so a failed write leaves both untouched.
    async fn commit(&self, state: &mut State, entity: Entity) -> Result<(), StoreError> {
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let etag = state.next_etag + 1;
        let mut document = state.document();
        document.next_etag = etag;
        match document
            .rows
            .iter_mut()
            .find(|row| row.entity.partition_key == key.0 && row.entity.row_key == key.1)
        {
            Some(row) => {
                row.etag = etag;
                row.entity = entity.clone();
            }
            None => document.rows.push(Row {
                etag,
                entity: entity.clone(),
            }),
        }

        self.persist(&document).await?;

        state.next_etag = etag;
        state.rows.insert(key, Row { etag, entity });
        Ok(())
    }
}

impl StoreAdapter for FileStore {
    async fn get(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Versioned<Entity>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .get(&(partition_key.to_owned(), row_key.to_owned()))
            .map(|row| Versioned {
                value: row.entity.clone(),
                version: etag(row.etag),
            }))
    }

    async fn insert_if_absent(&self, entity: Entity) -> Result<WriteOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        if state.rows.contains_key(&key) {
            return Ok(WriteOutcome::Conflict);
        }
        self.commit(&mut state, entity).await?;
        Ok(WriteOutcome::Success)
    }

    async fn replace_if_unchanged(
        &self,
        entity: Entity,
        version: &VersionToken,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        match state.rows.get(&key) {
            Some(row) if etag(row.etag) == *version => {}
            _ => return Ok(WriteOutcome::Conflict),
        }
        self.commit(&mut state, entity).await?;
        Ok(WriteOutcome::Success)
    }
}
