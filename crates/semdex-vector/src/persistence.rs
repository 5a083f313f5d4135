//! Snapshot persistence.
//!
//! [`PersistentStore`] writes the full export of its inner store to a JSON
//! file. Every write goes through one background writer task, so at most one
//! write is in flight and the file only ever moves forward in time.
//!
//! Snapshots are serialized when the mutation finishes and stamped with a
//! sequence number. Auto-saves that pile up while a write is running are
//! coalesced: only the newest pending snapshot is kept, and the writer skips
//! any snapshot older than one it has already written.
//!
//! With `auto_save` enabled, each mutation queues a snapshot and returns
//! without waiting. Failures of those writes are logged and dropped; the
//! in-memory state stays authoritative. [`PersistentStore::save`] queues a
//! snapshot and waits for it, returning any failure. The writer task is
//! started on the first write, so building a store needs no runtime.

use async_trait::async_trait;
use semdex_core::{Error, Result, StoreConfig};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::{mpsc, oneshot};

use crate::store::DocumentStore;
use crate::types::{AddOutcome, Document, DocumentHit, Metadata, SearchOptions, StoredDocument};

/// A serialized snapshot and its position in issue order.
#[derive(Debug)]
struct Snapshot {
    seq: u64,
    json: String,
}

/// State shared between the store and its writer task.
#[derive(Debug, Default)]
struct Pending {
    next_seq: u64,
    /// Newest auto-save not yet picked up by the writer.
    auto_save: Option<Snapshot>,
    /// Successful writes, for tests.
    written: usize,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Work item for the writer task.
enum WriteRequest {
    /// Write whatever auto-save snapshot is pending.
    AutoSave,
    /// Write this snapshot and report the result.
    Save {
        snapshot: Snapshot,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Signal once every earlier request has been handled.
    Flush(oneshot::Sender<()>),
}

/// Path of the temporary file a snapshot is staged in before the rename.
fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

/// Write `json` to `path` via a sibling temp file and a rename.
async fn write_snapshot(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(e, parent))?;
    }

    let staged = staging_path(path);
    tokio::fs::write(&staged, json)
        .await
        .map_err(|e| Error::io_with_path(e, &staged))?;
    tokio::fs::rename(&staged, path)
        .await
        .map_err(|e| Error::io_with_path(e, path))?;
    Ok(())
}

/// Writer task: handles requests in arrival order, never writing a snapshot
/// older than the last one written.
async fn run_writer(
    path: PathBuf,
    pending: SharedPending,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
) {
    let mut last_written: Option<u64> = None;

    while let Some(request) = requests.recv().await {
        match request {
            WriteRequest::AutoSave => {
                let Some(snapshot) = lock(&pending).auto_save.take() else {
                    continue;
                };
                if last_written.is_some_and(|seq| seq >= snapshot.seq) {
                    continue;
                }
                match write_snapshot(&path, &snapshot.json).await {
                    Ok(()) => {
                        last_written = Some(snapshot.seq);
                        lock(&pending).written += 1;
                    }
                    Err(e) => log::warn!("Auto-save to {} failed: {e}", path.display()),
                }
            }
            WriteRequest::Save { snapshot, ack } => {
                // A newer state is already on disk.
                if last_written.is_some_and(|seq| seq >= snapshot.seq) {
                    let _ = ack.send(Ok(()));
                    continue;
                }
                let result = write_snapshot(&path, &snapshot.json)
                    .await
                    .map_err(|e| Error::persistence(e.to_string()));
                if result.is_ok() {
                    last_written = Some(snapshot.seq);
                    lock(&pending).written += 1;
                }
                let _ = ack.send(result);
            }
            WriteRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    log::debug!("Snapshot writer for {} stopped", path.display());
}

/// Handle to a running writer task.
#[derive(Debug)]
struct Writer {
    requests: mpsc::UnboundedSender<WriteRequest>,
}

impl Writer {
    fn spawn(path: PathBuf, pending: SharedPending) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::config("snapshot persistence needs a running Tokio runtime")
        })?;

        let (requests, receiver) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(path, pending, receiver));
        Ok(Self { requests })
    }

    fn send(&self, request: WriteRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| Error::persistence("snapshot writer has stopped"))
    }
}

/// Document store wrapper that snapshots its inner store to disk.
#[derive(Debug)]
pub struct PersistentStore<S, M> {
    inner: S,
    auto_save: bool,
    path: Option<PathBuf>,
    pending: SharedPending,
    writer: OnceLock<Writer>,
    _metadata: PhantomData<fn() -> M>,
}

impl<S, M> PersistentStore<S, M>
where
    M: Metadata,
    S: DocumentStore<M>,
{
    /// Wrap `inner` using the persistence settings from `config`.
    ///
    /// Fails with [`Error::Config`] when `auto_save` is set without a store
    /// path.
    pub fn new(inner: S, config: &StoreConfig) -> Result<Self> {
        let path = config.store_path().map(Path::to_path_buf);
        if path.is_none() && config.auto_save {
            return Err(Error::config("auto_save requires a store_path"));
        }

        Ok(Self {
            inner,
            auto_save: config.auto_save,
            path,
            pending: SharedPending::default(),
            writer: OnceLock::new(),
            _metadata: PhantomData,
        })
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The snapshot file, if one is configured.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn configured_path(&self) -> Result<&Path> {
        self.path()
            .ok_or_else(|| Error::config("no store_path configured"))
    }

    /// The writer task, started on first use.
    fn writer(&self) -> Result<&Writer> {
        if let Some(writer) = self.writer.get() {
            return Ok(writer);
        }
        let path = self.configured_path()?.to_path_buf();
        let spawned = Writer::spawn(path, Arc::clone(&self.pending))?;
        // A racing caller may have won; the spare writer's task exits once
        // its sender is dropped.
        Ok(self.writer.get_or_init(|| spawned))
    }

    /// Serialize the inner store, stamped after every earlier snapshot.
    fn snapshot(&self, pending: &mut Pending) -> Result<Snapshot> {
        let json = serde_json::to_string(&self.inner.export())?;
        pending.next_seq += 1;
        Ok(Snapshot {
            seq: pending.next_seq,
            json,
        })
    }

    /// Replace the pending auto-save with a fresh snapshot, if auto-save is on.
    fn schedule_save(&self) {
        if !self.auto_save {
            return;
        }

        let queued = self.writer().and_then(|writer| {
            let mut pending = lock(&self.pending);
            let snapshot = self.snapshot(&mut pending)?;
            // Only an empty slot needs a wake-up; a queued one picks up the
            // replacement.
            if pending.auto_save.replace(snapshot).is_none() {
                writer.send(WriteRequest::AutoSave)?;
            }
            Ok(())
        });
        if let Err(e) = queued {
            log::warn!("Could not queue auto-save: {e}");
        }
    }

    /// Write a snapshot now and wait for it.
    ///
    /// The write is ordered after every snapshot already queued.
    pub async fn save(&self) -> Result<()> {
        let writer = self.writer()?;
        let (ack, done) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            let snapshot = self.snapshot(&mut pending)?;
            writer.send(WriteRequest::Save { snapshot, ack })?;
        }

        done.await
            .map_err(|_| Error::persistence("snapshot writer dropped the request"))??;
        log::info!(
            "Saved {} documents to {}",
            self.inner.len(),
            self.configured_path()?.display()
        );
        Ok(())
    }

    /// Wait until every queued snapshot has been written (or failed).
    pub async fn flush(&self) -> Result<()> {
        let Some(writer) = self.writer.get() else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        writer.send(WriteRequest::Flush(tx))?;
        rx.await
            .map_err(|_| Error::persistence("snapshot writer dropped the request"))
    }

    /// Read the snapshot file and import it into the inner store.
    ///
    /// Returns how many records were loaded. A missing, unreadable or
    /// malformed file is logged and loads nothing. Loading does not trigger
    /// an auto-save.
    pub async fn load(&self) -> Result<usize> {
        let path = self.configured_path()?;

        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No snapshot at {}; starting empty", path.display());
                return Ok(0);
            }
            Err(e) => {
                log::warn!("Could not read snapshot {}: {e}", path.display());
                return Ok(0);
            }
        };

        let documents: Vec<StoredDocument<M>> = match serde_json::from_str(&json) {
            Ok(documents) => documents,
            Err(e) => {
                log::warn!("Ignoring malformed snapshot {}: {e}", path.display());
                return Ok(0);
            }
        };

        let count = documents.len();
        self.inner.import(documents);
        log::info!("Loaded {count} documents from {}", path.display());
        Ok(count)
    }

    #[cfg(test)]
    fn writes_completed(&self) -> usize {
        lock(&self.pending).written
    }
}

#[async_trait]
impl<M, S> DocumentStore<M> for PersistentStore<S, M>
where
    M: Metadata,
    S: DocumentStore<M>,
{
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
        let outcome = self.inner.add_document(document).await?;
        if outcome.is_added() {
            self.schedule_save();
        }
        Ok(outcome)
    }

    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        let outcomes = self.inner.add_documents(documents).await?;
        if outcomes.iter().any(AddOutcome::is_added) {
            self.schedule_save();
        }
        Ok(outcomes)
    }

    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>> {
        self.inner.search(query, options).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.inner.remove(id).await?;
        if removed {
            self.schedule_save();
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await?;
        self.schedule_save();
        Ok(())
    }

    fn get(&self, id: &str) -> Option<StoredDocument<M>> {
        self.inner.get(id)
    }

    fn ids(&self) -> Vec<String> {
        self.inner.ids()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn export(&self) -> Vec<StoredDocument<M>> {
        self.inner.export()
    }

    fn import(&self, documents: Vec<StoredDocument<M>>) {
        self.inner.import(documents)
    }
}

// ============================================================================
// Tests
// ============================================================================
