//! Debounced background flushing.
//!
//! One scheduler thread owns the timers. When a type's timer expires its
//! name moves to the ready queue, where a pool of worker threads picks it
//! up and writes a fresh snapshot. All threads share one queue mutex and
//! two condition variables: `timers_changed` wakes the scheduler,
//! `work_ready` wakes the workers.
//!
//! A failed flush is logged and counted, and the type stays dirty. Nothing
//! retries it on a timer: the next change to the type, or an explicit
//! flush, schedules the next attempt.

use super::snapshot::{blob_name, encode_snapshot};
use super::state::{DirtyOutcome, PersistenceState, TypeFlushState};
use super::SnapshotSource;
use crate::config::Config;
use crate::error::CoreResult;
use crate::stats::StoreStats;
use parking_lot::{Condvar, Mutex, RwLock};
use residb_storage::BlobStore;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Queue {
    /// Type name to the instant its flush is due.
    timers: HashMap<String, Instant>,
    ready: VecDeque<String>,
    shutdown: bool,
}

struct Shared {
    source: Arc<dyn SnapshotSource>,
    blobs: Arc<dyn BlobStore>,
    stats: Arc<StoreStats>,
    debounce: Duration,
    types: RwLock<HashMap<String, Arc<TypeFlushState>>>,
    queue: Mutex<Queue>,
    timers_changed: Condvar,
    work_ready: Condvar,
}

impl Shared {
    fn state(&self, record_type: &str) -> Arc<TypeFlushState> {
        if let Some(state) = self.types.read().get(record_type) {
            return Arc::clone(state);
        }
        let mut types = self.types.write();
        Arc::clone(types.entry(record_type.to_string()).or_default())
    }

    /// Arms the type's timer so the flush starts no sooner than one
    /// debounce window after the previous one.
    fn schedule(&self, record_type: &str, state: &TypeFlushState) {
        let now = Instant::now();
        let due = state
            .last_flush()
            .map_or(now, |last| (last + self.debounce).max(now));

        let mut queue = self.queue.lock();
        if queue.shutdown {
            return;
        }
        let timer = queue.timers.entry(record_type.to_string()).or_insert(due);
        if due < *timer {
            *timer = due;
        }
        drop(queue);

        debug!(
            record_type,
            delay_ms = due.saturating_duration_since(now).as_millis() as u64,
            "flush scheduled"
        );
        self.timers_changed.notify_one();
    }

    /// Writes one snapshot. The caller holds the type's write lock.
    fn write_snapshot(&self, record_type: &str, state: &TypeFlushState) -> CoreResult<()> {
        state.begin_flush();

        let result = (|| -> CoreResult<(usize, usize)> {
            let (schema, records) = self.source.snapshot(record_type)?;
            let bytes = encode_snapshot(&schema, &records)?;
            self.blobs.write(&blob_name(record_type), &bytes)?;
            Ok((records.len(), bytes.len()))
        })();

        match result {
            Ok((records, bytes)) => {
                self.stats.record_flush();
                debug!(record_type, records, bytes, "flushed");
                if state.finish_flush(Instant::now()) {
                    self.schedule(record_type, state);
                }
                Ok(())
            }
            Err(error) => {
                self.stats.record_flush_failure();
                warn!(record_type, error = %error, "flush failed");
                if state.fail_flush(Instant::now()) {
                    self.schedule(record_type, state);
                }
                Err(error)
            }
        }
    }

    /// Flush triggered by a timer. Skips types a synchronous flush
    /// already cleaned.
    fn flush_scheduled(&self, record_type: &str) {
        let state = self.state(record_type);
        let _guard = state.write_lock.lock();
        if state.get() == PersistenceState::Clean {
            return;
        }
        // Failures are logged and counted inside.
        let _ = self.write_snapshot(record_type, &state);
    }

    fn run_scheduler(&self) {
        let mut queue = self.queue.lock();
        loop {
            if queue.shutdown {
                return;
            }

            let now = Instant::now();
            let due: Vec<String> = queue
                .timers
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(name, _)| name.clone())
                .collect();
            for name in due {
                queue.timers.remove(&name);
                queue.ready.push_back(name);
                self.work_ready.notify_one();
            }

            match queue.timers.values().min().copied() {
                Some(next) => {
                    self.timers_changed.wait_until(&mut queue, next);
                }
                None => self.timers_changed.wait(&mut queue),
            }
        }
    }

    fn run_worker(&self) {
        loop {
            let next = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(name) = queue.ready.pop_front() {
                        break Some(name);
                    }
                    if queue.shutdown {
                        break None;
                    }
                    self.work_ready.wait(&mut queue);
                }
            };
            match next {
                Some(record_type) => self.flush_scheduled(&record_type),
                None => return,
            }
        }
    }
}

/// Background snapshot writer for persistent record types.
pub struct PersistenceEngine {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    flush_on_close: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("debounce", &self.shared.debounce)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Starts the scheduler and `config.flush_workers` workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a thread cannot be spawned.
    pub fn start(
        config: &Config,
        source: Arc<dyn SnapshotSource>,
        blobs: Arc<dyn BlobStore>,
        stats: Arc<StoreStats>,
    ) -> CoreResult<Self> {
        let shared = Arc::new(Shared {
            source,
            blobs,
            stats,
            debounce: config.flush_debounce,
            types: RwLock::new(HashMap::new()),
            queue: Mutex::new(Queue::default()),
            timers_changed: Condvar::new(),
            work_ready: Condvar::new(),
        });

        let engine = Self {
            shared: Arc::clone(&shared),
            threads: Mutex::new(Vec::new()),
            flush_on_close: config.flush_on_close,
            closed: AtomicBool::new(false),
        };

        let scheduler = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("residb-flush-scheduler".to_string())
            .spawn(move || scheduler.run_scheduler());
        engine.adopt(handle)?;

        for n in 0..config.flush_workers.max(1) {
            let worker = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("residb-flush-{n}"))
                .spawn(move || worker.run_worker());
            engine.adopt(handle)?;
        }

        Ok(engine)
    }

    /// Keeps a spawned thread, or shuts down the ones already running.
    fn adopt(&self, handle: std::io::Result<JoinHandle<()>>) -> CoreResult<()> {
        match handle {
            Ok(handle) => {
                self.threads.lock().push(handle);
                Ok(())
            }
            Err(error) => {
                self.stop_threads();
                Err(error.into())
            }
        }
    }

    /// Records a committed change to `record_type`.
    pub fn mark_dirty(&self, record_type: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let state = self.shared.state(record_type);
        if state.mark_dirty() == DirtyOutcome::Schedule {
            self.shared.schedule(record_type, &state);
        }
    }

    /// Writes a snapshot of `record_type` now, on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the snapshot, encoding or storage error. The type stays
    /// dirty until a later change or flush writes it.
    pub fn flush(&self, record_type: &str) -> CoreResult<()> {
        let state = self.shared.state(record_type);
        let _guard = state.write_lock.lock();
        self.shared.write_snapshot(record_type, &state)
    }

    /// Flushes every type that is not clean.
    ///
    /// # Errors
    ///
    /// Attempts every type, then returns the first error.
    pub fn flush_all(&self) -> CoreResult<()> {
        let pending: Vec<String> = {
            let types = self.shared.types.read();
            let mut names: Vec<String> = types
                .iter()
                .filter(|(_, state)| state.get() != PersistenceState::Clean)
                .map(|(name, _)| name.clone())
                .collect();
            names.sort();
            names
        };

        let mut first_error = None;
        for name in pending {
            if let Err(error) = self.flush(&name) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Current flush state of a type.
    pub fn state(&self, record_type: &str) -> PersistenceState {
        self.shared
            .types
            .read()
            .get(record_type)
            .map_or(PersistenceState::Clean, |s| s.get())
    }

    /// Flushes pending changes (if configured) and stops the threads.
    /// Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the first flush error; the threads are stopped regardless.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = if self.flush_on_close {
            self.flush_all()
        } else {
            Ok(())
        };
        self.stop_threads();
        result
    }

    fn stop_threads(&self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.timers_changed.notify_all();
        self.shared.work_ready.notify_all();

        let handles: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("flush thread panicked");
            }
        }
    }
}

impl Drop for PersistenceEngine {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(error = %error, "flush on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::record::Record;
    use crate::schema::{PropertyDef, TypeSchema};
    use crate::types::RecordId;
    use residb_codec::PropertyKind;
    use residb_storage::{InMemoryBlobStore, StorageError, StorageResult};
    use std::sync::atomic::AtomicU64;

    /// A source serving a fixed, growable list of records.
    struct FakeSource {
        schema: Arc<TypeSchema>,
        records: Mutex<Vec<Arc<Record>>>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                schema: Arc::new(
                    TypeSchema::new("Note").property(PropertyDef::new("text", PropertyKind::Text)),
                ),
                records: Mutex::new(Vec::new()),
            }
        }

        fn push(&self, text: &str) {
            let mut records = self.records.lock();
            let id = RecordId::new(records.len() as u64 + 1);
            records.push(Arc::new(Record::new().with("text", text).with_id(id)));
        }
    }

    impl SnapshotSource for FakeSource {
        fn snapshot(&self, record_type: &str) -> CoreResult<(Arc<TypeSchema>, Vec<Arc<Record>>)> {
            if record_type != "Note" {
                return Err(CoreError::unknown_type(record_type));
            }
            Ok((Arc::clone(&self.schema), self.records.lock().clone()))
        }
    }

    /// A blob store whose writes always fail.
    #[derive(Default)]
    struct BrokenStore {
        attempts: AtomicU64,
    }

    impl BlobStore for BrokenStore {
        fn read(&self, _name: &str) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }
        fn write(&self, _name: &str, _data: &[u8]) -> StorageResult<()> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }
        fn delete(&self, _name: &str) -> StorageResult<bool> {
            Ok(false)
        }
        fn names(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn engine_with(
        config: Config,
        source: Arc<FakeSource>,
        blobs: Arc<dyn BlobStore>,
    ) -> (PersistenceEngine, Arc<StoreStats>) {
        let stats = Arc::new(StoreStats::new());
        let engine = PersistenceEngine::start(&config, source, blobs, Arc::clone(&stats)).unwrap();
        (engine, stats)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn synchronous_flush_writes_blob() {
        let source = Arc::new(FakeSource::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let (engine, stats) = engine_with(Config::default(), Arc::clone(&source), blobs.clone());

        source.push("hello");
        engine.flush("Note").unwrap();

        let blob = blobs.read("Note.json").unwrap().unwrap();
        assert!(String::from_utf8(blob).unwrap().contains("hello"));
        assert_eq!(stats.flushes(), 1);
        assert_eq!(engine.state("Note"), PersistenceState::Clean);
    }

    #[test]
    fn burst_converges_with_few_writes() {
        let source = Arc::new(FakeSource::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let config = Config::new().flush_debounce(Duration::from_millis(50));
        let (engine, _stats) = engine_with(config, Arc::clone(&source), blobs.clone());

        for n in 0..100 {
            source.push(&format!("n{n}"));
            engine.mark_dirty("Note");
        }

        assert!(wait_for(|| engine.state("Note") == PersistenceState::Clean));
        let blob = String::from_utf8(blobs.read("Note.json").unwrap().unwrap()).unwrap();
        assert!(blob.contains("n99"));
        // One leading flush plus at most one follow-up per window.
        assert!(blobs.write_count() <= 3, "wrote {} times", blobs.write_count());
    }

    #[test]
    fn close_flushes_pending_changes() {
        let source = Arc::new(FakeSource::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let config = Config::new().flush_debounce(Duration::from_secs(60));
        let (engine, _stats) = engine_with(config, Arc::clone(&source), blobs.clone());

        // The first flush runs immediately, the second waits a full window.
        source.push("first");
        engine.mark_dirty("Note");
        assert!(wait_for(|| engine.state("Note") == PersistenceState::Clean));
        source.push("second");
        engine.mark_dirty("Note");
        assert_eq!(engine.state("Note"), PersistenceState::Dirty);

        engine.close().unwrap();
        let blob = String::from_utf8(blobs.read("Note.json").unwrap().unwrap()).unwrap();
        assert!(blob.contains("second"));
        assert_eq!(engine.state("Note"), PersistenceState::Clean);

        // Closed engines ignore new changes.
        engine.mark_dirty("Note");
        assert_eq!(engine.state("Note"), PersistenceState::Clean);
        engine.close().unwrap();
    }

    #[test]
    fn failures_wait_for_the_next_change() {
        let source = Arc::new(FakeSource::new());
        let blobs = Arc::new(BrokenStore::default());
        let config = Config::new()
            .flush_debounce(Duration::from_millis(10))
            .flush_on_close(false);
        let (engine, stats) = engine_with(config, Arc::clone(&source), blobs.clone());

        source.push("x");
        assert!(engine.flush("Note").is_err());
        assert_eq!(engine.state("Note"), PersistenceState::Dirty);
        assert_eq!(stats.flush_failures(), 1);

        // Several windows pass without another attempt.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(blobs.attempts.load(Ordering::Relaxed), 1);

        source.push("y");
        engine.mark_dirty("Note");
        assert!(wait_for(|| blobs.attempts.load(Ordering::Relaxed) >= 2));
        assert!(stats.flush_failures() >= 2);
        assert_eq!(stats.flushes(), 0);
        engine.close().unwrap();
    }
}
