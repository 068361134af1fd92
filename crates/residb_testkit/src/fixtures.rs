//! Test fixtures and store helpers.

use residb_codec::{PropertyKind, Value};
use residb_core::{
    Config, CoreResult, Entity, PropertyDef, Record, RecordId, Store, TypeSchema,
    UniqueConstraint,
};
use residb_storage::InMemoryBlobStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Record type name used by [`User`].
pub const USER_TYPE: &str = "User";

/// Schema for the `User` fixture: unique `username`, numeric `age`,
/// boolean `active` and a transient `session`.
pub fn user_schema() -> TypeSchema {
    TypeSchema::new(USER_TYPE)
        .property(PropertyDef::new("username", PropertyKind::Text))
        .property(PropertyDef::new("age", PropertyKind::Numeric))
        .property(PropertyDef::new("active", PropertyKind::Boolean))
        .property(PropertyDef::new("session", PropertyKind::Text).transient())
        .unique(UniqueConstraint::new("username"))
}

/// A small entity used across tests.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Identity.
    pub id: RecordId,
    /// Unique login name.
    pub username: String,
    /// Age in years.
    pub age: i64,
    /// Account flag.
    pub active: bool,
    /// Not persisted.
    pub session: Option<String>,
}

impl User {
    /// An active user without a session.
    pub fn new(username: &str, age: i64) -> Self {
        Self {
            id: RecordId::UNASSIGNED,
            username: username.to_string(),
            age,
            active: true,
            session: None,
        }
    }

    /// Sets the session token.
    #[must_use]
    pub fn with_session(mut self, token: &str) -> Self {
        self.session = Some(token.to_string());
        self
    }
}

impl Entity for User {
    fn schema() -> TypeSchema {
        user_schema()
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("username", self.username.as_str())
            .with("age", self.age)
            .with("active", self.active)
            .with("session", self.session.as_deref())
    }

    fn from_record(record: &Record) -> CoreResult<Self> {
        Ok(Self {
            id: record.id,
            username: record.field("username", |v| v.as_text().map(String::from))?,
            age: record.field("age", Value::as_integer)?,
            active: record.field("active", Value::as_bool)?,
            session: record.get("session").as_text().map(String::from),
        })
    }
}

/// Config for tests: a 10 ms debounce window.
pub fn test_config() -> Config {
    Config::new().flush_debounce(Duration::from_millis(10))
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: Store,
    /// Shared blob store for memory-backed fixtures.
    pub blobs: Option<Arc<InMemoryBlobStore>>,
    /// Kept alive so the directory outlives the store.
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// A store over an in-memory blob store.
    pub fn memory() -> Self {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store =
            Store::open(test_config(), blobs.clone()).expect("Failed to open in-memory store");
        Self {
            store,
            blobs: Some(blobs),
            temp_dir: None,
        }
    }

    /// A store without persistence.
    pub fn volatile() -> Self {
        let store = Store::open(
            test_config().persistence_enabled(false),
            Arc::new(InMemoryBlobStore::new()),
        )
        .expect("Failed to open volatile store");
        Self {
            store,
            blobs: None,
            temp_dir: None,
        }
    }

    /// A store persisted in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store =
            Store::open_dir(temp_dir.path(), test_config()).expect("Failed to open file store");
        Self {
            store,
            blobs: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Directory of a file-backed store.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the store and opens a new one over the same storage.
    ///
    /// Types must be registered again on the returned store.
    pub fn reopen(self) -> Self {
        self.store.close().expect("Failed to close store");
        let Self {
            store,
            blobs,
            temp_dir,
        } = self;
        drop(store);

        let store = match (&blobs, &temp_dir) {
            (Some(blobs), _) => Store::open(test_config(), blobs.clone()),
            (None, Some(dir)) => Store::open_dir(dir.path(), test_config()),
            (None, None) => Store::open(
                test_config().persistence_enabled(false),
                Arc::new(InMemoryBlobStore::new()),
            ),
        }
        .expect("Failed to reopen store");

        Self {
            store,
            blobs,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a store over in-memory blobs.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a store in a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("File store should have a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A volatile store holding `count` users named `user0`, `user1`, ...
    /// with ages cycling through 18..=67.
    pub fn populated_users(count: usize) -> TestStore {
        let test_store = TestStore::volatile();
        let users = test_store
            .collection::<User>()
            .expect("Failed to register User");
        let mut batch: Vec<User> = (0..count)
            .map(|i| User::new(&format!("user{i}"), 18 + (i % 50) as i64))
            .collect();
        users
            .insert_batch(&mut batch)
            .expect("Failed to insert users");
        test_store
    }
}
