use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::debug;

use crate::{
    storage::{bplus_tree::BPlusTree, database::Database},
    types::error::DatabaseError,
};

/// A tree shared between sessions. The mutex is the writer lock of its file.
pub type SharedTree = Arc<Mutex<BPlusTree>>;

pub fn lock_tree(tree: &SharedTree) -> Result<MutexGuard<'_, BPlusTree>, DatabaseError> {
    tree.lock().map_err(|_| DatabaseError::ConcurrencyError)
}

/// A database catalog shared between sessions. DDL runs under this lock so
/// every session reads and rewrites the same copy.
pub type SharedDatabase = Arc<Mutex<Database>>;

pub fn lock_database(database: &SharedDatabase) -> Result<MutexGuard<'_, Database>, DatabaseError> {
    database.lock().map_err(|_| DatabaseError::ConcurrencyError)
}

/// Keeps exactly one open tree per table file for the whole process.
#[derive(Default)]
pub struct TableRegistry {
    tables: Mutex<HashMap<PathBuf, SharedTree>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<SharedTree, DatabaseError> {
        let path = path.as_ref();
        let mut tables = self.tables.lock().map_err(|_| DatabaseError::ConcurrencyError)?;
        if let Some(tree) = tables.get(path) {
            return Ok(Arc::clone(tree));
        }
        let tree = Arc::new(Mutex::new(BPlusTree::open(path)?));
        debug!(path = %path.display(), "registered table file");
        tables.insert(path.to_path_buf(), Arc::clone(&tree));
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush_all(&self) -> Result<(), DatabaseError> {
        let tables = self.tables.lock().map_err(|_| DatabaseError::ConcurrencyError)?;
        for tree in tables.values() {
            lock_tree(tree)?.flush()?;
        }
        Ok(())
    }
}

/// Keeps exactly one loaded catalog per database directory.
#[derive(Default)]
pub struct DatabaseRegistry {
    databases: Mutex<HashMap<PathBuf, SharedDatabase>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create<P: AsRef<Path>>(&self, data_dir: P, name: &str) -> Result<SharedDatabase, DatabaseError> {
        let mut databases = self.databases.lock().map_err(|_| DatabaseError::ConcurrencyError)?;
        let database = Database::create(data_dir.as_ref(), name)?;
        let shared = Arc::new(Mutex::new(database));
        databases.insert(data_dir.as_ref().join(name), Arc::clone(&shared));
        Ok(shared)
    }

    pub fn open<P: AsRef<Path>>(&self, data_dir: P, name: &str) -> Result<SharedDatabase, DatabaseError> {
        let key = data_dir.as_ref().join(name);
        let mut databases = self.databases.lock().map_err(|_| DatabaseError::ConcurrencyError)?;
        if let Some(database) = databases.get(&key) {
            return Ok(Arc::clone(database));
        }
        let shared = Arc::new(Mutex::new(Database::open(data_dir.as_ref(), name)?));
        debug!(database = name, "loaded catalog");
        databases.insert(key, Arc::clone(&shared));
        Ok(shared)
    }
}
