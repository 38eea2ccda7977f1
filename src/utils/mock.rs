use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{
    executor::{ExecutionContext, Executor},
    storage::bplus_tree::BPlusTree,
    types::{error::DatabaseError, row::Row},
};

/// A scratch data directory removed when dropped.
pub struct TempDatabase {
    dir: TempDir,
}

impl TempDatabase {
    pub fn new() -> Result<Self, DatabaseError> {
        Self::with_prefix("pagoda_test")
    }

    pub fn with_prefix(prefix: &str) -> Result<Self, DatabaseError> {
        let dir = tempfile::Builder::new().prefix(&format!("{}_", prefix)).tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{}.db", name))
    }

    pub fn open_tree(&self, name: &str) -> Result<BPlusTree, DatabaseError> {
        BPlusTree::open(self.table_path(name))
    }

    /// A context rooted at this directory, for multi-database sessions.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.dir.path())
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.context())
    }

    /// A REPL-style session over the single table file `name`.
    pub fn file_executor(&self, name: &str) -> Result<Executor, DatabaseError> {
        Executor::open_file(self.table_path(name))
    }
}

/// The row the scripted sessions use for id `i`.
pub fn sample_row(i: i32) -> Row {
    Row::new(i, format!("user{}", i), format!("person{}@example.com", i))
}
