use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    storage::registry::{SharedTree, lock_tree},
    types::{Key, TransactionId, error::DatabaseError, row::Row},
};

/// Hands out transaction ids, unique for the lifetime of the process.
#[derive(Debug)]
pub struct TransactionManager {
    next_id: AtomicU64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    pub fn begin(&self) -> Transaction {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(transaction_id = id, "transaction started");
        Transaction {
            id,
            started_at: Utc::now(),
            undo_log: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    Inserted { key: Key },
    Updated { previous: Row },
    Deleted { previous: Row },
}

struct UndoEntry {
    tree: SharedTree,
    action: UndoAction,
}

pub struct Transaction {
    id: TransactionId,
    started_at: DateTime<Utc>,
    undo_log: Vec<UndoEntry>,
}

impl Transaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn changes(&self) -> usize {
        self.undo_log.len()
    }

    pub fn record(&mut self, tree: &SharedTree, action: UndoAction) {
        self.undo_log.push(UndoEntry {
            tree: Arc::clone(tree),
            action,
        });
    }

    fn touched_trees(&self) -> Vec<SharedTree> {
        let mut trees: Vec<SharedTree> = Vec::new();
        for entry in &self.undo_log {
            if !trees.iter().any(|t| Arc::ptr_eq(t, &entry.tree)) {
                trees.push(Arc::clone(&entry.tree));
            }
        }
        trees
    }

    /// Writes every table the transaction touched to disk.
    pub fn commit(self) -> Result<usize, DatabaseError> {
        for tree in self.touched_trees() {
            lock_tree(&tree)?.flush()?;
        }
        debug!(transaction_id = self.id, changes = self.undo_log.len(), "transaction committed");
        Ok(self.undo_log.len())
    }

    /// Undoes the recorded changes, newest first.
    pub fn rollback(self) -> Result<usize, DatabaseError> {
        let reverted = self.undo_log.len();
        for entry in self.undo_log.into_iter().rev() {
            let mut tree = lock_tree(&entry.tree)?;
            match entry.action {
                UndoAction::Inserted { key } => match tree.delete(key) {
                    Ok(_) | Err(DatabaseError::RecordNotFound { .. }) => {}
                    Err(e) => return Err(e),
                },
                UndoAction::Updated { previous } => {
                    let key = previous.key();
                    match tree.update(key, |row| {
                        *row = previous.clone();
                        Ok(())
                    }) {
                        Ok(_) => {}
                        Err(DatabaseError::RecordNotFound { .. }) => tree.insert(&previous)?,
                        Err(e) => return Err(e),
                    }
                }
                UndoAction::Deleted { previous } => match tree.insert(&previous) {
                    Ok(()) => {}
                    Err(DatabaseError::DuplicateKey { key }) => {
                        tree.update(key, |row| {
                            *row = previous.clone();
                            Ok(())
                        })?;
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        debug!(transaction_id = self.id, reverted, "transaction rolled back");
        Ok(reverted)
    }
}
