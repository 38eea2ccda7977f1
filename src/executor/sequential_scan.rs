use crate::{
    executor::scan::{ScanIterator, Scanner},
    storage::bplus_tree::{BPlusTree, Cursor},
    types::{Key, error::DatabaseError, row::Row},
};

/// Key range a scan is limited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanBound {
    Unbounded,
    GreaterThan(Key),
    AtLeast(Key),
    LessThan(Key),
    AtMost(Key),
}

/// Walks the leaf chain in key order, starting from the leftmost leaf or
/// from the seek position of a lower bound.
pub struct SequentialScanner<'a> {
    tree: &'a mut BPlusTree,
    bound: ScanBound,
    cursor: Option<Cursor>,
    is_exhausted: bool,
}

impl<'a> SequentialScanner<'a> {
    pub fn new(tree: &'a mut BPlusTree) -> Self {
        Self::with_bound(tree, ScanBound::Unbounded)
    }

    pub fn with_bound(tree: &'a mut BPlusTree, bound: ScanBound) -> Self {
        Self {
            tree,
            bound,
            cursor: None,
            is_exhausted: false,
        }
    }

    fn initial_cursor(&mut self) -> Result<Cursor, DatabaseError> {
        match self.bound {
            ScanBound::GreaterThan(key) | ScanBound::AtLeast(key) => self.tree.seek(key),
            _ => self.tree.start(),
        }
    }

    pub fn collect_rows(self) -> Result<Vec<Row>, DatabaseError> {
        ScanIterator::new(self).collect()
    }
}

impl Scanner for SequentialScanner<'_> {
    fn scan(&mut self) -> Result<Option<Row>, DatabaseError> {
        if self.is_exhausted {
            return Ok(None);
        }
        let mut cursor = match self.cursor {
            Some(cursor) => cursor,
            None => self.initial_cursor()?,
        };
        loop {
            if cursor.end_of_table {
                self.cursor = Some(cursor);
                self.is_exhausted = true;
                return Ok(None);
            }
            let (key, row) = self.tree.cursor_value(&cursor)?;
            self.tree.advance(&mut cursor)?;
            self.cursor = Some(cursor);
            match self.bound {
                ScanBound::GreaterThan(bound) if key <= bound => continue,
                ScanBound::LessThan(bound) if key >= bound => {
                    self.is_exhausted = true;
                    return Ok(None);
                }
                ScanBound::AtMost(bound) if key > bound => {
                    self.is_exhausted = true;
                    return Ok(None);
                }
                _ => return Ok(Some(row)),
            }
        }
    }

    fn reset(&mut self) -> Result<(), DatabaseError> {
        self.cursor = None;
        self.is_exhausted = false;
        Ok(())
    }
}
