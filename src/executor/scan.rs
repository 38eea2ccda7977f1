use crate::types::{error::DatabaseError, row::Row};

/// A resumable, key-ordered source of rows.
pub trait Scanner {
    /// Next row, or `None` once the scan is finished.
    fn scan(&mut self) -> Result<Option<Row>, DatabaseError>;

    /// Rewinds to the first row of the scan.
    fn reset(&mut self) -> Result<(), DatabaseError>;

    /// Up to `batch_size` rows. An empty batch means the scan is finished.
    fn scan_batch(&mut self, batch_size: usize) -> Result<Vec<Row>, DatabaseError> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.scan()? {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Adapts a scanner to `Iterator`. Iteration stops after the first error.
pub struct ScanIterator<S: Scanner> {
    scanner: S,
    failed: bool,
}

impl<S: Scanner> ScanIterator<S> {
    pub fn new(scanner: S) -> Self {
        Self { scanner, failed: false }
    }
}

impl<S: Scanner> Iterator for ScanIterator<S> {
    type Item = Result<Row, DatabaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.scanner.scan().transpose();
        self.failed = matches!(item, Some(Err(_)));
        item
    }
}
