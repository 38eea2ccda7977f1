use std::path::Path;

use crate::{
    executor::{
        predicate::ComparisonOp,
        sequential_scan::{ScanBound, SequentialScanner},
    },
    storage::pager::Pager,
    types::{
        INTERNAL_NODE_MAX_KEYS, Key, LEAF_NODE_LEFT_SPLIT_COUNT, LEAF_NODE_MAX_CELLS, PageNum,
        TABLE_MAX_PAGES,
        error::DatabaseError,
        page::{LeafCell, NodeBody, Page},
        row::Row,
    },
};

/// A position inside the leaf level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub page_num: PageNum,
    pub cell_num: usize,
    pub end_of_table: bool,
}

/// One step of a root-to-leaf descent: the internal page and the child slot taken.
#[derive(Debug, Clone, Copy)]
struct PathEntry {
    page_num: PageNum,
    child_index: usize,
}

enum Visit {
    Node { page_num: PageNum, level: usize },
    Key { key: Key, level: usize },
}

pub struct BPlusTree {
    pub pager: Pager,
    pub root_page_num: PageNum,
}

impl BPlusTree {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let mut pager = Pager::open(path)?;
        if pager.num_pages() == 0 {
            let root = pager.allocate(NodeBody::empty_leaf())?;
            pager.get_page_mut(root)?.is_root = true;
        }
        Ok(Self {
            pager,
            root_page_num: 0,
        })
    }

    pub fn flush(&mut self) -> Result<(), DatabaseError> {
        self.pager.flush_all()
    }

    fn descend(&mut self, key: Key) -> Result<(Vec<PathEntry>, PageNum), DatabaseError> {
        let mut path = Vec::new();
        let mut page_num = self.root_page_num;
        loop {
            let page = self.pager.get_page(page_num)?;
            match &page.body {
                NodeBody::Leaf { .. } => return Ok((path, page_num)),
                NodeBody::Internal { keys, children } => {
                    if children.is_empty() {
                        return Err(corrupted(page_num, "internal node has no children"));
                    }
                    let child_index = keys.partition_point(|&k| k < key);
                    let child = children[child_index];
                    path.push(PathEntry {
                        page_num,
                        child_index,
                    });
                    if path.len() > TABLE_MAX_PAGES as usize {
                        return Err(corrupted(page_num, "cycle in tree"));
                    }
                    page_num = child;
                }
            }
        }
    }

    fn leaf_position(&mut self, leaf: PageNum, key: Key) -> Result<Result<usize, usize>, DatabaseError> {
        let cells = leaf_cells(self.pager.get_page(leaf)?)?;
        Ok(cells.binary_search_by_key(&key, |cell| cell.key))
    }

    /// Cursor at `key`, or at the slot where `key` would be inserted.
    pub fn find(&mut self, key: Key) -> Result<Cursor, DatabaseError> {
        let (_, leaf) = self.descend(key)?;
        let (Ok(cell_num) | Err(cell_num)) = self.leaf_position(leaf, key)?;
        Ok(Cursor {
            page_num: leaf,
            cell_num,
            end_of_table: false,
        })
    }

    pub fn get(&mut self, key: Key) -> Result<Option<Row>, DatabaseError> {
        let (_, leaf) = self.descend(key)?;
        match self.leaf_position(leaf, key)? {
            Ok(index) => {
                let cells = leaf_cells(self.pager.get_page(leaf)?)?;
                Ok(Some(Row::deserialize(&cells[index].value)))
            }
            Err(_) => Ok(None),
        }
    }

    /// Cursor at the first row of the table.
    pub fn start(&mut self) -> Result<Cursor, DatabaseError> {
        let (_, leaf) = self.descend(0)?;
        self.settle(Cursor {
            page_num: leaf,
            cell_num: 0,
            end_of_table: false,
        })
    }

    /// Cursor at the first row whose key is `>= key`.
    pub fn seek(&mut self, key: Key) -> Result<Cursor, DatabaseError> {
        let cursor = self.find(key)?;
        self.settle(cursor)
    }

    pub fn advance(&mut self, cursor: &mut Cursor) -> Result<(), DatabaseError> {
        if cursor.end_of_table {
            return Ok(());
        }
        cursor.cell_num += 1;
        *cursor = self.settle(*cursor)?;
        Ok(())
    }

    pub fn cursor_value(&mut self, cursor: &Cursor) -> Result<(Key, Row), DatabaseError> {
        let page_num = cursor.page_num;
        let cells = leaf_cells(self.pager.get_page(page_num)?)?;
        let cell = cells
            .get(cursor.cell_num)
            .ok_or_else(|| corrupted(page_num, "cursor past end of leaf"))?;
        Ok((cell.key, Row::deserialize(&cell.value)))
    }

    // Moves a cursor that sits past the end of its leaf onto the next
    // non-empty leaf, or marks it as finished.
    fn settle(&mut self, mut cursor: Cursor) -> Result<Cursor, DatabaseError> {
        let mut hops = 0;
        loop {
            let page = self.pager.get_page(cursor.page_num)?;
            let NodeBody::Leaf { next_leaf, cells } = &page.body else {
                return Err(corrupted(cursor.page_num, "cursor on internal node"));
            };
            if cursor.cell_num < cells.len() {
                return Ok(cursor);
            }
            if *next_leaf == 0 {
                cursor.end_of_table = true;
                return Ok(cursor);
            }
            hops += 1;
            if hops > TABLE_MAX_PAGES {
                return Err(corrupted(cursor.page_num, "cycle in leaf chain"));
            }
            cursor.page_num = *next_leaf;
            cursor.cell_num = 0;
        }
    }

    pub fn insert(&mut self, row: &Row) -> Result<(), DatabaseError> {
        let value = row.serialize()?;
        let key = row.key();
        let (path, leaf) = self.descend(key)?;
        let index = match self.leaf_position(leaf, key)? {
            Ok(_) => return Err(DatabaseError::DuplicateKey { key }),
            Err(index) => index,
        };
        let cell = LeafCell { key, value };

        if self.pager.get_page(leaf)?.num_entries() < LEAF_NODE_MAX_CELLS {
            let (_, cells) = leaf_parts_mut(self.pager.get_page_mut(leaf)?)?;
            cells.insert(index, cell);
            return Ok(());
        }

        let needed = self.pages_needed_for_split(&path)?;
        if self.pager.num_pages() as usize + needed > TABLE_MAX_PAGES as usize {
            return Err(DatabaseError::TableFull);
        }
        self.split_leaf_and_insert(path, leaf, index, cell)
    }

    // Pages a split starting at a full leaf will allocate. Splitting the
    // root costs one extra page because the old root moves out of page 0.
    fn pages_needed_for_split(&mut self, path: &[PathEntry]) -> Result<usize, DatabaseError> {
        if path.is_empty() {
            return Ok(2);
        }
        let mut needed = 1;
        for entry in path.iter().rev() {
            if self.pager.get_page(entry.page_num)?.num_entries() < INTERNAL_NODE_MAX_KEYS {
                return Ok(needed);
            }
            needed += 1;
        }
        Ok(needed + 1)
    }

    fn split_leaf_and_insert(
        &mut self,
        path: Vec<PathEntry>,
        leaf: PageNum,
        index: usize,
        cell: LeafCell,
    ) -> Result<(), DatabaseError> {
        let right = self.pager.allocate(NodeBody::empty_leaf())?;

        let (parent, next_leaf, mut cells) = {
            let page = self.pager.get_page_mut(leaf)?;
            let parent = page.parent;
            let (next_leaf, cells) = leaf_parts_mut(page)?;
            let old_next = *next_leaf;
            *next_leaf = right;
            (parent, old_next, std::mem::take(cells))
        };
        cells.insert(index, cell);
        let right_cells = cells.split_off(LEAF_NODE_LEFT_SPLIT_COUNT);
        let separator = cells
            .last()
            .map(|c| c.key)
            .ok_or_else(|| corrupted(leaf, "empty left half after split"))?;

        {
            let (_, left_cells) = leaf_parts_mut(self.pager.get_page_mut(leaf)?)?;
            *left_cells = cells;
        }
        {
            let page = self.pager.get_page_mut(right)?;
            page.parent = parent;
            page.body = NodeBody::Leaf {
                next_leaf,
                cells: right_cells,
            };
        }

        if path.is_empty() {
            self.split_root(separator, right)
        } else {
            self.insert_into_parent(path, separator, right)
        }
    }

    fn insert_into_parent(
        &mut self,
        mut path: Vec<PathEntry>,
        mut separator: Key,
        mut right: PageNum,
    ) -> Result<(), DatabaseError> {
        while let Some(PathEntry {
            page_num,
            child_index,
        }) = path.pop()
        {
            let overflow = {
                let (keys, children) = internal_parts_mut(self.pager.get_page_mut(page_num)?)?;
                keys.insert(child_index, separator);
                children.insert(child_index + 1, right);
                keys.len() > INTERNAL_NODE_MAX_KEYS
            };
            self.set_parent(right, page_num)?;
            if !overflow {
                return Ok(());
            }

            let sibling = self.pager.allocate(NodeBody::Internal {
                keys: Vec::new(),
                children: Vec::new(),
            })?;
            let (grandparent, promoted, right_keys, right_children) = {
                let page = self.pager.get_page_mut(page_num)?;
                let grandparent = page.parent;
                let (keys, children) = internal_parts_mut(page)?;
                let mid = keys.len() / 2;
                let right_keys = keys.split_off(mid + 1);
                let promoted = keys
                    .pop()
                    .ok_or_else(|| corrupted(page_num, "internal split without middle key"))?;
                let right_children = children.split_off(mid + 1);
                (grandparent, promoted, right_keys, right_children)
            };
            {
                let page = self.pager.get_page_mut(sibling)?;
                page.parent = grandparent;
                page.body = NodeBody::Internal {
                    keys: right_keys,
                    children: right_children.clone(),
                };
            }
            for child in right_children {
                self.set_parent(child, sibling)?;
            }

            if page_num == self.root_page_num {
                return self.split_root(promoted, sibling);
            }
            separator = promoted;
            right = sibling;
        }
        Ok(())
    }

    // The root never leaves page 0: its contents move to a fresh left page
    // and page 0 becomes an internal node over `left` and `right`.
    fn split_root(&mut self, separator: Key, right: PageNum) -> Result<(), DatabaseError> {
        let root = self.root_page_num;
        let left = self.pager.allocate(NodeBody::empty_leaf())?;
        let old_body = {
            let page = self.pager.get_page_mut(root)?;
            page.is_root = true;
            std::mem::replace(
                &mut page.body,
                NodeBody::Internal {
                    keys: vec![separator],
                    children: vec![left, right],
                },
            )
        };
        let moved_children = match &old_body {
            NodeBody::Internal { children, .. } => children.clone(),
            NodeBody::Leaf { .. } => Vec::new(),
        };
        {
            let page = self.pager.get_page_mut(left)?;
            page.is_root = false;
            page.parent = root;
            page.body = old_body;
        }
        for child in moved_children {
            self.set_parent(child, left)?;
        }
        self.set_parent(right, root)
    }

    fn set_parent(&mut self, page_num: PageNum, parent: PageNum) -> Result<(), DatabaseError> {
        self.pager.get_page_mut(page_num)?.parent = parent;
        Ok(())
    }

    /// Rewrites the row stored under `key` and returns the previous row.
    pub fn update<F>(&mut self, key: Key, mutator: F) -> Result<Row, DatabaseError>
    where
        F: FnOnce(&mut Row) -> Result<(), DatabaseError>,
    {
        let (_, leaf) = self.descend(key)?;
        let index = self
            .leaf_position(leaf, key)?
            .map_err(|_| DatabaseError::RecordNotFound { key })?;
        let previous = Row::deserialize(&leaf_cells(self.pager.get_page(leaf)?)?[index].value);

        let mut row = previous.clone();
        mutator(&mut row)?;
        if row.id != previous.id {
            return Err(DatabaseError::validation("Cannot change the key of a row."));
        }
        let value = row.serialize()?;

        let (_, cells) = leaf_parts_mut(self.pager.get_page_mut(leaf)?)?;
        cells[index].value = value;
        Ok(previous)
    }

    /// Removes `key` and returns the row it held. Leaves are never merged.
    pub fn delete(&mut self, key: Key) -> Result<Row, DatabaseError> {
        let (_, leaf) = self.descend(key)?;
        let index = self
            .leaf_position(leaf, key)?
            .map_err(|_| DatabaseError::RecordNotFound { key })?;
        let (_, cells) = leaf_parts_mut(self.pager.get_page_mut(leaf)?)?;
        let cell = cells.remove(index);
        Ok(Row::deserialize(&cell.value))
    }

    pub fn scan(&mut self) -> Result<Vec<Row>, DatabaseError> {
        SequentialScanner::new(self).collect_rows()
    }

    pub fn scan_from(&mut self, key: Key, op: ComparisonOp) -> Result<Vec<Row>, DatabaseError> {
        let bound = match op {
            ComparisonOp::Equal => return Ok(self.get(key)?.into_iter().collect()),
            ComparisonOp::GreaterThan => ScanBound::GreaterThan(key),
            ComparisonOp::GreaterThanOrEqual => ScanBound::AtLeast(key),
            ComparisonOp::LessThan => ScanBound::LessThan(key),
            ComparisonOp::LessThanOrEqual => ScanBound::AtMost(key),
        };
        SequentialScanner::with_bound(self, bound).collect_rows()
    }

    pub fn print_tree(&mut self) -> Result<String, DatabaseError> {
        let mut out = String::new();
        let mut stack = vec![Visit::Node {
            page_num: self.root_page_num,
            level: 0,
        }];
        let mut visited: u32 = 0;

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Key { key, level } => {
                    out.push_str(&format!("{}- key {}\n", indent(level), key));
                }
                Visit::Node { page_num, level } => {
                    visited += 1;
                    if visited > self.pager.num_pages() {
                        return Err(corrupted(page_num, "cycle in tree"));
                    }
                    match &self.pager.get_page(page_num)?.body {
                        NodeBody::Leaf { cells, .. } => {
                            out.push_str(&format!("{}- leaf (size {})\n", indent(level), cells.len()));
                            for cell in cells {
                                out.push_str(&format!("{}- {}\n", indent(level + 1), cell.key));
                            }
                        }
                        NodeBody::Internal { keys, children } => {
                            out.push_str(&format!(
                                "{}- internal (size {})\n",
                                indent(level),
                                keys.len()
                            ));
                            if let Some(&right_child) = children.last() {
                                stack.push(Visit::Node {
                                    page_num: right_child,
                                    level: level + 1,
                                });
                            }
                            for (i, &key) in keys.iter().enumerate().rev() {
                                stack.push(Visit::Key {
                                    key,
                                    level: level + 1,
                                });
                                stack.push(Visit::Node {
                                    page_num: children[i],
                                    level: level + 1,
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

fn indent(level: usize) -> String {
    "  ".repeat(level)
}

fn corrupted(page_num: PageNum, reason: &str) -> DatabaseError {
    DatabaseError::CorruptedPage {
        page_num,
        reason: reason.to_string(),
    }
}

fn leaf_cells(page: &Page) -> Result<&[LeafCell], DatabaseError> {
    match &page.body {
        NodeBody::Leaf { cells, .. } => Ok(cells),
        NodeBody::Internal { .. } => Err(corrupted(page.page_num, "expected a leaf node")),
    }
}

fn leaf_parts_mut(page: &mut Page) -> Result<(&mut PageNum, &mut Vec<LeafCell>), DatabaseError> {
    let page_num = page.page_num;
    match &mut page.body {
        NodeBody::Leaf { next_leaf, cells } => Ok((next_leaf, cells)),
        NodeBody::Internal { .. } => Err(corrupted(page_num, "expected a leaf node")),
    }
}

fn internal_parts_mut(page: &mut Page) -> Result<(&mut Vec<Key>, &mut Vec<PageNum>), DatabaseError> {
    let page_num = page.page_num;
    match &mut page.body {
        NodeBody::Internal { keys, children } => Ok((keys, children)),
        NodeBody::Leaf { .. } => Err(corrupted(page_num, "expected an internal node")),
    }
}
