use crate::types::{
    INTERNAL_NODE_CELL_SIZE, INTERNAL_NODE_HEADER_SIZE,
    INTERNAL_NODE_MAX_KEYS, INTERNAL_NODE_NUM_KEYS_OFFSET, INTERNAL_NODE_RIGHT_CHILD_OFFSET,
    INVALID_PAGE_NUM, IS_ROOT_OFFSET, Key, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE,
    LEAF_NODE_KEY_SIZE, LEAF_NODE_MAX_CELLS, LEAF_NODE_NEXT_LEAF_OFFSET,
    LEAF_NODE_NUM_CELLS_OFFSET, NODE_TYPE_OFFSET, PAGE_SIZE, PARENT_POINTER_OFFSET, PageNum,
    ROW_SIZE,
    error::DatabaseError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NodeType::Internal),
            1 => Some(NodeType::Leaf),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            NodeType::Internal => 0,
            NodeType::Leaf => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafCell {
    pub key: Key,
    pub value: [u8; ROW_SIZE],
}

/// Node contents. Internal nodes keep `children.len() == keys.len() + 1`
/// whenever they hold anything; the last child is the on-disk right child.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Leaf {
        next_leaf: PageNum,
        cells: Vec<LeafCell>,
    },
    Internal {
        keys: Vec<Key>,
        children: Vec<PageNum>,
    },
}

impl NodeBody {
    pub fn empty_leaf() -> Self {
        NodeBody::Leaf {
            next_leaf: 0,
            cells: Vec::new(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeBody::Leaf { .. } => NodeType::Leaf,
            NodeBody::Internal { .. } => NodeType::Internal,
        }
    }
}

/*
 * Node Layout on Disk (4096 bytes)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │ COMMON HEADER (6): node_type(1) | is_root(1) | parent(4)        │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ LEAF:     num_cells(4) | next_leaf(4)                           │
 * │           [key(4) | row(293)] x num_cells                       │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ INTERNAL: num_keys(4) | right_child(4)                          │
 * │           [child(4) | key(4)] x num_keys                        │
 * └─────────────────────────────────────────────────────────────────┘
 * All integers are little endian.
 */

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub page_num: PageNum,
    pub is_root: bool,
    pub parent: PageNum,
    pub body: NodeBody,
    pub is_dirty: bool,
}

impl Page {
    pub fn new(page_num: PageNum, body: NodeBody) -> Self {
        Self {
            page_num,
            is_root: false,
            parent: 0,
            body,
            is_dirty: true,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.body.node_type()
    }

    pub fn num_entries(&self) -> usize {
        match &self.body {
            NodeBody::Leaf { cells, .. } => cells.len(),
            NodeBody::Internal { keys, .. } => keys.len(),
        }
    }

    /// Largest key stored directly in this node.
    pub fn max_key(&self) -> Option<Key> {
        match &self.body {
            NodeBody::Leaf { cells, .. } => cells.last().map(|c| c.key),
            NodeBody::Internal { keys, .. } => keys.last().copied(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DatabaseError> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        buffer[NODE_TYPE_OFFSET] = self.node_type().as_u8();
        buffer[IS_ROOT_OFFSET] = self.is_root as u8;
        write_u32(&mut buffer, PARENT_POINTER_OFFSET, self.parent);

        match &self.body {
            NodeBody::Leaf { next_leaf, cells } => {
                if cells.len() > LEAF_NODE_MAX_CELLS {
                    return Err(self.corrupted(format!("leaf holds {} cells", cells.len())));
                }
                write_u32(&mut buffer, LEAF_NODE_NUM_CELLS_OFFSET, cells.len() as u32);
                write_u32(&mut buffer, LEAF_NODE_NEXT_LEAF_OFFSET, *next_leaf);
                for (i, cell) in cells.iter().enumerate() {
                    let offset = LEAF_NODE_HEADER_SIZE + i * LEAF_NODE_CELL_SIZE;
                    write_u32(&mut buffer, offset, cell.key);
                    let value_offset = offset + LEAF_NODE_KEY_SIZE;
                    buffer[value_offset..value_offset + ROW_SIZE].copy_from_slice(&cell.value);
                }
            }
            NodeBody::Internal { keys, children } => {
                if keys.len() > INTERNAL_NODE_MAX_KEYS {
                    return Err(self.corrupted(format!("internal node holds {} keys", keys.len())));
                }
                let right_child = match children.last() {
                    Some(&child) if children.len() == keys.len() + 1 => child,
                    None if keys.is_empty() => INVALID_PAGE_NUM,
                    _ => {
                        return Err(self.corrupted(format!(
                            "{} keys with {} children",
                            keys.len(),
                            children.len()
                        )));
                    }
                };
                write_u32(&mut buffer, INTERNAL_NODE_NUM_KEYS_OFFSET, keys.len() as u32);
                write_u32(&mut buffer, INTERNAL_NODE_RIGHT_CHILD_OFFSET, right_child);
                for (i, key) in keys.iter().enumerate() {
                    let offset = INTERNAL_NODE_HEADER_SIZE + i * INTERNAL_NODE_CELL_SIZE;
                    write_u32(&mut buffer, offset, children[i]);
                    write_u32(&mut buffer, offset + 4, *key);
                }
            }
        }
        Ok(buffer)
    }

    pub fn from_bytes(page_num: PageNum, bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() != PAGE_SIZE {
            return Err(DatabaseError::CorruptedPage {
                page_num,
                reason: format!("expected {} bytes, got {}", PAGE_SIZE, bytes.len()),
            });
        }
        let corrupted = |reason: String| DatabaseError::CorruptedPage { page_num, reason };

        let node_type = NodeType::from_u8(bytes[NODE_TYPE_OFFSET])
            .ok_or_else(|| corrupted(format!("invalid node type {}", bytes[NODE_TYPE_OFFSET])))?;
        let is_root = bytes[IS_ROOT_OFFSET] != 0;
        let parent = read_u32(bytes, PARENT_POINTER_OFFSET);

        let body = match node_type {
            NodeType::Leaf => {
                let num_cells = read_u32(bytes, LEAF_NODE_NUM_CELLS_OFFSET) as usize;
                if num_cells > LEAF_NODE_MAX_CELLS {
                    return Err(corrupted(format!("leaf claims {} cells", num_cells)));
                }
                let next_leaf = read_u32(bytes, LEAF_NODE_NEXT_LEAF_OFFSET);
                let mut cells = Vec::with_capacity(num_cells);
                for i in 0..num_cells {
                    let offset = LEAF_NODE_HEADER_SIZE + i * LEAF_NODE_CELL_SIZE;
                    let value_offset = offset + LEAF_NODE_KEY_SIZE;
                    let mut value = [0u8; ROW_SIZE];
                    value.copy_from_slice(&bytes[value_offset..value_offset + ROW_SIZE]);
                    cells.push(LeafCell {
                        key: read_u32(bytes, offset),
                        value,
                    });
                }
                NodeBody::Leaf { next_leaf, cells }
            }
            NodeType::Internal => {
                let num_keys = read_u32(bytes, INTERNAL_NODE_NUM_KEYS_OFFSET) as usize;
                if num_keys > INTERNAL_NODE_MAX_KEYS {
                    return Err(corrupted(format!("internal node claims {} keys", num_keys)));
                }
                let right_child = read_u32(bytes, INTERNAL_NODE_RIGHT_CHILD_OFFSET);
                let mut keys = Vec::with_capacity(num_keys);
                let mut children = Vec::with_capacity(num_keys + 1);
                for i in 0..num_keys {
                    let offset = INTERNAL_NODE_HEADER_SIZE + i * INTERNAL_NODE_CELL_SIZE;
                    children.push(read_u32(bytes, offset));
                    keys.push(read_u32(bytes, offset + 4));
                }
                if right_child != INVALID_PAGE_NUM {
                    children.push(right_child);
                } else if num_keys > 0 {
                    return Err(corrupted("internal node without right child".to_string()));
                }
                NodeBody::Internal { keys, children }
            }
        };

        Ok(Self {
            page_num,
            is_root,
            parent,
            body,
            is_dirty: false,
        })
    }

    fn corrupted(&self, reason: String) -> DatabaseError {
        DatabaseError::CorruptedPage {
            page_num: self.page_num,
            reason,
        }
    }
}

fn write_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}
