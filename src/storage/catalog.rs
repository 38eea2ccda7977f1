use serde::{Deserialize, Serialize};

use crate::{
    types::{COLUMN_EMAIL_SIZE, COLUMN_USERNAME_SIZE, error::DatabaseError, value::DataType},
    utils::hash::{calculate_checksum, verify_checksum},
};

/// Represents a column definition in a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub size: Option<u32>,
    pub position: usize,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, size: Option<u32>, position: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            size,
            position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub column: String,
}

/// A table and the fixed row layout it maps onto: an integer key followed
/// by two bounded strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    pub file_name: String,
    pub indexes: Vec<IndexSchema>,
}

const STRING_BOUNDS: [usize; 2] = [COLUMN_USERNAME_SIZE, COLUMN_EMAIL_SIZE];

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSchema>) -> Result<Self, DatabaseError> {
        let table_name = table_name.into();
        let schema = Self {
            file_name: format!("{}.tbl", table_name),
            table_name,
            columns,
            indexes: Vec::new(),
        };
        schema.validate_layout()?;
        Ok(schema)
    }

    /// Schema of a table opened directly from a file by the REPL.
    pub fn default_users(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            file_name: format!("{}.tbl", table_name),
            table_name,
            columns: vec![
                ColumnSchema::new("id", DataType::Integer, None, 0),
                ColumnSchema::new("username", DataType::Text, Some(COLUMN_USERNAME_SIZE as u32), 1),
                ColumnSchema::new("email", DataType::Text, Some(COLUMN_EMAIL_SIZE as u32), 2),
            ],
            indexes: Vec::new(),
        }
    }

    pub fn validate_layout(&self) -> Result<(), DatabaseError> {
        if self.columns.len() != 3 {
            return Err(DatabaseError::SchemaMismatch {
                details: format!(
                    "table '{}' declares {} columns, rows hold an integer key and two strings",
                    self.table_name,
                    self.columns.len()
                ),
            });
        }
        if self.columns[0].data_type != DataType::Integer {
            return Err(DatabaseError::SchemaMismatch {
                details: format!(
                    "key column '{}' must be INT, got {}",
                    self.columns[0].name, self.columns[0].data_type
                ),
            });
        }
        for (column, bound) in self.columns[1..].iter().zip(STRING_BOUNDS) {
            if column.data_type != DataType::Text {
                return Err(DatabaseError::SchemaMismatch {
                    details: format!("column '{}' must be STRING, got {}", column.name, column.data_type),
                });
            }
            if column.size.is_some_and(|size| size as usize > bound) {
                return Err(DatabaseError::SchemaMismatch {
                    details: format!("column '{}' can hold at most {} bytes", column.name, bound),
                });
            }
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(DatabaseError::SchemaMismatch {
                    details: format!("duplicate column '{}'", column.name),
                });
            }
        }
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DatabaseError> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DatabaseError::ColumnNotFound {
                name: name.to_string(),
                table: self.table_name.clone(),
            })
    }

    /// Largest byte length accepted by the string column at `position`.
    pub fn max_len(&self, position: usize) -> usize {
        let bound = position
            .checked_sub(1)
            .and_then(|i| STRING_BOUNDS.get(i).copied())
            .unwrap_or(0);
        self.columns
            .get(position)
            .and_then(|c| c.size)
            .map_or(bound, |size| (size as usize).min(bound))
    }

    pub fn add_index(&mut self, name: &str, column: &str) -> Result<(), DatabaseError> {
        if self.indexes.iter().any(|i| i.name.eq_ignore_ascii_case(name)) {
            return Err(DatabaseError::IndexExists {
                name: name.to_string(),
            });
        }
        let position = self.column_index(column)?;
        self.indexes.push(IndexSchema {
            name: name.to_string(),
            column: self.columns[position].name.clone(),
        });
        Ok(())
    }
}

/// Tables of one database, persisted as `[crc32 LE][bincode payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub database_name: String,
    pub tables: Vec<TableSchema>,
}

impl Catalog {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            tables: Vec::new(),
        }
    }

    pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.table_name.eq_ignore_ascii_case(name))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut TableSchema> {
        self.tables
            .iter_mut()
            .find(|t| t.table_name.eq_ignore_ascii_case(name))
    }

    pub fn add_table(&mut self, schema: TableSchema) -> Result<(), DatabaseError> {
        if self.get_table(&schema.table_name).is_some() {
            return Err(DatabaseError::TableExists {
                name: schema.table_name,
            });
        }
        self.tables.push(schema);
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table_name.clone()).collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DatabaseError> {
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
            DatabaseError::Serialization {
                details: e.to_string(),
            }
        })?;
        let mut buffer = Vec::with_capacity(payload.len() + 4);
        buffer.extend_from_slice(&calculate_checksum(&payload).to_le_bytes());
        buffer.extend_from_slice(&payload);
        Ok(buffer)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < 4 {
            return Err(DatabaseError::CorruptFile {
                reason: "catalog is shorter than its checksum".to_string(),
            });
        }
        let (checksum, payload) = bytes.split_at(4);
        let mut raw = [0u8; 4];
        raw.copy_from_slice(checksum);
        if !verify_checksum(payload, u32::from_le_bytes(raw)) {
            return Err(DatabaseError::CorruptFile {
                reason: "catalog checksum mismatch".to_string(),
            });
        }
        let (catalog, _) =
            bincode::serde::decode_from_slice::<Catalog, _>(payload, bincode::config::standard())
                .map_err(|e| DatabaseError::Serialization {
                    details: e.to_string(),
                })?;
        Ok(catalog)
    }
}
