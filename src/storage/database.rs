use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    storage::catalog::{Catalog, TableSchema},
    types::error::DatabaseError,
};

const TABLES_DIR: &str = "Tables";

/// A database directory: `<data_dir>/<name>/<name>.catalog` plus one file
/// per table under `Tables/`.
#[derive(Debug, Clone)]
pub struct Database {
    pub name: String,
    pub dir: PathBuf,
    pub catalog: Catalog,
}

impl Database {
    pub fn create<P: AsRef<Path>>(data_dir: P, name: &str) -> Result<Self, DatabaseError> {
        validate_name("database", name)?;
        let dir = data_dir.as_ref().join(name);
        if dir.exists() {
            return Err(DatabaseError::DatabaseExists {
                name: name.to_string(),
            });
        }
        fs::create_dir_all(dir.join(TABLES_DIR))?;
        let database = Self {
            name: name.to_string(),
            dir,
            catalog: Catalog::new(name),
        };
        database.save()?;
        info!(database = name, dir = %database.dir.display(), "created database");
        Ok(database)
    }

    pub fn open<P: AsRef<Path>>(data_dir: P, name: &str) -> Result<Self, DatabaseError> {
        validate_name("database", name)?;
        let dir = data_dir.as_ref().join(name);
        let catalog_path = Self::catalog_path_in(&dir, name);
        if !catalog_path.exists() {
            return Err(DatabaseError::DatabaseNotFound {
                name: name.to_string(),
            });
        }
        let bytes = fs::read(&catalog_path)?;
        let catalog = Catalog::from_bytes(&bytes)?;
        Ok(Self {
            name: name.to_string(),
            dir,
            catalog,
        })
    }

    fn catalog_path_in(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.catalog", name))
    }

    pub fn catalog_path(&self) -> PathBuf {
        Self::catalog_path_in(&self.dir, &self.name)
    }

    /// Writes the catalog through a temporary file so a failed write never
    /// truncates the previous copy.
    pub fn save(&self) -> Result<(), DatabaseError> {
        let path = self.catalog_path();
        let tmp = path.with_extension("catalog.tmp");
        fs::write(&tmp, self.catalog.to_bytes()?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema, DatabaseError> {
        self.catalog
            .get_table(name)
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })
    }

    pub fn table_path(&self, schema: &TableSchema) -> PathBuf {
        self.dir.join(TABLES_DIR).join(&schema.file_name)
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<PathBuf, DatabaseError> {
        validate_name("table", &schema.table_name)?;
        let path = self.table_path(&schema);
        self.catalog.add_table(schema)?;
        self.save()?;
        Ok(path)
    }

    pub fn create_index(&mut self, table: &str, index: &str, column: &str) -> Result<(), DatabaseError> {
        validate_name("index", index)?;
        let schema = self
            .catalog
            .get_table_mut(table)
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: table.to_string(),
            })?;
        schema.add_index(index, column)?;
        self.save()
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), DatabaseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::validation(format!("Invalid {} name '{}'.", kind, name)))
    }
}
