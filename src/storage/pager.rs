use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, error};

use crate::types::{
    PAGE_SIZE, PageNum, TABLE_MAX_PAGES,
    error::DatabaseError,
    page::{NodeBody, Page},
};

/// Owns the backing file of one table and the only in-memory copy of each
/// of its pages.
pub struct Pager {
    path: PathBuf,
    file: File,
    file_length: u64,
    num_pages: PageNum,
    pages: HashMap<PageNum, Page>,
}

impl Pager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(DatabaseError::CorruptFile {
                reason: format!(
                    "{} is {} bytes, not a whole number of {}-byte pages",
                    path.display(),
                    file_length,
                    PAGE_SIZE
                ),
            });
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as PageNum;
        debug!(path = %path.display(), num_pages, "opened pager");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_length,
            num_pages,
            pages: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> PageNum {
        self.num_pages
    }

    /// Bytes currently written to the backing file.
    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    fn page_offset(page_num: PageNum) -> u64 {
        page_num as u64 * PAGE_SIZE as u64
    }

    fn load(&mut self, page_num: PageNum) -> Result<(), DatabaseError> {
        if page_num >= self.num_pages || page_num >= TABLE_MAX_PAGES {
            return Err(DatabaseError::PageOutOfBounds {
                page_num,
                num_pages: self.num_pages,
            });
        }
        if self.pages.contains_key(&page_num) {
            return Ok(());
        }
        let mut buffer = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;
        self.file.read_exact(&mut buffer)?;
        let page = Page::from_bytes(page_num, &buffer)?;
        self.pages.insert(page_num, page);
        Ok(())
    }

    pub fn get_page(&mut self, page_num: PageNum) -> Result<&Page, DatabaseError> {
        self.load(page_num)?;
        self.pages
            .get(&page_num)
            .ok_or(DatabaseError::PageOutOfBounds {
                page_num,
                num_pages: self.num_pages,
            })
    }

    /// Like `get_page`, but the page is marked dirty.
    pub fn get_page_mut(&mut self, page_num: PageNum) -> Result<&mut Page, DatabaseError> {
        self.load(page_num)?;
        let num_pages = self.num_pages;
        let page = self
            .pages
            .get_mut(&page_num)
            .ok_or(DatabaseError::PageOutOfBounds {
                page_num,
                num_pages,
            })?;
        page.is_dirty = true;
        Ok(page)
    }

    /// Appends a fresh page holding `body` and returns its number.
    pub fn allocate(&mut self, body: NodeBody) -> Result<PageNum, DatabaseError> {
        let page_num = self.num_pages;
        if page_num >= TABLE_MAX_PAGES {
            return Err(DatabaseError::TableFull);
        }
        self.pages.insert(page_num, Page::new(page_num, body));
        self.num_pages += 1;
        Ok(page_num)
    }

    pub fn flush(&mut self, page_num: PageNum) -> Result<(), DatabaseError> {
        let Some(page) = self.pages.get_mut(&page_num) else {
            return Ok(());
        };
        if !page.is_dirty {
            return Ok(());
        }
        let bytes = page.to_bytes()?;
        let offset = Self::page_offset(page_num);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        page.is_dirty = false;
        self.file_length = self.file_length.max(offset + PAGE_SIZE as u64);
        debug!(path = %self.path.display(), page_num, "flushed page");
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<(), DatabaseError> {
        let mut dirty: Vec<PageNum> = self
            .pages
            .iter()
            .filter(|(_, page)| page.is_dirty)
            .map(|(&page_num, _)| page_num)
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }
        dirty.sort_unstable();
        for page_num in dirty {
            self.flush(page_num)?;
        }
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            error!(path = %self.path.display(), error = %e, "failed to flush pages on close");
        }
    }
}
