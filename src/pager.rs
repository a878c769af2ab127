use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::config::TableConfig;
use crate::constants::*;

#[derive(Debug)]
pub struct Page {
    pub buffer: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    fn zeroed() -> Self {
        Page {
            buffer: Box::new([0u8; PAGE_SIZE]),
        }
    }
}

#[derive(Debug, Error)]
pub enum PagerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("db file is not a whole number of pages ({len} bytes)")]
    CorruptFile { len: u64 },
    #[error("page {page_num} was never allocated ({num_pages} pages)")]
    Unallocated { page_num: u32, num_pages: u32 },
    #[error("no free pages left (limit {max_pages})")]
    PagesFull { max_pages: u32 },
}

/// Owns the database file and every page read from or allocated in it.
///
/// Pages are addressed by number and live at `page_num * PAGE_SIZE` in the
/// file. The cache holds each page at most once and is bounded by the
/// configured page budget, so nothing is ever evicted.
pub struct Pager {
    file: File,
    file_length: u64,
    num_pages: u32,
    max_pages: u32,
    sync_on_close: bool,
    pages: HashMap<u32, Page>,
}

impl Pager {
    pub fn open<P>(filename: P, config: &TableConfig) -> Result<Self, PagerError>
    where
        P: AsRef<Path>,
    {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(filename)?;
        let file_length = file.seek(SeekFrom::End(0))?;

        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(PagerError::CorruptFile { len: file_length });
        }

        let num_pages = (file_length / PAGE_SIZE as u64) as u32;
        debug!(file_length, num_pages, "opened pager");

        Ok(Pager {
            file,
            file_length,
            num_pages,
            max_pages: config.max_pages,
            sync_on_close: config.sync_on_close,
            pages: HashMap::new(),
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Whether `count` more pages fit in the page budget.
    pub fn can_allocate(&self, count: u32) -> bool {
        self.num_pages
            .checked_add(count)
            .is_some_and(|total| total <= self.max_pages)
    }

    pub fn get_page(&mut self, page_num: u32) -> Result<&mut Page, PagerError> {
        if page_num >= self.num_pages {
            return Err(PagerError::Unallocated {
                page_num,
                num_pages: self.num_pages,
            });
        }

        match self.pages.entry(page_num) {
            Entry::Occupied(o) => Ok(o.into_mut()),
            Entry::Vacant(v) => {
                let mut page = Page::zeroed();
                let offset = page_num as u64 * PAGE_SIZE as u64;

                // Pages past the end of the file were allocated but never
                // flushed, they start out zero-filled.
                if offset < self.file_length {
                    self.file.seek(SeekFrom::Start(offset))?;
                    self.file.read_exact(&mut page.buffer[..])?;
                    debug!(page_num, "loaded page from disk");
                }

                Ok(v.insert(page))
            }
        }
    }

    /// Reserves the next page number and caches a zeroed page for it.
    pub fn allocate_page(&mut self) -> Result<u32, PagerError> {
        if !self.can_allocate(1) {
            return Err(PagerError::PagesFull {
                max_pages: self.max_pages,
            });
        }

        let page_num = self.num_pages;
        self.pages.insert(page_num, Page::zeroed());
        self.num_pages += 1;
        debug!(page_num, "allocated page");
        Ok(page_num)
    }

    /// Writes a cached page to its offset in the file.
    pub fn flush(&mut self, page_num: u32) -> Result<(), PagerError> {
        let page = match self.pages.get(&page_num) {
            Some(p) => p,
            // a page that was never read cannot have changed
            None => return Ok(()),
        };

        let offset = page_num as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.buffer[..])?;
        self.file_length = self.file_length.max(offset + PAGE_SIZE as u64);
        Ok(())
    }

    /// Flushes pages `0..num_pages` once each, in ascending order.
    pub fn close(&mut self) -> Result<(), PagerError> {
        for page_num in 0..self.num_pages {
            self.flush(page_num)?;
        }
        if self.sync_on_close {
            self.file.sync_all()?;
        }
        debug!(num_pages = self.num_pages, cached = self.pages.len(), "flushed pager");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(max_pages: u32) -> TableConfig {
        TableConfig {
            max_pages,
            sync_on_close: false,
        }
    }

    #[test]
    fn new_file_has_no_pages() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("test.db"), &config(10)).unwrap();
        assert_eq!(pager.num_pages(), 0);
    }

    #[test]
    fn unallocated_pages_cannot_be_read() {
        let dir = tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("test.db"), &config(10)).unwrap();
        assert!(matches!(
            pager.get_page(0),
            Err(PagerError::Unallocated {
                page_num: 0,
                num_pages: 0
            })
        ));
    }

    #[test]
    fn allocation_respects_the_page_budget() {
        let dir = tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("test.db"), &config(2)).unwrap();

        assert_eq!(pager.allocate_page().unwrap(), 0);
        assert!(pager.can_allocate(1));
        assert!(!pager.can_allocate(2));
        assert_eq!(pager.allocate_page().unwrap(), 1);
        assert!(matches!(
            pager.allocate_page(),
            Err(PagerError::PagesFull { max_pages: 2 })
        ));
        assert_eq!(pager.num_pages(), 2);
    }

    #[test]
    fn allocated_pages_start_zeroed() {
        let dir = tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("test.db"), &config(10)).unwrap();
        let page_num = pager.allocate_page().unwrap();
        let page = pager.get_page(page_num).unwrap();
        assert!(page.buffer.iter().all(|b| *b == 0));
    }

    #[test]
    fn pages_survive_close_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut pager = Pager::open(&path, &config(10)).unwrap();
            for fill in [1u8, 2, 3] {
                let page_num = pager.allocate_page().unwrap();
                pager.get_page(page_num).unwrap().buffer[..].fill(fill);
            }
            pager.close().unwrap();
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * PAGE_SIZE as u64);

        let mut pager = Pager::open(&path, &config(10)).unwrap();
        assert_eq!(pager.num_pages(), 3);
        assert!(pager.get_page(1).unwrap().buffer.iter().all(|b| *b == 2));
        assert!(pager.get_page(2).unwrap().buffer.iter().all(|b| *b == 3));
    }

    #[test]
    fn partial_page_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 10]).unwrap();

        assert!(matches!(
            Pager::open(&path, &config(10)),
            Err(PagerError::CorruptFile { len }) if len == PAGE_SIZE as u64 + 10
        ));
    }
}
