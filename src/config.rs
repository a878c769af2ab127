//! Table configuration.

use thiserror::Error;

use crate::constants::TABLE_MAX_PAGES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_pages must be at least 1, got {0}")]
    MaxPages(u32),
}

/// Settings applied when a table file is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Upper bound on the number of pages the pager will allocate.
    pub max_pages: u32,
    /// Fsync the file after the final flush on close.
    pub sync_on_close: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_pages: TABLE_MAX_PAGES,
            sync_on_close: true,
        }
    }
}

impl TableConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::MaxPages(self.max_pages));
        }
        Ok(())
    }
}
