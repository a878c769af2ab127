//! A single-table record store kept in one file as a B-tree of 4 KiB pages.
//!
//! Rows are `(id, username, email)` records keyed by their positive id. The
//! [`Table`] is the entry point: it owns the [`pager::Pager`], which caches
//! the file's pages, and drives the node layout in [`btree`] to search,
//! insert and split. The `db` binary wraps it in the command loop from
//! [`repl`].

pub mod btree;
pub mod config;
pub mod constants;
pub mod cursor;
pub mod pager;
pub mod repl;
pub mod row;
pub mod table;
pub mod virtual_machine;

pub use config::TableConfig;
pub use cursor::{Cursor, Rows};
pub use row::{Row, RowError};
pub use table::{Table, TableError};
