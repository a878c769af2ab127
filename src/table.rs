use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::btree::{leaf_cell, leaf_cell_key, InternalNode, LeafNode, Node, NodeHeader};
use crate::config::{ConfigError, TableConfig};
use crate::constants::*;
use crate::cursor::{Cursor, Rows};
use crate::pager::{Pager, PagerError};
use crate::row::{Row, RowError};

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Row(#[from] RowError),
    #[error(transparent)]
    Pager(#[from] PagerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Duplicate key.")]
    DuplicateKey { key: u32 },
    #[error("Table full.")]
    TableFull,
    #[error("page {page_num} is corrupt: {reason}")]
    CorruptNode { page_num: u32, reason: String },
    #[error("cursor is not on a cell (page {page_num}, cell {cell_num})")]
    NoCell { page_num: u32, cell_num: usize },
}

fn corrupt(page_num: u32, reason: impl Into<String>) -> TableError {
    TableError::CorruptNode {
        page_num,
        reason: reason.into(),
    }
}

fn node_at(pager: &mut Pager, page_num: u32) -> Result<Node<'_>, TableError> {
    let page = pager.get_page(page_num)?;
    let tag = page.buffer[NODE_TYPE_OFFSET];
    Node::new(&mut page.buffer[..])
        .ok_or_else(|| corrupt(page_num, format!("unknown node type {tag}")))
}

/// Where the upper half of a split leaf gets linked in.
enum SplitTarget {
    /// The leaf is the root: both halves move to fresh pages under a new
    /// internal root.
    Root,
    /// The leaf sits at `child_index` of its parent.
    Child {
        parent_page_num: u32,
        child_index: usize,
    },
}

/// The single table of the database, stored as a B-tree keyed by row id.
///
/// Page 0 is always the root. It starts as an empty leaf and turns into an
/// internal node the first time the root leaf splits.
pub struct Table {
    root_page_num: u32,
    pager: Pager,
    full: bool,
    closed: bool,
}

impl Table {
    pub fn open<P>(filename: P, config: TableConfig) -> Result<Self, TableError>
    where
        P: AsRef<Path>,
    {
        config.validate()?;
        let path = filename.as_ref();
        let mut pager = Pager::open(path, &config)?;

        if pager.num_pages() == 0 {
            let root_page_num = pager.allocate_page()?;
            let page = pager.get_page(root_page_num)?;
            let mut root = LeafNode::new(&mut page.buffer[..]);
            root.initialize();
            root.set_root(true);
            info!(path = %path.display(), "created table");
        } else {
            if !node_at(&mut pager, ROOT_PAGE_NUM)?.is_root() {
                return Err(corrupt(ROOT_PAGE_NUM, "root flag is not set"));
            }
            info!(path = %path.display(), num_pages = pager.num_pages(), "opened table");
        }

        Ok(Table {
            root_page_num: ROOT_PAGE_NUM,
            pager,
            full: false,
            closed: false,
        })
    }

    /// Flushes every page and closes the file.
    pub fn close(mut self) -> Result<(), TableError> {
        self.closed = true;
        self.pager.close()?;
        info!("closed table");
        Ok(())
    }

    pub fn root_page_num(&self) -> u32 {
        self.root_page_num
    }

    pub fn num_pages(&self) -> u32 {
        self.pager.num_pages()
    }

    /// Whether an insert on this table instance was refused for lack of space.
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub(crate) fn node(&mut self, page_num: u32) -> Result<Node<'_>, TableError> {
        node_at(&mut self.pager, page_num)
    }

    pub(crate) fn leaf(&mut self, page_num: u32) -> Result<LeafNode<'_>, TableError> {
        match self.node(page_num)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(corrupt(page_num, "expected a leaf node")),
        }
    }

    pub(crate) fn internal(&mut self, page_num: u32) -> Result<InternalNode<'_>, TableError> {
        match self.node(page_num)? {
            Node::Internal(internal) => Ok(internal),
            Node::Leaf(_) => Err(corrupt(page_num, "expected an internal node")),
        }
    }

    pub(crate) fn read_row(&mut self, page_num: u32, cell_num: usize) -> Result<Row, TableError> {
        let leaf = self.leaf(page_num)?;
        if cell_num >= leaf.num_cells() as usize {
            return Err(TableError::NoCell { page_num, cell_num });
        }

        let mut value = [0u8; ROW_SIZE];
        value.copy_from_slice(leaf.value(cell_num));
        Ok(Row::decode(&value)?)
    }

    /// Follows the first child of every internal node down to a leaf.
    pub(crate) fn leftmost_leaf(&mut self, page_num: u32) -> Result<u32, TableError> {
        let mut page_num = page_num;
        for _ in 0..=self.pager.num_pages() {
            match self.node(page_num)? {
                Node::Leaf(_) => return Ok(page_num),
                Node::Internal(internal) => page_num = internal.child(0),
            }
        }
        Err(corrupt(page_num, "child pointers form a cycle"))
    }

    fn locate(&mut self, key: u32) -> Result<(u32, usize), TableError> {
        let mut page_num = self.root_page_num;
        for _ in 0..=self.pager.num_pages() {
            match self.node(page_num)? {
                Node::Leaf(leaf) => {
                    let cell_num = match leaf.find(key) {
                        Ok(cell_num) | Err(cell_num) => cell_num,
                    };
                    return Ok((page_num, cell_num));
                }
                Node::Internal(internal) => page_num = internal.find_child(key),
            }
        }
        Err(corrupt(page_num, "child pointers form a cycle"))
    }

    /// Returns a cursor on the cell holding `key`, or on the slot where
    /// `key` would be inserted.
    pub fn find(&mut self, key: u32) -> Result<Cursor<'_>, TableError> {
        let (page_num, cell_num) = self.locate(key)?;
        Ok(Cursor::at(self, page_num, cell_num))
    }

    /// Returns a cursor on the smallest key of the table.
    pub fn start(&mut self) -> Result<Cursor<'_>, TableError> {
        Cursor::start(self)
    }

    pub fn get(&mut self, id: i32) -> Result<Option<Row>, TableError> {
        if id <= 0 {
            return Ok(None);
        }

        let key = id as u32;
        let (page_num, cell_num) = self.locate(key)?;
        let leaf = self.leaf(page_num)?;
        if cell_num < leaf.num_cells() as usize && leaf.key(cell_num) == key {
            self.read_row(page_num, cell_num).map(Some)
        } else {
            Ok(None)
        }
    }

    /// All rows in ascending id order.
    pub fn select(&mut self) -> Result<Rows<'_>, TableError> {
        Ok(Rows::new(self.start()?))
    }

    /// Rows with an id of at least `id`, in ascending order.
    pub fn select_from(&mut self, id: i32) -> Result<Rows<'_>, TableError> {
        let mut cursor = self.find(id.max(1) as u32)?;
        cursor.settle()?;
        Ok(Rows::new(cursor))
    }

    pub fn insert(&mut self, row: &Row) -> Result<(), TableError> {
        let value = row.encode()?;

        let key = row.key();
        let cursor = self.find(key)?;
        let (page_num, cell_num) = (cursor.page_num(), cursor.cell_num());
        let full = self.full;

        let mut leaf = self.leaf(page_num)?;
        let num_cells = leaf.num_cells() as usize;
        if cell_num < num_cells && leaf.key(cell_num) == key {
            return Err(TableError::DuplicateKey { key });
        }
        // Once full, every new key is refused, even one that would fit.
        if full {
            return Err(TableError::TableFull);
        }

        if num_cells < LEAF_NODE_MAX_CELLS {
            leaf.insert_cell(cell_num, key, &value);
            return Ok(());
        }

        self.split_leaf_and_insert(page_num, cell_num, key, &value)
    }

    /// Checks that the split of `page_num` can complete before anything is
    /// written. Marks the table full when it cannot.
    fn plan_split(&mut self, page_num: u32) -> Result<SplitTarget, TableError> {
        let leaf = self.leaf(page_num)?;
        let (is_root, parent_page_num) = (leaf.is_root(), leaf.parent());

        let target = if is_root {
            self.pager.can_allocate(2).then_some(SplitTarget::Root)
        } else {
            let parent = self.internal(parent_page_num)?;
            let child_index = parent.child_index_of(page_num).ok_or_else(|| {
                corrupt(
                    parent_page_num,
                    format!("page {page_num} is not among its children"),
                )
            })?;
            let has_room = (parent.num_keys() as usize) < INTERNAL_NODE_MAX_CELLS;

            (has_room && self.pager.can_allocate(1)).then_some(SplitTarget::Child {
                parent_page_num,
                child_index,
            })
        };

        target.ok_or_else(|| {
            self.full = true;
            warn!(num_pages = self.pager.num_pages(), "table is full");
            TableError::TableFull
        })
    }

    fn split_leaf_and_insert(
        &mut self,
        page_num: u32,
        cell_num: usize,
        key: u32,
        value: &[u8; ROW_SIZE],
    ) -> Result<(), TableError> {
        let target = self.plan_split(page_num)?;

        let leaf = self.leaf(page_num)?;
        let mut cells: Vec<[u8; LEAF_NODE_CELL_SIZE]> = (0..leaf.num_cells() as usize)
            .map(|i| {
                let mut cell = [0u8; LEAF_NODE_CELL_SIZE];
                cell.copy_from_slice(leaf.cell(i));
                cell
            })
            .collect();
        cells.insert(cell_num, leaf_cell(key, value));

        let (lower, upper) = cells.split_at(LEAF_NODE_LEFT_SPLIT_COUNT);
        let lower_max = leaf_cell_key(&lower[lower.len() - 1]);

        match target {
            SplitTarget::Root => {
                let left_page_num = self.pager.allocate_page()?;
                let right_page_num = self.pager.allocate_page()?;
                self.write_leaf(left_page_num, self.root_page_num, lower)?;
                self.write_leaf(right_page_num, self.root_page_num, upper)?;

                let page = self.pager.get_page(self.root_page_num)?;
                let mut root = InternalNode::new(&mut page.buffer[..]);
                root.initialize();
                root.set_root(true);
                root.insert_cell(0, lower_max, left_page_num);
                root.set_right_child(right_page_num);
                debug!(key, left_page_num, right_page_num, "split root leaf");
            }
            SplitTarget::Child {
                parent_page_num,
                child_index,
            } => {
                let new_page_num = self.pager.allocate_page()?;
                self.write_leaf(new_page_num, parent_page_num, upper)?;
                self.write_leaf(page_num, parent_page_num, lower)?;

                // The slot that covered the whole leaf now covers the upper
                // half; the lower half gets a new slot just before it.
                let mut parent = self.internal(parent_page_num)?;
                parent.set_child(child_index, new_page_num);
                parent.insert_cell(child_index, lower_max, page_num);
                debug!(key, page_num, new_page_num, "split leaf");
            }
        }
        Ok(())
    }

    fn write_leaf(
        &mut self,
        page_num: u32,
        parent_page_num: u32,
        cells: &[[u8; LEAF_NODE_CELL_SIZE]],
    ) -> Result<(), TableError> {
        let page = self.pager.get_page(page_num)?;
        let mut leaf = LeafNode::new(&mut page.buffer[..]);
        leaf.initialize();
        leaf.set_parent(parent_page_num);
        leaf.write_cells(cells);
        Ok(())
    }

    /// Renders the tree, one node or cell per line, children indented by
    /// two spaces.
    pub fn tree(&mut self) -> Result<String, TableError> {
        let mut out = String::new();
        self.write_tree(self.root_page_num, 0, &mut out)?;
        Ok(out)
    }

    fn write_tree(&mut self, page_num: u32, level: usize, out: &mut String) -> Result<(), TableError> {
        if level > self.pager.num_pages() as usize {
            return Err(corrupt(page_num, "child pointers form a cycle"));
        }

        let indent = "  ".repeat(level);
        let (keys, children) = match self.node(page_num)? {
            Node::Leaf(leaf) => {
                out.push_str(&format!("{indent}leaf (size {})\n", leaf.num_cells()));
                for cell_num in 0..leaf.num_cells() as usize {
                    out.push_str(&format!("{indent}  - {cell_num} : {}\n", leaf.key(cell_num)));
                }
                return Ok(());
            }
            Node::Internal(internal) => {
                let num_keys = internal.num_keys() as usize;
                out.push_str(&format!("{indent}internal (size {num_keys})\n"));
                let keys: Vec<u32> = (0..num_keys).map(|i| internal.key(i)).collect();
                let children: Vec<u32> = (0..=num_keys).map(|i| internal.child(i)).collect();
                (keys, children)
            }
        };

        for (key, child) in keys.iter().zip(&children) {
            self.write_tree(*child, level + 1, out)?;
            out.push_str(&format!("{indent}  - key {key}\n"));
        }
        if let Some(right_child) = children.last() {
            self.write_tree(*right_child, level + 1, out)?;
        }
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.pager.close() {
            error!(error = %e, "failed to flush table");
        }
    }
}
