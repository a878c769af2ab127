use crate::btree::NodeHeader;
use crate::row::Row;
use crate::table::{Table, TableError};

/// A position on a leaf cell, walking the table in ascending key order.
pub struct Cursor<'table> {
    table: &'table mut Table,
    page_num: u32,
    cell_num: usize,
    end_of_table: bool,
}

impl<'table> Cursor<'table> {
    pub(crate) fn start(table: &'table mut Table) -> Result<Self, TableError> {
        let page_num = table.leftmost_leaf(table.root_page_num())?;
        let num_cells = table.leaf(page_num)?.num_cells();
        Ok(Cursor {
            table,
            page_num,
            cell_num: 0,
            end_of_table: num_cells == 0,
        })
    }

    pub(crate) fn at(table: &'table mut Table, page_num: u32, cell_num: usize) -> Self {
        Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: false,
        }
    }

    pub fn page_num(&self) -> u32 {
        self.page_num
    }

    pub fn cell_num(&self) -> usize {
        self.cell_num
    }

    pub fn end_of_table(&self) -> bool {
        self.end_of_table
    }

    pub fn key(&mut self) -> Result<u32, TableError> {
        let leaf = self.table.leaf(self.page_num)?;
        if self.end_of_table || self.cell_num >= leaf.num_cells() as usize {
            return Err(TableError::NoCell {
                page_num: self.page_num,
                cell_num: self.cell_num,
            });
        }
        Ok(leaf.key(self.cell_num))
    }

    pub fn row(&mut self) -> Result<Row, TableError> {
        if self.end_of_table {
            return Err(TableError::NoCell {
                page_num: self.page_num,
                cell_num: self.cell_num,
            });
        }
        self.table.read_row(self.page_num, self.cell_num)
    }

    pub fn advance(&mut self) -> Result<(), TableError> {
        if self.end_of_table {
            return Ok(());
        }
        self.cell_num += 1;
        self.settle()
    }

    /// Moves a cursor that sits past the last cell of its leaf onto the
    /// first cell of the next leaf, or to the end of the table.
    pub fn settle(&mut self) -> Result<(), TableError> {
        loop {
            let num_cells = self.table.leaf(self.page_num)?.num_cells() as usize;
            if self.end_of_table || self.cell_num < num_cells {
                return Ok(());
            }
            self.next_leaf()?;
        }
    }

    // Climbs until some ancestor has a child to the right of the path just
    // taken, then descends to the leftmost leaf under that child.
    fn next_leaf(&mut self) -> Result<(), TableError> {
        let mut child = self.page_num;
        for _ in 0..=self.table.num_pages() {
            let node = self.table.node(child)?;
            if node.is_root() {
                self.end_of_table = true;
                return Ok(());
            }

            let parent_page_num = node.parent();
            let parent = self.table.internal(parent_page_num)?;
            let index = parent.child_index_of(child).ok_or_else(|| TableError::CorruptNode {
                page_num: parent_page_num,
                reason: format!("page {child} is not among its children"),
            })?;

            if index < parent.num_keys() as usize {
                let next = parent.child(index + 1);
                self.page_num = self.table.leftmost_leaf(next)?;
                self.cell_num = 0;
                return Ok(());
            }
            child = parent_page_num;
        }
        Err(TableError::CorruptNode {
            page_num: child,
            reason: "parent pointers form a cycle".to_string(),
        })
    }
}

/// Lazily decoded rows from a cursor to the end of the table.
pub struct Rows<'table> {
    cursor: Cursor<'table>,
    failed: bool,
}

impl<'table> Rows<'table> {
    pub(crate) fn new(cursor: Cursor<'table>) -> Self {
        Rows {
            cursor,
            failed: false,
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.end_of_table() {
            return None;
        }

        let result = self.cursor.row().and_then(|row| {
            self.cursor.advance()?;
            Ok(row)
        });
        self.failed = result.is_err();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use tempfile::tempdir;

    fn row(id: i32) -> Row {
        Row::new(id, format!("user{id}"), format!("person{id}@example.com"))
    }

    #[test]
    fn empty_table_starts_at_end() {
        let dir = tempdir().unwrap();
        let mut table = Table::open(dir.path().join("test.db"), TableConfig::default()).unwrap();
        let mut cursor = table.start().unwrap();
        assert!(cursor.end_of_table());
        assert!(matches!(cursor.row(), Err(TableError::NoCell { .. })));
        assert_eq!(table.select().unwrap().count(), 0);
    }

    #[test]
    fn advance_crosses_leaf_boundaries() {
        let dir = tempdir().unwrap();
        let mut table = Table::open(dir.path().join("test.db"), TableConfig::default()).unwrap();
        for id in 1..=30 {
            table.insert(&row(id)).unwrap();
        }

        let mut cursor = table.start().unwrap();
        let mut keys = Vec::new();
        let mut pages = Vec::new();
        while !cursor.end_of_table() {
            keys.push(cursor.key().unwrap());
            pages.push(cursor.page_num());
            cursor.advance().unwrap();
        }
        pages.dedup();

        assert_eq!(keys, (1..=30).collect::<Vec<u32>>());
        assert_eq!(pages.len(), 4);

        // Advancing past the end stays put.
        cursor.advance().unwrap();
        assert!(cursor.end_of_table());
    }

    #[test]
    fn find_routes_between_leaves_and_settles_at_the_end() {
        let dir = tempdir().unwrap();
        let mut table = Table::open(dir.path().join("test.db"), TableConfig::default()).unwrap();
        for id in (1..=14).map(|i| i * 2) {
            table.insert(&row(id)).unwrap();
        }

        // The left leaf ends at 14, so 14 stays left and 15 goes right.
        let mut cursor = table.find(14).unwrap();
        assert_eq!((cursor.page_num(), cursor.cell_num()), (1, 6));
        assert_eq!(cursor.key().unwrap(), 14);

        let mut cursor = table.find(15).unwrap();
        assert_eq!((cursor.page_num(), cursor.cell_num()), (2, 0));
        assert_eq!(cursor.key().unwrap(), 16);

        let mut cursor = table.find(99).unwrap();
        assert_eq!(cursor.cell_num(), 7);
        assert!(!cursor.end_of_table());
        cursor.settle().unwrap();
        assert!(cursor.end_of_table());
    }
}
