//! Typed views over the bytes of a B-tree page.
//!
//! A page is either a leaf, holding sorted `(key, row)` cells, or an
//! internal node, holding sorted `(key, child)` cells plus a rightmost child.
//! Both share the common header:
//!
//! ```text
//! +-----------+---------+-----------------------+
//! | type (1B) | root(1B)| parent page num (4B)  |
//! +-----------+---------+-----------------------+
//! ```
//!
//! The views do no I/O; they borrow a page buffer owned by the pager.

use crate::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl NodeType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NodeType::Internal),
            1 => Some(NodeType::Leaf),
            _ => None,
        }
    }
}

fn read_u32(buffer: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn write_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Accessors for the header every node starts with.
pub trait NodeHeader {
    fn buffer(&self) -> &[u8];
    fn buffer_mut(&mut self) -> &mut [u8];

    fn is_root(&self) -> bool {
        self.buffer()[IS_ROOT_OFFSET] != 0
    }

    fn set_root(&mut self, is_root: bool) {
        self.buffer_mut()[IS_ROOT_OFFSET] = u8::from(is_root);
    }

    fn parent(&self) -> u32 {
        read_u32(self.buffer(), PARENT_POINTER_OFFSET)
    }

    fn set_parent(&mut self, page_num: u32) {
        write_u32(self.buffer_mut(), PARENT_POINTER_OFFSET, page_num)
    }
}

pub struct LeafNode<'a> {
    buffer: &'a mut [u8],
}

impl<'a> LeafNode<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        LeafNode { buffer }
    }
}

impl NodeHeader for LeafNode<'_> {
    fn buffer(&self) -> &[u8] {
        &*self.buffer
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }
}

impl LeafNode<'_> {
    /// Formats the page as an empty, non-root leaf.
    pub fn initialize(&mut self) {
        self.buffer[..PAGE_SIZE].fill(0);
        self.buffer[NODE_TYPE_OFFSET] = NodeType::Leaf as u8;
        self.set_root(false);
        self.set_num_cells(0);
    }

    pub fn num_cells(&self) -> u32 {
        read_u32(self.buffer(), LEAF_NODE_NUM_CELLS_OFFSET)
    }

    pub fn set_num_cells(&mut self, num_cells: u32) {
        write_u32(self.buffer, LEAF_NODE_NUM_CELLS_OFFSET, num_cells)
    }

    fn cell_offset(cell_num: usize) -> usize {
        LEAF_NODE_HEADER_SIZE + cell_num * LEAF_NODE_CELL_SIZE
    }

    pub fn cell(&self, cell_num: usize) -> &[u8] {
        let offset = Self::cell_offset(cell_num);
        &self.buffer[offset..offset + LEAF_NODE_CELL_SIZE]
    }

    pub fn key(&self, cell_num: usize) -> u32 {
        read_u32(self.buffer(), Self::cell_offset(cell_num) + LEAF_NODE_KEY_OFFSET)
    }

    pub fn set_key(&mut self, cell_num: usize, key: u32) {
        write_u32(
            self.buffer,
            Self::cell_offset(cell_num) + LEAF_NODE_KEY_OFFSET,
            key,
        )
    }

    pub fn value(&self, cell_num: usize) -> &[u8] {
        let offset = Self::cell_offset(cell_num) + LEAF_NODE_VALUE_OFFSET;
        &self.buffer[offset..offset + LEAF_NODE_VALUE_SIZE]
    }

    pub fn set_value(&mut self, cell_num: usize, value: &[u8; ROW_SIZE]) {
        let offset = Self::cell_offset(cell_num) + LEAF_NODE_VALUE_OFFSET;
        self.buffer[offset..offset + LEAF_NODE_VALUE_SIZE].copy_from_slice(value);
    }

    /// Largest key in the leaf, `None` when it is empty.
    pub fn max_key(&self) -> Option<u32> {
        match self.num_cells() {
            0 => None,
            n => Some(self.key(n as usize - 1)),
        }
    }

    /// Binary search over the sorted keys: `Ok(index)` when the key is
    /// present, `Err(index)` with the insertion slot otherwise.
    pub fn find(&self, key: u32) -> Result<usize, usize> {
        let mut low = 0usize;
        let mut high = self.num_cells() as usize;
        while low < high {
            let mid = low + (high - low) / 2;
            let key_at_mid = self.key(mid);
            if key == key_at_mid {
                return Ok(mid);
            }
            if key < key_at_mid {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        Err(low)
    }

    /// Writes a cell at `cell_num`, moving later cells one slot right.
    /// The caller guarantees the leaf is not full.
    pub fn insert_cell(&mut self, cell_num: usize, key: u32, value: &[u8; ROW_SIZE]) {
        let num_cells = self.num_cells() as usize;
        debug_assert!(num_cells < LEAF_NODE_MAX_CELLS);

        if cell_num < num_cells {
            self.buffer.copy_within(
                Self::cell_offset(cell_num)..Self::cell_offset(num_cells),
                Self::cell_offset(cell_num + 1),
            );
        }
        self.set_key(cell_num, key);
        self.set_value(cell_num, value);
        self.set_num_cells(num_cells as u32 + 1);
    }

    /// Replaces the whole body with `cells`, zeroing the unused tail.
    pub fn write_cells(&mut self, cells: &[[u8; LEAF_NODE_CELL_SIZE]]) {
        debug_assert!(cells.len() <= LEAF_NODE_MAX_CELLS);

        for (cell_num, cell) in cells.iter().enumerate() {
            let offset = Self::cell_offset(cell_num);
            self.buffer[offset..offset + LEAF_NODE_CELL_SIZE].copy_from_slice(cell);
        }
        self.buffer[Self::cell_offset(cells.len())..PAGE_SIZE].fill(0);
        self.set_num_cells(cells.len() as u32);
    }
}

/// Builds the raw bytes of a leaf cell.
pub fn leaf_cell(key: u32, value: &[u8; ROW_SIZE]) -> [u8; LEAF_NODE_CELL_SIZE] {
    let mut cell = [0u8; LEAF_NODE_CELL_SIZE];
    write_u32(&mut cell, LEAF_NODE_KEY_OFFSET, key);
    cell[LEAF_NODE_VALUE_OFFSET..].copy_from_slice(value);
    cell
}

pub fn leaf_cell_key(cell: &[u8; LEAF_NODE_CELL_SIZE]) -> u32 {
    read_u32(cell, LEAF_NODE_KEY_OFFSET)
}

pub struct InternalNode<'a> {
    buffer: &'a mut [u8],
}

impl<'a> InternalNode<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        InternalNode { buffer }
    }
}

impl NodeHeader for InternalNode<'_> {
    fn buffer(&self) -> &[u8] {
        &*self.buffer
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }
}

impl InternalNode<'_> {
    /// Formats the page as an empty, non-root internal node with no children.
    pub fn initialize(&mut self) {
        self.buffer[..PAGE_SIZE].fill(0);
        self.buffer[NODE_TYPE_OFFSET] = NodeType::Internal as u8;
        self.set_root(false);
        self.set_num_keys(0);
        self.set_right_child(INVALID_PAGE_NUM);
    }

    pub fn num_keys(&self) -> u32 {
        read_u32(self.buffer(), INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    pub fn set_num_keys(&mut self, num_keys: u32) {
        write_u32(self.buffer, INTERNAL_NODE_NUM_KEYS_OFFSET, num_keys)
    }

    pub fn right_child(&self) -> u32 {
        read_u32(self.buffer(), INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn set_right_child(&mut self, page_num: u32) {
        write_u32(self.buffer, INTERNAL_NODE_RIGHT_CHILD_OFFSET, page_num)
    }

    fn cell_offset(cell_num: usize) -> usize {
        INTERNAL_NODE_HEADER_SIZE + cell_num * INTERNAL_NODE_CELL_SIZE
    }

    pub fn key(&self, key_num: usize) -> u32 {
        read_u32(self.buffer(), Self::cell_offset(key_num) + INTERNAL_NODE_KEY_OFFSET)
    }

    pub fn set_key(&mut self, key_num: usize, key: u32) {
        write_u32(
            self.buffer,
            Self::cell_offset(key_num) + INTERNAL_NODE_KEY_OFFSET,
            key,
        )
    }

    /// Child `child_num`; index `num_keys` is the rightmost child.
    pub fn child(&self, child_num: usize) -> u32 {
        if child_num == self.num_keys() as usize {
            self.right_child()
        } else {
            read_u32(
                self.buffer(),
                Self::cell_offset(child_num) + INTERNAL_NODE_CHILD_OFFSET,
            )
        }
    }

    pub fn set_child(&mut self, child_num: usize, page_num: u32) {
        if child_num == self.num_keys() as usize {
            self.set_right_child(page_num)
        } else {
            write_u32(
                self.buffer,
                Self::cell_offset(child_num) + INTERNAL_NODE_CHILD_OFFSET,
                page_num,
            )
        }
    }

    /// Index of the child whose subtree holds `key`: the first key that is
    /// greater than or equal to it, or `num_keys` for the rightmost child.
    pub fn find_child_index(&self, key: u32) -> usize {
        let mut low = 0usize;
        let mut high = self.num_keys() as usize;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.key(mid) >= key {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        low
    }

    pub fn find_child(&self, key: u32) -> u32 {
        self.child(self.find_child_index(key))
    }

    /// Position of `page_num` among the children, if it is one.
    pub fn child_index_of(&self, page_num: u32) -> Option<usize> {
        (0..=self.num_keys() as usize).find(|i| self.child(*i) == page_num)
    }

    /// Writes a `(key, child)` cell at `cell_num`, moving later cells one
    /// slot right. The caller guarantees the node is not full.
    pub fn insert_cell(&mut self, cell_num: usize, key: u32, child: u32) {
        let num_keys = self.num_keys() as usize;
        debug_assert!(num_keys < INTERNAL_NODE_MAX_CELLS);

        if cell_num < num_keys {
            self.buffer.copy_within(
                Self::cell_offset(cell_num)..Self::cell_offset(num_keys),
                Self::cell_offset(cell_num + 1),
            );
        }
        self.set_num_keys(num_keys as u32 + 1);
        self.set_key(cell_num, key);
        self.set_child(cell_num, child);
    }
}

/// A page interpreted through its node-type tag.
pub enum Node<'a> {
    Leaf(LeafNode<'a>),
    Internal(InternalNode<'a>),
}

impl<'a> Node<'a> {
    /// Returns `None` when the tag byte names no known node type.
    pub fn new(buffer: &'a mut [u8]) -> Option<Self> {
        match NodeType::from_tag(buffer[NODE_TYPE_OFFSET])? {
            NodeType::Leaf => Some(Node::Leaf(LeafNode::new(buffer))),
            NodeType::Internal => Some(Node::Internal(InternalNode::new(buffer))),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Internal(_) => NodeType::Internal,
        }
    }
}

impl NodeHeader for Node<'_> {
    fn buffer(&self) -> &[u8] {
        match self {
            Node::Leaf(leaf) => leaf.buffer(),
            Node::Internal(internal) => internal.buffer(),
        }
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        match self {
            Node::Leaf(leaf) => leaf.buffer_mut(),
            Node::Internal(internal) => internal.buffer_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(byte: u8) -> [u8; ROW_SIZE] {
        [byte; ROW_SIZE]
    }

    #[test]
    fn leaf_insert_keeps_cells_sorted() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut leaf = LeafNode::new(&mut buffer);
        leaf.initialize();

        for key in [3u32, 1, 2] {
            let slot = leaf.find(key).unwrap_err();
            leaf.insert_cell(slot, key, &value(key as u8));
        }

        assert_eq!(leaf.num_cells(), 3);
        assert_eq!((0..3).map(|i| leaf.key(i)).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(leaf.value(0), &value(1)[..]);
        assert_eq!(leaf.value(2), &value(3)[..]);
        assert_eq!(leaf.max_key(), Some(3));
    }

    #[test]
    fn leaf_find_reports_hits_and_insertion_slots() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut leaf = LeafNode::new(&mut buffer);
        leaf.initialize();
        assert_eq!(leaf.find(5), Err(0));
        assert_eq!(leaf.max_key(), None);

        for (slot, key) in [10u32, 20, 30].into_iter().enumerate() {
            leaf.insert_cell(slot, key, &value(0));
        }
        assert_eq!(leaf.find(20), Ok(1));
        assert_eq!(leaf.find(5), Err(0));
        assert_eq!(leaf.find(25), Err(2));
        assert_eq!(leaf.find(35), Err(3));
    }

    #[test]
    fn leaf_write_cells_replaces_body() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut leaf = LeafNode::new(&mut buffer);
        leaf.initialize();
        for slot in 0..5 {
            leaf.insert_cell(slot, slot as u32, &value(9));
        }

        let cells = [leaf_cell(40, &value(4)), leaf_cell(50, &value(5))];
        leaf.write_cells(&cells);

        assert_eq!(leaf.num_cells(), 2);
        assert_eq!(leaf.key(1), 50);
        assert_eq!(leaf_cell_key(&cells[0]), 40);
        assert!(buffer[LEAF_NODE_HEADER_SIZE + 2 * LEAF_NODE_CELL_SIZE..]
            .iter()
            .all(|b| *b == 0));
    }

    #[test]
    fn header_fields_round_trip() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut leaf = LeafNode::new(&mut buffer);
        leaf.initialize();
        leaf.set_root(true);
        leaf.set_parent(42);
        assert!(leaf.is_root());
        assert_eq!(leaf.parent(), 42);

        assert_eq!(buffer[NODE_TYPE_OFFSET], 1);
        assert_eq!(buffer[IS_ROOT_OFFSET], 1);
        assert_eq!(&buffer[PARENT_POINTER_OFFSET..PARENT_POINTER_OFFSET + 4], &42u32.to_le_bytes());
    }

    #[test]
    fn internal_routing_sends_ties_left() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut node = InternalNode::new(&mut buffer);
        node.initialize();
        node.insert_cell(0, 7, 1);
        node.insert_cell(1, 14, 2);
        node.set_right_child(3);

        assert_eq!(node.find_child(1), 1);
        assert_eq!(node.find_child(7), 1);
        assert_eq!(node.find_child(8), 2);
        assert_eq!(node.find_child(14), 2);
        assert_eq!(node.find_child(15), 3);
        assert_eq!(node.child_index_of(3), Some(2));
        assert_eq!(node.child_index_of(9), None);
    }

    #[test]
    fn internal_insert_shifts_cells() {
        let mut buffer = [0u8; PAGE_SIZE];
        let mut node = InternalNode::new(&mut buffer);
        node.initialize();
        assert_eq!(node.right_child(), INVALID_PAGE_NUM);

        node.insert_cell(0, 20, 2);
        node.set_right_child(3);
        node.insert_cell(0, 10, 1);

        assert_eq!(node.num_keys(), 2);
        assert_eq!((node.key(0), node.child(0)), (10, 1));
        assert_eq!((node.key(1), node.child(1)), (20, 2));
        assert_eq!(node.child(2), 3);
    }

    #[test]
    fn node_dispatches_on_type_tag() {
        let mut buffer = [0u8; PAGE_SIZE];
        LeafNode::new(&mut buffer).initialize();
        assert_eq!(Node::new(&mut buffer).map(|n| n.node_type()), Some(NodeType::Leaf));

        InternalNode::new(&mut buffer).initialize();
        assert_eq!(
            Node::new(&mut buffer).map(|n| n.node_type()),
            Some(NodeType::Internal)
        );

        buffer[NODE_TYPE_OFFSET] = 7;
        assert!(Node::new(&mut buffer).is_none());
    }
}
