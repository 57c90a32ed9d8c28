//! Disk-resident B+ tree index over integer record attributes.
//!
//! The tree maps an i32 key, extracted at a fixed byte offset from heap
//! file records, to record ids. Nodes live in fixed-size pages reached
//! through the buffer manager: leaves hold sorted (key, rid) pairs and a
//! right-sibling link for range scans; internal nodes hold sorted
//! separator keys with child page pointers. Inserts descend recursively
//! and split on overflow, promoting a separator upward; a root split
//! installs a new root and rewrites the meta page.

pub mod constants;
pub mod index;
pub mod meta;
pub mod node;
pub mod scan;

pub use constants::{INTERNAL_CAPACITY, LEAF_CAPACITY};
pub use index::BTreeIndex;
pub use meta::IndexMeta;
pub use node::{InternalNode, LeafNode, NodeKind};
pub use scan::ScanOp;
