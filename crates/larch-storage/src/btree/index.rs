//! B+ tree index handle: open/create, bulk load, and recursive insert.

use super::meta::IndexMeta;
use super::node::{InternalNode, LeafNode};
use super::scan::ScanState;
use crate::buffer::BufferManager;
use crate::file::FileId;
use crate::heap::{FileScan, HeapFile};
use crate::record::RecordId;
use larch_common::page::PageNo;
use larch_common::types::AttrType;
use larch_common::{LarchError, Result};
use std::sync::Arc;
use tracing::{debug, trace};

/// Reinterprets the first four key bytes as a native-endian i32.
pub(crate) fn key_as_i32(key: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = key
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| LarchError::Corrupted("key shorter than 4 bytes".to_string()))?;
    Ok(i32::from_ne_bytes(bytes))
}

/// Handle to a disk-resident B+ tree index over one relation attribute.
///
/// The handle is single-threaded: operations take `&mut self` and complete
/// in call order. At most one range scan is active per handle.
pub struct BTreeIndex {
    /// Buffer manager for all page access.
    pub(crate) buf: Arc<BufferManager>,
    /// Open index file.
    pub(crate) file: FileId,
    /// Index file name, `"{relation}.{attr_byte_offset}"`.
    index_name: String,
    /// Page holding the index meta.
    header_page_no: PageNo,
    /// Current root page.
    pub(crate) root_page_no: PageNo,
    /// Whether the root is still a leaf.
    pub(crate) root_is_leaf: bool,
    /// Byte offset of the key within a relation record.
    attr_byte_offset: u32,
    /// Active scan, if any.
    pub(crate) scan: Option<ScanState>,
    /// Set once an explicit close has flushed the file.
    closed: bool,
}

impl BTreeIndex {
    /// Opens the index for `relation` on the attribute at
    /// `attr_byte_offset`, building it from the relation's records if it
    /// does not exist yet.
    ///
    /// The index lives in a file named `"{relation}.{attr_byte_offset}"`.
    /// Reopening an existing index verifies the stored relation name, key
    /// offset, and key type against the arguments and fails with
    /// `BadIndexInfo` on mismatch. Only integer attributes are supported.
    pub fn open(
        buf: Arc<BufferManager>,
        relation: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<BTreeIndex> {
        if attr_type != AttrType::Integer {
            return Err(LarchError::UnsupportedType(attr_type.to_string()));
        }

        let index_name = format!("{relation}.{attr_byte_offset}");

        let opened = buf.file_manager().open(&index_name);
        match opened {
            Ok(file) => {
                let header_page_no = buf.file_manager().first_page_no(file)?;
                let guard = buf.pin_page(file, header_page_no)?;
                let meta = IndexMeta::from_bytes(&guard.data())?;
                drop(guard);

                meta.check_matches(relation, attr_byte_offset, attr_type)?;
                debug!(
                    index = %index_name,
                    root = meta.root_page_no,
                    "opened existing index"
                );

                Ok(Self {
                    buf,
                    file,
                    index_name,
                    header_page_no,
                    root_page_no: meta.root_page_no,
                    root_is_leaf: meta.root_is_leaf,
                    attr_byte_offset,
                    scan: None,
                    closed: false,
                })
            }
            Err(LarchError::FileNotFound(_)) => {
                let file = buf.file_manager().create(&index_name)?;

                let (header_page_no, mut header_guard) = buf.alloc_page(file)?;
                let (root_page_no, mut root_guard) = buf.alloc_page(file)?;

                let meta = IndexMeta {
                    relation_name: relation.to_string(),
                    attr_byte_offset,
                    attr_type,
                    root_page_no,
                    root_is_leaf: true,
                };
                header_guard.overwrite(&meta.to_bytes());
                root_guard.overwrite(&LeafNode::new().to_bytes());
                drop(header_guard);
                drop(root_guard);

                debug!(index = %index_name, "created index, bulk loading");

                let mut index = Self {
                    buf,
                    file,
                    index_name,
                    header_page_no,
                    root_page_no,
                    root_is_leaf: true,
                    attr_byte_offset,
                    scan: None,
                    closed: false,
                };
                index.bulk_load(relation)?;
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the index file name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Builds the index by scanning every record of the relation.
    fn bulk_load(&mut self, relation: &str) -> Result<()> {
        let heap = HeapFile::open(self.buf.clone(), relation)?;
        let mut scan = FileScan::new(&heap);
        let offset = self.attr_byte_offset as usize;

        let mut loaded = 0u64;
        loop {
            match scan.scan_next() {
                Ok(rid) => {
                    let record = scan.get_record()?;
                    let key = record.get(offset..offset + 4).ok_or_else(|| {
                        LarchError::Corrupted(format!("record {rid} shorter than key offset"))
                    })?;
                    self.insert_entry(key, rid)?;
                    loaded += 1;
                }
                Err(LarchError::EndOfFile) => break,
                Err(e) => return Err(e),
            }
        }

        debug!(index = %self.index_name, loaded, "bulk load complete");
        Ok(())
    }

    /// Inserts a (key, rid) entry. The key bytes are reinterpreted as a
    /// native-endian i32.
    pub fn insert_entry(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        let key = key_as_i32(key)?;

        let split = self.insert_helper(key, rid, self.root_page_no, self.root_is_leaf)?;
        if let Some((middle_key, new_right)) = split {
            self.grow_root(middle_key, new_right)?;
        }
        Ok(())
    }

    /// Recursive descent: insert into the subtree rooted at `page_no`.
    ///
    /// Returns `Some((separator, new_right_page))` when this node split and
    /// the parent must absorb the promoted separator, `None` otherwise.
    /// The node stays pinned for the duration of the recursion below it.
    fn insert_helper(
        &mut self,
        key: i32,
        rid: RecordId,
        page_no: PageNo,
        is_leaf: bool,
    ) -> Result<Option<(i32, PageNo)>> {
        let mut guard = self.buf.pin_page(self.file, page_no)?;

        if is_leaf {
            let mut leaf = LeafNode::from_bytes(&guard.data())?;
            let index = leaf.find_insert_pos(key);

            if !leaf.is_full() {
                leaf.insert_at(index, key, rid);
                guard.overwrite(&leaf.to_bytes());
                return Ok(None);
            }

            let (new_page_no, mut new_guard) = self.buf.alloc_page(self.file)?;
            let right = leaf.split_insert(index, key, rid, new_page_no);
            let middle_key = right.key_at(0);
            guard.overwrite(&leaf.to_bytes());
            new_guard.overwrite(&right.to_bytes());
            trace!(page_no, new_page_no, middle_key, "leaf split");
            return Ok(Some((middle_key, new_page_no)));
        }

        let mut node = InternalNode::from_bytes(&guard.data())?;
        let child = node.child_at(node.find_child_index(key));
        let child_is_leaf = node.level() == 1;

        let (middle_key, new_child) = match self.insert_helper(key, rid, child, child_is_leaf)? {
            // Child absorbed the insert: this node is untouched, unpin clean.
            None => return Ok(None),
            Some(split) => split,
        };

        // The first separator above the promoted key is also its insert slot.
        let index = node.find_child_index(middle_key);

        if !node.is_full() {
            node.insert_at(index, middle_key, new_child);
            guard.overwrite(&node.to_bytes());
            return Ok(None);
        }

        let (new_page_no, mut new_guard) = self.buf.alloc_page(self.file)?;
        let (promoted, right) = node.split_insert(index, middle_key, new_child);
        guard.overwrite(&node.to_bytes());
        new_guard.overwrite(&right.to_bytes());
        trace!(page_no, new_page_no, promoted, "internal split");
        Ok(Some((promoted, new_page_no)))
    }

    /// Installs a new root above the old one after a root-level split,
    /// and records it in the meta page.
    fn grow_root(&mut self, middle_key: i32, new_right: PageNo) -> Result<()> {
        let level = if self.root_is_leaf { 1 } else { 0 };

        let (new_root_no, mut root_guard) = self.buf.alloc_page(self.file)?;
        let root = InternalNode::new_root(middle_key, self.root_page_no, new_right, level);
        root_guard.overwrite(&root.to_bytes());
        drop(root_guard);

        let mut meta_guard = self.buf.pin_page(self.file, self.header_page_no)?;
        let mut meta = IndexMeta::from_bytes(&meta_guard.data())?;
        meta.root_page_no = new_root_no;
        meta.root_is_leaf = false;
        meta_guard.overwrite(&meta.to_bytes());
        drop(meta_guard);

        debug!(
            index = %self.index_name,
            old_root = self.root_page_no,
            new_root = new_root_no,
            "root split"
        );
        self.root_page_no = new_root_no;
        self.root_is_leaf = false;
        Ok(())
    }

    /// Ends any active scan, flushes the index file to disk, and releases
    /// the file handle.
    pub fn close(mut self) -> Result<()> {
        self.scan = None;
        self.buf.flush_file(self.file)?;
        self.buf.file_manager().close(self.file)?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        // Release the scan's pinned leaf before flushing.
        self.scan = None;
        if !self.closed {
            let _ = self.buf.flush_file(self.file);
            let _ = self.buf.file_manager().close(self.file);
        }
    }
}
