//! Index meta page.
//!
//! The first page of every index file records what the index was built
//! over and where its root currently lives. The root page number changes
//! whenever the root splits; everything else is fixed at build time.
//!
//! Layout (36 bytes, rest of the page zero):
//! - relation_name: 20 bytes, zero-padded
//! - attr_byte_offset: u32
//! - attr_type: u8
//! - root_is_leaf: u8
//! - reserved: u16
//! - root_page_no: u32
//! - reserved: u32

use larch_common::page::{PageNo, PAGE_SIZE};
use larch_common::types::AttrType;
use larch_common::{LarchError, Result};

/// Maximum stored length of the relation name.
const RELATION_NAME_LEN: usize = 20;

/// Contents of the index meta page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the indexed relation (truncated to 20 bytes).
    pub relation_name: String,
    /// Byte offset of the key within a relation record.
    pub attr_byte_offset: u32,
    /// Type of the indexed attribute.
    pub attr_type: AttrType,
    /// Page number of the current root node.
    pub root_page_no: PageNo,
    /// Whether the root is still a leaf.
    pub root_is_leaf: bool,
}

impl IndexMeta {
    /// Encodes the meta into a page image.
    pub fn to_bytes(&self) -> Box<[u8; PAGE_SIZE]> {
        let mut data = Box::new([0u8; PAGE_SIZE]);

        let name = self.relation_name.as_bytes();
        let len = name.len().min(RELATION_NAME_LEN);
        data[..len].copy_from_slice(&name[..len]);

        data[20..24].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        data[24] = self.attr_type as u8;
        data[25] = self.root_is_leaf as u8;
        data[28..32].copy_from_slice(&self.root_page_no.to_le_bytes());
        data
    }

    /// Decodes the meta from a page image.
    pub fn from_bytes(data: &[u8; PAGE_SIZE]) -> Result<Self> {
        let name_end = data[..RELATION_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_LEN);
        let relation_name = String::from_utf8_lossy(&data[..name_end]).into_owned();

        let attr_byte_offset = u32::from_le_bytes([data[20], data[21], data[22], data[23]]);
        let attr_type = AttrType::from_u8(data[24])
            .ok_or_else(|| LarchError::Corrupted(format!("unknown attr type tag {}", data[24])))?;
        let root_is_leaf = data[25] != 0;
        let root_page_no = u32::from_le_bytes([data[28], data[29], data[30], data[31]]);

        Ok(Self {
            relation_name,
            attr_byte_offset,
            attr_type,
            root_page_no,
            root_is_leaf,
        })
    }

    /// Verifies the stored build parameters against a caller's.
    ///
    /// The caller's relation name is compared in its stored form, i.e.
    /// truncated to the on-disk name width.
    pub fn check_matches(
        &self,
        relation: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<()> {
        let given = relation.as_bytes();
        let given = &given[..given.len().min(RELATION_NAME_LEN)];
        if self.relation_name.as_bytes() != given {
            return Err(LarchError::BadIndexInfo(format!(
                "relation {:?} != {:?}",
                self.relation_name, relation
            )));
        }
        if self.attr_byte_offset != attr_byte_offset {
            return Err(LarchError::BadIndexInfo(format!(
                "attribute offset {} != {}",
                self.attr_byte_offset, attr_byte_offset
            )));
        }
        if self.attr_type != attr_type {
            return Err(LarchError::BadIndexInfo(format!(
                "attribute type {} != {}",
                self.attr_type, attr_type
            )));
        }
        Ok(())
    }
}
