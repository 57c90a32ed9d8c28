//! Bounded range scans over the leaf chain.
//!
//! A scan positions on the first leaf entry inside the range, then walks
//! forward across sibling-linked leaves. The leaf under the cursor stays
//! pinned between calls; the pin moves with the cursor and is released
//! when the scan ends.

use super::constants::LEAF_CAPACITY;
use super::index::{key_as_i32, BTreeIndex};
use super::node::{InternalNode, LeafNode};
use crate::buffer::PageGuard;
use crate::record::RecordId;
use larch_common::page::{PageNo, INVALID_PAGE_NO};
use larch_common::{LarchError, Result};
use tracing::trace;

/// Comparison operator for a scan bound.
///
/// The low bound takes `Gt`/`Gte`; the high bound takes `Lt`/`Lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

/// State of an in-progress range scan.
pub(crate) struct ScanState {
    low: i32,
    low_op: ScanOp,
    high: i32,
    high_op: ScanOp,
    /// Leaf page under the cursor.
    page_no: PageNo,
    /// Decoded snapshot of that leaf.
    leaf: LeafNode,
    /// Pin on the leaf; None once the scan ran off the end of the chain.
    guard: Option<PageGuard>,
    /// Next slot to report.
    next_entry: usize,
    /// Set when the cursor moved past the last leaf.
    at_end: bool,
}

/// Returns true when `key` is already past the high bound.
fn fails_high(key: i32, high: i32, high_op: ScanOp) -> bool {
    match high_op {
        ScanOp::Lt => key >= high,
        ScanOp::Lte => key > high,
        _ => unreachable!("high bound validated at scan start"),
    }
}

/// Returns true when `key` satisfies the low bound.
fn meets_low(key: i32, low: i32, low_op: ScanOp) -> bool {
    match low_op {
        ScanOp::Gt => key > low,
        ScanOp::Gte => key >= low,
        _ => unreachable!("low bound validated at scan start"),
    }
}

impl BTreeIndex {
    /// Positions a scan on the first entry within the given range.
    ///
    /// Bounds are key bytes, reinterpreted like insert keys. The low
    /// operator must be `Gt`/`Gte` and the high operator `Lt`/`Lte`
    /// (`BadOpcodes` otherwise); the low value must not exceed the high
    /// value (`BadScanrange`); and the range must contain at least one
    /// entry (`NoSuchKeyFound`). On any failure the handle is left with no
    /// active scan. Starting a scan while one is active ends the previous
    /// scan first.
    pub fn start_scan(
        &mut self,
        low: &[u8],
        low_op: ScanOp,
        high: &[u8],
        high_op: ScanOp,
    ) -> Result<()> {
        // A new scan displaces any active one, releasing its pinned leaf.
        self.scan = None;

        if !matches!(low_op, ScanOp::Gt | ScanOp::Gte) {
            return Err(LarchError::BadOpcodes);
        }
        if !matches!(high_op, ScanOp::Lt | ScanOp::Lte) {
            return Err(LarchError::BadOpcodes);
        }

        let low = key_as_i32(low)?;
        let high = key_as_i32(high)?;
        if low > high {
            return Err(LarchError::BadScanrange);
        }

        let buf = self.buf.clone();
        let file = self.file;

        // Descend to the leftmost leaf that could hold a key >= low.
        let mut page_no = self.root_page_no;
        if !self.root_is_leaf {
            loop {
                let guard = buf.pin_page(file, page_no)?;
                let node = InternalNode::from_bytes(&guard.data())?;
                // Take the child pointer before the pin is released.
                let child = node.child_at(node.find_first_ge(low));
                let at_leaf_level = node.level() == 1;
                drop(guard);

                page_no = child;
                if at_leaf_level {
                    break;
                }
            }
        }

        // Walk the leaf chain to the first qualifying entry.
        loop {
            let guard = buf.pin_page(file, page_no)?;
            let leaf = LeafNode::from_bytes(&guard.data())?;

            for idx in 0..LEAF_CAPACITY {
                if !leaf.rid_at(idx).is_valid() {
                    // End of data in this leaf.
                    break;
                }
                let key = leaf.key_at(idx);

                if fails_high(key, high, high_op) {
                    return Err(LarchError::NoSuchKeyFound);
                }
                if meets_low(key, low, low_op) {
                    self.scan = Some(ScanState {
                        low,
                        low_op,
                        high,
                        high_op,
                        page_no,
                        leaf,
                        guard: Some(guard),
                        next_entry: idx,
                        at_end: false,
                    });
                    return Ok(());
                }
            }

            let sibling = leaf.right_sibling();
            drop(guard);
            if sibling == INVALID_PAGE_NO {
                return Err(LarchError::NoSuchKeyFound);
            }
            page_no = sibling;
        }
    }

    /// Returns the next record id in the range.
    ///
    /// Errors with `ScanNotInitialized` when no scan is active and
    /// `IndexScanCompleted` once the range (or the leaf chain) is
    /// exhausted; the scan itself stays active until `end_scan`.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let buf = self.buf.clone();
        let file = self.file;
        let scan = self.scan.as_mut().ok_or(LarchError::ScanNotInitialized)?;

        if scan.at_end {
            return Err(LarchError::IndexScanCompleted);
        }

        let key = scan.leaf.key_at(scan.next_entry);
        let rid = scan.leaf.rid_at(scan.next_entry);

        if fails_high(key, scan.high, scan.high_op) {
            return Err(LarchError::IndexScanCompleted);
        }
        if !rid.is_valid() {
            return Err(LarchError::IndexScanCompleted);
        }
        // Keys ascend from the positioned entry, so the low bound holds
        // for everything the scan yields.
        debug_assert!(meets_low(key, scan.low, scan.low_op));

        scan.next_entry += 1;

        // Leaf exhausted: hop to the right sibling, or mark the chain done.
        if scan.next_entry >= LEAF_CAPACITY || !scan.leaf.rid_at(scan.next_entry).is_valid() {
            let sibling = scan.leaf.right_sibling();
            scan.guard = None;
            if sibling == INVALID_PAGE_NO {
                scan.at_end = true;
            } else {
                trace!(from = scan.page_no, to = sibling, "scan moved to sibling leaf");
                let guard = buf.pin_page(file, sibling)?;
                scan.leaf = LeafNode::from_bytes(&guard.data())?;
                scan.guard = Some(guard);
                scan.page_no = sibling;
                scan.next_entry = 0;
            }
        }

        Ok(rid)
    }

    /// Ends the active scan, releasing its pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        match self.scan.take() {
            Some(_) => Ok(()),
            None => Err(LarchError::ScanNotInitialized),
        }
    }
}
