//! Buffer pool for Larch.
//!
//! A fixed set of page frames fronting the paged file layer. Pages are
//! pinned while in use, marked dirty when mutated, and written back only
//! on eviction or an explicit flush.

pub mod frame;
pub mod pool;
pub mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
pub use replacer::ClockReplacer;
