//! Compile-time limits shared by the scheduler, pools and batches.

use static_assertions::const_assert;

/// Maximum number of frames in flight.
pub const MAX_FRAMES: usize = 4;

/// Minimum number of frames in flight.
pub const MIN_FRAMES: usize = 2;

/// Maximum submit indices per queue per frame.
///
/// Three groups of this many bits (required / pending / submitted) are packed
/// into a single `u64` per queue, so this must stay at most 21.
pub const MAX_PENDING_BATCHES: usize = 15;

/// Maximum batches retained per frame slot until GPU completion.
pub const MAX_SUBMITTED_BATCHES: usize = 32;

/// Capacity of the shared command batch pool.
pub const BATCH_POOL_CAPACITY: usize = 64;

/// Capacity of the draw batch pool.
pub const DRAW_BATCH_POOL_CAPACITY: usize = 32;

/// Command buffer slots per batch.
pub const MAX_CMD_BUFS_PER_BATCH: usize = 16;

/// Draw command slots per draw batch.
pub const MAX_DRAWS_PER_BATCH: usize = 64;

/// GPU semaphore dependencies per batch, per direction.
pub const MAX_BATCH_DEPS: usize = 8;

/// Native command pools per frame slot per queue.
pub const MAX_CMD_POOLS_PER_QUEUE: usize = 8;

/// Command buffers served by one native pool before the next pool is used.
pub const MAX_CMD_BUFFERS_PER_POOL: usize = 16;

/// Barrier capacity per kind in a [`crate::BarrierAccumulator`].
pub const MAX_BARRIERS: usize = 16;

// The three per-queue bit groups must fit one atomic word.
const_assert!(MAX_PENDING_BATCHES * 3 <= 64);
// Pool occupancy masks are single u64 words.
const_assert!(BATCH_POOL_CAPACITY <= 64);
const_assert!(DRAW_BATCH_POOL_CAPACITY <= 64);
const_assert!(MAX_DRAWS_PER_BATCH <= 64);
// Pool lease bits fit a u32.
const_assert!(MAX_CMD_POOLS_PER_QUEUE <= 32);
// Batch slot counter reserves a lock bit above the index bits.
const_assert!(MAX_CMD_BUFS_PER_BATCH < u32::MAX as usize / 2);
const_assert!(MIN_FRAMES <= MAX_FRAMES);
