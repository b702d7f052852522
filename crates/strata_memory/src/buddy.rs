//! Buddy allocator - power-of-two block sub-allocation over a fixed extent
//!
//! Splits a memory extent into tiers of power-of-two blocks, halving from
//! `max_alloc_size` down to `min_alloc_size`. An allocation pops a block from
//! its tier's free list, splitting a bigger block when the tier is empty; a
//! free re-merges the block with its buddy whenever both halves are free.
//!
//! The allocator only manages offsets. The extent it describes (a GPU heap,
//! typically) is owned and addressed by the caller; the bookkeeping lives in
//! slices carved once from a caller [`Arena`] and never resized.

use core::fmt;

use crate::arena::Arena;

/// Link terminator for the intrusive free lists. Atom 0 is a valid index, so
/// the all-ones pattern plays the role of null.
const NIL: u32 = u32::MAX;

/// Per-atom bookkeeping. The atom at a block's start carries the state for
/// the whole block.
#[derive(Clone, Copy)]
struct SlotMeta {
    allocated: bool,
    /// Whether prev_idx/next_idx currently link into a free list
    freelist_valid: bool,
    /// Tier this block belongs to (blocks span `1 << pool_idx` atoms)
    pool_idx: u8,
    prev_idx: u32,
    next_idx: u32,
}

impl SlotMeta {
    const UNLINKED: Self = Self {
        allocated: false,
        freelist_valid: false,
        pool_idx: 0,
        prev_idx: NIL,
        next_idx: NIL,
    };
}

/// Doubly-linked free list of one tier, threaded through [`SlotMeta`]
#[derive(Clone, Copy)]
struct FreeList {
    head_idx: u32,
    tail_idx: u32,
}

/// A successful allocation: an offset into the caller's extent and the
/// (rounded-up) block size actually reserved
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BuddyAllocation {
    pub offset: usize,
    pub size: usize,
}

/// Why an allocation could not be served
///
/// Both cases are ordinary runtime conditions for the caller to handle, not
/// bugs: a request can simply be bigger than the largest supported block, or
/// the extent can be full.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuddyError {
    /// The request exceeds `max_alloc_size`
    RequestTooLarge { requested: usize, max: usize },
    /// No free block can satisfy the request
    OutOfMemory,
}

impl fmt::Display for BuddyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuddyError::RequestTooLarge { requested, max } => {
                write!(f, "requested {} bytes, largest block is {}", requested, max)
            }
            BuddyError::OutOfMemory => write!(f, "extent exhausted"),
        }
    }
}

/// Buddy allocator over the extent `[0, total_size)`
pub struct BuddyAllocator<'a> {
    min_alloc_size: usize,
    max_alloc_size: usize,
    total_size: usize,

    /// Number of block tiers: `log2(max/min) + 1`
    pool_count: usize,
    /// Number of min-sized "atoms" in the extent: `total / min`
    atoms_count: usize,

    /// One entry per atom, indexed by `offset / min_alloc_size`
    slots_meta: &'a mut [SlotMeta],
    /// One free list per tier
    free_lists: &'a mut [FreeList],
}

/// `ceil(log2(value))`, with 0 and 1 mapping to 0
#[inline]
fn ceil_log2(value: usize) -> u32 {
    if value <= 1 {
        0
    } else {
        usize::BITS - (value - 1).leading_zeros()
    }
}

impl<'a> BuddyAllocator<'a> {
    /// Set up an allocator for `total_size` bytes served in blocks between
    /// `min_alloc_size` and `max_alloc_size`, with bookkeeping carved from
    /// `metadata_arena`.
    ///
    /// # Panics
    ///
    /// Panics if the three sizes are not powers of two ordered
    /// `min <= max <= total`, if the atom count overflows the `u32` link
    /// indices, or if the arena cannot hold the bookkeeping.
    pub fn new(
        metadata_arena: &'a Arena,
        min_alloc_size: usize,
        max_alloc_size: usize,
        total_size: usize,
    ) -> Self {
        assert!(min_alloc_size.is_power_of_two());
        assert!(max_alloc_size.is_power_of_two());
        assert!(total_size.is_power_of_two());
        assert!(min_alloc_size <= max_alloc_size && max_alloc_size <= total_size);

        let pool_count = 1 + ceil_log2(max_alloc_size / min_alloc_size) as usize;
        let atoms_count = total_size / min_alloc_size;
        // NIL doubles as the null link, so it must not be a reachable index.
        assert!(atoms_count < NIL as usize);

        let slots_meta = metadata_arena.push_slice(atoms_count, SlotMeta::UNLINKED);
        let free_lists = metadata_arena.push_slice(
            pool_count,
            FreeList {
                head_idx: NIL,
                tail_idx: NIL,
            },
        );

        // Seed the top tier with every max-sized block, chained in address
        // order across the whole extent.
        let atoms_per_top_block = max_alloc_size / min_alloc_size;
        let last_block_idx = atoms_count - atoms_per_top_block;
        let mut idx = 0;
        while idx <= last_block_idx {
            let slot = &mut slots_meta[idx];
            slot.freelist_valid = true;
            slot.pool_idx = (pool_count - 1) as u8;
            slot.prev_idx = if idx == 0 {
                NIL
            } else {
                (idx - atoms_per_top_block) as u32
            };
            slot.next_idx = if idx == last_block_idx {
                NIL
            } else {
                (idx + atoms_per_top_block) as u32
            };
            idx += atoms_per_top_block;
        }

        free_lists[pool_count - 1] = FreeList {
            head_idx: 0,
            tail_idx: last_block_idx as u32,
        };

        Self {
            min_alloc_size,
            max_alloc_size,
            total_size,
            pool_count,
            atoms_count,
            slots_meta,
            free_lists,
        }
    }

    /// Reserve a block of at least `size` bytes
    ///
    /// The request is rounded up to the smallest fitting tier. The returned
    /// offset is always aligned to the returned size.
    pub fn alloc(&mut self, size: usize) -> Result<BuddyAllocation, BuddyError> {
        if size > self.max_alloc_size {
            return Err(BuddyError::RequestTooLarge {
                requested: size,
                max: self.max_alloc_size,
            });
        }
        let size = size.max(self.min_alloc_size);

        let desired_pool_idx = (ceil_log2(size) - ceil_log2(self.min_alloc_size)) as usize;

        // Start from the desired tier and go up in block sizes until a free
        // block turns up.
        let mut available_pool_idx = desired_pool_idx;
        let mut slot_idx = NIL;
        while available_pool_idx < self.pool_count {
            slot_idx = self.free_lists[available_pool_idx].head_idx;
            if slot_idx != NIL {
                break;
            }
            available_pool_idx += 1;
        }
        if slot_idx == NIL {
            return Err(BuddyError::OutOfMemory);
        }

        debug_assert!(!self.slots_meta[slot_idx as usize].allocated);
        debug_assert!(self.slots_meta[slot_idx as usize].freelist_valid);
        self.unlink(slot_idx);

        // A block from a larger tier gets subdivided on the way down: keep
        // the left half, hand the right half to the smaller tier's free
        // list. XOR-ing the tier bit of the atom index turns a block into
        // its buddy (in either direction).
        let mut pool_idx = available_pool_idx;
        while pool_idx > desired_pool_idx {
            pool_idx -= 1;
            let buddy_idx = slot_idx ^ (1 << pool_idx);

            let buddy = &mut self.slots_meta[buddy_idx as usize];
            debug_assert!(!buddy.allocated);
            debug_assert!(!buddy.freelist_valid);
            buddy.pool_idx = pool_idx as u8;
            self.push_head(buddy_idx);
        }

        let slot = &mut self.slots_meta[slot_idx as usize];
        slot.allocated = true;
        slot.pool_idx = pool_idx as u8;

        Ok(BuddyAllocation {
            offset: slot_idx as usize * self.min_alloc_size,
            size: self.min_alloc_size << pool_idx,
        })
    }

    /// Release the block starting at `offset`, merging it with free buddies
    /// as far up the tiers as possible
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the extent or does not name a live
    /// allocation (double free, or an offset this allocator never returned).
    pub fn free(&mut self, offset: usize) {
        assert!(offset < self.total_size, "offset {} outside extent", offset);

        let mut slot_idx = (offset / self.min_alloc_size) as u32;
        {
            let slot = &self.slots_meta[slot_idx as usize];
            assert!(
                slot.allocated,
                "freeing offset {} which is not allocated",
                offset
            );
            debug_assert!(!slot.freelist_valid);
        }

        self.slots_meta[slot_idx as usize].allocated = false;

        // Merge with the buddy and climb a tier, repeating while the merged
        // block's buddy is also wholly free.
        let mut pool_idx = self.slots_meta[slot_idx as usize].pool_idx as usize;
        while pool_idx < self.pool_count - 1 {
            let buddy_idx = slot_idx ^ (1 << pool_idx);
            let buddy = &self.slots_meta[buddy_idx as usize];

            // No merge if the buddy is in use, or subdivided with parts of
            // it serving a smaller tier.
            if !buddy.freelist_valid || (buddy.pool_idx as usize) < pool_idx {
                break;
            }
            debug_assert!(!buddy.allocated);
            debug_assert_eq!(buddy.pool_idx as usize, pool_idx);

            self.unlink(buddy_idx);

            // The merged block starts at the lower of the two halves.
            slot_idx = slot_idx.min(buddy_idx);
            pool_idx += 1;
        }

        self.slots_meta[slot_idx as usize].pool_idx = pool_idx as u8;
        self.push_head(slot_idx);
    }

    /// Total bytes currently allocated out of the extent
    pub fn used_space(&self) -> usize {
        self.total_size - self.free_space()
    }

    /// Total bytes sitting on the free lists
    pub fn free_space(&self) -> usize {
        let mut free = 0;
        let mut block_size = self.min_alloc_size;

        for free_list in self.free_lists.iter() {
            let mut idx = free_list.head_idx;
            while idx != NIL {
                let slot = &self.slots_meta[idx as usize];
                debug_assert!(slot.freelist_valid && !slot.allocated);
                free += block_size;
                idx = slot.next_idx;
            }
            block_size *= 2;
        }

        free
    }

    /// Size of the managed extent
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of min-sized atoms in the extent
    pub fn atoms_count(&self) -> usize {
        self.atoms_count
    }

    /// Link a block in as the head of its tier's free list
    fn push_head(&mut self, slot_idx: u32) {
        let pool_idx = self.slots_meta[slot_idx as usize].pool_idx as usize;
        debug_assert_eq!(self.slots_meta[slot_idx as usize].prev_idx, NIL);
        debug_assert_eq!(self.slots_meta[slot_idx as usize].next_idx, NIL);

        let old_head_idx = self.free_lists[pool_idx].head_idx;
        self.free_lists[pool_idx].head_idx = slot_idx;

        if old_head_idx == NIL {
            // The tier was empty; this block is also the tail.
            debug_assert_eq!(self.free_lists[pool_idx].tail_idx, NIL);
            self.free_lists[pool_idx].tail_idx = slot_idx;
        } else {
            self.slots_meta[slot_idx as usize].next_idx = old_head_idx;
            self.slots_meta[old_head_idx as usize].prev_idx = slot_idx;
        }

        self.slots_meta[slot_idx as usize].freelist_valid = true;
    }

    /// Unlink a block from its tier's free list
    fn unlink(&mut self, slot_idx: u32) {
        let (prev_idx, next_idx, pool_idx) = {
            let slot = &self.slots_meta[slot_idx as usize];
            debug_assert!(slot.freelist_valid);
            (slot.prev_idx, slot.next_idx, slot.pool_idx as usize)
        };

        if prev_idx == NIL {
            debug_assert_eq!(self.free_lists[pool_idx].head_idx, slot_idx);
            self.free_lists[pool_idx].head_idx = next_idx;
        } else {
            self.slots_meta[prev_idx as usize].next_idx = next_idx;
        }

        if next_idx == NIL {
            debug_assert_eq!(self.free_lists[pool_idx].tail_idx, slot_idx);
            self.free_lists[pool_idx].tail_idx = prev_idx;
        } else {
            self.slots_meta[next_idx as usize].prev_idx = prev_idx;
        }

        let slot = &mut self.slots_meta[slot_idx as usize];
        slot.prev_idx = NIL;
        slot.next_idx = NIL;
        slot.freelist_valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: usize = 1024;

    fn test_allocator(arena: &Arena) -> BuddyAllocator<'_> {
        BuddyAllocator::new(arena, 4 * KB, 64 * KB, 1024 * KB)
    }

    #[test]
    fn test_initial_state_is_all_free() {
        let arena = Arena::with_capacity_kb(64);
        let allocator = test_allocator(&arena);

        assert_eq!(allocator.free_space(), 1024 * KB);
        assert_eq!(allocator.used_space(), 0);
        assert_eq!(allocator.atoms_count(), 256);
    }

    #[test]
    fn test_sizes_round_up_to_tiers() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        assert_eq!(allocator.alloc(1).unwrap().size, 4 * KB);
        assert_eq!(allocator.alloc(4 * KB).unwrap().size, 4 * KB);
        assert_eq!(allocator.alloc(5 * KB).unwrap().size, 8 * KB);
        assert_eq!(allocator.alloc(64 * KB).unwrap().size, 64 * KB);
    }

    #[test]
    fn test_offsets_are_self_aligned() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        // Fragment a little first so allocations don't all start at zero.
        allocator.alloc(4 * KB).unwrap();
        for _ in 0..5 {
            let allocation = allocator.alloc(16 * KB).unwrap();
            assert_eq!(allocation.offset % allocation.size, 0);
        }
    }

    #[test]
    fn test_alloc_free_cycle_does_not_leak() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        for _ in 0..1000 {
            let allocation = allocator.alloc(8 * KB).unwrap();
            allocator.free(allocation.offset);
        }

        assert_eq!(allocator.free_space(), 1024 * KB);
        // The whole top tier must still be allocatable.
        for _ in 0..16 {
            allocator.alloc(64 * KB).unwrap();
        }
        assert_eq!(allocator.used_space(), 1024 * KB);
    }

    #[test]
    fn test_buddies_coalesce_on_free() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        let first = allocator.alloc(4 * KB).unwrap();
        let second = allocator.alloc(4 * KB).unwrap();
        // Splitting one 64K block produced both halves of each tier.
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 4 * KB);

        allocator.free(first.offset);
        allocator.free(second.offset);

        // Fully coalesced: 16 top-tier blocks must fit again.
        for _ in 0..16 {
            allocator.alloc(64 * KB).unwrap();
        }
    }

    #[test]
    fn test_coalesce_in_reverse_free_order() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        let first = allocator.alloc(4 * KB).unwrap();
        let second = allocator.alloc(4 * KB).unwrap();
        allocator.free(second.offset);
        allocator.free(first.offset);

        for _ in 0..16 {
            allocator.alloc(64 * KB).unwrap();
        }
    }

    #[test]
    fn test_oversized_request_fails_cleanly() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        let result = allocator.alloc(128 * KB);
        assert_eq!(
            result,
            Err(BuddyError::RequestTooLarge {
                requested: 128 * KB,
                max: 64 * KB,
            })
        );
    }

    #[test]
    fn test_exhaustion_fails_cleanly() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        for _ in 0..16 {
            allocator.alloc(64 * KB).unwrap();
        }
        assert_eq!(allocator.alloc(4 * KB), Err(BuddyError::OutOfMemory));
    }

    #[test]
    fn test_partially_split_buddy_does_not_merge() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        // Atoms 0 and 1 are 4K buddies; atom 1's release alone must not
        // climb past its still-allocated buddy.
        let first = allocator.alloc(4 * KB).unwrap();
        let second = allocator.alloc(4 * KB).unwrap();
        allocator.free(second.offset);

        assert_eq!(allocator.used_space(), 4 * KB);
        // The freed half is immediately reusable at its own tier.
        assert_eq!(allocator.alloc(4 * KB).unwrap().offset, second.offset);
        allocator.free(first.offset);
    }

    #[test]
    #[should_panic(expected = "not allocated")]
    fn test_double_free_panics() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        let allocation = allocator.alloc(4 * KB).unwrap();
        allocator.free(allocation.offset);
        allocator.free(allocation.offset);
    }

    #[test]
    fn test_measures_track_allocations() {
        let arena = Arena::with_capacity_kb(64);
        let mut allocator = test_allocator(&arena);

        let a = allocator.alloc(8 * KB).unwrap();
        let b = allocator.alloc(32 * KB).unwrap();
        assert_eq!(allocator.used_space(), 40 * KB);

        allocator.free(a.offset);
        assert_eq!(allocator.used_space(), 32 * KB);
        allocator.free(b.offset);
        assert_eq!(allocator.used_space(), 0);
    }
}
