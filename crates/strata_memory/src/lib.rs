//! # strata_memory - Fixed-Capacity Memory Allocators
//!
//! Allocators that reserve everything they will ever hand out up front,
//! so no subsystem touches a general-purpose allocator at runtime:
//! - Arena: linear allocation, bulk deallocation
//! - Pool: fixed-capacity slot allocation with LIFO reuse
//! - BuddyAllocator: power-of-two block sub-allocation for GPU heaps
//!
//! None of these are thread-safe; each instance belongs to the single
//! subsystem that owns it. Wrap an instance in a mutex if it must cross
//! threads.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod arena;
pub mod buddy;
pub mod pool;

pub use arena::{Arena, ArenaMark};
pub use buddy::{BuddyAllocation, BuddyAllocator, BuddyError};
pub use pool::{Pool, PoolSlot};

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Align a value down to the given alignment
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

pub mod prelude {
    pub use crate::arena::{Arena, ArenaMark};
    pub use crate::buddy::{BuddyAllocation, BuddyAllocator, BuddyError};
    pub use crate::pool::{Pool, PoolSlot};
    pub use crate::{align_down, align_up};
}
