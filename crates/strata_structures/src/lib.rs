//! # strata_structures - Fixed-Capacity Data Structures
//!
//! Containers sized once at compile time, built for the engine's world and
//! chunk bookkeeping:
//! - RobinHoodMap: open-addressing hashmap with robin-hood insertion and
//!   backward-shift deletion
//! - hash: the hashing helpers the maps are fed with
//!
//! Nothing here resizes or locks; each instance is owned by one subsystem.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod hash;
pub mod robin_hood;

pub use hash::{fnv1a, spatial_hash};
pub use robin_hood::RobinHoodMap;

pub mod prelude {
    pub use crate::hash::{fnv1a, spatial_hash};
    pub use crate::robin_hood::RobinHoodMap;
}
