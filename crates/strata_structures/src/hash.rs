//! Hashing helpers for the fixed-capacity maps

/// Hash a chunk coordinate triple.
///
/// Prime-multiply-and-XOR spatial hash; neighbouring chunks land far apart,
/// which keeps probe clusters short when the world map is fed with a loaded
/// region's worth of adjacent coordinates.
pub fn spatial_hash(x: i32, y: i32, z: i32) -> u64 {
    let mut hash = 0i64;
    hash ^= x.wrapping_mul(73_856_093) as i64;
    hash ^= y.wrapping_mul(19_349_663) as i64;
    hash ^= z.wrapping_mul(83_492_791) as i64;
    hash as u64
}

/// FNV-1a over raw bytes, for keys without a spatial shape.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_hash_spreads_neighbours() {
        let origin = spatial_hash(0, 0, 0);
        let east = spatial_hash(1, 0, 0);
        let up = spatial_hash(0, 1, 0);

        assert_ne!(origin, east);
        assert_ne!(origin, up);
        assert_ne!(east, up);
    }

    #[test]
    fn test_spatial_hash_handles_negative_coordinates() {
        assert_ne!(spatial_hash(-1, 0, 0), spatial_hash(1, 0, 0));
        assert_ne!(spatial_hash(-3, -7, -11), spatial_hash(3, 7, 11));
    }

    #[test]
    fn test_fnv1a_reference_values() {
        // Known FNV-1a test vectors.
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
