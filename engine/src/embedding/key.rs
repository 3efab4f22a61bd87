use std::{fmt, hash::Hash, mem};

use bytemuck::Pod;

/// A feature key an embedding table is indexed by.
pub trait Key: Pod + Eq + Hash + Ord + Send + Sync + fmt::Debug + 'static {
    /// The width of the key in bytes, as written to checkpoints.
    const WIDTH: usize = mem::size_of::<Self>();

    /// The key's bits zero-extended to 64 bits.
    fn to_bits(self) -> u64;

    /// The inverse of `to_bits`, `None` if `bits` don't fit the key type.
    fn from_bits(bits: u64) -> Option<Self>;

    /// The index of the shard owning this key out of `shards`.
    fn owner(self, shards: usize) -> usize {
        (mix(self.to_bits()) % shards as u64) as usize
    }
}

impl Key for u32 {
    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Option<Self> {
        u32::try_from(bits).ok()
    }
}

impl Key for i64 {
    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Option<Self> {
        Some(bits as i64)
    }
}

/// The splitmix64 finalizer, so that consecutive keys spread over the shards.
pub(crate) fn mix(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_cover_every_shard() {
        let mut counts = [0usize; 4];
        for key in 0u32..4096 {
            counts[key.owner(4)] += 1;
        }

        assert!(counts.iter().all(|&count| count > 900), "{counts:?}");
    }

    #[test]
    fn bits_round_trip_through_the_key_width() {
        assert_eq!(i64::from_bits((-5i64).to_bits()), Some(-5));
        assert_eq!(u32::from_bits(u64::from(u32::MAX) + 1), None);
        assert_eq!(<u32 as Key>::WIDTH, 4);
        assert_eq!(<i64 as Key>::WIDTH, 8);
    }
}
