//! External id encoding and shard routing.
//!
//! An external id packs `(shard, type, offset)` into a single `u64`, least
//! significant bits first: shard (10 bits), type (16 bits), offset (38 bits).
//! Id `0` is reserved for "invalid/null" and decodes to all-zero fields.

/// Width of the shard field, in bits. A build-time constant derived from the
/// maximum supported core count (1024).
pub const SHARD_BITS: u32 = 10;
/// Width of the type field, in bits.
pub const TYPE_BITS: u32 = 16;
/// Width of the offset field, in bits. The remainder of a `u64`.
pub const OFFSET_BITS: u32 = 64 - SHARD_BITS - TYPE_BITS;

const SHARD_MASK: u64 = (1 << SHARD_BITS) - 1;
const TYPE_MASK: u64 = (1 << TYPE_BITS) - 1;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// The reserved "invalid/null" external id.
pub const INVALID_ID: u64 = 0;

/// Pack `(shard, type, offset)` into a 64-bit external id.
///
/// `external = ((offset << TYPE_BITS) | type) << SHARD_BITS | shard`.
pub fn encode(shard: u16, type_id: u16, offset: u64) -> u64 {
    debug_assert!((shard as u64) <= SHARD_MASK);
    debug_assert!((type_id as u64) <= TYPE_MASK);
    debug_assert!(offset <= OFFSET_MASK);
    (((offset << TYPE_BITS) | type_id as u64) << SHARD_BITS) | shard as u64
}

/// Extract the shard field of an external id.
pub fn shard_of(id: u64) -> u16 {
    (id & SHARD_MASK) as u16
}

/// Extract the type field of an external id.
pub fn type_of(id: u64) -> u16 {
    ((id >> SHARD_BITS) & TYPE_MASK) as u16
}

/// Extract the offset field of an external id.
pub fn offset_of(id: u64) -> u64 {
    id >> (SHARD_BITS + TYPE_BITS)
}

/// Decompose an external id into its three fields.
pub fn decode(id: u64) -> (u16, u16, u64) {
    (shard_of(id), type_of(id), offset_of(id))
}

/// Deterministic hash of `type + "-" + key` mapped into `[0, shard_count)` via
/// a wide-multiplication reduction (the "fastrange" trick): the 64-bit hash is
/// widened to 128 bits, multiplied by the shard count, and the high 64 bits
/// are taken as the bucket. This is the same construction ragedb uses with
/// `std::hash`; here the hash itself is `xxh3_64`, a portable, fast, and
/// deterministic 64-bit hash (see DESIGN.md for why `std::hash`'s exact bit
/// pattern is not reproduced).
pub fn shard_for_key(type_name: &str, key: &str, shard_count: u16) -> u16 {
    shard_for_bytes(&route_bytes(type_name, key), shard_count)
}

/// Deterministic hash of `type + "-" + property + "-" + value` used to route
/// content-pivoted find operations to a single shard.
pub fn shard_for_value(type_name: &str, property: &str, value: &str, shard_count: u16) -> u16 {
    let mut buf = String::with_capacity(type_name.len() + property.len() + value.len() + 2);
    buf.push_str(type_name);
    buf.push('-');
    buf.push_str(property);
    buf.push('-');
    buf.push_str(value);
    shard_for_bytes(buf.as_bytes(), shard_count)
}

fn route_bytes(type_name: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(type_name.len() + 1 + key.len());
    buf.extend_from_slice(type_name.as_bytes());
    buf.push(b'-');
    buf.extend_from_slice(key.as_bytes());
    buf
}

fn shard_for_bytes(bytes: &[u8], shard_count: u16) -> u16 {
    let hash = xxhash_rust::xxh3::xxh3_64(bytes);
    (((hash as u128) * (shard_count as u128)) >> 64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_decodes_to_all_zero_fields() {
        assert_eq!(decode(INVALID_ID), (0, 0, 0));
    }

    #[test]
    fn round_trips_arbitrary_fields() {
        for shard in [0u16, 1, 512, 1023] {
            for type_id in [0u16, 1, 1000, u16::MAX] {
                for offset in [0u64, 1, 1 << 20, (1 << OFFSET_BITS) - 1] {
                    let id = encode(shard, type_id, offset);
                    assert_eq!(decode(id), (shard, type_id, offset));
                }
            }
        }
    }

    #[test]
    fn scenario_single_shard_triangle_ids() {
        // Four shards, node type "Node" has id 1. "four", "five", "six" land
        // on shard 0 at offsets 3, 4, 5 (decoding the literal ids from the
        // spec's worked example confirms the offsets, since routing of
        // "four"/"five"/"six" under this type can place them after earlier
        // slots on the same shard).
        assert_eq!(decode(201_327_616), (0, 1, 3));
        assert_eq!(decode(268_436_480), (0, 1, 4));
        assert_eq!(decode(335_545_344), (0, 1, 5));
        assert_eq!(encode(0, 1, 3), 201_327_616);
        assert_eq!(encode(0, 1, 4), 268_436_480);
        assert_eq!(encode(0, 1, 5), 335_545_344);
    }

    #[test]
    fn scenario_cross_shard_routing_is_stable_and_spreads_keys() {
        // Same (type, key) always routes to the same shard, and a handful of
        // distinct keys don't all collide onto one shard.
        let n = 4;
        let keys = ["maxdemarzi", "helene", "alejandro", "tyler", "maxdemarzi1"];
        let shards: Vec<u16> = keys.iter().map(|k| shard_for_key("User", k, n)).collect();
        for (key, shard) in keys.iter().zip(&shards) {
            assert_eq!(shard_for_key("User", key, n), *shard, "routing must be stable for {key}");
        }
        assert!(shards.iter().collect::<std::collections::HashSet<_>>().len() > 1);
        assert!(shards.iter().all(|s| *s < n));
    }

    #[test]
    fn shard_for_key_is_deterministic() {
        let a = shard_for_key("Person", "max", 16);
        let b = shard_for_key("Person", "max", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn shard_for_key_stays_in_range() {
        for n in [1u16, 2, 3, 4, 7, 64, 1023] {
            for key in ["a", "bb", "ccc", "dddd", ""] {
                let s = shard_for_key("T", key, n);
                assert!(s < n, "shard {s} out of range for n={n}");
            }
        }
    }
}
