//! MurmurHash3 (x86_32), used both for request hashes and, by
//! `kv-partitioner`, for ring token placement.
//!
//! Hand-rolled rather than pulled from a crate: the algorithm is small,
//! fixed, and needs to match byte-for-byte across every node regardless of
//! which `mmh3`-equivalent crate happens to be available.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Hash `data` with the given `seed`, matching the reference x86_32
/// MurmurHash3 algorithm.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    let nblocks = data.len() / 4;

    for i in 0..nblocks {
        let block = &data[i * 4..i * 4 + 4];
        let mut k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);

        hash ^= k;
        hash = hash.rotate_left(13);
        hash = hash.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = &data[nblocks * 4..];
    let mut k1: u32 = 0;
    match tail.len() {
        3 => {
            k1 ^= (tail[2] as u32) << 16;
            k1 ^= (tail[1] as u32) << 8;
            k1 ^= tail[0] as u32;
        }
        2 => {
            k1 ^= (tail[1] as u32) << 8;
            k1 ^= tail[0] as u32;
        }
        1 => {
            k1 ^= tail[0] as u32;
        }
        _ => {}
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        hash ^= k1;
    }

    hash ^= data.len() as u32;
    hash = fmix32(hash);
    hash
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
