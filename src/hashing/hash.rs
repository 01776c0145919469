use super::Salt;

/// Disperses `key` under `salt` into 32 well-mixed bits.
///
/// The key is folded to 32 bits, passed through the affine map `a * key + b`
/// and finished with the murmur3 32-bit finalizer. Everything wraps, so
/// no input can overflow into a negative bucket.
#[inline]
pub fn mix(key: i64, salt: Salt) -> u32 {
    let key = key as u64;
    let folded = (key ^ (key >> 32)) as u32;

    let mut h = salt.a.wrapping_mul(folded).wrapping_add(salt.b);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Maps `key` into `[0, range)`.
///
/// # Panics
/// If `range` is zero.
#[inline]
pub fn bucket(key: i64, salt: Salt, range: usize) -> usize {
    mix(key, salt) as usize % range
}

/// The pseudo-random sign of `key` under `salt`.
///
/// Taken from the top bit of the mixed value, while `bucket` consumes the
/// residue, so sign and bucket come from the same hash evaluation.
#[inline]
pub fn sign(key: i64, salt: Salt) -> f32 {
    if mix(key, salt) >> 31 == 0 { 1. } else { -1. }
}
