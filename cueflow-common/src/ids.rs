//! Identifier helpers
//!
//! Task and playlist ids are UUID v7: time-ordered, so their hex form sorts
//! chronologically, which keeps task listings and on-disk exports stable.

use uuid::Uuid;

/// Allocate a new sortable identifier
pub fn new_sortable_id() -> Uuid {
    Uuid::now_v7()
}

/// Derive a deterministic RNG seed from an id and a step index.
///
/// FNV-1a over the id bytes folded with the step, so repeated generation of
/// the same task produces the same perturbation stream at every step.
pub fn seed_for_step(id: &Uuid, step: u64) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in step.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
