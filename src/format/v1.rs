//! Lock version 1: AES-128-GCM with an Argon2id derived key.
//!
//! ```text
//! KDF    Argon2id v0x13 | t=3 | m=65536 KiB | p=4 | 16 byte key
//! CIPHER AES-128-GCM | 12 byte nonce | 16 byte tag | no associated data
//! ```

use crate::crypto::KdfParams;

/// Wire value of this version.
pub const VERSION_V1: u8 = 1;

const MEM_COST_KIB: u32 = 65536;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;

pub(super) const KDF_PARAMS: KdfParams = KdfParams::pinned(MEM_COST_KIB, TIME_COST, PARALLELISM);
