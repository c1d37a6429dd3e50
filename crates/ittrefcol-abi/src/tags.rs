use std::ffi::{c_int, c_uint};

// ── Metadata type tags ───────────────────────────────────
//
// `__itt_metadata_type`. Carried as plain ints across the boundary: a C
// caller can pass any value, so decoding into a Rust enum happens on the
// collector side with a checked conversion.

pub type RawMetadataType = c_int;

pub const METADATA_UNKNOWN: RawMetadataType = 0;
pub const METADATA_U64: RawMetadataType = 1;
pub const METADATA_S64: RawMetadataType = 2;
pub const METADATA_U32: RawMetadataType = 3;
pub const METADATA_S32: RawMetadataType = 4;
pub const METADATA_U16: RawMetadataType = 5;
pub const METADATA_S16: RawMetadataType = 6;
pub const METADATA_FLOAT: RawMetadataType = 7;
pub const METADATA_DOUBLE: RawMetadataType = 8;

// ── Context metadata tags ────────────────────────────────
//
// `__itt_context_type`. The narrow (`A`) variants of the string-valued tags
// are the ones a non-Windows static part sends.

pub type RawContextType = c_int;

pub const CONTEXT_UNKNOWN: RawContextType = 0;
pub const CONTEXT_NAME: RawContextType = 1;
pub const CONTEXT_NAME_W: RawContextType = 2;
pub const CONTEXT_DEVICE: RawContextType = 3;
pub const CONTEXT_DEVICE_W: RawContextType = 4;
pub const CONTEXT_UNITS: RawContextType = 5;
pub const CONTEXT_UNITS_W: RawContextType = 6;
pub const CONTEXT_PCI_ADDR: RawContextType = 7;
pub const CONTEXT_PCI_ADDR_W: RawContextType = 8;
pub const CONTEXT_TID: RawContextType = 9;
pub const CONTEXT_MAX_VAL: RawContextType = 10;
pub const CONTEXT_BANDWIDTH_FLAG: RawContextType = 11;
pub const CONTEXT_LATENCY_FLAG: RawContextType = 12;
pub const CONTEXT_OCCUPANCY_FLAG: RawContextType = 13;
pub const CONTEXT_ON_THREAD_FLAG: RawContextType = 14;
pub const CONTEXT_IS_ABS_VAL_FLAG: RawContextType = 15;
pub const CONTEXT_CPU_INSTRUCTIONS_FLAG: RawContextType = 16;
pub const CONTEXT_CPU_CYCLES_FLAG: RawContextType = 17;

// ── Collection scope ─────────────────────────────────────

pub type RawCollectionScope = c_int;

pub const COLLECTION_SCOPE_HOST: RawCollectionScope = 1 << 0;
pub const COLLECTION_SCOPE_OFFLOAD: RawCollectionScope = 1 << 1;
pub const COLLECTION_SCOPE_ALL: RawCollectionScope = 0x7FFF_FFFF;

// ── API groups ───────────────────────────────────────────

/// `__itt_group_id`, the bitmask a static part passes to `__itt_api_init`.
pub type GroupId = c_uint;

pub const GROUP_NONE: GroupId = 0;
pub const GROUP_LEGACY: GroupId = 1 << 0;
pub const GROUP_CONTROL: GroupId = 1 << 1;
pub const GROUP_THREAD: GroupId = 1 << 2;
pub const GROUP_MARK: GroupId = 1 << 3;
pub const GROUP_SYNC: GroupId = 1 << 4;
pub const GROUP_FSYNC: GroupId = 1 << 5;
pub const GROUP_JIT: GroupId = 1 << 6;
pub const GROUP_ALL: GroupId = GroupId::MAX;

/// `ITT_MAGIC`, written into the head of every `__itt_global`.
pub const ITT_MAGIC: [u8; 8] = [0xED, 0xAB, 0xAB, 0xEC, 0x0D, 0xEE, 0xDA, 0x30];

pub const ITT_MAJOR: u32 = 3;
pub const ITT_MINOR: u32 = 0;
