//! Fixed-width, bit-exact wire layouts for UBIFS node payloads.
//!
//! Every struct here is the bincode-decodable *fixed prefix* of a node's
//! payload (the bytes that immediately follow the 24-byte common header).
//! Variable-length tails (directory names, inline data, file data) are never
//! part of these structs; they are sliced out of the remaining payload bytes
//! by [`super::decode::decode_payload`] after the fixed prefix is decoded.

use serde::{Deserialize, Serialize};

use crate::array::Array;

pub const INO_NODE_FULL_FIXED_LEN: usize = 136;
pub const INO_NODE_STUB_FIXED_LEN: usize = 84;
pub const DATA_NODE_FIXED_LEN: usize = 24;
pub const DENT_NODE_FIXED_LEN: usize = 32;

/// Full (non-degraded) `INO_NODE` fixed prefix, 136 bytes.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InoNodeFull {
    pub key_inum: u32,
    pub key_block: u32,
    pub key_tail: [u8; 8],
    pub creat_sqnum: u64,
    pub size: u64,
    pub atime_sec: u64,
    pub ctime_sec: u64,
    pub mtime_sec: u64,
    pub atime_nsec: u32,
    pub ctime_nsec: u32,
    pub mtime_nsec: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub flags: u32,
    pub data_len: u32,
    pub xattr_cnt: u32,
    pub xattr_size: u32,
    pub padding1: [u8; 4],
    pub xattr_names: u32,
    pub compr_type: u16,
    pub padding2: [u8; 26],
}

/// Reduced `INO_NODE` prefix, 84 bytes, used when the payload is too short
/// for [`InoNodeFull`] but long enough to classify the inode (through
/// `mode`). Fields past `mode` default to zero; see `node/decode.rs`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InoNodeStub {
    pub key_inum: u32,
    pub key_block: u32,
    pub key_tail: [u8; 8],
    pub creat_sqnum: u64,
    pub size: u64,
    pub atime_sec: u64,
    pub ctime_sec: u64,
    pub mtime_sec: u64,
    pub atime_nsec: u32,
    pub ctime_nsec: u32,
    pub mtime_nsec: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataNodeFixed {
    pub key_inum: u32,
    pub key_block: u32,
    pub key_tail: [u8; 8],
    pub size: u32,
    pub compr_type: u16,
    pub compr_size: u16,
}

/// Shared by `DENT_NODE` and `XENT_NODE` — both are the real UBIFS
/// `ubifs_dent_node` struct, just keyed into a different namespace.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DentNodeFixed {
    pub key_inum: u32,
    pub key_block: u32,
    pub key_tail: [u8; 8],
    pub inum: u64,
    pub padding1: u8,
    pub dent_type: u8,
    pub nlen: u16,
    pub cookie: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrunNodeFixed {
    pub inum: u64,
    pub old_size: u64,
    pub new_size: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PadNodeFixed {
    pub pad_len: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SbNodeFixed {
    pub key_hash: u8,
    pub key_fmt: u8,
    pub flags: u16,
    pub min_io_size: u32,
    pub leb_size: u32,
    pub leb_cnt: u32,
    pub max_leb_cnt: u32,
    pub log_lebs: u32,
    pub lpt_lebs: u32,
    pub orph_lebs: u32,
    pub jhead_cnt: u32,
    pub fanout: u32,
    pub lsave_cnt: u32,
    pub fmt_version: u32,
    pub default_compr: u16,
    pub padding: u16,
    pub rp_uid: u32,
    pub rp_gid: u32,
    pub rp_size: u64,
    pub time_gran: u32,
    pub uuid: [u8; 16],
    pub label: Array<u8, 128>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MstNodeFixed {
    pub highest_inum: u64,
    pub cmt_no: u64,
    pub log_lnum: u32,
    pub root_lnum: u32,
    pub root_offs: u32,
    pub root_len: u32,
    pub gc_lnum: u32,
    pub ihead_lnum: u32,
    pub ihead_offs: u32,
    pub index_size: u64,
    pub leb_cnt: u32,
    pub empty_lebs: u32,
    pub idx_lebs: u32,
    pub lpt_lnum: u32,
    pub lpt_offs: u32,
    pub nhead_lnum: u32,
    pub nhead_offs: u32,
    pub ltab_lnum: u32,
    pub ltab_offs: u32,
    pub lsave_lnum: u32,
    pub lsave_offs: u32,
    pub padding: [u8; 32],
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefNodeFixed {
    pub offs: u32,
    pub lnum: u32,
    pub jhead: u8,
    pub padding: [u8; 7],
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CsNodeFixed {
    pub cmt_no: u64,
    pub log_hash: [u8; 32],
    pub padding: [u8; 12],
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrphNodeFixed {
    pub cmt_no: u32,
    pub orph_cnt: u32,
}
