//! Node-level types shared between the scanner and the decoder: the common
//! header every node starts with, and the raw (still-undecoded) node the
//! scanner hands to [`decode::decode_payload`].

pub mod decode;
pub mod schema;

pub use decode::{decode_payload, ComprType, DecodeError, Node};

/// Magic value at the start of every valid UBIFS node, little-endian.
pub const UBIFS_NODE_MAGIC: u32 = 0x0610_1831;

/// Size in bytes of the common header every node begins with.
pub const UBIFS_HEADER_SIZE: usize = 24;

/// The 24-byte common header shared by every node type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub crc32: u32,
    pub sqnum: u64,
    pub len: u32,
    pub node_type: u8,
    pub group_type: u8,
}

impl Header {
    /// Parses the fixed 24-byte layout. Caller is responsible for checking
    /// `magic` before trusting the rest of the fields.
    pub fn parse(bytes: &[u8; UBIFS_HEADER_SIZE]) -> Self {
        Header {
            magic: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            crc32: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            sqnum: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            len: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            node_type: bytes[20],
            group_type: bytes[21],
        }
    }
}

/// A node as delivered by the scanner: its offset in the image, its parsed
/// header, and its undecoded payload bytes (`header.len - UBIFS_HEADER_SIZE`
/// of them).
#[derive(Clone, Debug)]
pub struct RawNode {
    pub offset: u64,
    pub header: Header,
    pub payload: Vec<u8>,
}
