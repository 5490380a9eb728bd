//! Payload decode dispatch: `(node_type, payload_bytes) -> Node | DecodeError`.
//!
//! Every node type shares one `bincode` configuration
//! (`DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes()`).
//! Variable tails (names, inline/file data) are sliced from the payload
//! after the fixed prefix decodes.

use bincode::Options;

use super::schema::{
    DataNodeFixed, DentNodeFixed, InoNodeFull, InoNodeStub, DATA_NODE_FIXED_LEN,
    DENT_NODE_FIXED_LEN, INO_NODE_FULL_FIXED_LEN, INO_NODE_STUB_FIXED_LEN,
};

fn bincode_opts() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("node type {node_type} at offset {offset:#x} needs at least {needed} bytes, got {got}")]
    PayloadTooShort {
        offset: u64,
        node_type: u8,
        needed: usize,
        got: usize,
    },
    #[error("directory entry at offset {offset:#x} declares name length {nlen} but only {available} bytes remain")]
    NameOverrun {
        offset: u64,
        nlen: usize,
        available: usize,
    },
    #[error("failed to decode node type {node_type} at offset {offset:#x}: {source}")]
    Bincode {
        offset: u64,
        node_type: u8,
        #[source]
        source: bincode::Error,
    },
}

/// Compression tag carried by `DATA_NODE` and `INO_NODE` payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComprType {
    None,
    Lzo,
    Zlib,
    Zstd,
    Unknown(u16),
}

impl From<u16> for ComprType {
    fn from(value: u16) -> Self {
        match value {
            0 => ComprType::None,
            1 => ComprType::Lzo,
            2 => ComprType::Zlib,
            3 => ComprType::Zstd,
            other => ComprType::Unknown(other),
        }
    }
}

/// Inode metadata decoded from an `INO_NODE`, full or stub.
#[derive(Clone, Debug)]
pub struct InoNode {
    pub inum: u32,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: (u64, u32),
    pub mtime: (u64, u32),
    pub ctime: (u64, u32),
    pub nlink: u32,
    pub flags: u32,
    pub compr_type: u16,
    pub inline_data: Vec<u8>,
}

/// A file-content block decoded from a `DATA_NODE`.
#[derive(Clone, Debug)]
pub struct DataNode {
    pub inum: u32,
    pub block: u32,
    pub size: u32,
    pub compr_type: u16,
    pub compr_size: u16,
    pub payload: Vec<u8>,
}

/// A directory (or extended-attribute) entry decoded from a `DENT_NODE` /
/// `XENT_NODE`.
#[derive(Clone, Debug)]
pub struct DentNode {
    pub parent_inum: u32,
    pub target_inum: u64,
    pub dent_type: u8,
    pub name: String,
}

/// Truncation record; has no on-disk variable tail, so the wire struct
/// doubles as the logical one.
pub type TrunNode = super::schema::TrunNodeFixed;

/// Padding record; has no on-disk variable tail beyond the declared length.
pub type PadNode = super::schema::PadNodeFixed;

#[derive(Clone, Debug)]
pub struct SbNode {
    pub leb_size: u32,
    pub leb_cnt: u32,
    pub fanout: u32,
    pub fmt_version: u32,
    pub default_compr: u16,
    pub uuid: [u8; 16],
}

#[derive(Clone, Debug)]
pub struct MstNode {
    pub highest_inum: u64,
    pub cmt_no: u64,
    pub root_lnum: u32,
    pub root_offs: u32,
    pub root_len: u32,
}

#[derive(Clone, Debug)]
pub struct RefNode {
    pub offs: u32,
    pub lnum: u32,
    pub jhead: u8,
}

#[derive(Clone, Debug)]
pub struct CsNode {
    pub cmt_no: u64,
}

#[derive(Clone, Debug)]
pub struct OrphNode {
    pub cmt_no: u32,
    pub inums: Vec<u64>,
}

/// Every UBIFS node, tagged by its decoded type. `Idx` is never produced —
/// per the resolved Open Question (spec's source notes the original
/// branch-parsing as broken), `IDX_NODE` always decodes as `Unknown`.
#[derive(Clone, Debug)]
pub enum Node {
    Ino(InoNode),
    Data(DataNode),
    Dent(DentNode),
    Xent(DentNode),
    Trun(TrunNode),
    Pad(PadNode),
    Sb(SbNode),
    Mst(MstNode),
    Ref(RefNode),
    Cs(CsNode),
    Orph(OrphNode),
    Unknown(Vec<u8>),
}

/// Decodes a node's payload given its declared `node_type`. Node types
/// outside 0..=11, and `IDX_NODE` (9), decode to `Node::Unknown` rather than
/// erroring — only a structurally malformed payload of a *recognized*,
/// *consumed* type produces a `DecodeError`.
pub fn decode_payload(offset: u64, node_type: u8, payload: &[u8]) -> Result<Node, DecodeError> {
    let opts = bincode_opts();
    match node_type {
        0 => decode_ino(opts, offset, payload).map(Node::Ino),
        1 => decode_data(opts, offset, payload).map(Node::Data),
        2 => decode_dent(opts, offset, 2, payload).map(Node::Dent),
        3 => decode_dent(opts, offset, 3, payload).map(Node::Xent),
        4 => decode_trun(opts, offset, payload).map(Node::Trun),
        5 => decode_pad(offset, payload).map(Node::Pad),
        6 => decode_sb(offset, payload).map(Node::Sb),
        7 => decode_mst(offset, payload).map(Node::Mst),
        8 => decode_ref(offset, payload).map(Node::Ref),
        9 => Ok(Node::Unknown(payload.to_vec())),
        10 => decode_cs(offset, payload).map(Node::Cs),
        11 => decode_orph(offset, payload).map(Node::Orph),
        _ => Ok(Node::Unknown(payload.to_vec())),
    }
}

fn decode_ino(
    opts: impl bincode::Options,
    offset: u64,
    payload: &[u8],
) -> Result<InoNode, DecodeError> {
    if payload.len() >= INO_NODE_FULL_FIXED_LEN {
        let fixed: InoNodeFull = opts
            .deserialize(payload)
            .map_err(|source| DecodeError::Bincode { offset, node_type: 0, source })?;
        let tail = &payload[INO_NODE_FULL_FIXED_LEN..];
        let data_len = (fixed.data_len as usize).min(tail.len());
        Ok(InoNode {
            inum: fixed.key_inum,
            size: fixed.size,
            mode: fixed.mode,
            uid: fixed.uid,
            gid: fixed.gid,
            atime: (fixed.atime_sec, fixed.atime_nsec),
            mtime: (fixed.mtime_sec, fixed.mtime_nsec),
            ctime: (fixed.ctime_sec, fixed.ctime_nsec),
            nlink: fixed.nlink,
            flags: fixed.flags,
            compr_type: fixed.compr_type,
            inline_data: tail[..data_len].to_vec(),
        })
    } else if payload.len() >= INO_NODE_STUB_FIXED_LEN {
        let fixed: InoNodeStub = opts
            .deserialize(payload)
            .map_err(|source| DecodeError::Bincode { offset, node_type: 0, source })?;
        let tail = payload[INO_NODE_STUB_FIXED_LEN..].to_vec();
        Ok(InoNode {
            inum: fixed.key_inum,
            size: fixed.size,
            mode: fixed.mode,
            uid: fixed.uid,
            gid: fixed.gid,
            atime: (fixed.atime_sec, fixed.atime_nsec),
            mtime: (fixed.mtime_sec, fixed.mtime_nsec),
            ctime: (fixed.ctime_sec, fixed.ctime_nsec),
            nlink: fixed.nlink,
            flags: 0,
            compr_type: 0,
            inline_data: tail,
        })
    } else {
        Err(DecodeError::PayloadTooShort {
            offset,
            node_type: 0,
            needed: INO_NODE_STUB_FIXED_LEN,
            got: payload.len(),
        })
    }
}

fn decode_data(
    opts: impl bincode::Options,
    offset: u64,
    payload: &[u8],
) -> Result<DataNode, DecodeError> {
    if payload.len() < DATA_NODE_FIXED_LEN {
        return Err(DecodeError::PayloadTooShort {
            offset,
            node_type: 1,
            needed: DATA_NODE_FIXED_LEN,
            got: payload.len(),
        });
    }
    let fixed: DataNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 1, source })?;
    Ok(DataNode {
        inum: fixed.key_inum,
        block: fixed.key_block,
        size: fixed.size,
        compr_type: fixed.compr_type,
        compr_size: fixed.compr_size,
        payload: payload[DATA_NODE_FIXED_LEN..].to_vec(),
    })
}

fn decode_dent(
    opts: impl bincode::Options,
    offset: u64,
    node_type: u8,
    payload: &[u8],
) -> Result<DentNode, DecodeError> {
    if payload.len() < DENT_NODE_FIXED_LEN {
        return Err(DecodeError::PayloadTooShort {
            offset,
            node_type,
            needed: DENT_NODE_FIXED_LEN,
            got: payload.len(),
        });
    }
    let fixed: DentNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type, source })?;
    let available = payload.len() - DENT_NODE_FIXED_LEN;
    let nlen = fixed.nlen as usize;
    if nlen > available {
        return Err(DecodeError::NameOverrun { offset, nlen, available });
    }
    let name_bytes = &payload[DENT_NODE_FIXED_LEN..DENT_NODE_FIXED_LEN + nlen];
    Ok(DentNode {
        parent_inum: fixed.key_inum,
        target_inum: fixed.inum,
        dent_type: fixed.dent_type,
        name: String::from_utf8_lossy(name_bytes).into_owned(),
    })
}

fn decode_trun(
    opts: impl bincode::Options,
    offset: u64,
    payload: &[u8],
) -> Result<TrunNode, DecodeError> {
    if payload.len() < 24 {
        return Err(DecodeError::PayloadTooShort { offset, node_type: 4, needed: 24, got: payload.len() });
    }
    opts.deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 4, source })
}

fn decode_pad(offset: u64, payload: &[u8]) -> Result<PadNode, DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::PayloadTooShort { offset, node_type: 5, needed: 4, got: payload.len() });
    }
    Ok(PadNode { pad_len: u32::from_le_bytes(payload[0..4].try_into().unwrap()) })
}

fn decode_sb(offset: u64, payload: &[u8]) -> Result<SbNode, DecodeError> {
    let opts = bincode_opts();
    let fixed: super::schema::SbNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 6, source })?;
    Ok(SbNode {
        leb_size: fixed.leb_size,
        leb_cnt: fixed.leb_cnt,
        fanout: fixed.fanout,
        fmt_version: fixed.fmt_version,
        default_compr: fixed.default_compr,
        uuid: fixed.uuid,
    })
}

fn decode_mst(offset: u64, payload: &[u8]) -> Result<MstNode, DecodeError> {
    let opts = bincode_opts();
    let fixed: super::schema::MstNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 7, source })?;
    Ok(MstNode {
        highest_inum: fixed.highest_inum,
        cmt_no: fixed.cmt_no,
        root_lnum: fixed.root_lnum,
        root_offs: fixed.root_offs,
        root_len: fixed.root_len,
    })
}

fn decode_ref(offset: u64, payload: &[u8]) -> Result<RefNode, DecodeError> {
    let opts = bincode_opts();
    let fixed: super::schema::RefNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 8, source })?;
    Ok(RefNode { offs: fixed.offs, lnum: fixed.lnum, jhead: fixed.jhead })
}

fn decode_cs(offset: u64, payload: &[u8]) -> Result<CsNode, DecodeError> {
    let opts = bincode_opts();
    let fixed: super::schema::CsNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 10, source })?;
    Ok(CsNode { cmt_no: fixed.cmt_no })
}

fn decode_orph(offset: u64, payload: &[u8]) -> Result<OrphNode, DecodeError> {
    let opts = bincode_opts();
    let fixed: super::schema::OrphNodeFixed = opts
        .deserialize(payload)
        .map_err(|source| DecodeError::Bincode { offset, node_type: 11, source })?;
    let tail = &payload[8..];
    let inums = tail
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    Ok(OrphNode { cmt_no: fixed.cmt_no, inums })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    fn encode<T: Serialize>(value: &T) -> Vec<u8> {
        bincode_opts().serialize(value).unwrap()
    }

    #[test]
    fn ino_full_roundtrip() {
        let mut fixed = InoNodeFull::default();
        fixed.key_inum = 7;
        fixed.size = 5;
        fixed.mode = 0x8000;
        fixed.uid = 1000;
        fixed.gid = 1000;
        fixed.data_len = 5;
        let mut payload = encode(&fixed);
        payload.extend_from_slice(b"hello");

        let node = decode_payload(0, 0, &payload).unwrap();
        match node {
            Node::Ino(ino) => {
                assert_eq!(ino.inum, 7);
                assert_eq!(ino.size, 5);
                assert_eq!(ino.mode, 0x8000);
                assert_eq!(ino.inline_data, b"hello");
            }
            _ => panic!("expected Ino"),
        }
    }

    #[test]
    fn ino_stub_boundary_84_and_85() {
        let fixed = InoNodeStub {
            key_inum: 3,
            key_block: 0,
            key_tail: [0; 8],
            creat_sqnum: 1,
            size: 4,
            atime_sec: 0,
            ctime_sec: 0,
            mtime_sec: 0,
            atime_nsec: 0,
            ctime_nsec: 0,
            mtime_nsec: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            mode: 0xA000,
        };
        let payload_84 = encode(&fixed);
        assert_eq!(payload_84.len(), INO_NODE_STUB_FIXED_LEN);
        match decode_payload(0, 0, &payload_84).unwrap() {
            Node::Ino(ino) => assert!(ino.inline_data.is_empty()),
            _ => panic!("expected Ino"),
        }

        let mut payload_85 = payload_84.clone();
        payload_85.push(b'/');
        match decode_payload(0, 0, &payload_85).unwrap() {
            Node::Ino(ino) => assert_eq!(ino.inline_data, vec![b'/']),
            _ => panic!("expected Ino"),
        }
    }

    #[test]
    fn ino_too_short_is_decode_error() {
        let payload = vec![0u8; 10];
        assert!(decode_payload(0, 0, &payload).is_err());
    }

    #[test]
    fn dent_name_overrun_is_decode_error() {
        let fixed = DentNodeFixed {
            key_inum: 1,
            key_block: 0,
            key_tail: [0; 8],
            inum: 2,
            padding1: 0,
            dent_type: 0,
            nlen: 100,
            cookie: 0,
        };
        let mut payload = encode(&fixed);
        payload.extend_from_slice(b"a");
        match decode_payload(0, 2, &payload) {
            Err(DecodeError::NameOverrun { .. }) => {}
            other => panic!("expected NameOverrun, got {:?}", other),
        }
    }

    #[test]
    fn dent_name_decodes() {
        let fixed = DentNodeFixed {
            key_inum: 1,
            key_block: 0,
            key_tail: [0; 8],
            inum: 2,
            padding1: 0,
            dent_type: 0,
            nlen: 1,
            cookie: 0,
        };
        let mut payload = encode(&fixed);
        payload.push(b'a');
        match decode_payload(0, 2, &payload).unwrap() {
            Node::Dent(d) => {
                assert_eq!(d.parent_inum, 1);
                assert_eq!(d.target_inum, 2);
                assert_eq!(d.name, "a");
            }
            _ => panic!("expected Dent"),
        }
    }

    #[test]
    fn idx_node_is_always_unknown() {
        let payload = vec![1, 2, 3, 4];
        match decode_payload(0, 9, &payload).unwrap() {
            Node::Unknown(bytes) => assert_eq!(bytes, payload),
            _ => panic!("expected Unknown"),
        }
    }

    #[test]
    fn unrecognized_node_type_is_unknown() {
        let payload = vec![9, 9, 9];
        match decode_payload(0, 200, &payload).unwrap() {
            Node::Unknown(bytes) => assert_eq!(bytes, payload),
            _ => panic!("expected Unknown"),
        }
    }
}
