//! Three keyed, append-only collections assembled from the decoded node
//! stream: inodes, directory entries, and data blocks, each resolved by
//! "higher `sqnum` wins" when the same logical key reappears (UBIFS is
//! log-structured; the same inode or dirent can be rewritten many times).
//!
//! `Inventory::ingest` is the single mutating entry point, in the same
//! shape as `fsfill/src/usage_map.rs`'s `UsageMap::add_extent`/`update` —
//! one method that owns all the conflict-resolution logic, with its own
//! nested `#[cfg(test)] mod tests`.

use std::collections::{BTreeMap, HashMap};

use crate::node::decode::{DentNode, InoNode};
use crate::node::Node;

/// Derived, log-resolved view of an `INO_NODE`.
#[derive(Clone, Debug)]
pub struct InodeRecord {
    pub inum: u32,
    pub sqnum: u64,
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

pub const MODE_TYPE_MASK: u32 = 0xF000;
pub const MODE_REG: u32 = 0x8000;
pub const MODE_DIR: u32 = 0x4000;
pub const MODE_LNK: u32 = 0xA000;

impl InodeRecord {
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_DIR
    }

    pub fn is_regular(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_REG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_LNK
    }
}

impl From<InoNode> for InodeRecord {
    fn from(n: InoNode) -> Self {
        InodeRecord {
            inum: n.inum,
            sqnum: 0,
            size: n.size,
            mode: n.mode,
            uid: n.uid,
            gid: n.gid,
            atime: n.atime,
            mtime: n.mtime,
            ctime: n.ctime,
            nlink: n.nlink,
            flags: n.flags,
            compr_type: n.compr_type,
            inline_data: n.inline_data,
        }
    }
}

/// Derived, log-resolved view of a `DENT_NODE`/`XENT_NODE`.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub parent_inum: u32,
    pub name: String,
    pub target_inum: u64,
    pub dent_type: u8,
    pub sqnum: u64,
}

impl From<(DentNode, u64)> for DirEntry {
    fn from((n, sqnum): (DentNode, u64)) -> Self {
        DirEntry {
            parent_inum: n.parent_inum,
            name: n.name,
            target_inum: n.target_inum,
            dent_type: n.dent_type,
            sqnum,
        }
    }
}

/// Derived, log-resolved view of a `DATA_NODE`.
#[derive(Clone, Debug)]
pub struct DataBlockRecord {
    pub inum: u32,
    pub block_index: u32,
    pub declared_size: u32,
    pub compr_type: u16,
    pub payload: Vec<u8>,
    pub sqnum: u64,
}

/// The three keyed collections spec.md §4.4 names, built up node-by-node in
/// scan order. Immutable once the scan pass finishes.
#[derive(Default, Debug)]
pub struct Inventory {
    pub inodes: HashMap<u32, InodeRecord>,
    pub dir_entries: HashMap<u32, HashMap<String, DirEntry>>,
    pub data_blocks: HashMap<u32, BTreeMap<u32, DataBlockRecord>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one decoded node into the inventory. `sqnum` comes from the
    /// node's common header, not from the payload (only `INO_NODE` also
    /// carries its own `creat_sqnum`, which this crate does not use for
    /// resolution — the header `sqnum` is the UBIFS write-order authority).
    pub fn ingest(&mut self, node: Node, sqnum: u64) {
        match node {
            Node::Ino(ino) => self.ingest_ino(ino, sqnum),
            Node::Dent(dent) => self.ingest_dent(dent, sqnum),
            Node::Xent(xent) => self.ingest_dent(xent, sqnum),
            Node::Data(data) => self.ingest_data(data, sqnum),
            // TRUN/PAD/SB/MST/REF/CS/ORPH/Unknown carry no reconstruction
            // state per spec.md §9; recognized but not consumed.
            _ => {}
        }
    }

    fn ingest_ino(&mut self, ino: InoNode, sqnum: u64) {
        let mut record: InodeRecord = ino.into();
        record.sqnum = sqnum;
        match self.inodes.get(&record.inum) {
            Some(existing) if existing.sqnum >= sqnum => {}
            _ => {
                self.inodes.insert(record.inum, record);
            }
        }
    }

    fn ingest_dent(&mut self, dent: crate::node::decode::DentNode, sqnum: u64) {
        if dent.name == "." || dent.name == ".." {
            return;
        }
        let parent = dent.parent_inum;
        let unlink = dent.target_inum == 0;
        let entry: DirEntry = (dent, sqnum).into();
        let by_name = self.dir_entries.entry(parent).or_default();

        let should_apply = match by_name.get(&entry.name) {
            Some(existing) => existing.sqnum < sqnum,
            None => true,
        };
        if !should_apply {
            return;
        }

        if unlink {
            by_name.remove(&entry.name);
        } else {
            by_name.insert(entry.name.clone(), entry);
        }
    }

    fn ingest_data(&mut self, data: crate::node::decode::DataNode, sqnum: u64) {
        let record = DataBlockRecord {
            inum: data.inum,
            block_index: data.block,
            declared_size: data.size,
            compr_type: data.compr_type,
            payload: data.payload,
            sqnum,
        };
        let by_block = self.data_blocks.entry(record.inum).or_default();
        let should_apply = match by_block.get(&record.block_index) {
            Some(existing) => existing.sqnum < sqnum,
            None => true,
        };
        if should_apply {
            by_block.insert(record.block_index, record);
        }
    }
}
