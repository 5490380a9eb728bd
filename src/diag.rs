use std::fmt;

/// Unified diagnostic taxonomy for the whole pipeline (scan through
/// materialization). Each variant maps to a severity level consumed by
/// [`crate::logger::Logger`]; only [`Diagnostic::IoError`] is fatal per
/// spec.md §7 — every other variant is a warning the run continues past.
#[derive(Clone, Debug)]
pub enum Diagnostic {
    /// The underlying reader failed with a genuine I/O error (not a short
    /// read at end-of-stream). Fatal: distinct from `Truncated`, which is a
    /// normal/corrupt end-of-image condition, not a read failure.
    IoError { offset: u64, reason: String },
    /// Declared node `len` exceeds the bytes remaining in the image. Terminal:
    /// the scan stops after this, but everything collected so far is kept.
    Truncated { offset: u64, declared_len: u32, available: usize },
    /// CRC-32 in the common header disagrees with the computed checksum. The
    /// node is still delivered to the decoder.
    ChecksumMismatch { offset: u64, expected: u32, computed: u32 },
    /// `len` is smaller than the header size or larger than the sanity bound.
    /// Terminal for the current scan position.
    OversizedNode { offset: u64, declared_len: u32 },
    /// `node_type` is not one of 0..=11. The node is wrapped as `Unknown` and
    /// the scan continues.
    UnknownNodeType { offset: u64, node_type: u8 },
    /// The payload was shorter than its schema requires, or a length-prefixed
    /// field (e.g. `nlen`) overran the payload. The node is skipped.
    Decode { offset: u64, reason: String },
    /// A directory entry's `target_inum` has no corresponding inode.
    OrphanEntry { parent_inum: u32, name: String, target_inum: u64 },
    /// A data block's `inum` has no corresponding inode.
    OrphanData { inum: u32, block_index: u32 },
    /// The tree DFS would revisit a directory inode a second time. The extra
    /// edge is dropped.
    CycleDetected { parent_inum: u64, name: String, child_inum: u64 },
    /// A block's declared `compr_type` could not be decompressed. The block
    /// contributes zero bytes and the file is marked degraded.
    Decompression { inum: u64, block_index: u32, reason: String },
    /// A host filesystem operation failed for one materialized path. The run
    /// continues with the remaining paths.
    Materialization { path: String, reason: String },
    /// The tree DFS exceeded its configured depth bound. Descent into the
    /// offending subtree stops.
    PathTooDeep { inum: u64, depth: usize },
}

impl Diagnostic {
    /// Verbosity level at which this diagnostic becomes visible, mirroring
    /// `Logger::log`'s `level` parameter: 0 is always shown, higher numbers
    /// require higher `-v` counts.
    pub fn level(&self) -> u32 {
        match self {
            Diagnostic::IoError { .. } => 0,
            Diagnostic::Truncated { .. } => 0,
            Diagnostic::OversizedNode { .. } => 0,
            Diagnostic::Decode { .. } => 1,
            Diagnostic::ChecksumMismatch { .. } => 1,
            Diagnostic::UnknownNodeType { .. } => 2,
            Diagnostic::OrphanEntry { .. } => 1,
            Diagnostic::OrphanData { .. } => 1,
            Diagnostic::CycleDetected { .. } => 0,
            Diagnostic::Decompression { .. } => 0,
            Diagnostic::Materialization { .. } => 0,
            Diagnostic::PathTooDeep { .. } => 0,
        }
    }

    /// Whether this diagnostic is spec.md §7's `IoError` category: fatal, the
    /// caller must abort the run rather than continue with partial results.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Diagnostic::IoError { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Diagnostic::IoError { offset, reason } => write!(
                f,
                "I/O error reading the image at 0x{:x}: {}",
                offset, reason
            ),
            Diagnostic::Truncated { offset, declared_len, available } => write!(
                f,
                "truncated node at 0x{:x}: declared len {} but only {} bytes remain",
                offset, declared_len, available
            ),
            Diagnostic::ChecksumMismatch { offset, expected, computed } => write!(
                f,
                "checksum mismatch at 0x{:x}: header says {:#010x}, computed {:#010x}",
                offset, expected, computed
            ),
            Diagnostic::OversizedNode { offset, declared_len } => write!(
                f,
                "invalid node length at 0x{:x}: {} bytes",
                offset, declared_len
            ),
            Diagnostic::UnknownNodeType { offset, node_type } => write!(
                f,
                "unknown node type {} at 0x{:x}",
                node_type, offset
            ),
            Diagnostic::Decode { offset, reason } => write!(
                f,
                "decode error at 0x{:x}: {}",
                offset, reason
            ),
            Diagnostic::OrphanEntry { parent_inum, name, target_inum } => write!(
                f,
                "dangling directory entry \"{}\" in parent {}: target inode {} not found",
                name, parent_inum, target_inum
            ),
            Diagnostic::OrphanData { inum, block_index } => write!(
                f,
                "data block {} of inode {} has no owning inode",
                block_index, inum
            ),
            Diagnostic::CycleDetected { parent_inum, name, child_inum } => write!(
                f,
                "cycle detected: \"{}\" in directory {} would revisit directory {}",
                name, parent_inum, child_inum
            ),
            Diagnostic::Decompression { inum, block_index, reason } => write!(
                f,
                "failed to decompress block {} of inode {}: {}",
                block_index, inum, reason
            ),
            Diagnostic::Materialization { path, reason } => write!(
                f,
                "failed to materialize {}: {}",
                path, reason
            ),
            Diagnostic::PathTooDeep { inum, depth } => write!(
                f,
                "inode {} exceeds the maximum tree depth ({})",
                inum, depth
            ),
        }
    }
}
