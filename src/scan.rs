//! The resynchronizing node scanner: turns a seekable byte source into a
//! lazy sequence of raw nodes and diagnostics, advancing by exactly one byte
//! on a bad magic and by exactly `len` bytes after a valid node — mirroring
//! `fsfill/src/filesys/e2fs.rs::process_drive`'s sequential `Seek`+`Read`
//! scan style, generalized from a single superblock read to an open-ended
//! resyncing loop.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};

use crc::crc32;

use crate::diag::Diagnostic;
use crate::node::{Header, RawNode, UBIFS_HEADER_SIZE, UBIFS_NODE_MAGIC};

/// Sanity bound on a node's declared `len`. Chosen generously above any
/// real UBIFS LEB size so legitimate nodes never trip it, while corrupt
/// `len` fields that would otherwise allocate unbounded memory still do.
pub const MAX_NODE_LEN: u32 = 8 * 1024 * 1024;

/// One item out of the scanner: either a successfully framed node, or a
/// diagnostic. `Diagnostic::Truncated` and a malformed `len` both end the
/// scan after being emitted; `Diagnostic::ChecksumMismatch` is emitted
/// immediately before its node and does not stop the scan.
#[derive(Clone, Debug)]
pub enum ScanEvent {
    Node(RawNode),
    Diagnostic(Diagnostic),
}

/// Computes the CRC-32 UBIFS checksums its nodes with: over everything
/// after the `crc32` field itself (`sqnum` through the end of the payload).
/// Follows the teacher's `ext4_style_crc32c_le` pattern of driving
/// `crc::crc32::update` against a precomputed table, adapted to plain
/// CRC-32 (UBIFS does not use the Castagnoli variant ext4 does).
fn compute_node_crc(header_tail: &[u8], payload: &[u8]) -> u32 {
    let table = crc32::make_table(crc32::IEEE);
    let crc = crc32::update(0xffff_ffff, &table, header_tail);
    let crc = crc32::update(crc, &table, payload);
    crc ^ 0xffff_ffff
}

/// Streams nodes out of `reader`, resynchronizing on bad magics. Implements
/// `Iterator<Item = ScanEvent>` so callers can `for event in scanner { ... }`
/// or bail out early simply by not calling `.next()` again (the
/// cancellation model spec'd for this pipeline: pull-based, so "stop
/// polling" *is* cancellation).
pub struct Scanner<R> {
    reader: R,
    offset: u64,
    pending: VecDeque<ScanEvent>,
    done: bool,
}

impl<R: Read + Seek> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Scanner { reader, offset: 0, pending: VecDeque::new(), done: false }
    }

    /// Reads exactly `buf.len()` bytes, or returns `Ok(n) < buf.len()` on a
    /// short read (EOF partway through). A genuine I/O error is distinct from
    /// EOF — it is propagated as `Err` rather than folded into the short-read
    /// count, per spec.md §7's `IoError`/`TruncatedNode` split.
    /// `Interrupted` is retried rather than surfaced, matching `Read::read`'s
    /// own documented contract.
    fn read_best_effort(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn advance_one_byte(&mut self) -> std::io::Result<()> {
        self.offset += 1;
        self.reader.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    fn scan_one(&mut self) -> Option<ScanEvent> {
        loop {
            if self.done {
                return None;
            }

            let start = self.offset;
            let mut header_bytes = [0u8; UBIFS_HEADER_SIZE];
            let filled = match self.read_best_effort(&mut header_bytes) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(ScanEvent::Diagnostic(Diagnostic::IoError {
                        offset: start,
                        reason: e.to_string(),
                    }));
                }
            };
            if filled < UBIFS_HEADER_SIZE {
                // Short read at a node boundary is simply end-of-stream, not
                // an error: spec.md §4.2 step 1.
                self.done = true;
                return None;
            }

            let header = Header::parse(&header_bytes);
            if header.magic != UBIFS_NODE_MAGIC {
                if let Err(e) = self.advance_one_byte() {
                    self.done = true;
                    return Some(ScanEvent::Diagnostic(Diagnostic::IoError {
                        offset: start,
                        reason: e.to_string(),
                    }));
                }
                continue;
            }

            if header.len < UBIFS_HEADER_SIZE as u32 || header.len > MAX_NODE_LEN {
                self.done = true;
                return Some(ScanEvent::Diagnostic(Diagnostic::OversizedNode {
                    offset: start,
                    declared_len: header.len,
                }));
            }

            let payload_len = header.len as usize - UBIFS_HEADER_SIZE;
            let mut payload = vec![0u8; payload_len];
            let got = match self.read_best_effort(&mut payload) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(ScanEvent::Diagnostic(Diagnostic::IoError {
                        offset: start,
                        reason: e.to_string(),
                    }));
                }
            };
            if got < payload_len {
                self.done = true;
                return Some(ScanEvent::Diagnostic(Diagnostic::Truncated {
                    offset: start,
                    declared_len: header.len,
                    available: got,
                }));
            }

            self.offset = start + header.len as u64;

            let computed = compute_node_crc(&header_bytes[8..UBIFS_HEADER_SIZE], &payload);
            if computed != header.crc32 {
                self.pending.push_back(ScanEvent::Diagnostic(Diagnostic::ChecksumMismatch {
                    offset: start,
                    expected: header.crc32,
                    computed,
                }));
            }

            return Some(ScanEvent::Node(RawNode { offset: start, header, payload }));
        }
    }
}

impl<R: Read + Seek> Iterator for Scanner<R> {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<ScanEvent> {
        if let Some(ev) = self.pending.pop_front() {
            return Some(ev);
        }
        self.scan_one()
    }
}
