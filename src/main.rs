use std::fs::OpenOptions;
use std::path::PathBuf;

use clap::Parser;

mod array;
mod content;
mod diag;
mod inventory;
mod logger;
mod node;
mod scan;
mod sink;
mod tree;

use content::NoneOnlyDecompressor;
use diag::Diagnostic;
use inventory::Inventory;
use logger::Logger;
use node::{decode_payload, Node};
use scan::{ScanEvent, Scanner};
use sink::{DiskSink, Sink};
use tree::TreeBuilder;

#[derive(Debug, Parser)]
#[clap(name = "ubifs-reconstruct", about = "Reconstructs a UBIFS image's directory tree from raw nodes")]
struct Args {
    /// Path to the raw UBIFS image.
    #[clap(parse(from_os_str), value_name = "IMAGE")]
    image: PathBuf,

    /// Output directory the reconstructed tree is written into (default:
    /// the image file's stem, in the current directory).
    #[clap(short, long, parse(from_os_str), value_name = "DIR")]
    output: Option<PathBuf>,

    /// Additionally dump the reconstructed tree manifest as JSON.
    #[clap(long, parse(from_os_str), value_name = "FILE")]
    dump_json: Option<PathBuf>,

    /// Scan and reconstruct in memory only; print a summary, write nothing.
    #[clap(short, long)]
    report_only: bool,

    /// Set verbosity of the output (can be used multiple times).
    #[clap(short, long, parse(from_occurrences))]
    verbose: u32,

    /// Log file.
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Overrides the maximum directory-tree depth the tree builder will descend.
    #[clap(long, value_name = "DEPTH")]
    max_depth: Option<usize>,

    /// Recover data blocks with no owning inode into `__lost+found/inum-N`
    /// instead of only reporting them as orphaned.
    #[clap(long)]
    recover_orphans: bool,
}

/// Resolved CLI options plus defaults, distinct from the per-run [`Context`].
#[derive(Debug)]
pub struct Config {
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub dump_json_path: Option<PathBuf>,
    pub report_only: bool,
    pub verbosity: u32,
    pub log_file_path: Option<PathBuf>,
    pub max_depth: usize,
    pub recover_orphans: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_path: PathBuf::default(),
            output_path: PathBuf::default(),
            dump_json_path: None,
            report_only: false,
            verbosity: 0,
            log_file_path: None,
            max_depth: tree::DEFAULT_MAX_DEPTH,
            recover_orphans: false,
        }
    }
}

/// Per-run mutable state: the open image handle and the logger.
pub struct Context {
    pub image: std::fs::File,
    pub logger: Logger,
}

/// One manifest entry, serialized by `--dump-json`.
#[derive(serde::Serialize)]
struct ManifestEntry {
    path: String,
    kind: &'static str,
}

fn main() {
    let args = Args::parse();

    let mut cfg = Config {
        image_path: args.image.clone(),
        output_path: args.output.clone().unwrap_or_else(|| default_output_dir(&args.image)),
        dump_json_path: args.dump_json,
        report_only: args.report_only,
        verbosity: args.verbose,
        log_file_path: args.log_file,
        max_depth: args.max_depth.unwrap_or(tree::DEFAULT_MAX_DEPTH),
        recover_orphans: args.recover_orphans,
    };

    let mut log_file = None;

    // Create the log file in rw mode.

    if let Some(path) = &cfg.log_file_path {
        let f = OpenOptions::new().create(true).read(false).write(true).open(path);

        log_file = match f {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("error: {}: {}", path.display(), e);
                cfg.log_file_path = None;
                None
            }
        };
    }

    // Open the image in read-only mode; this tool never writes back to it.

    let image = match OpenOptions::new().create(false).read(true).write(false).open(&cfg.image_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}: {}", cfg.image_path.display(), e);
            return;
        }
    };

    let mut context = Context { image, logger: Logger::new(cfg.verbosity, log_file) };

    if let Err(e) = run(&mut context, &cfg) {
        eprintln!("error: {}", e);
    }
}

fn default_output_dir(image: &PathBuf) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reconstructed".to_string());
    PathBuf::from(stem)
}

fn run(context: &mut Context, cfg: &Config) -> anyhow::Result<()> {
    let scanner = Scanner::new(&mut context.image);

    let mut inventory = Inventory::new();
    let mut node_count = 0usize;
    let mut diag_count = 0usize;

    for event in scanner {
        match event {
            ScanEvent::Node(raw) => match decode_payload(raw.offset, raw.header.node_type, &raw.payload) {
                Ok(node) => {
                    if raw.header.node_type > 11 {
                        context.logger.log_diagnostic(&Diagnostic::UnknownNodeType {
                            offset: raw.offset,
                            node_type: raw.header.node_type,
                        });
                    }
                    if !matches!(node, Node::Unknown(_)) {
                        node_count += 1;
                    }
                    inventory.ingest(node, raw.header.sqnum);
                }
                Err(e) => {
                    diag_count += 1;
                    context
                        .logger
                        .log_diagnostic(&Diagnostic::Decode { offset: raw.offset, reason: e.to_string() });
                }
            },
            ScanEvent::Diagnostic(diag) => {
                diag_count += 1;
                context.logger.log_diagnostic(&diag);
                if diag.is_fatal() {
                    anyhow::bail!("{}", diag);
                }
            }
        }
    }

    let tree = TreeBuilder::new(&inventory).with_max_depth(cfg.max_depth).build();
    for diag in &tree.diagnostics {
        diag_count += 1;
        context.logger.log_diagnostic(diag);
    }

    context.logger.log(
        0,
        &format!(
            "scanned {} nodes, {} diagnostics, {} paths reconstructed",
            node_count,
            diag_count,
            tree.paths_by_inum.len()
        ),
    );

    if let Some(dump_path) = &cfg.dump_json_path {
        let mut entries: Vec<ManifestEntry> = Vec::new();
        for (inum, paths) in &tree.paths_by_inum {
            let Some(record) = inventory.inodes.get(&(*inum as u32)) else { continue };
            let kind = if record.is_dir() {
                "directory"
            } else if record.is_symlink() {
                "symlink"
            } else {
                "file"
            };
            for path in paths {
                entries.push(ManifestEntry { path: path.clone(), kind });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(dump_path, json)?;
    }

    if cfg.report_only {
        return Ok(());
    }

    let decompressor = NoneOnlyDecompressor;
    std::fs::create_dir_all(&cfg.output_path)?;
    let mut disk_sink = DiskSink::new(cfg.output_path.clone());
    sink::materialize_with_options(&mut disk_sink, &tree, &inventory, &decompressor, cfg.recover_orphans, |diag| {
        context.logger.log_diagnostic(&diag);
    });

    Ok(())
}

// Exercises the full pipeline end to end against a synthetic in-memory image,
// using `MemorySink` instead of touching the host filesystem.
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::node::schema::{DataNodeFixed, DentNodeFixed, InoNodeStub};
    use crate::node::{UBIFS_HEADER_SIZE, UBIFS_NODE_MAGIC};
    use crate::sink::{FileObject, MemorySink};
    use bincode::Options;

    fn bincode_opts() -> impl bincode::Options {
        bincode::DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes()
    }

    fn crc_for(sqnum: u64, len: u32, node_type: u8, payload: &[u8]) -> u32 {
        use crc::crc32;
        let table = crc32::make_table(crc32::IEEE);
        let mut tail = sqnum.to_le_bytes().to_vec();
        tail.extend_from_slice(&len.to_le_bytes());
        tail.push(node_type);
        tail.extend_from_slice(&[0, 0, 0]);
        let crc = crc32::update(0xffff_ffff, &table, &tail);
        let crc = crc32::update(crc, &table, payload);
        crc ^ 0xffff_ffff
    }

    fn encode_node(node_type: u8, sqnum: u64, fixed_payload: &[u8]) -> Vec<u8> {
        let len = UBIFS_HEADER_SIZE as u32 + fixed_payload.len() as u32;
        let crc = crc_for(sqnum, len, node_type, fixed_payload);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&UBIFS_NODE_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&sqnum.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.push(node_type);
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(fixed_payload);
        bytes
    }

    fn ino_bytes(inum: u32, mode: u32, size: u64, sqnum: u64) -> Vec<u8> {
        let fixed = InoNodeStub {
            key_inum: inum,
            key_block: 0,
            key_tail: [0; 8],
            creat_sqnum: sqnum,
            size,
            atime_sec: 0,
            ctime_sec: 0,
            mtime_sec: 0,
            atime_nsec: 0,
            ctime_nsec: 0,
            mtime_nsec: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            mode,
        };
        encode_node(0, sqnum, &bincode_opts().serialize(&fixed).unwrap())
    }

    fn symlink_ino_bytes(inum: u32, target: &str, sqnum: u64) -> Vec<u8> {
        let fixed = InoNodeStub {
            key_inum: inum,
            key_block: 0,
            key_tail: [0; 8],
            creat_sqnum: sqnum,
            size: target.len() as u64,
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
        let mut fixed_payload = bincode_opts().serialize(&fixed).unwrap();
        fixed_payload.extend_from_slice(target.as_bytes());
        encode_node(0, sqnum, &fixed_payload)
    }

    fn dent_bytes(parent: u32, target: u64, name: &str, sqnum: u64) -> Vec<u8> {
        let fixed = DentNodeFixed {
            key_inum: parent,
            key_block: 0,
            key_tail: [0; 8],
            inum: target,
            padding1: 0,
            dent_type: 0,
            nlen: name.len() as u16,
            cookie: 0,
        };
        let mut payload = bincode_opts().serialize(&fixed).unwrap();
        payload.extend_from_slice(name.as_bytes());
        encode_node(2, sqnum, &payload)
    }

    fn data_bytes(inum: u32, block: u32, content: &[u8], sqnum: u64) -> Vec<u8> {
        let fixed = DataNodeFixed {
            key_inum: inum,
            key_block: block,
            key_tail: [0; 8],
            size: content.len() as u32,
            compr_type: 0,
            compr_size: content.len() as u16,
        };
        let mut payload = bincode_opts().serialize(&fixed).unwrap();
        payload.extend_from_slice(content);
        encode_node(1, sqnum, &payload)
    }

    fn ingest_all(image: Vec<u8>) -> Inventory {
        let mut cursor = Cursor::new(image);
        let scanner = Scanner::new(&mut cursor);
        let mut inventory = Inventory::new();
        for event in scanner {
            if let ScanEvent::Node(raw) = event {
                if let Ok(node) = decode_payload(raw.offset, raw.header.node_type, &raw.payload) {
                    inventory.ingest(node, raw.header.sqnum);
                }
            }
        }
        inventory
    }

    #[test]
    fn end_to_end_reconstructs_a_small_tree() {
        let mut image = Vec::new();
        image.extend(ino_bytes(1, 0x4000, 0, 1)); // root dir
        image.extend(ino_bytes(2, 0x8000, 5, 2)); // /greeting
        image.extend(dent_bytes(1, 2, "greeting", 3));
        image.extend(data_bytes(2, 0, b"hello", 4));

        let inventory = ingest_all(image);
        let tree = TreeBuilder::new(&inventory).build();
        assert_eq!(tree.canonical_path(2), Some("/greeting"));

        let decompressor = NoneOnlyDecompressor;
        let mut mem = MemorySink::new();
        sink::materialize(&mut mem, &tree, &inventory, &decompressor, |_| {});

        match mem.objects.get("/greeting") {
            Some(FileObject::Regular { content, .. }) => assert_eq!(content, b"hello"),
            other => panic!("expected a regular file, got {:?}", other),
        }
        assert!(matches!(mem.objects.get("/"), Some(FileObject::Directory)));
    }

    #[test]
    fn orphan_dentry_is_reported_and_skipped() {
        let mut image = Vec::new();
        image.extend(ino_bytes(1, 0x4000, 0, 1));
        image.extend(dent_bytes(1, 99, "ghost", 2)); // inode 99 never appears

        let inventory = ingest_all(image);
        let tree = TreeBuilder::new(&inventory).build();
        assert!(tree.diagnostics.iter().any(|d| matches!(d, Diagnostic::OrphanEntry { .. })));
        assert!(tree.canonical_path(99).is_none());
    }

    #[test]
    fn hard_links_materialize_as_extra_paths() {
        let mut image = Vec::new();
        image.extend(ino_bytes(1, 0x4000, 0, 1));
        image.extend(ino_bytes(2, 0x8000, 5, 2));
        image.extend(dent_bytes(1, 2, "a", 3));
        image.extend(dent_bytes(1, 2, "b", 4));
        image.extend(data_bytes(2, 0, b"hello", 5));

        let inventory = ingest_all(image);
        let tree = TreeBuilder::new(&inventory).build();

        let decompressor = NoneOnlyDecompressor;
        let mut mem = MemorySink::new();
        sink::materialize(&mut mem, &tree, &inventory, &decompressor, |_| {});

        assert!(matches!(mem.objects.get("/a"), Some(FileObject::Regular { .. })));
        assert!(matches!(mem.objects.get("/b"), Some(FileObject::HardLink { .. })));
    }

    #[test]
    fn hard_linked_symlink_materializes_both_paths() {
        let mut image = Vec::new();
        image.extend(ino_bytes(1, 0x4000, 0, 1));
        image.extend(symlink_ino_bytes(3, "/tmp", 2));
        image.extend(dent_bytes(1, 3, "l1", 3));
        image.extend(dent_bytes(1, 3, "l2", 4));

        let inventory = ingest_all(image);
        let tree = TreeBuilder::new(&inventory).build();

        let decompressor = NoneOnlyDecompressor;
        let mut mem = MemorySink::new();
        sink::materialize(&mut mem, &tree, &inventory, &decompressor, |_| {});

        assert!(matches!(mem.objects.get("/l1"), Some(FileObject::Symlink { .. })));
        assert!(matches!(mem.objects.get("/l2"), Some(FileObject::HardLink { .. })));
    }

    #[test]
    fn manifest_entries_sort_by_path() {
        let mut entries =
            vec![ManifestEntry { path: "/b".to_string(), kind: "file" }, ManifestEntry { path: "/a".to_string(), kind: "directory" }];
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries[0].path, "/a");
    }
}
