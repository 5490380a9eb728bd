//! Directory-tree assembly: a depth-first walk from inode `1` that assigns
//! every inode one or more paths, tracks additional paths as hard links,
//! and detects cycles.
//!
//! No language-level cycles are needed (spec.md §9): directories are
//! indexed by `inum` in an arena (`Inventory::dir_entries`), and the DFS
//! walks indices, never pointers.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::diag::Diagnostic;
use crate::inventory::Inventory;

pub const ROOT_INUM: u64 = 1;
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// `paths_by_inum` / `children_by_inum` as spec.md §4.5 names them, plus the
/// diagnostics collected along the way (cycles, depth overruns, dangling
/// entries).
#[derive(Default, Debug)]
pub struct ReconstructedTree {
    pub paths_by_inum: HashMap<u64, Vec<String>>,
    pub children_by_inum: HashMap<u64, BTreeMap<String, u64>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReconstructedTree {
    pub fn canonical_path(&self, inum: u64) -> Option<&str> {
        self.paths_by_inum.get(&inum).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn hard_link_paths(&self, inum: u64) -> &[String] {
        self.paths_by_inum.get(&inum).map(|v| &v[1..]).unwrap_or(&[])
    }
}

pub struct TreeBuilder<'a> {
    inventory: &'a Inventory,
    max_depth: usize,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        TreeBuilder { inventory, max_depth: DEFAULT_MAX_DEPTH }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn build(&self) -> ReconstructedTree {
        let mut tree = ReconstructedTree::default();
        let mut visited: HashSet<u64> = HashSet::new();

        if self.inventory.inodes.contains_key(&(ROOT_INUM as u32)) {
            tree.paths_by_inum.entry(ROOT_INUM).or_default().push("/".to_string());
        } else {
            // No root inode observed at all; nothing reachable. Callers
            // still get an empty-but-valid tree rather than an error, since
            // a partial/corrupt image may simply be missing the root.
            return tree;
        }

        self.visit(ROOT_INUM, "/", 0, &mut visited, &mut tree);
        tree
    }

    fn visit(
        &self,
        parent_inum: u64,
        parent_path: &str,
        depth: usize,
        visited: &mut HashSet<u64>,
        tree: &mut ReconstructedTree,
    ) {
        if depth >= self.max_depth {
            tree.diagnostics.push(Diagnostic::PathTooDeep { inum: parent_inum, depth });
            return;
        }
        if !visited.insert(parent_inum) {
            return;
        }

        let Some(entries) = self.inventory.dir_entries.get(&(parent_inum as u32)) else {
            return;
        };

        let mut names: Vec<&String> = entries.keys().collect();
        names.sort();

        for name in names {
            let entry = &entries[name];
            let child_inum = entry.target_inum;

            if !self.inventory.inodes.contains_key(&(child_inum as u32)) {
                tree.diagnostics.push(Diagnostic::OrphanEntry {
                    parent_inum: entry.parent_inum,
                    name: entry.name.clone(),
                    target_inum: child_inum,
                });
                continue;
            }

            let child_path = if parent_path == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", parent_path, name)
            };

            tree.children_by_inum.entry(parent_inum).or_default().insert(name.clone(), child_inum);
            tree.paths_by_inum.entry(child_inum).or_default().push(child_path.clone());

            let is_dir = self
                .inventory
                .inodes
                .get(&(child_inum as u32))
                .map(|rec| rec.is_dir())
                .unwrap_or(false);

            if is_dir {
                if visited.contains(&child_inum) {
                    tree.diagnostics.push(Diagnostic::CycleDetected {
                        parent_inum,
                        name: name.clone(),
                        child_inum,
                    });
                    continue;
                }
                self.visit(child_inum, &child_path, depth + 1, visited, tree);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InodeRecord, Inventory, MODE_DIR, MODE_REG};

    fn mk_inode(inum: u32, mode: u32) -> InodeRecord {
        InodeRecord {
            inum,
            sqnum: 0,
            size: 0,
            mode,
            uid: 0,
            gid: 0,
            atime: (0, 0),
            mtime: (0, 0),
            ctime: (0, 0),
            nlink: 1,
            flags: 0,
            compr_type: 0,
            inline_data: Vec::new(),
        }
    }

    fn link(inv: &mut Inventory, parent: u32, name: &str, target: u64) {
        use crate::inventory::DirEntry;
        inv.dir_entries.entry(parent).or_default().insert(
            name.to_string(),
            DirEntry {
                parent_inum: parent,
                name: name.to_string(),
                target_inum: target,
                dent_type: 0,
                sqnum: 0,
            },
        );
    }

    #[test]
    fn single_file_gets_canonical_path() {
        let mut inv = Inventory::new();
        inv.inodes.insert(1, mk_inode(1, MODE_DIR));
        inv.inodes.insert(2, mk_inode(2, MODE_REG));
        link(&mut inv, 1, "a", 2);

        let tree = TreeBuilder::new(&inv).build();
        assert_eq!(tree.canonical_path(2), Some("/a"));
    }

    #[test]
    fn hard_link_produces_two_paths() {
        let mut inv = Inventory::new();
        inv.inodes.insert(1, mk_inode(1, MODE_DIR));
        inv.inodes.insert(2, mk_inode(2, MODE_REG));
        link(&mut inv, 1, "a", 2);
        link(&mut inv, 1, "b", 2);

        let tree = TreeBuilder::new(&inv).build();
        assert_eq!(tree.paths_by_inum[&2], vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn dangling_entry_reports_orphan() {
        let mut inv = Inventory::new();
        inv.inodes.insert(1, mk_inode(1, MODE_DIR));
        link(&mut inv, 1, "ghost", 99);

        let tree = TreeBuilder::new(&inv).build();
        assert!(tree.paths_by_inum.get(&99).is_none());
        assert!(matches!(tree.diagnostics[0], Diagnostic::OrphanEntry { .. }));
    }

    #[test]
    fn cycle_is_detected_and_dropped() {
        let mut inv = Inventory::new();
        inv.inodes.insert(1, mk_inode(1, MODE_DIR));
        inv.inodes.insert(2, mk_inode(2, MODE_DIR));
        link(&mut inv, 1, "sub", 2);
        link(&mut inv, 2, "loop", 1);

        let tree = TreeBuilder::new(&inv).build();
        assert!(tree.diagnostics.iter().any(|d| matches!(d, Diagnostic::CycleDetected { .. })));
        // The root's own canonical path must survive the cycle report.
        assert_eq!(tree.canonical_path(1), Some("/"));
    }

    #[test]
    fn depth_bound_stops_descent() {
        let mut inv = Inventory::new();
        inv.inodes.insert(1, mk_inode(1, MODE_DIR));
        for i in 2..6u32 {
            inv.inodes.insert(i, mk_inode(i, MODE_DIR));
            link(&mut inv, i - 1, "d", i as u64);
        }
        let tree = TreeBuilder::new(&inv).with_max_depth(2).build();
        assert!(tree.diagnostics.iter().any(|d| matches!(d, Diagnostic::PathTooDeep { .. })));
    }
}
