//! Opaque path addressing into a chapter's move tree.
//!
//! The tree itself is an external collaborator: this module only defines the
//! addressing scheme (two characters per ply, prefix-comparable) and the
//! `MoveTree` seam the engine mutates through, plus an in-memory stand-in
//! used by the server and the tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Identifier of a single tree node, two characters wide.
///
/// Derived deterministically from the move payload so that replaying the same
/// move always addresses the same node, without consulting any chess rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId([u8; 2]);

impl NodeId {
    /// Fold the payload fragments into a two-character id (FNV-1a).
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut h: u32 = 2_166_136_261;
        for part in parts {
            for b in part.bytes() {
                h ^= u32::from(b);
                h = h.wrapping_mul(16_777_619);
            }
            h ^= 0xff;
        }
        let len = ID_ALPHABET.len() as u32;
        NodeId([
            ID_ALPHABET[(h % len) as usize],
            ID_ALPHABET[((h / len) % len) as usize],
        ])
    }

    pub fn as_chars(&self) -> [u8; 2] {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

/// Addressable location in a move tree. The empty path is the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    pub fn root() -> Self {
        Path(String::new())
    }

    /// Parse a client-supplied path. Rejects odd lengths and non-ascii input.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() % 2 != 0 || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Path(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of plies from the root.
    pub fn depth(&self) -> usize {
        self.0.len() / 2
    }

    /// Whether `self` is an ancestor of (or equal to) `other`.
    pub fn contains(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 2].to_string()))
        }
    }

    pub fn child(&self, node: NodeId) -> Path {
        let mut s = self.0.clone();
        let [a, b] = node.as_chars();
        s.push(a as char);
        s.push(b as char);
        Path(s)
    }

    /// The path cut down to at most `depth` plies.
    pub fn truncate(&self, depth: usize) -> Path {
        if self.depth() <= depth {
            self.clone()
        } else {
            Path(self.0[..depth * 2].to_string())
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cursor's location: a chapter and a path inside its tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub chapter_id: Uuid,
    pub path: Path,
}

impl Position {
    pub fn chapter_root(chapter_id: Uuid) -> Self {
        Position {
            chapter_id,
            path: Path::root(),
        }
    }
}

/// The engine's seam onto the externally-owned move tree structure.
pub trait MoveTree: Send + Sync {
    /// Whether `path` addresses an existing node (the root always exists).
    fn contains(&self, path: &Path) -> bool;

    /// Insert a node under `at`, returning the extended path.
    /// `None` when `at` does not address an existing node.
    fn add_node(&mut self, at: &Path, node: NodeId) -> Option<Path>;

    /// The first (mainline) continuation below `at`, if any.
    fn mainline_child(&self, at: &Path) -> Option<Path>;

    /// Every addressable path, root first, shallow before deep.
    fn paths(&self) -> Vec<Path>;
}

/// Factory used when a new chapter needs a fresh tree.
pub type TreeFactory = fn() -> Box<dyn MoveTree>;

/// In-memory tree keeping only the addressing structure. Stands in for the
/// real move-tree collaborator; mainline order is insertion order.
#[derive(Default)]
pub struct InMemoryTree {
    children: HashMap<Path, Vec<NodeId>>,
}

impl InMemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn MoveTree> {
        Box::new(Self::new())
    }
}

impl MoveTree for InMemoryTree {
    fn contains(&self, path: &Path) -> bool {
        if path.is_root() {
            return true;
        }
        match (path.parent(), path.as_str().as_bytes()) {
            (Some(parent), bytes) => {
                let id = NodeId([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
                self.children
                    .get(&parent)
                    .map_or(false, |kids| kids.contains(&id))
            }
            _ => false,
        }
    }

    fn add_node(&mut self, at: &Path, node: NodeId) -> Option<Path> {
        if !self.contains(at) {
            return None;
        }
        let kids = self.children.entry(at.clone()).or_default();
        if !kids.contains(&node) {
            kids.push(node);
        }
        Some(at.child(node))
    }

    fn mainline_child(&self, at: &Path) -> Option<Path> {
        self.children
            .get(at)
            .and_then(|kids| kids.first())
            .map(|id| at.child(*id))
    }

    fn paths(&self) -> Vec<Path> {
        let mut out = vec![Path::root()];
        let mut frontier = vec![Path::root()];
        while let Some(at) = frontier.pop() {
            if let Some(kids) = self.children.get(&at) {
                for id in kids {
                    let child = at.child(*id);
                    out.push(child.clone());
                    frontier.push(child);
                }
            }
        }
        out.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.cmp(b)));
        out
    }
}
