//! Interning tree for dotted grammar rule names (`Lox.Expr.Binary.Add`).
//!
//! Every rule in the grammar is named hierarchically; the ward interns each
//! `(parent, segment)` pair once so two parse nodes produced by the same
//! rule share a `NameId`, and so name comparisons during evaluation dispatch
//! (matching a node's rule name against `and`/`or`/`call`/...) are `usize`
//! comparisons rather than string comparisons.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(pub usize);

/// The distinguished root of the dotted-name tree. Has no parent and no
/// segment of its own.
pub const ROOT: NameId = NameId(0);

struct NameEntry {
    parent: NameId,
    segment: String,
}

pub struct NameWard {
    entries: Vec<NameEntry>,
    children: HashMap<(NameId, String), NameId>,
}

impl Default for NameWard {
    fn default() -> Self {
        Self::new()
    }
}

impl NameWard {
    pub fn new() -> Self {
        Self {
            entries: vec![NameEntry { parent: ROOT, segment: String::new() }],
            children: HashMap::new(),
        }
    }

    /// Intern `segment` as a child of `parent`, returning the existing id if
    /// this exact (parent, segment) pair was interned before.
    pub fn intern(&mut self, parent: NameId, segment: &str) -> NameId {
        let key = (parent, segment.to_string());
        if let Some(&id) = self.children.get(&key) {
            return id;
        }
        let id = NameId(self.entries.len());
        self.entries.push(NameEntry { parent, segment: segment.to_string() });
        self.children.insert(key, id);
        id
    }

    /// Intern a full dotted path under the root in one call, e.g.
    /// `path(&["Lox", "Expr", "Binary", "Add"])`.
    pub fn path(&mut self, segments: &[&str]) -> NameId {
        let mut id = ROOT;
        for segment in segments {
            id = self.intern(id, segment);
        }
        id
    }

    pub fn parent_of(&self, id: NameId) -> NameId {
        self.entries[id.0].parent
    }

    pub fn segment_of(&self, id: NameId) -> &str {
        &self.entries[id.0].segment
    }

    /// Reconstruct the full dotted name, for debug printing.
    pub fn full_name(&self, id: NameId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while current != ROOT {
            segments.push(self.segment_of(current).to_string());
            current = self.parent_of(current);
        }
        segments.reverse();
        segments.join(".")
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn interns_identical_paths_to_the_same_id() {
        let mut ward = NameWard::new();
        let a = ward.path(&["Lox", "Expr", "Binary", "Add"]);
        let b = ward.path(&["Lox", "Expr", "Binary", "Add"]);
        assert_eq!(a, b);
    }

    #[test]
    fn distinguishes_siblings() {
        let mut ward = NameWard::new();
        let add = ward.path(&["Lox", "Expr", "Binary", "Add"]);
        let sub = ward.path(&["Lox", "Expr", "Binary", "Sub"]);
        assert_ne!(add, sub);
    }

    #[test]
    fn reconstructs_full_dotted_name() {
        let mut ward = NameWard::new();
        let add = ward.path(&["Lox", "Expr", "Binary", "Add"]);
        assert_eq!(ward.full_name(add), "Lox.Expr.Binary.Add");
    }
}
