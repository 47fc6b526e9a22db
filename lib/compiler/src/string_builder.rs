//! A tree-shaped string builder whose leaves can be placeholders, filled in
//! or replaced after the surrounding text has already been written.
//!
//! Grounded on `tracker-string-builder.c`'s chunked rope: appending never
//! moves already-written bytes, and a placeholder obtained early in a
//! compilation pass can be spliced with text discovered much later (e.g. a
//! `WHERE` clause whose `JOIN`s are only known once the whole pattern has
//! been walked).

/// Handle to a node in a [`StringBuilder`]. Indices are stable for the
/// lifetime of the builder; nodes are never removed, only rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
enum Elem {
    Text(String),
    Child(NodeId),
}

/// An ordered, composable fragment of SQL text under construction.
///
/// The root node (returned by [`StringBuilder::new`]) is always `NodeId(0)`.
/// Every other node is reachable from it through a chain of [`Elem::Child`]
/// links, so `linearize` never needs to worry about orphans.
#[derive(Debug)]
pub struct StringBuilder {
    nodes: Vec<Vec<Elem>>,
}

impl Default for StringBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringBuilder {
    pub fn new() -> Self {
        Self { nodes: vec![Vec::new()] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Appends literal text at the end of `at`'s children.
    pub fn append(&mut self, at: NodeId, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            return;
        }
        let children = &mut self.nodes[at.0];
        if let Some(Elem::Text(last)) = children.last_mut() {
            last.push_str(text);
        } else {
            children.push(Elem::Text(text.to_owned()));
        }
    }

    /// Inserts literal text before `at`'s existing children.
    pub fn prepend(&mut self, at: NodeId, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            return;
        }
        let children = &mut self.nodes[at.0];
        if let Some(Elem::Text(first)) = children.first_mut() {
            first.insert_str(0, text);
        } else {
            children.insert(0, Elem::Text(text.to_owned()));
        }
    }

    /// Opens a new placeholder node at the end of `at`'s children and
    /// returns a handle that can be written into independently, after `at`
    /// has moved on to emitting later text.
    pub fn append_placeholder(&mut self, at: NodeId) -> NodeId {
        let child = self.new_node();
        self.nodes[at.0].push(Elem::Child(child));
        child
    }

    /// Like [`Self::append_placeholder`], but the new node is spliced in
    /// before `at`'s existing children.
    pub fn prepend_placeholder(&mut self, at: NodeId) -> NodeId {
        let child = self.new_node();
        self.nodes[at.0].insert(0, Elem::Child(child));
        child
    }

    /// Replaces everything written to `at` so far with `replacement`,
    /// returning a detached node holding what used to be there. Used when a
    /// later pass learns that an earlier fragment needs to be wrapped (e.g.
    /// a bare column reference turns out to need a `CAST`).
    pub fn swap_current(&mut self, at: NodeId, replacement: impl Into<String>) -> NodeId {
        let old = std::mem::replace(&mut self.nodes[at.0], vec![Elem::Text(replacement.into())]);
        let detached = self.new_node();
        self.nodes[detached.0] = old;
        detached
    }

    pub fn is_empty(&self, at: NodeId) -> bool {
        self.nodes[at.0].iter().all(|elem| match elem {
            Elem::Text(text) => text.is_empty(),
            Elem::Child(child) => self.is_empty(*child),
        })
    }

    /// Flattens the whole tree, starting at the root, into the final SQL
    /// string.
    pub fn linearize(&self) -> String {
        let mut out = String::new();
        self.linearize_into(self.root(), &mut out);
        out
    }

    fn linearize_into(&self, at: NodeId, out: &mut String) {
        for elem in &self.nodes[at.0] {
            match elem {
                Elem::Text(text) => out.push_str(text),
                Elem::Child(child) => self.linearize_into(*child, out),
            }
        }
    }

    fn new_node(&mut self) -> NodeId {
        self.nodes.push(Vec::new());
        NodeId(self.nodes.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linearizes_flat_appends() {
        let mut sb = StringBuilder::new();
        let root = sb.root();
        sb.append(root, "SELECT ");
        sb.append(root, "1");
        assert_eq!(sb.linearize(), "SELECT 1");
    }

    #[test]
    fn placeholder_fills_after_later_writes() {
        let mut sb = StringBuilder::new();
        let root = sb.root();
        sb.append(root, "SELECT * FROM t WHERE ");
        let where_clause = sb.append_placeholder(root);
        sb.append(root, " LIMIT 10");
        sb.append(where_clause, "t.id = 1");
        assert_eq!(sb.linearize(), "SELECT * FROM t WHERE t.id = 1 LIMIT 10");
    }

    #[test]
    fn prepend_inserts_before_existing_text() {
        let mut sb = StringBuilder::new();
        let root = sb.root();
        sb.append(root, "World");
        sb.prepend(root, "Hello, ");
        assert_eq!(sb.linearize(), "Hello, World");
    }

    #[test]
    fn swap_current_preserves_old_content_in_detached_node() {
        let mut sb = StringBuilder::new();
        let root = sb.root();
        sb.append(root, "\"col\"");
        let old = sb.swap_current(root, "CAST(");
        sb.append(root, " AS INTEGER)");
        assert_eq!(sb.linearize(), "CAST( AS INTEGER)");
        let mut rescued = String::new();
        sb.linearize_into(old, &mut rescued);
        assert_eq!(rescued, "\"col\"");
    }

    #[test]
    fn is_empty_is_true_for_untouched_placeholder() {
        let mut sb = StringBuilder::new();
        let root = sb.root();
        let child = sb.append_placeholder(root);
        assert!(sb.is_empty(child));
        sb.append(child, "x");
        assert!(!sb.is_empty(child));
    }
}
