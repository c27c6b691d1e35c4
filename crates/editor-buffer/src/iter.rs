//! In-order character iteration over a rope snapshot.

use crate::node::Node;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Iterator over the characters of a [`crate::Rope`].
///
/// Owns the root it was created from, so it keeps yielding the text as it was when
/// [`crate::Rope::chars`] was called, regardless of later edits to the rope.
#[derive(Debug, Clone)]
pub struct Chars {
    /// Subtrees still to visit, rightmost at the bottom.
    stack: Vec<Arc<Node>>,
    /// Leaf currently being read and the byte position inside it.
    leaf: Option<(Arc<Node>, usize)>,
    remaining: usize,
}

impl Chars {
    pub(crate) fn new(root: Option<Arc<Node>>) -> Self {
        let remaining = root.as_ref().map_or(0, |node| node.len());
        let mut stack = Vec::with_capacity(root.as_ref().map_or(0, |node| node.height()));
        stack.extend(root);
        Self {
            stack,
            leaf: None,
            remaining,
        }
    }
}

impl Iterator for Chars {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some((leaf, pos)) = self.leaf.as_mut() {
                if let Node::Leaf { text, .. } = leaf.as_ref() {
                    if let Some(ch) = text[*pos..].chars().next() {
                        *pos += ch.len_utf8();
                        self.remaining -= 1;
                        return Some(ch);
                    }
                }
                self.leaf = None;
            }

            let node = self.stack.pop()?;
            match node.as_ref() {
                Node::Leaf { .. } => self.leaf = Some((Arc::clone(&node), 0)),
                Node::Internal { left, right, .. } => {
                    self.stack.push(Arc::clone(right));
                    self.stack.push(Arc::clone(left));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Chars {}

impl FusedIterator for Chars {}

#[cfg(test)]
mod tests {
    use crate::Rope;

    #[test]
    fn test_chars_yields_text_in_order() {
        let text = "The quick brown fox 🦊 jumps over the lazy dog.\n".repeat(20);
        let rope = Rope::new(&text);
        let collected: String = rope.chars().collect();
        assert_eq!(collected, text);
    }

    #[test]
    fn test_chars_reports_exact_len() {
        let rope = Rope::new("你好世界");
        let mut chars = rope.chars();
        assert_eq!(chars.len(), 4);
        chars.next();
        assert_eq!(chars.len(), 3);
    }

    #[test]
    fn test_chars_is_a_stable_snapshot() {
        let rope = Rope::new("abc");
        let chars = rope.chars();
        rope.insert(3, "def").unwrap();
        assert_eq!(chars.collect::<String>(), "abc");
    }

    #[test]
    fn test_chars_on_empty_rope() {
        let rope = Rope::default();
        assert_eq!(rope.chars().next(), None);
    }
}
