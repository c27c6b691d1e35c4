//! Persistent, AVL-balanced rope.
//!
//! [`Rope`] stores text in a binary tree of immutable nodes. Leaves hold fragments of at most
//! [`LEAF_MAX_LENGTH`](crate::LEAF_MAX_LENGTH) characters; internal nodes cache the length,
//! height and line-break count of their subtree, so indexing, editing and line lookup are all
//! O(log n).
//!
//! # Concurrency
//!
//! The only mutable state is the root pointer, guarded by an [`RwLock`]:
//!
//! - reads hold the read lock just long enough to clone the root `Arc`, then work on that
//!   snapshot without any lock held;
//! - edits hold the write lock while they build the new path and swap the root.
//!
//! Since nodes never change after construction, a reader holding an older root sees a stable
//! document even while a writer is building its replacement.

use crate::error::{BufferError, Result};
use crate::iter::Chars;
use crate::node::{self, Node};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// A thread-safe persistent rope.
///
/// All offsets and lengths are in characters (Unicode scalar values). Every method takes
/// `&self`; a `Rope` can be shared between threads behind an `Arc` and edited concurrently.
/// Cloning is O(1) and yields an independent rope that shares structure with the original.
pub struct Rope {
    root: RwLock<Option<Arc<Node>>>,
}

impl Rope {
    /// Build a balanced rope from `text`.
    pub fn new(text: &str) -> Self {
        Self::from_root(node::build(text))
    }

    fn from_root(root: Option<Arc<Node>>) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    /// Current root, captured under the read lock.
    fn root(&self) -> Option<Arc<Node>> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_root(&self) -> RwLockWriteGuard<'_, Option<Arc<Node>>> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |root| root.len())
    }

    /// Returns `true` if the rope holds no text.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Character at `index`.
    ///
    /// # Errors
    ///
    /// [`BufferError::IndexOutOfRange`] if `index >= self.len()`.
    pub fn char_at(&self, index: usize) -> Result<char> {
        let root = self.root();
        let len = root.as_ref().map_or(0, |root| root.len());
        root.as_deref()
            .filter(|_| index < len)
            .and_then(|root| node::char_at(root, index))
            .ok_or(BufferError::IndexOutOfRange { index, len })
    }

    /// Insert `text` at character offset `index`.
    ///
    /// Empty `text` is a no-op once the index has been validated.
    ///
    /// # Errors
    ///
    /// [`BufferError::IndexOutOfRange`] if `index > self.len()`.
    pub fn insert(&self, index: usize, text: &str) -> Result<()> {
        let mut root = self.write_root();
        let len = root.as_ref().map_or(0, |root| root.len());
        if index > len {
            return Err(BufferError::IndexOutOfRange { index, len });
        }
        if text.is_empty() {
            return Ok(());
        }

        let text_len = text.chars().count();
        let new_root = match root.as_ref() {
            Some(node) => node::insert(node, index, text, text_len),
            None => node::build_with_len(text, text_len),
        };
        *root = Some(new_root);
        Ok(())
    }

    /// Delete `length` characters starting at `index`.
    ///
    /// # Errors
    ///
    /// [`BufferError::RangeOutOfBounds`] if `index + length > self.len()`.
    pub fn delete(&self, index: usize, length: usize) -> Result<()> {
        let mut root = self.write_root();
        let len = root.as_ref().map_or(0, |root| root.len());
        let end = checked_end(index, length, len)?;
        if length == 0 {
            return Ok(());
        }

        let new_root = root
            .as_ref()
            .and_then(|node| node::delete(node, index, end));
        *root = new_root;
        Ok(())
    }

    /// Copy `length` characters starting at `start` into a new `String`.
    ///
    /// # Errors
    ///
    /// [`BufferError::RangeOutOfBounds`] if `start + length > self.len()`.
    pub fn substring(&self, start: usize, length: usize) -> Result<String> {
        let root = self.root();
        let len = root.as_ref().map_or(0, |root| root.len());
        let end = checked_end(start, length, len)?;

        let mut out = String::new();
        if let Some(root) = root.as_deref().filter(|_| length > 0) {
            node::push_range(root, start, end, &mut out);
        }
        Ok(out)
    }

    /// Append the clamped range `[start, start + length)` to `out`.
    ///
    /// Out-of-range starts append nothing; overlong lengths are cut at the end of the text.
    /// Returns the number of characters appended.
    pub(crate) fn push_clamped(&self, start: usize, length: usize, out: &mut String) -> usize {
        let Some(root) = self.root() else {
            return 0;
        };
        if start >= root.len() {
            return 0;
        }
        let end = start.saturating_add(length).min(root.len());
        node::push_range(&root, start, end, out);
        end - start
    }

    /// Rope holding `length` characters starting at `start`.
    ///
    /// The result shares every fully covered subtree with `self`.
    ///
    /// # Errors
    ///
    /// [`BufferError::RangeOutOfBounds`] if `start + length > self.len()`.
    pub fn slice(&self, start: usize, length: usize) -> Result<Rope> {
        let root = self.root();
        let len = root.as_ref().map_or(0, |root| root.len());
        let end = checked_end(start, length, len)?;
        Ok(Self::from_root(
            root.and_then(|root| node::slice(&root, start, end)),
        ))
    }

    /// Append the contents of `other` to the end of this rope in O(log n).
    pub fn append(&self, other: &Rope) {
        let tail = other.root();
        let mut root = self.write_root();
        *root = node::join_opt(root.take(), tail);
    }

    /// Replace the whole contents with a freshly built tree for `text`.
    pub fn replace(&self, text: &str) {
        let new_root = node::build(text);
        *self.write_root() = new_root;
    }

    /// Call `f` for every character, in order.
    pub fn for_each_char(&self, mut f: impl FnMut(char)) {
        if let Some(root) = self.root() {
            node::for_each_chunk(&root, &mut |chunk| chunk.chars().for_each(&mut f));
        }
    }

    /// Iterator over the characters of the current contents.
    pub fn chars(&self) -> Chars {
        Chars::new(self.root())
    }

    /// Number of lines; always at least 1 (`N` line breaks make `N + 1` lines).
    pub fn line_count(&self) -> usize {
        self.root().map_or(0, |root| root.line_breaks()) + 1
    }

    /// Character offset where `line` starts.
    ///
    /// # Errors
    ///
    /// [`BufferError::LineOutOfRange`] if `line >= self.line_count()`.
    pub fn line_to_char(&self, line: usize) -> Result<usize> {
        let root = self.root();
        let line_count = root.as_ref().map_or(0, |root| root.line_breaks()) + 1;
        if line >= line_count {
            return Err(BufferError::LineOutOfRange { line, line_count });
        }
        Ok(match root {
            Some(root) if line > 0 => node::line_break_offset(&root, line) + 1,
            _ => 0,
        })
    }

    /// Zero-based line containing character offset `index`.
    ///
    /// `index == self.len()` is accepted and maps to the last line.
    ///
    /// # Errors
    ///
    /// [`BufferError::IndexOutOfRange`] if `index > self.len()`.
    pub fn char_to_line(&self, index: usize) -> Result<usize> {
        let root = self.root();
        let len = root.as_ref().map_or(0, |root| root.len());
        if index > len {
            return Err(BufferError::IndexOutOfRange { index, len });
        }
        Ok(root.map_or(0, |root| node::line_breaks_before(&root, index)))
    }

    /// Height of the tree (0 when empty, 1 for a single leaf).
    pub fn height(&self) -> usize {
        self.root().map_or(0, |root| root.height())
    }

    /// Returns `true` if every node satisfies the AVL balance condition and every cached
    /// metric matches its subtree.
    ///
    /// This walks the whole tree; it is meant for tests and debugging.
    pub fn is_balanced(&self) -> bool {
        self.root().is_none_or(|root| node::check(&root).is_some())
    }
}

/// Validates `[start, start + length)` against `len` and returns the exclusive end.
fn checked_end(start: usize, length: usize, len: usize) -> Result<usize> {
    match start.checked_add(length) {
        Some(end) if end <= len => Ok(end),
        _ => Err(BufferError::RangeOutOfBounds {
            start,
            end: start.saturating_add(length),
            len,
        }),
    }
}

impl Default for Rope {
    fn default() -> Self {
        Self::from_root(None)
    }
}

impl Clone for Rope {
    fn clone(&self) -> Self {
        Self::from_root(self.root())
    }
}

impl From<&str> for Rope {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Rope {
    fn from(text: String) -> Self {
        Self::new(&text)
    }
}

impl fmt::Display for Rope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            Some(root) => node::try_for_each_chunk(&root, &mut |chunk| f.write_str(chunk)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Rope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self.root();
        f.debug_struct("Rope")
            .field("len", &root.as_ref().map_or(0, |root| root.len()))
            .field("height", &root.as_ref().map_or(0, |root| root.height()))
            .finish()
    }
}

impl PartialEq for Rope {
    fn eq(&self, other: &Self) -> bool {
        let (left, right) = (self.root(), other.root());
        if let (Some(a), Some(b)) = (&left, &right) {
            if Arc::ptr_eq(a, b) {
                return true;
            }
        }
        let (left, right) = (Chars::new(left), Chars::new(right));
        left.len() == right.len() && left.eq(right)
    }
}

impl Eq for Rope {}

impl Hash for Rope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let chars = self.chars();
        state.write_usize(chars.len());
        for ch in chars {
            ch.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    #[test]
    fn test_new_rope() {
        let rope = Rope::new("Hello, World!");
        assert_eq!(rope.to_string(), "Hello, World!");
        assert_eq!(rope.len(), 13);
    }

    #[test]
    fn test_empty_rope() {
        let rope = Rope::new("");
        assert!(rope.is_empty());
        assert_eq!(rope.height(), 0);
        assert_eq!(rope.to_string(), "");
        assert_eq!(rope.line_count(), 1);
    }

    #[test]
    fn test_insert_into_empty_rope() {
        let rope = Rope::default();
        rope.insert(0, "abc").unwrap();
        assert_eq!(rope.to_string(), "abc");
    }

    #[test]
    fn test_insert_empty_text_is_noop() {
        let rope = Rope::new("abc");
        rope.insert(1, "").unwrap();
        assert_eq!(rope.to_string(), "abc");
    }

    #[test]
    fn test_insert_out_of_range() {
        let rope = Rope::new("abc");
        assert_eq!(
            rope.insert(4, "x"),
            Err(BufferError::IndexOutOfRange { index: 4, len: 3 })
        );
    }

    #[test]
    fn test_delete_zero_length_is_noop() {
        let rope = Rope::new("abc");
        rope.delete(3, 0).unwrap();
        assert_eq!(rope.to_string(), "abc");
    }

    #[test]
    fn test_delete_out_of_range() {
        let rope = Rope::new("abc");
        assert_eq!(
            rope.delete(2, 2),
            Err(BufferError::RangeOutOfBounds {
                start: 2,
                end: 4,
                len: 3
            })
        );
        assert!(rope.delete(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_delete_everything() {
        let rope = Rope::new(&"a".repeat(300));
        rope.delete(0, 300).unwrap();
        assert!(rope.is_empty());
        assert_eq!(rope.height(), 0);
    }

    #[test]
    fn test_char_at_bounds() {
        let rope = Rope::new("hi");
        assert_eq!(rope.char_at(1), Ok('i'));
        assert_eq!(
            rope.char_at(2),
            Err(BufferError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert!(Rope::default().char_at(0).is_err());
    }

    #[test]
    fn test_substring_zero_length() {
        let rope = Rope::new("hello");
        assert_eq!(rope.substring(5, 0).unwrap(), "");
        assert!(rope.substring(6, 0).is_err());
    }

    #[test]
    fn test_push_clamped() {
        let rope = Rope::new("hello world");
        let mut out = String::new();
        assert_eq!(rope.push_clamped(6, 100, &mut out), 5);
        assert_eq!(out, "world");
        assert_eq!(rope.push_clamped(11, 1, &mut out), 0);
        assert_eq!(rope.push_clamped(usize::MAX, usize::MAX, &mut out), 0);
    }

    #[test]
    fn test_clone_is_independent() {
        let rope = Rope::new("abc");
        let copy = rope.clone();
        rope.insert(0, "x").unwrap();
        assert_eq!(rope.to_string(), "xabc");
        assert_eq!(copy.to_string(), "abc");
    }

    #[test]
    fn test_append_self() {
        let rope = Rope::new("ab");
        rope.append(&rope.clone());
        rope.append(&rope);
        assert_eq!(rope.to_string(), "abababab");
    }

    #[test]
    fn test_equality_is_by_content() {
        let a = Rope::new(&"x".repeat(100));
        let b = Rope::default();
        for _ in 0..100 {
            b.insert(b.len(), "x").unwrap();
        }
        assert_ne!(a.height(), 0);
        assert_eq!(a, b);
        assert_ne!(a, Rope::new("y"));

        let hash = |rope: &Rope| {
            let mut hasher = DefaultHasher::new();
            rope.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_line_queries() {
        let rope = Rope::new("first\nsecond\n\nlast");
        assert_eq!(rope.line_count(), 4);
        assert_eq!(rope.line_to_char(0), Ok(0));
        assert_eq!(rope.line_to_char(1), Ok(6));
        assert_eq!(rope.line_to_char(2), Ok(13));
        assert_eq!(rope.line_to_char(3), Ok(14));
        assert_eq!(
            rope.line_to_char(4),
            Err(BufferError::LineOutOfRange {
                line: 4,
                line_count: 4
            })
        );
        assert_eq!(rope.char_to_line(0), Ok(0));
        assert_eq!(rope.char_to_line(6), Ok(1));
        assert_eq!(rope.char_to_line(rope.len()), Ok(3));
    }

    #[test]
    fn test_debug_output() {
        let rope = Rope::new("abc");
        assert_eq!(format!("{rope:?}"), "Rope { len: 3, height: 1 }");
    }
}
