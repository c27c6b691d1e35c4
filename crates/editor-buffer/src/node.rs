//! Immutable rope nodes and the AVL tree algorithms over them.
//!
//! Every function in this module takes shared node references and returns freshly allocated
//! nodes for the path it touches. Subtrees outside that path are reused through `Arc`, so an
//! older root keeps describing exactly the text it described when it was captured.
//!
//! Offsets are **character offsets** (Unicode scalar values), relative to the node they are
//! passed to. Callers validate ranges against the root before descending.

use std::sync::Arc;

/// Maximum number of characters stored in a single leaf.
pub const LEAF_MAX_LENGTH: usize = 48;

/// A rope node: either a text fragment or a pair of subtrees.
#[derive(Debug)]
pub(crate) enum Node {
    /// A non-empty fragment of at most [`LEAF_MAX_LENGTH`] characters.
    Leaf {
        text: String,
        len: usize,
        line_breaks: usize,
    },
    /// Two subtrees; the node holds no text of its own.
    Internal {
        left: Arc<Node>,
        right: Arc<Node>,
        len: usize,
        height: usize,
        line_breaks: usize,
    },
}

impl Node {
    fn leaf(text: String, len: usize) -> Arc<Node> {
        debug_assert!(len > 0 && len <= LEAF_MAX_LENGTH);
        debug_assert_eq!(text.chars().count(), len);
        let line_breaks = count_line_breaks(&text);
        Arc::new(Node::Leaf {
            text,
            len,
            line_breaks,
        })
    }

    fn internal(left: Arc<Node>, right: Arc<Node>) -> Arc<Node> {
        let len = left.len() + right.len();
        let height = 1 + left.height().max(right.height());
        let line_breaks = left.line_breaks() + right.line_breaks();
        Arc::new(Node::Internal {
            left,
            right,
            len,
            height,
            line_breaks,
        })
    }

    /// Number of characters in this subtree.
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Leaf { len, .. } | Node::Internal { len, .. } => *len,
        }
    }

    /// Height of this subtree; a leaf has height 1.
    pub(crate) fn height(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Internal { height, .. } => *height,
        }
    }

    /// Number of `'\n'` characters in this subtree.
    pub(crate) fn line_breaks(&self) -> usize {
        match self {
            Node::Leaf { line_breaks, .. } | Node::Internal { line_breaks, .. } => *line_breaks,
        }
    }

    /// Left height minus right height (0 for leaves).
    pub(crate) fn balance_factor(&self) -> isize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { left, right, .. } => left.height() as isize - right.height() as isize,
        }
    }
}

fn count_line_breaks(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// Byte offset of the `char_idx`-th character, or `text.len()` past the end.
fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(byte, _)| byte)
}

/// Builds a balanced tree from `text`. Returns `None` for empty text.
pub(crate) fn build(text: &str) -> Option<Arc<Node>> {
    if text.is_empty() {
        return None;
    }
    Some(build_with_len(text, text.chars().count()))
}

/// Builds a balanced tree from non-empty `text` whose character count is already known.
pub(crate) fn build_with_len(text: &str, len: usize) -> Arc<Node> {
    if len <= LEAF_MAX_LENGTH {
        return Node::leaf(text.to_string(), len);
    }

    let mid = len / 2;
    let (head, tail) = text.split_at(byte_offset(text, mid));
    Node::internal(build_with_len(head, mid), build_with_len(tail, len - mid))
}

/// Returns the character at `index`, or `None` if `index >= node.len()`.
pub(crate) fn char_at(mut node: &Node, mut index: usize) -> Option<char> {
    loop {
        match node {
            Node::Leaf { text, .. } => return text.chars().nth(index),
            Node::Internal { left, right, .. } => {
                if index < left.len() {
                    node = left;
                } else {
                    index -= left.len();
                    node = right;
                }
            }
        }
    }
}

/// Inserts `text` (of `text_len` characters, non-empty) at `index <= node.len()`.
pub(crate) fn insert(node: &Arc<Node>, index: usize, text: &str, text_len: usize) -> Arc<Node> {
    match node.as_ref() {
        Node::Leaf {
            text: data, len, ..
        } => {
            let at = byte_offset(data, index);
            if len + text_len <= LEAF_MAX_LENGTH {
                let mut spliced = String::with_capacity(data.len() + text.len());
                spliced.push_str(&data[..at]);
                spliced.push_str(text);
                spliced.push_str(&data[at..]);
                return Node::leaf(spliced, len + text_len);
            }

            // Overflow: split the fragment at `index`, the inserted text goes after the head.
            let mut head = String::with_capacity(at + text.len());
            head.push_str(&data[..at]);
            head.push_str(text);
            let head = build_with_len(&head, index + text_len);

            let tail = &data[at..];
            if tail.is_empty() {
                head
            } else {
                join(head, Node::leaf(tail.to_string(), len - index))
            }
        }
        Node::Internal { left, right, .. } => {
            if index <= left.len() {
                join(insert(left, index, text, text_len), Arc::clone(right))
            } else {
                join(
                    Arc::clone(left),
                    insert(right, index - left.len(), text, text_len),
                )
            }
        }
    }
}

/// Removes `[start, end)` from the subtree. Returns `None` when nothing remains.
///
/// Requires `start < end <= node.len()`.
pub(crate) fn delete(node: &Arc<Node>, start: usize, end: usize) -> Option<Arc<Node>> {
    if start == 0 && end >= node.len() {
        return None;
    }

    match node.as_ref() {
        Node::Leaf { text, len, .. } => {
            let from = byte_offset(text, start);
            let to = byte_offset(text, end);
            let mut kept = String::with_capacity(text.len() - (to - from));
            kept.push_str(&text[..from]);
            kept.push_str(&text[to..]);
            Some(Node::leaf(kept, len - (end - start)))
        }
        Node::Internal { left, right, .. } => {
            let split = left.len();
            let new_left = if start < split {
                delete(left, start, end.min(split))
            } else {
                Some(Arc::clone(left))
            };
            let new_right = if end > split {
                delete(right, start.saturating_sub(split), end - split)
            } else {
                Some(Arc::clone(right))
            };
            join_opt(new_left, new_right)
        }
    }
}

/// Returns a tree holding `[start, end)` of the subtree, sharing every fully covered child.
pub(crate) fn slice(node: &Arc<Node>, start: usize, end: usize) -> Option<Arc<Node>> {
    if start >= end {
        return None;
    }
    if start == 0 && end >= node.len() {
        return Some(Arc::clone(node));
    }

    match node.as_ref() {
        Node::Leaf { text, .. } => {
            let from = byte_offset(text, start);
            let to = byte_offset(text, end);
            Some(Node::leaf(text[from..to].to_string(), end - start))
        }
        Node::Internal { left, right, .. } => {
            let split = left.len();
            let head = if start < split {
                slice(left, start, end.min(split))
            } else {
                None
            };
            let tail = if end > split {
                slice(right, start.saturating_sub(split), end - split)
            } else {
                None
            };
            join_opt(head, tail)
        }
    }
}

/// Concatenates two optional trees.
pub(crate) fn join_opt(left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Option<Arc<Node>> {
    match (left, right) {
        (Some(left), Some(right)) => Some(join(left, right)),
        (left, None) => left,
        (None, right) => right,
    }
}

/// Concatenates two balanced trees into one balanced tree.
///
/// When the heights differ by more than one, descends along the inner spine of the taller
/// tree until the heights match, then rebalances on the way back up. Cost is proportional to
/// the height difference.
pub(crate) fn join(left: Arc<Node>, right: Arc<Node>) -> Arc<Node> {
    let (left_height, right_height) = (left.height(), right.height());

    if left_height > right_height + 1 {
        if let Node::Internal {
            left: outer,
            right: inner,
            ..
        } = left.as_ref()
        {
            return rebalance(Arc::clone(outer), join(Arc::clone(inner), right));
        }
    } else if right_height > left_height + 1 {
        if let Node::Internal {
            left: inner,
            right: outer,
            ..
        } = right.as_ref()
        {
            return rebalance(join(left, Arc::clone(inner)), Arc::clone(outer));
        }
    }

    Node::internal(left, right)
}

/// Builds an internal node from two balanced children whose heights differ by at most two,
/// rotating when the result would be unbalanced.
fn rebalance(left: Arc<Node>, right: Arc<Node>) -> Arc<Node> {
    let (left_height, right_height) = (left.height(), right.height());

    if left_height > right_height + 1 {
        if let Node::Internal {
            left: ll, right: lr, ..
        } = left.as_ref()
        {
            if ll.height() >= lr.height() {
                return rotate_right(ll, lr, right);
            }
            if let Node::Internal {
                left: lrl,
                right: lrr,
                ..
            } = lr.as_ref()
            {
                // Left-right: rotate the left child left, then the node right.
                return Node::internal(
                    Node::internal(Arc::clone(ll), Arc::clone(lrl)),
                    Node::internal(Arc::clone(lrr), right),
                );
            }
        }
    } else if right_height > left_height + 1 {
        if let Node::Internal {
            left: rl, right: rr, ..
        } = right.as_ref()
        {
            if rr.height() >= rl.height() {
                return rotate_left(left, rl, rr);
            }
            if let Node::Internal {
                left: rll,
                right: rlr,
                ..
            } = rl.as_ref()
            {
                // Right-left: rotate the right child right, then the node left.
                return Node::internal(
                    Node::internal(left, Arc::clone(rll)),
                    Node::internal(Arc::clone(rlr), Arc::clone(rr)),
                );
            }
        }
    }

    Node::internal(left, right)
}

/// `((ll, lr), right)` becomes `(ll, (lr, right))`.
fn rotate_right(ll: &Arc<Node>, lr: &Arc<Node>, right: Arc<Node>) -> Arc<Node> {
    Node::internal(Arc::clone(ll), Node::internal(Arc::clone(lr), right))
}

/// `(left, (rl, rr))` becomes `((left, rl), rr)`.
fn rotate_left(left: Arc<Node>, rl: &Arc<Node>, rr: &Arc<Node>) -> Arc<Node> {
    Node::internal(Node::internal(left, Arc::clone(rl)), Arc::clone(rr))
}

/// Appends the characters `[start, end)` of the subtree to `out`.
pub(crate) fn push_range(node: &Node, start: usize, end: usize, out: &mut String) {
    match node {
        Node::Leaf { text, .. } => {
            let from = byte_offset(text, start);
            let to = byte_offset(text, end);
            out.push_str(&text[from..to]);
        }
        Node::Internal { left, right, .. } => {
            let split = left.len();
            if start < split {
                push_range(left, start, end.min(split), out);
            }
            if end > split {
                push_range(right, start.saturating_sub(split), end - split, out);
            }
        }
    }
}

/// Visits every leaf fragment in order.
pub(crate) fn for_each_chunk(node: &Node, f: &mut impl FnMut(&str)) {
    match node {
        Node::Leaf { text, .. } => f(text),
        Node::Internal { left, right, .. } => {
            for_each_chunk(left, f);
            for_each_chunk(right, f);
        }
    }
}

/// Visits every leaf fragment in order, stopping at the first error.
pub(crate) fn try_for_each_chunk<E>(
    node: &Node,
    f: &mut impl FnMut(&str) -> Result<(), E>,
) -> Result<(), E> {
    match node {
        Node::Leaf { text, .. } => f(text),
        Node::Internal { left, right, .. } => {
            try_for_each_chunk(left, f)?;
            try_for_each_chunk(right, f)
        }
    }
}

/// Character offset of the `nth` line break (1-based) in the subtree.
pub(crate) fn line_break_offset(node: &Node, nth: usize) -> usize {
    match node {
        Node::Leaf { text, len, .. } => text
            .chars()
            .enumerate()
            .filter(|&(_, ch)| ch == '\n')
            .nth(nth.saturating_sub(1))
            .map_or(*len, |(idx, _)| idx),
        Node::Internal { left, right, .. } => {
            if nth <= left.line_breaks() {
                line_break_offset(left, nth)
            } else {
                left.len() + line_break_offset(right, nth - left.line_breaks())
            }
        }
    }
}

/// Number of line breaks strictly before character offset `index`.
pub(crate) fn line_breaks_before(node: &Node, index: usize) -> usize {
    match node {
        Node::Leaf { text, .. } => text.chars().take(index).filter(|&ch| ch == '\n').count(),
        Node::Internal { left, right, .. } => {
            if index <= left.len() {
                line_breaks_before(left, index)
            } else {
                left.line_breaks() + line_breaks_before(right, index - left.len())
            }
        }
    }
}

/// Verifies cached metrics and the AVL invariant for the whole subtree.
///
/// Returns the recomputed `(height, len, line_breaks)` on success.
pub(crate) fn check(node: &Node) -> Option<(usize, usize, usize)> {
    match node {
        Node::Leaf {
            text,
            len,
            line_breaks,
        } => {
            let valid = *len > 0
                && *len <= LEAF_MAX_LENGTH
                && text.chars().count() == *len
                && count_line_breaks(text) == *line_breaks;
            valid.then_some((1, *len, *line_breaks))
        }
        Node::Internal {
            left,
            right,
            len,
            height,
            line_breaks,
        } => {
            let (left_height, left_len, left_breaks) = check(left)?;
            let (right_height, right_len, right_breaks) = check(right)?;
            let valid = node.balance_factor().abs() <= 1
                && *height == 1 + left_height.max(right_height)
                && *len == left_len + right_len
                && *line_breaks == left_breaks + right_breaks;
            valid.then_some((*height, *len, *line_breaks))
        }
    }
}
