//! Write-combining text buffer.
//!
//! [`TextBuffer`] wraps a [`Rope`] and decouples *accepting* an insertion from *applying* it:
//! `insert` validates, bumps the length counters and enqueues, then returns. A background
//! worker thread drains the queue into the rope. Every operation that must observe the
//! up-to-date tree (reads, deletes, replace) first drains the queue itself, so the ordering is
//! always *enqueue* before *drain* before *observe*.
//!
//! Consecutive queued insertions that continue one another (typing `a` at 10, then `b` at 11)
//! are merged into a single rope edit while draining.

use crate::config::BufferConfig;
use crate::error::{BufferError, Result};
use crate::rope::Rope;
use crate::worker::DrainWorker;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, trace, warn};

/// A queued insertion.
#[derive(Debug)]
struct PendingInsert {
    index: usize,
    text: String,
    /// Character count of `text`.
    len: usize,
}

/// State shared between a [`TextBuffer`] and its drain worker.
pub(crate) struct BufferState {
    rope: Rope,
    /// Serializes every rope mutation made through the buffer; holding it while draining keeps
    /// queued insertions in FIFO order.
    apply_lock: Mutex<()>,
    queue_tx: Sender<PendingInsert>,
    queue_rx: Receiver<PendingInsert>,
    /// `rope.len() + pending_len`, maintained without touching the rope.
    len: AtomicUsize,
    /// Sum of the lengths of queued, not yet applied insertions.
    pending_len: AtomicUsize,
}

impl BufferState {
    pub(crate) fn new(text: &str) -> Self {
        let rope = Rope::new(text);
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        Self {
            len: AtomicUsize::new(rope.len()),
            rope,
            apply_lock: Mutex::new(()),
            queue_tx,
            queue_rx,
            pending_len: AtomicUsize::new(0),
        }
    }

    fn lock_apply(&self) -> MutexGuard<'_, ()> {
        self.apply_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending_len.load(Ordering::Acquire)
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.queue_rx.is_empty()
    }

    /// Queues `text` (non-empty) for insertion at `index`.
    pub(crate) fn enqueue(&self, index: usize, text: &str) {
        let len = text.chars().count();
        // Counters go up before the item becomes visible to a drain, so they never underflow.
        self.len.fetch_add(len, Ordering::AcqRel);
        self.pending_len.fetch_add(len, Ordering::AcqRel);

        let pending = PendingInsert {
            index,
            text: text.to_string(),
            len,
        };
        if self.queue_tx.send(pending).is_err() {
            self.pending_len.fetch_sub(len, Ordering::AcqRel);
            self.len.fetch_sub(len, Ordering::AcqRel);
        }
    }

    /// Applies every queued insertion. Returns how many queue items were consumed.
    pub(crate) fn drain(&self) -> usize {
        let apply = self.lock_apply();
        self.drain_locked(&apply)
    }

    fn drain_locked(&self, _apply: &MutexGuard<'_, ()>) -> usize {
        let mut drained = 0;
        let mut run: Option<PendingInsert> = None;

        while let Ok(next) = self.queue_rx.try_recv() {
            drained += 1;
            if let Some(current) = run.as_mut() {
                if next.index == current.index + current.len {
                    current.text.push_str(&next.text);
                    current.len += next.len;
                    continue;
                }
            }
            if let Some(done) = run.replace(next) {
                self.apply(done);
            }
        }
        if let Some(done) = run {
            self.apply(done);
        }

        if drained > 0 {
            trace!(drained, len = self.rope.len(), "applied queued insertions");
        }
        drained
    }

    fn apply(&self, pending: PendingInsert) {
        // A delete that ran after this insert was validated may have shortened the text.
        let index = pending.index.min(self.rope.len());
        if let Err(err) = self.rope.insert(index, &pending.text) {
            warn!(error = %err, "dropping queued insertion");
            self.len.fetch_sub(pending.len, Ordering::AcqRel);
        }
        self.pending_len.fetch_sub(pending.len, Ordering::AcqRel);
    }

    /// Drains the queue and captures the resulting rope.
    fn snapshot(&self) -> Rope {
        let apply = self.lock_apply();
        self.drain_locked(&apply);
        self.rope.clone()
    }

    fn delete(&self, index: usize, length: usize) -> Result<()> {
        let apply = self.lock_apply();
        self.drain_locked(&apply);
        self.rope.delete(index, length)?;
        self.len.fetch_sub(length, Ordering::AcqRel);
        Ok(())
    }

    fn replace_all(&self, text: &str) {
        let _apply = self.lock_apply();

        let mut discarded = 0;
        while let Ok(pending) = self.queue_rx.try_recv() {
            self.pending_len.fetch_sub(pending.len, Ordering::AcqRel);
            self.len.fetch_sub(pending.len, Ordering::AcqRel);
            discarded += 1;
        }

        let old_len = self.rope.len();
        self.rope.replace(text);
        let new_len = self.rope.len();
        self.len.fetch_add(new_len, Ordering::AcqRel);
        self.len.fetch_sub(old_len, Ordering::AcqRel);

        debug!(discarded, old_len, new_len, "replaced buffer contents");
    }

    #[cfg(test)]
    pub(crate) fn applied_text(&self) -> String {
        self.rope.to_string()
    }
}

/// A thread-safe text buffer with asynchronous, write-combined insertion.
///
/// All offsets and lengths are in characters. Every method takes `&self`, so a buffer can be
/// shared across threads behind an `Arc` (or borrowed by scoped threads).
///
/// # Consistency
///
/// - [`TextBuffer::len`] is lock-free and already counts insertions that are still queued.
/// - Reads ([`TextBuffer::text`], [`TextBuffer::substring`], [`TextBuffer::char_at`], ...) drain
///   the queue before answering, so they observe every insertion issued before the call.
/// - Insertions are applied in the order they were accepted.
///
/// # Lifecycle
///
/// A worker thread starts with the buffer. [`TextBuffer::dispose`] (or dropping the buffer)
/// stops it and performs a final drain, so no accepted insertion is lost. After disposal
/// every operation returns [`BufferError::Disposed`].
///
/// # Example
///
/// ```rust
/// use editor_buffer::TextBuffer;
///
/// let buffer = TextBuffer::new("fn main() {}");
/// buffer.insert(12, "\n")?;
/// buffer.insert(11, " println!(\"hi\"); ")?;
/// assert_eq!(buffer.len()?, 30);
/// assert_eq!(buffer.text()?, "fn main() { println!(\"hi\"); }\n");
/// # Ok::<(), editor_buffer::BufferError>(())
/// ```
pub struct TextBuffer {
    state: Arc<BufferState>,
    worker: Mutex<Option<DrainWorker>>,
    /// Edits hold this for read across their liveness check and their effect; disposal takes
    /// it for write, so no edit can land after the final drain.
    edit_gate: RwLock<()>,
    disposed: AtomicBool,
}

impl TextBuffer {
    /// Create a buffer holding `text`, with the default configuration.
    pub fn new(text: &str) -> Self {
        Self::with_config(text, BufferConfig::default())
    }

    /// Create an empty buffer.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Create a buffer holding `text`, with an explicit worker configuration.
    pub fn with_config(text: &str, config: BufferConfig) -> Self {
        let state = Arc::new(BufferState::new(text));
        let worker = DrainWorker::spawn(Arc::clone(&state), &config);
        debug!(
            len = state.len(),
            worker = config.worker_name.as_str(),
            "text buffer created"
        );
        Self {
            state,
            worker: Mutex::new(worker),
            edit_gate: RwLock::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(BufferError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Checks liveness and keeps disposal out until the returned guard is dropped.
    fn live_edit(&self) -> Result<RwLockReadGuard<'_, ()>> {
        let gate = self
            .edit_gate
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        self.ensure_live()?;
        Ok(gate)
    }

    /// Document length in characters, including insertions still waiting in the queue.
    pub fn len(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.state.len())
    }

    /// Returns `true` if the document (including queued insertions) is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Total length of insertions accepted but not yet applied to the rope.
    pub fn pending_len(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.state.pending_len())
    }

    /// Queue an insertion of `text` at `index` and return without waiting for it to land.
    ///
    /// # Errors
    ///
    /// - [`BufferError::IndexOutOfRange`] if `index > self.len()`.
    /// - [`BufferError::Disposed`] after disposal.
    pub fn insert(&self, index: usize, text: &str) -> Result<()> {
        let _gate = self.live_edit()?;
        let len = self.state.len();
        if index > len {
            return Err(BufferError::IndexOutOfRange { index, len });
        }
        if text.is_empty() {
            return Ok(());
        }
        self.state.enqueue(index, text);
        Ok(())
    }

    /// Delete `length` characters at `index`, after applying every queued insertion.
    ///
    /// # Errors
    ///
    /// - [`BufferError::RangeOutOfBounds`] if `index + length > self.len()`.
    /// - [`BufferError::Disposed`] after disposal.
    pub fn delete(&self, index: usize, length: usize) -> Result<()> {
        let _gate = self.live_edit()?;
        let len = self.state.len();
        if index.checked_add(length).is_none_or(|end| end > len) {
            return Err(BufferError::RangeOutOfBounds {
                start: index,
                end: index.saturating_add(length),
                len,
            });
        }
        if length == 0 {
            return Ok(());
        }
        self.state.delete(index, length)
    }

    /// Character at `index`.
    ///
    /// # Errors
    ///
    /// - [`BufferError::IndexOutOfRange`] if `index >= self.len()`.
    /// - [`BufferError::Disposed`] after disposal.
    pub fn char_at(&self, index: usize) -> Result<char> {
        self.ensure_live()?;
        self.state.snapshot().char_at(index)
    }

    /// Text in `[start, start + length)`.
    ///
    /// Lenient: an overlong `length` is cut at the end of the document, and a `start` at or
    /// past the end yields an empty string. Renderers routinely ask for ranges computed from a
    /// slightly stale length.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn substring(&self, start: usize, length: usize) -> Result<String> {
        let mut out = String::new();
        self.text_segment(start, length, &mut out)?;
        Ok(out)
    }

    /// Like [`TextBuffer::substring`], but writes into a caller-owned buffer.
    ///
    /// `out` is cleared first. Returns the number of characters written.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn text_segment(&self, start: usize, length: usize, out: &mut String) -> Result<usize> {
        self.ensure_live()?;
        out.clear();
        if length == 0 {
            return Ok(0);
        }
        Ok(self.state.snapshot().push_clamped(start, length, out))
    }

    /// The whole document.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn text(&self) -> Result<String> {
        Ok(self.snapshot()?.to_string())
    }

    /// Discard queued insertions and replace the contents with `text` (O(n) rebuild).
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn replace_all(&self, text: &str) -> Result<()> {
        let _gate = self.live_edit()?;
        self.state.replace_all(text);
        Ok(())
    }

    /// Call `f` for every character, in order.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn for_each_char(&self, f: impl FnMut(char)) -> Result<()> {
        self.snapshot()?.for_each_char(f);
        Ok(())
    }

    /// Call `f` with the character offset and value of every character, in order.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn for_each_char_indexed(&self, mut f: impl FnMut(usize, char)) -> Result<()> {
        let mut index = 0;
        self.snapshot()?.for_each_char(|ch| {
            f(index, ch);
            index += 1;
        });
        Ok(())
    }

    /// Apply every queued insertion now.
    ///
    /// Useful before handing the contents to a consumer that reads through a
    /// [`TextBuffer::snapshot`] or must not race the worker (e.g. saving to disk).
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn flush(&self) -> Result<()> {
        self.ensure_live()?;
        self.state.drain();
        Ok(())
    }

    /// O(1) snapshot of the document with every queued insertion applied.
    ///
    /// The returned [`Rope`] is independent: later edits to the buffer do not affect it.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn snapshot(&self) -> Result<Rope> {
        self.ensure_live()?;
        Ok(self.state.snapshot())
    }

    /// Number of lines (line breaks + 1).
    ///
    /// # Errors
    ///
    /// [`BufferError::Disposed`] after disposal.
    pub fn line_count(&self) -> Result<usize> {
        Ok(self.snapshot()?.line_count())
    }

    /// Character offset where `line` starts.
    ///
    /// # Errors
    ///
    /// - [`BufferError::LineOutOfRange`] if `line >= self.line_count()`.
    /// - [`BufferError::Disposed`] after disposal.
    pub fn line_to_char(&self, line: usize) -> Result<usize> {
        self.snapshot()?.line_to_char(line)
    }

    /// Zero-based line containing character offset `index` (`index == len` is accepted).
    ///
    /// # Errors
    ///
    /// - [`BufferError::IndexOutOfRange`] if `index > self.len()`.
    /// - [`BufferError::Disposed`] after disposal.
    pub fn char_to_line(&self, index: usize) -> Result<usize> {
        self.snapshot()?.char_to_line(index)
    }

    /// Returns `true` once [`TextBuffer::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop the worker, apply any remaining queued insertions and reject further use.
    ///
    /// Calling it again is a no-op. Dropping the buffer disposes it.
    pub fn dispose(&self) {
        {
            // Waits for in-flight edits; every later edit sees the flag.
            let _gate = self
                .edit_gate
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop();
        }

        let drained = self.state.drain();
        debug!(drained, len = self.state.len(), "text buffer disposed");
    }

    /// Dispose the buffer and return its final contents.
    pub fn into_rope(self) -> Rope {
        self.dispose();
        self.state.rope.clone()
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for TextBuffer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuffer")
            .field("len", &self.state.len())
            .field("pending_len", &self.state.pending_len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_merges_contiguous_insertions() {
        let state = BufferState::new("[]");
        state.enqueue(1, "a");
        state.enqueue(2, "b");
        state.enqueue(3, "c");
        state.enqueue(0, ">");

        assert_eq!(state.len(), 6);
        assert_eq!(state.pending_len(), 4);
        assert_eq!(state.drain(), 4);
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.applied_text(), ">[abc]");
    }

    #[test]
    fn test_drain_clamps_stale_index() {
        let state = BufferState::new("hello");
        state.enqueue(5, "!");
        // Simulate a delete that shrank the text after the insert was accepted.
        state.rope.delete(2, 3).unwrap();
        state.len.fetch_sub(3, Ordering::AcqRel);

        state.drain();
        assert_eq!(state.applied_text(), "he!");
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_replace_all_discards_queue() {
        let state = BufferState::new("old");
        state.enqueue(3, " text");
        state.replace_all("brand new");
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.len(), 9);
        assert_eq!(state.drain(), 0);
        assert_eq!(state.applied_text(), "brand new");
    }

    #[test]
    fn test_dispose_keeps_insertions_that_race_it() {
        for _ in 0..100 {
            let buffer = TextBuffer::empty();
            let accepted = AtomicUsize::new(0);

            std::thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        while buffer.insert(0, "x").is_ok() {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                    });
                }
                std::thread::sleep(std::time::Duration::from_micros(200));
                buffer.dispose();
            });

            assert_eq!(buffer.state.rope.len(), accepted.load(Ordering::Relaxed));
            assert!(!buffer.state.has_pending());
        }
    }

    #[test]
    fn test_edits_after_dispose_leave_rope_untouched() {
        let buffer = TextBuffer::new("keep");
        buffer.dispose();
        assert_eq!(buffer.delete(0, 4), Err(BufferError::Disposed));
        assert_eq!(buffer.replace_all("gone"), Err(BufferError::Disposed));
        assert_eq!(buffer.state.rope.to_string(), "keep");
    }

    #[test]
    fn test_debug_output() {
        let buffer = TextBuffer::new("abc");
        buffer.flush().unwrap();
        assert_eq!(
            format!("{buffer:?}"),
            "TextBuffer { len: 3, pending_len: 0, disposed: false }"
        );
    }
}
