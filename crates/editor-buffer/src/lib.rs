#![warn(missing_docs)]
//! Editor Buffer - Concurrent Rope-Backed Text Buffer
//!
//! # Overview
//!
//! `editor-buffer` is the text storage engine behind an editor's document model. It offers
//! O(log n) indexed reads and edits on documents of any size, stays consistent under
//! concurrent readers and writers, and absorbs keystroke-rate insertions without rebuilding
//! the tree on the caller's thread.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  TextBuffer (write-combining façade)        │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Drain Worker (background queue consumer)   │  ← Async insert apply
//! ├─────────────────────────────────────────────┤
//! │  Rope (RwLock-guarded persistent root)      │  ← Thread-safe access
//! ├─────────────────────────────────────────────┤
//! │  Nodes (immutable AVL tree of fragments)    │  ← Text Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Using the Rope directly
//!
//! ```rust
//! use editor_buffer::Rope;
//!
//! let rope = Rope::new("hello");
//! rope.insert(2, "world").unwrap();
//! assert_eq!(rope.to_string(), "heworldllo");
//!
//! let rope = Rope::new("hello world");
//! assert_eq!(rope.substring(6, 5).unwrap(), "world");
//! rope.delete(6, 5).unwrap();
//! assert_eq!(rope.to_string(), "hello ");
//! ```
//!
//! ## Using the TextBuffer
//!
//! ```rust
//! use editor_buffer::TextBuffer;
//!
//! let buffer = TextBuffer::new("");
//! for ch in "typing".chars() {
//!     let end = buffer.len().unwrap();
//!     buffer.insert(end, &ch.to_string()).unwrap();
//! }
//!
//! // Length already accounts for insertions that are still queued.
//! assert_eq!(buffer.len().unwrap(), 6);
//!
//! // Reads drain the queue first.
//! assert_eq!(buffer.text().unwrap(), "typing");
//! ```
//!
//! # Module Description
//!
//! - [`rope`] - persistent AVL rope with an `RwLock`-guarded root
//! - [`buffer`] - write-combining [`TextBuffer`] façade
//! - [`config`] - drain worker configuration
//! - [`error`] - error type shared by every operation
//!
//! # Units
//!
//! All offsets and lengths are **character offsets** (Unicode scalar values); text is stored
//! as UTF-8. Line queries count `'\n'` only.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events (worker start/stop, drained batches, disposal) and never
//! installs a subscriber itself.

pub mod buffer;
pub mod config;
pub mod error;
pub mod iter;
mod node;
pub mod rope;
mod worker;

pub use buffer::TextBuffer;
pub use config::{BufferConfig, DEFAULT_IDLE_INTERVAL, IDLE_INTERVAL_ENV};
pub use error::{BufferError, Result};
pub use iter::Chars;
pub use node::LEAF_MAX_LENGTH;
pub use rope::Rope;
