// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The capability contract shared by every queue variant.
//!
//! Memory, disk and SQLite queues are unrelated types that all implement
//! [`Queue`]. The schedulers ([`RoundRobinQueue`], [`PriorityQueue`]) are
//! generic over it and build their children through a factory closure, so
//! any implementation can be plugged in.
//!
//! ## Usage
//!
//! ```ignore
//! let mut q = FifoDiskQueue::open("/path/to/queue")?;
//! q.push(b"hello")?;
//! assert_eq!(q.peek()?.as_deref(), Some(&b"hello"[..]));
//! assert_eq!(q.pop()?.as_deref(), Some(&b"hello"[..]));
//! q.close()?;
//! ```
//!
//! [`RoundRobinQueue`]: crate::RoundRobinQueue
//! [`PriorityQueue`]: crate::PriorityQueue

use bytes::Bytes;

use crate::Result;

/// Push/pop/peek/len/close over opaque byte items.
///
/// Ordering (FIFO or LIFO) is up to the implementation. `pop` and `peek`
/// return `Ok(None)` when the queue holds no items; errors are reserved for
/// I/O failures, corruption and items that cannot be stored.
pub trait Queue {
    /// Stores `item`. On error the queue is left as it was.
    fn push(&mut self, item: &[u8]) -> Result<()>;

    /// Removes and returns the next item.
    fn pop(&mut self) -> Result<Option<Bytes>>;

    /// Returns the item the next [`pop`](Queue::pop) would return, without
    /// removing it.
    fn peek(&mut self) -> Result<Option<Bytes>>;

    /// Number of items currently stored.
    fn len(&self) -> usize;

    /// Whether the queue holds no items.
    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Releases the queue's resources. Persistent queues holding no items
    /// remove their storage.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
