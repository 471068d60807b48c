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

//! Cursor metadata of a [`FifoDiskQueue`](crate::FifoDiskQueue).
//!
//! The manifest is everything needed to reopen a queue directory: the chunk
//! size it was created with, the number of pending items, and the head
//! (write) and tail (read) cursors.
//!
//! ## Format
//!
//! Stored as a single JSON object:
//!
//! ```text
//! {"chunksize": 100000, "size": 3, "head": [0, 5], "tail": [0, 2, 31]}
//! ```
//!
//! - `head`: `[chunk_index, items_in_chunk]`, where the next push goes
//! - `tail`: `[chunk_index, items_consumed_in_chunk, byte_offset]`, where the
//!   next pop reads

use std::{cmp::Ordering, path::Path};

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::{Result, error::CorruptedMetadataSnafu};

/// Write cursor: next item goes to chunk `chunk` as its `offset`-th item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct HeadCursor {
    pub chunk:  u64,
    pub offset: u64,
}

/// Read cursor: next item is the `offset`-th item of chunk `chunk`, found
/// `byte_offset` bytes into the chunk file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 3]", into = "[u64; 3]")]
pub struct TailCursor {
    pub chunk:       u64,
    pub offset:      u64,
    pub byte_offset: u64,
}

impl From<[u64; 2]> for HeadCursor {
    fn from([chunk, offset]: [u64; 2]) -> Self { Self { chunk, offset } }
}

impl From<HeadCursor> for [u64; 2] {
    fn from(cursor: HeadCursor) -> Self { [cursor.chunk, cursor.offset] }
}

impl From<[u64; 3]> for TailCursor {
    fn from([chunk, offset, byte_offset]: [u64; 3]) -> Self {
        Self {
            chunk,
            offset,
            byte_offset,
        }
    }
}

impl From<TailCursor> for [u64; 3] {
    fn from(cursor: TailCursor) -> Self { [cursor.chunk, cursor.offset, cursor.byte_offset] }
}

impl TailCursor {
    /// Orders the tail against the head by `(chunk, offset)`.
    pub fn cmp_head(&self, head: &HeadCursor) -> Ordering {
        (self.chunk, self.offset).cmp(&(head.chunk, head.offset))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Items per chunk file, fixed for the life of the directory.
    #[serde(rename = "chunksize")]
    pub chunk_size: u64,
    /// Number of pushed but not yet popped items.
    pub size:       u64,
    pub head:       HeadCursor,
    pub tail:       TailCursor,
}

impl Manifest {
    /// An empty queue with the given chunk size.
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            size: 0,
            head: HeadCursor::default(),
            tail: TailCursor::default(),
        }
    }

    /// True when the tail has caught up with the head.
    pub fn is_drained(&self) -> bool { self.tail.cmp_head(&self.head) != Ordering::Less }

    /// Number of items between tail and head, or `None` if the tail is past
    /// the head.
    pub fn pending(&self) -> Option<u64> {
        if self.tail.cmp_head(&self.head) == Ordering::Greater {
            return None;
        }
        let chunks = self.head.chunk - self.tail.chunk;
        chunks
            .checked_mul(self.chunk_size)?
            .checked_add(self.head.offset)?
            .checked_sub(self.tail.offset)
    }

    /// Checks the cursor invariants of a manifest read back from disk.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let corrupted = |reason: String| CorruptedMetadataSnafu {
            path: path.to_path_buf(),
            reason,
        };

        ensure!(self.chunk_size > 0, corrupted("chunk size is zero".to_string()));
        ensure!(
            self.head.offset < self.chunk_size && self.tail.offset < self.chunk_size,
            corrupted(format!(
                "cursor offset outside chunk of {} items: head={:?}, tail={:?}",
                self.chunk_size, self.head, self.tail
            ))
        );

        let Some(pending) = self.pending() else {
            return corrupted(format!(
                "tail {:?} is past head {:?}",
                self.tail, self.head
            ))
            .fail();
        };
        ensure!(
            pending == self.size,
            corrupted(format!(
                "size {} disagrees with {pending} items between tail and head",
                self.size
            ))
        );
        Ok(())
    }
}
