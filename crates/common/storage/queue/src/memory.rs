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

//! In-process queues with the same contract as the disk queues.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::{Queue, Result};

/// In-memory FIFO queue.
#[derive(Debug, Default)]
pub struct FifoMemoryQueue {
    items: VecDeque<Bytes>,
}

impl FifoMemoryQueue {
    pub fn new() -> Self { Self::default() }
}

impl Queue for FifoMemoryQueue {
    fn push(&mut self, item: &[u8]) -> Result<()> {
        self.items.push_back(Bytes::copy_from_slice(item));
        Ok(())
    }

    fn pop(&mut self) -> Result<Option<Bytes>> { Ok(self.items.pop_front()) }

    fn peek(&mut self) -> Result<Option<Bytes>> { Ok(self.items.front().cloned()) }

    fn len(&self) -> usize { self.items.len() }

    fn close(self) -> Result<()> { Ok(()) }
}

/// In-memory LIFO queue.
#[derive(Debug, Default)]
pub struct LifoMemoryQueue {
    items: VecDeque<Bytes>,
}

impl LifoMemoryQueue {
    pub fn new() -> Self { Self::default() }
}

impl Queue for LifoMemoryQueue {
    fn push(&mut self, item: &[u8]) -> Result<()> {
        self.items.push_back(Bytes::copy_from_slice(item));
        Ok(())
    }

    fn pop(&mut self) -> Result<Option<Bytes>> { Ok(self.items.pop_back()) }

    fn peek(&mut self) -> Result<Option<Bytes>> { Ok(self.items.back().cloned()) }

    fn len(&self) -> usize { self.items.len() }

    fn close(self) -> Result<()> { Ok(()) }
}
