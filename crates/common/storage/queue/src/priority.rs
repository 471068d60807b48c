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

//! Priority buckets over child queues.
//!
//! One child queue per priority number; lower numbers are served first and
//! a priority's own queue decides the order within it (FIFO or LIFO).

use std::collections::{BTreeMap, btree_map::Entry};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{Queue, Result};

pub struct PriorityQueue<Q, F> {
    factory: F,
    /// Child queue per priority, lowest first.
    queues:  BTreeMap<i64, Q>,
}

impl<Q, F> PriorityQueue<Q, F>
where
    Q: Queue,
    F: FnMut(i64) -> Result<Q>,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            queues: BTreeMap::new(),
        }
    }

    /// Creates the queue and eagerly opens a child per start priority, e.g.
    /// the priorities returned by a previous [`close`](Self::close).
    pub fn with_start_priorities<I>(factory: F, priorities: I) -> Result<Self>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut pq = Self::new(factory);
        for priority in priorities {
            if let Entry::Vacant(entry) = pq.queues.entry(priority) {
                entry.insert((pq.factory)(priority)?);
            }
        }
        Ok(pq)
    }

    pub fn push(&mut self, item: &[u8], priority: i64) -> Result<()> {
        match self.queues.entry(priority) {
            Entry::Occupied(mut entry) => entry.get_mut().push(item),
            Entry::Vacant(entry) => {
                let mut queue = (self.factory)(priority)?;
                queue.push(item)?;
                entry.insert(queue);
                debug!(priority, "Opened priority queue");
                Ok(())
            }
        }
    }

    /// Pops from the lowest priority holding items. A priority whose queue
    /// drains is closed and removed.
    pub fn pop(&mut self) -> Result<Option<Bytes>> {
        while let Some(mut entry) = self.queues.first_entry() {
            let item = entry.get_mut().pop()?;
            if entry.get().is_empty() {
                let (priority, queue) = entry.remove_entry();
                if let Err(e) = queue.close() {
                    warn!(priority, error = %e, "Failed to close drained priority queue");
                }
            }
            if item.is_some() {
                return Ok(item);
            }
        }
        Ok(None)
    }

    pub fn peek(&mut self) -> Result<Option<Bytes>> {
        for queue in self.queues.values_mut() {
            if let Some(item) = queue.peek()? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// The priority the next pop is served from.
    pub fn current_priority(&self) -> Option<i64> {
        self.queues
            .iter()
            .find(|(_, queue)| !queue.is_empty())
            .map(|(priority, _)| *priority)
    }

    pub fn len(&self) -> usize { self.queues.values().map(Queue::len).sum() }

    pub fn is_empty(&self) -> bool { self.queues.values().all(Queue::is_empty) }

    /// Closes every child queue and returns the priorities that still held
    /// items, lowest first.
    pub fn close(self) -> Result<Vec<i64>> {
        let mut active = Vec::new();
        let mut first_err = None;
        for (priority, queue) in self.queues {
            if !queue.is_empty() {
                active.push(priority);
            }
            if let Err(e) = queue.close() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(active), Err)
    }
}
