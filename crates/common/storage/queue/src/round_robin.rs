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

//! Round-robin scheduling over per-key queues.
//!
//! [`RoundRobinQueue`] keeps one child queue per key (a crawl domain, a
//! tenant, ...) and serves keys in turn, one item per key per round, so a
//! key with a deep backlog cannot starve the others.
//!
//! ## Rotation
//!
//! ```text
//!           front                       back
//! rotation: [ k2 ][ k0 ][ k5 ] ... [ k9 ]   <- new keys join here
//!              │
//!              └─ pop() serves k2, then moves it to the back
//!                 (or evicts it if its queue just drained)
//! ```
//!
//! Start keys are the exception: they are placed so that the **last**
//! supplied key is served first. This matches the service order existing
//! callers rely on, and it is what makes the key list returned by
//! [`close`](RoundRobinQueue::close) restore the same order when passed
//! back as start keys.

use std::{
    collections::{HashMap, VecDeque, hash_map::Entry},
    hash::Hash,
};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{Queue, Result};

/// Fair multiplexer over a dynamic set of keyed queues.
///
/// Child queues are created by `factory` the first time a key is seen, and
/// closed and dropped from the registry as soon as a pop drains them.
pub struct RoundRobinQueue<K, Q, F> {
    factory:  F,
    /// Live child queues. A key is present exactly while it is in `rotation`.
    queues:   HashMap<K, Q>,
    /// Keys awaiting service, front first.
    rotation: VecDeque<K>,
}

impl<K, Q, F> RoundRobinQueue<K, Q, F>
where
    K: Eq + Hash + Clone,
    Q: Queue,
    F: FnMut(&K) -> Result<Q>,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            queues: HashMap::new(),
            rotation: VecDeque::new(),
        }
    }

    /// Creates the scheduler and eagerly opens a queue per start key, e.g.
    /// the keys returned by a previous [`close`](Self::close).
    ///
    /// Start keys are served in reverse of the order given. Duplicates are
    /// opened once.
    pub fn with_start_keys<I>(factory: F, start_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
    {
        let mut rr = Self::new(factory);
        for key in start_keys {
            if let Entry::Vacant(entry) = rr.queues.entry(key) {
                let queue = (rr.factory)(entry.key())?;
                rr.rotation.push_front(entry.key().clone());
                entry.insert(queue);
            }
        }
        debug!(keys = rr.rotation.len(), "Opened start keys");
        Ok(rr)
    }

    /// Pushes `item` to the queue for `key`, creating it if needed.
    ///
    /// A new key joins the back of the rotation. If the factory or the first
    /// push fails, the key is not registered.
    pub fn push(&mut self, item: &[u8], key: K) -> Result<()> {
        match self.queues.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().push(item),
            Entry::Vacant(entry) => {
                let mut queue = (self.factory)(entry.key())?;
                queue.push(item)?;
                self.rotation.push_back(entry.key().clone());
                entry.insert(queue);
                debug!(keys = self.rotation.len(), "Registered new key");
                Ok(())
            }
        }
    }

    /// Pops one item from the key at the front of the rotation.
    ///
    /// The key moves to the back, or is evicted if its queue is now empty.
    /// Keys whose queues turn out to be empty are evicted and skipped.
    pub fn pop(&mut self) -> Result<Option<Bytes>> {
        while let Some(key) = self.rotation.pop_front() {
            let Some(queue) = self.queues.get_mut(&key) else {
                continue;
            };

            let item = match queue.pop() {
                Ok(item) => item,
                Err(e) => {
                    self.rotation.push_front(key);
                    return Err(e);
                }
            };

            if queue.is_empty() {
                self.evict(&key);
            } else {
                self.rotation.push_back(key);
            }

            if item.is_some() {
                return Ok(item);
            }
        }
        Ok(None)
    }

    /// Returns what the next [`pop`](Self::pop) would, without touching the
    /// rotation.
    pub fn peek(&mut self) -> Result<Option<Bytes>> {
        for key in &self.rotation {
            if let Some(queue) = self.queues.get_mut(key)
                && let Some(item) = queue.peek()?
            {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Total items across all keys.
    pub fn len(&self) -> usize { self.queues.values().map(Queue::len).sum() }

    pub fn is_empty(&self) -> bool { self.queues.values().all(Queue::is_empty) }

    /// Registered keys in service order.
    pub fn keys(&self) -> impl Iterator<Item = &K> { self.rotation.iter() }

    /// Closes every child queue and returns the keys that still held items.
    ///
    /// The keys are ordered so that passing them to
    /// [`with_start_keys`](Self::with_start_keys) resumes in the current
    /// service order. Every queue is closed even if some fail; the first
    /// error is returned.
    pub fn close(mut self) -> Result<Vec<K>> {
        let mut active = Vec::new();
        let mut first_err = None;

        for key in self.rotation.drain(..).rev() {
            let Some(queue) = self.queues.remove(&key) else {
                continue;
            };
            let has_items = !queue.is_empty();
            if let Err(e) = queue.close() {
                first_err.get_or_insert(e);
            }
            if has_items {
                active.push(key);
            }
        }

        debug!(active = active.len(), "Closed round-robin queue");
        first_err.map_or(Ok(active), Err)
    }

    /// Closes and drops the queue for `key`.
    fn evict(&mut self, key: &K) {
        if let Some(queue) = self.queues.remove(key) {
            // The queue is empty, so a failed close loses no items.
            if let Err(e) = queue.close() {
                warn!(error = %e, "Failed to close drained queue");
            }
        }
        debug!(keys = self.queues.len(), "Evicted drained key");
    }
}
