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

//! Persistent and in-memory byte queues with a fair scheduler on top.
//!
//! - [`FifoDiskQueue`]: segmented FIFO queue in a directory of chunk files.
//! - [`LifoDiskQueue`]: LIFO queue in a single file.
//! - [`SqliteQueue`]: FIFO or LIFO queue in an SQLite table.
//! - [`FifoMemoryQueue`] / [`LifoMemoryQueue`]: volatile queues.
//! - [`RoundRobinQueue`]: serves one item per key in rotation.
//! - [`PriorityQueue`]: serves the lowest priority number first.
//!
//! All of them speak the [`Queue`] contract.

pub mod builder;
pub mod config;
pub mod error;
pub mod fifo;
pub(crate) mod frame;
pub mod lifo;
pub mod manifest;
pub(crate) mod manifest_writer;
pub mod memory;
pub mod path;
pub mod priority;
pub mod queue;
pub mod round_robin;
pub mod sqlite;

pub use builder::DiskQueueBuilder;
pub use config::{DEFAULT_CHUNK_SIZE, DiskQueueConfig, FlushMode};
pub use error::{QueueError, Result};
pub use fifo::FifoDiskQueue;
pub use lifo::LifoDiskQueue;
pub use memory::{FifoMemoryQueue, LifoMemoryQueue};
pub use priority::PriorityQueue;
pub use queue::Queue;
pub use round_robin::RoundRobinQueue;
pub use sqlite::{SqliteOrder, SqliteQueue};
